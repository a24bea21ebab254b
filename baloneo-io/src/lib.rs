use std::path::{Path, PathBuf};

use baloneo_core::document::Document;
use baloneo_core::geometry::Rotation;
use thiserror::Error;
use tracing::{info, warn};

pub mod export;
pub mod manifest;
pub mod pdf;
pub mod projector;
pub mod render;

use crate::pdf::PdfDocument;
use crate::render::PageCanvas;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
    #[error("pdf error: {0}")]
    Pdf(String),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

/// 打开 PDF 并生成空白的标注文档。
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfFacade;

impl PdfFacade {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentLoader for PdfFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let pdf = PdfDocument::load(path)?;
        let rotations: Vec<Rotation> = (0..pdf.page_count())
            .map(|page| {
                pdf.rotation(page).unwrap_or_else(|err| {
                    warn!(page, error = %err, "无法识别页面旋转，按 0° 处理");
                    Rotation::Deg0
                })
            })
            .collect();
        info!(path = %path.display(), pages = pdf.page_count(), "已读取 PDF");
        Ok(Document::new(path, pdf.page_count()).with_source_rotations(rotations))
    }
}
