use std::fs;
use std::path::{Path, PathBuf};

use baloneo_core::document::Document;
use chrono::{Local, NaiveDateTime};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::IoError;
use crate::manifest::Manifest;
use crate::pdf::PdfDocument;
use crate::projector::ExportProjector;
use crate::render::RenderError;

pub const DEFAULT_SUFFIX: &str = "_baloneado";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no document is open")]
    NoDocument,
    #[error("there are no dimensions to export")]
    NoDimensions,
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("failed to draw annotations: {0}")]
    Render(#[from] RenderError),
    #[error("failed to serialize manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// 导出前置条件：必须有打开的文档且至少一条尺寸记录。不满足时不触碰任何文件。
pub fn check_preconditions(document: Option<&Document>) -> Result<&Document, ExportError> {
    let document = document.ok_or(ExportError::NoDocument)?;
    if document.pages().total_records() == 0 {
        return Err(ExportError::NoDimensions);
    }
    Ok(document)
}

/// 用户选择的路径不以 `.pdf` 结尾时追加扩展名。
pub fn pdf_output_path(chosen: &Path) -> PathBuf {
    let has_pdf = chosen
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if has_pdf {
        chosen.to_path_buf()
    } else {
        let mut name = chosen.as_os_str().to_os_string();
        name.push(".pdf");
        PathBuf::from(name)
    }
}

/// 与 PDF 同名的清单路径。
pub fn manifest_path_for(pdf_path: &Path) -> PathBuf {
    pdf_path.with_extension("json")
}

/// 源文件旁的默认输出名，例如 `plano.pdf` -> `plano_baloneado.pdf`。
pub fn default_output_path(source: &Path, suffix: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "documento".to_string());
    source.with_file_name(format!("{stem}{suffix}.pdf"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub pdf_path: PathBuf,
    pub manifest_path: PathBuf,
    pub balloons: usize,
    pub records: usize,
    pub failures: usize,
    pub created_at: String,
}

/// 内存中的导出结果。
#[derive(Debug, Clone)]
pub struct RenderedExport {
    pub pdf: Vec<u8>,
    pub manifest: Manifest,
    pub balloons: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Exporter {
    projector: ExportProjector,
}

impl Exporter {
    pub fn new(projector: ExportProjector) -> Self {
        Self { projector }
    }

    pub fn with_render_zoom(render_zoom: f64) -> Self {
        Self::new(ExportProjector::with_render_zoom(render_zoom))
    }

    /// 生成带气球的 PDF 字节与清单，不写入目标路径。
    ///
    /// 依次：打开源文件、写入页面旋转、保存到临时文件、重新打开并绘制、保存到第二个临时文件、读回。
    /// 两个临时文件在返回前删除，删除失败被忽略。
    pub fn render(
        &self,
        document: &Document,
        generated_at: NaiveDateTime,
    ) -> Result<RenderedExport, ExportError> {
        let mut source = PdfDocument::load(document.source_path())?;
        self.projector.apply_rotations(document, &mut source)?;

        let rotated = temporary_pdf()?;
        source.save(rotated.path())?;

        let mut annotated = PdfDocument::load(rotated.path())?;
        let projection = self
            .projector
            .project(document, &mut annotated, generated_at)?;

        let output = temporary_pdf()?;
        annotated.save(output.path())?;
        let bytes = fs::read(output.path()).map_err(|source| IoError::ReadError {
            path: output.path().to_path_buf(),
            source,
        })?;

        discard(rotated);
        discard(output);
        Ok(RenderedExport {
            pdf: bytes,
            balloons: projection.balloons_drawn(),
            failures: projection.failures,
            manifest: projection.manifest,
        })
    }

    /// 写出 `<base>.pdf` 与 `<base>.json`。清单只在 PDF 写入成功后写入。
    pub fn export_annotated(
        &self,
        document: Option<&Document>,
        chosen: &Path,
    ) -> Result<ExportSummary, ExportError> {
        self.export_annotated_at(document, chosen, Local::now().naive_local())
    }

    pub fn export_annotated_at(
        &self,
        document: Option<&Document>,
        chosen: &Path,
        generated_at: NaiveDateTime,
    ) -> Result<ExportSummary, ExportError> {
        let document = check_preconditions(document)?;
        let pdf_path = pdf_output_path(chosen);
        let manifest_path = manifest_path_for(&pdf_path);

        let RenderedExport {
            pdf,
            manifest,
            balloons,
            failures,
        } = self.render(document, generated_at)?;
        let json = manifest.to_json()?;

        write_file(&pdf_path, &pdf)?;
        write_file(&manifest_path, json.as_bytes())?;

        info!(
            pdf = %pdf_path.display(),
            manifest = %manifest_path.display(),
            balloons,
            records = manifest.len(),
            failures,
            "导出完成"
        );
        Ok(ExportSummary {
            pdf_path,
            manifest_path,
            balloons,
            records: manifest.len(),
            failures,
            created_at: manifest.created_at,
        })
    }
}

/// 仅导出清单，不生成 PDF。
pub fn export_manifest(document: Option<&Document>, path: &Path) -> Result<Manifest, ExportError> {
    export_manifest_at(document, path, Local::now().naive_local())
}

pub fn export_manifest_at(
    document: Option<&Document>,
    path: &Path,
    generated_at: NaiveDateTime,
) -> Result<Manifest, ExportError> {
    let document = check_preconditions(document)?;
    let manifest = Manifest::from_document(document, generated_at);
    write_file(path, manifest.to_json()?.as_bytes())?;
    info!(path = %path.display(), records = manifest.len(), "清单已导出");
    Ok(manifest)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), IoError> {
    fs::write(path, bytes).map_err(|source| IoError::WriteError {
        path: path.to_path_buf(),
        source,
    })
}

fn temporary_pdf() -> Result<NamedTempFile, IoError> {
    tempfile::Builder::new()
        .prefix("baloneo-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|source| IoError::WriteError {
            path: std::env::temp_dir(),
            source,
        })
}

fn discard(file: NamedTempFile) {
    let path = file.path().to_path_buf();
    if let Err(err) = file.close() {
        debug!(path = %path.display(), error = %err, "删除临时文件失败");
    }
}

#[cfg(test)]
mod tests {
    use baloneo_core::annotation::{AnnotationModel, RecordField};
    use baloneo_core::geometry::Rotation;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::*;
    use crate::pdf::fixtures::pdf_bytes;
    use crate::render::PageCanvas;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 30)
            .and_then(|date| date.and_hms_opt(8, 30, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn output_paths_follow_naming_rules() {
        assert_eq!(pdf_output_path(Path::new("out/a.PDF")), PathBuf::from("out/a.PDF"));
        assert_eq!(pdf_output_path(Path::new("out/a")), PathBuf::from("out/a.pdf"));
        assert_eq!(pdf_output_path(Path::new("out/a.v2")), PathBuf::from("out/a.v2.pdf"));
        assert_eq!(manifest_path_for(Path::new("out/a.pdf")), PathBuf::from("out/a.json"));
        assert_eq!(
            default_output_path(Path::new("/tmp/plano.pdf"), DEFAULT_SUFFIX),
            PathBuf::from("/tmp/plano_baloneado.pdf")
        );
    }

    #[test]
    fn preconditions_reject_before_touching_files() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("salida.pdf");
        let exporter = Exporter::default();

        let err = exporter.export_annotated_at(None, &target, at()).unwrap_err();
        assert!(matches!(err, ExportError::NoDocument));

        let empty = Document::new(dir.path().join("missing.pdf"), 1);
        let err = exporter
            .export_annotated_at(Some(&empty), &target, at())
            .unwrap_err();
        assert!(matches!(err, ExportError::NoDimensions));
        assert!(matches!(
            export_manifest_at(Some(&empty), &dir.path().join("m.json"), at()),
            Err(ExportError::NoDimensions)
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn export_writes_pdf_then_manifest() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("plano.pdf");
        std::fs::write(&source, pdf_bytes(&[(300, 400), (300, 400)], None)).unwrap();

        let mut document = Document::new(&source, 2);
        let mut model = AnnotationModel::default();
        model.set_rotation(Rotation::Deg90);
        model.add_balloon(120.0, 80.0);
        model.set_field(0, RecordField::Nominal, "3/4").unwrap();
        document.commit_page(1, &model);

        let summary = Exporter::default()
            .export_annotated_at(Some(&document), &dir.path().join("salida"), at())
            .unwrap();

        assert_eq!(summary.pdf_path, dir.path().join("salida.pdf"));
        assert_eq!(summary.manifest_path, dir.path().join("salida.json"));
        assert_eq!(summary.balloons, 1);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.failures, 0);

        let written = PdfDocument::load(&summary.pdf_path).unwrap();
        assert_eq!(written.page_count(), 2);
        assert_eq!(written.rotation(1).unwrap(), Rotation::Deg90);
        assert_eq!(written.rotation(0).unwrap(), Rotation::Deg0);

        let json = std::fs::read_to_string(&summary.manifest_path).unwrap();
        let manifest = Manifest::from_json(&json).unwrap();
        assert_eq!(manifest.dimensions[0].nominal, 0.75);
        assert_eq!(manifest.created_at, "2025-06-30 08:30:00");

        // 源文件不被修改
        let untouched = PdfDocument::load(&source).unwrap();
        assert_eq!(untouched.rotation(1).unwrap(), Rotation::Deg0);
    }

    #[test]
    fn unreadable_source_writes_nothing() {
        let dir = tempdir().unwrap();
        let mut document = Document::new(dir.path().join("missing.pdf"), 1);
        let mut model = AnnotationModel::default();
        model.add_balloon(1.0, 1.0);
        document.commit_page(0, &model);

        let err = Exporter::default()
            .export_annotated_at(Some(&document), &dir.path().join("out.pdf"), at())
            .unwrap_err();
        assert!(matches!(err, ExportError::Io(IoError::ReadError { .. })));
        assert!(!dir.path().join("out.pdf").exists());
        assert!(!dir.path().join("out.json").exists());
    }
}
