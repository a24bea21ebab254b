use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::annotation::{AnnotationModel, PageAnnotationState, Unit};
use crate::geometry::Rotation;
use crate::store::PageStateStore;

/// 一次编辑会话对应的文档聚合：源文件、页数、各页标注与全局单位。
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    source_path: PathBuf,
    page_count: usize,
    pages: PageStateStore,
    global_unit: Unit,
    source_rotations: Vec<Rotation>,
}

impl Document {
    pub fn new(source_path: impl Into<PathBuf>, page_count: usize) -> Self {
        Self {
            source_path: source_path.into(),
            page_count,
            pages: PageStateStore::new(),
            global_unit: Unit::default(),
            source_rotations: Vec::new(),
        }
    }

    /// 记录源文件中各页的 `/Rotate`，作为未访问页面的初始旋转。
    pub fn with_source_rotations(mut self, rotations: impl IntoIterator<Item = Rotation>) -> Self {
        self.source_rotations = rotations.into_iter().collect();
        self
    }

    /// 源文件中该页的旋转；未知时为 0。
    #[inline]
    pub fn source_rotation(&self, page_index: usize) -> Rotation {
        self.source_rotations
            .get(page_index)
            .copied()
            .unwrap_or_default()
    }

    #[inline]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    #[inline]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    #[inline]
    pub fn contains_page(&self, page_index: usize) -> bool {
        page_index < self.page_count
    }

    #[inline]
    pub fn global_unit(&self) -> Unit {
        self.global_unit
    }

    /// 修改全局单位，并广播到所有已保存页面的全部记录。
    pub fn set_global_unit(&mut self, unit: Unit) {
        self.global_unit = unit;
        self.pages.set_unit(unit);
    }

    #[inline]
    pub fn pages(&self) -> &PageStateStore {
        &self.pages
    }

    #[inline]
    pub fn pages_mut(&mut self) -> &mut PageStateStore {
        &mut self.pages
    }

    /// 提交编辑中的页面。
    pub fn commit_page(&mut self, page_index: usize, model: &AnnotationModel) {
        self.pages.snapshot(page_index, model);
    }

    /// 进入页面时的完整状态：已保存的快照，或带源文件旋转的空状态。
    pub fn restore_page(&self, page_index: usize) -> PageAnnotationState {
        match self.pages.get(page_index) {
            Some(state) => state.clone(),
            None => PageAnnotationState::with_rotation(self.source_rotation(page_index)),
        }
    }

    pub fn page_rotation(&self, page_index: usize) -> Rotation {
        match self.pages.get(page_index) {
            Some(state) => state.rotation(),
            None => self.source_rotation(page_index),
        }
    }

    /// 生成一行概要，供日志与命令行状态输出使用。
    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            source: self.source_path.display().to_string(),
            page_count: self.page_count,
            annotated_pages: self.pages.annotated_pages().count(),
            records: self.pages.total_records(),
            unit: self.global_unit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentSummary {
    pub source: String,
    pub page_count: usize,
    pub annotated_pages: usize,
    pub records: usize,
    pub unit: Unit,
}
