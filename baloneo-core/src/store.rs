use std::collections::BTreeMap;

use crate::annotation::{AnnotationModel, DimensionRecord, PageAnnotationState, Unit};
use crate::geometry::Rotation;

/// 按页索引保存标注状态。切换页面前提交快照，进入页面时整体恢复。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageStateStore {
    pages: BTreeMap<usize, PageAnnotationState>,
}

impl PageStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入编辑中的模型（含当前旋转角），覆盖该页已有条目。
    pub fn snapshot(&mut self, page_index: usize, model: &AnnotationModel) {
        self.pages.insert(page_index, model.state().clone());
    }

    /// 返回保存的状态；从未访问过的页面返回空状态。
    pub fn restore(&self, page_index: usize) -> PageAnnotationState {
        self.pages.get(&page_index).cloned().unwrap_or_default()
    }

    #[inline]
    pub fn get(&self, page_index: usize) -> Option<&PageAnnotationState> {
        self.pages.get(&page_index)
    }

    /// 页面当前旋转角，无记录时为 0。
    pub fn rotation(&self, page_index: usize) -> Rotation {
        self.pages
            .get(&page_index)
            .map(PageAnnotationState::rotation)
            .unwrap_or_default()
    }

    /// 丢弃某页状态，返回之前是否存在。
    pub fn discard(&mut self, page_index: usize) -> bool {
        self.pages.remove(&page_index).is_some()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    /// 按页索引升序迭代。
    pub fn iter(&self) -> impl Iterator<Item = (usize, &PageAnnotationState)> + '_ {
        self.pages.iter().map(|(index, state)| (*index, state))
    }

    /// 仅包含气球的页面。
    pub fn annotated_pages(&self) -> impl Iterator<Item = (usize, &PageAnnotationState)> + '_ {
        self.iter().filter(|(_, state)| !state.is_empty())
    }

    /// 所有页面的尺寸记录，按页序、行序排列。
    pub fn records(&self) -> impl Iterator<Item = &DimensionRecord> + '_ {
        self.pages.values().flat_map(|state| state.records().iter())
    }

    pub fn total_records(&self) -> usize {
        self.pages.values().map(PageAnnotationState::len).sum()
    }

    pub fn set_unit(&mut self, unit: Unit) {
        for state in self.pages.values_mut() {
            state.set_unit(unit);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
