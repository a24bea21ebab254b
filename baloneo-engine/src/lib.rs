pub mod command;

pub mod errors {
    use baloneo_core::annotation::AnnotationError;
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq)]
    pub enum EngineError {
        #[error("no document is open")]
        DocumentNotOpen,
        #[error("page {index} out of range (document has {page_count} pages)")]
        PageOutOfRange { index: usize, page_count: usize },
        #[error(transparent)]
        Annotation(#[from] AnnotationError),
    }
}

pub mod session {
    use baloneo_core::annotation::{
        AnnotationModel, Balloon, DEFAULT_BALLOON_DIAMETER, RecordField, Unit,
    };
    use baloneo_core::document::Document;
    use baloneo_core::geometry::Rotation;
    use tracing::{debug, info};

    use crate::errors::EngineError;

    /// 会话级设置，通常来自配置文件。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct SessionSettings {
        pub balloon_diameter: f64,
        pub default_unit: Unit,
    }

    impl Default for SessionSettings {
        fn default() -> Self {
            Self {
                balloon_diameter: DEFAULT_BALLOON_DIAMETER,
                default_unit: Unit::default(),
            }
        }
    }

    /// 交互外壳持有的唯一编辑状态：打开的文档、当前页以及当前页的编辑副本。
    ///
    /// 编辑副本在 [`Session::commit`] 或翻页之前只是草稿，文档中保存的页面状态才是权威版本。
    #[derive(Debug)]
    pub struct Session {
        settings: SessionSettings,
        document: Option<Document>,
        current_page: usize,
        model: AnnotationModel,
    }

    impl Session {
        pub fn new(settings: SessionSettings) -> Self {
            Self {
                settings,
                document: None,
                current_page: 0,
                model: AnnotationModel::new(settings.default_unit, settings.balloon_diameter),
            }
        }

        /// 使用已加载文档初始化会话。
        pub fn with_document(settings: SessionSettings, document: Document) -> Self {
            let mut session = Self::new(settings);
            session.load_document(document);
            session
        }

        /// 替换当前文档并回到第一页；之前的标注全部丢弃，全局单位保留。
        pub fn load_document(&mut self, mut document: Document) {
            document.set_global_unit(self.model.unit());
            info!(
                source = %document.source_path().display(),
                pages = document.page_count(),
                "已打开文档"
            );
            self.current_page = 0;
            self.model = AnnotationModel::from_state(
                document.restore_page(0),
                document.global_unit(),
                self.settings.balloon_diameter,
            );
            self.document = Some(document);
        }

        /// 关闭文档，返回已提交当前页的文档。
        pub fn close(&mut self) -> Option<Document> {
            self.commit_current();
            let document = self.document.take();
            self.current_page = 0;
            self.model = AnnotationModel::new(self.model.unit(), self.settings.balloon_diameter);
            document
        }

        #[inline]
        pub fn settings(&self) -> SessionSettings {
            self.settings
        }

        #[inline]
        pub fn is_open(&self) -> bool {
            self.document.is_some()
        }

        /// 已提交的文档视图；当前页的未提交编辑不在其中。
        #[inline]
        pub fn document(&self) -> Option<&Document> {
            self.document.as_ref()
        }

        #[inline]
        pub fn current_page(&self) -> usize {
            self.current_page
        }

        pub fn page_count(&self) -> usize {
            self.document.as_ref().map_or(0, Document::page_count)
        }

        #[inline]
        pub fn model(&self) -> &AnnotationModel {
            &self.model
        }

        #[inline]
        pub fn unit(&self) -> Unit {
            self.model.unit()
        }

        fn ensure_open(&self) -> Result<(), EngineError> {
            if self.document.is_some() {
                Ok(())
            } else {
                Err(EngineError::DocumentNotOpen)
            }
        }

        fn commit_current(&mut self) {
            if let Some(document) = self.document.as_mut() {
                document.commit_page(self.current_page, &self.model);
            }
        }

        /// 当前页的渲染坐标处放置气球。
        pub fn click(&mut self, render_x: f64, render_y: f64) -> Result<&Balloon, EngineError> {
            self.ensure_open()?;
            let page = self.current_page;
            let balloon = self.model.add_balloon(render_x, render_y);
            debug!(
                page,
                number = balloon.number,
                x = render_x,
                y = render_y,
                rotation = balloon.rotation_at_creation.degrees(),
                "已放置气球"
            );
            Ok(balloon)
        }

        /// 外壳按 `(page, x, y)` 投递点击；页面不同时先切换。
        pub fn click_on_page(
            &mut self,
            page_index: usize,
            render_x: f64,
            render_y: f64,
        ) -> Result<&Balloon, EngineError> {
            self.go_to_page(page_index)?;
            self.click(render_x, render_y)
        }

        /// 当前页顺时针旋转 90°，返回新角度。
        pub fn rotate(&mut self) -> Result<Rotation, EngineError> {
            self.ensure_open()?;
            let rotation = self.model.rotation().rotated_cw();
            self.model.set_rotation(rotation);
            debug!(page = self.current_page, rotation = rotation.degrees(), "页面已旋转");
            Ok(rotation)
        }

        /// 提交当前页后切换到目标页，并整体恢复其保存状态。
        pub fn go_to_page(&mut self, page_index: usize) -> Result<(), EngineError> {
            let page_count = self
                .document
                .as_ref()
                .map(Document::page_count)
                .ok_or(EngineError::DocumentNotOpen)?;
            if page_index >= page_count {
                return Err(EngineError::PageOutOfRange {
                    index: page_index,
                    page_count,
                });
            }
            if page_index == self.current_page {
                return Ok(());
            }

            self.commit_current();
            let Some(document) = self.document.as_ref() else {
                return Err(EngineError::DocumentNotOpen);
            };
            self.model = AnnotationModel::from_state(
                document.restore_page(page_index),
                document.global_unit(),
                self.settings.balloon_diameter,
            );
            debug!(from = self.current_page, to = page_index, "切换页面");
            self.current_page = page_index;
            Ok(())
        }

        /// 下一页；已在最后一页时保持不动并返回 `false`。
        pub fn next_page(&mut self) -> Result<bool, EngineError> {
            let target = self.current_page + 1;
            if target >= self.page_count() {
                self.ensure_open()?;
                return Ok(false);
            }
            self.go_to_page(target).map(|_| true)
        }

        /// 上一页；已在第一页时保持不动并返回 `false`。
        pub fn prev_page(&mut self) -> Result<bool, EngineError> {
            self.ensure_open()?;
            match self.current_page.checked_sub(1) {
                Some(target) => self.go_to_page(target).map(|_| true),
                None => Ok(false),
            }
        }

        /// 撤销最后一个气球，返回被删除的编号。
        pub fn remove_last(&mut self) -> Result<Option<u32>, EngineError> {
            self.ensure_open()?;
            Ok(self.model.remove_last().map(|(balloon, _)| balloon.number))
        }

        /// 删除表格中的一行及对应气球。
        pub fn delete_row(&mut self, row: usize) -> Result<Balloon, EngineError> {
            self.ensure_open()?;
            let (balloon, _) = self.model.remove_at(row)?;
            Ok(balloon)
        }

        /// 清空当前页，返回删除的气球数量。
        pub fn clear_page(&mut self) -> Result<usize, EngineError> {
            self.ensure_open()?;
            let removed = self.model.len();
            self.model.clear_all();
            Ok(removed)
        }

        /// 修改全局单位：编辑副本与所有已保存页面同时更新。
        pub fn set_unit(&mut self, unit: Unit) {
            self.model.set_unit(unit);
            if let Some(document) = self.document.as_mut() {
                document.set_global_unit(unit);
            }
        }

        pub fn edit_record(
            &mut self,
            row: usize,
            field: RecordField,
            value: &str,
        ) -> Result<(), EngineError> {
            self.ensure_open()?;
            self.model.set_field(row, field, value)?;
            Ok(())
        }

        /// 提交当前页并返回完整文档，导出前调用。
        pub fn commit(&mut self) -> Result<&Document, EngineError> {
            self.commit_current();
            self.document.as_ref().ok_or(EngineError::DocumentNotOpen)
        }
    }

    impl Default for Session {
        fn default() -> Self {
            Self::new(SessionSettings::default())
        }
    }

}
