use std::path::Path;

use baloneo_config::AppConfig;
use baloneo_core::document::DocumentSummary;
use baloneo_engine::session::{Session, SessionSettings};
use baloneo_io::{DocumentLoader, IoError};
use tracing::{info, warn};

/// 由配置生成会话设置。
pub fn session_settings(config: &AppConfig) -> SessionSettings {
    SessionSettings {
        balloon_diameter: config.render.balloon_diameter,
        default_unit: config.export.default_unit,
    }
}

/// 打开文档并替换会话中的当前文档。失败时会话保持不变。
pub fn open_into_session(
    session: &mut Session,
    loader: &dyn DocumentLoader,
    path: &Path,
) -> Result<DocumentSummary, IoError> {
    match loader.load(path) {
        Ok(document) => {
            if session.is_open() {
                info!("关闭当前文档，未导出的标注将被丢弃");
            }
            session.load_document(document);
            let summary = session
                .document()
                .map(|document| document.summary())
                .ok_or_else(|| IoError::InvalidDocument("文档未能载入会话".to_string()))?;
            Ok(summary)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "打开文档失败");
            Err(err)
        }
    }
}
