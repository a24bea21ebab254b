use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("无法读取脚本 {path:?}: {source}")]
    Script {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("读取输入失败: {0}")]
    Input(#[source] std::io::Error),
    #[error("写出结果失败: {0}")]
    Output(#[source] std::io::Error),
}
