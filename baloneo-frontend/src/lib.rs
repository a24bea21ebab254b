pub mod cli;
pub mod errors;
pub mod loader;

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use baloneo_config::AppConfig;
use cli::{Shell, ShellReport};
use errors::FrontendError;
use tracing::info;

/// 执行脚本文件；`script` 为 `None` 时从标准输入读取。结果写到标准输出。
pub fn run_script(config: &AppConfig, script: Option<&Path>) -> Result<ShellReport, FrontendError> {
    let mut shell = Shell::new(config);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match script {
        Some(path) => {
            info!(path = %path.display(), "执行脚本文件");
            let file = File::open(path).map_err(|source| FrontendError::Script {
                path: path.to_path_buf(),
                source,
            })?;
            shell.run(BufReader::new(file), &mut out)
        }
        None => {
            info!("从标准输入读取命令");
            shell.run(io::stdin().lock(), &mut out)
        }
    }
}
