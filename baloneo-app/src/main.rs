use std::path::PathBuf;
use std::process::ExitCode;

use baloneo_config::{AppConfig, ConfigError};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// 为技术图纸放置编号气球，导出标注 PDF 与尺寸清单。
#[derive(Parser, Debug)]
#[command(name = "baloneo", version)]
struct Cli {
    /// 配置文件路径，覆盖自动发现
    #[arg(long)]
    config: Option<PathBuf>,
    /// 任一命令失败时以非零状态退出
    #[arg(long)]
    strict: bool,
    /// 命令脚本；省略时从标准输入读取
    script: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = load_configuration(cli.config);
    init_logging(&config);
    info!("启动 baloneo");

    match baloneo_frontend::run_script(&config, cli.script.as_deref()) {
        Ok(report) if cli.strict && report.failed > 0 => {
            warn!(failed = report.failed, "存在失败的命令");
            ExitCode::from(2)
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "执行脚本失败");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. }
                    | ConfigError::Parse { path, .. }
                    | ConfigError::Invalid { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
