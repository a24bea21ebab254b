use std::io::{BufRead, Write};
use std::path::PathBuf;

use baloneo_config::AppConfig;
use baloneo_engine::command::{
    CommandBus, CommandContext, CommandHandler, CommandRequest, CommandResponse,
};
use baloneo_engine::session::Session;
use baloneo_io::PdfFacade;
use baloneo_io::export::{self, ExportError, Exporter, default_output_path};
use tracing::{debug, info, warn};

use crate::errors::FrontendError;
use crate::loader::{open_into_session, session_settings};

/// 脚本执行统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShellReport {
    pub executed: usize,
    pub failed: usize,
}

/// 行式命令外壳：每行一条命令，`#` 开头为注释。
pub struct Shell {
    bus: CommandBus,
    session: Session,
}

impl Shell {
    pub fn new(config: &AppConfig) -> Self {
        let mut bus = CommandBus::new();
        bus.register(OpenCommand);
        bus.register(ExportCommand {
            exporter: Exporter::with_render_zoom(config.render.zoom),
            suffix: config.export.suffix.clone(),
        });
        bus.register(ManifestCommand);
        Self {
            bus,
            session: Session::new(session_settings(config)),
        }
    }

    #[inline]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn available_commands(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.bus.available_commands().copied().collect();
        names.sort_unstable();
        names
    }

    /// 执行一行；空行与注释返回 `None`。
    pub fn execute_line(&mut self, line: &str) -> Option<CommandResponse> {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            return None;
        }
        let request = CommandRequest::parse_line(trimmed)?;
        if request.name == "help" {
            return Some(CommandResponse::ok(format!(
                "支持的命令: {}",
                self.available_commands().join(", ")
            )));
        }
        let mut context = CommandContext {
            session: &mut self.session,
        };
        let response = self.bus.dispatch(&request, &mut context);
        if response.success {
            debug!(command = %request.name, "命令执行成功");
        } else {
            warn!(
                command = %request.name,
                message = response.message.as_deref().unwrap_or_default(),
                "命令执行失败"
            );
        }
        Some(response)
    }

    /// 逐行执行脚本并把结果写到 `out`。失败的命令不会中断脚本。
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        input: R,
        out: &mut W,
    ) -> Result<ShellReport, FrontendError> {
        let mut report = ShellReport::default();
        for line in input.lines() {
            let line = line.map_err(FrontendError::Input)?;
            let Some(response) = self.execute_line(&line) else {
                continue;
            };
            report.executed += 1;
            let message = response.message.unwrap_or_default();
            let written = if response.success {
                writeln!(out, "[命令] {message}")
            } else {
                report.failed += 1;
                writeln!(out, "[错误] {message}")
            };
            written.map_err(FrontendError::Output)?;
        }
        info!(executed = report.executed, failed = report.failed, "脚本执行完毕");
        Ok(report)
    }
}

/// `open <pdf>`
struct OpenCommand;

impl CommandHandler for OpenCommand {
    fn name(&self) -> &'static str {
        "open"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let path = PathBuf::from(request.rest(0));
        if path.as_os_str().is_empty() {
            return CommandResponse::err("open 缺少参数: path");
        }
        match open_into_session(context.session, &PdfFacade::new(), &path) {
            Ok(summary) => CommandResponse::ok(format!(
                "已打开 {}，共 {} 页",
                summary.source, summary.page_count
            )),
            Err(err) => CommandResponse::err(format!("无法打开文档: {err}")),
        }
    }
}

/// `export [path]`，省略路径时写到源文件旁。
struct ExportCommand {
    exporter: Exporter,
    suffix: String,
}

impl CommandHandler for ExportCommand {
    fn name(&self) -> &'static str {
        "export"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let document = context.session.commit().ok();
        let target = match request.rest(0) {
            path if !path.is_empty() => PathBuf::from(path),
            _ => match document {
                Some(document) => default_output_path(document.source_path(), &self.suffix),
                None => return export_failure(ExportError::NoDocument),
            },
        };
        match self.exporter.export_annotated(document, &target) {
            Ok(summary) => {
                let mut message = format!(
                    "已导出 PDF: {}，清单: {}，{} 个气球，{} 条尺寸",
                    summary.pdf_path.display(),
                    summary.manifest_path.display(),
                    summary.balloons,
                    summary.records
                );
                if summary.failures > 0 {
                    message.push_str(&format!("（{} 个标签绘制失败）", summary.failures));
                }
                CommandResponse::ok(message)
            }
            Err(err) => export_failure(err),
        }
    }
}

/// `manifest <path>`
struct ManifestCommand;

impl CommandHandler for ManifestCommand {
    fn name(&self) -> &'static str {
        "manifest"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let path = PathBuf::from(request.rest(0));
        if path.as_os_str().is_empty() {
            return CommandResponse::err("manifest 缺少参数: path");
        }
        let document = context.session.commit().ok();
        match export::export_manifest(document, &path) {
            Ok(manifest) => CommandResponse::ok(format!(
                "已导出清单 {}，{} 条尺寸，{}",
                path.display(),
                manifest.len(),
                manifest.created_at
            )),
            Err(err) => export_failure(err),
        }
    }
}

fn export_failure(err: ExportError) -> CommandResponse {
    let message = match err {
        ExportError::NoDocument => "没有打开的 PDF，请先打开文档".to_string(),
        ExportError::NoDimensions => "没有可导出的尺寸，请至少添加一个气球".to_string(),
        other => format!("导出失败: {other}"),
    };
    CommandResponse::err(message)
}
