use std::collections::HashMap;
use std::str::FromStr;

use baloneo_core::annotation::{RecordField, Unit};

use crate::session::Session;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
    /// 命令名之后的原始文本，用于 [`CommandRequest::rest`]。
    raw_args: String,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        let raw_args = args.join(" ");
        Self {
            name: name.into(),
            args,
            raw_args,
        }
    }

    /// 解析一行文本：首个词为命令名，其余为参数。空行返回 `None`。
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let name_end = line.find(char::is_whitespace).unwrap_or(line.len());
        let (name, raw_args) = line.split_at(name_end);
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            args: raw_args.split_whitespace().map(str::to_string).collect(),
            raw_args: raw_args.trim().to_string(),
        })
    }

    /// 取第 `index` 个参数并解析为目标类型，失败时返回可直接展示的错误响应。
    pub fn arg<T: FromStr>(&self, index: usize, what: &str) -> Result<T, CommandResponse> {
        let raw = self
            .args
            .get(index)
            .ok_or_else(|| CommandResponse::err(format!("{} 缺少参数: {what}", self.name)))?;
        raw.parse()
            .map_err(|_| CommandResponse::err(format!("{} 参数无效: {what}={raw}", self.name)))
    }

    /// 第 `index` 个参数起的原始剩余文本，内部空白原样保留（如 `1 1/2`）。
    pub fn rest(&self, index: usize) -> String {
        let mut remaining = self.raw_args.as_str();
        for _ in 0..index {
            remaining = remaining.trim_start();
            match remaining.find(char::is_whitespace) {
                Some(end) => remaining = &remaining[end..],
                None => return String::new(),
            }
        }
        remaining.trim().to_string()
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// 将处理结果（含错误）统一为一条响应。
fn respond(result: Result<CommandResponse, CommandResponse>) -> CommandResponse {
    result.unwrap_or_else(|response| response)
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub session: &'a mut Session,
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(ClickCommand);
        bus.register(RotateCommand);
        bus.register(NextPageCommand);
        bus.register(PrevPageCommand);
        bus.register(GoToPageCommand);
        bus.register(UndoCommand);
        bus.register(DeleteRowCommand);
        bus.register(ClearCommand);
        bus.register(UnitCommand);
        bus.register(SetFieldCommand);
        bus.register(StatusCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

/// `click <x> <y> [page]`
struct ClickCommand;

impl CommandHandler for ClickCommand {
    fn name(&self) -> &'static str {
        "click"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        respond(Self::run(request, context))
    }
}

impl ClickCommand {
    fn run(
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> Result<CommandResponse, CommandResponse> {
        let x: f64 = request.arg(0, "x")?;
        let y: f64 = request.arg(1, "y")?;
        if !(x.is_finite() && y.is_finite()) {
            return Err(CommandResponse::err(format!(
                "click 坐标必须是有限数值: ({x}, {y})"
            )));
        }
        let result = if request.args.len() > 2 {
            let page: usize = request.arg(2, "page")?;
            context.session.click_on_page(page, x, y)
        } else {
            context.session.click(x, y)
        };
        let balloon = result.map_err(|err| CommandResponse::err(err.to_string()))?;
        Ok(CommandResponse::ok(format!(
            "已放置气球 #{} ({:.1}, {:.1})",
            balloon.number,
            balloon.render.x(),
            balloon.render.y()
        )))
    }
}

struct RotateCommand;

impl CommandHandler for RotateCommand {
    fn name(&self) -> &'static str {
        "rotate"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.session.rotate() {
            Ok(rotation) => CommandResponse::ok(format!("页面旋转为 {}°", rotation.degrees())),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

fn page_message(session: &Session) -> String {
    format!("第 {}/{} 页", session.current_page() + 1, session.page_count())
}

struct NextPageCommand;

impl CommandHandler for NextPageCommand {
    fn name(&self) -> &'static str {
        "next"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.session.next_page() {
            Ok(true) => CommandResponse::ok(page_message(context.session)),
            Ok(false) => CommandResponse::ok(format!("已是最后一页（{}）", page_message(context.session))),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct PrevPageCommand;

impl CommandHandler for PrevPageCommand {
    fn name(&self) -> &'static str {
        "prev"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.session.prev_page() {
            Ok(true) => CommandResponse::ok(page_message(context.session)),
            Ok(false) => CommandResponse::ok(format!("已是第一页（{}）", page_message(context.session))),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

/// `page <index>`，索引从 0 开始。
struct GoToPageCommand;

impl CommandHandler for GoToPageCommand {
    fn name(&self) -> &'static str {
        "page"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        respond(Self::run(request, context))
    }
}

impl GoToPageCommand {
    fn run(
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> Result<CommandResponse, CommandResponse> {
        let index: usize = request.arg(0, "index")?;
        context
            .session
            .go_to_page(index)
            .map_err(|err| CommandResponse::err(err.to_string()))?;
        Ok(CommandResponse::ok(page_message(context.session)))
    }
}

struct UndoCommand;

impl CommandHandler for UndoCommand {
    fn name(&self) -> &'static str {
        "undo"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.session.remove_last() {
            Ok(Some(number)) => CommandResponse::ok(format!("已删除气球 #{number}")),
            Ok(None) => CommandResponse::ok("当前页没有气球"),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

/// `delete <row>`，行号从 0 开始。
struct DeleteRowCommand;

impl CommandHandler for DeleteRowCommand {
    fn name(&self) -> &'static str {
        "delete"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        respond(Self::run(request, context))
    }
}

impl DeleteRowCommand {
    fn run(
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> Result<CommandResponse, CommandResponse> {
        let row: usize = request.arg(0, "row")?;
        let balloon = context
            .session
            .delete_row(row)
            .map_err(|err| CommandResponse::err(err.to_string()))?;
        Ok(CommandResponse::ok(format!(
            "已删除第 {row} 行（气球 #{}）",
            balloon.number
        )))
    }
}

struct ClearCommand;

impl CommandHandler for ClearCommand {
    fn name(&self) -> &'static str {
        "clear"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.session.clear_page() {
            Ok(removed) => CommandResponse::ok(format!("已清空 {removed} 个气球")),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

/// `unit mm|in`
struct UnitCommand;

impl CommandHandler for UnitCommand {
    fn name(&self) -> &'static str {
        "unit"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        respond(Self::run(request, context))
    }
}

impl UnitCommand {
    fn run(
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> Result<CommandResponse, CommandResponse> {
        let unit: Unit = request.arg(0, "unit")?;
        context.session.set_unit(unit);
        Ok(CommandResponse::ok(format!("全局单位: {unit}")))
    }
}

/// `set <row> <field> <value...>`
struct SetFieldCommand;

impl CommandHandler for SetFieldCommand {
    fn name(&self) -> &'static str {
        "set"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        respond(Self::run(request, context))
    }
}

impl SetFieldCommand {
    fn run(
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> Result<CommandResponse, CommandResponse> {
        let row: usize = request.arg(0, "row")?;
        let field: RecordField = request.arg(1, "field")?;
        let value = request.rest(2);
        context
            .session
            .edit_record(row, field, &value)
            .map_err(|err| CommandResponse::err(err.to_string()))?;
        Ok(CommandResponse::ok(format!("第 {row} 行已更新")))
    }
}

struct StatusCommand;

impl CommandHandler for StatusCommand {
    fn name(&self) -> &'static str {
        "status"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let session = &*context.session;
        if !session.is_open() {
            return CommandResponse::err("尚未打开文档");
        }
        let model = session.model();
        let mut lines = vec![format!(
            "{}，旋转 {}°，气球 {} 个，单位 {}",
            page_message(session),
            model.rotation().degrees(),
            model.balloon_counter(),
            model.unit()
        )];
        for (balloon, record) in model.state().pairs() {
            lines.push(format!(
                "  #{} ({:.1}, {:.1}) {} nominal={} +{} -{} {} {}",
                balloon.number,
                balloon.render.x(),
                balloon.render.y(),
                record.name,
                record.nominal,
                record.tolerance_plus,
                record.tolerance_minus,
                record.instrument,
                record.unit
            ));
        }
        CommandResponse::ok(lines.join("\n"))
    }
}
