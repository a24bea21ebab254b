use baloneo_core::geometry::{CoordinateTransformer, PageSize, Point2, Rotation};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("page {index} out of range (document has {page_count} pages)")]
    PageOutOfRange { index: usize, page_count: usize },
    #[error("render backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(1.0, 1.0, 1.0);
    /// 气球描边与填充使用的强调色。
    pub const ACCENT: Rgb = Rgb::new(0.0, 0.47, 0.84);

    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleStyle {
    pub stroke: Rgb,
    pub fill: Rgb,
    pub stroke_width: f64,
    /// 仅作用于填充，描边保持不透明。
    pub fill_opacity: f64,
}

impl CircleStyle {
    pub const BALLOON: CircleStyle = CircleStyle {
        stroke: Rgb::ACCENT,
        fill: Rgb::ACCENT,
        stroke_width: 2.5,
        fill_opacity: 0.4,
    };
}

impl Default for CircleStyle {
    fn default() -> Self {
        Self::BALLOON
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font_size: f64,
    pub color: Rgb,
    /// 文字相对未旋转页面的逆时针旋转角，与页面旋转相同时在显示中保持正向。
    pub rotation: Rotation,
}

/// 导出阶段生成的绘制指令，坐标位于页面原生空间（左上角为原点，y 向下）。
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Circle {
        page: usize,
        center: Point2,
        radius: f64,
        style: CircleStyle,
    },
    Text {
        page: usize,
        origin: Point2,
        text: String,
        style: TextStyle,
    },
}

impl DrawCommand {
    #[inline]
    pub fn page(&self) -> usize {
        match self {
            DrawCommand::Circle { page, .. } | DrawCommand::Text { page, .. } => *page,
        }
    }
}

/// 导出时的页面绘制协作者。
pub trait PageCanvas {
    fn page_count(&self) -> usize;

    fn rotation(&self, page: usize) -> Result<Rotation, RenderError>;

    fn set_rotation(&mut self, page: usize, rotation: Rotation) -> Result<(), RenderError>;

    /// 已反映旋转的显示宽高。
    fn page_size(&self, page: usize) -> Result<PageSize, RenderError>;

    fn draw_circle(
        &mut self,
        page: usize,
        center: Point2,
        radius: f64,
        style: &CircleStyle,
    ) -> Result<(), RenderError>;

    fn insert_text(
        &mut self,
        page: usize,
        origin: Point2,
        text: &str,
        style: &TextStyle,
    ) -> Result<(), RenderError>;

    fn text_width(&self, text: &str, font_size: f64) -> f64 {
        helvetica_width(text, font_size)
    }

    fn execute(&mut self, command: &DrawCommand) -> Result<(), RenderError> {
        match command {
            DrawCommand::Circle {
                page,
                center,
                radius,
                style,
            } => self.draw_circle(*page, *center, *radius, style),
            DrawCommand::Text {
                page,
                origin,
                text,
                style,
            } => self.insert_text(*page, *origin, text, style),
        }
    }
}

/// Helvetica 字宽（千分之一 em）。只覆盖气球编号与常见 ASCII 标点。
fn helvetica_advance(ch: char) -> u32 {
    match ch {
        '0'..='9' => 556,
        ' ' | '.' | ',' | '/' => 278,
        '-' => 333,
        '#' | '$' => 556,
        'A'..='Z' => 667,
        _ => 556,
    }
}

pub fn helvetica_width(text: &str, font_size: f64) -> f64 {
    let units: u32 = text.chars().map(helvetica_advance).sum();
    f64::from(units) * font_size / 1000.0
}

/// 内存中的画布：记录绘制指令而不产生文件，用于预览与测试。
#[derive(Debug, Clone, Default)]
pub struct RecordingCanvas {
    pages: Vec<(PageSize, Rotation)>,
    commands: Vec<DrawCommand>,
    failing_text: Option<String>,
}

impl RecordingCanvas {
    /// `native_sizes` 为各页未旋转时的宽高。
    pub fn new(native_sizes: impl IntoIterator<Item = PageSize>) -> Self {
        Self {
            pages: native_sizes
                .into_iter()
                .map(|size| (size, Rotation::Deg0))
                .collect(),
            commands: Vec::new(),
            failing_text: None,
        }
    }

    /// 插入指定文字时返回错误，模拟单个标签绘制失败。
    pub fn with_failing_text(mut self, text: impl Into<String>) -> Self {
        self.failing_text = Some(text.into());
        self
    }

    #[inline]
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    fn page(&self, page: usize) -> Result<&(PageSize, Rotation), RenderError> {
        self.pages.get(page).ok_or(RenderError::PageOutOfRange {
            index: page,
            page_count: self.pages.len(),
        })
    }
}

impl PageCanvas for RecordingCanvas {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn rotation(&self, page: usize) -> Result<Rotation, RenderError> {
        self.page(page).map(|(_, rotation)| *rotation)
    }

    fn set_rotation(&mut self, page: usize, rotation: Rotation) -> Result<(), RenderError> {
        let page_count = self.pages.len();
        let entry = self
            .pages
            .get_mut(page)
            .ok_or(RenderError::PageOutOfRange {
                index: page,
                page_count,
            })?;
        entry.1 = rotation;
        Ok(())
    }

    fn page_size(&self, page: usize) -> Result<PageSize, RenderError> {
        let (native, rotation) = self.page(page)?;
        // 原生 -> 显示与显示 -> 原生都是同一次交换
        Ok(CoordinateTransformer::native_size(*rotation, *native))
    }

    fn draw_circle(
        &mut self,
        page: usize,
        center: Point2,
        radius: f64,
        style: &CircleStyle,
    ) -> Result<(), RenderError> {
        self.page(page)?;
        self.commands.push(DrawCommand::Circle {
            page,
            center,
            radius,
            style: *style,
        });
        Ok(())
    }

    fn insert_text(
        &mut self,
        page: usize,
        origin: Point2,
        text: &str,
        style: &TextStyle,
    ) -> Result<(), RenderError> {
        self.page(page)?;
        if self.failing_text.as_deref() == Some(text) {
            return Err(RenderError::Backend(format!("cannot insert text {text:?}")));
        }
        self.commands.push(DrawCommand::Text {
            page,
            origin,
            text: text.to_string(),
            style: *style,
        });
        Ok(())
    }
}
