use baloneo_core::annotation::PageAnnotationState;
use baloneo_core::document::Document;
use baloneo_core::geometry::{CoordinateTransformer, Point2, Rotation};
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::manifest::Manifest;
use crate::render::{CircleStyle, DrawCommand, PageCanvas, RenderError, Rgb, TextStyle};

/// 标签字号与气球页面半径之比。
pub const LABEL_SCALE: f64 = 1.2;

/// 一次投影的结果。`failures` 为绘制失败但被跳过的指令数。
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub commands: Vec<DrawCommand>,
    pub failures: usize,
    pub manifest: Manifest,
}

impl Projection {
    /// 成功绘制的气球数量。
    pub fn balloons_drawn(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, DrawCommand::Circle { .. }))
            .count()
    }
}

/// 把各页保存的气球从渲染空间投影回页面原生空间并生成绘制指令。
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportProjector {
    transformer: CoordinateTransformer,
    circle_style: CircleStyle,
}

impl ExportProjector {
    pub fn new(transformer: CoordinateTransformer) -> Self {
        Self {
            transformer,
            circle_style: CircleStyle::BALLOON,
        }
    }

    pub fn with_render_zoom(render_zoom: f64) -> Self {
        Self::new(CoordinateTransformer::new(render_zoom))
    }

    #[inline]
    pub fn transformer(&self) -> &CoordinateTransformer {
        &self.transformer
    }

    /// 任何已保存页面超出协作者页数时整体失败，不做任何修改。
    pub fn validate<C: PageCanvas + ?Sized>(
        &self,
        document: &Document,
        canvas: &C,
    ) -> Result<(), RenderError> {
        let page_count = canvas.page_count();
        if let Some((index, _)) = document
            .pages()
            .iter()
            .find(|(index, _)| *index >= page_count)
        {
            return Err(RenderError::PageOutOfRange { index, page_count });
        }
        Ok(())
    }

    /// 把会话中记录的页面旋转写入页面几何。
    pub fn apply_rotations<C: PageCanvas + ?Sized>(
        &self,
        document: &Document,
        canvas: &mut C,
    ) -> Result<(), RenderError> {
        self.validate(document, &*canvas)?;
        for (index, state) in document.pages().iter() {
            if canvas.rotation(index)? != state.rotation() {
                canvas.set_rotation(index, state.rotation())?;
                debug!(page = index, rotation = state.rotation().degrees(), "已应用页面旋转");
            }
        }
        Ok(())
    }

    /// 只计算绘制指令，不写入协作者（旋转除外）。
    pub fn plan<C: PageCanvas + ?Sized>(
        &self,
        document: &Document,
        canvas: &mut C,
    ) -> Result<Vec<DrawCommand>, RenderError> {
        self.apply_rotations(document, canvas)?;
        let mut commands = Vec::new();
        for (index, state) in document.pages().annotated_pages() {
            self.plan_page(index, state, &*canvas, &mut commands)?;
        }
        Ok(commands)
    }

    fn plan_page<C: PageCanvas + ?Sized>(
        &self,
        page: usize,
        state: &PageAnnotationState,
        canvas: &C,
        commands: &mut Vec<DrawCommand>,
    ) -> Result<(), RenderError> {
        // 使用导出时的页面旋转，而不是气球创建时的旋转
        let rotation = state.rotation();
        let displayed = canvas.page_size(page)?;

        for balloon in state.balloons() {
            let center = self
                .transformer
                .to_page_space(balloon.render, rotation, displayed);
            let radius = self.transformer.page_radius(balloon.diameter);
            debug!(
                page,
                number = balloon.number,
                x = center.x(),
                y = center.y(),
                radius,
                "气球投影"
            );

            let text = balloon.number.to_string();
            let font_size = radius * LABEL_SCALE;
            let origin = label_origin(
                center,
                rotation,
                canvas.text_width(&text, font_size),
                font_size,
            );

            commands.push(DrawCommand::Circle {
                page,
                center,
                radius,
                style: self.circle_style,
            });
            commands.push(DrawCommand::Text {
                page,
                origin,
                text,
                style: TextStyle {
                    font_size,
                    color: Rgb::WHITE,
                    rotation,
                },
            });
        }
        Ok(())
    }

    /// 规划并执行全部绘制指令，同时生成清单。
    ///
    /// 页面越界在绘制前整体失败；单个圆或标签的绘制错误只记录日志并计数。
    pub fn project<C: PageCanvas + ?Sized>(
        &self,
        document: &Document,
        canvas: &mut C,
        generated_at: NaiveDateTime,
    ) -> Result<Projection, RenderError> {
        let planned = self.plan(document, canvas)?;
        let mut commands = Vec::with_capacity(planned.len());
        let mut failures = 0;

        for command in planned {
            match canvas.execute(&command) {
                Ok(()) => commands.push(command),
                Err(err) => {
                    failures += 1;
                    warn!(page = command.page(), error = %err, "绘制气球失败，已跳过");
                }
            }
        }

        let manifest = Manifest::from_document(document, generated_at);
        info!(
            drawn = commands.len(),
            failures,
            records = manifest.len(),
            "导出投影完成"
        );
        Ok(Projection {
            commands,
            failures,
            manifest,
        })
    }
}

/// 标签基线起点：在旋转后的页面中看来居中于圆心。
pub fn label_origin(center: Point2, rotation: Rotation, text_width: f64, text_height: f64) -> Point2 {
    let (x, y) = (center.x(), center.y());
    let half_w = text_width / 2.0;
    let third_h = text_height / 3.0;
    match rotation {
        Rotation::Deg0 => Point2::new(x - half_w, y + third_h),
        Rotation::Deg90 => Point2::new(x + third_h, y + half_w),
        Rotation::Deg180 => Point2::new(x + half_w, y - third_h),
        Rotation::Deg270 => Point2::new(x - third_h, y - half_w),
    }
}
