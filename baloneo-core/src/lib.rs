pub mod annotation;
pub mod document;
pub mod store;

pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    /// 页面栅格化时使用的默认缩放倍数。
    pub const DEFAULT_RENDER_ZOOM: f64 = 2.0;

    /// 二维点，内部以 `glam::DVec2` 表示。渲染空间与页面空间共用该类型。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 页面尺寸（单位：PDF 点）。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct PageSize {
        pub width: f64,
        pub height: f64,
    }

    impl PageSize {
        #[inline]
        pub fn new(width: f64, height: f64) -> Self {
            Self { width, height }
        }

        /// 宽高互换后的尺寸。
        #[inline]
        pub fn swapped(self) -> Self {
            Self {
                width: self.height,
                height: self.width,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
    #[error("rotation must be a multiple of 90 degrees, got {0}")]
    pub struct RotationError(pub i64);

    /// 页面旋转角，仅支持 90° 步进（顺时针）。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(try_from = "i64", into = "i64")]
    pub enum Rotation {
        #[default]
        Deg0,
        Deg90,
        Deg180,
        Deg270,
    }

    impl Rotation {
        pub const ALL: [Rotation; 4] = [
            Rotation::Deg0,
            Rotation::Deg90,
            Rotation::Deg180,
            Rotation::Deg270,
        ];

        #[inline]
        pub fn degrees(self) -> i64 {
            match self {
                Rotation::Deg0 => 0,
                Rotation::Deg90 => 90,
                Rotation::Deg180 => 180,
                Rotation::Deg270 => 270,
            }
        }

        /// 接受任意 90 的整数倍（含负数），归一化到 [0, 360)。
        pub fn from_degrees(degrees: i64) -> Result<Self, RotationError> {
            if degrees % 90 != 0 {
                return Err(RotationError(degrees));
            }
            Ok(match degrees.rem_euclid(360) {
                0 => Rotation::Deg0,
                90 => Rotation::Deg90,
                180 => Rotation::Deg180,
                _ => Rotation::Deg270,
            })
        }

        /// 顺时针再转 90°（0 -> 90 -> 180 -> 270 -> 0）。
        #[inline]
        pub fn rotated_cw(self) -> Self {
            match self {
                Rotation::Deg0 => Rotation::Deg90,
                Rotation::Deg90 => Rotation::Deg180,
                Rotation::Deg180 => Rotation::Deg270,
                Rotation::Deg270 => Rotation::Deg0,
            }
        }

        /// 90°/270° 时显示尺寸与原生尺寸宽高互换。
        #[inline]
        pub fn swaps_axes(self) -> bool {
            matches!(self, Rotation::Deg90 | Rotation::Deg270)
        }

        #[inline]
        pub fn radians(self) -> f64 {
            (self.degrees() as f64).to_radians()
        }
    }

    impl TryFrom<i64> for Rotation {
        type Error = RotationError;

        fn try_from(value: i64) -> Result<Self, Self::Error> {
            Rotation::from_degrees(value)
        }
    }

    impl From<Rotation> for i64 {
        fn from(value: Rotation) -> Self {
            value.degrees()
        }
    }

    /// 渲染空间（缩放、可能旋转后的栅格像素坐标，y 向下）到页面原生坐标的转换。
    ///
    /// 只需要正向转换：气球总是在当前渲染空间中创建并以渲染坐标保存，
    /// 导出时逐个投影一次。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct CoordinateTransformer {
        render_zoom: f64,
    }

    impl CoordinateTransformer {
        /// 非有限或非正的缩放值回退到 [`DEFAULT_RENDER_ZOOM`]。
        pub fn new(render_zoom: f64) -> Self {
            let render_zoom = if render_zoom.is_finite() && render_zoom > 0.0 {
                render_zoom
            } else {
                DEFAULT_RENDER_ZOOM
            };
            Self { render_zoom }
        }

        #[inline]
        pub fn render_zoom(&self) -> f64 {
            self.render_zoom
        }

        /// 由旋转后的显示尺寸推导旋转前的原生尺寸。
        #[inline]
        pub fn native_size(rotation: Rotation, displayed: PageSize) -> PageSize {
            if rotation.swaps_axes() {
                displayed.swapped()
            } else {
                displayed
            }
        }

        /// 渲染坐标 -> 页面原生坐标。`displayed` 为已反映旋转的页面宽高。
        pub fn to_page_space(&self, render: Point2, rotation: Rotation, displayed: PageSize) -> Point2 {
            let sx = render.x() / self.render_zoom;
            let sy = render.y() / self.render_zoom;
            let page_w = displayed.width;
            let page_h = displayed.height;

            match rotation {
                Rotation::Deg0 => Point2::new(sx, sy),
                Rotation::Deg90 => Point2::new(sy, page_w - sx),
                Rotation::Deg180 => Point2::new(page_w - sx, page_h - sy),
                Rotation::Deg270 => Point2::new(page_h - sy, sx),
            }
        }

        /// 气球半径只受缩放影响，与旋转无关。
        #[inline]
        pub fn page_radius(&self, diameter: f64) -> f64 {
            (diameter / 2.0) / self.render_zoom
        }
    }

    impl Default for CoordinateTransformer {
        fn default() -> Self {
            Self::new(DEFAULT_RENDER_ZOOM)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const EPS: f64 = 1e-9;

        fn assert_point(actual: Point2, x: f64, y: f64) {
            assert!(
                (actual.x() - x).abs() < EPS && (actual.y() - y).abs() < EPS,
                "expected ({x}, {y}), got ({}, {})",
                actual.x(),
                actual.y()
            );
        }

        #[test]
        fn unrotated_projection_only_removes_zoom() {
            for zoom in [0.5, 1.0, 2.0, 3.75] {
                let transformer = CoordinateTransformer::new(zoom);
                for (x, y) in [(0.0, 0.0), (120.0, 80.0), (-3.5, 1e6)] {
                    for size in [PageSize::new(300.0, 400.0), PageSize::new(1.0, 2.0)] {
                        let projected =
                            transformer.to_page_space(Point2::new(x, y), Rotation::Deg0, size);
                        assert_eq!(projected, Point2::new(x / zoom, y / zoom));
                    }
                }
            }
        }

        #[test]
        fn click_on_unrotated_page() {
            let transformer = CoordinateTransformer::new(2.0);
            let projected = transformer.to_page_space(
                Point2::new(120.0, 80.0),
                Rotation::Deg0,
                PageSize::new(300.0, 400.0),
            );
            assert_point(projected, 60.0, 40.0);
        }

        #[test]
        fn click_on_page_rotated_90() {
            let transformer = CoordinateTransformer::new(2.0);
            let displayed = PageSize::new(400.0, 300.0);
            let projected =
                transformer.to_page_space(Point2::new(120.0, 80.0), Rotation::Deg90, displayed);
            assert_point(projected, 40.0, 340.0);
            assert_eq!(
                CoordinateTransformer::native_size(Rotation::Deg90, displayed),
                PageSize::new(300.0, 400.0)
            );
        }

        #[test]
        fn half_turn_and_three_quarter_turn_cases() {
            let transformer = CoordinateTransformer::new(1.0);
            let displayed = PageSize::new(300.0, 400.0);
            let p = Point2::new(10.0, 20.0);
            assert_point(
                transformer.to_page_space(p, Rotation::Deg180, displayed),
                290.0,
                380.0,
            );
            assert_point(
                transformer.to_page_space(p, Rotation::Deg270, displayed),
                380.0,
                10.0,
            );
        }

        #[test]
        fn four_quarter_turns_return_to_start() {
            let transformer = CoordinateTransformer::new(1.0);
            let start = Point2::new(37.25, 112.5);
            let mut point = start;
            let mut size = PageSize::new(595.0, 842.0);
            for _ in 0..4 {
                point = transformer.to_page_space(point, Rotation::Deg90, size);
                size = size.swapped();
            }
            assert_point(point, start.x(), start.y());
        }

        #[test]
        fn radius_ignores_rotation() {
            let transformer = CoordinateTransformer::new(2.0);
            assert!((transformer.page_radius(35.0) - 8.75).abs() < EPS);
        }

        #[test]
        fn invalid_zoom_falls_back_to_default() {
            assert_eq!(CoordinateTransformer::new(0.0).render_zoom(), DEFAULT_RENDER_ZOOM);
            assert_eq!(
                CoordinateTransformer::new(f64::NAN).render_zoom(),
                DEFAULT_RENDER_ZOOM
            );
        }

        #[test]
        fn rotation_normalizes_degrees() {
            assert_eq!(Rotation::from_degrees(450), Ok(Rotation::Deg90));
            assert_eq!(Rotation::from_degrees(-90), Ok(Rotation::Deg270));
            assert_eq!(Rotation::from_degrees(45), Err(RotationError(45)));
            let mut r = Rotation::Deg0;
            for _ in 0..4 {
                r = r.rotated_cw();
            }
            assert_eq!(r, Rotation::Deg0);
        }
    }
}

pub mod numeric {
    use thiserror::Error;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum NumericError {
        #[error("empty value")]
        Empty,
        #[error("invalid number: {0:?}")]
        InvalidNumber(String),
        #[error("invalid fraction: {0:?}")]
        InvalidFraction(String),
        #[error("zero denominator in {0:?}")]
        ZeroDenominator(String),
    }

    /// 解析用户输入的公称值/公差：小数、分数（`3/4`）或带分数（`1 1/2`）。
    /// 任何错误都回退为 `0.0`。
    pub fn parse(text: &str) -> f64 {
        try_parse(text).unwrap_or(0.0)
    }

    pub fn try_parse(text: &str) -> Result<f64, NumericError> {
        let value = text.trim();
        if value.is_empty() {
            return Err(NumericError::Empty);
        }

        if value.contains('/') {
            if value.contains(' ') {
                let mut parts = value.split_whitespace();
                let whole = parts.next().ok_or(NumericError::Empty)?;
                let fraction = parts
                    .next()
                    .ok_or_else(|| NumericError::InvalidFraction(value.to_string()))?;
                Ok(parse_decimal(whole)? + parse_fraction(fraction)?)
            } else {
                parse_fraction(value)
            }
        } else {
            parse_decimal(value)
        }
    }

    fn parse_decimal(raw: &str) -> Result<f64, NumericError> {
        raw.parse::<f64>()
            .map_err(|_| NumericError::InvalidNumber(raw.to_string()))
    }

    // 整数分子/整数分母，分子可带符号；也接受不含 `/` 的整数或小数。
    fn parse_fraction(raw: &str) -> Result<f64, NumericError> {
        let Some((numerator, denominator)) = raw.split_once('/') else {
            return parse_decimal(raw);
        };
        let invalid = || NumericError::InvalidFraction(raw.to_string());

        let numerator = numerator.trim();
        let denominator = denominator.trim();
        let digits = numerator.strip_prefix(['+', '-']).unwrap_or(numerator);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if denominator.is_empty() || !denominator.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let numerator: f64 = numerator.parse().map_err(|_| invalid())?;
        let denominator: f64 = denominator.parse().map_err(|_| invalid())?;
        if denominator == 0.0 {
            return Err(NumericError::ZeroDenominator(raw.to_string()));
        }
        Ok(numerator / denominator)
    }

}
