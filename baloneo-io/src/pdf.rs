use std::fs;
use std::path::Path;

use baloneo_core::geometry::{PageSize, Point2, Rotation};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat, dictionary};
use tracing::debug;

use crate::IoError;
use crate::render::{CircleStyle, PageCanvas, RenderError, Rgb, TextStyle};

const FONT_RESOURCE: &str = "FBaloneo";
const OPACITY_RESOURCE: &str = "GSBaloneo";
/// 三次贝塞尔近似四分之一圆的控制点系数。
const KAPPA: f64 = 0.552_284_749_8;
/// MediaBox 缺失时的 A4 尺寸。
const FALLBACK_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 595.0, 842.0];

/// 基于 lopdf 的页面协作者。
///
/// 对外坐标为页面原生空间：以可见区域（CropBox 与 MediaBox 的交集）左上角为原点、
/// y 向下，与渲染时的坐标系一致；写入内容流前翻转到 PDF 用户空间。
///
/// 页面第一次被绘制时，原有内容流包进 `q … Q`，原内容遗留的图形状态不会影响气球。
pub struct PdfDocument {
    inner: lopdf::Document,
    page_ids: Vec<ObjectId>,
    font_id: Option<ObjectId>,
    opacity_ids: Vec<(u32, ObjectId)>,
    isolated_pages: Vec<ObjectId>,
}

impl PdfDocument {
    pub fn load(path: &Path) -> Result<Self, IoError> {
        let bytes = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_mem(&bytes)
            .map_err(|err| IoError::InvalidDocument(format!("{}: {err}", path.display())))
    }

    pub fn load_mem(bytes: &[u8]) -> Result<Self, IoError> {
        let inner = lopdf::Document::load_mem(bytes).map_err(|err| IoError::Pdf(err.to_string()))?;
        Self::from_document(inner)
    }

    pub fn from_document(inner: lopdf::Document) -> Result<Self, IoError> {
        let page_ids: Vec<ObjectId> = inner.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(IoError::InvalidDocument("document has no pages".into()));
        }
        Ok(Self {
            inner,
            page_ids,
            font_id: None,
            opacity_ids: Vec::new(),
            isolated_pages: Vec::new(),
        })
    }

    #[inline]
    pub fn inner(&self) -> &lopdf::Document {
        &self.inner
    }

    pub fn save(&mut self, path: &Path) -> Result<(), IoError> {
        let bytes = self.save_to_vec()?;
        fs::write(path, bytes).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to_vec(&mut self) -> Result<Vec<u8>, IoError> {
        let mut buffer = Vec::new();
        self.inner
            .save_to(&mut buffer)
            .map_err(|err| IoError::Pdf(err.to_string()))?;
        Ok(buffer)
    }

    fn page_id(&self, page: usize) -> Result<ObjectId, RenderError> {
        self.page_ids
            .get(page)
            .copied()
            .ok_or(RenderError::PageOutOfRange {
                index: page,
                page_count: self.page_ids.len(),
            })
    }

    fn dictionary(&self, id: ObjectId) -> Result<&Dictionary, RenderError> {
        self.inner
            .get_object(id)
            .and_then(Object::as_dict)
            .map_err(backend)
    }

    fn resolve<'a>(&'a self, object: &'a Object) -> Option<&'a Object> {
        match object {
            Object::Reference(id) => self.inner.get_object(*id).ok(),
            other => Some(other),
        }
    }

    /// 沿 Parent 链查找可继承的页面属性。
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut current = Some(page_id);
        while let Some(id) = current {
            let dict = self.dictionary(id).ok()?;
            if let Ok(value) = dict.get(key) {
                return self.resolve(value);
            }
            current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        }
        None
    }

    /// 规范化为 `[左, 下, 右, 上]` 的页面矩形。
    fn rectangle(&self, page_id: ObjectId, key: &[u8]) -> Option<[f64; 4]> {
        let values = self
            .inherited(page_id, key)
            .and_then(|object| object.as_array().ok())
            .filter(|values| values.len() == 4)?;
        let mut raw = [0.0; 4];
        for (slot, value) in raw.iter_mut().zip(values) {
            *slot = number(self.resolve(value)?)?;
        }
        let [x0, y0, x1, y1] = raw;
        Some([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)])
    }

    fn media_box(&self, page_id: ObjectId) -> [f64; 4] {
        self.rectangle(page_id, b"MediaBox").unwrap_or_else(|| {
            debug!(?page_id, "页面缺少 MediaBox，使用 A4");
            FALLBACK_MEDIA_BOX
        })
    }

    /// 查看器显示的区域：CropBox 裁到 MediaBox 内，缺失或为空时退回 MediaBox。
    fn visible_box(&self, page_id: ObjectId) -> [f64; 4] {
        let media = self.media_box(page_id);
        let Some(crop) = self.rectangle(page_id, b"CropBox") else {
            return media;
        };
        let clipped = [
            crop[0].max(media[0]),
            crop[1].max(media[1]),
            crop[2].min(media[2]),
            crop[3].min(media[3]),
        ];
        if clipped[0] < clipped[2] && clipped[1] < clipped[3] {
            clipped
        } else {
            debug!(?page_id, "CropBox 与 MediaBox 不相交，使用 MediaBox");
            media
        }
    }

    fn native_size(&self, page_id: ObjectId) -> PageSize {
        let [llx, lly, urx, ury] = self.visible_box(page_id);
        PageSize::new(urx - llx, ury - lly)
    }

    /// 原生空间（y 向下）-> PDF 用户空间（y 向上）。
    fn to_user_space(&self, page_id: ObjectId, point: Point2) -> (f64, f64) {
        let [llx, _, _, ury] = self.visible_box(page_id);
        (llx + point.x(), ury - point.y())
    }

    fn font_id(&mut self) -> ObjectId {
        if let Some(id) = self.font_id {
            return id;
        }
        let id = self.inner.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        self.font_id = Some(id);
        id
    }

    fn opacity_state(&mut self, opacity: f64) -> (String, ObjectId) {
        let key = (opacity.clamp(0.0, 1.0) * 1000.0).round() as u32;
        let name = format!("{OPACITY_RESOURCE}{key}");
        if let Some((_, id)) = self.opacity_ids.iter().find(|(k, _)| *k == key) {
            return (name, *id);
        }
        let id = self.inner.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => Object::Real(key as f32 / 1000.0),
        });
        self.opacity_ids.push((key, id));
        (name, id)
    }

    /// 把页面（含继承）的资源字典复制到页面本身并登记一项资源。
    fn register_resource(
        &mut self,
        page_id: ObjectId,
        category: &[u8],
        name: &str,
        id: ObjectId,
    ) -> Result<(), RenderError> {
        let mut resources = self
            .inherited(page_id, b"Resources")
            .and_then(|object| object.as_dict().ok())
            .cloned()
            .unwrap_or_default();
        let mut entries = resources
            .get(category)
            .ok()
            .and_then(|object| self.resolve(object))
            .and_then(|object| object.as_dict().ok())
            .cloned()
            .unwrap_or_default();
        entries.set(name, id);
        resources.set(category, entries);

        self.inner
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(backend)?
            .set("Resources", resources);
        Ok(())
    }

    /// 页面原有内容流前后各加一个只含 `q` / `Q` 的流，每页只做一次。
    fn isolate_existing_content(&mut self, page_id: ObjectId) -> Result<(), RenderError> {
        if self.isolated_pages.contains(&page_id) {
            return Ok(());
        }
        let existing = match self.dictionary(page_id)?.get(b"Contents") {
            Ok(Object::Reference(id)) => match self.inner.get_object(*id) {
                Ok(Object::Array(items)) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(items)) => items.clone(),
            _ => Vec::new(),
        };

        let open = self
            .inner
            .add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
        let close = self
            .inner
            .add_object(Stream::new(dictionary! {}, b"\nQ\n".to_vec()));
        let mut contents = Vec::with_capacity(existing.len() + 2);
        contents.push(Object::Reference(open));
        contents.extend(existing);
        contents.push(Object::Reference(close));

        self.inner
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(backend)?
            .set("Contents", contents);
        self.isolated_pages.push(page_id);
        Ok(())
    }

    fn append_operations(
        &mut self,
        page_id: ObjectId,
        operations: Vec<Operation>,
    ) -> Result<(), RenderError> {
        self.isolate_existing_content(page_id)?;
        let encoded = Content { operations }.encode().map_err(backend)?;
        // 相邻内容流直接拼接，首尾换行避免运算符粘连
        let mut content = Vec::with_capacity(encoded.len() + 2);
        content.push(b'\n');
        content.extend(encoded);
        content.push(b'\n');
        self.inner
            .add_page_contents(page_id, content)
            .map_err(backend)
    }
}

impl PageCanvas for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn rotation(&self, page: usize) -> Result<Rotation, RenderError> {
        let page_id = self.page_id(page)?;
        let degrees = self
            .inherited(page_id, b"Rotate")
            .and_then(|object| object.as_i64().ok())
            .unwrap_or(0);
        Rotation::from_degrees(degrees).map_err(backend)
    }

    fn set_rotation(&mut self, page: usize, rotation: Rotation) -> Result<(), RenderError> {
        let page_id = self.page_id(page)?;
        self.inner
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(backend)?
            .set("Rotate", rotation.degrees());
        Ok(())
    }

    fn page_size(&self, page: usize) -> Result<PageSize, RenderError> {
        let page_id = self.page_id(page)?;
        let native = self.native_size(page_id);
        Ok(if self.rotation(page)?.swaps_axes() {
            native.swapped()
        } else {
            native
        })
    }

    fn draw_circle(
        &mut self,
        page: usize,
        center: Point2,
        radius: f64,
        style: &CircleStyle,
    ) -> Result<(), RenderError> {
        let page_id = self.page_id(page)?;
        let (name, state_id) = self.opacity_state(style.fill_opacity);
        self.register_resource(page_id, b"ExtGState", &name, state_id)?;

        let (cx, cy) = self.to_user_space(page_id, center);
        let k = radius * KAPPA;
        let mut operations = vec![
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(name.into_bytes())]),
            color_operation("RG", style.stroke),
            color_operation("rg", style.fill),
            Operation::new("w", vec![real(style.stroke_width)]),
            Operation::new("m", vec![real(cx + radius), real(cy)]),
        ];
        let quadrants = [
            [cx + radius, cy + k, cx + k, cy + radius, cx, cy + radius],
            [cx - k, cy + radius, cx - radius, cy + k, cx - radius, cy],
            [cx - radius, cy - k, cx - k, cy - radius, cx, cy - radius],
            [cx + k, cy - radius, cx + radius, cy - k, cx + radius, cy],
        ];
        for segment in quadrants {
            operations.push(Operation::new(
                "c",
                segment.into_iter().map(real).collect(),
            ));
        }
        operations.push(Operation::new("h", vec![]));
        operations.push(Operation::new("B", vec![]));
        operations.push(Operation::new("Q", vec![]));
        self.append_operations(page_id, operations)
    }

    fn insert_text(
        &mut self,
        page: usize,
        origin: Point2,
        text: &str,
        style: &TextStyle,
    ) -> Result<(), RenderError> {
        if !text.is_ascii() {
            return Err(RenderError::Backend(format!(
                "text {text:?} is not representable in Helvetica"
            )));
        }
        let page_id = self.page_id(page)?;
        let font_id = self.font_id();
        self.register_resource(page_id, b"Font", FONT_RESOURCE, font_id)?;

        let (x, y) = self.to_user_space(page_id, origin);
        // 用户空间中逆时针旋转，页面按 /Rotate 顺时针显示后文字保持正向
        let (sin, cos) = style.rotation.radians().sin_cos();
        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(FONT_RESOURCE.as_bytes().to_vec()),
                    real(style.font_size),
                ],
            ),
            color_operation("rg", style.color),
            Operation::new(
                "Tm",
                vec![
                    real(cos),
                    real(sin),
                    real(-sin),
                    real(cos),
                    real(x),
                    real(y),
                ],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(
                    text.as_bytes().to_vec(),
                    StringFormat::Literal,
                )],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ];
        self.append_operations(page_id, operations)
    }
}

fn backend(err: impl std::fmt::Display) -> RenderError {
    RenderError::Backend(err.to_string())
}

fn real(value: f64) -> Object {
    // 消除 sin/cos 的舍入噪声，例如 cos(90°)
    let rounded = (value * 1e4).round() / 1e4;
    Object::Real(rounded as f32)
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

fn color_operation(operator: &str, color: Rgb) -> Operation {
    Operation::new(operator, vec![real(color.r), real(color.g), real(color.b)])
}


#[cfg(test)]
mod tests {
    use super::fixtures::{page_bytes, pdf_bytes, rect};
    use super::*;

    fn operations(pdf: &PdfDocument, page: usize) -> Vec<Operation> {
        let page_id = pdf.page_ids[page];
        let content = pdf.inner.get_page_content(page_id).expect("page content");
        Content::decode(&content).expect("decode content").operations
    }

    fn find<'a>(operations: &'a [Operation], operator: &str) -> &'a Operation {
        operations
            .iter()
            .find(|op| op.operator == operator)
            .unwrap_or_else(|| panic!("missing operator {operator}"))
    }

    fn assert_operands(operation: &Operation, expected: &[f64]) {
        let actual: Vec<f64> = operation.operands.iter().filter_map(number).collect();
        assert_eq!(actual.len(), expected.len(), "{actual:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-3, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn reads_sizes_and_inherited_rotation() {
        let pdf = PdfDocument::load_mem(&pdf_bytes(&[(300, 400), (500, 200)], Some(90))).unwrap();
        assert_eq!(pdf.page_count(), 2);
        assert_eq!(pdf.rotation(0).unwrap(), Rotation::Deg90);
        assert_eq!(pdf.page_size(0).unwrap(), PageSize::new(400.0, 300.0));
        assert_eq!(pdf.page_size(1).unwrap(), PageSize::new(200.0, 500.0));
        assert!(matches!(
            pdf.page_size(2),
            Err(RenderError::PageOutOfRange { index: 2, .. })
        ));
    }

    #[test]
    fn set_rotation_overrides_inherited_value() {
        let mut pdf = PdfDocument::load_mem(&pdf_bytes(&[(300, 400)], Some(90))).unwrap();
        pdf.set_rotation(0, Rotation::Deg180).unwrap();
        assert_eq!(pdf.rotation(0).unwrap(), Rotation::Deg180);
        assert_eq!(pdf.page_size(0).unwrap(), PageSize::new(300.0, 400.0));
    }

    #[test]
    fn circle_and_text_are_appended_in_user_space() {
        let mut pdf = PdfDocument::load_mem(&pdf_bytes(&[(300, 400)], None)).unwrap();
        pdf.draw_circle(0, Point2::new(60.0, 40.0), 8.75, &CircleStyle::BALLOON)
            .unwrap();
        pdf.insert_text(
            0,
            Point2::new(57.0, 43.5),
            "1",
            &TextStyle {
                font_size: 10.5,
                color: Rgb::WHITE,
                rotation: Rotation::Deg0,
            },
        )
        .unwrap();

        let ops = operations(&pdf, 0);
        assert_operands(find(&ops, "m"), &[68.75, 360.0]);
        assert_operands(find(&ops, "w"), &[2.5]);
        assert!(matches!(
            find(&ops, "gs").operands.as_slice(),
            [Object::Name(name)] if name.as_slice() == b"GSBaloneo400"
        ));
        assert_eq!(ops.iter().filter(|op| op.operator == "c").count(), 4);
        find(&ops, "B");

        let font = find(&ops, "Tf");
        assert!(matches!(&font.operands[0], Object::Name(name) if name.as_slice() == b"FBaloneo"));
        assert_operands(font, &[10.5]);
        assert_operands(find(&ops, "Tm"), &[1.0, 0.0, 0.0, 1.0, 57.0, 356.5]);
        assert!(matches!(
            find(&ops, "Tj").operands.as_slice(),
            [Object::String(text, _)] if text.as_slice() == b"1"
        ));

        let page_id = pdf.page_ids[0];
        let page = pdf.inner.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        assert!(resources.get(b"Font").unwrap().as_dict().unwrap().has(b"FBaloneo"));
        assert!(
            resources
                .get(b"ExtGState")
                .unwrap()
                .as_dict()
                .unwrap()
                .has(b"GSBaloneo400")
        );
    }

    #[test]
    fn saved_bytes_reload_with_same_pages() {
        let mut pdf = PdfDocument::load_mem(&pdf_bytes(&[(300, 400), (300, 400)], None)).unwrap();
        pdf.set_rotation(1, Rotation::Deg270).unwrap();
        let bytes = pdf.save_to_vec().unwrap();

        let reloaded = PdfDocument::load_mem(&bytes).unwrap();
        assert_eq!(reloaded.page_count(), 2);
        assert_eq!(reloaded.rotation(1).unwrap(), Rotation::Deg270);
    }

    #[test]
    fn non_ascii_label_is_rejected() {
        let mut pdf = PdfDocument::load_mem(&pdf_bytes(&[(300, 400)], None)).unwrap();
        let style = TextStyle {
            font_size: 10.0,
            color: Rgb::WHITE,
            rotation: Rotation::Deg0,
        };
        assert!(pdf.insert_text(0, Point2::new(0.0, 0.0), "ñ", &style).is_err());
    }

    fn label(rotation: Rotation) -> TextStyle {
        TextStyle {
            font_size: 10.5,
            color: Rgb::WHITE,
            rotation,
        }
    }

    #[test]
    fn label_matrix_counter_rotates_with_the_page() {
        let cases = [
            (Rotation::Deg90, [0.0, 1.0, -1.0, 0.0]),
            (Rotation::Deg180, [-1.0, 0.0, 0.0, -1.0]),
            (Rotation::Deg270, [0.0, -1.0, 1.0, 0.0]),
        ];
        for (rotation, [a, b, c, d]) in cases {
            let mut pdf = PdfDocument::load_mem(&pdf_bytes(&[(300, 400)], None)).unwrap();
            pdf.set_rotation(0, rotation).unwrap();
            pdf.insert_text(0, Point2::new(43.5, 342.0), "7", &label(rotation))
                .unwrap();
            let ops = operations(&pdf, 0);
            assert_operands(find(&ops, "Tm"), &[a, b, c, d, 43.5, 58.0]);
        }
    }

    #[test]
    fn source_content_is_isolated_from_balloons() {
        // 未闭合的 y 翻转矩阵不能影响追加的绘制
        let bytes = page_bytes((300, 400), b"1 0 0 -1 0 400 cm", Dictionary::new());
        let mut pdf = PdfDocument::load_mem(&bytes).unwrap();
        pdf.draw_circle(0, Point2::new(60.0, 40.0), 8.75, &CircleStyle::BALLOON)
            .unwrap();
        pdf.insert_text(0, Point2::new(57.0, 43.5), "1", &label(Rotation::Deg0))
            .unwrap();

        let ops = operations(&pdf, 0);
        let operators: Vec<&str> = ops.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(&operators[..4], &["q", "cm", "Q", "q"]);
        assert_eq!(operators.iter().filter(|op| **op == "q").count(), 3);
        assert_eq!(operators.iter().filter(|op| **op == "Q").count(), 3);
        assert_eq!(operators.last(), Some(&"Q"));
        assert_operands(find(&ops, "m"), &[68.75, 360.0]);

        // 原内容只包一次
        let page = pdf.inner.get_object(pdf.page_ids[0]).unwrap().as_dict().unwrap();
        assert_eq!(page.get(b"Contents").unwrap().as_array().unwrap().len(), 5);
    }

    #[test]
    fn crop_box_defines_the_visible_page() {
        let extra = dictionary! { "CropBox" => rect([50, 50, 250, 350]) };
        let mut pdf = PdfDocument::load_mem(&page_bytes((300, 400), b"q Q", extra)).unwrap();
        assert_eq!(pdf.page_size(0).unwrap(), PageSize::new(200.0, 300.0));
        pdf.set_rotation(0, Rotation::Deg90).unwrap();
        assert_eq!(pdf.page_size(0).unwrap(), PageSize::new(300.0, 200.0));

        pdf.draw_circle(0, Point2::new(60.0, 40.0), 8.75, &CircleStyle::BALLOON)
            .unwrap();
        let ops = operations(&pdf, 0);
        assert_operands(find(&ops, "m"), &[118.75, 310.0]);
    }

    #[test]
    fn crop_box_is_clipped_to_media_box() {
        let extra = dictionary! { "CropBox" => rect([-20, 100, 500, 900]) };
        let pdf = PdfDocument::load_mem(&page_bytes((300, 400), b"q Q", extra)).unwrap();
        assert_eq!(pdf.page_size(0).unwrap(), PageSize::new(300.0, 300.0));

        let disjoint = dictionary! { "CropBox" => rect([400, 500, 600, 700]) };
        let pdf = PdfDocument::load_mem(&page_bytes((300, 400), b"q Q", disjoint)).unwrap();
        assert_eq!(pdf.page_size(0).unwrap(), PageSize::new(300.0, 400.0));
    }

    #[test]
    fn garbage_is_not_a_document() {
        assert!(PdfDocument::load_mem(b"not a pdf").is_err());
    }
}
