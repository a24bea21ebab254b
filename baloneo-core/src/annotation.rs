//! 单页标注模型：气球与尺寸记录按序一一对应。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Point2, Rotation};
use crate::numeric;

/// 新建气球的默认直径（渲染像素）。
pub const DEFAULT_BALLOON_DIAMETER: f64 = 35.0;

/// 新建尺寸记录数值字段的初始文本。
pub const DEFAULT_NUMERIC_TEXT: &str = "0.0";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnnotationError {
    #[error("row {index} out of range (page has {len} rows)")]
    RowOutOfRange { index: usize, len: usize },
    #[error("unknown record field: {0}")]
    UnknownField(String),
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),
    #[error("unknown unit: {0}")]
    UnknownUnit(String),
    #[error("the unit column follows the global unit and cannot be edited per row")]
    UnitNotEditable,
}

/// 尺寸单位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Unit {
    #[default]
    #[serde(rename = "mm")]
    Mm,
    #[serde(rename = "in")]
    In,
}

impl Unit {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Mm => "mm",
            Unit::In => "in",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = AnnotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mm" => Ok(Unit::Mm),
            "in" => Ok(Unit::In),
            _ => Err(AnnotationError::UnknownUnit(s.to_string())),
        }
    }
}

/// 测量器具。序列化时使用清单文件约定的显示标签。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Instrument {
    #[default]
    #[serde(rename = "Vernier")]
    Vernier,
    #[serde(rename = "Micrómetro")]
    Micrometer,
    #[serde(rename = "Calibrador")]
    Caliper,
    #[serde(rename = "Probador")]
    Gauge,
    #[serde(rename = "CMM")]
    Cmm,
    #[serde(rename = "Comparador")]
    Comparator,
    #[serde(rename = "Otro")]
    Other,
}

impl Instrument {
    pub const ALL: [Instrument; 7] = [
        Instrument::Vernier,
        Instrument::Micrometer,
        Instrument::Caliper,
        Instrument::Gauge,
        Instrument::Cmm,
        Instrument::Comparator,
        Instrument::Other,
    ];

    /// 清单与界面中使用的标签。
    pub fn label(self) -> &'static str {
        match self {
            Instrument::Vernier => "Vernier",
            Instrument::Micrometer => "Micrómetro",
            Instrument::Caliper => "Calibrador",
            Instrument::Gauge => "Probador",
            Instrument::Cmm => "CMM",
            Instrument::Comparator => "Comparador",
            Instrument::Other => "Otro",
        }
    }

    fn english_name(self) -> &'static str {
        match self {
            Instrument::Vernier => "vernier",
            Instrument::Micrometer => "micrometer",
            Instrument::Caliper => "caliper",
            Instrument::Gauge => "gauge",
            Instrument::Cmm => "cmm",
            Instrument::Comparator => "comparator",
            Instrument::Other => "other",
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Instrument {
    type Err = AnnotationError;

    /// 同时接受显示标签与英文名（不区分大小写）。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Instrument::ALL
            .into_iter()
            .find(|instrument| {
                instrument.label().to_lowercase() == needle || instrument.english_name() == needle
            })
            .ok_or_else(|| AnnotationError::UnknownInstrument(s.to_string()))
    }
}

/// 页面上的编号气球，坐标保存在创建时的渲染空间。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balloon {
    pub render: Point2,
    pub number: u32,
    pub diameter: f64,
    pub rotation_at_creation: Rotation,
}

/// 与气球配对的尺寸记录。数值字段保留用户原始输入（例如分数写法），
/// 仅在导出时转换为浮点数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionRecord {
    pub name: String,
    pub nominal: String,
    pub tolerance_plus: String,
    pub tolerance_minus: String,
    pub instrument: Instrument,
    pub unit: Unit,
    pub notes: String,
}

impl DimensionRecord {
    pub fn for_balloon(number: u32, unit: Unit) -> Self {
        Self {
            name: format!("D{number}"),
            nominal: DEFAULT_NUMERIC_TEXT.to_string(),
            tolerance_plus: DEFAULT_NUMERIC_TEXT.to_string(),
            tolerance_minus: DEFAULT_NUMERIC_TEXT.to_string(),
            instrument: Instrument::default(),
            unit,
            notes: String::new(),
        }
    }

    #[inline]
    pub fn nominal_value(&self) -> f64 {
        numeric::parse(&self.nominal)
    }

    #[inline]
    pub fn tolerance_plus_value(&self) -> f64 {
        numeric::parse(&self.tolerance_plus)
    }

    #[inline]
    pub fn tolerance_minus_value(&self) -> f64 {
        numeric::parse(&self.tolerance_minus)
    }

    /// 按字段写回编辑内容。单位列跟随全局单位，不允许单独修改。
    pub fn set_field(&mut self, field: RecordField, value: &str) -> Result<(), AnnotationError> {
        match field {
            RecordField::Name => self.name = value.to_string(),
            RecordField::Nominal => self.nominal = value.to_string(),
            RecordField::TolerancePlus => self.tolerance_plus = value.to_string(),
            RecordField::ToleranceMinus => self.tolerance_minus = value.to_string(),
            RecordField::Instrument => self.instrument = value.parse()?,
            RecordField::Notes => self.notes = value.to_string(),
            RecordField::Unit => return Err(AnnotationError::UnitNotEditable),
        }
        Ok(())
    }
}

/// 尺寸表的列。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Name,
    Nominal,
    TolerancePlus,
    ToleranceMinus,
    Instrument,
    Unit,
    Notes,
}

impl FromStr for RecordField {
    type Err = AnnotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" | "nombre" => Ok(RecordField::Name),
            "nominal" => Ok(RecordField::Nominal),
            "tol+" | "tol_pos" | "tolerance_plus" => Ok(RecordField::TolerancePlus),
            "tol-" | "tol_neg" | "tolerance_minus" => Ok(RecordField::ToleranceMinus),
            "instrument" | "instrumento" => Ok(RecordField::Instrument),
            "unit" | "unidad" => Ok(RecordField::Unit),
            "notes" | "notas" => Ok(RecordField::Notes),
            _ => Err(AnnotationError::UnknownField(s.to_string())),
        }
    }
}

/// 某一页已保存的标注状态。
///
/// 字段私有：`balloons.len() == records.len()` 只能通过 [`AnnotationModel`] 的
/// 成对操作维护。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageAnnotationState {
    balloons: Vec<Balloon>,
    records: Vec<DimensionRecord>,
    rotation: Rotation,
    balloon_counter: u32,
}

impl PageAnnotationState {
    /// 从未访问过的页面：无标注、旋转 0、计数 0。
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// 无标注的页面，初始旋转取自源文件。
    pub fn with_rotation(rotation: Rotation) -> Self {
        Self {
            rotation,
            ..Self::default()
        }
    }

    #[inline]
    pub fn balloons(&self) -> &[Balloon] {
        &self.balloons
    }

    #[inline]
    pub fn records(&self) -> &[DimensionRecord] {
        &self.records
    }

    #[inline]
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    #[inline]
    pub fn balloon_counter(&self) -> u32 {
        self.balloon_counter
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.balloons.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.balloons.is_empty()
    }

    /// 广播单位到本页全部记录。
    pub fn set_unit(&mut self, unit: Unit) {
        for record in &mut self.records {
            record.unit = unit;
        }
    }

    /// 气球与对应记录按序配对迭代。
    pub fn pairs(&self) -> impl Iterator<Item = (&Balloon, &DimensionRecord)> + '_ {
        self.balloons.iter().zip(self.records.iter())
    }
}

/// 当前打开页面的可编辑标注模型。
///
/// 会话中的编辑副本；提交到页面状态存储之前只是草稿。
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationModel {
    state: PageAnnotationState,
    unit: Unit,
    balloon_diameter: f64,
}

impl AnnotationModel {
    pub fn new(unit: Unit, balloon_diameter: f64) -> Self {
        Self::from_state(PageAnnotationState::empty(), unit, balloon_diameter)
    }

    /// 以保存的页面状态整体替换编辑视图（不合并）。
    pub fn from_state(state: PageAnnotationState, unit: Unit, balloon_diameter: f64) -> Self {
        Self {
            state,
            unit,
            balloon_diameter,
        }
    }

    #[inline]
    pub fn state(&self) -> &PageAnnotationState {
        &self.state
    }

    #[inline]
    pub fn into_state(self) -> PageAnnotationState {
        self.state
    }

    #[inline]
    pub fn balloons(&self) -> &[Balloon] {
        self.state.balloons()
    }

    #[inline]
    pub fn records(&self) -> &[DimensionRecord] {
        self.state.records()
    }

    #[inline]
    pub fn record(&self, index: usize) -> Option<&DimensionRecord> {
        self.state.records.get(index)
    }

    /// 表格编辑直接写回记录。
    #[inline]
    pub fn record_mut(&mut self, index: usize) -> Option<&mut DimensionRecord> {
        self.state.records.get_mut(index)
    }

    #[inline]
    pub fn rotation(&self) -> Rotation {
        self.state.rotation
    }

    #[inline]
    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.state.rotation = rotation;
    }

    #[inline]
    pub fn balloon_counter(&self) -> u32 {
        self.state.balloon_counter
    }

    #[inline]
    pub fn unit(&self) -> Unit {
        self.unit
    }

    #[inline]
    pub fn balloon_diameter(&self) -> f64 {
        self.balloon_diameter
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.state.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// 在渲染坐标处新增气球，同时追加默认尺寸记录。
    pub fn add_balloon(&mut self, render_x: f64, render_y: f64) -> &Balloon {
        let number = self.state.balloon_counter + 1;
        self.state.balloon_counter = number;
        self.state.balloons.push(Balloon {
            render: Point2::new(render_x, render_y),
            number,
            diameter: self.balloon_diameter,
            rotation_at_creation: self.state.rotation,
        });
        self.state
            .records
            .push(DimensionRecord::for_balloon(number, self.unit));
        &self.state.balloons[self.state.balloons.len() - 1]
    }

    /// 删除最后一个气球及其记录；空页面时为空操作。
    pub fn remove_last(&mut self) -> Option<(Balloon, DimensionRecord)> {
        match (self.state.balloons.pop(), self.state.records.pop()) {
            (Some(balloon), Some(record)) => {
                self.state.balloon_counter = self.state.balloon_counter.saturating_sub(1);
                Some((balloon, record))
            }
            _ => None,
        }
    }

    /// 删除表格中任意一行及同序号的气球。其余气球不重新编号，
    /// 因此删除中间行后名称可能不连续。
    pub fn remove_at(&mut self, index: usize) -> Result<(Balloon, DimensionRecord), AnnotationError> {
        let len = self.state.len();
        if index >= len {
            return Err(AnnotationError::RowOutOfRange { index, len });
        }
        let balloon = self.state.balloons.remove(index);
        let record = self.state.records.remove(index);
        self.state.balloon_counter = self.state.balloon_counter.saturating_sub(1);
        Ok((balloon, record))
    }

    pub fn clear_all(&mut self) {
        self.state.balloons.clear();
        self.state.records.clear();
        self.state.balloon_counter = 0;
    }

    /// 更新新记录使用的单位，并广播到已有记录。
    pub fn set_unit(&mut self, unit: Unit) {
        self.unit = unit;
        self.state.set_unit(unit);
    }

    pub fn set_field(
        &mut self,
        index: usize,
        field: RecordField,
        value: &str,
    ) -> Result<(), AnnotationError> {
        let len = self.state.len();
        let record = self
            .record_mut(index)
            .ok_or(AnnotationError::RowOutOfRange { index, len })?;
        record.set_field(field, value)
    }
}

impl Default for AnnotationModel {
    fn default() -> Self {
        Self::new(Unit::default(), DEFAULT_BALLOON_DIAMETER)
    }
}
