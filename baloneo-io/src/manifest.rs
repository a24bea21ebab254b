use baloneo_core::annotation::{DimensionRecord, Instrument, Unit};
use baloneo_core::document::Document;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const MANIFEST_VERSION: u32 = 1;
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 清单中的一行。字段顺序与键名为文件格式的一部分。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "nombre")]
    pub name: String,
    pub nominal: f64,
    #[serde(rename = "tol_pos")]
    pub tolerance_plus: f64,
    #[serde(rename = "tol_neg")]
    pub tolerance_minus: f64,
    #[serde(rename = "instrumento")]
    pub instrument: Instrument,
    #[serde(rename = "unidad")]
    pub unit: Unit,
    #[serde(rename = "notas")]
    pub notes: String,
}

impl From<&DimensionRecord> for ManifestEntry {
    fn from(record: &DimensionRecord) -> Self {
        Self {
            name: record.name.clone(),
            nominal: record.nominal_value(),
            tolerance_plus: record.tolerance_plus_value(),
            tolerance_minus: record.tolerance_minus_value(),
            instrument: record.instrument,
            unit: record.unit,
            notes: record.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "dimensiones")]
    pub dimensions: Vec<ManifestEntry>,
    pub version: u32,
    #[serde(rename = "fecha_creacion")]
    pub created_at: String,
}

impl Manifest {
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a DimensionRecord>,
        generated_at: NaiveDateTime,
    ) -> Self {
        Self {
            dimensions: records.into_iter().map(ManifestEntry::from).collect(),
            version: MANIFEST_VERSION,
            created_at: generated_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// 按页序、行序汇总文档中所有页面的记录。
    pub fn from_document(document: &Document, generated_at: NaiveDateTime) -> Self {
        Self::from_records(document.pages().records(), generated_at)
    }

    /// 使用本地当前时间。
    pub fn now(document: &Document) -> Self {
        Self::from_document(document, Local::now().naive_local())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use baloneo_core::annotation::{AnnotationModel, RecordField};
    use chrono::NaiveDate;

    use super::*;

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .and_then(|date| date.and_hms_opt(14, 7, 9))
            .expect("valid timestamp")
    }

    #[test]
    fn serializes_keys_in_contract_order() {
        let mut model = AnnotationModel::default();
        model.add_balloon(10.0, 10.0);
        model.set_field(0, RecordField::Nominal, "1 1/2").unwrap();
        model.set_field(0, RecordField::TolerancePlus, "0.1").unwrap();
        model.set_field(0, RecordField::ToleranceMinus, "abc").unwrap();
        model
            .set_field(0, RecordField::Instrument, "micrometer")
            .unwrap();
        model.set_field(0, RecordField::Notes, "ñ").unwrap();

        let manifest = Manifest::from_records(model.records(), fixed_time());
        let json = manifest.to_json().unwrap();

        let order = [
            "\"dimensiones\"",
            "\"nombre\"",
            "\"nominal\"",
            "\"tol_pos\"",
            "\"tol_neg\"",
            "\"instrumento\"",
            "\"unidad\"",
            "\"notas\"",
            "\"version\"",
            "\"fecha_creacion\"",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|key| json.find(key).expect("key present"))
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));

        assert!(json.contains("\"Micrómetro\""));
        assert!(json.contains("\"ñ\""));
        assert!(json.contains("\"fecha_creacion\": \"2024-03-05 14:07:09\""));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["dimensiones"][0]["nombre"], "D1");
        assert_eq!(value["dimensiones"][0]["nominal"], 1.5);
        assert_eq!(value["dimensiones"][0]["tol_neg"], 0.0);
        assert_eq!(value["dimensiones"][0]["unidad"], "mm");
    }

    #[test]
    fn document_manifest_spans_pages_in_order() {
        let mut document = Document::new("a.pdf", 3);
        for page in [2usize, 0] {
            let mut model = AnnotationModel::default();
            model.add_balloon(0.0, 0.0);
            model
                .set_field(0, RecordField::Name, &format!("P{page}"))
                .unwrap();
            document.commit_page(page, &model);
        }

        let manifest = Manifest::from_document(&document, fixed_time());
        let names: Vec<&str> = manifest.dimensions.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["P0", "P2"]);

        let parsed = Manifest::from_json(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(parsed, manifest);
    }
}
