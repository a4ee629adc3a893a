use serde::{Deserialize, Serialize};

/// 当前毫秒级 unix 时间戳（落盘/入库统一使用）
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// 零件：库存的主记录（V7 形态）
///
/// `part_id` 由 store 在插入时分配，调用方传入的值会被覆盖。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Part {
    pub part_id: u64,
    pub part_number: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub manufacturer: String,
    pub manufacturer_part_number: String,
    pub digikey_part_number: String,
    pub mouser_part_number: String,
    pub arrow_part_number: String,
    pub location: String,
    pub bin_number: String,
    pub bin_number2: String,
    pub quantity: i64,
    pub low_stock_threshold: i64,
    pub cost: f64,
    pub part_type_id: u64,
    pub project_id: Option<u64>,
    /// 0 = 未指定
    pub mounting_type_id: u32,
    pub package_type: String,
    pub datasheet_url: String,
    pub date_created: i64,
}

impl Part {
    pub fn new(part_number: impl Into<String>) -> Self {
        Self {
            part_number: part_number.into(),
            date_created: now_ms(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_bins(mut self, bin_number: impl Into<String>, bin_number2: impl Into<String>) -> Self {
        self.bin_number = bin_number.into();
        self.bin_number2 = bin_number2.into();
        self
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    /// 参与搜索的供应商料号（制造商/DigiKey/Mouser/Arrow），空值跳过
    pub fn supplier_part_numbers(&self) -> impl Iterator<Item = &str> {
        [
            self.manufacturer_part_number.as_str(),
            self.digikey_part_number.as_str(),
            self.mouser_part_number.as_str(),
            self.arrow_part_number.as_str(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
    }

    pub fn bin_numbers(&self) -> impl Iterator<Item = &str> {
        [self.bin_number.as_str(), self.bin_number2.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.low_stock_threshold
    }
}

/// V1..V6 的零件形态：没有 manufacturer / arrow / mounting / package 字段
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartV1 {
    pub part_id: u64,
    pub part_number: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub manufacturer_part_number: String,
    pub digikey_part_number: String,
    pub mouser_part_number: String,
    pub location: String,
    pub bin_number: String,
    pub bin_number2: String,
    pub quantity: i64,
    pub low_stock_threshold: i64,
    pub cost: f64,
    pub part_type_id: u64,
    pub project_id: Option<u64>,
    pub datasheet_url: String,
    pub date_created: i64,
}

impl From<PartV1> for Part {
    fn from(p: PartV1) -> Self {
        Self {
            part_id: p.part_id,
            part_number: p.part_number,
            description: p.description,
            keywords: p.keywords,
            manufacturer: String::new(),
            manufacturer_part_number: p.manufacturer_part_number,
            digikey_part_number: p.digikey_part_number,
            mouser_part_number: p.mouser_part_number,
            arrow_part_number: String::new(),
            location: p.location,
            bin_number: p.bin_number,
            bin_number2: p.bin_number2,
            quantity: p.quantity,
            low_stock_threshold: p.low_stock_threshold,
            cost: p.cost,
            part_type_id: p.part_type_id,
            project_id: p.project_id,
            mounting_type_id: 0,
            package_type: String::new(),
            datasheet_url: p.datasheet_url,
            date_created: p.date_created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_part_upgrade_defaults_new_fields() {
        let old = PartV1 {
            part_id: 9,
            part_number: "NE555".into(),
            mouser_part_number: "595-NE555P".into(),
            keywords: vec!["timer".into()],
            quantity: 12,
            ..Default::default()
        };
        let p = Part::from(old);
        assert_eq!(p.part_id, 9);
        assert_eq!(p.mouser_part_number, "595-NE555P");
        assert_eq!(p.keywords, vec!["timer".to_string()]);
        assert!(p.manufacturer.is_empty());
        assert!(p.arrow_part_number.is_empty());
        assert_eq!(p.mounting_type_id, 0);
    }

    #[test]
    fn empty_supplier_numbers_are_skipped() {
        let mut p = Part::new("X");
        p.digikey_part_number = "296-1395-5-ND".into();
        let nums: Vec<&str> = p.supplier_part_numbers().collect();
        assert_eq!(nums, vec!["296-1395-5-ND"]);
    }
}
