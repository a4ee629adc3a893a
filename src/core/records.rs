use serde::{Deserialize, Serialize};

// 次要实体：各自独立的 id 空间。
// 引用字段只是整数，文件格式内不保证引用完整性（父记录可能已被删除）。

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartType {
    pub part_type_id: u64,
    pub parent_part_type_id: Option<u64>,
    pub name: String,
    pub date_created: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Project {
    pub project_id: u64,
    pub name: String,
    pub description: String,
    pub location: String,
    pub color: i32,
    pub date_created: i64,
}

/// 按 provider 名称唯一
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuthCredential {
    pub provider: String,
    pub access_token: String,
    pub refresh_token: String,
    pub date_created: i64,
    pub date_expires: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoredFile {
    pub stored_file_id: u64,
    pub part_id: u64,
    pub file_name: String,
    pub original_file_name: String,
    pub file_length: i64,
    pub crc32: u32,
    /// 0=未知 1=图片 2=数据手册 3=引脚图 4=参考设计 5=其他
    pub stored_file_type: u8,
    pub date_created: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pcb {
    pub pcb_id: u64,
    pub name: String,
    pub description: String,
    pub serial_number: String,
    pub last_serial_number: String,
    pub date_created: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectPartAssignment {
    pub project_part_assignment_id: u64,
    pub project_id: u64,
    /// None 表示仅按名称占位、尚未入库的零件
    pub part_id: Option<u64>,
    pub part_name: String,
    pub quantity: i64,
    pub quantity_available: i64,
    pub notes: String,
    pub reference_id: String,
    pub date_created: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectPcbAssignment {
    pub project_pcb_assignment_id: u64,
    pub project_id: u64,
    pub pcb_id: u64,
    pub date_created: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartSupplier {
    pub part_supplier_id: u64,
    pub part_id: u64,
    pub name: String,
    pub supplier_part_number: String,
    pub cost: f64,
    pub quantity_available: i64,
    pub minimum_order_quantity: i64,
    pub product_url: String,
    pub image_url: String,
    pub date_created: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OAuthRequest {
    pub oauth_request_id: u64,
    pub provider: String,
    pub request_id: String,
    pub auth_code: String,
    pub error: String,
    pub error_description: String,
    pub return_to_url: String,
    pub authorization_received: bool,
    pub date_created: i64,
    pub date_modified: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PcbStoredFileAssignment {
    pub pcb_stored_file_assignment_id: u64,
    pub pcb_id: u64,
    pub stored_file_id: u64,
    pub name: String,
    pub notes: String,
    pub date_created: i64,
}
