use serde::{Deserialize, Serialize};

use crate::core::{OAuthCredential, PartType, PartV1, Project};

/// V1：最初的快照形态（零件、零件类型、项目、OAuth 凭据）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotV1 {
    pub version: u8,
    pub count: u64,
    pub first_record_id: u64,
    pub last_record_id: u64,
    pub date_created: i64,
    pub date_modified: i64,
    pub parts: Vec<PartV1>,
    pub part_types: Vec<PartType>,
    pub projects: Vec<Project>,
    pub oauth_credentials: Vec<OAuthCredential>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

super::impl_versioned_snapshot!(SnapshotV1, 1);
