use serde::{Deserialize, Serialize};

use crate::core::{OAuthCredential, PartType, PartV1, Project, StoredFile};
use crate::error::Result;
use crate::schema::SnapshotV1;

/// V2：+ stored_files（零件附件）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotV2 {
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
    pub stored_files: Vec<StoredFile>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

super::impl_versioned_snapshot!(SnapshotV2, 2);

impl SnapshotV2 {
    pub fn upgrade_from<F>(prev: SnapshotV1, build_checksum: F) -> Result<Self>
    where
        F: FnOnce(&mut Self) -> Result<String>,
    {
        let mut next = Self {
            version: 2,
            count: prev.count,
            first_record_id: prev.first_record_id,
            last_record_id: prev.last_record_id,
            date_created: prev.date_created,
            date_modified: prev.date_modified,
            parts: prev.parts,
            part_types: prev.part_types,
            projects: prev.projects,
            oauth_credentials: prev.oauth_credentials,
            stored_files: Vec::new(),
            checksum: String::new(),
        };
        next.checksum = build_checksum(&mut next)?;
        Ok(next)
    }
}
