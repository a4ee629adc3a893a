use serde::{Deserialize, Serialize};

use crate::core::{
    OAuthCredential, PartType, PartV1, Pcb, Project, ProjectPartAssignment, ProjectPcbAssignment,
    StoredFile,
};
use crate::error::Result;
use crate::schema::SnapshotV2;

/// V3：+ PCB 以及项目的零件/PCB 分配
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotV3 {
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
    pub pcbs: Vec<Pcb>,
    pub project_part_assignments: Vec<ProjectPartAssignment>,
    pub project_pcb_assignments: Vec<ProjectPcbAssignment>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

super::impl_versioned_snapshot!(SnapshotV3, 3);

impl SnapshotV3 {
    pub fn upgrade_from<F>(prev: SnapshotV2, build_checksum: F) -> Result<Self>
    where
        F: FnOnce(&mut Self) -> Result<String>,
    {
        let mut next = Self {
            version: 3,
            count: prev.count,
            first_record_id: prev.first_record_id,
            last_record_id: prev.last_record_id,
            date_created: prev.date_created,
            date_modified: prev.date_modified,
            parts: prev.parts,
            part_types: prev.part_types,
            projects: prev.projects,
            oauth_credentials: prev.oauth_credentials,
            stored_files: prev.stored_files,
            pcbs: Vec::new(),
            project_part_assignments: Vec::new(),
            project_pcb_assignments: Vec::new(),
            checksum: String::new(),
        };
        next.checksum = build_checksum(&mut next)?;
        Ok(next)
    }
}
