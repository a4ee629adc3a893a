use serde::{Deserialize, Serialize};

use crate::core::{
    now_ms, OAuthCredential, OAuthRequest, Part, PartSupplier, PartType, Pcb,
    PcbStoredFileAssignment, Project, ProjectPartAssignment, ProjectPcbAssignment, StoredFile,
};
use crate::error::Result;
use crate::schema::SnapshotV6;

/// V7（当前）：零件升级为带制造商 / Arrow 料号 / 封装信息的 `Part`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotV7 {
    pub version: u8,
    pub count: u64,
    pub first_record_id: u64,
    pub last_record_id: u64,
    pub date_created: i64,
    pub date_modified: i64,
    pub parts: Vec<Part>,
    pub part_types: Vec<PartType>,
    pub projects: Vec<Project>,
    pub oauth_credentials: Vec<OAuthCredential>,
    pub stored_files: Vec<StoredFile>,
    pub pcbs: Vec<Pcb>,
    pub project_part_assignments: Vec<ProjectPartAssignment>,
    pub project_pcb_assignments: Vec<ProjectPcbAssignment>,
    pub part_suppliers: Vec<PartSupplier>,
    pub oauth_requests: Vec<OAuthRequest>,
    pub pcb_stored_file_assignments: Vec<PcbStoredFileAssignment>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

super::impl_versioned_snapshot!(SnapshotV7, 7);

impl SnapshotV7 {
    /// 新建空库：version=当前版本，first/last=0
    pub fn empty() -> Self {
        let now = now_ms();
        Self {
            version: super::CURRENT_VERSION,
            date_created: now,
            date_modified: now,
            ..Default::default()
        }
    }

    pub fn upgrade_from<F>(prev: SnapshotV6, build_checksum: F) -> Result<Self>
    where
        F: FnOnce(&mut Self) -> Result<String>,
    {
        let mut next = Self {
            version: 7,
            count: prev.count,
            first_record_id: prev.first_record_id,
            last_record_id: prev.last_record_id,
            date_created: prev.date_created,
            date_modified: prev.date_modified,
            parts: prev.parts.into_iter().map(Part::from).collect(),
            part_types: prev.part_types,
            projects: prev.projects,
            oauth_credentials: prev.oauth_credentials,
            stored_files: prev.stored_files,
            pcbs: prev.pcbs,
            project_part_assignments: prev.project_part_assignments,
            project_pcb_assignments: prev.project_pcb_assignments,
            part_suppliers: prev.part_suppliers,
            oauth_requests: prev.oauth_requests,
            pcb_stored_file_assignments: prev.pcb_stored_file_assignments,
            checksum: String::new(),
        };
        next.checksum = build_checksum(&mut next)?;
        Ok(next)
    }

    /// 重算派生元数据：count / first / last（空集合时为 0）
    pub fn refresh_metadata(&mut self) {
        self.count = self.parts.len() as u64;
        self.first_record_id = self.parts.iter().map(|p| p.part_id).min().unwrap_or(0);
        self.last_record_id = self.parts.iter().map(|p| p.part_id).max().unwrap_or(0);
    }
}
