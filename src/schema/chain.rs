use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::schema::{
    SnapshotV1, SnapshotV2, SnapshotV3, SnapshotV4, SnapshotV5, SnapshotV6, SnapshotV7,
    VersionedSnapshot, CURRENT_VERSION,
};
use crate::storage::codec;

/// 任意历史版本的快照
///
/// 状态机：V1 → V2 → … → V7（终态），只允许单步前进。
#[derive(Clone, Debug, PartialEq)]
pub enum LegacySnapshot {
    V1(SnapshotV1),
    V2(SnapshotV2),
    V3(SnapshotV3),
    V4(SnapshotV4),
    V5(SnapshotV5),
    V6(SnapshotV6),
    V7(SnapshotV7),
}

fn decode_as<S>(payload: &[u8]) -> Result<S>
where
    S: DeserializeOwned + VersionedSnapshot,
{
    let snap: S = codec::decode(payload)?;
    if snap.version() != S::VERSION {
        return Err(StoreError::Format(format!(
            "payload version {} decoded with v{} schema",
            snap.version(),
            S::VERSION
        )));
    }
    Ok(snap)
}

fn verify_checksum<S>(snap: S) -> Result<S>
where
    S: Serialize + VersionedSnapshot,
{
    codec::verify(snap)
}

impl LegacySnapshot {
    /// 按文件头的版本号选择 schema 解码
    pub fn decode(version: u8, payload: &[u8]) -> Result<Self> {
        let snap = match version {
            1 => LegacySnapshot::V1(decode_as(payload)?),
            2 => LegacySnapshot::V2(decode_as(payload)?),
            3 => LegacySnapshot::V3(decode_as(payload)?),
            4 => LegacySnapshot::V4(decode_as(payload)?),
            5 => LegacySnapshot::V5(decode_as(payload)?),
            6 => LegacySnapshot::V6(decode_as(payload)?),
            7 => LegacySnapshot::V7(decode_as(payload)?),
            other => return Err(StoreError::UnsupportedVersion(other)),
        };
        Ok(snap)
    }

    pub fn encode_payload(&self) -> Result<Vec<u8>> {
        match self {
            LegacySnapshot::V1(s) => codec::encode(s),
            LegacySnapshot::V2(s) => codec::encode(s),
            LegacySnapshot::V3(s) => codec::encode(s),
            LegacySnapshot::V4(s) => codec::encode(s),
            LegacySnapshot::V5(s) => codec::encode(s),
            LegacySnapshot::V6(s) => codec::encode(s),
            LegacySnapshot::V7(s) => codec::encode(s),
        }
    }

    pub fn version(&self) -> u8 {
        match self {
            LegacySnapshot::V1(_) => 1,
            LegacySnapshot::V2(_) => 2,
            LegacySnapshot::V3(_) => 3,
            LegacySnapshot::V4(_) => 4,
            LegacySnapshot::V5(_) => 5,
            LegacySnapshot::V6(_) => 6,
            LegacySnapshot::V7(_) => 7,
        }
    }

    pub fn date_created(&self) -> i64 {
        match self {
            LegacySnapshot::V1(s) => s.date_created,
            LegacySnapshot::V2(s) => s.date_created,
            LegacySnapshot::V3(s) => s.date_created,
            LegacySnapshot::V4(s) => s.date_created,
            LegacySnapshot::V5(s) => s.date_created,
            LegacySnapshot::V6(s) => s.date_created,
            LegacySnapshot::V7(s) => s.date_created,
        }
    }

    pub fn is_current(&self) -> bool {
        self.version() == CURRENT_VERSION
    }

    /// 校验当前版本自身的 checksum（升级前做，避免把损坏数据“洗白”）
    pub fn verify(self) -> Result<Self> {
        Ok(match self {
            LegacySnapshot::V1(s) => LegacySnapshot::V1(verify_checksum(s)?),
            LegacySnapshot::V2(s) => LegacySnapshot::V2(verify_checksum(s)?),
            LegacySnapshot::V3(s) => LegacySnapshot::V3(verify_checksum(s)?),
            LegacySnapshot::V4(s) => LegacySnapshot::V4(verify_checksum(s)?),
            LegacySnapshot::V5(s) => LegacySnapshot::V5(verify_checksum(s)?),
            LegacySnapshot::V6(s) => LegacySnapshot::V6(verify_checksum(s)?),
            LegacySnapshot::V7(s) => LegacySnapshot::V7(verify_checksum(s)?),
        })
    }

    /// 单步升级 Vk → V(k+1)；V7 原样返回
    pub fn upgrade(self) -> Result<Self> {
        Ok(match self {
            LegacySnapshot::V1(s) => {
                LegacySnapshot::V2(SnapshotV2::upgrade_from(s, codec::compute_checksum)?)
            }
            LegacySnapshot::V2(s) => {
                LegacySnapshot::V3(SnapshotV3::upgrade_from(s, codec::compute_checksum)?)
            }
            LegacySnapshot::V3(s) => {
                LegacySnapshot::V4(SnapshotV4::upgrade_from(s, codec::compute_checksum)?)
            }
            LegacySnapshot::V4(s) => {
                LegacySnapshot::V5(SnapshotV5::upgrade_from(s, codec::compute_checksum)?)
            }
            LegacySnapshot::V5(s) => {
                LegacySnapshot::V6(SnapshotV6::upgrade_from(s, codec::compute_checksum)?)
            }
            LegacySnapshot::V6(s) => {
                LegacySnapshot::V7(SnapshotV7::upgrade_from(s, codec::compute_checksum)?)
            }
            current @ LegacySnapshot::V7(_) => current,
        })
    }

    /// 逐级升级到当前版本
    pub fn into_current(self) -> Result<SnapshotV7> {
        let mut snap = self;
        loop {
            match snap {
                LegacySnapshot::V7(s) => return Ok(s),
                other => {
                    let from = other.version();
                    snap = other.upgrade()?;
                    tracing::debug!("Snapshot upgraded v{} -> v{}", from, snap.version());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OAuthCredential, PartType, PartV1, Project};

    fn v1_sample() -> SnapshotV1 {
        let mut s = SnapshotV1 {
            version: 1,
            count: 2,
            first_record_id: 3,
            last_record_id: 4,
            date_created: 1_600_000_000_000,
            date_modified: 1_600_000_100_000,
            parts: vec![
                PartV1 {
                    part_id: 3,
                    part_number: "LM358".into(),
                    description: "Op Amp".into(),
                    part_type_id: 1,
                    ..Default::default()
                },
                PartV1 {
                    part_id: 4,
                    part_number: "NE555".into(),
                    bin_number: "A1".into(),
                    part_type_id: 1,
                    ..Default::default()
                },
            ],
            part_types: vec![PartType {
                part_type_id: 1,
                name: "IC".into(),
                ..Default::default()
            }],
            projects: vec![Project {
                project_id: 1,
                name: "Synth".into(),
                ..Default::default()
            }],
            oauth_credentials: vec![OAuthCredential {
                provider: "DigiKey".into(),
                access_token: "tok".into(),
                ..Default::default()
            }],
            checksum: String::new(),
        };
        codec::seal(&mut s).unwrap();
        s
    }

    #[test]
    fn upgrade_walks_every_version_in_order() {
        let mut snap = LegacySnapshot::V1(v1_sample());
        let mut seen = vec![snap.version()];
        while !snap.is_current() {
            snap = snap.upgrade().unwrap();
            seen.push(snap.version());
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn v1_into_current_carries_fields_and_defaults_new_ones() {
        let v7 = LegacySnapshot::V1(v1_sample()).into_current().unwrap();
        assert_eq!(v7.version, 7);
        assert_eq!(v7.count, 2);
        assert_eq!(v7.first_record_id, 3);
        assert_eq!(v7.last_record_id, 4);
        assert_eq!(v7.date_created, 1_600_000_000_000);
        assert_eq!(v7.parts.len(), 2);
        assert_eq!(v7.parts[1].bin_number, "A1");
        assert!(v7.parts[0].manufacturer.is_empty());
        assert_eq!(v7.oauth_credentials[0].provider, "DigiKey");
        assert!(v7.stored_files.is_empty());
        assert!(v7.pcbs.is_empty());
        assert!(v7.part_suppliers.is_empty());
        assert!(v7.oauth_requests.is_empty());
        assert!(v7.pcb_stored_file_assignments.is_empty());

        let mut v7 = v7;
        assert!(codec::checksum_matches(&mut v7).unwrap());
    }

    #[test]
    fn each_step_produces_a_valid_checksum() {
        let mut snap = LegacySnapshot::V1(v1_sample());
        while !snap.is_current() {
            snap = snap.upgrade().unwrap().verify().unwrap();
        }
    }

    #[test]
    fn decode_selects_schema_by_tag() {
        let snap = LegacySnapshot::V1(v1_sample());
        let payload = snap.encode_payload().unwrap();
        let back = LegacySnapshot::decode(1, &payload).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn decode_with_wrong_tag_is_format_error() {
        let payload = LegacySnapshot::V1(v1_sample()).encode_payload().unwrap();
        for tag in 2..=7u8 {
            let r = LegacySnapshot::decode(tag, &payload);
            assert!(
                matches!(r, Err(StoreError::Format(_))),
                "tag {} should not decode a v1 payload",
                tag
            );
        }
    }

    #[test]
    fn decode_unknown_version_is_unsupported() {
        let r = LegacySnapshot::decode(9, &[0x80]);
        assert!(matches!(r, Err(StoreError::UnsupportedVersion(9))));
    }

    #[test]
    fn empty_v6_payload_is_not_accepted_as_v7() {
        let v6 = LegacySnapshot::V1(v1_sample())
            .upgrade()
            .and_then(|s| s.upgrade())
            .and_then(|s| s.upgrade())
            .and_then(|s| s.upgrade())
            .and_then(|s| s.upgrade())
            .unwrap();
        let mut v6 = match v6 {
            LegacySnapshot::V6(s) => s,
            other => panic!("expected v6, got v{}", other.version()),
        };
        v6.parts.clear();
        let payload = codec::encode(&v6).unwrap();
        // 字段集合相同，只能靠 payload 内的 version 区分
        assert!(matches!(
            LegacySnapshot::decode(7, &payload),
            Err(StoreError::Format(_))
        ));
    }
}
