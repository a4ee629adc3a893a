use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Result, StoreError};
use crate::schema::{LegacySnapshot, SnapshotV7, CURRENT_VERSION};
use crate::storage::codec;

/// 文件头：version(1) + date_created(8, i64 LE, unix ms)
pub const HEADER_SIZE: usize = 1 + 8;

/// 关系型引擎文件签名探测长度
pub const RELATIONAL_PROBE_LEN: usize = 14;
const SQLITE_SIGNATURE: &[u8; RELATIONAL_PROBE_LEN] = b"SQLite format ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u8,
    pub created_at: i64,
}

/// 是否为关系型引擎自己的文件（已迁移）
pub fn is_relational_signature(bytes: &[u8]) -> bool {
    bytes.len() >= RELATIONAL_PROBE_LEN && &bytes[..RELATIONAL_PROBE_LEN] == SQLITE_SIGNATURE
}

pub fn parse_header(data: &[u8]) -> Result<(FileHeader, &[u8])> {
    if data.len() < HEADER_SIZE {
        return Err(StoreError::Format(format!(
            "file too small for header: {} bytes",
            data.len()
        )));
    }
    let version = data[0];
    let created_at = i64::from_le_bytes(
        data[1..HEADER_SIZE]
            .try_into()
            .map_err(|_| StoreError::Format("truncated header".into()))?,
    );
    Ok((
        FileHeader {
            version,
            created_at,
        },
        &data[HEADER_SIZE..],
    ))
}

/// 文件字节 → 对应版本的快照（不做 checksum 校验）
///
/// 已知版本号下的 payload 必须能解码，且必须是规范编码
/// （重新编码后逐字节一致），否则为 `Integrity`。
pub fn decode_file(data: &[u8]) -> Result<LegacySnapshot> {
    if is_relational_signature(data) {
        return Err(StoreError::Format(
            "file is a relational database, not a snapshot".into(),
        ));
    }
    let (header, payload) = parse_header(data)?;
    let snap = LegacySnapshot::decode(header.version, payload).map_err(|e| match e {
        StoreError::Format(msg) => StoreError::Integrity {
            reason: format!("v{} payload does not decode: {}", header.version, msg),
        },
        other => other,
    })?;
    let canonical = snap.encode_payload()?;
    if canonical != payload {
        return Err(StoreError::Integrity {
            reason: format!(
                "payload {} is not the canonical encoding {}",
                codec::digest(payload),
                codec::digest(&canonical)
            ),
        });
    }
    if snap.date_created() != header.created_at {
        tracing::warn!(
            "Snapshot header date_created {} != payload {}",
            header.created_at,
            snap.date_created()
        );
    }
    Ok(snap)
}

pub fn encode_file(snap: &LegacySnapshot) -> Result<Vec<u8>> {
    let payload = snap.encode_payload()?;
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.push(snap.version());
    out.extend_from_slice(&snap.date_created().to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// 单文件快照（atomic replacement）
///
/// 落盘流程：
/// 1) 写 `<name>.tmp`
/// 2) fsync(tmpfile)
/// 3) rename(tmp, target)（POSIX 保证原子）
/// 4) fsync(dir)
///
/// 任一步失败 target 都保持旧快照。
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// 读取并升级到当前版本；文件不存在返回 None
    ///
    /// checksum 在解码出的原始版本上校验（升级前），不匹配即 `Integrity`。
    /// 返回值第二项是文件里的原始版本号。
    pub async fn load(&self) -> Result<Option<(SnapshotV7, u8)>> {
        let data = match fs::read(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::from_io(&self.path, e)),
        };

        let snap = decode_file(&data)?.verify()?;
        let source_version = snap.version();
        if source_version != CURRENT_VERSION {
            tracing::info!(
                "Upgrading snapshot {} from v{} to v{}",
                self.path.display(),
                source_version,
                CURRENT_VERSION
            );
        }
        let current = snap.into_current()?;
        Ok(Some((current, source_version)))
    }

    /// 原子写入（调用方需已 seal checksum）
    pub async fn write_atomic(&self, snap: &SnapshotV7) -> Result<u64> {
        let persist_err = |source: std::io::Error| StoreError::Persistence {
            path: self.path.clone(),
            source,
        };

        let mut data = Vec::new();
        data.push(snap.version);
        data.extend_from_slice(&snap.date_created.to_le_bytes());
        data.extend_from_slice(&codec::encode(snap)?);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(persist_err)?;
            }
        }

        let tmp_path = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp_path).await.map_err(persist_err)?;
            file.write_all(&data).await.map_err(persist_err)?;
            file.sync_all().await.map_err(persist_err)?;
        }

        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(persist_err)?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Part;

    fn unique_tmp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("partsdb-format-{}-{}", tag, nanos))
    }

    fn sealed_sample() -> SnapshotV7 {
        let mut s = SnapshotV7::empty();
        s.date_created = 1_700_000_000_000;
        let mut p = Part::new("2N3904").with_description("NPN transistor");
        p.part_id = 1;
        s.parts.push(p);
        s.refresh_metadata();
        codec::seal(&mut s).unwrap();
        s
    }

    #[test]
    fn header_layout_is_version_then_timestamp() {
        let s = sealed_sample();
        let bytes = encode_file(&LegacySnapshot::V7(s.clone())).unwrap();
        assert_eq!(bytes[0], 7);
        let (h, payload) = parse_header(&bytes).unwrap();
        assert_eq!(h.version, 7);
        assert_eq!(h.created_at, s.date_created);
        assert_eq!(payload.len(), bytes.len() - HEADER_SIZE);
    }

    #[test]
    fn sqlite_signature_is_detected() {
        let mut bytes = b"SQLite format 3\0".to_vec();
        bytes.extend_from_slice(&[0u8; 84]);
        assert!(is_relational_signature(&bytes));
        assert!(!is_relational_signature(b"SQLite"));
        assert!(matches!(decode_file(&bytes), Err(StoreError::Format(_))));
    }

    #[test]
    fn truncated_file_is_format_error() {
        assert!(matches!(decode_file(&[7, 1, 2]), Err(StoreError::Format(_))));
    }

    #[tokio::test]
    async fn write_then_load_round_trip_creates_parent_dirs() {
        let dir = unique_tmp_dir("roundtrip");
        let file = SnapshotFile::new(dir.join("nested").join("parts.bin"));
        let s = sealed_sample();

        file.write_atomic(&s).await.unwrap();
        let (loaded, source) = file.load().await.unwrap().unwrap();
        assert_eq!(source, 7);
        assert_eq!(loaded, s);
        assert!(!file.tmp_path().exists());
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = unique_tmp_dir("missing");
        let file = SnapshotFile::new(dir.join("absent.bin"));
        assert!(file.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn flipped_payload_byte_is_integrity_error() {
        let dir = unique_tmp_dir("tamper");
        let file = SnapshotFile::new(dir.join("parts.bin"));
        file.write_atomic(&sealed_sample()).await.unwrap();

        let mut bytes = std::fs::read(file.path()).unwrap();
        // 翻转描述字符串里的一个字节：结构仍可解码，但内容已变
        let needle = b"NPN transistor";
        let pos = bytes
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap();
        bytes[pos] ^= 0x01;
        std::fs::write(file.path(), &bytes).unwrap();

        match file.load().await {
            Err(StoreError::Integrity { .. }) => {}
            other => panic!("expected integrity error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn retyped_integer_marker_is_integrity_error() {
        let bytes = encode_file(&LegacySnapshot::V7(sealed_sample())).unwrap();
        assert!(decode_file(&bytes).and_then(|s| s.verify()).is_ok());

        // uint64 (0xcf) → int64 (0xd3)：数值不变，编码不再规范
        let mut key = b"date_created".to_vec();
        key.push(0xcf);
        let pos = bytes[HEADER_SIZE..]
            .windows(key.len())
            .position(|w| w == key.as_slice())
            .unwrap()
            + HEADER_SIZE
            + key.len()
            - 1;
        let mut tampered = bytes.clone();
        tampered[pos] = 0xd3;

        match decode_file(&tampered) {
            Err(StoreError::Integrity { .. }) => {}
            other => panic!("expected integrity error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn every_flipped_payload_byte_is_integrity_error() {
        let bytes = encode_file(&LegacySnapshot::V7(sealed_sample())).unwrap();
        for mask in [0x01u8, 0x1c] {
            for i in HEADER_SIZE..bytes.len() {
                let mut tampered = bytes.clone();
                tampered[i] ^= mask;
                match decode_file(&tampered).and_then(|s| s.verify()) {
                    Err(StoreError::Integrity { .. }) => {}
                    Err(e) => panic!("byte {} ^ {:#x}: expected integrity error, got {}", i, mask, e),
                    Ok(_) => panic!("byte {} ^ {:#x}: tampered file accepted", i, mask),
                }
            }
        }
    }
}
