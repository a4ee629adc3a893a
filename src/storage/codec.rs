use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};
use crate::schema::VersionedSnapshot;

/// 自描述编码：MessagePack + 字段名（结构体编码成 map）
///
/// 旧版本程序写出的 blob 不依赖外部 schema 文件即可解码；
/// 字段名随数据落盘，多一个/少一个字段都能被 `deny_unknown_fields` 发现。
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// 边编码边哈希，不落中间 Vec
struct DigestWriter {
    hasher: Sha256,
    bytes: u64,
}

impl DigestWriter {
    fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    fn finish(self) -> (u64, String) {
        (self.bytes, STANDARD.encode(self.hasher.finalize()))
    }
}

impl Write for DigestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.hasher.update(buf);
        self.bytes += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// 原始字节的 base64(SHA-256)
pub fn digest(bytes: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(bytes))
}

/// checksum = base64(SHA-256(encode(snapshot 去掉 checksum 字段)))
///
/// checksum 字段为空时不参与序列化，这里临时把它取走，编码完成后原样放回。
pub fn compute_checksum<S>(snap: &mut S) -> Result<String>
where
    S: Serialize + VersionedSnapshot,
{
    let saved = std::mem::take(snap.checksum_mut());
    let mut w = DigestWriter::new();
    let res = rmp_serde::encode::write_named(&mut w, &*snap);
    *snap.checksum_mut() = saved;
    res?;
    let (len, sum) = w.finish();
    tracing::trace!("checksum over {} bytes (v{})", len, S::VERSION);
    Ok(sum)
}

/// 计算并写入 checksum
pub fn seal<S>(snap: &mut S) -> Result<()>
where
    S: Serialize + VersionedSnapshot,
{
    let sum = compute_checksum(snap)?;
    *snap.checksum_mut() = sum;
    Ok(())
}

pub fn checksum_matches<S>(snap: &mut S) -> Result<bool>
where
    S: Serialize + VersionedSnapshot,
{
    let computed = compute_checksum(snap)?;
    Ok(snap.checksum() == computed)
}

/// 加载路径的完整性校验：不匹配即 `Integrity`，调用方不得继续使用数据
pub fn verify<S>(mut snap: S) -> Result<S>
where
    S: Serialize + VersionedSnapshot,
{
    let computed = compute_checksum(&mut snap)?;
    if snap.checksum() != computed {
        return Err(StoreError::Integrity {
            reason: format!(
                "checksum mismatch: stored {}, computed {}",
                snap.checksum(),
                computed
            ),
        });
    }
    Ok(snap)
}
