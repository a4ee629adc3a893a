//! 快照 schema 版本链（V1 → V7）
//!
//! 每个版本是独立的结构体，只能从紧邻的前一版本构造（`upgrade_from`），
//! 不存在跨版本直跳。结构体全部 `deny_unknown_fields`，且新增字段不带默认值，
//! 用错误的版本去解码会直接报 shape mismatch。

pub mod chain;
pub mod v1;
pub mod v2;
pub mod v3;
pub mod v4;
pub mod v5;
pub mod v6;
pub mod v7;

pub use chain::LegacySnapshot;
pub use v1::SnapshotV1;
pub use v2::SnapshotV2;
pub use v3::SnapshotV3;
pub use v4::SnapshotV4;
pub use v5::SnapshotV5;
pub use v6::SnapshotV6;
pub use v7::SnapshotV7;

/// 当前（终态）schema 版本
pub const CURRENT_VERSION: u8 = 7;

/// 所有版本快照的公共元数据访问
pub trait VersionedSnapshot {
    const VERSION: u8;

    /// payload 内记录的版本号（必须与文件头 tag 一致）
    fn version(&self) -> u8;
    fn date_created(&self) -> i64;
    fn checksum(&self) -> &str;
    fn checksum_mut(&mut self) -> &mut String;
}

macro_rules! impl_versioned_snapshot {
    ($ty:ty, $version:expr) => {
        impl $crate::schema::VersionedSnapshot for $ty {
            const VERSION: u8 = $version;

            fn version(&self) -> u8 {
                self.version
            }

            fn date_created(&self) -> i64 {
                self.date_created
            }

            fn checksum(&self) -> &str {
                &self.checksum
            }

            fn checksum_mut(&mut self) -> &mut String {
                &mut self.checksum
            }
        }
    };
}

pub(crate) use impl_versioned_snapshot;
