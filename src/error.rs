use std::path::PathBuf;

/// 存储层统一错误类型
///
/// 分类决定传播策略：
/// - `Integrity` / `Format`：检测阶段本地消化（决定是否迁移）；加载阶段则致命
/// - `Access` / `GuardViolation`：致命，直接上抛给运维
/// - `Persistence`：上抛给调用方，但 store 保持可用（下个 flush 周期重试）
/// - `MigrationFailure`：已完成回滚与备份恢复后才上报
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("integrity check failed: {reason}")]
    Integrity { reason: String },

    #[error("unsupported schema version {0} (known: 1..=7)")]
    UnsupportedVersion(u8),

    #[error("access denied for {path}: {source}")]
    Access {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("payload does not match expected format: {0}")]
    Format(String),

    #[error("backup file already exists at {0}; remove or restore it before migrating again")]
    GuardViolation(PathBuf),

    #[error("failed to persist snapshot to {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("migration failed and was rolled back: {0}")]
    MigrationFailure(String),

    #[error("invalid search query: {0}")]
    InvalidQuery(String),

    #[error("encode failed: {0}")]
    Codec(#[from] rmp_serde::encode::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// 迁移检测阶段可本地消化的错误：只说明“不是这种格式”，不需要运维介入
    pub fn is_format_miss(&self) -> bool {
        matches!(
            self,
            StoreError::Format(_) | StoreError::Integrity { .. } | StoreError::UnsupportedVersion(_)
        )
    }

    /// io 错误按 kind 分流：权限/锁定 → Access，其余保持 Io
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        if is_access_error(&err) {
            StoreError::Access {
                path: path.to_path_buf(),
                source: err,
            }
        } else {
            StoreError::Io(err)
        }
    }
}

/// 文件被锁定/无权限。Windows 的 sharing violation (32) / lock violation (33) 也算。
pub fn is_access_error(err: &std::io::Error) -> bool {
    if err.kind() == std::io::ErrorKind::PermissionDenied {
        return true;
    }
    cfg!(windows) && matches!(err.raw_os_error(), Some(32) | Some(33))
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Format(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_maps_to_access() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        let e = StoreError::from_io(std::path::Path::new("/tmp/x.bin"), err);
        assert!(matches!(e, StoreError::Access { .. }));
        assert!(!e.is_format_miss());
    }

    #[test]
    fn format_and_integrity_are_detection_misses() {
        assert!(StoreError::Format("bad".into()).is_format_miss());
        assert!(StoreError::Integrity {
            reason: "checksum mismatch".into()
        }
        .is_format_miss());
        assert!(!StoreError::GuardViolation(PathBuf::from("x")).is_format_miss());
    }
}
