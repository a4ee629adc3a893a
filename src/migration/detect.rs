use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;

use crate::config::StorageProvider;
use crate::error::{Result, StoreError};
use crate::migration::relational::{table_exists, HISTORY_TABLE, LATEST_SCHEMA_VERSION};
use crate::storage::format;

/// 迁移检测结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    pub provider: StorageProvider,
    pub required: bool,
    pub reason: String,
    /// 识别出的旧快照版本（仅 binary）
    pub legacy_version: Option<u8>,
    pub legacy_created_at: Option<i64>,
}

impl MigrationPlan {
    fn not_required(provider: StorageProvider, reason: impl Into<String>) -> Self {
        Self {
            provider,
            required: false,
            reason: reason.into(),
            legacy_version: None,
            legacy_created_at: None,
        }
    }

    fn required(provider: StorageProvider, reason: impl Into<String>) -> Self {
        Self {
            required: true,
            ..Self::not_required(provider, reason)
        }
    }
}

/// 判断给定后端的数据文件是否需要迁移
///
/// 格式/校验失败在这里消化（视为“不是旧格式”）；权限/锁定错误上抛。
pub fn detect(provider: StorageProvider, path: &Path) -> Result<MigrationPlan> {
    match provider {
        StorageProvider::Binary => detect_binary(path),
        StorageProvider::Sqlite => detect_sqlite(path),
    }
}

fn detect_binary(path: &Path) -> Result<MigrationPlan> {
    plan_binary(path, std::fs::read(path))
}

/// 按读取结果判定；读失败中除 NotFound 外一律上抛（权限/锁定为 `Access`）
fn plan_binary(path: &Path, read: std::io::Result<Vec<u8>>) -> Result<MigrationPlan> {
    let provider = StorageProvider::Binary;
    let data = match read {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(MigrationPlan::not_required(provider, "no legacy file"));
        }
        Err(e) => return Err(StoreError::from_io(path, e)),
    };

    if format::is_relational_signature(&data) {
        return Ok(MigrationPlan::not_required(provider, "already migrated"));
    }

    let snap = match format::decode_file(&data).and_then(|s| s.verify()) {
        Ok(s) => s,
        Err(e) if e.is_format_miss() => {
            tracing::warn!(
                "{} is not a recognized legacy snapshot: {}",
                path.display(),
                e
            );
            return Ok(MigrationPlan::not_required(
                provider,
                format!("not a recognized legacy format: {}", e),
            ));
        }
        Err(e) => return Err(e),
    };

    tracing::info!(
        "Legacy snapshot v{} detected at {}",
        snap.version(),
        path.display()
    );
    Ok(MigrationPlan {
        legacy_version: Some(snap.version()),
        legacy_created_at: Some(snap.date_created()),
        ..MigrationPlan::required(provider, format!("legacy snapshot v{}", snap.version()))
    })
}

fn detect_sqlite(path: &Path) -> Result<MigrationPlan> {
    let provider = StorageProvider::Sqlite;
    match std::fs::metadata(path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(MigrationPlan::required(provider, "database does not exist"));
        }
        Err(e) => return Err(StoreError::from_io(path, e)),
    }

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    if !table_exists(&conn, HISTORY_TABLE)? {
        return Ok(MigrationPlan::required(
            provider,
            "migration history missing",
        ));
    }

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM __migrations_history",
        [],
        |row| row.get(0),
    )?;
    if version < LATEST_SCHEMA_VERSION {
        return Ok(MigrationPlan::required(
            provider,
            format!(
                "schema at version {}, latest is {}",
                version, LATEST_SCHEMA_VERSION
            ),
        ));
    }
    Ok(MigrationPlan::not_required(provider, "schema up to date"))
}
