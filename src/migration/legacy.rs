use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::config::{MigrationConfig, StorageProvider};
use crate::error::{Result, StoreError};
use crate::migration::mapping::{self, EntityReport};
use crate::migration::relational::RelationalStore;
use crate::schema::SnapshotV7;
use crate::storage::format;

/// 旧快照 → SQLite 的迁移结果
#[derive(Clone, Debug, Serialize)]
pub struct MigrationReport {
    pub source_version: u8,
    pub database: PathBuf,
    pub backup: PathBuf,
    pub entities: Vec<EntityReport>,
    /// repair 阶段置空的悬空引用数
    pub repaired_references: usize,
    pub elapsed_ms: u64,
}

impl MigrationReport {
    pub fn imported(&self, entity: &str) -> usize {
        self.entities
            .iter()
            .find(|e| e.entity == entity)
            .map_or(0, |e| e.imported)
    }

    pub fn skipped(&self, entity: &str) -> usize {
        self.entities
            .iter()
            .find(|e| e.entity == entity)
            .map_or(0, |e| e.skipped)
    }

    pub fn total_imported(&self) -> usize {
        self.entities.iter().map(|e| e.imported).sum()
    }
}

/// `<file>.<provider>.backup`，与原文件同目录
pub fn backup_path(path: &Path, provider: StorageProvider) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.backup", provider.as_str()));
    path.with_file_name(name)
}

/// 执行旧快照迁移（一次性、同步）
///
/// 线性步骤：guard → backup → clear → provision → import → repair。
/// provision 之后任一步失败都会回滚：删除半成品库，用备份恢复原文件，
/// 移除备份（不阻塞重试），再报 `MigrationFailure`。
/// 成功时备份保留在原处。
pub fn migrate_legacy(path: &Path, cfg: &MigrationConfig) -> Result<MigrationReport> {
    let started = Instant::now();
    let backup = backup_path(path, StorageProvider::Binary);

    // guard
    if backup.exists() {
        return Err(StoreError::GuardViolation(backup));
    }

    let data = std::fs::read(path).map_err(|e| StoreError::from_io(path, e))?;
    let legacy = format::decode_file(&data)?.verify()?;
    let source_version = legacy.version();
    let snapshot = legacy.into_current()?;
    tracing::info!(
        "Migrating legacy snapshot v{} ({} parts) at {}",
        source_version,
        snapshot.parts.len(),
        path.display()
    );

    // backup
    std::fs::copy(path, &backup).map_err(|e| StoreError::from_io(&backup, e))?;
    tracing::info!("Backup written to {}", backup.display());

    // clear
    if let Err(e) = std::fs::remove_file(path) {
        let _ = std::fs::remove_file(&backup);
        return Err(StoreError::from_io(path, e));
    }

    match provision_and_import(path, &snapshot, cfg) {
        Ok((entities, repaired_references)) => {
            let report = MigrationReport {
                source_version,
                database: path.to_path_buf(),
                backup,
                entities,
                repaired_references,
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            tracing::info!(
                "Migration complete: {} rows imported in {} ms",
                report.total_imported(),
                report.elapsed_ms
            );
            Ok(report)
        }
        Err(e) => {
            tracing::error!("Migration of {} failed: {}", path.display(), e);
            let detail = match restore_from_backup(path, &backup) {
                Ok(()) => e.to_string(),
                Err(restore) => {
                    tracing::error!(
                        "Restoring {} from {} failed: {}",
                        path.display(),
                        backup.display(),
                        restore
                    );
                    format!("{}; restore from backup also failed: {}", e, restore)
                }
            };
            Err(StoreError::MigrationFailure(detail))
        }
    }
}

/// provision + import + repair；事务未提交即随 drop 回滚
fn provision_and_import(
    path: &Path,
    snapshot: &SnapshotV7,
    cfg: &MigrationConfig,
) -> Result<(Vec<EntityReport>, usize)> {
    let mut db = RelationalStore::open(path)?;
    db.migrate()?;

    let conn = db.connection_mut();
    let tx = conn.transaction()?;
    // 主记录上的悬空可选引用先写入，repair 后在提交时统一校验
    tx.execute_batch("PRAGMA defer_foreign_keys = ON;")?;

    let owner = mapping::ensure_owner(&tx, cfg)?;
    let entities = mapping::import_snapshot(&tx, snapshot, owner)?;
    let repaired = mapping::repair(&tx, owner)?;
    tx.commit()?;
    Ok((entities, repaired))
}

/// 删除半成品库（连同 journal），用备份恢复原文件，移除备份
fn restore_from_backup(path: &Path, backup: &Path) -> std::io::Result<()> {
    for p in [path.to_path_buf(), sidecar(path, "-journal")] {
        match std::fs::remove_file(&p) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    std::fs::copy(backup, path)?;
    std::fs::remove_file(backup)?;
    tracing::info!("Restored {} from backup", path.display());
    Ok(())
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
