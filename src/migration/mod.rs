//! 旧快照 → SQLite 的迁移
//!
//! - detect：判断是否需要迁移（格式错误在此消化）
//! - legacy：带备份/回滚的一次性导入
//! - relational：目标库 schema 与有序迁移
//! - mapping：逐实体映射、引用过滤与导入后修正

pub mod detect;
pub mod legacy;
pub mod mapping;
pub mod relational;

pub use detect::{detect, MigrationPlan};
pub use legacy::{backup_path, migrate_legacy, MigrationReport};
pub use mapping::EntityReport;
pub use relational::{RelationalStore, LATEST_SCHEMA_VERSION};

use crate::config::{Config, StorageProvider};
use crate::error::Result;

/// 启动阶段的迁移结果
#[derive(Debug)]
pub struct StartupOutcome {
    pub legacy: MigrationPlan,
    pub report: Option<MigrationReport>,
    /// 本次应用的 schema 迁移版本（sqlite 后端）
    pub applied: Vec<i64>,
}

/// 在 store 对外服务之前执行：按配置检测并完成必要的迁移
///
/// binary 后端只做检测（旧版本文件由 `PartStore` 自行升级）；
/// sqlite 后端在发现旧快照时先导入，再补齐 schema 迁移。
pub fn prepare_storage(config: &Config) -> Result<StartupOutcome> {
    let path = &config.storage.path;
    let legacy = detect(StorageProvider::Binary, path)?;

    if config.storage.provider == StorageProvider::Binary {
        return Ok(StartupOutcome {
            legacy,
            report: None,
            applied: Vec::new(),
        });
    }

    let report = if legacy.required {
        Some(migrate_legacy(path, &config.migration)?)
    } else {
        None
    };

    let mut applied = Vec::new();
    if detect(StorageProvider::Sqlite, path)?.required {
        applied = RelationalStore::open(path)?.migrate()?;
    }

    Ok(StartupOutcome {
        legacy,
        report,
        applied,
    })
}
