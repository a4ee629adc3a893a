use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// 存储后端
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// 旧版单文件二进制快照
    #[default]
    Binary,
    Sqlite,
}

impl StorageProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageProvider::Binary => "binary",
            StorageProvider::Sqlite => "sqlite",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub path: PathBuf,
    /// 后台 flush 周期
    pub flush_interval_ms: u64,
    /// 关闭时等待后台周期结束的上限
    pub shutdown_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Binary,
            path: default_data_path(),
            flush_interval_ms: 500,
            shutdown_timeout_ms: 2000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// 导入记录统一归属的管理员账号
    pub admin_user: String,
    pub admin_email: String,
    pub organization: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            admin_user: "admin".to_string(),
            admin_email: "admin@localhost".to_string(),
            organization: "Default".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub migration: MigrationConfig,
}

impl Config {
    /// 从 toml 文件加载；缺省字段取默认值
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 单文件 binary 存储、其余默认（测试与嵌入调用方使用）
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                path: path.into(),
                ..StorageConfig::default()
            },
            ..Config::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.flush_interval_ms == 0 {
            return Err(StoreError::Config(
                "storage.flush_interval_ms must be > 0".into(),
            ));
        }
        if self.storage.path.as_os_str().is_empty() {
            return Err(StoreError::Config("storage.path must be set".into()));
        }
        if self.migration.admin_user.trim().is_empty() {
            return Err(StoreError::Config(
                "migration.admin_user must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.storage.flush_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.shutdown_timeout_ms)
    }
}

/// 默认数据文件：<data_dir>/partsdb/partsdb.bin
pub fn default_data_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("partsdb")
        .join("partsdb.bin")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            [storage]
            path = "/var/lib/partsdb/parts.bin"
            flush_interval_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(cfg.storage.provider, StorageProvider::Binary);
        assert_eq!(cfg.storage.path, PathBuf::from("/var/lib/partsdb/parts.bin"));
        assert_eq!(cfg.flush_interval(), Duration::from_millis(250));
        assert_eq!(cfg.shutdown_timeout(), Duration::from_millis(2000));
        assert_eq!(cfg.migration.admin_user, "admin");
    }

    #[test]
    fn provider_parses_lowercase() {
        let cfg = Config::from_toml_str(
            r#"
            [storage]
            provider = "sqlite"
            path = "parts.db"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.storage.provider, StorageProvider::Sqlite);
    }

    #[test]
    fn zero_flush_interval_is_rejected() {
        let r = Config::from_toml_str(
            r#"
            [storage]
            path = "x.bin"
            flush_interval_ms = 0
            "#,
        );
        assert!(matches!(r, Err(StoreError::Config(_))));
    }
}
