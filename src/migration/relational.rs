use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Row};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::core::Part;
use crate::error::{Result, StoreError};

pub const HISTORY_TABLE: &str = "__migrations_history";

/// 迁移目标库里的全部业务表（count 只接受这些名字）
pub const TABLES: &[&str] = &[
    "organizations",
    "users",
    "part_types",
    "projects",
    "parts",
    "stored_files",
    "pcbs",
    "project_part_assignments",
    "project_pcb_assignments",
    "part_suppliers",
    "oauth_credentials",
    "oauth_requests",
    "pcb_stored_file_assignments",
];

/// 导入后需打 organization_id 的表（除 organizations 自身）
pub const OWNED_TABLES: &[&str] = &[
    "users",
    "part_types",
    "projects",
    "parts",
    "stored_files",
    "pcbs",
    "project_part_assignments",
    "project_pcb_assignments",
    "part_suppliers",
    "oauth_credentials",
    "oauth_requests",
    "pcb_stored_file_assignments",
];

const CREATE_HISTORY_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS __migrations_history (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#;

pub(crate) const INITIAL_SCHEMA_SQL: &str = r#"
CREATE TABLE users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_name TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL DEFAULT '',
    is_admin INTEGER NOT NULL DEFAULT 0,
    date_created TEXT NOT NULL
);

CREATE TABLE part_types (
    part_type_id INTEGER PRIMARY KEY,
    parent_part_type_id INTEGER NULL REFERENCES part_types(part_type_id),
    name TEXT NOT NULL,
    user_id INTEGER NULL REFERENCES users(user_id),
    date_created TEXT NOT NULL
);

CREATE TABLE projects (
    project_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    location TEXT NOT NULL DEFAULT '',
    color INTEGER NOT NULL DEFAULT 0,
    user_id INTEGER NULL REFERENCES users(user_id),
    date_created TEXT NOT NULL
);

CREATE TABLE parts (
    part_id INTEGER PRIMARY KEY,
    part_number TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    keywords TEXT NOT NULL DEFAULT '[]',
    manufacturer TEXT NOT NULL DEFAULT '',
    manufacturer_part_number TEXT NOT NULL DEFAULT '',
    digikey_part_number TEXT NOT NULL DEFAULT '',
    mouser_part_number TEXT NOT NULL DEFAULT '',
    arrow_part_number TEXT NOT NULL DEFAULT '',
    location TEXT NOT NULL DEFAULT '',
    bin_number TEXT NOT NULL DEFAULT '',
    bin_number2 TEXT NOT NULL DEFAULT '',
    quantity INTEGER NOT NULL DEFAULT 0,
    low_stock_threshold INTEGER NOT NULL DEFAULT 0,
    cost REAL NOT NULL DEFAULT 0,
    part_type_id INTEGER NULL REFERENCES part_types(part_type_id),
    project_id INTEGER NULL REFERENCES projects(project_id),
    mounting_type_id INTEGER NOT NULL DEFAULT 0,
    package_type TEXT NOT NULL DEFAULT '',
    datasheet_url TEXT NOT NULL DEFAULT '',
    user_id INTEGER NULL REFERENCES users(user_id),
    date_created TEXT NOT NULL
);

CREATE INDEX idx_parts_part_number ON parts(part_number COLLATE NOCASE);

CREATE TABLE stored_files (
    stored_file_id INTEGER PRIMARY KEY,
    part_id INTEGER NOT NULL REFERENCES parts(part_id),
    file_name TEXT NOT NULL,
    original_file_name TEXT NOT NULL DEFAULT '',
    file_length INTEGER NOT NULL DEFAULT 0,
    crc32 INTEGER NOT NULL DEFAULT 0,
    stored_file_type INTEGER NOT NULL DEFAULT 0,
    user_id INTEGER NULL REFERENCES users(user_id),
    date_created TEXT NOT NULL
);

CREATE TABLE pcbs (
    pcb_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    serial_number TEXT NOT NULL DEFAULT '',
    last_serial_number TEXT NOT NULL DEFAULT '',
    user_id INTEGER NULL REFERENCES users(user_id),
    date_created TEXT NOT NULL
);

CREATE TABLE project_part_assignments (
    project_part_assignment_id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES projects(project_id),
    part_id INTEGER NULL REFERENCES parts(part_id),
    part_name TEXT NOT NULL DEFAULT '',
    quantity INTEGER NOT NULL DEFAULT 0,
    quantity_available INTEGER NOT NULL DEFAULT 0,
    notes TEXT NOT NULL DEFAULT '',
    reference_id TEXT NOT NULL DEFAULT '',
    user_id INTEGER NULL REFERENCES users(user_id),
    date_created TEXT NOT NULL
);

CREATE TABLE project_pcb_assignments (
    project_pcb_assignment_id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES projects(project_id),
    pcb_id INTEGER NOT NULL REFERENCES pcbs(pcb_id),
    user_id INTEGER NULL REFERENCES users(user_id),
    date_created TEXT NOT NULL
);

CREATE TABLE part_suppliers (
    part_supplier_id INTEGER PRIMARY KEY,
    part_id INTEGER NOT NULL REFERENCES parts(part_id),
    name TEXT NOT NULL,
    supplier_part_number TEXT NOT NULL DEFAULT '',
    cost REAL NOT NULL DEFAULT 0,
    quantity_available INTEGER NOT NULL DEFAULT 0,
    minimum_order_quantity INTEGER NOT NULL DEFAULT 0,
    product_url TEXT NOT NULL DEFAULT '',
    image_url TEXT NOT NULL DEFAULT '',
    user_id INTEGER NULL REFERENCES users(user_id),
    date_created TEXT NOT NULL
);

CREATE TABLE oauth_credentials (
    oauth_credential_id INTEGER PRIMARY KEY AUTOINCREMENT,
    provider TEXT NOT NULL,
    access_token TEXT NOT NULL DEFAULT '',
    refresh_token TEXT NOT NULL DEFAULT '',
    date_expires TEXT NOT NULL,
    user_id INTEGER NULL REFERENCES users(user_id),
    date_created TEXT NOT NULL
);

CREATE TABLE oauth_requests (
    oauth_request_id INTEGER PRIMARY KEY,
    provider TEXT NOT NULL,
    request_id TEXT NOT NULL DEFAULT '',
    auth_code TEXT NOT NULL DEFAULT '',
    error TEXT NOT NULL DEFAULT '',
    error_description TEXT NOT NULL DEFAULT '',
    return_to_url TEXT NOT NULL DEFAULT '',
    authorization_received INTEGER NOT NULL DEFAULT 0,
    user_id INTEGER NULL REFERENCES users(user_id),
    date_created TEXT NOT NULL,
    date_modified TEXT NOT NULL
);

CREATE TABLE pcb_stored_file_assignments (
    pcb_stored_file_assignment_id INTEGER PRIMARY KEY,
    pcb_id INTEGER NOT NULL REFERENCES pcbs(pcb_id),
    stored_file_id INTEGER NOT NULL REFERENCES stored_files(stored_file_id),
    name TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT '',
    user_id INTEGER NULL REFERENCES users(user_id),
    date_created TEXT NOT NULL
);
"#;

const ORGANIZATIONS_SQL: &str = r#"
CREATE TABLE organizations (
    organization_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    date_created TEXT NOT NULL
);

ALTER TABLE users ADD COLUMN organization_id INTEGER NULL REFERENCES organizations(organization_id);
ALTER TABLE part_types ADD COLUMN organization_id INTEGER NULL REFERENCES organizations(organization_id);
ALTER TABLE projects ADD COLUMN organization_id INTEGER NULL REFERENCES organizations(organization_id);
ALTER TABLE parts ADD COLUMN organization_id INTEGER NULL REFERENCES organizations(organization_id);
ALTER TABLE stored_files ADD COLUMN organization_id INTEGER NULL REFERENCES organizations(organization_id);
ALTER TABLE pcbs ADD COLUMN organization_id INTEGER NULL REFERENCES organizations(organization_id);
ALTER TABLE project_part_assignments ADD COLUMN organization_id INTEGER NULL REFERENCES organizations(organization_id);
ALTER TABLE project_pcb_assignments ADD COLUMN organization_id INTEGER NULL REFERENCES organizations(organization_id);
ALTER TABLE part_suppliers ADD COLUMN organization_id INTEGER NULL REFERENCES organizations(organization_id);
ALTER TABLE oauth_credentials ADD COLUMN organization_id INTEGER NULL REFERENCES organizations(organization_id);
ALTER TABLE oauth_requests ADD COLUMN organization_id INTEGER NULL REFERENCES organizations(organization_id);
ALTER TABLE pcb_stored_file_assignments ADD COLUMN organization_id INTEGER NULL REFERENCES organizations(organization_id);
"#;

/// 一条有序 schema 迁移
#[derive(Clone, Copy, Debug)]
pub struct SchemaMigration {
    pub version: i64,
    pub name: &'static str,
    sql: &'static str,
}

pub const MIGRATIONS: &[SchemaMigration] = &[
    SchemaMigration {
        version: 1,
        name: "initial_schema",
        sql: INITIAL_SCHEMA_SQL,
    },
    SchemaMigration {
        version: 2,
        name: "organizations",
        sql: ORGANIZATIONS_SQL,
    },
];

pub const LATEST_SCHEMA_VERSION: i64 = 2;

/// SQLite 关系型库
pub struct RelationalStore {
    conn: Connection,
    path: PathBuf,
}

impl RelationalStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// 应用全部待执行迁移，返回本次实际应用的版本
    ///
    /// 历史表缺失但 parts 已存在（旧库首次接入）：先补记已具备的迁移，
    /// 避免重复建表。每条迁移独立事务。
    pub fn migrate(&mut self) -> Result<Vec<i64>> {
        let had_history = table_exists(&self.conn, HISTORY_TABLE)?;
        self.conn.execute_batch(CREATE_HISTORY_SQL)?;

        if !had_history {
            self.bootstrap_history()?;
        }

        let current = self.schema_version()?;
        let mut applied = Vec::new();
        for m in MIGRATIONS.iter().filter(|m| m.version > current) {
            let tx = self.conn.transaction()?;
            tx.execute_batch(m.sql)?;
            record_migration(&tx, m)?;
            tx.commit()?;
            tracing::info!("Applied schema migration {} ({})", m.version, m.name);
            applied.push(m.version);
        }

        let version = self.schema_version()?;
        if version != LATEST_SCHEMA_VERSION {
            return Err(StoreError::Format(format!(
                "unsupported schema version {}; expected {}",
                version, LATEST_SCHEMA_VERSION
            )));
        }
        Ok(applied)
    }

    fn bootstrap_history(&self) -> Result<()> {
        if !table_exists(&self.conn, "parts")? {
            return Ok(());
        }
        record_migration(&self.conn, &MIGRATIONS[0])?;
        if table_has_column(&self.conn, "parts", "organization_id")? {
            record_migration(&self.conn, &MIGRATIONS[1])?;
        }
        tracing::info!(
            "Bootstrapped migration history for existing schema at {}",
            self.path.display()
        );
        Ok(())
    }

    /// 已记录的最高迁移版本；无历史表时为 0
    pub fn schema_version(&self) -> Result<i64> {
        if !table_exists(&self.conn, HISTORY_TABLE)? {
            return Ok(0);
        }
        let v = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM __migrations_history",
            [],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(v)
    }

    pub fn applied_migrations(&self) -> Result<Vec<(i64, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT version, name FROM __migrations_history ORDER BY version")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn count(&self, table: &str) -> Result<i64> {
        if !TABLES.contains(&table) {
            return Err(StoreError::InvalidQuery(format!("unknown table: {}", table)));
        }
        let n = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get::<_, i64>(0)
            })?;
        Ok(n)
    }

    /// 零件号精确匹配（大小写不敏感）
    pub fn get_part_by_number(&self, part_number: &str) -> Result<Option<Part>> {
        let row = self
            .conn
            .query_row(
                "SELECT part_id, part_number, description, keywords, manufacturer,
                        manufacturer_part_number, digikey_part_number, mouser_part_number,
                        arrow_part_number, location, bin_number, bin_number2, quantity,
                        low_stock_threshold, cost, part_type_id, project_id, mounting_type_id,
                        package_type, datasheet_url, date_created
                 FROM parts WHERE part_number = ?1 COLLATE NOCASE
                 ORDER BY part_id LIMIT 1",
                params![part_number],
                PartRow::from_row,
            )
            .optional()?;
        row.map(PartRow::into_part).transpose()
    }
}

/// 负数 id 不会出现在导入的数据里，读到即报错
fn row_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let v: i64 = row.get(idx)?;
    u64::try_from(v).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, v))
}

fn opt_row_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<u64>> {
    let v: Option<i64> = row.get(idx)?;
    v.map(|v| u64::try_from(v).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, v)))
        .transpose()
}

/// parts 表的一行（时间与 keywords 尚未解析）
struct PartRow {
    part: Part,
    keywords: String,
    date_created: String,
}

impl PartRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let part = Part {
            part_id: row_id(row, 0)?,
            part_number: row.get(1)?,
            description: row.get(2)?,
            manufacturer: row.get(4)?,
            manufacturer_part_number: row.get(5)?,
            digikey_part_number: row.get(6)?,
            mouser_part_number: row.get(7)?,
            arrow_part_number: row.get(8)?,
            location: row.get(9)?,
            bin_number: row.get(10)?,
            bin_number2: row.get(11)?,
            quantity: row.get(12)?,
            low_stock_threshold: row.get(13)?,
            cost: row.get(14)?,
            part_type_id: opt_row_id(row, 15)?.unwrap_or(0),
            project_id: opt_row_id(row, 16)?,
            mounting_type_id: {
                let v: i64 = row.get(17)?;
                u32::try_from(v).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(17, v))?
            },
            package_type: row.get(18)?,
            datasheet_url: row.get(19)?,
            ..Default::default()
        };
        Ok(Self {
            part,
            keywords: row.get(3)?,
            date_created: row.get(20)?,
        })
    }

    fn into_part(self) -> Result<Part> {
        let mut part = self.part;
        part.keywords = serde_json::from_str(&self.keywords)
            .map_err(|e| StoreError::Format(format!("invalid keywords column: {}", e)))?;
        part.date_created = rfc3339_to_ms(&self.date_created)?;
        Ok(part)
    }
}

fn record_migration(conn: &Connection, m: &SchemaMigration) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO __migrations_history(version, name, applied_at) VALUES (?1, ?2, ?3)",
        params![m.version, m.name, now_rfc3339()?],
    )?;
    Ok(())
}

pub fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![table_name],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    if !table_exists(conn, table)? {
        return Ok(false);
    }
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| StoreError::Format(format!("failed to format RFC3339 timestamp: {}", e)))
}

/// unix ms → RFC3339（UTC）
pub(crate) fn ms_to_rfc3339(ms: i64) -> Result<String> {
    let dt = OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .map_err(|e| StoreError::Format(format!("timestamp {} out of range: {}", ms, e)))?;
    dt.format(&Rfc3339)
        .map_err(|e| StoreError::Format(format!("failed to format RFC3339 timestamp: {}", e)))
}

pub(crate) fn rfc3339_to_ms(value: &str) -> Result<i64> {
    let dt = OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| StoreError::Format(format!("invalid RFC3339 timestamp {}: {}", value, e)))?;
    Ok((dt.unix_timestamp_nanos() / 1_000_000) as i64)
}
