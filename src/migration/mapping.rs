use std::collections::HashSet;

use rusqlite::{params, Transaction};
use serde::Serialize;

use crate::config::MigrationConfig;
use crate::core::{
    OAuthCredential, OAuthRequest, Part, PartSupplier, PartType, Pcb, PcbStoredFileAssignment,
    Project, ProjectPartAssignment, ProjectPcbAssignment, StoredFile,
};
use crate::error::{Result, StoreError};
use crate::migration::relational::{ms_to_rfc3339, now_rfc3339, OWNED_TABLES};
use crate::schema::SnapshotV7;

/// 导入记录的归属：默认组织 + 管理员
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Owner {
    pub organization_id: i64,
    pub user_id: i64,
}

/// 单类实体的导入结果
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    pub entity: &'static str,
    pub imported: usize,
    /// 父记录缺失被跳过
    pub skipped: usize,
}

/// 关系库主键是 i64；超出范围的 id 让整个导入失败回滚
fn sql_id(id: u64) -> Result<i64> {
    i64::try_from(id)
        .map_err(|_| StoreError::Format(format!("id {} exceeds the relational key range", id)))
}

/// 确保默认组织与管理员存在，返回其 id
pub fn ensure_owner(tx: &Transaction<'_>, cfg: &MigrationConfig) -> Result<Owner> {
    let now = now_rfc3339()?;
    tx.execute(
        "INSERT OR IGNORE INTO organizations(name, date_created) VALUES (?1, ?2)",
        params![cfg.organization, now],
    )?;
    let organization_id: i64 = tx.query_row(
        "SELECT organization_id FROM organizations WHERE name = ?1",
        params![cfg.organization],
        |row| row.get(0),
    )?;

    tx.execute(
        "INSERT OR IGNORE INTO users(user_name, email, is_admin, date_created, organization_id)
         VALUES (?1, ?2, 1, ?3, ?4)",
        params![cfg.admin_user, cfg.admin_email, now, organization_id],
    )?;
    let user_id: i64 = tx.query_row(
        "SELECT user_id FROM users WHERE user_name = ?1",
        params![cfg.admin_user],
        |row| row.get(0),
    )?;

    Ok(Owner {
        organization_id,
        user_id,
    })
}

fn insert_part_type(tx: &Transaction<'_>, t: &PartType, owner: Owner) -> Result<()> {
    tx.execute(
        "INSERT INTO part_types(part_type_id, parent_part_type_id, name, user_id, date_created)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            sql_id(t.part_type_id)?,
            t.parent_part_type_id.map(sql_id).transpose()?,
            t.name,
            owner.user_id,
            ms_to_rfc3339(t.date_created)?,
        ],
    )?;
    Ok(())
}

fn insert_project(tx: &Transaction<'_>, p: &Project, owner: Owner) -> Result<()> {
    tx.execute(
        "INSERT INTO projects(project_id, name, description, location, color, user_id, date_created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            sql_id(p.project_id)?,
            p.name,
            p.description,
            p.location,
            p.color,
            owner.user_id,
            ms_to_rfc3339(p.date_created)?,
        ],
    )?;
    Ok(())
}

fn insert_part(tx: &Transaction<'_>, p: &Part, owner: Owner) -> Result<()> {
    let keywords = serde_json::to_string(&p.keywords)
        .map_err(|e| StoreError::Format(format!("failed to encode keywords: {}", e)))?;
    // part_type_id 0 = 未分类
    let part_type_id = (p.part_type_id != 0)
        .then(|| sql_id(p.part_type_id))
        .transpose()?;
    tx.execute(
        "INSERT INTO parts(
            part_id, part_number, description, keywords, manufacturer,
            manufacturer_part_number, digikey_part_number, mouser_part_number,
            arrow_part_number, location, bin_number, bin_number2, quantity,
            low_stock_threshold, cost, part_type_id, project_id, mounting_type_id,
            package_type, datasheet_url, user_id, date_created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                 ?17, ?18, ?19, ?20, ?21, ?22)",
        params![
            sql_id(p.part_id)?,
            p.part_number,
            p.description,
            keywords,
            p.manufacturer,
            p.manufacturer_part_number,
            p.digikey_part_number,
            p.mouser_part_number,
            p.arrow_part_number,
            p.location,
            p.bin_number,
            p.bin_number2,
            p.quantity,
            p.low_stock_threshold,
            p.cost,
            part_type_id,
            p.project_id.map(sql_id).transpose()?,
            p.mounting_type_id as i64,
            p.package_type,
            p.datasheet_url,
            owner.user_id,
            ms_to_rfc3339(p.date_created)?,
        ],
    )?;
    Ok(())
}

fn insert_stored_file(tx: &Transaction<'_>, f: &StoredFile, owner: Owner) -> Result<()> {
    tx.execute(
        "INSERT INTO stored_files(stored_file_id, part_id, file_name, original_file_name,
            file_length, crc32, stored_file_type, user_id, date_created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            sql_id(f.stored_file_id)?,
            sql_id(f.part_id)?,
            f.file_name,
            f.original_file_name,
            f.file_length,
            f.crc32 as i64,
            f.stored_file_type as i64,
            owner.user_id,
            ms_to_rfc3339(f.date_created)?,
        ],
    )?;
    Ok(())
}

fn insert_pcb(tx: &Transaction<'_>, p: &Pcb, owner: Owner) -> Result<()> {
    tx.execute(
        "INSERT INTO pcbs(pcb_id, name, description, serial_number, last_serial_number,
            user_id, date_created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            sql_id(p.pcb_id)?,
            p.name,
            p.description,
            p.serial_number,
            p.last_serial_number,
            owner.user_id,
            ms_to_rfc3339(p.date_created)?,
        ],
    )?;
    Ok(())
}

fn insert_project_part_assignment(
    tx: &Transaction<'_>,
    a: &ProjectPartAssignment,
    owner: Owner,
) -> Result<()> {
    tx.execute(
        "INSERT INTO project_part_assignments(project_part_assignment_id, project_id, part_id,
            part_name, quantity, quantity_available, notes, reference_id, user_id, date_created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            sql_id(a.project_part_assignment_id)?,
            sql_id(a.project_id)?,
            a.part_id.map(sql_id).transpose()?,
            a.part_name,
            a.quantity,
            a.quantity_available,
            a.notes,
            a.reference_id,
            owner.user_id,
            ms_to_rfc3339(a.date_created)?,
        ],
    )?;
    Ok(())
}

fn insert_project_pcb_assignment(
    tx: &Transaction<'_>,
    a: &ProjectPcbAssignment,
    owner: Owner,
) -> Result<()> {
    tx.execute(
        "INSERT INTO project_pcb_assignments(project_pcb_assignment_id, project_id, pcb_id,
            user_id, date_created)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            sql_id(a.project_pcb_assignment_id)?,
            sql_id(a.project_id)?,
            sql_id(a.pcb_id)?,
            owner.user_id,
            ms_to_rfc3339(a.date_created)?,
        ],
    )?;
    Ok(())
}

fn insert_part_supplier(tx: &Transaction<'_>, s: &PartSupplier, owner: Owner) -> Result<()> {
    tx.execute(
        "INSERT INTO part_suppliers(part_supplier_id, part_id, name, supplier_part_number, cost,
            quantity_available, minimum_order_quantity, product_url, image_url, user_id,
            date_created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            sql_id(s.part_supplier_id)?,
            sql_id(s.part_id)?,
            s.name,
            s.supplier_part_number,
            s.cost,
            s.quantity_available,
            s.minimum_order_quantity,
            s.product_url,
            s.image_url,
            owner.user_id,
            ms_to_rfc3339(s.date_created)?,
        ],
    )?;
    Ok(())
}

fn insert_oauth_credential(tx: &Transaction<'_>, c: &OAuthCredential, owner: Owner) -> Result<()> {
    tx.execute(
        "INSERT INTO oauth_credentials(provider, access_token, refresh_token, date_expires,
            user_id, date_created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            c.provider,
            c.access_token,
            c.refresh_token,
            ms_to_rfc3339(c.date_expires)?,
            owner.user_id,
            ms_to_rfc3339(c.date_created)?,
        ],
    )?;
    Ok(())
}

fn insert_oauth_request(tx: &Transaction<'_>, r: &OAuthRequest, owner: Owner) -> Result<()> {
    tx.execute(
        "INSERT INTO oauth_requests(oauth_request_id, provider, request_id, auth_code, error,
            error_description, return_to_url, authorization_received, user_id, date_created,
            date_modified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            sql_id(r.oauth_request_id)?,
            r.provider,
            r.request_id,
            r.auth_code,
            r.error,
            r.error_description,
            r.return_to_url,
            r.authorization_received,
            owner.user_id,
            ms_to_rfc3339(r.date_created)?,
            ms_to_rfc3339(r.date_modified)?,
        ],
    )?;
    Ok(())
}

fn insert_pcb_stored_file_assignment(
    tx: &Transaction<'_>,
    a: &PcbStoredFileAssignment,
    owner: Owner,
) -> Result<()> {
    tx.execute(
        "INSERT INTO pcb_stored_file_assignments(pcb_stored_file_assignment_id, pcb_id,
            stored_file_id, name, notes, user_id, date_created)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            sql_id(a.pcb_stored_file_assignment_id)?,
            sql_id(a.pcb_id)?,
            sql_id(a.stored_file_id)?,
            a.name,
            a.notes,
            owner.user_id,
            ms_to_rfc3339(a.date_created)?,
        ],
    )?;
    Ok(())
}

/// 逐条导入；`keep` 为 false 的记录计入 skipped
fn import_all<T>(
    entity: &'static str,
    tx: &Transaction<'_>,
    rows: &[T],
    owner: Owner,
    keep: impl Fn(&T) -> bool,
    insert: fn(&Transaction<'_>, &T, Owner) -> Result<()>,
) -> Result<EntityReport> {
    let mut report = EntityReport {
        entity,
        ..Default::default()
    };
    for row in rows {
        if !keep(row) {
            report.skipped += 1;
            continue;
        }
        insert(tx, row, owner)?;
        report.imported += 1;
    }
    if report.skipped > 0 {
        tracing::warn!(
            "Skipped {} {} rows with missing parent records",
            report.skipped,
            entity
        );
    }
    tracing::debug!("Imported {} {} rows", report.imported, entity);
    Ok(report)
}

/// 导入整个快照（调用方负责事务与外键延迟）
///
/// 子记录引用的父 id 不存在即跳过；主记录上的可选悬空引用
/// 原样写入，由 `repair` 置空。
pub fn import_snapshot(
    tx: &Transaction<'_>,
    snap: &SnapshotV7,
    owner: Owner,
) -> Result<Vec<EntityReport>> {
    let project_ids: HashSet<u64> = snap.projects.iter().map(|p| p.project_id).collect();
    let part_ids: HashSet<u64> = snap.parts.iter().map(|p| p.part_id).collect();
    let pcb_ids: HashSet<u64> = snap.pcbs.iter().map(|p| p.pcb_id).collect();

    let mut reports = Vec::new();
    reports.push(import_all(
        "part_types",
        tx,
        &snap.part_types,
        owner,
        |_| true,
        insert_part_type,
    )?);
    reports.push(import_all(
        "projects",
        tx,
        &snap.projects,
        owner,
        |_| true,
        insert_project,
    )?);
    reports.push(import_all(
        "parts",
        tx,
        &snap.parts,
        owner,
        |_| true,
        insert_part,
    )?);

    let stored_files = import_all(
        "stored_files",
        tx,
        &snap.stored_files,
        owner,
        |f: &StoredFile| part_ids.contains(&f.part_id),
        insert_stored_file,
    )?;
    let stored_file_ids: HashSet<u64> = snap
        .stored_files
        .iter()
        .filter(|f| part_ids.contains(&f.part_id))
        .map(|f| f.stored_file_id)
        .collect();
    reports.push(stored_files);

    reports.push(import_all("pcbs", tx, &snap.pcbs, owner, |_| true, insert_pcb)?);
    reports.push(import_all(
        "project_part_assignments",
        tx,
        &snap.project_part_assignments,
        owner,
        |a: &ProjectPartAssignment| {
            project_ids.contains(&a.project_id)
                && a.part_id.map_or(true, |id| part_ids.contains(&id))
        },
        insert_project_part_assignment,
    )?);
    reports.push(import_all(
        "project_pcb_assignments",
        tx,
        &snap.project_pcb_assignments,
        owner,
        |a: &ProjectPcbAssignment| {
            project_ids.contains(&a.project_id) && pcb_ids.contains(&a.pcb_id)
        },
        insert_project_pcb_assignment,
    )?);
    reports.push(import_all(
        "part_suppliers",
        tx,
        &snap.part_suppliers,
        owner,
        |s: &PartSupplier| part_ids.contains(&s.part_id),
        insert_part_supplier,
    )?);
    reports.push(import_all(
        "oauth_credentials",
        tx,
        &snap.oauth_credentials,
        owner,
        |_| true,
        insert_oauth_credential,
    )?);
    reports.push(import_all(
        "oauth_requests",
        tx,
        &snap.oauth_requests,
        owner,
        |_| true,
        insert_oauth_request,
    )?);
    reports.push(import_all(
        "pcb_stored_file_assignments",
        tx,
        &snap.pcb_stored_file_assignments,
        owner,
        |a: &PcbStoredFileAssignment| {
            pcb_ids.contains(&a.pcb_id) && stored_file_ids.contains(&a.stored_file_id)
        },
        insert_pcb_stored_file_assignment,
    )?);

    Ok(reports)
}

/// 导入后修正：打组织标签，置空主记录上的悬空可选引用
///
/// 返回被置空的引用数。
pub fn repair(tx: &Transaction<'_>, owner: Owner) -> Result<usize> {
    for table in OWNED_TABLES {
        tx.execute(
            &format!(
                "UPDATE {} SET organization_id = ?1 WHERE organization_id IS NULL",
                table
            ),
            params![owner.organization_id],
        )?;
    }

    let mut nulled = 0;
    nulled += tx.execute(
        "UPDATE parts SET project_id = NULL
         WHERE project_id IS NOT NULL
           AND project_id NOT IN (SELECT project_id FROM projects)",
        [],
    )?;
    nulled += tx.execute(
        "UPDATE parts SET part_type_id = NULL
         WHERE part_type_id IS NOT NULL
           AND part_type_id NOT IN (SELECT part_type_id FROM part_types)",
        [],
    )?;
    nulled += tx.execute(
        "UPDATE part_types SET parent_part_type_id = NULL
         WHERE parent_part_type_id IS NOT NULL
           AND parent_part_type_id NOT IN (SELECT part_type_id FROM part_types)",
        [],
    )?;
    if nulled > 0 {
        tracing::warn!("Repair nulled {} dangling references", nulled);
    }
    Ok(nulled)
}
