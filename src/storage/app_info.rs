//! Origin registry
//!
//! Maps application package names to stable integer ids. Rows are created
//! lazily on the first write from a package and never change afterwards.

use crate::storage::error::StorageResult;
use rusqlite::{params, Connection, OptionalExtension};

pub const APP_INFO_TABLE: &str = "app_info";

pub fn create_table(conn: &Connection) -> StorageResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS app_info (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            package_name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;
    Ok(())
}

/// Id for a package, registering it on first sight
pub fn get_or_create(conn: &Connection, package_name: &str) -> StorageResult<i64> {
    if let Some(id) = find_id(conn, package_name)? {
        return Ok(id);
    }

    conn.prepare_cached("INSERT INTO app_info (package_name) VALUES (?)")?
        .execute(params![package_name])?;
    let id = conn.last_insert_rowid();
    tracing::debug!(package = package_name, id, "Registered data origin");
    Ok(id)
}

pub fn find_id(conn: &Connection, package_name: &str) -> StorageResult<Option<i64>> {
    let id = conn
        .prepare_cached("SELECT row_id FROM app_info WHERE package_name = ?")?
        .query_row(params![package_name], |row| row.get(0))
        .optional()?;
    Ok(id)
}

/// Package names for ids, in input order, skipping unregistered ids
pub fn package_names(conn: &Connection, ids: &[i64]) -> StorageResult<Vec<String>> {
    let mut stmt = conn.prepare_cached("SELECT package_name FROM app_info WHERE row_id = ?")?;
    let mut names = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(name) = stmt
            .query_row(params![id], |row| row.get::<_, String>(0))
            .optional()?
        {
            names.push(name);
        }
    }
    Ok(names)
}

/// Ids for package names, in input order, skipping unknown packages
pub fn origin_ids(conn: &Connection, package_names: &[String]) -> StorageResult<Vec<i64>> {
    let mut ids = Vec::with_capacity(package_names.len());
    for name in package_names {
        if let Some(id) = find_id(conn, name)? {
            ids.push(id);
        }
    }
    Ok(ids)
}
