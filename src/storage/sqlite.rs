//! SQLite-backed record store
//!
//! One table per record type plus the `app_info` origin registry. The store
//! owns a single connection behind a mutex; every call is synchronous and
//! meant to run on a blocking worker.

use crate::records::{
    Record, RecordHelper, RecordType, TimeRange, APP_INFO_ID_COLUMN, PACKAGE_NAME_COLUMN,
    UUID_COLUMN,
};
use crate::storage::app_info::{self, APP_INFO_TABLE};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::executor::QueryExecutor;
use crate::storage::row::{Row, Value};
use chrono::Utc;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, Params, Statement, ToSql};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Value::Null => ValueRef::Null,
            Value::Integer(v) => ValueRef::Integer(*v),
            Value::Real(v) => ValueRef::Real(*v),
            Value::Text(v) => ValueRef::Text(v.as_bytes()),
            Value::Blob(v) => ValueRef::Blob(v.as_slice()),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => Value::Blob(v.to_vec()),
        }
    }
}

/// Persistent health record store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create a database file and its tables
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.create_tables()?;
        tracing::info!(path = %path.display(), "Opened record store");
        Ok(store)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.create_tables()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Lock(format!("Failed to acquire connection lock: {}", e)))
    }

    fn create_tables(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        app_info::create_table(&conn)?;
        for record_type in RecordType::all() {
            let helper = RecordHelper::for_type(*record_type);
            conn.execute(&helper.create_table_sql(), [])?;
            conn.execute(&helper.create_index_sql(), [])?;
        }
        Ok(())
    }

    /// Id of a data origin, registering it if needed
    pub fn get_or_create_origin(&self, package_name: &str) -> StorageResult<i64> {
        let conn = self.lock()?;
        app_info::get_or_create(&conn, package_name)
    }

    /// Insert records in one transaction
    ///
    /// Records without an id get a fresh UUID. Every record is stamped with
    /// the current time as its last-modified time. Returns the stored copies.
    pub fn insert_records(&self, records: &[Record]) -> StorageResult<Vec<Record>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().timestamp_millis();
        let mut stored = Vec::with_capacity(records.len());

        for record in records {
            let helper = RecordHelper::for_type(record.record_type());
            let app_info_id = app_info::get_or_create(&tx, &record.metadata().data_origin)?;
            let id = record
                .id()
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let persisted = record.persisted(id, now);
            let row = helper.serialize(&persisted, app_info_id)?;

            let names: Vec<&str> = row.column_names().collect();
            let placeholders = vec!["?"; names.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                helper.table_name(),
                names.join(", "),
                placeholders
            );
            tx.prepare_cached(&sql)?
                .execute(params_from_iter(row.columns().map(|(_, v)| v)))?;

            stored.push(persisted);
        }

        tx.commit()?;
        tracing::debug!(count = stored.len(), "Inserted records");
        Ok(stored)
    }

    /// Replace stored records matched by id
    pub fn update_records(&self, records: &[Record]) -> StorageResult<Vec<Record>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().timestamp_millis();
        let mut stored = Vec::with_capacity(records.len());

        for record in records {
            let id = record.id().ok_or_else(|| {
                StorageError::InvalidRecord("updated record has no id".to_string())
            })?;
            let helper = RecordHelper::for_type(record.record_type());
            let app_info_id = app_info::get_or_create(&tx, &record.metadata().data_origin)?;
            let persisted = record.persisted(id.to_string(), now);
            let row = helper.serialize(&persisted, app_info_id)?;

            let assignments: Vec<String> = row
                .column_names()
                .filter(|name| *name != UUID_COLUMN)
                .map(|name| format!("{} = ?", name))
                .collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE {} = ?",
                helper.table_name(),
                assignments.join(", "),
                UUID_COLUMN
            );
            let id_value = Value::from(id);
            let values = row
                .columns()
                .filter(|(name, _)| *name != UUID_COLUMN)
                .map(|(_, v)| v)
                .chain(std::iter::once(&id_value));

            let changed = tx.prepare_cached(&sql)?.execute(params_from_iter(values))?;
            if changed == 0 {
                return Err(StorageError::RecordNotFound(id.to_string()));
            }
            stored.push(persisted);
        }

        tx.commit()?;
        tracing::debug!(count = stored.len(), "Updated records");
        Ok(stored)
    }

    /// Records of a type overlapping a time range, oldest first
    pub fn read_records(
        &self,
        record_type: RecordType,
        range: &TimeRange,
    ) -> StorageResult<Vec<Record>> {
        let helper = RecordHelper::for_type(record_type);
        let time_filter = match helper.end_time_column() {
            Some(end_column) => format!(
                "t.{} >= ? AND t.{} < ?",
                end_column,
                helper.time_column()
            ),
            None => format!(
                "t.{} >= ? AND t.{} < ?",
                helper.time_column(),
                helper.time_column()
            ),
        };
        let sql = format!(
            "SELECT t.*, a.{pkg} AS {pkg} FROM {table} t \
             LEFT JOIN {app_info} a ON t.{app_id} = a.row_id \
             WHERE {filter} ORDER BY t.{time} ASC",
            pkg = PACKAGE_NAME_COLUMN,
            table = helper.table_name(),
            app_info = APP_INFO_TABLE,
            app_id = APP_INFO_ID_COLUMN,
            filter = time_filter,
            time = helper.time_column(),
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = collect_rows(&mut stmt, rusqlite::params![range.start, range.end])?;
        rows.iter().map(|row| helper.deserialize(row)).collect()
    }

    /// Delete records by id; returns how many were removed
    pub fn delete_records(&self, record_type: RecordType, ids: &[String]) -> StorageResult<usize> {
        let helper = RecordHelper::for_type(record_type);
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            helper.table_name(),
            UUID_COLUMN
        );

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for id in ids {
                deleted += stmt.execute([id])?;
            }
        }
        tx.commit()?;
        tracing::debug!(record_type = %record_type, deleted, "Deleted records");
        Ok(deleted)
    }

    /// Number of stored records of a type
    pub fn count(&self, record_type: RecordType) -> StorageResult<u64> {
        let helper = RecordHelper::for_type(record_type);
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", helper.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn collect_rows<P: Params>(stmt: &mut Statement<'_>, params: P) -> StorageResult<Vec<Row>> {
    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();

    while let Some(source) = rows.next()? {
        let mut row = Row::new();
        for (i, name) in names.iter().enumerate() {
            row.push(name.as_str(), Value::from(source.get_ref(i)?));
        }
        out.push(row);
    }

    Ok(out)
}

impl QueryExecutor for SqliteStore {
    fn query(&self, sql: &str) -> StorageResult<Vec<Row>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        collect_rows(&mut stmt, [])
    }

    fn package_names(&self, origin_ids: &[i64]) -> StorageResult<Vec<String>> {
        let conn = self.lock()?;
        app_info::package_names(&conn, origin_ids)
    }

    fn origin_ids(&self, package_names: &[String]) -> StorageResult<Vec<i64>> {
        let conn = self.lock()?;
        app_info::origin_ids(&conn, package_names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Device, DeviceType, Metadata, RecordData, RecordTime, ZoneOffset};
    use tempfile::TempDir;

    fn steps(origin: &str, start: i64, end: i64, count: i64) -> Record {
        Record::new(
            Metadata::new(origin),
            RecordTime::interval(start, end, ZoneOffset::UTC),
            RecordData::Steps { count },
        )
        .unwrap()
    }

    #[test]
    fn test_insert_assigns_ids_and_reads_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = Record::new(
            Metadata::new("com.example.a")
                .client_record("c-1", 2)
                .device(Device::new("Acme", "W1", DeviceType::Watch)),
            RecordTime::interval(1_000, 61_000, ZoneOffset::from_hours(1).unwrap()),
            RecordData::Steps { count: 80 },
        )
        .unwrap();

        let stored = store.insert_records(&[record]).unwrap();
        assert_eq!(stored.len(), 1);
        let id = stored[0].id().unwrap().to_string();
        assert!(Uuid::parse_str(&id).is_ok());
        assert!(stored[0].metadata().last_modified_time > 0);

        let read = store
            .read_records(RecordType::Steps, &TimeRange::try_new(0, 100_000).unwrap())
            .unwrap();
        assert_eq!(read, stored);
        assert_eq!(store.count(RecordType::Steps).unwrap(), 1);
    }

    #[test]
    fn test_read_uses_overlap_rule() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_records(&[
                steps("com.example.a", 0, 100, 1),
                steps("com.example.a", 100, 200, 2),
                steps("com.example.a", 200, 300, 3),
            ])
            .unwrap();

        let read = store
            .read_records(RecordType::Steps, &TimeRange::try_new(100, 200).unwrap())
            .unwrap();
        let counts: Vec<i64> = read
            .iter()
            .map(|r| match r.data() {
                RecordData::Steps { count } => *count,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(counts, vec![1, 2]);
    }

    #[test]
    fn test_update_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let stored = store
            .insert_records(&[steps("com.example.a", 0, 100, 10)])
            .unwrap();
        let id = stored[0].id().unwrap().to_string();

        let mut metadata = stored[0].metadata().clone();
        metadata.client_record_version = 5;
        let changed = Record::new(
            metadata,
            *stored[0].time(),
            RecordData::Steps { count: 25 },
        )
        .unwrap();
        store.update_records(&[changed]).unwrap();

        let read = store
            .read_records(RecordType::Steps, &TimeRange::try_new(0, 100).unwrap())
            .unwrap();
        assert_eq!(read[0].data(), &RecordData::Steps { count: 25 });
        assert_eq!(read[0].metadata().client_record_version, 5);

        assert_eq!(
            store
                .delete_records(RecordType::Steps, &[id.clone(), "missing".to_string()])
                .unwrap(),
            1
        );
        assert_eq!(store.count(RecordType::Steps).unwrap(), 0);

        let missing = Record::new(
            Metadata {
                id: Some(id),
                ..Metadata::new("com.example.a")
            },
            RecordTime::interval(0, 100, ZoneOffset::UTC),
            RecordData::Steps { count: 1 },
        )
        .unwrap();
        assert!(matches!(
            store.update_records(&[missing]),
            Err(StorageError::RecordNotFound(_))
        ));
    }

    #[test]
    fn test_executor_resolves_origins() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_records(&[
                steps("com.example.a", 0, 100, 1),
                steps("com.example.b", 0, 100, 2),
            ])
            .unwrap();

        let ids = store
            .origin_ids(&["com.example.b".to_string(), "com.example.a".to_string()])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(
            store.package_names(&ids).unwrap(),
            vec!["com.example.b".to_string(), "com.example.a".to_string()]
        );

        let rows = store
            .query("SELECT SUM(count) AS count FROM steps_record_table")
            .unwrap();
        assert_eq!(rows[0].get_i64("count").unwrap(), 3);
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("health.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .insert_records(&[steps("com.example.a", 0, 100, 7)])
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert_eq!(store.count(RecordType::Steps).unwrap(), 1);
    }
}
