use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use slm_core::domain::{Record, RunState};
use slm_core::ports::{FrameStore, Result, RunTransaction};
use slm_core::utils::format_timestamp;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Name of the variable holding the last successful run.
pub const LAST_RUN_VAR: &str = "last_run";

#[derive(Debug, Error)]
pub enum SqliteStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// SQLite implementation of the FrameStore trait.
///
/// Records go to the `data` table; scalar variables to `swvariables`, the
/// layout morph.io scrapers share.
pub struct SqliteFrameStore {
    conn: Connection,
}

impl SqliteFrameStore {
    /// Opens (or creates) the database at `db_path`. The schema is only touched
    /// once a run begins, so a throttled invocation leaves the file as it was.
    pub fn open(db_path: impl AsRef<Path>) -> std::result::Result<Self, SqliteStoreError> {
        let db_path = db_path.as_ref();
        info!(path = %db_path.display(), "opening store");
        Ok(Self {
            conn: Connection::open(db_path)?,
        })
    }

    pub fn open_in_memory() -> std::result::Result<Self, SqliteStoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    fn table_exists(&self, name: &str) -> rusqlite::Result<bool> {
        self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![name],
            |row| row.get(0),
        )
    }

    fn prepare_schema(conn: &Connection) -> rusqlite::Result<()> {
        let columns = Record::COLUMNS.map(|c| format!("{c} TEXT")).join(", ");
        conn.execute_batch(&format!("CREATE TABLE IF NOT EXISTS data ({columns});"))?;
        Self::add_missing_columns(conn)?;
        conn.execute_batch(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS data_natural_key ON data ({});
             CREATE TABLE IF NOT EXISTS swvariables (
                 name TEXT PRIMARY KEY,
                 value_blob BLOB,
                 type TEXT
             );",
            Record::KEY_COLUMNS.join(", ")
        ))
    }

    // A `data` table left behind by another tool may lack some of our columns.
    fn add_missing_columns(conn: &Connection) -> rusqlite::Result<()> {
        let existing = {
            let mut stmt = conn.prepare("PRAGMA table_info(data)")?;
            let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
            names.collect::<rusqlite::Result<Vec<_>>>()?
        };
        for column in Record::COLUMNS {
            if !existing.iter().any(|name| name == column) {
                debug!(column, "adding missing column to data");
                conn.execute_batch(&format!("ALTER TABLE data ADD COLUMN {column} TEXT;"))?;
            }
        }
        Ok(())
    }

    pub fn count_records(&self) -> std::result::Result<usize, SqliteStoreError> {
        if !self.table_exists("data")? {
            return Ok(0);
        }
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM data", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// All stored records ordered by their natural key.
    pub fn records(&self) -> std::result::Result<Vec<Record>, SqliteStoreError> {
        if !self.table_exists("data")? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM data ORDER BY {}",
            Record::COLUMNS.join(", "),
            Record::KEY_COLUMNS.join(", ")
        ))?;

        // Map rows to Record using rusqlite's row mapping
        let records = stmt
            .query_map([], |row: &Row| {
                Ok(Record {
                    gml_id: row.get(0)?,
                    slm_id: row.get(1)?,
                    smid: row.get(2)?,
                    smcislo: row.get(3)?,
                    aktivne: row.get(4)?,
                    position_lat: row.get(5)?,
                    position_lon: row.get(6)?,
                    scrap_time: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        Ok(records)
    }

    /// Reads a stored variable as text, whatever storage class it was saved with.
    pub fn get_var(&self, name: &str) -> std::result::Result<Option<String>, SqliteStoreError> {
        if !self.table_exists("swvariables")? {
            return Ok(None);
        }
        let value = self
            .conn
            .query_row(
                "SELECT value_blob FROM swvariables WHERE name = ?1",
                params![name],
                |row| row.get::<_, Value>(0),
            )
            .optional()?;

        Ok(match value {
            None | Some(Value::Null) => None,
            Some(Value::Text(text)) => Some(text),
            Some(Value::Blob(bytes)) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Some(Value::Integer(n)) => Some(n.to_string()),
            Some(Value::Real(x)) => Some(x.to_string()),
        })
    }
}

fn upsert_sql() -> String {
    let placeholders = (1..=Record::COLUMNS.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = Record::COLUMNS
        .iter()
        .filter(|c| !Record::KEY_COLUMNS.contains(*c))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO data ({}) VALUES ({placeholders})
         ON CONFLICT ({}) DO UPDATE SET {updates}",
        Record::COLUMNS.join(", "),
        Record::KEY_COLUMNS.join(", ")
    )
}

fn set_var(conn: &Connection, name: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO swvariables (name, value_blob, type) VALUES (?1, ?2, 'str')
         ON CONFLICT (name) DO UPDATE SET value_blob = excluded.value_blob, type = excluded.type",
        params![name, value],
    )?;
    Ok(())
}

impl FrameStore for SqliteFrameStore {
    fn load_last_run(&self) -> Result<Option<String>> {
        Ok(self.get_var(LAST_RUN_VAR)?)
    }

    fn begin_run(&mut self) -> Result<Box<dyn RunTransaction + '_>> {
        let tx = self.conn.transaction().map_err(SqliteStoreError::from)?;
        Self::prepare_schema(&tx).map_err(SqliteStoreError::from)?;
        Ok(Box::new(SqliteRun {
            tx,
            upsert_sql: upsert_sql(),
            upserted: 0,
        }))
    }
}

/// One run's writes; rolled back when dropped uncommitted.
struct SqliteRun<'conn> {
    tx: Transaction<'conn>,
    upsert_sql: String,
    upserted: usize,
}

impl RunTransaction for SqliteRun<'_> {
    fn upsert(&mut self, record: &Record) -> Result<()> {
        let mut stmt = self
            .tx
            .prepare_cached(&self.upsert_sql)
            .map_err(SqliteStoreError::from)?;
        stmt.execute(params_from_iter(record.values()))
            .map_err(SqliteStoreError::from)?;
        self.upserted += 1;
        Ok(())
    }

    fn commit(self: Box<Self>, state: &RunState) -> Result<()> {
        let this = *self;
        if let Some(last_run) = state.last_run {
            set_var(&this.tx, LAST_RUN_VAR, &format_timestamp(last_run))
                .map_err(SqliteStoreError::from)?;
        }
        this.tx.commit().map_err(SqliteStoreError::from)?;
        debug!(upserted = this.upserted, "run committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn record(gml_id: &str, slm_id: &str, smcislo: &str, aktivne: &str) -> Record {
        Record {
            gml_id: gml_id.into(),
            slm_id: slm_id.into(),
            smid: "7".into(),
            smcislo: smcislo.into(),
            aktivne: aktivne.into(),
            position_lat: "48.1".into(),
            position_lon: "17.2".into(),
            scrap_time: "2025-03-10T08:00:00Z".into(),
        }
    }

    fn finished() -> RunState {
        RunState {
            last_run: Some(Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()),
        }
    }

    fn store_run(store: &mut SqliteFrameStore, records: &[Record]) {
        let mut tx = store.begin_run().unwrap();
        for r in records {
            tx.upsert(r).unwrap();
        }
        tx.commit(&finished()).unwrap();
    }

    #[test]
    fn test_fresh_store_is_empty() {
        let store = SqliteFrameStore::open_in_memory().unwrap();
        assert_eq!(store.count_records().unwrap(), 0);
        assert_eq!(store.load_last_run().unwrap(), None);
    }

    #[test]
    fn test_commit_persists_records_and_last_run() {
        let mut store = SqliteFrameStore::open_in_memory().unwrap();
        store_run(&mut store, &[record("frm.1", "1", "10", "1"), record("frm.2", "2", "20", "0")]);

        assert_eq!(store.count_records().unwrap(), 2);
        assert_eq!(store.records().unwrap()[1], record("frm.2", "2", "20", "0"));
        assert_eq!(
            store.load_last_run().unwrap(),
            Some("2025-03-10T08:00:00Z".to_string())
        );
    }

    #[test]
    fn test_upsert_overwrites_same_key() {
        let mut store = SqliteFrameStore::open_in_memory().unwrap();
        store_run(&mut store, &[record("frm.1", "1", "10", "1")]);
        store_run(&mut store, &[record("frm.1", "1", "10", "0")]);

        assert_eq!(store.records().unwrap(), [record("frm.1", "1", "10", "0")]);
    }

    #[test]
    fn test_key_components_are_distinct_rows() {
        let mut store = SqliteFrameStore::open_in_memory().unwrap();
        store_run(
            &mut store,
            &[
                record("frm.1", "1", "10", "1"),
                record("frm.1", "2", "10", "1"),
                record("frm.1", "1", "11", "1"),
                record("frm.2", "1", "10", "1"),
            ],
        );
        assert_eq!(store.count_records().unwrap(), 4);
    }

    #[test]
    fn test_dropped_run_rolls_back() {
        let mut store = SqliteFrameStore::open_in_memory().unwrap();
        {
            let mut tx = store.begin_run().unwrap();
            tx.upsert(&record("frm.1", "1", "10", "1")).unwrap();
        }
        assert_eq!(store.count_records().unwrap(), 0);
        assert_eq!(store.load_last_run().unwrap(), None);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.sqlite");
        {
            let mut store = SqliteFrameStore::open(&path).unwrap();
            store_run(&mut store, &[record("frm.1", "1", "10", "1")]);
        }
        let store = SqliteFrameStore::open(&path).unwrap();
        assert_eq!(store.count_records().unwrap(), 1);
        assert_eq!(
            store.load_last_run().unwrap(),
            Some("2025-03-10T08:00:00Z".to_string())
        );
    }

    #[test]
    fn test_existing_table_gains_missing_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.sqlite");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE data (gml_id TEXT, slm_id TEXT, smcislo TEXT);
                 INSERT INTO data VALUES ('old.1', '1', '10');",
            )
            .unwrap();
        }

        let mut store = SqliteFrameStore::open(&path).unwrap();
        store_run(&mut store, &[record("old.1", "1", "10", "1")]);

        assert_eq!(store.records().unwrap(), [record("old.1", "1", "10", "1")]);
    }

    fn column_names(path: &Path) -> Vec<String> {
        let conn = Connection::open(path).unwrap();
        let mut stmt = conn.prepare("PRAGMA table_info(data)").unwrap();
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap();
        names
    }

    #[test]
    fn test_reading_state_leaves_schema_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.sqlite");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE data (gml_id TEXT, slm_id TEXT, smcislo TEXT);")
            .unwrap();

        let mut store = SqliteFrameStore::open(&path).unwrap();
        assert_eq!(store.load_last_run().unwrap(), None);
        assert_eq!(column_names(&path), ["gml_id", "slm_id", "smcislo"]);

        store_run(&mut store, &[]);
        assert_eq!(column_names(&path), Record::COLUMNS);
    }

    #[test]
    fn test_fresh_file_has_no_tables_until_a_run() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.sqlite");
        let store = SqliteFrameStore::open(&path).unwrap();
        assert_eq!(store.load_last_run().unwrap(), None);
        assert_eq!(store.count_records().unwrap(), 0);
        assert!(column_names(&path).is_empty());
    }

    #[test]
    fn test_blob_variable_is_read_as_text() {
        let store = SqliteFrameStore::open_in_memory().unwrap();
        SqliteFrameStore::prepare_schema(&store.conn).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO swvariables (name, value_blob, type) VALUES (?1, ?2, 'str')",
                params![LAST_RUN_VAR, b"2016-05-01T12:00:00".to_vec()],
            )
            .unwrap();
        assert_eq!(
            store.load_last_run().unwrap(),
            Some("2016-05-01T12:00:00".to_string())
        );
    }

    #[test]
    fn test_upsert_sql_updates_only_non_key_columns() {
        let sql = upsert_sql();
        assert!(sql.contains("ON CONFLICT (gml_id, slm_id, smcislo)"));
        assert!(sql.contains("scrap_time = excluded.scrap_time"));
        assert!(!sql.contains("gml_id = excluded.gml_id"));
    }
}
