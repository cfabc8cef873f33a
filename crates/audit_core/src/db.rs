use crate::error::{AuditError, Result};
use crate::schema::AuditEntry;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;

/// Bumped whenever a migration step is appended to [`migrate`].
pub const SCHEMA_VERSION: i32 = 2;

pub const DEFAULT_DB_FILE: &str = "callaudit.db";

/// Fixed key under which each named list is stored.
const LIST_KEY: &str = "list";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListName {
    Agents,
    Auditors,
}

impl ListName {
    fn table(self) -> &'static str {
        match self {
            ListName::Agents => "agents",
            ListName::Auditors => "auditors",
        }
    }
}

impl std::fmt::Display for ListName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table())
    }
}

/// Local persistence for audit entries and the agent/auditor lists.
///
/// Each entry is stored as its full JSON document keyed by `id`. Secondary
/// lookups are expression indexes over that document, so adding one never
/// rewrites existing rows.
pub struct AuditStore {
    conn: Connection,
}

impl AuditStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(|e| {
            AuditError::StorageUnavailable(format!("cannot open {}: {e}", db_path.display()))
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        migrate(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn schema_version(&self) -> Result<i32> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    /// Every stored entry, in no particular order.
    pub fn get_all(&self) -> Result<Vec<AuditEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, body_json FROM audit_entries")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, body) = row?;
            entries.push(decode_entry(id, &body)?);
        }
        Ok(entries)
    }

    /// First entry (lowest id) whose `audioHash` matches.
    pub fn get_by_hash(&self, hash: &str) -> Result<Option<AuditEntry>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT id, body_json FROM audit_entries
                WHERE json_extract(body_json, '$.audioHash') = ?1
                ORDER BY id
                LIMIT 1
                "#,
                params![hash],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match row {
            Some((id, body)) => Ok(Some(decode_entry(id, &body)?)),
            None => Ok(None),
        }
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM audit_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn max_id(&self) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row("SELECT MAX(id) FROM audit_entries", [], |row| row.get(0))?)
    }

    /// Non-overwriting insert.
    pub fn add(&self, entry: &AuditEntry) -> Result<()> {
        let body = encode_entry(entry)?;
        let inserted = self.conn.execute(
            "INSERT INTO audit_entries (id, timestamp, body_json) VALUES (?1, ?2, ?3)",
            params![entry.id, entry.timestamp, body],
        );

        match inserted {
            Ok(_) => {
                tracing::debug!(id = entry.id, "Inserted audit entry");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                tracing::error!(id = entry.id, "Refusing to overwrite existing audit entry");
                Err(AuditError::DuplicateIdentity(entry.id))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Replace the entry with the same id, or insert it.
    pub fn update(&self, entry: &AuditEntry) -> Result<()> {
        upsert_entry(&self.conn, entry)?;
        tracing::debug!(id = entry.id, "Upserted audit entry");
        Ok(())
    }

    /// Upsert every entry in one transaction. Nothing is written unless all succeed.
    pub fn bulk_upsert(&mut self, entries: &[AuditEntry]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for entry in entries {
            upsert_entry(&tx, entry)?;
        }
        tx.commit()?;
        tracing::info!(count = entries.len(), "Bulk upserted audit entries");
        Ok(())
    }

    /// Empty the entry collection. The agent and auditor lists are kept.
    pub fn clear_all(&self) -> Result<()> {
        let removed = self.conn.execute("DELETE FROM audit_entries", [])?;
        tracing::info!(removed, "Cleared audit entries");
        Ok(())
    }

    pub fn get_list(&self, list: ListName) -> Result<Vec<String>> {
        let sql = format!("SELECT value_json FROM {} WHERE key = ?1", list.table());
        let raw: Option<String> = self
            .conn
            .query_row(&sql, params![LIST_KEY], |row| row.get(0))
            .optional()?;

        match raw {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                AuditError::StorageUnavailable(format!("corrupt {list} list: {e}"))
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the whole list value.
    pub fn save_list(&self, list: ListName, values: &[String]) -> Result<()> {
        let raw = serde_json::to_string(values)
            .map_err(|e| AuditError::StorageUnavailable(format!("cannot encode {list} list: {e}")))?;
        let sql = format!(
            "INSERT INTO {} (key, value_json) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
            list.table()
        );
        self.conn.execute(&sql, params![LIST_KEY, raw])?;
        tracing::debug!(%list, len = values.len(), "Saved list");
        Ok(())
    }
}

fn migrate(conn: &mut Connection) -> Result<()> {
    let current: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    if current < 1 {
        tx.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_entries (
              id INTEGER PRIMARY KEY,
              timestamp TEXT NOT NULL,
              body_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_entries_timestamp ON audit_entries(timestamp);

            CREATE TABLE IF NOT EXISTS agents (
              key TEXT PRIMARY KEY,
              value_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS auditors (
              key TEXT PRIMARY KEY,
              value_json TEXT NOT NULL
            );
            "#,
        )?;
    }
    if current < 2 {
        // Non-unique: duplicates are detected by callers, not rejected here.
        tx.execute_batch(
            r#"
            CREATE INDEX IF NOT EXISTS idx_audit_entries_audio_hash
              ON audit_entries(json_extract(body_json, '$.audioHash'));
            "#,
        )?;
    }
    tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
    tx.commit()?;

    tracing::info!(from = current, to = SCHEMA_VERSION, "Migrated audit store schema");
    Ok(())
}

fn upsert_entry(conn: &Connection, entry: &AuditEntry) -> Result<()> {
    let body = encode_entry(entry)?;
    conn.execute(
        r#"
        INSERT INTO audit_entries (id, timestamp, body_json)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(id) DO UPDATE SET
          timestamp=excluded.timestamp,
          body_json=excluded.body_json
        "#,
        params![entry.id, entry.timestamp, body],
    )?;
    Ok(())
}

fn encode_entry(entry: &AuditEntry) -> Result<String> {
    serde_json::to_string(entry).map_err(|e| {
        AuditError::StorageUnavailable(format!("cannot encode entry {}: {e}", entry.id))
    })
}

fn decode_entry(id: i64, body: &str) -> Result<AuditEntry> {
    serde_json::from_str(body)
        .map_err(|e| AuditError::StorageUnavailable(format!("corrupt entry {id}: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schema::AnalysisResult;

    pub(crate) fn entry(id: i64, hash: Option<&str>) -> AuditEntry {
        AuditEntry {
            id,
            auditor_name: "qa@x.com".to_string(),
            agent_email: "a@x.com".to_string(),
            timestamp: "2024-06-01T10:00:00Z".to_string(),
            file_name: format!("{id}.mp3"),
            analysis: AnalysisResult::default(),
            audio_hash: hash.map(str::to_string),
            nominated: None,
            buyer_user_id: "buyer".to_string(),
            call_stamp: "stamp".to_string(),
            audio_data: None,
            audio_mime_type: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn fresh_store_is_at_current_version() {
        let store = AuditStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
        assert!(store.get_all().unwrap().is_empty());
    }

    #[test]
    fn add_rejects_repeated_id_and_keeps_original() {
        let store = AuditStore::open_in_memory().unwrap();
        store.add(&entry(1, Some("h1"))).unwrap();

        let mut clash = entry(1, Some("h2"));
        clash.file_name = "other.mp3".to_string();
        let err = store.add(&clash).unwrap_err();
        assert!(matches!(err, AuditError::DuplicateIdentity(1)));

        let all = store.get_all().unwrap();
        assert_eq!(all, vec![entry(1, Some("h1"))]);
    }

    #[test]
    fn update_replaces_or_inserts() {
        let store = AuditStore::open_in_memory().unwrap();
        store.add(&entry(1, None)).unwrap();

        let mut nominated = entry(1, None);
        nominated.nominated = Some(true);
        store.update(&nominated).unwrap();
        store.update(&entry(2, None)).unwrap();

        let mut all = store.get_all().unwrap();
        all.sort_by_key(|e| e.id);
        assert_eq!(all, vec![nominated, entry(2, None)]);
    }

    #[test]
    fn lookup_by_hash_returns_lowest_id() {
        let store = AuditStore::open_in_memory().unwrap();
        store.add(&entry(5, Some("same"))).unwrap();
        store.add(&entry(3, Some("same"))).unwrap();
        store.add(&entry(4, None)).unwrap();

        assert_eq!(store.get_by_hash("same").unwrap().map(|e| e.id), Some(3));
        assert!(store.get_by_hash("missing").unwrap().is_none());
    }

    #[test]
    fn bulk_upsert_overwrites_matching_ids() {
        let mut store = AuditStore::open_in_memory().unwrap();
        store.add(&entry(1, None)).unwrap();

        let mut changed = entry(1, None);
        changed.agent_email = "b@x.com".to_string();
        store.bulk_upsert(&[changed.clone(), entry(2, None)]).unwrap();

        assert_eq!(store.count().unwrap(), 2);
        let mut all = store.get_all().unwrap();
        all.sort_by_key(|e| e.id);
        assert_eq!(all[0], changed);
    }

    #[test]
    fn failed_bulk_upsert_leaves_store_untouched() {
        let mut store = AuditStore::open_in_memory().unwrap();
        store.add(&entry(1, None)).unwrap();
        store
            .conn
            .execute_batch(
                "CREATE TRIGGER fail_second BEFORE INSERT ON audit_entries
                 WHEN NEW.id = 2 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let mut changed = entry(1, None);
        changed.agent_email = "b@x.com".to_string();
        let result = store.bulk_upsert(&[changed, entry(2, None)]);

        assert!(matches!(result, Err(AuditError::StorageUnavailable(_))));
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get_all().unwrap(), vec![entry(1, None)]);
    }

    #[test]
    fn clear_all_keeps_lists() {
        let store = AuditStore::open_in_memory().unwrap();
        store.add(&entry(1, None)).unwrap();
        store
            .save_list(ListName::Agents, &["a@x.com".to_string()])
            .unwrap();

        store.clear_all().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.get_list(ListName::Agents).unwrap(), vec!["a@x.com"]);
    }

    #[test]
    fn lists_are_independent_and_replaced_whole() {
        let store = AuditStore::open_in_memory().unwrap();
        assert!(store.get_list(ListName::Auditors).unwrap().is_empty());

        store
            .save_list(ListName::Auditors, &["q1@x.com".to_string(), "q2@x.com".to_string()])
            .unwrap();
        store
            .save_list(ListName::Auditors, &["q3@x.com".to_string()])
            .unwrap();

        assert_eq!(store.get_list(ListName::Auditors).unwrap(), vec!["q3@x.com"]);
        assert!(store.get_list(ListName::Agents).unwrap().is_empty());
    }
}
