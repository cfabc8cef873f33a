use audit_core::analysis::AnalysisService;
use audit_core::db::SCHEMA_VERSION;
use audit_core::export::write_export;
use audit_core::merge::import_paths;
use audit_core::submission::{audio_hash, submit_audit, SubmissionRequest};
use audit_core::{AnalysisResult, AuditError, AuditEntry, AuditStore, Result};
use rusqlite::Connection;
use serde_json::json;
use std::cell::Cell;
use std::fs;
use tempfile::TempDir;
use time::macros::datetime;

fn sample(id: i64, timestamp: &str, agent: &str, hash: Option<&str>) -> AuditEntry {
    serde_json::from_value(json!({
        "id": id,
        "auditorName": "qa@x.com",
        "agentEmail": agent,
        "timestamp": timestamp,
        "fileName": format!("{id}.mp3"),
        "audioHash": hash,
        "buyerUserId": "B-1",
        "callStamp": "morning",
        "analysis": {
            "agentName": "Agent",
            "callDuration": 180.0,
            "overallScore": { "score": 7, "summary": "Fine." },
            "detailedScores": [
                { "parameter": "Closing", "score": 4, "justification": "Weak close." }
            ],
            "propertiesDiscussed": [{
                "propertyIdentifier": "Tower A",
                "siteVisitScheduled": { "mentioned": true, "status": "Scheduled" }
            }]
        }
    }))
    .unwrap()
}

fn sorted(mut entries: Vec<AuditEntry>) -> Vec<AuditEntry> {
    entries.sort_by_key(|e| e.id);
    entries
}

#[test]
fn export_then_import_into_empty_store_reproduces_records() {
    let dir = TempDir::new().unwrap();
    let source = AuditStore::open(&dir.path().join("source.db")).unwrap();
    let mut originals = vec![
        sample(1, "2024-06-01T10:00:00Z", "a@x.com", Some("h1")),
        sample(2, "2024-06-02T10:00:00Z", "b@x.com", None),
        sample(3, "2024-06-03T10:00:00.250Z", "a@x.com", Some("h3")),
    ];
    originals[1].nominated = Some(true);
    for entry in &originals {
        source.add(entry).unwrap();
    }

    let now = datetime!(2024-06-10 12:00:00 UTC);
    let exported = write_export(&source.get_all().unwrap(), dir.path(), now).unwrap();
    assert!(exported.ends_with("audit_history_export_2024-06-10.json"));

    let mut target = AuditStore::open(&dir.path().join("target.db")).unwrap();
    let outcome = import_paths(&mut target, &[exported]).unwrap();

    assert_eq!(outcome.summary.new_records, 3);
    assert_eq!(outcome.summary.updated_records, 0);
    assert_eq!(sorted(target.get_all().unwrap()), sorted(originals));
}

#[test]
fn version_one_store_gains_hash_lookup() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("legacy.db");
    let old = sample(10, "2024-05-01T09:00:00Z", "a@x.com", Some("legacy-hash"));
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE audit_entries (
              id INTEGER PRIMARY KEY,
              timestamp TEXT NOT NULL,
              body_json TEXT NOT NULL
            );
            CREATE TABLE agents (key TEXT PRIMARY KEY, value_json TEXT NOT NULL);
            CREATE TABLE auditors (key TEXT PRIMARY KEY, value_json TEXT NOT NULL);
            PRAGMA user_version = 1;
            "#,
        )
        .unwrap();
        conn.execute(
            "INSERT INTO audit_entries (id, timestamp, body_json) VALUES (?1, ?2, ?3)",
            rusqlite::params![old.id, old.timestamp, serde_json::to_string(&old).unwrap()],
        )
        .unwrap();
    }

    let store = AuditStore::open(&path).unwrap();
    assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    assert_eq!(store.get_by_hash("legacy-hash").unwrap(), Some(old));
    assert_eq!(store.get_by_hash("other").unwrap(), None);
}

#[test]
fn one_bad_file_does_not_block_the_rest() {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("good.json");
    let bad = dir.path().join("bad.json");
    let missing = dir.path().join("missing.json");
    fs::write(
        &good,
        serde_json::to_string(&vec![sample(1, "2024-06-01T10:00:00Z", "a@x.com", None)]).unwrap(),
    )
    .unwrap();
    fs::write(&bad, r#"{"audits": []}"#).unwrap();

    let mut store = AuditStore::open(&dir.path().join("audit.db")).unwrap();
    let outcome = import_paths(&mut store, &[bad, good, missing]).unwrap();

    assert_eq!(outcome.summary.files_processed, 1);
    assert_eq!(outcome.summary.new_records, 1);
    let failed: Vec<&str> = outcome
        .summary
        .failed_files
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(failed, vec!["bad.json", "missing.json"]);
    assert_eq!(store.count().unwrap(), 1);
}

struct CountingService {
    calls: Cell<usize>,
}

impl AnalysisService for CountingService {
    fn analyze(&self, _audio: &[u8], _mime_type: &str) -> Result<AnalysisResult> {
        self.calls.set(self.calls.get() + 1);
        Ok(AnalysisResult::default())
    }

    fn summarize(&self, _reports: &[AnalysisResult]) -> Result<String> {
        Ok("summary".to_string())
    }
}

#[test]
fn imported_hash_blocks_resubmission_after_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("audit.db");
    let audio = b"recorded call".to_vec();
    {
        let store = AuditStore::open(&db_path).unwrap();
        store
            .add(&sample(5, "2024-06-01T10:00:00Z", "a@x.com", Some(&audio_hash(&audio))))
            .unwrap();
    }

    let store = AuditStore::open(&db_path).unwrap();
    let service = CountingService { calls: Cell::new(0) };
    let request = SubmissionRequest {
        auditor_name: "other@x.com".to_string(),
        agent_email: "a@x.com".to_string(),
        buyer_user_id: "B-2".to_string(),
        call_stamp: "evening".to_string(),
        file_name: "again.mp3".to_string(),
        mime_type: "audio/mpeg".to_string(),
        audio,
    };

    let err = submit_audit(&store, &service, request, datetime!(2024-06-02 10:00:00 UTC)).unwrap_err();
    match err {
        AuditError::DuplicateAudio {
            existing_id,
            auditor,
            ..
        } => {
            assert_eq!(existing_id, 5);
            assert_eq!(auditor, "qa@x.com");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(service.calls.get(), 0);
}
