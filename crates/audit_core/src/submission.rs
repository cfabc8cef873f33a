//! New-audit submission: dedup by audio hash, analyze, persist.

use crate::analysis::AnalysisService;
use crate::db::AuditStore;
use crate::error::{AuditError, Result};
use crate::roster::normalize_email;
use crate::schema::AuditEntry;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub auditor_name: String,
    pub agent_email: String,
    pub buyer_user_id: String,
    pub call_stamp: String,
    pub file_name: String,
    pub mime_type: String,
    pub audio: Vec<u8>,
}

impl SubmissionRequest {
    fn validate(&self) -> Result<()> {
        let required = [
            ("auditor", self.auditor_name.trim()),
            ("agent", self.agent_email.trim()),
            ("buyer user id", self.buyer_user_id.trim()),
            ("call stamp", self.call_stamp.trim()),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(field, _)| *field)
            .collect();
        if !missing.is_empty() {
            return Err(AuditError::InvalidArgument(format!(
                "missing {}",
                missing.join(", ")
            )));
        }
        if self.audio.is_empty() {
            return Err(AuditError::InvalidArgument(
                "no audio supplied".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lowercase hex SHA-256 of the audio bytes.
pub fn audio_hash(audio: &[u8]) -> String {
    hex::encode(Sha256::digest(audio))
}

/// Runs one submission end to end and returns the stored entry.
///
/// A repeated recording is answered with [`AuditError::DuplicateAudio`]
/// before the analysis service is called.
pub fn submit_audit(
    store: &AuditStore,
    service: &dyn AnalysisService,
    request: SubmissionRequest,
    now: OffsetDateTime,
) -> Result<AuditEntry> {
    request.validate()?;

    let hash = audio_hash(&request.audio);
    if let Some(existing) = store.get_by_hash(&hash)? {
        tracing::warn!(
            existing_id = existing.id,
            auditor = %existing.auditor_name,
            "Audio already audited, skipping analysis"
        );
        return Err(AuditError::DuplicateAudio {
            existing_id: existing.id,
            auditor: existing.auditor_name,
            timestamp: existing.timestamp,
        });
    }

    let analysis = service.analyze(&request.audio, &request.mime_type)?;

    let id = next_id(store, now)?;
    let timestamp = now
        .format(&Rfc3339)
        .map_err(|e| AuditError::InvalidArgument(format!("cannot format timestamp: {e}")))?;

    let entry = AuditEntry {
        id,
        auditor_name: normalize_email(&request.auditor_name),
        agent_email: normalize_email(&request.agent_email),
        timestamp,
        file_name: request.file_name,
        analysis,
        audio_hash: Some(hash),
        nominated: None,
        buyer_user_id: request.buyer_user_id.trim().to_string(),
        call_stamp: request.call_stamp.trim().to_string(),
        audio_data: Some(STANDARD.encode(&request.audio)),
        audio_mime_type: Some(request.mime_type),
        extra: BTreeMap::new(),
    };
    store.add(&entry)?;
    tracing::info!(id = entry.id, agent = %entry.agent_email, "Stored new audit");
    Ok(entry)
}

/// Epoch milliseconds of `now`, moved past the highest stored id if needed.
fn next_id(store: &AuditStore, now: OffsetDateTime) -> Result<i64> {
    let millis = i64::try_from(now.unix_timestamp_nanos() / 1_000_000)
        .map_err(|_| AuditError::InvalidArgument("clock out of range".to_string()))?;
    Ok(match store.max_id()? {
        Some(max) if max >= millis => max + 1,
        _ => millis,
    })
}
