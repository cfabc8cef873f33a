//! Small key-value files kept next to the store: the signed-in auditor and
//! the set of dismissed alert ids. Neither lives in the database.

use crate::db::{AuditStore, ListName};
use crate::error::{AuditError, Result};
use crate::roster::{add_to_roster, checked_email, normalize_email};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const SESSION_FILE: &str = "current_user";
pub const DISMISSED_ALERTS_FILE: &str = "dismissed_alerts.json";

fn io_error(path: &Path, err: std::io::Error) -> AuditError {
    AuditError::StorageUnavailable(format!("{}: {err}", path.display()))
}

/// The current user slot. Not authentication, just the last chosen auditor.
#[derive(Debug, Clone)]
pub struct SessionSlot {
    path: PathBuf,
}

impl SessionSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(SESSION_FILE))
    }

    pub fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let user = normalize_email(&raw);
                Ok((!user.is_empty()).then_some(user))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&self.path, err)),
        }
    }

    pub fn save(&self, email: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        fs::write(&self.path, email).map_err(|e| io_error(&self.path, e))
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&self.path, err)),
        }
    }
}

/// Signs `email` in and adds it to the auditor list if missing.
///
/// A failure to save the auditor list is logged and does not block login.
pub fn login(store: &AuditStore, slot: &SessionSlot, email: &str) -> Result<String> {
    let email = checked_email(email)?;

    let added = store.get_list(ListName::Auditors).and_then(|mut auditors| {
        if add_to_roster(&mut auditors, &email) {
            store.save_list(ListName::Auditors, &auditors)?;
            return Ok(true);
        }
        Ok(false)
    });
    match added {
        Ok(true) => tracing::info!(%email, "Added new auditor on login"),
        Ok(false) => {}
        Err(err) => tracing::warn!(%email, error = %err, "Could not update auditor list on login"),
    }

    slot.save(&email)?;
    tracing::info!(%email, "Logged in");
    Ok(email)
}

pub fn logout(slot: &SessionSlot) -> Result<()> {
    slot.clear()?;
    tracing::info!("Logged out");
    Ok(())
}

/// Ids of alerts the user has hidden, stored as a JSON array.
#[derive(Debug, Clone)]
pub struct DismissedAlerts {
    path: PathBuf,
}

impl DismissedAlerts {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(DISMISSED_ALERTS_FILE))
    }

    pub fn load(&self) -> Result<BTreeSet<String>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(err) => return Err(io_error(&self.path, err)),
        };
        serde_json::from_str(&raw).map_err(|e| {
            AuditError::StorageUnavailable(format!("corrupt {}: {e}", self.path.display()))
        })
    }

    pub fn save(&self, dismissed: &BTreeSet<String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        let raw = serde_json::to_string_pretty(dismissed).map_err(|e| {
            AuditError::StorageUnavailable(format!("cannot encode dismissed alerts: {e}"))
        })?;
        fs::write(&self.path, raw).map_err(|e| io_error(&self.path, e))
    }

    pub fn dismiss(&self, id: &str) -> Result<BTreeSet<String>> {
        let mut dismissed = self.load()?;
        dismissed.insert(id.to_string());
        self.save(&dismissed)?;
        Ok(dismissed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn login_adds_auditor_and_persists_slot() {
        let dir = TempDir::new().unwrap();
        let store = AuditStore::open_in_memory().unwrap();
        let slot = SessionSlot::in_dir(dir.path());

        let user = login(&store, &slot, " New.QA@x.com").unwrap();
        assert_eq!(user, "new.qa@x.com");
        assert_eq!(slot.load().unwrap().as_deref(), Some("new.qa@x.com"));
        assert_eq!(store.get_list(ListName::Auditors).unwrap(), vec![user]);

        logout(&slot).unwrap();
        assert_eq!(slot.load().unwrap(), None);
        // clearing twice is fine
        logout(&slot).unwrap();
    }

    #[test]
    fn login_rejects_non_email() {
        let dir = TempDir::new().unwrap();
        let store = AuditStore::open_in_memory().unwrap();
        let slot = SessionSlot::in_dir(dir.path());
        assert!(login(&store, &slot, "qa").is_err());
        assert_eq!(slot.load().unwrap(), None);
    }

    #[test]
    fn dismissed_alerts_round_trip() {
        let dir = TempDir::new().unwrap();
        let dismissed = DismissedAlerts::in_dir(dir.path());
        assert!(dismissed.load().unwrap().is_empty());

        dismissed.dismiss("compliance-3").unwrap();
        let set = dismissed.dismiss("a@x.com-Closing").unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(dismissed.load().unwrap(), set);
    }
}
