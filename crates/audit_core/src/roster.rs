use crate::db::{AuditStore, ListName};
use crate::error::{AuditError, Result};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EMAIL_SHAPE: Regex = Regex::new(r"^\S+@\S+\.\S+$").unwrap();
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_email(raw: &str) -> bool {
    EMAIL_SHAPE.is_match(raw)
}

/// Normalized email, or `InvalidArgument` if it does not look like one.
pub fn checked_email(raw: &str) -> Result<String> {
    let email = normalize_email(raw);
    if is_valid_email(&email) {
        Ok(email)
    } else {
        Err(AuditError::InvalidArgument(format!(
            "'{}' is not a valid email address",
            raw.trim()
        )))
    }
}

/// Returns true if the list changed. Duplicates are ignored case-insensitively.
pub fn add_to_roster(list: &mut Vec<String>, email: &str) -> bool {
    let email = normalize_email(email);
    if list.iter().any(|known| known.eq_ignore_ascii_case(&email)) {
        return false;
    }
    list.push(email);
    list.sort();
    true
}

pub fn remove_from_roster(list: &mut Vec<String>, email: &str) -> bool {
    let email = normalize_email(email);
    let before = list.len();
    list.retain(|known| !known.eq_ignore_ascii_case(&email));
    list.len() != before
}

/// Store-backed list edits: load, change, save the whole list back.
pub struct Roster<'a> {
    store: &'a AuditStore,
    list: ListName,
}

impl<'a> Roster<'a> {
    pub fn new(store: &'a AuditStore, list: ListName) -> Self {
        Self { store, list }
    }

    pub fn members(&self) -> Result<Vec<String>> {
        self.store.get_list(self.list)
    }

    pub fn add(&self, email: &str) -> Result<Vec<String>> {
        let email = checked_email(email)?;
        let mut members = self.members()?;
        if add_to_roster(&mut members, &email) {
            self.store.save_list(self.list, &members)?;
            tracing::info!(list = %self.list, %email, "Added to list");
        }
        Ok(members)
    }

    pub fn remove(&self, email: &str) -> Result<Vec<String>> {
        let mut members = self.members()?;
        if remove_from_roster(&mut members, email) {
            self.store.save_list(self.list, &members)?;
            tracing::info!(list = %self.list, email = %normalize_email(email), "Removed from list");
        }
        Ok(members)
    }
}
