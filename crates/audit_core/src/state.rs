use crate::config::AuditConfig;
use crate::db::{AuditStore, ListName};
use crate::error::{AuditError, Result};
use crate::roster::add_to_roster;
use crate::schema::AuditEntry;
use crate::session::SessionSlot;
use crate::window::sort_newest_first;
use time::UtcOffset;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataView {
    #[default]
    All,
    Mine,
}

/// Everything the front end works from after start-up.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    /// Newest first.
    pub history: Vec<AuditEntry>,
    pub agents: Vec<String>,
    pub auditors: Vec<String>,
    pub current_user: Option<String>,
    /// Set when the store could not be read; the lists are then the defaults.
    pub load_error: Option<String>,
}

impl AppState {
    /// Never fails: a broken store yields a degraded state with `load_error` set.
    pub fn load(
        store: Option<&AuditStore>,
        session: &SessionSlot,
        config: &AuditConfig,
        local: UtcOffset,
    ) -> Self {
        let mut state = match store {
            Some(store) => Self::load_from(store, config, local).unwrap_or_else(|err| {
                tracing::error!(error = %err, "Falling back to default lists");
                Self::degraded(config, &err)
            }),
            None => Self::degraded(
                config,
                &AuditError::StorageUnavailable("the audit store could not be opened".to_string()),
            ),
        };

        match session.load() {
            Ok(Some(user)) if state.auditors.iter().any(|a| a.eq_ignore_ascii_case(&user)) => {
                state.current_user = Some(user)
            }
            Ok(Some(user)) => {
                tracing::warn!(%user, "Saved user is not a known auditor, ignoring")
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "Could not read session slot"),
        }
        state
    }

    fn load_from(store: &AuditStore, config: &AuditConfig, local: UtcOffset) -> Result<Self> {
        let mut history = store.get_all()?;
        sort_newest_first(&mut history, local);

        let agents = seeded_list(store, ListName::Agents, config)?;
        let auditors = seeded_list(store, ListName::Auditors, config)?;

        tracing::info!(entries = history.len(), agents = agents.len(), auditors = auditors.len(), "Loaded state");
        Ok(Self {
            history,
            agents,
            auditors,
            current_user: None,
            load_error: None,
        })
    }

    fn degraded(config: &AuditConfig, err: &AuditError) -> Self {
        Self {
            history: Vec::new(),
            agents: default_list(config, ListName::Agents),
            auditors: default_list(config, ListName::Auditors),
            current_user: None,
            load_error: Some(format!(
                "Could not load saved data ({err}). Using default agent and auditor lists; changes may not be saved."
            )),
        }
    }

    pub fn displayed_history(&self, view: DataView) -> Vec<&AuditEntry> {
        match (view, &self.current_user) {
            (DataView::Mine, Some(user)) => self
                .history
                .iter()
                .filter(|entry| entry.auditor_name.eq_ignore_ascii_case(user))
                .collect(),
            (DataView::Mine, None) => Vec::new(),
            (DataView::All, _) => self.history.iter().collect(),
        }
    }

    pub fn find(&self, id: i64) -> Option<&AuditEntry> {
        self.history.iter().find(|entry| entry.id == id)
    }

    /// Marks one entry as an excellence nomination. Other fields stay untouched.
    pub fn nominate(&mut self, store: &AuditStore, id: i64) -> Result<&AuditEntry> {
        let Some(index) = self.history.iter().position(|entry| entry.id == id) else {
            return Err(AuditError::InvalidArgument(format!("no audit with id {id}")));
        };
        let mut updated = self.history[index].clone();
        updated.nominated = Some(true);
        store.update(&updated)?;
        tracing::info!(id, "Nominated audit");
        self.history[index] = updated;
        Ok(&self.history[index])
    }
}

/// Configured defaults for `list`: lowercased, deduplicated, sorted.
pub fn default_list(config: &AuditConfig, list: ListName) -> Vec<String> {
    let raw = match list {
        ListName::Agents => &config.defaults.agents,
        ListName::Auditors => &config.defaults.auditors,
    };
    let mut normalized = Vec::with_capacity(raw.len());
    for email in raw.iter().filter(|email| !email.trim().is_empty()) {
        add_to_roster(&mut normalized, email);
    }
    normalized
}

/// Stored list, or the defaults (saved back) if the stored one is empty.
pub fn seeded_list(store: &AuditStore, list: ListName, config: &AuditConfig) -> Result<Vec<String>> {
    let stored = store.get_list(list)?;
    if !stored.is_empty() {
        return Ok(stored);
    }
    let seeded = default_list(config, list);
    store.save_list(list, &seeded)?;
    tracing::info!(%list, len = seeded.len(), "Seeded empty list with defaults");
    Ok(seeded)
}
