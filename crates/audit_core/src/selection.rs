//! Which entries feed each prose request, and the best-practices view.
//!
//! Inputs are the displayed history in history order (newest first).

use crate::config::Thresholds;
use crate::error::{AuditError, Result};
use crate::schema::AuditEntry;

#[derive(Debug, Clone, Default)]
pub struct BestPracticeFilter {
    pub agent_email: Option<String>,
    pub keyword: Option<String>,
}

pub fn best_practices<'a>(entries: &[&'a AuditEntry], filter: &BestPracticeFilter) -> Vec<&'a AuditEntry> {
    let keyword = filter
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_lowercase);

    entries
        .iter()
        .copied()
        .filter(|entry| entry.is_nominated())
        .filter(|entry| {
            filter
                .agent_email
                .as_deref()
                .is_none_or(|agent| entry.agent_email.eq_ignore_ascii_case(agent))
        })
        .filter(|entry| {
            keyword.as_deref().is_none_or(|k| {
                entry
                    .analysis
                    .overall_score
                    .summary
                    .to_lowercase()
                    .contains(k)
            })
        })
        .collect()
}

pub fn coaching_plan_inputs<'a>(
    entries: &[&'a AuditEntry],
    agent_email: &str,
    thresholds: &Thresholds,
) -> Result<Vec<&'a AuditEntry>> {
    let selected: Vec<&AuditEntry> = for_agent(entries, agent_email)
        .into_iter()
        .take(thresholds.coaching_plan_audits)
        .collect();
    if selected.is_empty() {
        return Err(AuditError::InvalidArgument(format!(
            "no audits found for {agent_email}"
        )));
    }
    Ok(selected)
}

pub fn root_cause_inputs<'a>(
    entries: &[&'a AuditEntry],
    parameter: &str,
    thresholds: &Thresholds,
) -> Result<Vec<&'a AuditEntry>> {
    let selected: Vec<&AuditEntry> = entries
        .iter()
        .copied()
        .filter(|entry| {
            entry
                .parameter_score(parameter)
                .is_some_and(|score| score <= thresholds.root_cause_max_score)
        })
        .collect();
    if selected.len() < thresholds.root_cause_min_calls {
        return Err(AuditError::InvalidArgument(format!(
            "not enough data: {} low-scoring call(s) for \"{parameter}\", need at least {}",
            selected.len(),
            thresholds.root_cause_min_calls
        )));
    }
    Ok(selected)
}

pub fn call_of_the_week_inputs<'a>(
    entries: &[&'a AuditEntry],
    thresholds: &Thresholds,
) -> Result<Vec<&'a AuditEntry>> {
    let selected: Vec<&AuditEntry> = entries
        .iter()
        .copied()
        .filter(|entry| entry.overall_score() >= thresholds.call_of_the_week_min_score)
        .collect();
    if selected.is_empty() {
        return Err(AuditError::InvalidArgument(format!(
            "no calls scored {} or higher",
            thresholds.call_of_the_week_min_score
        )));
    }
    Ok(selected)
}

pub fn agent_summary_inputs<'a>(entries: &[&'a AuditEntry], agent_email: &str) -> Vec<&'a AuditEntry> {
    for_agent(entries, agent_email)
}

fn for_agent<'a>(entries: &[&'a AuditEntry], agent_email: &str) -> Vec<&'a AuditEntry> {
    entries
        .iter()
        .copied()
        .filter(|entry| entry.agent_email.eq_ignore_ascii_case(agent_email))
        .collect()
}
