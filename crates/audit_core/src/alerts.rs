//! Coaching and compliance alerts, plus dismissal filtering.
//!
//! Alert ids are derived from the data alone, so recomputing over the same
//! input yields the same ids and a persisted dismissal keeps applying.

use crate::aggregation::AgentPerformance;
use crate::config::Thresholds;
use crate::schema::AuditEntry;
use crate::window::sort_refs_newest_first;
use std::collections::BTreeSet;
use time::UtcOffset;

pub trait Alert {
    fn alert_id(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoachingAlert {
    pub id: String,
    pub agent_email: String,
    pub parameter: String,
    pub average_score: f64,
}

impl Alert for CoachingAlert {
    fn alert_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComplianceIssue {
    RescheduleRedFlag {
        property: String,
        reason: Option<String>,
    },
    VirtualVisitOffered {
        property: String,
    },
}

impl std::fmt::Display for ComplianceIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplianceIssue::RescheduleRedFlag {
                property,
                reason: Some(reason),
            } => write!(f, "reschedule red flag on {property}: {reason}"),
            ComplianceIssue::RescheduleRedFlag { property, .. } => {
                write!(f, "reschedule red flag on {property}")
            }
            ComplianceIssue::VirtualVisitOffered { property } => {
                write!(f, "virtual visit offered for {property}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComplianceAlert {
    pub id: String,
    pub entry_id: i64,
    pub agent_email: String,
    pub auditor_name: String,
    pub timestamp: String,
    pub issues: Vec<ComplianceIssue>,
}

impl Alert for ComplianceAlert {
    fn alert_id(&self) -> &str {
        &self.id
    }
}

pub fn coaching_alert_id(agent_email: &str, parameter: &str) -> String {
    format!("{agent_email}-{parameter}")
}

pub fn compliance_alert_id(entry_id: i64) -> String {
    format!("compliance-{entry_id}")
}

/// Agents with enough audits whose most frequent weak parameter recurs.
pub fn coaching_alerts(performance: &[AgentPerformance], thresholds: &Thresholds) -> Vec<CoachingAlert> {
    performance
        .iter()
        .filter(|agent| agent.audit_count >= thresholds.coaching_min_audits)
        .filter_map(|agent| {
            let problem = agent.top_problem.as_ref()?;
            if problem.low_count < thresholds.coaching_min_low_scores {
                return None;
            }
            Some(CoachingAlert {
                id: coaching_alert_id(&agent.agent_email, &problem.parameter),
                agent_email: agent.agent_email.clone(),
                parameter: problem.parameter.clone(),
                average_score: agent.average.unwrap_or(0.0),
            })
        })
        .collect()
}

pub fn compliance_issues(entry: &AuditEntry) -> Vec<ComplianceIssue> {
    let mut issues = Vec::new();
    for property in &entry.analysis.properties_discussed {
        let visit = &property.site_visit_scheduled;
        if visit.reschedule_red_flag == Some(true) {
            issues.push(ComplianceIssue::RescheduleRedFlag {
                property: property.property_identifier.clone(),
                reason: visit.red_flag_reason.clone(),
            });
        }
        if visit.virtual_visit_offered == Some(true) {
            issues.push(ComplianceIssue::VirtualVisitOffered {
                property: property.property_identifier.clone(),
            });
        }
    }
    issues
}

/// Most recent flagged calls first, capped at `compliance_alert_limit`.
pub fn compliance_alerts(
    entries: &[&AuditEntry],
    thresholds: &Thresholds,
    local: UtcOffset,
) -> Vec<ComplianceAlert> {
    let mut ordered = entries.to_vec();
    sort_refs_newest_first(&mut ordered, local);

    ordered
        .into_iter()
        .filter_map(|entry| {
            let issues = compliance_issues(entry);
            if issues.is_empty() {
                return None;
            }
            Some(ComplianceAlert {
                id: compliance_alert_id(entry.id),
                entry_id: entry.id,
                agent_email: entry.agent_email.clone(),
                auditor_name: entry.auditor_name.clone(),
                timestamp: entry.timestamp.clone(),
                issues,
            })
        })
        .take(thresholds.compliance_alert_limit)
        .collect()
}

pub fn visible_alerts<'a, A: Alert>(alerts: &'a [A], dismissed: &BTreeSet<String>) -> Vec<&'a A> {
    alerts
        .iter()
        .filter(|alert| !dismissed.contains(alert.alert_id()))
        .collect()
}

/// The dismissed set after dismissing everything currently shown.
pub fn dismiss_all(
    dismissed: &BTreeSet<String>,
    compliance: &[ComplianceAlert],
    coaching: &[CoachingAlert],
) -> BTreeSet<String> {
    let mut next = dismissed.clone();
    next.extend(
        visible_alerts(compliance, dismissed)
            .into_iter()
            .map(|alert| alert.id.clone()),
    );
    next.extend(
        visible_alerts(coaching, dismissed)
            .into_iter()
            .map(|alert| alert.id.clone()),
    );
    next
}
