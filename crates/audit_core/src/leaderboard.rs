use crate::aggregation::{mean, Tally};
use crate::config::Thresholds;
use crate::schema::AuditEntry;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedAgent {
    pub agent_email: String,
    pub average: f64,
    pub audit_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NominationRank {
    pub agent_email: String,
    pub nominations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditorRank {
    pub auditor: String,
    pub audit_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Badge {
    TopPerformer,
    Closer,
    RapportMaster,
    MarathonAuditor,
}

impl Badge {
    pub const ALL: [Badge; 4] = [
        Badge::TopPerformer,
        Badge::Closer,
        Badge::RapportMaster,
        Badge::MarathonAuditor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Badge::TopPerformer => "Top Performer",
            Badge::Closer => "The Closer",
            Badge::RapportMaster => "Rapport Master",
            Badge::MarathonAuditor => "Marathon Auditor",
        }
    }

    pub fn description(self, thresholds: &Thresholds) -> String {
        match self {
            Badge::TopPerformer => format!(
                "Highest average score with at least {} audits.",
                thresholds.badge_min_audits
            ),
            Badge::Closer => "Most site visits successfully scheduled.".to_string(),
            Badge::RapportMaster => format!(
                "Highest average \"{}\" score (min {} audits).",
                thresholds.rapport_parameter, thresholds.badge_min_audits
            ),
            Badge::MarathonAuditor => {
                "Auditor who has completed the most call analyses.".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadgeHolder {
    pub badge: Badge,
    pub holder: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leaderboard {
    pub top_performers: Vec<RankedAgent>,
    pub excellence_awards: Vec<NominationRank>,
    pub active_auditors: Vec<AuditorRank>,
    pub badges: Vec<BadgeHolder>,
}

impl Leaderboard {
    pub fn holder(&self, badge: Badge) -> Option<&str> {
        self.badges
            .iter()
            .find(|held| held.badge == badge)
            .and_then(|held| held.holder.as_deref())
    }
}

/// Per-agent accumulator in first-seen order.
struct AgentStats<'a> {
    agent_email: &'a str,
    audits: Vec<&'a AuditEntry>,
}

fn group_by_agent<'a>(entries: &[&'a AuditEntry]) -> Vec<AgentStats<'a>> {
    let mut groups: Vec<AgentStats<'a>> = Vec::new();
    for &entry in entries {
        match groups
            .iter_mut()
            .find(|group| group.agent_email == entry.agent_email)
        {
            Some(group) => group.audits.push(entry),
            None => groups.push(AgentStats {
                agent_email: &entry.agent_email,
                audits: vec![entry],
            }),
        }
    }
    groups
}

/// Rankings and badges over an already windowed set of entries.
/// Equal scores keep the order in which agents first appear in `entries`.
pub fn leaderboard(entries: &[&AuditEntry], thresholds: &Thresholds) -> Leaderboard {
    let groups = group_by_agent(entries);
    let size = thresholds.leaderboard_size;

    let mut ranked: Vec<RankedAgent> = groups
        .iter()
        .filter_map(|group| {
            let average = mean(group.audits.iter().map(|e| e.overall_score() as f64))?;
            Some(RankedAgent {
                agent_email: group.agent_email.to_string(),
                average,
                audit_count: group.audits.len(),
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.average.total_cmp(&a.average));

    let mut excellence_awards: Vec<NominationRank> = groups
        .iter()
        .map(|group| NominationRank {
            agent_email: group.agent_email.to_string(),
            nominations: group.audits.iter().filter(|e| e.is_nominated()).count(),
        })
        .filter(|rank| rank.nominations > 0)
        .collect();
    excellence_awards.sort_by(|a, b| b.nominations.cmp(&a.nominations));
    excellence_awards.truncate(size);

    let mut auditor_tally = Tally::default();
    for entry in entries {
        auditor_tally.bump(&entry.auditor_name);
    }
    let mut active_auditors: Vec<AuditorRank> = auditor_tally
        .ranked()
        .into_iter()
        .map(|(auditor, audit_count)| AuditorRank {
            auditor,
            audit_count,
        })
        .collect();
    active_auditors.truncate(size);

    let badges = vec![
        BadgeHolder {
            badge: Badge::TopPerformer,
            holder: ranked
                .first()
                .filter(|top| top.audit_count >= thresholds.badge_min_audits)
                .map(|top| top.agent_email.clone()),
        },
        BadgeHolder {
            badge: Badge::Closer,
            holder: closer(&groups),
        },
        BadgeHolder {
            badge: Badge::RapportMaster,
            holder: rapport_master(&groups, thresholds),
        },
        BadgeHolder {
            badge: Badge::MarathonAuditor,
            holder: active_auditors.first().map(|rank| rank.auditor.clone()),
        },
    ];

    ranked.truncate(size);
    Leaderboard {
        top_performers: ranked,
        excellence_awards,
        active_auditors,
        badges,
    }
}

/// Agent with the most calls where at least one property visit got scheduled.
fn closer(groups: &[AgentStats<'_>]) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for group in groups {
        let scheduled = group
            .audits
            .iter()
            .filter(|entry| {
                entry
                    .analysis
                    .properties_discussed
                    .iter()
                    .any(|property| property.site_visit_scheduled.is_scheduled())
            })
            .count();
        if scheduled > 0 && best.is_none_or(|(_, top)| scheduled > top) {
            best = Some((group.agent_email, scheduled));
        }
    }
    best.map(|(agent, _)| agent.to_string())
}

fn rapport_master(groups: &[AgentStats<'_>], thresholds: &Thresholds) -> Option<String> {
    let mut best: Option<(&str, f64)> = None;
    for group in groups {
        if group.audits.len() < thresholds.badge_min_audits {
            continue;
        }
        let Some(average) = mean(group.audits.iter().map(|entry| {
            entry
                .parameter_score(&thresholds.rapport_parameter)
                .unwrap_or(0) as f64
        })) else {
            continue;
        };
        if average >= thresholds.rapport_min_average
            && best.is_none_or(|(_, top)| average > top)
        {
            best = Some((group.agent_email, average));
        }
    }
    best.map(|(agent, _)| agent.to_string())
}
