//! Derived statistics over a set of audit entries.
//!
//! Everything here is a pure function of its inputs. Callers pick the time
//! window first (see [`crate::window::TimeWindow::select`]) and pass the
//! resulting slice in.

use crate::alerts::{coaching_alerts, CoachingAlert};
use crate::config::Thresholds;
use crate::schema::AuditEntry;
use crate::window::parse_timestamp;
use std::cmp::Ordering;
use time::UtcOffset;

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterAverage {
    pub parameter: String,
    pub average: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemParameter {
    pub parameter: String,
    pub low_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentPerformance {
    pub agent_email: String,
    pub audit_count: usize,
    /// `None` when the agent has no audits in the input.
    pub average: Option<f64>,
    pub top_problem: Option<ProblemParameter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditorPerformance {
    pub auditor: String,
    pub audit_count: usize,
    pub average_analysis_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSummary {
    pub total_audits: usize,
    pub average_score: Option<f64>,
    pub total_analysis_seconds: f64,
    pub agents: Vec<AgentPerformance>,
    pub auditors: Vec<AuditorPerformance>,
    /// Weakest parameter first.
    pub team_parameters: Vec<ParameterAverage>,
    pub coaching_alerts: Vec<CoachingAlert>,
}

/// Counter that remembers first-seen order, so frequency ties resolve to
/// whichever key appeared first.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    counts: Vec<(String, usize)>,
}

impl Tally {
    pub(crate) fn bump(&mut self, key: &str) {
        match self.counts.iter_mut().find(|(k, _)| k == key) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((key.to_string(), 1)),
        }
    }

    pub(crate) fn most_frequent(&self) -> Option<(&str, usize)> {
        let mut best: Option<(&str, usize)> = None;
        for (key, count) in &self.counts {
            if best.is_none_or(|(_, top)| *count > top) {
                best = Some((key.as_str(), *count));
            }
        }
        best
    }

    /// Highest counts first, stable on ties.
    pub(crate) fn ranked(&self) -> Vec<(String, usize)> {
        let mut ranked = self.counts.clone();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }
}

/// Running sum keyed in first-seen order.
#[derive(Debug, Default)]
struct Means {
    sums: Vec<(String, f64, usize)>,
}

impl Means {
    fn add(&mut self, key: &str, value: f64) {
        match self.sums.iter_mut().find(|(k, _, _)| k == key) {
            Some((_, total, count)) => {
                *total += value;
                *count += 1;
            }
            None => self.sums.push((key.to_string(), value, 1)),
        }
    }

    fn into_averages(self) -> Vec<ParameterAverage> {
        self.sums
            .into_iter()
            .map(|(parameter, total, count)| ParameterAverage {
                parameter,
                average: total / count as f64,
                count,
            })
            .collect()
    }
}

pub(crate) fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (total, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(total, count), value| (total + value, count + 1));
    (count > 0).then(|| total / count as f64)
}

/// Average detailed score per parameter name, in first-seen order.
/// Parameters that never occur are absent.
pub fn team_parameter_averages(entries: &[&AuditEntry]) -> Vec<ParameterAverage> {
    let mut means = Means::default();
    for entry in entries {
        for param in &entry.analysis.detailed_scores {
            means.add(&param.parameter, param.score as f64);
        }
    }
    means.into_averages()
}

pub fn parameter_average(averages: &[ParameterAverage], parameter: &str) -> Option<f64> {
    averages
        .iter()
        .find(|avg| avg.parameter == parameter)
        .map(|avg| avg.average)
}

pub fn average_overall_score(entries: &[&AuditEntry]) -> Option<f64> {
    mean(entries.iter().map(|entry| entry.overall_score() as f64))
}

/// Stats for each agent on the allowlist, most-audited first.
/// Entries for agents not on the list are ignored.
pub fn agent_performance(
    entries: &[&AuditEntry],
    agents: &[String],
    thresholds: &Thresholds,
) -> Vec<AgentPerformance> {
    let mut performance: Vec<AgentPerformance> = agents
        .iter()
        .map(|agent| {
            let audits: Vec<&AuditEntry> = entries
                .iter()
                .copied()
                .filter(|entry| &entry.agent_email == agent)
                .collect();
            let low_scores = low_score_tally(&audits, thresholds.low_score);

            AgentPerformance {
                agent_email: agent.clone(),
                audit_count: audits.len(),
                average: average_overall_score(&audits),
                top_problem: low_scores
                    .most_frequent()
                    .map(|(parameter, low_count)| ProblemParameter {
                        parameter: parameter.to_string(),
                        low_count,
                    }),
            }
        })
        .collect();

    performance.sort_by(|a, b| b.audit_count.cmp(&a.audit_count));
    performance
}

pub fn auditor_performance(entries: &[&AuditEntry], auditors: &[String]) -> Vec<AuditorPerformance> {
    let mut performance: Vec<AuditorPerformance> = auditors
        .iter()
        .map(|auditor| {
            let durations: Vec<f64> = entries
                .iter()
                .filter(|entry| &entry.auditor_name == auditor)
                .map(|entry| entry.analysis.analysis_duration)
                .collect();
            AuditorPerformance {
                auditor: auditor.clone(),
                audit_count: durations.len(),
                average_analysis_seconds: mean(durations),
            }
        })
        .collect();

    performance.sort_by(|a, b| b.audit_count.cmp(&a.audit_count));
    performance
}

pub fn dashboard(
    entries: &[&AuditEntry],
    agents: &[String],
    auditors: &[String],
    thresholds: &Thresholds,
) -> DashboardSummary {
    let agent_stats = agent_performance(entries, agents, thresholds);
    let coaching = coaching_alerts(&agent_stats, thresholds);

    let mut team_parameters = team_parameter_averages(entries);
    team_parameters.sort_by(|a, b| a.average.total_cmp(&b.average));

    DashboardSummary {
        total_audits: entries.len(),
        average_score: average_overall_score(entries),
        total_analysis_seconds: entries
            .iter()
            .map(|entry| entry.analysis.analysis_duration)
            .sum(),
        agents: agent_stats,
        auditors: auditor_performance(entries, auditors),
        team_parameters,
        coaching_alerts: coaching,
    }
}

fn low_score_tally(entries: &[&AuditEntry], low_score: i64) -> Tally {
    let mut tally = Tally::default();
    for entry in entries {
        for param in &entry.analysis.detailed_scores {
            if param.score <= low_score {
                tally.bump(&param.parameter);
            }
        }
    }
    tally
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrendMetric {
    Overall,
    Parameter(String),
}

impl TrendMetric {
    pub fn label(&self) -> &str {
        match self {
            TrendMetric::Overall => "Overall Score",
            TrendMetric::Parameter(name) => name,
        }
    }

    /// Score of this metric in one entry; a parameter the call lacks counts as 0.
    pub fn score_of(&self, entry: &AuditEntry) -> i64 {
        match self {
            TrendMetric::Overall => entry.overall_score(),
            TrendMetric::Parameter(name) => entry.parameter_score(name).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub id: i64,
    pub timestamp: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentTrend {
    pub agent_email: String,
    pub audit_count: usize,
    pub average: Option<f64>,
    pub last_audit: Option<String>,
    pub parameter_averages: Vec<ParameterAverage>,
    /// Up to five parameters, most frequently low first.
    pub problem_parameters: Vec<ProblemParameter>,
    pub metric: TrendMetric,
    /// Oldest first, limited to the configured trend window.
    pub series: Vec<TrendPoint>,
    pub agent_metric_average: Option<f64>,
    pub team_metric_average: Option<f64>,
}

/// One agent's history against the team. `entries` is the whole team's history.
pub fn agent_trend(
    entries: &[&AuditEntry],
    agent_email: &str,
    metric: TrendMetric,
    thresholds: &Thresholds,
    local: UtcOffset,
) -> AgentTrend {
    let mut history: Vec<&AuditEntry> = entries
        .iter()
        .copied()
        .filter(|entry| entry.agent_email == agent_email)
        .collect();
    history.sort_by(|a, b| {
        match (
            parse_timestamp(&a.timestamp, local),
            parse_timestamp(&b.timestamp, local),
        ) {
            (Some(a), Some(b)) => a.cmp(&b),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });

    let parameter_averages = team_parameter_averages(&history);
    let team_averages = team_parameter_averages(entries);
    let problem_parameters = low_score_tally(&history, thresholds.low_score)
        .ranked()
        .into_iter()
        .take(5)
        .map(|(parameter, low_count)| ProblemParameter { parameter, low_count })
        .collect();

    let skip = history.len().saturating_sub(thresholds.trend_window);
    let series = history[skip..]
        .iter()
        .map(|entry| TrendPoint {
            id: entry.id,
            timestamp: entry.timestamp.clone(),
            score: metric.score_of(entry),
        })
        .collect();

    let (agent_metric_average, team_metric_average) = match &metric {
        TrendMetric::Overall => (average_overall_score(&history), average_overall_score(entries)),
        TrendMetric::Parameter(name) => (
            parameter_average(&parameter_averages, name),
            parameter_average(&team_averages, name),
        ),
    };

    AgentTrend {
        agent_email: agent_email.to_string(),
        audit_count: history.len(),
        average: average_overall_score(&history),
        last_audit: history.last().map(|entry| entry.timestamp.clone()),
        parameter_averages,
        problem_parameters,
        metric,
        series,
        agent_metric_average,
        team_metric_average,
    }
}

/// Every parameter name seen in the history, first-seen order.
pub fn known_parameters(entries: &[&AuditEntry]) -> Vec<String> {
    team_parameter_averages(entries)
        .into_iter()
        .map(|avg| avg.parameter)
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::tests::entry;
    use crate::schema::ScoreParameter;

    pub(crate) fn scored(
        id: i64,
        agent: &str,
        overall: i64,
        params: &[(&str, i64)],
    ) -> AuditEntry {
        let mut e = entry(id, None);
        e.agent_email = agent.to_string();
        e.analysis.overall_score.score = overall;
        e.analysis.detailed_scores = params
            .iter()
            .map(|(name, score)| ScoreParameter {
                parameter: name.to_string(),
                score: *score,
                justification: String::new(),
            })
            .collect();
        e
    }

    fn agents(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn team_average_groups_by_parameter_without_zero_fill() {
        let entries = vec![
            scored(1, "a@x.com", 7, &[("A", 8), ("B", 4)]),
            scored(2, "a@x.com", 7, &[("A", 6)]),
        ];
        let refs: Vec<&AuditEntry> = entries.iter().collect();
        let averages = team_parameter_averages(&refs);

        assert_eq!(parameter_average(&averages, "A"), Some(7.0));
        assert_eq!(parameter_average(&averages, "B"), Some(4.0));
        assert_eq!(parameter_average(&averages, "C"), None);
        assert_eq!(averages.len(), 2);
    }

    #[test]
    fn agent_without_audits_reports_no_average() {
        let entries = vec![scored(1, "a@x.com", 8, &[])];
        let refs: Vec<&AuditEntry> = entries.iter().collect();
        let perf = agent_performance(
            &refs,
            &agents(&["idle@x.com", "a@x.com"]),
            &Thresholds::default(),
        );

        assert_eq!(perf[0].agent_email, "a@x.com");
        assert_eq!(perf[0].average, Some(8.0));
        assert_eq!(perf[1].agent_email, "idle@x.com");
        assert_eq!(perf[1].audit_count, 0);
        assert_eq!(perf[1].average, None);
        assert_eq!(perf[1].top_problem, None);
    }

    #[test]
    fn top_problem_ties_go_to_first_seen_parameter() {
        let entries = vec![
            scored(1, "a@x.com", 4, &[("Closing", 3), ("Opening", 2)]),
            scored(2, "a@x.com", 4, &[("Opening", 1), ("Closing", 5), ("Pitch", 9)]),
        ];
        let refs: Vec<&AuditEntry> = entries.iter().collect();
        let perf = agent_performance(&refs, &agents(&["a@x.com"]), &Thresholds::default());

        assert_eq!(
            perf[0].top_problem,
            Some(ProblemParameter {
                parameter: "Closing".to_string(),
                low_count: 2
            })
        );
    }

    #[test]
    fn dashboard_totals_and_ascending_parameters() {
        let mut first = scored(1, "a@x.com", 6, &[("A", 9), ("B", 3)]);
        first.analysis.analysis_duration = 30.0;
        first.auditor_name = "q@x.com".to_string();
        let mut second = scored(2, "b@x.com", 8, &[("A", 7)]);
        second.analysis.analysis_duration = 10.0;
        second.auditor_name = "q@x.com".to_string();
        let entries = vec![first, second];
        let refs: Vec<&AuditEntry> = entries.iter().collect();

        let summary = dashboard(
            &refs,
            &agents(&["a@x.com", "b@x.com"]),
            &agents(&["q@x.com", "idle@x.com"]),
            &Thresholds::default(),
        );

        assert_eq!(summary.total_audits, 2);
        assert_eq!(summary.average_score, Some(7.0));
        assert_eq!(summary.total_analysis_seconds, 40.0);
        assert_eq!(summary.team_parameters[0].parameter, "B");
        assert_eq!(summary.team_parameters[1].parameter, "A");
        assert_eq!(summary.auditors[0].auditor, "q@x.com");
        assert_eq!(summary.auditors[0].average_analysis_seconds, Some(20.0));
        assert_eq!(summary.auditors[1].average_analysis_seconds, None);
    }

    #[test]
    fn empty_dashboard_has_no_average() {
        let summary = dashboard(&[], &agents(&["a@x.com"]), &[], &Thresholds::default());
        assert_eq!(summary.total_audits, 0);
        assert_eq!(summary.average_score, None);
        assert!(summary.team_parameters.is_empty());
        assert!(summary.coaching_alerts.is_empty());
    }

    #[test]
    fn trend_orders_oldest_first_and_compares_to_team() {
        let mut old = scored(1, "a@x.com", 4, &[("Opening", 2)]);
        old.timestamp = "2024-06-01T10:00:00Z".to_string();
        let mut new = scored(2, "a@x.com", 8, &[]);
        new.timestamp = "2024-06-03T10:00:00Z".to_string();
        let mut other = scored(3, "b@x.com", 10, &[("Opening", 8)]);
        other.timestamp = "2024-06-02T10:00:00Z".to_string();
        let entries = vec![new, other, old];
        let refs: Vec<&AuditEntry> = entries.iter().collect();

        let trend = agent_trend(
            &refs,
            "a@x.com",
            TrendMetric::Parameter("Opening".to_string()),
            &Thresholds::default(),
            UtcOffset::UTC,
        );

        assert_eq!(trend.audit_count, 2);
        assert_eq!(trend.average, Some(6.0));
        assert_eq!(trend.last_audit.as_deref(), Some("2024-06-03T10:00:00Z"));
        let series: Vec<(i64, i64)> = trend.series.iter().map(|p| (p.id, p.score)).collect();
        assert_eq!(series, vec![(1, 2), (2, 0)]);
        assert_eq!(trend.agent_metric_average, Some(2.0));
        assert_eq!(trend.team_metric_average, Some(5.0));
        assert_eq!(trend.problem_parameters[0].parameter, "Opening");
    }

    #[test]
    fn trend_series_keeps_most_recent_window() {
        let entries: Vec<AuditEntry> = (0..25)
            .map(|i| {
                let mut e = scored(i, "a@x.com", i % 10, &[]);
                e.timestamp = format!("2024-06-01T10:{i:02}:00Z");
                e
            })
            .collect();
        let refs: Vec<&AuditEntry> = entries.iter().collect();
        let trend = agent_trend(
            &refs,
            "a@x.com",
            TrendMetric::Overall,
            &Thresholds::default(),
            UtcOffset::UTC,
        );
        assert_eq!(trend.series.len(), 20);
        assert_eq!(trend.series[0].id, 5);
        assert_eq!(trend.series[19].id, 24);
    }
}
