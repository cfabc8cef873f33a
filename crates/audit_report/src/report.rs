use anyhow::Result;
use audit_core::aggregation::{agent_trend, dashboard, AgentTrend, TrendMetric};
use audit_core::alerts::compliance_alerts;
use audit_core::leaderboard::{leaderboard, Badge};
use audit_core::selection::{best_practices, BestPracticeFilter};
use audit_core::{AuditConfig, AuditEntry, TimeWindow};
use std::fs;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub struct ReportPaths {
    pub root: PathBuf,
    pub index_dir: PathBuf,
    pub agents_dir: PathBuf,
}

impl ReportPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            index_dir: root.join("00_Index"),
            agents_dir: root.join("Agents"),
            root,
        }
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.index_dir)?;
        fs::create_dir_all(&self.agents_dir)?;
        Ok(())
    }

    pub fn agent_note(&self, agent_email: &str) -> PathBuf {
        self.agents_dir
            .join(format!("{}.md", agent_email.replace(['/', '\\'], "_")))
    }
}

/// Inputs shared by every note of one report run.
pub struct ReportInput<'a> {
    pub entries: &'a [AuditEntry],
    pub agents: &'a [String],
    pub auditors: &'a [String],
    pub config: &'a AuditConfig,
    pub window: TimeWindow,
    pub now: OffsetDateTime,
}

pub fn build_report(input: &ReportInput<'_>, out_dir: &Path) -> Result<ReportPaths> {
    let paths = ReportPaths::new(out_dir);
    paths.ensure()?;

    let generated_at = input.now.format(&Rfc3339)?;
    let selected = input.window.select(input.entries, input.now);
    let thresholds = &input.config.thresholds;

    // 1) Dashboard
    let summary = dashboard(&selected, input.agents, input.auditors, thresholds);
    // compliance notices ignore the window
    let history: Vec<&AuditEntry> = input.entries.iter().collect();
    let compliance = compliance_alerts(&history, thresholds, input.now.offset());

    let mut lines = header("Dashboard", input.window, &generated_at);
    lines.push("## Summary".to_string());
    lines.push(String::new());
    lines.push(format!("- Total audits: {}", summary.total_audits));
    lines.push(format!("- Average score: {}", score(summary.average_score)));
    lines.push(format!(
        "- Total analysis time: {:.0}s",
        summary.total_analysis_seconds
    ));
    lines.push(String::new());

    lines.push("## Agent Performance".to_string());
    lines.push(String::new());
    lines.push("| Agent | Audits | Avg Score | Top Problem |".to_string());
    lines.push("|---|---|---|---|".to_string());
    for agent in &summary.agents {
        let problem = agent
            .top_problem
            .as_ref()
            .map(|p| format!("{} ({} low)", p.parameter, p.low_count))
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "| [[Agents/{0}|{0}]] | {1} | {2} | {3} |",
            agent.agent_email,
            agent.audit_count,
            score(agent.average),
            problem
        ));
    }
    lines.push(String::new());

    lines.push("## Auditor Performance".to_string());
    lines.push(String::new());
    lines.push("| Auditor | Audits | Avg Analysis Time |".to_string());
    lines.push("|---|---|---|".to_string());
    for auditor in &summary.auditors {
        let seconds = auditor
            .average_analysis_seconds
            .map(|s| format!("{s:.0}s"))
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "| {} | {} | {} |",
            auditor.auditor, auditor.audit_count, seconds
        ));
    }
    lines.push(String::new());

    lines.push("## Team Parameters".to_string());
    lines.push(String::new());
    if summary.team_parameters.is_empty() {
        lines.push("_No detailed scores yet._".to_string());
    }
    for param in &summary.team_parameters {
        lines.push(format!(
            "- {}: {:.1} ({} calls)",
            param.parameter, param.average, param.count
        ));
    }
    lines.push(String::new());

    lines.push("## Coaching Alerts".to_string());
    lines.push(String::new());
    if summary.coaching_alerts.is_empty() {
        lines.push("_No coaching alerts._".to_string());
    }
    for alert in &summary.coaching_alerts {
        lines.push(format!(
            "- {} keeps scoring low on **{}** (avg score {:.1})",
            alert.agent_email, alert.parameter, alert.average_score
        ));
    }
    lines.push(String::new());

    lines.push("## Compliance Alerts".to_string());
    lines.push(String::new());
    if compliance.is_empty() {
        lines.push("_No compliance alerts._".to_string());
    }
    for alert in &compliance {
        let issues: Vec<String> = alert.issues.iter().map(|i| i.to_string()).collect();
        lines.push(format!(
            "- `{}` {} (audited by {}): {}",
            alert.timestamp,
            alert.agent_email,
            alert.auditor_name,
            issues.join("; ")
        ));
    }

    fs::write(paths.index_dir.join("Dashboard.md"), lines.join("\n"))?;

    // 2) Leaderboard
    let board = leaderboard(&selected, thresholds);
    let mut lines = header("Leaderboard", input.window, &generated_at);
    lines.push("## Top Performers".to_string());
    lines.push(String::new());
    for (rank, agent) in board.top_performers.iter().enumerate() {
        lines.push(format!(
            "{}. {} - {:.1} ({} audits)",
            rank + 1,
            agent.agent_email,
            agent.average,
            agent.audit_count
        ));
    }
    lines.push(String::new());
    lines.push("## Excellence Awards".to_string());
    lines.push(String::new());
    if board.excellence_awards.is_empty() {
        lines.push("_No nominations yet._".to_string());
    }
    for (rank, award) in board.excellence_awards.iter().enumerate() {
        lines.push(format!(
            "{}. {} ({} nominated)",
            rank + 1,
            award.agent_email,
            award.nominations
        ));
    }
    lines.push(String::new());
    lines.push("## Active Auditors".to_string());
    lines.push(String::new());
    for (rank, auditor) in board.active_auditors.iter().enumerate() {
        lines.push(format!(
            "{}. {} ({} audits)",
            rank + 1,
            auditor.auditor,
            auditor.audit_count
        ));
    }
    lines.push(String::new());
    lines.push("## Badges".to_string());
    lines.push(String::new());
    for badge in Badge::ALL {
        lines.push(format!(
            "- **{}**: {} _{}_",
            badge.name(),
            board.holder(badge).unwrap_or("unclaimed"),
            badge.description(thresholds)
        ));
    }
    fs::write(paths.index_dir.join("Leaderboard.md"), lines.join("\n"))?;

    // 3) Best practices
    let nominated = best_practices(&selected, &BestPracticeFilter::default());
    let mut lines = header("Best Practices", input.window, &generated_at);
    if nominated.is_empty() {
        lines.push("_No nominated calls._".to_string());
    }
    for entry in nominated {
        lines.push(format!(
            "- **{}** `{}` score {}: {}",
            entry.agent_email,
            entry.timestamp,
            entry.overall_score(),
            entry.analysis.overall_score.summary
        ));
    }
    fs::write(paths.index_dir.join("Best Practices.md"), lines.join("\n"))?;

    // 4) Agent notes
    for agent in input.agents {
        let trend = agent_trend(
            &selected,
            agent,
            TrendMetric::Overall,
            thresholds,
            input.now.offset(),
        );
        write_agent_note(&paths, &trend, &generated_at)?;
    }

    Ok(paths)
}

fn header(title: &str, window: TimeWindow, generated_at: &str) -> Vec<String> {
    vec![
        format!("# {title} ({})", window.label()),
        String::new(),
        "This note is generated. Do not edit manually.".to_string(),
        format!("Generated at `{generated_at}`."),
        String::new(),
    ]
}

fn score(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.1}"))
        .unwrap_or_else(|| "n/a".to_string())
}

fn write_agent_note(paths: &ReportPaths, trend: &AgentTrend, generated_at: &str) -> Result<()> {
    let mut md = String::new();
    md.push_str("---\n");
    md.push_str(&format!("agent: {}\n", trend.agent_email));
    md.push_str(&format!("audits: {}\n", trend.audit_count));
    md.push_str(&format!("generated_at: {generated_at}\n"));
    md.push_str("---\n\n");

    md.push_str(&format!("# {}\n\n", trend.agent_email));
    md.push_str(&format!("- Audits: {}\n", trend.audit_count));
    md.push_str(&format!("- Average score: {}\n", score(trend.average)));
    md.push_str(&format!(
        "- Team average: {}\n",
        score(trend.team_metric_average)
    ));
    match &trend.last_audit {
        Some(ts) => md.push_str(&format!("- Last audit: `{ts}`\n\n")),
        None => md.push_str("- Last audit: never\n\n"),
    }

    md.push_str("## Parameters\n");
    if trend.parameter_averages.is_empty() {
        md.push_str("_No detailed scores._\n");
    }
    for param in &trend.parameter_averages {
        md.push_str(&format!("- {}: {:.1}\n", param.parameter, param.average));
    }
    md.push('\n');

    md.push_str("## Problem Areas\n");
    if trend.problem_parameters.is_empty() {
        md.push_str("_None._\n");
    }
    for problem in &trend.problem_parameters {
        md.push_str(&format!(
            "- {} ({} low scores)\n",
            problem.parameter, problem.low_count
        ));
    }
    md.push('\n');

    md.push_str(&format!("## {} Trend\n", trend.metric.label()));
    md.push_str("| Timestamp | Score |\n|---|---|\n");
    for point in &trend.series {
        md.push_str(&format!("| {} | {} |\n", point.timestamp, point.score));
    }

    fs::write(paths.agent_note(&trend.agent_email), md)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_core::schema::{PropertyAnalysis, ScoreParameter};
    use tempfile::TempDir;
    use time::macros::datetime;

    fn entry(id: i64, agent: &str, overall: i64, nominated: bool) -> AuditEntry {
        let mut entry: AuditEntry = serde_json::from_str(&format!(
            r#"{{"id": {id}, "timestamp": "2024-06-1{id}T09:00:00Z", "agentEmail": "{agent}", "auditorName": "qa@x.com"}}"#
        ))
        .unwrap();
        entry.analysis.overall_score.score = overall;
        entry.analysis.overall_score.summary = format!("Call {id}");
        entry.analysis.detailed_scores.push(ScoreParameter {
            parameter: "Closing".to_string(),
            score: overall,
            justification: String::new(),
        });
        entry.nominated = nominated.then_some(true);
        entry
    }

    #[test]
    fn writes_index_and_agent_notes() {
        let dir = TempDir::new().unwrap();
        let entries = vec![
            entry(1, "a@x.com", 9, true),
            entry(2, "a@x.com", 7, false),
            entry(3, "b@x.com", 4, false),
        ];
        let agents = vec!["a@x.com".to_string(), "b@x.com".to_string()];
        let auditors = vec!["qa@x.com".to_string()];
        let config = AuditConfig::default();
        let input = ReportInput {
            entries: &entries,
            agents: &agents,
            auditors: &auditors,
            config: &config,
            window: TimeWindow::MonthToDate,
            now: datetime!(2024-06-20 12:00:00 UTC),
        };

        let paths = build_report(&input, dir.path()).unwrap();

        let dashboard = fs::read_to_string(paths.index_dir.join("Dashboard.md")).unwrap();
        assert!(dashboard.starts_with("# Dashboard (Month-to-Date)"));
        assert!(dashboard.contains("- Total audits: 3"));
        assert!(dashboard.contains("| [[Agents/a@x.com|a@x.com]] | 2 | 8.0 | - |"));

        let board = fs::read_to_string(paths.index_dir.join("Leaderboard.md")).unwrap();
        assert!(board.contains("1. a@x.com - 8.0 (2 audits)"));
        assert!(board.contains("1. a@x.com (1 nominated)"));

        let practices = fs::read_to_string(paths.index_dir.join("Best Practices.md")).unwrap();
        assert!(practices.contains("Call 1"));
        assert!(!practices.contains("Call 2"));

        let note = fs::read_to_string(paths.agent_note("b@x.com")).unwrap();
        assert!(note.contains("- Closing (1 low scores)"));
        assert!(note.contains("| 2024-06-13T09:00:00Z | 4 |"));
    }

    #[test]
    fn compliance_alerts_outlive_the_window() {
        let dir = TempDir::new().unwrap();
        let mut flagged = entry(1, "a@x.com", 6, false);
        flagged.timestamp = "2024-06-01T09:00:00Z".to_string();
        let mut property = PropertyAnalysis {
            property_identifier: "Tower A".to_string(),
            ..Default::default()
        };
        property.site_visit_scheduled.reschedule_red_flag = Some(true);
        flagged.analysis.properties_discussed.push(property);
        let entries = vec![flagged];
        let agents = vec!["a@x.com".to_string()];
        let config = AuditConfig::default();
        let input = ReportInput {
            entries: &entries,
            agents: &agents,
            auditors: &[],
            config: &config,
            window: TimeWindow::Today,
            now: datetime!(2024-06-15 10:00:00 UTC),
        };

        let paths = build_report(&input, dir.path()).unwrap();
        let dashboard = fs::read_to_string(paths.index_dir.join("Dashboard.md")).unwrap();
        assert!(dashboard.contains("- Total audits: 0"));
        assert!(dashboard.contains("reschedule red flag on Tower A"));
        assert!(!dashboard.contains("_No compliance alerts._"));
    }

    #[test]
    fn empty_history_still_renders() {
        let dir = TempDir::new().unwrap();
        let config = AuditConfig::default();
        let input = ReportInput {
            entries: &[],
            agents: &[],
            auditors: &[],
            config: &config,
            window: TimeWindow::All,
            now: datetime!(2024-06-20 12:00:00 UTC),
        };
        let paths = build_report(&input, dir.path()).unwrap();
        let dashboard = fs::read_to_string(paths.index_dir.join("Dashboard.md")).unwrap();
        assert!(dashboard.contains("- Average score: n/a"));
        assert!(dashboard.contains("_No coaching alerts._"));
    }
}
