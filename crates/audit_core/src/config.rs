use crate::error::{AuditError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "audit.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub thresholds: Thresholds,
    pub defaults: Defaults,
}

/// Tunables for every aggregation and selection rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// A detailed score at or below this value counts as a low score.
    pub low_score: i64,
    pub coaching_min_audits: usize,
    pub coaching_min_low_scores: usize,
    pub compliance_alert_limit: usize,
    pub leaderboard_size: usize,
    pub badge_min_audits: usize,
    pub rapport_parameter: String,
    pub rapport_min_average: f64,
    pub root_cause_max_score: i64,
    pub root_cause_min_calls: usize,
    pub call_of_the_week_min_score: i64,
    pub coaching_plan_audits: usize,
    pub trend_window: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_score: 5,
            coaching_min_audits: 3,
            coaching_min_low_scores: 2,
            compliance_alert_limit: 5,
            leaderboard_size: 10,
            badge_min_audits: 5,
            rapport_parameter: "Greeting & Opening".to_string(),
            rapport_min_average: 8.5,
            root_cause_max_score: 5,
            root_cause_min_calls: 3,
            call_of_the_week_min_score: 9,
            coaching_plan_audits: 10,
            trend_window: 20,
        }
    }
}

/// Seed lists used for empty stores and when the store cannot be read.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub agents: Vec<String>,
    pub auditors: Vec<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            agents: vec![
                "agent.one@example.com".to_string(),
                "agent.two@example.com".to_string(),
            ],
            auditors: vec!["auditor@example.com".to_string()],
        }
    }
}

impl AuditConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using built-in defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| AuditError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&raw).map_err(|e| match e {
            AuditError::Config(msg) => AuditError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: AuditConfig =
            toml::from_str(raw).map_err(|e| AuditError::Config(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = AuditConfig::from_toml(
            r#"
            [thresholds]
            low_score = 4
            rapport_parameter = "Opening"

            [defaults]
            agents = ["x@y.com"]
            "#,
        )
        .unwrap();
        assert_eq!(config.thresholds.low_score, 4);
        assert_eq!(config.thresholds.rapport_parameter, "Opening");
        assert_eq!(config.thresholds.coaching_min_audits, 3);
        assert_eq!(config.defaults.agents, vec!["x@y.com".to_string()]);
        assert_eq!(config.defaults.auditors, Defaults::default().auditors);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let err = AuditConfig::from_toml("thresholds = 3").unwrap_err();
        assert!(matches!(err, AuditError::Config(_)));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = AuditConfig::load(Path::new("/nonexistent/audit.toml")).unwrap();
        assert_eq!(config.thresholds.leaderboard_size, 10);
    }
}
