//! Boundary to the hosted analysis model.
//!
//! Payloads coming back from the service are untyped JSON; they only become
//! an [`AnalysisResult`] after passing [`validate_analysis`].

use crate::error::{AuditError, Result};
use crate::schema::AnalysisResult;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub const MIN_SCORE: i64 = 0;
pub const MAX_SCORE: i64 = 10;

pub trait AnalysisService {
    /// Scores one call recording.
    fn analyze(&self, audio: &[u8], mime_type: &str) -> Result<AnalysisResult>;

    /// Turns a batch of analyses into prose (coaching plan, summary, and so on).
    fn summarize(&self, reports: &[AnalysisResult]) -> Result<String>;
}

pub fn validate_analysis(payload: Value) -> Result<AnalysisResult> {
    if !payload.is_object() {
        return Err(AuditError::Analysis(
            "analysis payload is not a JSON object".to_string(),
        ));
    }
    let result: AnalysisResult = serde_json::from_value(payload)
        .map_err(|e| AuditError::Analysis(format!("malformed analysis payload: {e}")))?;

    check_score("overallScore", result.overall_score.score)?;
    for param in &result.detailed_scores {
        check_score(&format!("detailedScores[{}]", param.parameter), param.score)?;
    }
    check_score("callDynamics.energyLevel", result.call_dynamics.energy_level.score)?;
    check_score("brokerBehaviorAnalysis", result.broker_behavior_analysis.score)?;
    check_score("visitLikelihood", result.visit_likelihood.score)?;
    Ok(result)
}

fn check_score(field: &str, score: i64) -> Result<()> {
    if (MIN_SCORE..=MAX_SCORE).contains(&score) {
        Ok(())
    } else {
        Err(AuditError::Analysis(format!(
            "{field} score {score} is outside {MIN_SCORE}-{MAX_SCORE}"
        )))
    }
}

/// Serves an analysis produced out of band and saved as JSON.
#[derive(Debug, Clone)]
pub struct PrecomputedAnalysis {
    path: PathBuf,
}

impl PrecomputedAnalysis {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AnalysisService for PrecomputedAnalysis {
    fn analyze(&self, _audio: &[u8], _mime_type: &str) -> Result<AnalysisResult> {
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            AuditError::Analysis(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let payload: Value = serde_json::from_str(&raw).map_err(|e| {
            AuditError::Analysis(format!("{} is not valid JSON: {e}", self.path.display()))
        })?;
        validate_analysis(payload)
    }

    fn summarize(&self, _reports: &[AnalysisResult]) -> Result<String> {
        Err(AuditError::Analysis(
            "prose generation needs the hosted analysis service".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn payload() -> Value {
        json!({
            "agentName": "Asha",
            "callDuration": 312.5,
            "analysisDuration": 14,
            "overallScore": { "score": 7, "summary": "Solid call." },
            "detailedScores": [
                { "parameter": "Greeting & Opening", "score": 9, "justification": "Warm." },
                { "parameter": "Closing", "score": 4, "justification": "No next step." }
            ],
            "callDynamics": { "energyLevel": { "score": 6, "summary": "Even." } },
            "brokerBehaviorAnalysis": { "score": 8, "summary": "Polite." },
            "visitLikelihood": { "score": 5, "justification": "Undecided." }
        })
    }

    #[test]
    fn valid_payload_becomes_typed_result() {
        let result = validate_analysis(payload()).unwrap();
        assert_eq!(result.agent_name, "Asha");
        assert_eq!(result.detailed_scores.len(), 2);
        assert_eq!(result.analysis_duration, 14.0);
    }

    #[test]
    fn out_of_range_detailed_score_is_rejected() {
        let mut bad = payload();
        bad["detailedScores"][1]["score"] = json!(11);
        let err = validate_analysis(bad).unwrap_err();
        assert!(matches!(err, AuditError::Analysis(msg) if msg.contains("Closing")));
    }

    #[test]
    fn wrong_shape_is_rejected() {
        assert!(validate_analysis(json!([1, 2])).is_err());
        let mut bad = payload();
        bad["overallScore"] = json!("seven");
        assert!(validate_analysis(bad).is_err());
    }

    #[test]
    fn precomputed_reads_and_validates_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", payload()).unwrap();
        let service = PrecomputedAnalysis::new(file.path());

        let result = service.analyze(b"audio", "audio/mpeg").unwrap();
        assert_eq!(result.overall_score.score, 7);
        assert!(service.summarize(&[result]).is_err());
    }
}
