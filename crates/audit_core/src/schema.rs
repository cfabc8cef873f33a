use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One audited call as persisted in the store and carried in export files.
///
/// Unknown keys found in imported documents are kept in `extra` so a record
/// survives an export/import cycle unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,          // epoch milliseconds at creation
    #[serde(default)]
    pub auditor_name: String,
    #[serde(default)]
    pub agent_email: String,
    pub timestamp: String, // ISO-8601
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub analysis: AnalysisResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_hash: Option<String>, // SHA-256 hex of the source audio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominated: Option<bool>,
    #[serde(default)]
    pub buyer_user_id: String,
    #[serde(default)]
    pub call_stamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>, // base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_mime_type: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AuditEntry {
    pub fn is_nominated(&self) -> bool {
        self.nominated.unwrap_or(false)
    }

    pub fn overall_score(&self) -> i64 {
        self.analysis.overall_score.score
    }

    pub fn parameter_score(&self, parameter: &str) -> Option<i64> {
        self.analysis
            .detailed_scores
            .iter()
            .find(|param| param.parameter == parameter)
            .map(|param| param.score)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisResult {
    pub agent_name: String,
    pub call_duration: f64,     // seconds
    pub analysis_duration: f64, // seconds spent by the analysis service
    pub detected_languages: String,
    pub is_reschedule_case: bool,
    pub reschedule_summary: String,
    pub overall_score: ScoreSummary,
    pub detailed_scores: Vec<ScoreParameter>,
    pub properties_discussed: Vec<PropertyAnalysis>,
    pub buyer_requirements_gathered: Attempt,
    pub cross_pitch_attempted: Attempt,
    pub call_dynamics: CallDynamics,
    pub call_moments: CallMoments,
    pub broker_behavior_analysis: ScoreSummary,
    pub visit_likelihood: VisitLikelihood,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScoreSummary {
    pub score: i64,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ScoreParameter {
    pub parameter: String,
    pub score: i64,
    pub justification: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Attempt {
    pub attempted: bool,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct VisitLikelihood {
    pub score: i64,
    pub justification: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CallDynamics {
    pub energy_level: ScoreSummary,
    pub communication_style: String,
    pub engagement_summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CallMoments {
    pub positive_points: Vec<String>,
    pub areas_for_improvement: Vec<AreaForImprovement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct AreaForImprovement {
    pub area: String,
    pub coaching_tip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct PropertyAnalysis {
    pub property_identifier: String,
    pub details: Vec<PropertyDetail>,
    pub timeline_events: TimelineEvents,
    pub details_shared_confirmation: DetailsSharedConfirmation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mandate_points_delivery: Option<MandatePointsDelivery>,
    pub site_visit_scheduled: SiteVisit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebuttal_handling: Option<RebuttalHandling>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PropertyDetail {
    pub detail: String,
    pub mentioned: bool,
    pub value: String,
}

/// Offsets into the call, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct TimelineEvents {
    pub property_introduction: Option<i64>,
    pub details_sharing_start: Option<i64>,
    pub site_visit_discussion_start: Option<i64>,
    pub slot_confirmation: Option<i64>,
    pub objection_raised: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DetailsSharedConfirmation {
    pub mentioned: bool,
    pub method: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MandatePointsDelivery {
    pub flow: String, // "Interactive" | "Monologue" | "Not Applicable"
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteVisit {
    pub mentioned: bool,
    pub status: String, // e.g. "Scheduled"
    pub slot_confirmation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reschedule_red_flag: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub red_flag_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_visit_offered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visit_conducted_by: Option<VisitConductedBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency_creation: Option<Attempt>,
}

impl SiteVisit {
    pub const SCHEDULED: &'static str = "Scheduled";

    pub fn is_scheduled(&self) -> bool {
        self.status == Self::SCHEDULED
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct VisitConductedBy {
    pub person: String,
    pub frm_details_provided: bool,
    pub pre_visit_call_instruction_given: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RebuttalHandling {
    pub attempted: bool,
    pub summary: String,
    pub effectiveness: String, // "Effective" | "Partially Effective" | "Ineffective" | "Not Applicable"
    pub approach: String,      // "Consultative" | "Argumentative" | "Dismissive" | "Not Applicable"
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_keeps_unknown_keys_and_absent_optionals() {
        let raw = json!({
            "id": 1717286399000i64,
            "auditorName": "qa@x.com",
            "agentEmail": "a@x.com",
            "timestamp": "2024-06-01T23:59:59.000Z",
            "fileName": "call.mp3",
            "analysis": { "overallScore": { "score": 7, "summary": "ok" } },
            "buyerUserId": "u-1",
            "callStamp": "10:00",
            "legacyField": "kept"
        });

        let entry: AuditEntry = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(entry.overall_score(), 7);
        assert!(!entry.is_nominated());
        assert_eq!(entry.extra.get("legacyField"), Some(&json!("kept")));

        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back.get("legacyField"), Some(&json!("kept")));
        assert!(back.get("nominated").is_none());
        assert!(back.get("audioHash").is_none());
    }

    #[test]
    fn scheduled_status_is_exact_match() {
        let mut visit = SiteVisit::default();
        assert!(!visit.is_scheduled());
        visit.status = "Scheduled".to_string();
        assert!(visit.is_scheduled());
    }
}
