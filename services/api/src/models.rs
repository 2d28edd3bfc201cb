//! API Models
//!
//! Request and response bodies for the REST API, with `utoipa` schemas for
//! the OpenAPI document. Views are built from the core types; core enums are
//! documented as their string forms.

use serde::{Deserialize, Serialize};
use tenuraitee_core::{
    Scenario, ScenarioId, SimulationState, SimulationStatus, MAX_STEPS,
    progress::{ProgressRecord, UserStats},
    scenario::Difficulty,
    transcript::{DialogueStep, Emotion, Speaker},
};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct ScenarioSummary {
    #[schema(value_type = String, example = "flightCancellation")]
    pub id: ScenarioId,
    pub title: String,
    pub description: String,
    pub duration_minutes: u32,
    #[schema(value_type = String, example = "Beginner")]
    pub difficulty: Difficulty,
    pub passing_score: u8,
    pub unlocked: bool,
}

impl ScenarioSummary {
    pub fn new(scenario: &Scenario, unlocked: bool) -> Self {
        Self {
            id: scenario.id,
            title: scenario.title.to_string(),
            description: scenario.description.to_string(),
            duration_minutes: scenario.duration_minutes,
            difficulty: scenario.difficulty,
            passing_score: scenario.passing_score,
            unlocked,
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub id: u32,
    #[schema(value_type = String, example = "customer")]
    pub speaker: Speaker,
    pub message: String,
    #[schema(value_type = Option<String>, example = "frustrated")]
    pub emotion: Option<Emotion>,
    pub score: Option<u8>,
    pub feedback: Option<String>,
}

impl From<&DialogueStep> for TranscriptEntry {
    fn from(step: &DialogueStep) -> Self {
        Self {
            id: step.id,
            speaker: step.speaker,
            message: step.message.clone(),
            emotion: step.emotion,
            score: step.score,
            feedback: step.feedback.clone(),
        }
    }
}

/// The full state of one simulated call.
#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct SimulationView {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub user_id: Option<String>,
    #[schema(value_type = String, example = "in-progress")]
    pub status: SimulationStatus,
    #[schema(value_type = Option<String>, example = "flightCancellation")]
    pub selected_scenario: Option<ScenarioId>,
    pub current_step: u32,
    pub max_steps: u32,
    pub transcript: Vec<TranscriptEntry>,
    pub is_loading: bool,
    pub is_playing: bool,
    pub audio_url: Option<String>,
    pub feedback_message: Option<String>,
    pub current_score: Option<u8>,
    pub average_score: Option<u8>,
    pub pass_threshold: Option<u8>,
    #[schema(value_type = Vec<String>)]
    pub unlocked_scenario_ids: Vec<ScenarioId>,
    /// The call completed but its progress is not saved yet; retry with
    /// `POST /simulations/{id}/save`.
    pub save_pending: bool,
}

impl SimulationView {
    pub fn new(id: Uuid, user_id: Option<&str>, state: &SimulationState) -> Self {
        Self {
            id,
            user_id: user_id.map(str::to_string),
            status: state.status(),
            selected_scenario: state.selected_scenario(),
            current_step: state.current_step(),
            max_steps: MAX_STEPS,
            transcript: state.transcript().iter().map(TranscriptEntry::from).collect(),
            is_loading: state.is_loading(),
            is_playing: state.is_playing(),
            audio_url: state.audio_url().map(str::to_string),
            feedback_message: state.feedback_message().map(str::to_string),
            current_score: state.current_score(),
            average_score: state.average_score(),
            pass_threshold: state.pass_threshold(),
            unlocked_scenario_ids: state.unlocked_scenario_ids().to_vec(),
            save_pending: state.has_pending_save(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct ProgressEntry {
    #[schema(value_type = String, example = "flightCancellation")]
    pub scenario_id: ScenarioId,
    pub score: u8,
    pub completed: bool,
    pub passed: bool,
    pub feedback: String,
    pub transcript: Vec<TranscriptEntry>,
}

impl From<&ProgressRecord> for ProgressEntry {
    fn from(record: &ProgressRecord) -> Self {
        Self {
            scenario_id: record.scenario_id,
            score: record.score,
            completed: record.completed,
            passed: record.passed,
            feedback: record.feedback.clone(),
            transcript: record.transcript.iter().map(TranscriptEntry::from).collect(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct ProgressView {
    pub user_id: String,
    pub xp: u32,
    pub level: u32,
    pub records: Vec<ProgressEntry>,
}

impl ProgressView {
    /// Records are listed in catalog order.
    pub fn new(user_id: &str, stats: UserStats, records: &[ProgressRecord]) -> Self {
        let mut records: Vec<&ProgressRecord> = records.iter().collect();
        records.sort_by_key(|record| tenuraitee_core::scenario::position(record.scenario_id));
        Self {
            user_id: user_id.to_string(),
            xp: stats.xp,
            level: stats.level,
            records: records.into_iter().map(ProgressEntry::from).collect(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct UnlockedView {
    #[schema(value_type = Vec<String>)]
    pub unlocked_scenario_ids: Vec<ScenarioId>,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct ResponseOptionsView {
    pub step: u32,
    pub options: Vec<String>,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct AudioView {
    pub is_playing: bool,
    pub audio_url: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct StartSimulationPayload {
    #[schema(example = "flightCancellation")]
    pub scenario_id: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitResponsePayload {
    #[schema(example = "I'm so sorry about the cancellation. Let me look at your options right now.")]
    pub text: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenuraitee_core::{CATALOG, scenario};

    #[test]
    fn test_scenario_summary_serialization() {
        let summary = ScenarioSummary::new(&CATALOG[0], true);
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["id"], "flightCancellation");
        assert_eq!(json["passing_score"], 70);
        assert_eq!(json["unlocked"], true);
    }

    #[test]
    fn test_simulation_view_reflects_state() {
        let mut state = SimulationState::default();
        state
            .start(scenario::find(ScenarioId::FlightCancellation))
            .unwrap();
        let id = Uuid::new_v4();

        let view = SimulationView::new(id, Some("agent-1"), &state);
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["status"], "in-progress");
        assert_eq!(json["selected_scenario"], "flightCancellation");
        assert_eq!(json["current_step"], 1);
        assert_eq!(json["max_steps"], MAX_STEPS);
        assert_eq!(json["transcript"][0]["speaker"], "customer");
        assert_eq!(json["transcript"][0]["id"], 1);
        assert!(json["transcript"][0]["score"].is_null());
        assert_eq!(json["unlocked_scenario_ids"][0], "flightCancellation");
    }

    #[test]
    fn test_progress_view_orders_by_catalog() {
        let record = |scenario_id| ProgressRecord {
            user_id: "agent-1".to_string(),
            scenario_id,
            score: 80,
            completed: true,
            passed: true,
            feedback: String::new(),
            transcript: Vec::new(),
        };
        let records = vec![record(ScenarioId::LostBaggage), record(ScenarioId::FlightCancellation)];

        let view = ProgressView::new("agent-1", UserStats { xp: 60, level: 1 }, &records);

        assert_eq!(view.records[0].scenario_id, ScenarioId::FlightCancellation);
        assert_eq!(view.records[1].scenario_id, ScenarioId::LostBaggage);
        assert_eq!(view.xp, 60);
    }

    #[test]
    fn test_payload_deserialization() {
        let start: StartSimulationPayload =
            serde_json::from_str(r#"{"scenario_id": "lostBaggage"}"#).unwrap();
        assert_eq!(start.scenario_id, "lostBaggage");

        let submit: SubmitResponsePayload = serde_json::from_str(r#"{"text": "Hello"}"#).unwrap();
        assert_eq!(submit.text, "Hello");
    }
}
