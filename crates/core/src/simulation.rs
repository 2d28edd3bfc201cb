//! Dialogue Stepper
//!
//! [`SimulationState`] is the state machine behind one simulated call:
//! `selecting -> in-progress -> completed`, with `reset` leading back to
//! `selecting` from anywhere.
//!
//! A submitted response is processed in two halves so that no lock is held
//! while the remote generator runs. [`SimulationState::begin_turn`] validates
//! the submission and marks the state as loading; the caller then runs the
//! remote call and hands the result back to
//! [`SimulationState::complete_turn`] (or [`SimulationState::fail_turn`]).
//! On the final step the caller uses [`SimulationState::finish`] instead.
//!
//! Every `start` and `reset` bumps a generation counter. A turn carries the
//! generation it was opened under, and its result is discarded if the call
//! has moved on in the meantime.

use crate::{
    audio::{AudioChannel, AudioClip},
    error::SimulationError,
    generator::CustomerReply,
    progress::SaveOutcome,
    scenario::{self, MAX_STEPS, Scenario, ScenarioId},
    scoring,
    transcript::DialogueStep,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimulationStatus {
    Selecting,
    InProgress,
    Completed,
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationStatus::Selecting => write!(f, "selecting"),
            SimulationStatus::InProgress => write!(f, "in-progress"),
            SimulationStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A submitted agent response waiting for the remote generator.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub generation: u64,
    pub scenario_id: ScenarioId,
    pub step: u32,
    /// The transcript as it was before this response.
    pub history: Vec<DialogueStep>,
    pub agent_text: String,
    /// The last step ends the call instead of asking for another customer line.
    pub is_final: bool,
}

/// Everything needed to persist a call that has just ended.
#[derive(Debug, Clone)]
pub struct CompletedCall {
    pub generation: u64,
    pub scenario_id: ScenarioId,
    pub transcript: Vec<DialogueStep>,
    /// Zero when no turn was ever scored.
    pub average_score: u8,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationState {
    status: SimulationStatus,
    selected_scenario: Option<ScenarioId>,
    current_step: u32,
    transcript: Vec<DialogueStep>,
    is_loading: bool,
    audio: AudioChannel,
    feedback_message: Option<String>,
    current_score: Option<u8>,
    average_score: Option<u8>,
    pass_threshold: Option<u8>,
    unlocked_scenario_ids: Vec<ScenarioId>,
    #[serde(skip)]
    generation: u64,
    /// A completed call whose progress could not be written yet.
    #[serde(skip)]
    pending_save: Option<CompletedCall>,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self::new(vec![scenario::CATALOG[0].id])
    }
}

impl SimulationState {
    pub fn new(unlocked_scenario_ids: Vec<ScenarioId>) -> Self {
        Self {
            status: SimulationStatus::Selecting,
            selected_scenario: None,
            current_step: 0,
            transcript: Vec::new(),
            is_loading: false,
            audio: AudioChannel::default(),
            feedback_message: None,
            current_score: None,
            average_score: None,
            pass_threshold: None,
            unlocked_scenario_ids,
            generation: 0,
            pending_save: None,
        }
    }

    pub fn status(&self) -> SimulationStatus {
        self.status
    }

    pub fn selected_scenario(&self) -> Option<ScenarioId> {
        self.selected_scenario
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn transcript(&self) -> &[DialogueStep] {
        &self.transcript
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_playing(&self) -> bool {
        self.audio.is_playing()
    }

    pub fn audio_url(&self) -> Option<&str> {
        self.audio.url()
    }

    pub fn feedback_message(&self) -> Option<&str> {
        self.feedback_message.as_deref()
    }

    pub fn current_score(&self) -> Option<u8> {
        self.current_score
    }

    pub fn average_score(&self) -> Option<u8> {
        self.average_score
    }

    pub fn pass_threshold(&self) -> Option<u8> {
        self.pass_threshold
    }

    pub fn unlocked_scenario_ids(&self) -> &[ScenarioId] {
        &self.unlocked_scenario_ids
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_pending_save(&self) -> bool {
        self.pending_save.is_some()
    }

    pub fn is_unlocked(&self, id: ScenarioId) -> bool {
        self.unlocked_scenario_ids.contains(&id)
    }

    pub fn set_unlocked(&mut self, unlocked_scenario_ids: Vec<ScenarioId>) {
        self.unlocked_scenario_ids = unlocked_scenario_ids;
    }

    /// Returns to `selecting`, stopping audio and dropping any in-flight turn.
    ///
    /// The unlocked set is kept: it mirrors persisted progress, not the call.
    pub fn reset(&mut self) {
        self.audio.stop();
        let audio = std::mem::take(&mut self.audio);
        let unlocked = std::mem::take(&mut self.unlocked_scenario_ids);
        let generation = self.generation + 1;
        *self = Self::new(unlocked);
        self.audio = audio;
        self.generation = generation;
        debug!(generation, "Simulation reset");
    }

    /// Starts a call with the scenario's opening line.
    ///
    /// Picking a scenario resets whatever call was running before.
    pub fn start(&mut self, scenario: &Scenario) -> Result<(), SimulationError> {
        if !self.is_unlocked(scenario.id) {
            return Err(SimulationError::ScenarioLocked(scenario.id));
        }

        self.reset();
        self.status = SimulationStatus::InProgress;
        self.selected_scenario = Some(scenario.id);
        self.pass_threshold = Some(scenario.passing_score);
        self.current_step = 1;
        self.transcript.push(DialogueStep::customer(
            1,
            scenario.opening_line,
            scenario.opening_emotion,
        ));
        info!(scenario = %scenario.id, generation = self.generation, "Simulation started");
        Ok(())
    }

    /// Opens a turn for the agent's response.
    ///
    /// Rejected without any change when no call is in progress, when a turn
    /// is already in flight, or when the response is blank.
    pub fn begin_turn(&mut self, agent_text: &str) -> Result<PendingTurn, SimulationError> {
        if self.status != SimulationStatus::InProgress {
            return Err(SimulationError::NotInProgress(self.status));
        }
        if self.is_loading {
            return Err(SimulationError::TurnInFlight);
        }
        let agent_text = agent_text.trim();
        if agent_text.is_empty() {
            return Err(SimulationError::EmptyResponse);
        }
        let Some(scenario_id) = self.selected_scenario else {
            return Err(SimulationError::NotInProgress(self.status));
        };

        self.is_loading = true;
        Ok(PendingTurn {
            generation: self.generation,
            scenario_id,
            step: self.current_step,
            history: self.transcript.clone(),
            agent_text: agent_text.to_string(),
            is_final: self.current_step >= MAX_STEPS,
        })
    }

    /// Applies the generator's reply: appends the agent line (with its
    /// assessment) and the customer's answer, then advances the step.
    pub fn complete_turn(
        &mut self,
        turn: PendingTurn,
        reply: CustomerReply,
    ) -> Result<(), SimulationError> {
        self.ensure_current(&turn)?;

        let agent_id = self.next_entry_id();
        let mut agent = DialogueStep::agent(agent_id, turn.agent_text);
        agent.score = reply.score;
        agent.feedback = reply.feedback.clone();
        self.transcript.push(agent);
        self.transcript.push(DialogueStep::customer(
            agent_id + 1,
            reply.message,
            reply.emotion,
        ));

        self.current_step += 1;
        self.is_loading = false;
        if reply.feedback.is_some() {
            self.feedback_message = reply.feedback;
        }
        self.refresh_scores();
        Ok(())
    }

    /// Clears the loading flag after a failed remote call. The transcript is
    /// left exactly as it was so the same response can be resubmitted.
    pub fn fail_turn(&mut self, turn: &PendingTurn) {
        if turn.generation == self.generation {
            self.is_loading = false;
        }
    }

    /// Ends the call on its final step.
    pub fn finish(&mut self, turn: PendingTurn) -> Result<CompletedCall, SimulationError> {
        self.ensure_current(&turn)?;

        let agent_id = self.next_entry_id();
        self.transcript
            .push(DialogueStep::agent(agent_id, turn.agent_text));
        self.refresh_scores();

        let average_score = self.average_score.unwrap_or(0);
        let passing_score = self
            .pass_threshold
            .unwrap_or(scenario::find(turn.scenario_id).passing_score);
        let passed = scoring::is_passing(average_score, passing_score);

        self.transcript.push(DialogueStep::system(
            agent_id + 1,
            format!("Call completed. Average score: {average_score}/100."),
        ));
        self.status = SimulationStatus::Completed;
        self.is_loading = false;
        self.feedback_message = Some(if passed {
            format!(
                "Great job! You passed with an average score of {average_score} (passing score {passing_score})."
            )
        } else {
            format!(
                "You scored {average_score}, but {passing_score} is needed to pass. Review the feedback and try again."
            )
        });
        info!(scenario = %turn.scenario_id, average_score, passed, "Simulation completed");

        Ok(CompletedCall {
            generation: self.generation,
            scenario_id: turn.scenario_id,
            transcript: self.transcript.clone(),
            average_score,
            passed,
        })
    }

    /// Keeps a completed call whose save failed so it can be retried.
    /// Ignored once the call has been reset or restarted.
    pub fn hold_pending_save(&mut self, call: CompletedCall) {
        if call.generation == self.generation && self.status == SimulationStatus::Completed {
            self.pending_save = Some(call);
        }
    }

    pub fn take_pending_save(&mut self) -> Option<CompletedCall> {
        self.pending_save.take()
    }

    /// Records the persisted result of a completed call. The unlock set is
    /// replaced only when it could be resolved.
    pub fn record_outcome(
        &mut self,
        generation: u64,
        outcome: &SaveOutcome,
        unlocked_scenario_ids: Option<Vec<ScenarioId>>,
    ) {
        if generation != self.generation {
            return;
        }
        if outcome.success && outcome.xp_awarded > 0 {
            let message = self.feedback_message.take().unwrap_or_default();
            self.feedback_message = Some(
                format!("{message} +{} XP", outcome.xp_awarded)
                    .trim()
                    .to_string(),
            );
        }
        if let Some(unlocked_scenario_ids) = unlocked_scenario_ids {
            self.unlocked_scenario_ids = unlocked_scenario_ids;
        }
    }

    /// Loads synthesized speech for the latest customer line, unless the
    /// call has moved on since it was requested.
    pub fn load_audio(&mut self, generation: u64, clip: AudioClip) {
        if generation == self.generation {
            self.audio.load(clip);
        }
    }

    pub fn toggle_audio(&mut self) -> bool {
        self.audio.toggle()
    }

    fn ensure_current(&self, turn: &PendingTurn) -> Result<(), SimulationError> {
        if turn.generation != self.generation {
            debug!(
                turn_generation = turn.generation,
                generation = self.generation,
                "Discarding stale turn"
            );
            return Err(SimulationError::StaleTurn);
        }
        Ok(())
    }

    fn next_entry_id(&self) -> u32 {
        self.transcript.len() as u32 + 1
    }

    fn refresh_scores(&mut self) {
        self.average_score = scoring::average_score(&self.transcript);
        self.current_score = scoring::latest_score(&self.transcript);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responses::response_options;
    use crate::transcript::{Emotion, Speaker};

    fn flight() -> &'static Scenario {
        scenario::find(ScenarioId::FlightCancellation)
    }

    fn reply(score: Option<u8>) -> CustomerReply {
        CustomerReply {
            message: "Okay, what happens next?".to_string(),
            emotion: Emotion::Calm,
            score,
            feedback: score.map(|_| "Great empathy".to_string()),
        }
    }

    fn started() -> SimulationState {
        let mut state = SimulationState::default();
        state.start(flight()).unwrap();
        state
    }

    #[test]
    fn test_start_sets_opening_line() {
        let state = started();
        assert_eq!(state.status(), SimulationStatus::InProgress);
        assert_eq!(state.current_step(), 1);
        assert_eq!(state.transcript().len(), 1);
        assert_eq!(state.transcript()[0].speaker, Speaker::Customer);
        assert_eq!(state.transcript()[0].message, flight().opening_line);
        assert_eq!(state.pass_threshold(), Some(70));
        assert_eq!(state.average_score(), None);
    }

    #[test]
    fn test_locked_scenario_cannot_start() {
        let mut state = SimulationState::default();
        let locked = scenario::find(ScenarioId::HotelOverbooking);
        let err = state.start(locked).unwrap_err();
        assert!(matches!(err, SimulationError::ScenarioLocked(ScenarioId::HotelOverbooking)));
        assert_eq!(state.status(), SimulationStatus::Selecting);
    }

    #[test]
    fn test_first_canned_response_advances_to_step_two() {
        for option in response_options(ScenarioId::FlightCancellation, 1) {
            let mut state = started();
            let turn = state.begin_turn(option).unwrap();
            assert!(state.is_loading());
            assert_eq!(turn.step, 1);
            assert!(!turn.is_final);

            state.complete_turn(turn, reply(None)).unwrap();
            assert_eq!(state.transcript().len(), 3);
            assert_eq!(state.current_step(), 2);
            assert!(!state.is_loading());
            assert_eq!(state.transcript()[1].speaker, Speaker::Agent);
            assert_eq!(state.transcript()[1].message, *option);
            assert_eq!(state.transcript()[2].speaker, Speaker::Customer);
            assert_eq!(state.transcript()[2].id, 3);
        }
    }

    #[test]
    fn test_scored_turn_sets_average() {
        let mut state = started();
        let turn = state.begin_turn("first").unwrap();
        state.complete_turn(turn, reply(None)).unwrap();
        let turn = state.begin_turn("second").unwrap();
        state.complete_turn(turn, reply(Some(92))).unwrap();

        assert_eq!(state.average_score(), Some(92));
        assert_eq!(state.current_score(), Some(92));
        assert_eq!(state.feedback_message(), Some("Great empathy"));
        assert_eq!(state.transcript()[3].score, Some(92));
    }

    #[test]
    fn test_submit_outside_in_progress_changes_nothing() {
        let mut state = SimulationState::default();
        let err = state.begin_turn("hello").unwrap_err();
        assert!(matches!(err, SimulationError::NotInProgress(SimulationStatus::Selecting)));
        assert!(state.transcript().is_empty());
        assert!(!state.is_loading());
    }

    #[test]
    fn test_concurrent_submission_is_rejected() {
        let mut state = started();
        let _turn = state.begin_turn("first").unwrap();
        let err = state.begin_turn("second").unwrap_err();
        assert!(matches!(err, SimulationError::TurnInFlight));
        assert_eq!(state.transcript().len(), 1);
    }

    #[test]
    fn test_blank_response_is_rejected() {
        let mut state = started();
        assert!(matches!(
            state.begin_turn("   ").unwrap_err(),
            SimulationError::EmptyResponse
        ));
        assert!(!state.is_loading());
    }

    #[test]
    fn test_failed_turn_leaves_transcript_intact() {
        let mut state = started();
        let turn = state.begin_turn("first").unwrap();
        state.fail_turn(&turn);

        assert!(!state.is_loading());
        assert_eq!(state.transcript().len(), 1);
        assert_eq!(state.current_step(), 1);
        assert!(state.begin_turn("first").is_ok());
    }

    #[test]
    fn test_late_reply_after_reset_is_discarded() {
        let mut state = started();
        let turn = state.begin_turn("first").unwrap();
        state.reset();

        let err = state.complete_turn(turn, reply(Some(80))).unwrap_err();
        assert!(matches!(err, SimulationError::StaleTurn));
        assert_eq!(state.status(), SimulationStatus::Selecting);
        assert!(state.transcript().is_empty());
    }

    #[test]
    fn test_full_call_completes_with_average() {
        let mut state = started();
        let scores = [None, Some(80), Some(85), Some(90)];
        for score in scores {
            let turn = state.begin_turn("response").unwrap();
            assert!(!turn.is_final);
            state.complete_turn(turn, reply(score)).unwrap();
        }
        assert_eq!(state.current_step(), MAX_STEPS);

        let turn = state.begin_turn("goodbye").unwrap();
        assert!(turn.is_final);
        let completed = state.finish(turn).unwrap();

        assert_eq!(state.status(), SimulationStatus::Completed);
        assert_eq!(completed.average_score, 85);
        assert!(completed.passed);
        let last = state.transcript().last().unwrap();
        assert_eq!(last.speaker, Speaker::System);
        assert!(last.message.starts_with("Call completed"));
        // opening + 4 * (agent, customer) + final agent + system
        assert_eq!(state.transcript().len(), 11);
        assert!(matches!(
            state.begin_turn("more").unwrap_err(),
            SimulationError::NotInProgress(SimulationStatus::Completed)
        ));
    }

    #[test]
    fn test_reset_from_completed_restores_initial_values() {
        let mut state = started();
        for _ in 0..MAX_STEPS - 1 {
            let turn = state.begin_turn("response").unwrap();
            state.complete_turn(turn, reply(Some(60))).unwrap();
        }
        state.load_audio(
            state.generation(),
            AudioClip {
                url: "data:audio/mpeg;base64,AAAA".to_string(),
                mime_type: "audio/mpeg".to_string(),
            },
        );
        let turn = state.begin_turn("bye").unwrap();
        state.finish(turn).unwrap();
        assert!(state.is_playing());

        state.reset();
        let fresh = SimulationState::default();
        assert_eq!(state.status(), fresh.status());
        assert_eq!(state.current_step(), fresh.current_step());
        assert_eq!(state.transcript(), fresh.transcript());
        assert_eq!(state.is_loading(), fresh.is_loading());
        assert_eq!(state.selected_scenario(), None);
        assert_eq!(state.feedback_message(), None);
        assert_eq!(state.current_score(), None);
        assert_eq!(state.average_score(), None);
        assert_eq!(state.pass_threshold(), None);
        assert!(!state.is_playing());
        assert_eq!(state.audio_url(), None);
    }

    #[test]
    fn test_record_outcome_updates_unlocks_and_message() {
        let mut state = started();
        let generation = state.generation();
        let outcome = SaveOutcome {
            success: true,
            passed: true,
            passing_score: 70,
            xp_awarded: 30,
        };
        state.record_outcome(
            generation,
            &outcome,
            Some(vec![ScenarioId::FlightCancellation, ScenarioId::LostBaggage]),
        );
        assert!(state.is_unlocked(ScenarioId::LostBaggage));
        assert_eq!(state.feedback_message(), Some("+30 XP"));

        state.record_outcome(generation + 1, &outcome, Some(vec![]));
        assert!(state.is_unlocked(ScenarioId::LostBaggage));

        state.record_outcome(generation, &outcome, None);
        assert!(state.is_unlocked(ScenarioId::LostBaggage));
    }

    fn complete_call(state: &mut SimulationState) -> CompletedCall {
        for _ in 0..MAX_STEPS - 1 {
            let turn = state.begin_turn("response").unwrap();
            state.complete_turn(turn, reply(Some(75))).unwrap();
        }
        let turn = state.begin_turn("bye").unwrap();
        state.finish(turn).unwrap()
    }

    #[test]
    fn test_pending_save_is_held_until_taken() {
        let mut state = started();
        let call = complete_call(&mut state);

        state.hold_pending_save(call);
        assert!(state.has_pending_save());
        let held = state.take_pending_save().unwrap();
        assert_eq!(held.average_score, 75);
        assert!(!state.has_pending_save());
    }

    #[test]
    fn test_pending_save_dropped_by_reset() {
        let mut state = started();
        let call = complete_call(&mut state);
        state.hold_pending_save(call.clone());

        state.reset();
        assert!(!state.has_pending_save());

        // A save that fails after the call moved on is not held either.
        state.hold_pending_save(call);
        assert!(!state.has_pending_save());
    }

    #[test]
    fn test_reset_stops_playing_clip() {
        let mut state = started();
        state.load_audio(
            state.generation(),
            AudioClip {
                url: "data:audio/mpeg;base64,AAAA".to_string(),
                mime_type: "audio/mpeg".to_string(),
            },
        );
        assert!(state.is_playing());

        state.reset();
        assert!(!state.is_playing());
        assert_eq!(state.audio_url(), None);
        assert!(!state.toggle_audio());
    }
}
