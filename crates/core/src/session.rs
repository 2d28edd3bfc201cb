//! Drives one simulated call end to end.
//!
//! [`SimulationSession`] owns a [`SimulationState`] and runs the remote work
//! around it: the customer generator on every step, speech synthesis for each
//! customer line, and progress persistence plus unlock resolution once the
//! call ends. The state lock is never held across a remote call.

use crate::{
    audio::AudioClip,
    error::SimulationError,
    generator::{GenerationRequest, ResponseGenerator},
    progress::{self, ProgressStore},
    responses,
    scenario::{self, CATALOG, ScenarioId},
    simulation::{CompletedCall, PendingTurn, SimulationState, SimulationStatus},
    tts::TextToSpeech,
    unlock,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// The collaborators a session talks to.
#[derive(Clone)]
pub struct SessionServices {
    pub generator: Arc<dyn ResponseGenerator>,
    /// `None` runs the call silently.
    pub tts: Option<Arc<dyn TextToSpeech>>,
    pub store: Arc<dyn ProgressStore>,
}

pub struct SimulationSession {
    user_id: Option<String>,
    services: SessionServices,
    state: Mutex<SimulationState>,
}

impl SimulationSession {
    /// Creates a session in `selecting` with the user's unlocked scenarios.
    pub async fn new(
        user_id: Option<String>,
        services: SessionServices,
    ) -> Result<Self, SimulationError> {
        let unlocked =
            unlock::get_unlocked_scenarios(services.store.as_ref(), &CATALOG, user_id.as_deref())
                .await
                .map_err(SimulationError::Persistence)?;
        Ok(Self {
            user_id,
            services,
            state: Mutex::new(SimulationState::new(unlocked)),
        })
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub async fn snapshot(&self) -> SimulationState {
        self.state.lock().await.clone()
    }

    /// Re-reads the unlocked set from the store.
    pub async fn refresh_unlocks(&self) -> Result<SimulationState, SimulationError> {
        let unlocked = self.resolve_unlocks().await?;
        let mut state = self.state.lock().await;
        state.set_unlocked(unlocked);
        Ok(state.clone())
    }

    /// Starts `scenario_id`, replacing any call already running.
    #[instrument(skip(self), fields(user_id = self.user_id.as_deref()))]
    pub async fn start(&self, scenario_id: ScenarioId) -> Result<SimulationState, SimulationError> {
        let scenario = scenario::find(scenario_id);
        let generation = {
            let mut state = self.state.lock().await;
            state.start(scenario)?;
            state.generation()
        };

        self.speak(generation, scenario.opening_line).await;
        Ok(self.snapshot().await)
    }

    /// Canned responses for the current step, empty unless a call is running.
    pub async fn response_options(&self) -> Vec<&'static str> {
        let state = self.state.lock().await;
        match (state.status(), state.selected_scenario()) {
            (SimulationStatus::InProgress, Some(id)) => {
                responses::response_options(id, state.current_step()).to_vec()
            }
            _ => Vec::new(),
        }
    }

    /// Submits the agent's response for the current step.
    ///
    /// A generator failure leaves the call exactly as it was so the same
    /// response can be sent again.
    #[instrument(skip(self, agent_text), fields(user_id = self.user_id.as_deref()))]
    pub async fn submit_agent_response(
        &self,
        agent_text: &str,
    ) -> Result<SimulationState, SimulationError> {
        let turn = self.state.lock().await.begin_turn(agent_text)?;

        if turn.is_final {
            let completed = self.state.lock().await.finish(turn)?;
            self.persist(completed).await?;
            return Ok(self.snapshot().await);
        }

        self.advance(turn).await?;
        Ok(self.snapshot().await)
    }

    /// Saves a completed call whose progress could not be written earlier.
    ///
    /// Fails with [`SimulationError::NoPendingSave`] when nothing is waiting,
    /// and keeps the call pending again if this attempt fails too.
    #[instrument(skip(self), fields(user_id = self.user_id.as_deref()))]
    pub async fn retry_save(&self) -> Result<SimulationState, SimulationError> {
        let completed = self
            .state
            .lock()
            .await
            .take_pending_save()
            .ok_or(SimulationError::NoPendingSave)?;
        self.persist(completed).await?;
        Ok(self.snapshot().await)
    }

    /// Abandons the current call and returns to `selecting`.
    pub async fn reset(&self) -> SimulationState {
        let mut state = self.state.lock().await;
        state.reset();
        state.clone()
    }

    /// Pauses or resumes the customer's audio; returns the new playing flag.
    pub async fn toggle_audio(&self) -> bool {
        self.state.lock().await.toggle_audio()
    }

    async fn advance(&self, turn: PendingTurn) -> Result<(), SimulationError> {
        let request = GenerationRequest {
            scenario_id: turn.scenario_id,
            step: turn.step,
            history: turn.history.clone(),
            agent_response: turn.agent_text.clone(),
            user_id: self.user_id.clone(),
        };

        let reply = match self
            .services
            .generator
            .generate_next_customer_response(request)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = ?e, step = turn.step, "Customer reply failed");
                self.state.lock().await.fail_turn(&turn);
                return Err(SimulationError::Remote(e));
            }
        };

        let generation = turn.generation;
        let customer_line = reply.message.clone();
        self.state.lock().await.complete_turn(turn, reply)?;
        self.speak(generation, &customer_line).await;
        Ok(())
    }

    /// Writes the call's progress. On failure the call is held in the state
    /// so [`SimulationSession::retry_save`] can write it later.
    async fn persist(&self, completed: CompletedCall) -> Result<(), SimulationError> {
        let scenario = scenario::find(completed.scenario_id);
        let outcome = match progress::save_progress(
            self.services.store.as_ref(),
            self.user_id.as_deref(),
            scenario,
            &completed.transcript,
            completed.average_score,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = ?e, scenario = %completed.scenario_id, "Saving progress failed");
                self.state.lock().await.hold_pending_save(completed);
                return Err(SimulationError::Persistence(e));
            }
        };

        // The record is written; a failed unlock read only leaves the old set.
        let unlocked = match self.resolve_unlocks().await {
            Ok(unlocked) => Some(unlocked),
            Err(e) => {
                warn!(error = ?e, "Could not refresh unlocked scenarios after saving");
                None
            }
        };
        self.state
            .lock()
            .await
            .record_outcome(completed.generation, &outcome, unlocked);
        info!(
            scenario = %completed.scenario_id,
            saved = outcome.success,
            passed = outcome.passed,
            xp = outcome.xp_awarded,
            "Call outcome recorded"
        );
        Ok(())
    }

    async fn resolve_unlocks(&self) -> Result<Vec<ScenarioId>, SimulationError> {
        unlock::get_unlocked_scenarios(
            self.services.store.as_ref(),
            &CATALOG,
            self.user_id.as_deref(),
        )
        .await
        .map_err(SimulationError::Persistence)
    }

    /// Synthesizes `text` and loads it into the audio channel. Failures are
    /// logged; the call goes on without sound.
    async fn speak(&self, generation: u64, text: &str) {
        let Some(tts) = &self.services.tts else {
            return;
        };
        match tts.synthesize(text).await {
            Ok(clip) => self.load_audio(generation, clip).await,
            Err(e) => warn!(error = ?e, "Speech synthesis failed"),
        }
    }

    async fn load_audio(&self, generation: u64, clip: AudioClip) {
        self.state.lock().await.load_audio(generation, clip);
    }
}
