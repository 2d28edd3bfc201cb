//! The call-simulation loop: a scripted five-step dialogue with an
//! LLM-played customer, scored turn by turn, with progress persisted at the
//! end and later scenarios unlocked in order.

pub mod audio;
pub mod error;
pub mod generator;
pub mod llm_client;
pub mod progress;
pub mod responses;
pub mod scenario;
pub mod scoring;
pub mod session;
pub mod simulation;
pub mod transcript;
pub mod tts;
pub mod unlock;

pub use error::SimulationError;
pub use scenario::{CATALOG, MAX_STEPS, Scenario, ScenarioId};
pub use session::{SessionServices, SimulationSession};
pub use simulation::{SimulationState, SimulationStatus};
