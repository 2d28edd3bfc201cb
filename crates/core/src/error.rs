use crate::scenario::ScenarioId;
use crate::simulation::SimulationStatus;

/// Errors raised by the simulation state machine and the session around it.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Scenario '{0}' is locked; pass the previous scenario first")]
    ScenarioLocked(ScenarioId),
    #[error("Responses can only be submitted while a call is in progress (status: {0})")]
    NotInProgress(SimulationStatus),
    #[error("A response is already being processed")]
    TurnInFlight,
    #[error("Response must not be empty")]
    EmptyResponse,
    /// The simulation was reset or restarted while the turn was in flight.
    #[error("The call changed while this response was being processed")]
    StaleTurn,
    /// The remote generator failed; the caller may retry the same response.
    #[error("Could not get the customer's reply: {0}")]
    Remote(#[source] anyhow::Error),
    /// Progress could not be written; the completed call is kept for a retry.
    #[error("Could not save progress: {0}")]
    Persistence(#[source] anyhow::Error),
    #[error("There is no completed call waiting to be saved")]
    NoPendingSave,
}

impl SimulationError {
    /// Whether resubmitting the same request can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SimulationError::Remote(_) | SimulationError::Persistence(_))
    }
}
