//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for the scenario
//! catalog, user progress, and simulated calls. It uses `utoipa` doc comments
//! to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tenuraitee_core::{
    CATALOG, ScenarioId, SimulationError, SimulationSession, unlock::get_unlocked_scenarios,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    models::{
        AudioView, ErrorResponse, ProgressView, ResponseOptionsView, ScenarioSummary,
        SimulationView, StartSimulationPayload, SubmitResponsePayload, UnlockedView,
    },
    state::AppState,
};

const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    /// The LLM or another upstream failed; the same request can be retried.
    BadGateway(String),
    InternalServerError(anyhow::Error),
}

impl ApiError {
    /// Maps a simulation error onto its HTTP status.
    pub fn simulation(err: SimulationError) -> Self {
        match err {
            SimulationError::ScenarioLocked(_) => Self::Forbidden(err.to_string()),
            SimulationError::EmptyResponse => Self::BadRequest(err.to_string()),
            SimulationError::NotInProgress(_)
            | SimulationError::TurnInFlight
            | SimulationError::StaleTurn
            | SimulationError::NoPendingSave => Self::Conflict(err.to_string()),
            SimulationError::Remote(ref source) => {
                warn!(error = ?source, "Upstream call failed");
                Self::BadGateway(err.to_string())
            }
            SimulationError::Persistence(_) => Self::InternalServerError(err.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::BadGateway(message) => (StatusCode::BAD_GATEWAY, message),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { message })).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn require_user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    user_id(headers).ok_or_else(|| ApiError::BadRequest("x-user-id header is required".to_string()))
}

/// Looks up a simulation owned by the caller. Another user's simulation is
/// reported as missing.
async fn find_session(
    state: &AppState,
    headers: &HeaderMap,
    id: Uuid,
) -> Result<Arc<SimulationSession>, ApiError> {
    let not_found = || ApiError::NotFound(format!("Simulation with id '{}' not found", id));
    let session = state.sessions.get(id).await.ok_or_else(not_found)?;
    match session.user_id() {
        Some(owner) if user_id(headers).as_deref() != Some(owner) => Err(not_found()),
        _ => Ok(session),
    }
}

async fn view(id: Uuid, session: &SimulationSession) -> SimulationView {
    SimulationView::new(id, session.user_id(), &session.snapshot().await)
}

/// List the scenario catalog in unlock order.
#[utoipa::path(
    get,
    path = "/scenarios",
    responses(
        (status = 200, description = "Scenario catalog", body = [ScenarioSummary]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = Option<String>, Header, description = "The ID of the user; omit for an anonymous session")
    )
)]
pub async fn list_scenarios(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ScenarioSummary>>, ApiError> {
    let user_id = user_id(&headers);
    let unlocked =
        get_unlocked_scenarios(state.store().as_ref(), &CATALOG, user_id.as_deref()).await?;
    let scenarios = CATALOG
        .iter()
        .map(|scenario| ScenarioSummary::new(scenario, unlocked.contains(&scenario.id)))
        .collect();
    Ok(Json(scenarios))
}

/// Get a user's saved progress and XP.
#[utoipa::path(
    get,
    path = "/progress",
    responses(
        (status = 200, description = "Progress records and XP", body = ProgressView),
        (status = 400, description = "Missing user id", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the user")
    )
)]
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ProgressView>, ApiError> {
    let user_id = require_user_id(&headers)?;
    let records = state.store().progress_for_user(&user_id).await?;
    let stats = state.store().stats_for_user(&user_id).await?;
    Ok(Json(ProgressView::new(&user_id, stats, &records)))
}

/// Get the scenarios a user has unlocked.
#[utoipa::path(
    get,
    path = "/progress/unlocked",
    responses(
        (status = 200, description = "Unlocked scenario ids in catalog order", body = UnlockedView),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = Option<String>, Header, description = "The ID of the user; omit for an anonymous session")
    )
)]
pub async fn get_unlocked(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UnlockedView>, ApiError> {
    let user_id = user_id(&headers);
    let unlocked_scenario_ids =
        get_unlocked_scenarios(state.store().as_ref(), &CATALOG, user_id.as_deref()).await?;
    Ok(Json(UnlockedView {
        unlocked_scenario_ids,
    }))
}

/// Create a new simulation in the `selecting` state.
#[utoipa::path(
    post,
    path = "/simulations",
    responses(
        (status = 201, description = "Simulation created", body = SimulationView),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = Option<String>, Header, description = "The ID of the user; omit for an anonymous session")
    )
)]
pub async fn create_simulation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers);
    let session = SimulationSession::new(user_id, state.services.clone())
        .await
        .map_err(ApiError::simulation)?;
    let (id, session) = state.sessions.insert(session).await;
    info!(simulation_id = %id, user_id = session.user_id(), "Simulation created");

    Ok((StatusCode::CREATED, Json(view(id, &session).await)))
}

/// Get a simulation by its ID.
#[utoipa::path(
    get,
    path = "/simulations/{id}",
    responses(
        (status = 200, description = "Simulation state", body = SimulationView),
        (status = 404, description = "Simulation not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Simulation ID"),
        ("x-user-id" = Option<String>, Header, description = "The ID of the user")
    )
)]
pub async fn get_simulation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<SimulationView>, ApiError> {
    let session = find_session(&state, &headers, id).await?;
    Ok(Json(view(id, &session).await))
}

/// Discard a simulation.
#[utoipa::path(
    delete,
    path = "/simulations/{id}",
    responses(
        (status = 204, description = "Simulation deleted"),
        (status = 404, description = "Simulation not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Simulation ID"),
        ("x-user-id" = Option<String>, Header, description = "The ID of the user")
    )
)]
pub async fn delete_simulation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    find_session(&state, &headers, id).await?;
    state.sessions.remove(id).await;
    info!(simulation_id = %id, "Simulation deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Start a scenario, replacing any call already running in this simulation.
#[utoipa::path(
    post,
    path = "/simulations/{id}/start",
    request_body = StartSimulationPayload,
    responses(
        (status = 200, description = "Call started", body = SimulationView),
        (status = 400, description = "Unknown scenario", body = ErrorResponse),
        (status = 403, description = "Scenario is locked", body = ErrorResponse),
        (status = 404, description = "Simulation not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Simulation ID"),
        ("x-user-id" = Option<String>, Header, description = "The ID of the user")
    )
)]
pub async fn start_simulation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<StartSimulationPayload>,
) -> Result<Json<SimulationView>, ApiError> {
    let scenario_id: ScenarioId = payload
        .scenario_id
        .parse()
        .map_err(|e: tenuraitee_core::scenario::UnknownScenarioId| {
            ApiError::BadRequest(e.to_string())
        })?;
    let session = find_session(&state, &headers, id).await?;

    // Progress may have moved on in another simulation since this one was created.
    session
        .refresh_unlocks()
        .await
        .map_err(ApiError::simulation)?;
    session
        .start(scenario_id)
        .await
        .map_err(ApiError::simulation)?;
    Ok(Json(view(id, &session).await))
}

/// Get the canned responses offered for the current step.
#[utoipa::path(
    get,
    path = "/simulations/{id}/options",
    responses(
        (status = 200, description = "Response options; empty when no call is running", body = ResponseOptionsView),
        (status = 404, description = "Simulation not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Simulation ID"),
        ("x-user-id" = Option<String>, Header, description = "The ID of the user")
    )
)]
pub async fn get_response_options(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ResponseOptionsView>, ApiError> {
    let session = find_session(&state, &headers, id).await?;
    let options = session.response_options().await;
    let step = session.snapshot().await.current_step();
    Ok(Json(ResponseOptionsView {
        step,
        options: options.into_iter().map(str::to_string).collect(),
    }))
}

/// Submit the agent's response for the current step.
#[utoipa::path(
    post,
    path = "/simulations/{id}/responses",
    request_body = SubmitResponsePayload,
    responses(
        (status = 200, description = "Turn processed", body = SimulationView),
        (status = 400, description = "Empty response", body = ErrorResponse),
        (status = 404, description = "Simulation not found", body = ErrorResponse),
        (status = 409, description = "No call in progress, or a response is already being processed", body = ErrorResponse),
        (status = 500, description = "The call completed but progress was not saved; retry via the save endpoint", body = ErrorResponse),
        (status = 502, description = "The customer could not reply; resubmit the same response", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Simulation ID"),
        ("x-user-id" = Option<String>, Header, description = "The ID of the user")
    )
)]
pub async fn submit_response(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitResponsePayload>,
) -> Result<Json<SimulationView>, ApiError> {
    let session = find_session(&state, &headers, id).await?;
    session
        .submit_agent_response(&payload.text)
        .await
        .map_err(ApiError::simulation)?;
    Ok(Json(view(id, &session).await))
}

/// Retry saving a completed call whose progress could not be written.
#[utoipa::path(
    post,
    path = "/simulations/{id}/save",
    responses(
        (status = 200, description = "Progress saved", body = SimulationView),
        (status = 404, description = "Simulation not found", body = ErrorResponse),
        (status = 409, description = "No completed call is waiting to be saved", body = ErrorResponse),
        (status = 500, description = "Saving failed again; the call is still pending", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Simulation ID"),
        ("x-user-id" = Option<String>, Header, description = "The ID of the user")
    )
)]
pub async fn save_simulation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<SimulationView>, ApiError> {
    let session = find_session(&state, &headers, id).await?;
    let snapshot = session.retry_save().await.map_err(ApiError::simulation)?;
    Ok(Json(SimulationView::new(id, session.user_id(), &snapshot)))
}

/// Abandon the current call and return to scenario selection.
#[utoipa::path(
    post,
    path = "/simulations/{id}/reset",
    responses(
        (status = 200, description = "Simulation reset", body = SimulationView),
        (status = 404, description = "Simulation not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Simulation ID"),
        ("x-user-id" = Option<String>, Header, description = "The ID of the user")
    )
)]
pub async fn reset_simulation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<SimulationView>, ApiError> {
    let session = find_session(&state, &headers, id).await?;
    let snapshot = session.reset().await;
    Ok(Json(SimulationView::new(id, session.user_id(), &snapshot)))
}

/// Play or pause the customer's current audio clip.
#[utoipa::path(
    post,
    path = "/simulations/{id}/audio/toggle",
    responses(
        (status = 200, description = "Playback toggled", body = AudioView),
        (status = 404, description = "Simulation not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Simulation ID"),
        ("x-user-id" = Option<String>, Header, description = "The ID of the user")
    )
)]
pub async fn toggle_audio(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<AudioView>, ApiError> {
    let session = find_session(&state, &headers, id).await?;
    let is_playing = session.toggle_audio().await;
    let audio_url = session.snapshot().await.audio_url().map(str::to_string);
    Ok(Json(AudioView {
        is_playing,
        audio_url,
    }))
}
