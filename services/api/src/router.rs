//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AudioView, ErrorResponse, ProgressEntry, ProgressView, ResponseOptionsView,
        ScenarioSummary, SimulationView, StartSimulationPayload, SubmitResponsePayload,
        TranscriptEntry, UnlockedView,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_scenarios,
        handlers::get_progress,
        handlers::get_unlocked,
        handlers::create_simulation,
        handlers::get_simulation,
        handlers::delete_simulation,
        handlers::start_simulation,
        handlers::get_response_options,
        handlers::submit_response,
        handlers::save_simulation,
        handlers::reset_simulation,
        handlers::toggle_audio,
    ),
    components(
        schemas(
            ScenarioSummary, SimulationView, TranscriptEntry, ProgressView, ProgressEntry,
            UnlockedView, ResponseOptionsView, AudioView, StartSimulationPayload,
            SubmitResponsePayload, ErrorResponse
        )
    ),
    tags(
        (name = "tenurAItee API", description = "Call simulations for customer-service agent training")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/scenarios", get(handlers::list_scenarios))
        .route("/progress", get(handlers::get_progress))
        .route("/progress/unlocked", get(handlers::get_unlocked))
        .route("/simulations", post(handlers::create_simulation))
        .route(
            "/simulations/{id}",
            get(handlers::get_simulation).delete(handlers::delete_simulation),
        )
        .route("/simulations/{id}/start", post(handlers::start_simulation))
        .route(
            "/simulations/{id}/options",
            get(handlers::get_response_options),
        )
        .route(
            "/simulations/{id}/responses",
            post(handlers::submit_response),
        )
        .route("/simulations/{id}/save", post(handlers::save_simulation))
        .route("/simulations/{id}/reset", post(handlers::reset_simulation))
        .route(
            "/simulations/{id}/audio/toggle",
            post(handlers::toggle_audio),
        )
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Create the final router that merges the stateful routes
    // with the stateless routes (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
