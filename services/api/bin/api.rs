//! Main Entrypoint for the tenurAItee API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the database connection pool and running migrations.
//! 3. Initializing shared services (the customer generator, speech, and progress store).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use std::{collections::HashMap, fs, net::SocketAddr, sync::Arc, time::Duration};
use tenuraitee_api::{
    config::{Config, Provider},
    db::Db,
    router::create_router,
    state::{AppState, SessionRegistry},
};
use tenuraitee_core::{
    SessionServices,
    generator::{CUSTOMER_PROMPT_KEY, LLMResponseGenerator, SCORING_PROMPT_KEY},
    llm_client::OpenAICompatibleClient,
    progress::{CachedProgressStore, ProgressStore},
    tts::{ElevenLabsClient, TextToSpeech},
};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// How often idle simulations are swept from the registry.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; shutting down");
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompts from a directory.
fn load_prompts(prompts_path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in fs::read_dir(prompts_path)
        .with_context(|| format!("Could not read prompts from {}", prompts_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }

    for key in [CUSTOMER_PROMPT_KEY, SCORING_PROMPT_KEY] {
        if !prompts.contains_key(key) {
            anyhow::bail!("{key}.md not found in prompts directory");
        }
    }
    Ok(prompts)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Database ---
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let db = Db::new(pool);
    db.run_migrations().await?;
    info!("Database connection established and migrations are up-to-date.");

    let store: Arc<dyn ProgressStore> = Arc::new(CachedProgressStore::new(
        Arc::new(db),
        config.progress_cache_ttl,
    ));

    // --- 4. Initialize Shared Services ---
    let prompts = load_prompts(&config.prompts_path)?;

    let openai_config = match &config.provider {
        Provider::OpenAI => {
            info!("Using OpenAI provider.");
            let api_key = config
                .openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY is not set")?;
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base("https://api.openai.com/v1/")
        }
        Provider::Gemini => {
            info!("Using Gemini provider.");
            let api_key = config
                .gemini_api_key
                .as_deref()
                .context("GEMINI_API_KEY is not set")?;
            OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base("https://generativelanguage.googleapis.com/v1beta/openai")
        }
    };
    let llm_client = Arc::new(OpenAICompatibleClient::new(
        openai_config,
        config.chat_model.clone(),
    ));
    let generator = Arc::new(LLMResponseGenerator::new(llm_client, prompts));

    let tts: Option<Arc<dyn TextToSpeech>> = match &config.speech {
        Some(speech) => {
            info!("Text-to-speech enabled.");
            Some(Arc::new(ElevenLabsClient::new(speech.elevenlabs())?))
        }
        None => {
            info!("ELEVENLABS_API_KEY not set; customer lines will not be spoken.");
            None
        }
    };

    let sessions = Arc::new(SessionRegistry::new(config.session_idle_timeout));
    sessions.clone().spawn_sweeper(SWEEP_INTERVAL);

    let app_state = Arc::new(AppState {
        services: SessionServices {
            generator,
            tts,
            store,
        },
        sessions,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
