//! Chatline application composition root
//!
//! Picks the store, builds the completion capability, starts the completion
//! pipeline, and composes the domain router.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::get, Json, Router};
use chatline_common::Config;
use chatline_conversations::{
    CompletionPipeline, ConversationsRepositories, ConversationsState, GenerationSettings,
    PipelineSettings,
};
use chatline_llm::{LlmConfig, LlmService, LlmServiceFactory};
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::task::JoinHandle;

/// Which backing store the application runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        }
    }
}

/// A composed application: the router plus the pipeline it feeds
pub struct App {
    pub router: Router,
    pub pipeline: CompletionPipeline,
    /// Completes once every pipeline handle is dropped and in-flight runs finish
    pub dispatcher: JoinHandle<()>,
}

#[derive(Clone)]
struct HealthState {
    pipeline: CompletionPipeline,
    store: StoreKind,
}

/// Create the application from configuration, connecting to the store
pub async fn create_app(config: &Config, llm_config: LlmConfig) -> Result<App, anyhow::Error> {
    let (repos, store) = match &config.database_url {
        Some(url) => {
            let pool = PgPool::connect(url)
                .await
                .map_err(|e| anyhow::anyhow!("Database connection failed: {}", e))?;
            sqlx::migrate!("../../migrations").run(&pool).await?;
            tracing::info!("Database connection established, migrations applied");
            (ConversationsRepositories::postgres(pool), StoreKind::Postgres)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            (ConversationsRepositories::in_memory(), StoreKind::Memory)
        }
    };

    tracing::info!(provider = %llm_config.provider, "Creating completion service");
    let llm: Arc<dyn LlmService> = Arc::from(LlmServiceFactory::create(llm_config)?);

    Ok(build_app(config, repos, llm, store))
}

/// Compose the application over already constructed dependencies.
///
/// Must be called inside a Tokio runtime; the pipeline dispatcher is spawned here.
pub fn build_app(
    config: &Config,
    repos: ConversationsRepositories,
    llm: Arc<dyn LlmService>,
    store: StoreKind,
) -> App {
    let (pipeline, dispatcher) =
        CompletionPipeline::start(repos.clone(), llm, pipeline_settings(config));

    let conversations_state = ConversationsState::new(
        repos,
        Arc::new(pipeline.clone()),
        config.delete_retry_attempts,
    );

    let health = Router::new()
        .route("/health", get(health_check))
        .with_state(HealthState {
            pipeline: pipeline.clone(),
            store,
        });

    let router = Router::new()
        .route(
            "/",
            get(|| async { concat!("Chatline API v", env!("CARGO_PKG_VERSION")) }),
        )
        .merge(health)
        .merge(chatline_conversations::routes().with_state(conversations_state));

    App {
        router,
        pipeline,
        dispatcher,
    }
}

pub fn pipeline_settings(config: &Config) -> PipelineSettings {
    PipelineSettings {
        generation: GenerationSettings {
            max_tokens: config.completion_max_tokens,
            temperature: config.completion_temperature,
        },
        timeout: Duration::from_secs(config.completion_timeout_secs),
        queue_capacity: config.pipeline_queue_capacity,
        concurrency: config.pipeline_concurrency,
    }
}

/// Health check endpoint with pipeline counters
async fn health_check(State(state): State<HealthState>) -> Json<Value> {
    let stats = state.pipeline.stats();
    Json(json!({
        "status": "ok",
        "store": state.store.as_str(),
        "pipeline": {
            "scheduled": stats.scheduled,
            "pending": stats.pending(),
            "completed": stats.completed,
            "quota_exceeded": stats.quota_exceeded,
            "generation_error": stats.generation_error,
            "rejected": stats.rejected,
        },
    }))
}
