use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use wayfarer_core::generator::{MockGenerator, OpenRouterConfig, OpenRouterGenerator, PlanGenerator};
use wayfarer_core::repository::PgPlanStore;
use wayfarer_core::{
    GeneratedProposal, LifecycleConfig, PlanError, PlanLifecycleService, PlanRequest, ValidationError,
};
use wayfarer_db::models::Plan;

use crate::config::{AiConfig, AiProvider, WayfarerConfig};

/// Header carrying the authenticated caller's user id.
pub const USER_HEADER: &str = "x-user-id";

type SharedService = Arc<PlanLifecycleService>;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: msg.into(),
        }
    }
}

impl From<PlanError> for AppError {
    fn from(err: PlanError) -> Self {
        let status = match &err {
            PlanError::Validation(ValidationError::MissingContent) => StatusCode::BAD_REQUEST,
            PlanError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PlanError::NotFound(_) => StatusCode::NOT_FOUND,
            PlanError::Conflict(_) => StatusCode::CONFLICT,
            PlanError::AiServiceTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            PlanError::AiServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PlanError::PlanGeneration { .. } | PlanError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

/// Keeps the status axum chose for the rejection, so a body with a wrong
/// field is 422 and unparseable JSON is 400.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Caller identity
// ---------------------------------------------------------------------------

/// The user on whose behalf a request runs, taken from [`USER_HEADER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingUser(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for ActingUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| AppError::unauthorized(format!("missing {USER_HEADER} header")))?;
        value
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(Self)
            .ok_or_else(|| AppError::unauthorized(format!("invalid {USER_HEADER} header")))
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// [`Json`] body extractor whose rejections are [`AppError`]s.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[derive(Debug, Deserialize)]
pub struct EditPlanRequest {
    pub plan_text: String,
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Construct the generator selected by the `[ai]` configuration.
pub fn build_generator(ai: &AiConfig) -> Result<Arc<dyn PlanGenerator>> {
    match ai.provider {
        AiProvider::Mock => Ok(Arc::new(MockGenerator::default())),
        AiProvider::OpenRouter => {
            let mut config = OpenRouterConfig::new(ai.api_key.clone().unwrap_or_default());
            config.base_url = ai.base_url.clone();
            config.model = ai.model.clone();
            let generator = OpenRouterGenerator::new(config)
                .map_err(|e| anyhow::anyhow!("failed to build OpenRouter client: {e}"))?;
            Ok(Arc::new(generator))
        }
    }
}

/// Assemble the lifecycle service on top of PostgreSQL.
pub fn build_service(pool: PgPool, config: &WayfarerConfig) -> Result<PlanLifecycleService> {
    let store = Arc::new(PgPlanStore::new(pool));
    let generator = build_generator(&config.ai)?;
    let lifecycle = LifecycleConfig {
        generation_timeout: config.ai.generation_timeout,
        replace_policy: config.replace_policy,
        ..LifecycleConfig::default()
    };
    Ok(PlanLifecycleService::new(
        store.clone(),
        store.clone(),
        generator,
        store,
        lifecycle,
    ))
}

pub fn build_router(service: SharedService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/notes/{note_id}", delete(delete_note))
        .route("/notes/{note_id}/plan/generate", post(generate_plan))
        .route(
            "/notes/{note_id}/plan",
            get(get_plan).post(create_plan).put(edit_plan),
        )
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Start the HTTP server.
pub async fn run_serve(pool: PgPool, config: &WayfarerConfig) -> Result<()> {
    let service = Arc::new(build_service(pool, config)?);
    let app = build_router(service);

    let addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.bind, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        %addr,
        provider = ?config.ai.provider,
        replace_policy = %config.replace_policy,
        "wayfarer listening"
    );
    println!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler; serving until killed");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn generate_plan(
    State(service): State<SharedService>,
    ActingUser(user): ActingUser,
    Path(note_id): Path<Uuid>,
) -> Result<(StatusCode, Json<GeneratedProposal>), AppError> {
    let proposal = service.generate(note_id, user).await?;
    Ok((StatusCode::CREATED, Json(proposal)))
}

async fn get_plan(
    State(service): State<SharedService>,
    ActingUser(user): ActingUser,
    Path(note_id): Path<Uuid>,
) -> Result<Response, AppError> {
    match service.get_active(note_id, user).await? {
        Some(plan) => Ok(Json(plan).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn create_plan(
    State(service): State<SharedService>,
    ActingUser(user): ActingUser,
    Path(note_id): Path<Uuid>,
    JsonBody(request): JsonBody<PlanRequest>,
) -> Result<(StatusCode, Json<Plan>), AppError> {
    let plan = service.create_or_accept(note_id, user, request).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn edit_plan(
    State(service): State<SharedService>,
    ActingUser(user): ActingUser,
    Path(note_id): Path<Uuid>,
    JsonBody(request): JsonBody<EditPlanRequest>,
) -> Result<Json<Plan>, AppError> {
    let plan = service.edit(note_id, user, &request.plan_text).await?;
    Ok(Json(plan))
}

async fn delete_note(
    State(service): State<SharedService>,
    ActingUser(user): ActingUser,
    Path(note_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    service.delete_note(note_id, user).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
