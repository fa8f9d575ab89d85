//!
//! courtbook HTTP server
//! ---------------------
//! Axum routes over the identity, authorization and attendance core.
//!
//! Responsibilities:
//! - Resolve identity once per request (middleware) and hand handlers a
//!   `RequestContext` through the request extensions.
//! - Translate `AppError` categories into status codes and a `{error, message}` body.
//! - Run reservation and release under the configured request timeout.
//! - Startup wiring: open the store, seed the catalog, bind the listener.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context};
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info};

use crate::attendance::CapacityAllocator;
use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::identity::{provision_federated_user, AccessGuard, FederatedProfile, IdentityResolver, RequestContext};
use crate::model::{SessionStatus, UserRecord};
use crate::security::{self, seed_roles_and_permissions};
use crate::sessions::{NewSession, SessionService};
use crate::storage::SharedStore;

/// Shared server state injected into all handlers. Every component is built once
/// by `AppState::build` and shares the one store handle.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub resolver: Arc<IdentityResolver>,
    pub guard: AccessGuard,
    pub allocator: CapacityAllocator,
    pub sessions: SessionService,
}

impl AppState {
    pub fn build(settings: &Settings, store: SharedStore) -> AppResult<Self> {
        let resolver = Arc::new(IdentityResolver::from_settings(settings)?);
        let guard = AccessGuard::new(store.clone());
        Ok(Self {
            allocator: CapacityAllocator::new(store.clone(), settings.request_timeout()),
            sessions: SessionService::new(store.clone(), guard.clone()),
            guard,
            resolver,
            store,
        })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_recoverable() {
            debug!(target: "courtbook::server", "request rejected: {}", self);
        } else {
            error!(target: "courtbook::server", "request failed: {}", self);
        }
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({"error": self.code_str(), "message": self.public_message()}))).into_response()
    }
}

/// Resolve the caller before any handler runs. A bad credential ends the request here.
async fn identity_layer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match state.resolver.resolve(req.headers()) {
        Ok(ctx) => {
            let ctx = ctx.with_request_id(uuid::Uuid::new_v4().to_string());
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(session_detail).delete(delete_session))
        .route("/api/sessions/{id}/attend", post(attend).delete(cancel_attendance))
        .route("/api/profile", get(profile))
        .route("/api/users/attended-sessions", get(attended_sessions))
        .route("/api/auth/federated", put(federated_sign_in))
        .route("/api/admin/sessions/{id}/status", put(update_session_status))
        .route("/api/admin/users/{id}/roles", put(update_user_roles))
        .layer(middleware::from_fn_with_state(state.clone(), identity_layer))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = if state.store.is_available() { "ok" } else { "unavailable" };
    Json(json!({"status": "ok", "store": store}))
}

async fn create_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<NewSession>,
) -> AppResult<impl IntoResponse> {
    let session = state.sessions.create_session(&ctx, body)?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn session_detail(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.sessions.session_detail(&ctx, &id)?))
}

async fn delete_session(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.sessions.delete_session(&ctx, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct AttendPayload {
    #[serde(default = "default_slot")]
    slot: i64,
}

fn default_slot() -> i64 { 1 }

async fn attend(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    body: Option<Json<AttendPayload>>,
) -> AppResult<impl IntoResponse> {
    let principal = ctx.require_principal()?;
    let slot = body.map(|Json(b)| b.slot).unwrap_or_else(default_slot);
    let rec = state.allocator.reserve(&id, &principal.user_id, slot).await?;
    Ok((StatusCode::CREATED, Json(rec)))
}

async fn cancel_attendance(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let principal = ctx.require_principal()?;
    Ok(Json(state.allocator.release(&id, &principal.user_id).await?))
}

#[derive(Debug, Serialize)]
struct ProfileView {
    user_id: String,
    role: String,
    source: String,
    user: Option<UserRecord>,
    roles: Vec<String>,
    permissions: Vec<String>,
}

async fn profile(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> AppResult<Json<ProfileView>> {
    let principal = ctx.require_principal()?;
    let user = state.store.read(|t| t.user(&principal.user_id).cloned())?;
    Ok(Json(ProfileView {
        user_id: principal.user_id.clone(),
        role: principal.role.clone(),
        source: principal.source.to_string(),
        user,
        roles: security::roles_of(&state.store, &principal.user_id)?,
        permissions: security::permissions_of(&state.store, &principal.user_id)?,
    }))
}

async fn attended_sessions(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.sessions.attended_sessions(&ctx)?))
}

async fn federated_sign_in(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(profile): Json<FederatedProfile>,
) -> AppResult<impl IntoResponse> {
    let principal = ctx.require_principal()?;
    let out = provision_federated_user(&state.store, principal, &profile)?;
    Ok((StatusCode::ACCEPTED, Json(out)))
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    status: String,
}

async fn update_session_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Json(body): Json<StatusPayload>,
) -> AppResult<impl IntoResponse> {
    let status: SessionStatus = body.status.parse().map_err(|e: String| AppError::validation("invalid_status", e))?;
    Ok(Json(state.sessions.update_session_status(&ctx, &id, status).await?))
}

#[derive(Debug, Deserialize)]
struct RolesPayload {
    roles: Vec<String>,
}

async fn update_user_roles(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
    Json(body): Json<RolesPayload>,
) -> AppResult<impl IntoResponse> {
    let actor = ctx.require_principal()?;
    security::reassign_roles(&state.guard, &actor.user_id, &id, &body.roles)?;
    Ok(Json(json!({"user_id": id, "roles": security::roles_of(&state.store, &id)?})))
}

fn open_store(settings: &Settings) -> anyhow::Result<SharedStore> {
    match settings.data_dir.as_deref() {
        Some(dir) => SharedStore::open(dir).with_context(|| format!("While opening store under '{}'", dir)),
        None => {
            info!(target: "courtbook::server", "no data dir configured, state is in-memory only");
            Ok(SharedStore::in_memory())
        }
    }
}

/// Start the courtbook HTTP server with the given settings.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    if settings.jwt_secret.is_empty() {
        bail!("COURTBOOK_JWT_SECRET must be set");
    }
    let store = open_store(&settings)?;
    seed_roles_and_permissions(&store).context("While seeding roles and permissions")?;
    let state = AppState::build(&settings, store).context("While building server state")?;
    if !state.resolver.federated_enabled() {
        info!(target: "courtbook::server", "no federated issuer configured, federated tokens will be rejected");
    }
    let app = build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", settings.http_port).parse()?;
    info!(target: "courtbook::server", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
