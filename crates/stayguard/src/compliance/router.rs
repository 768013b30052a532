use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{OwnerId, PropertyId, StayId};
use super::engine::{ComplianceEngine, SweepError};
use super::ledger::AuditLedger;
use super::notifier::Notifier;
use super::repository::{RepositoryError, StayRepository};
use super::stays::{StayRegistration, StayService, StayServiceError};

/// Shared handles for the compliance routes.
pub struct ComplianceServices<R, L, N> {
    pub engine: Arc<ComplianceEngine<R, L, N>>,
    pub stays: Arc<StayService<R, L>>,
    /// Bearer token for the sweep trigger; `None` closes the route.
    pub admin_token: Option<String>,
}

impl<R, L, N> Clone for ComplianceServices<R, L, N> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            stays: self.stays.clone(),
            admin_token: self.admin_token.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SweepRequest {
    /// Overrides the wall clock, for replays and tests.
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub region_code: String,
    pub stay_duration_days: i64,
    #[serde(default)]
    pub owner_occupied: bool,
}

#[derive(Debug, Deserialize)]
pub struct ShieldDeactivationRequest {
    pub owner_id: OwnerId,
}

/// Router builder exposing the sweep trigger, the resolver, and stay lifecycle endpoints.
pub fn compliance_router<R, L, N>(services: ComplianceServices<R, L, N>) -> Router
where
    R: StayRepository + 'static,
    L: AuditLedger + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/compliance/sweep", post(sweep_handler::<R, L, N>))
        .route(
            "/api/v1/jurisdiction/resolve",
            post(resolve_handler::<R, L, N>),
        )
        .route("/api/v1/stays", post(register_handler::<R, L, N>))
        .route(
            "/api/v1/stays/:stay_id/checkout",
            post(checkout_handler::<R, L, N>),
        )
        .route(
            "/api/v1/stays/:stay_id/cancel",
            post(cancel_handler::<R, L, N>),
        )
        .route(
            "/api/v1/stays/:stay_id/audit",
            get(audit_handler::<R, L, N>),
        )
        .route(
            "/api/v1/properties/:property_id/shield/deactivate",
            post(shield_deactivation_handler::<R, L, N>),
        )
        .with_state(services)
}

pub(crate) async fn sweep_handler<R, L, N>(
    State(services): State<ComplianceServices<R, L, N>>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<SweepRequest>,
) -> Response
where
    R: StayRepository + 'static,
    L: AuditLedger + 'static,
    N: Notifier + 'static,
{
    let Some(expected) = services.admin_token.as_deref() else {
        return error_response(StatusCode::FORBIDDEN, "sweep trigger is disabled");
    };
    if bearer_token(&headers) != Some(expected) {
        return error_response(StatusCode::UNAUTHORIZED, "invalid admin token");
    }

    let now = request.now.unwrap_or_else(Utc::now);
    let engine = services.engine.clone();
    let outcome = tokio::task::spawn_blocking(move || engine.run_sweep(now)).await;

    match outcome {
        Ok(Ok(report)) => (StatusCode::OK, axum::Json(report)).into_response(),
        Ok(Err(SweepError::AlreadyRunning)) => {
            error_response(StatusCode::CONFLICT, "a compliance sweep is already running")
        }
        Ok(Err(err)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        Err(join_error) => {
            error!(error = %join_error, "sweep task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "sweep task failed")
        }
    }
}

pub(crate) async fn resolve_handler<R, L, N>(
    State(services): State<ComplianceServices<R, L, N>>,
    axum::Json(request): axum::Json<ResolveRequest>,
) -> Response
where
    R: StayRepository + 'static,
    L: AuditLedger + 'static,
    N: Notifier + 'static,
{
    match services.stays.resolver().resolve(
        &request.region_code,
        request.stay_duration_days,
        request.owner_occupied,
    ) {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(err) => error_response(StatusCode::NOT_FOUND, &err.to_string()),
    }
}

pub(crate) async fn register_handler<R, L, N>(
    State(services): State<ComplianceServices<R, L, N>>,
    axum::Json(registration): axum::Json<StayRegistration>,
) -> Response
where
    R: StayRepository + 'static,
    L: AuditLedger + 'static,
    N: Notifier + 'static,
{
    match services.stays.register(registration, Utc::now()) {
        Ok(registered) => (StatusCode::CREATED, axum::Json(registered)).into_response(),
        Err(StayServiceError::ExceedsLimit {
            message,
            classification,
        }) => {
            let payload = json!({
                "error": message,
                "classification": classification,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn checkout_handler<R, L, N>(
    State(services): State<ComplianceServices<R, L, N>>,
    Path(stay_id): Path<String>,
) -> Response
where
    R: StayRepository + 'static,
    L: AuditLedger + 'static,
    N: Notifier + 'static,
{
    match services.stays.checkout(&StayId(stay_id), Utc::now()) {
        Ok(stay) => (StatusCode::OK, axum::Json(stay)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn cancel_handler<R, L, N>(
    State(services): State<ComplianceServices<R, L, N>>,
    Path(stay_id): Path<String>,
) -> Response
where
    R: StayRepository + 'static,
    L: AuditLedger + 'static,
    N: Notifier + 'static,
{
    match services.stays.cancel(&StayId(stay_id), Utc::now()) {
        Ok(stay) => (StatusCode::OK, axum::Json(stay)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn audit_handler<R, L, N>(
    State(services): State<ComplianceServices<R, L, N>>,
    Path(stay_id): Path<String>,
) -> Response
where
    R: StayRepository + 'static,
    L: AuditLedger + 'static,
    N: Notifier + 'static,
{
    match services.stays.audit_trail(&StayId(stay_id)) {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn shield_deactivation_handler<R, L, N>(
    State(services): State<ComplianceServices<R, L, N>>,
    Path(property_id): Path<String>,
    axum::Json(request): axum::Json<ShieldDeactivationRequest>,
) -> Response
where
    R: StayRepository + 'static,
    L: AuditLedger + 'static,
    N: Notifier + 'static,
{
    match services.stays.deactivate_shield_mode(
        &PropertyId(property_id),
        &request.owner_id,
        Utc::now(),
    ) {
        Ok(property) => (StatusCode::OK, axum::Json(property)).into_response(),
        Err(err) => service_error_response(err),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn service_error_response(err: StayServiceError) -> Response {
    let status = match &err {
        StayServiceError::InvalidDates { .. }
        | StayServiceError::UnknownRegion(_)
        | StayServiceError::ExceedsLimit { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        StayServiceError::AlreadyInactive(_)
        | StayServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        StayServiceError::NotPropertyOwner => StatusCode::FORBIDDEN,
        StayServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        StayServiceError::Repository(RepositoryError::Unavailable(_))
        | StayServiceError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, &err.to_string())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(json!({ "error": message }))).into_response()
}
