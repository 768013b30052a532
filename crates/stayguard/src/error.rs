use crate::compliance::{
    ResolveError, RuleImportError, SnapshotError, StayServiceError, SweepError,
};
use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Rules(RuleImportError),
    Snapshot(SnapshotError),
    Sweep(SweepError),
    Stay(StayServiceError),
    Resolve(ResolveError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Rules(err) => write!(f, "jurisdiction rules error: {}", err),
            AppError::Snapshot(err) => write!(f, "snapshot error: {}", err),
            AppError::Sweep(err) => write!(f, "compliance sweep error: {}", err),
            AppError::Stay(err) => write!(f, "stay error: {}", err),
            AppError::Resolve(err) => write!(f, "jurisdiction error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Rules(err) => Some(err),
            AppError::Snapshot(err) => Some(err),
            AppError::Sweep(err) => Some(err),
            AppError::Stay(err) => Some(err),
            AppError::Resolve(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Rules(_) => StatusCode::BAD_REQUEST,
            AppError::Resolve(_) => StatusCode::NOT_FOUND,
            AppError::Sweep(SweepError::AlreadyRunning) => StatusCode::CONFLICT,
            AppError::Stay(
                StayServiceError::InvalidDates { .. }
                | StayServiceError::UnknownRegion(_)
                | StayServiceError::ExceedsLimit { .. },
            ) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Stay(StayServiceError::AlreadyInactive(_)) => StatusCode::CONFLICT,
            AppError::Stay(StayServiceError::NotPropertyOwner) => StatusCode::FORBIDDEN,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Snapshot(_)
            | AppError::Sweep(_)
            | AppError::Stay(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<RuleImportError> for AppError {
    fn from(value: RuleImportError) -> Self {
        Self::Rules(value)
    }
}

impl From<SnapshotError> for AppError {
    fn from(value: SnapshotError) -> Self {
        Self::Snapshot(value)
    }
}

impl From<SweepError> for AppError {
    fn from(value: SweepError) -> Self {
        Self::Sweep(value)
    }
}

impl From<StayServiceError> for AppError {
    fn from(value: StayServiceError) -> Self {
        Self::Stay(value)
    }
}

impl From<ResolveError> for AppError {
    fn from(value: ResolveError) -> Self {
        Self::Resolve(value)
    }
}
