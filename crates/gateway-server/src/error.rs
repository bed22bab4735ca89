use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_contracts::Role;
use gateway_kernel::RETRY_AFTER_SECS;
use serde_json::{json, Value};
use thiserror::Error;

use crate::identity::AuthError;

const CORS_HEADERS: [(&str, &str); 3] = [
    ("access-control-allow-origin", "*"),
    (
        "access-control-allow-headers",
        "authorization, x-client-info, apikey, content-type",
    ),
    (
        "access-control-allow-methods",
        "GET, POST, PUT, PATCH, DELETE, OPTIONS",
    ),
];

pub(crate) fn apply_cors(headers: &mut HeaderMap) {
    for (name, value) in CORS_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
}

pub(crate) fn with_cors(mut response: Response) -> Response {
    apply_cors(response.headers_mut());
    response
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("route not found: {method} {path}")]
    RouteNotFound {
        path: String,
        method: String,
        available: Vec<String>,
    },
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("method not allowed: {method} {path}")]
    MethodNotAllowed { method: String, path: String },
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("rate limiter unavailable: {0}")]
    RateLimiter(String),
    #[error("forwarding failed: {0}")]
    Forwarding(String),
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("permission denied: requires {}", .required.display_name())]
    PermissionDenied { required: Role },
    #[error("handler failed: {0}")]
    Handler(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("audit write failed: {0}")]
    Audit(String),
    #[error("action not found: {0}")]
    NotFound(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RouteNotFound { .. } | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Auth(AuthError::ProviderUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Forwarding(_) => StatusCode::BAD_GATEWAY,
            ApiError::InvalidBody(_) | ApiError::Validation(_) | ApiError::UnknownAction(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            ApiError::RateLimiter(_)
            | ApiError::Handler(_)
            | ApiError::Store(_)
            | ApiError::Audit(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> Value {
        match self {
            ApiError::RouteNotFound {
                path,
                method,
                available,
            } => json!({
                "error": "Route not found",
                "path": path,
                "method": method,
                "availableRoutes": available,
            }),
            ApiError::Auth(err) => json!({"error": err.to_string()}),
            ApiError::MethodNotAllowed { method, path } => json!({
                "error": "Method not allowed",
                "path": path,
                "method": method,
            }),
            ApiError::RateLimited => json!({
                "error": "Rate limit exceeded",
                "retryAfter": RETRY_AFTER_SECS,
            }),
            ApiError::RateLimiter(message) => {
                json!({"error": "Rate limiter unavailable", "message": message})
            }
            ApiError::Forwarding(message) => json!({"error": "Gateway error", "message": message}),
            ApiError::InvalidBody(message) => {
                json!({"error": "Invalid request body", "message": message})
            }
            ApiError::Validation(message) => json!({"error": "Validation error", "message": message}),
            ApiError::UnknownAction(action) => json!({"error": "Unknown action", "action": action}),
            ApiError::PermissionDenied { required } => json!({
                "error": "Permission denied",
                "message": format!("This action requires {} role or higher", required.display_name()),
                "requiredRole": required.as_str(),
            }),
            ApiError::Handler(message) => json!({"error": "Action failed", "message": message}),
            ApiError::Store(message) => json!({"error": "Store error", "message": message}),
            ApiError::Audit(message) => json!({"error": "Audit write failed", "message": message}),
            ApiError::NotFound(id) => json!({"error": "Action not found", "id": id}),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        if matches!(self, ApiError::RateLimited) {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(RETRY_AFTER_SECS),
            );
        }
        with_cors(response)
    }
}
