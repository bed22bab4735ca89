use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use gateway_contracts::API_VERSION;
use gateway_kernel::{rate_limit_key, RouteTable};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::{with_cors, ApiError};
use crate::forward::InboundRequest;
use crate::AppState;

pub(crate) async fn preflight() -> Response {
    with_cors(StatusCode::OK.into_response())
}

pub(crate) async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    let path = uri.path().to_string();
    warn!(%method, %path, "method not allowed");
    ApiError::MethodNotAllowed {
        method: method.to_string(),
        path,
    }
}

pub(crate) async fn gateway(State(state): State<AppState>, request: Request<Body>) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    match route_request(&state, request).await {
        Ok(response) => response,
        Err(err) => {
            let status = err.status();
            if status.is_server_error() {
                error!(%method, %path, status = status.as_u16(), error = %err, "gateway request failed");
            } else {
                warn!(%method, %path, status = status.as_u16(), error = %err, "gateway request rejected");
            }
            err.into_response()
        }
    }
}

async fn route_request(state: &AppState, request: Request<Body>) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    if parts.method == Method::OPTIONS {
        return Ok(preflight().await);
    }
    if parts.method == Method::GET {
        match path.as_str() {
            "/" => return Ok(status_page(&state.routes)),
            "/docs" => return Ok(with_cors(Json(openapi_document(&state.routes)).into_response())),
            _ => {}
        }
    }

    let route = state
        .routes
        .find(&path, parts.method.as_str())
        .map_err(|miss| ApiError::RouteNotFound {
            path: miss.path,
            method: miss.method,
            available: state.routes.paths(),
        })?;

    let caller = if route.require_auth {
        Some(state.identity.authenticate(&parts.headers).await?)
    } else {
        None
    };
    let caller_id = caller.as_ref().map(|c| c.id.as_str());

    if let Some(limit) = route.rate_limit {
        let key = rate_limit_key(caller_id, &route.path);
        let decision = state
            .limiter
            .hit(&key, limit, Utc::now())
            .map_err(ApiError::RateLimiter)?;
        if !decision.is_allowed() {
            return Err(ApiError::RateLimited);
        }
        debug!(%key, ?decision, "rate limit window advanced");
    }

    let body = to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| ApiError::InvalidBody(e.to_string()))?;
    let inbound = InboundRequest {
        method: parts.method,
        path,
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    };
    let method = inbound.method.clone();
    let response = state.forwarder.forward(route, inbound).await?;
    info!(
        %method,
        route = %route.path,
        target = %route.target,
        caller = caller_id.unwrap_or("anonymous"),
        status = response.status().as_u16(),
        "request forwarded"
    );
    Ok(response)
}

fn status_page(routes: &RouteTable) -> Response {
    with_cors(
        Json(json!({
            "status": "healthy",
            "version": API_VERSION,
            "timestamp": Utc::now().to_rfc3339(),
            "routes": routes.summaries(),
        }))
        .into_response(),
    )
}

// Duplicate prefixes keep the first declaration per method.
pub(crate) fn openapi_document(routes: &RouteTable) -> Value {
    let mut paths = Map::new();
    for route in routes.routes() {
        let item = paths
            .entry(route.path.clone())
            .or_insert_with(|| json!({}));
        let Some(item) = item.as_object_mut() else {
            continue;
        };
        for method in &route.methods {
            let key = method.to_ascii_lowercase();
            if item.contains_key(&key) {
                continue;
            }
            let mut responses = Map::new();
            responses.insert("200".to_string(), json!({"description": "Downstream response"}));
            responses.insert("404".to_string(), json!({"description": "Route not found"}));
            responses.insert("502".to_string(), json!({"description": "Gateway error"}));
            if route.require_auth {
                responses.insert("401".to_string(), json!({"description": "Unauthorized"}));
            }
            if route.rate_limit.is_some() {
                responses.insert("429".to_string(), json!({"description": "Rate limit exceeded"}));
            }
            let mut operation = json!({
                "summary": route.description,
                "responses": responses,
            });
            if route.require_auth {
                operation["security"] = json!([{"bearerAuth": []}]);
            }
            if let Some(limit) = route.rate_limit {
                operation["x-rate-limit-per-minute"] = json!(limit);
            }
            item.insert(key, operation);
        }
    }

    json!({
        "openapi": "3.0.0",
        "info": {
            "title": "Agency Gateway",
            "version": API_VERSION,
        },
        "paths": paths,
        "components": {
            "securitySchemes": {
                "bearerAuth": {"type": "http", "scheme": "bearer"}
            }
        }
    })
}
