use std::collections::HashMap;
use std::time::Duration;

use axum::http::{header, HeaderMap};
use gateway_config::Config;
use gateway_contracts::{CallerIdentity, Role};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing or invalid authorization header")]
    MissingHeader,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Identity provider unavailable")]
    ProviderUnavailable(String),
}

pub(crate) enum IdentityValidator {
    Static(HashMap<String, CallerIdentity>),
    Remote { endpoint: String, client: Client },
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: String,
    role: String,
}

impl IdentityValidator {
    pub(crate) fn new(cfg: &Config) -> Result<Self, String> {
        match cfg.identity.mode.as_str() {
            "static" => {
                let mut tokens = HashMap::new();
                for entry in &cfg.identity.tokens {
                    let role = entry.role.parse::<Role>()?;
                    tokens.insert(
                        entry.token.clone(),
                        CallerIdentity {
                            id: entry.id.clone(),
                            role,
                        },
                    );
                }
                Ok(Self::Static(tokens))
            }
            "remote" => {
                let endpoint = cfg
                    .identity
                    .endpoint
                    .clone()
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| "identity.endpoint is required for remote mode".to_string())?;
                let client = Client::builder()
                    .timeout(Duration::from_millis(cfg.identity.timeout_ms))
                    .build()
                    .map_err(|e| e.to_string())?;
                Ok(Self::Remote { endpoint, client })
            }
            other => Err(format!("identity.mode={other} is not supported")),
        }
    }

    pub(crate) async fn authenticate(&self, headers: &HeaderMap) -> Result<CallerIdentity, AuthError> {
        let token = bearer_token(headers)?;
        match self {
            Self::Static(tokens) => tokens.get(token).cloned().ok_or(AuthError::InvalidToken),
            Self::Remote { endpoint, client } => {
                let response = client
                    .get(endpoint)
                    .bearer_auth(token)
                    .send()
                    .await
                    .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;
                if response.status().is_server_error() {
                    return Err(AuthError::ProviderUnavailable(format!(
                        "identity provider returned {}",
                        response.status()
                    )));
                }
                if !response.status().is_success() {
                    return Err(AuthError::InvalidToken);
                }
                let user: ProviderUser =
                    response.json().await.map_err(|_| AuthError::InvalidToken)?;
                let role = user.role.parse::<Role>().map_err(|_| AuthError::InvalidToken)?;
                Ok(CallerIdentity { id: user.id, role })
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingHeader)?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::MissingHeader)?;
    if token.is_empty() {
        return Err(AuthError::MissingHeader);
    }
    Ok(token)
}
