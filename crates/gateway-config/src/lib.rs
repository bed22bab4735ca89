use gateway_contracts::Role;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

const KNOWN_METHODS: [&str; 7] = ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Server,
    pub store: Store,
    pub identity: Identity,
    #[serde(default)]
    pub rate_limit: RateLimit,
    pub forwarding: Forwarding,
    pub routes: Vec<Route>,
    pub audit: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    #[serde(rename = "type")]
    pub kind: String,
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticToken {
    pub token: String,
    pub id: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub mode: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_identity_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub tokens: Vec<StaticToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimit {
    #[serde(default = "default_rate_limit_backend")]
    pub backend: String,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            backend: default_rate_limit_backend(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forwarding {
    #[serde(default = "default_forward_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    pub targets: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub path: String,
    pub methods: Vec<String>,
    pub require_auth: bool,
    #[serde(default)]
    pub rate_limit: Option<u32>,
    pub target: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audit {
    pub jsonl_path: String,
    #[serde(default)]
    pub immutable_mirror_path: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_identity_timeout_ms() -> u64 {
    3_000
}

fn default_rate_limit_backend() -> String {
    "memory".to_string()
}

fn default_forward_timeout_ms() -> u64 {
    10_000
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let mut cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    normalize(&mut cfg);
    validate_runtime_support(&cfg)?;
    Ok(cfg)
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/config.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/config.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "config schema not found at config/config.schema.json or workspace config path"
                .to_string(),
        )
    })?;

    let schema_text =
        std::fs::read_to_string(schema_path).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&schema_text).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

fn normalize(cfg: &mut Config) {
    for route in &mut cfg.routes {
        for method in &mut route.methods {
            *method = method.to_ascii_uppercase();
        }
    }
}

pub fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.store.kind != "memory" && cfg.store.kind != "sqlite" {
        return Err(ConfigError::UnsupportedConfig(format!(
            "store.type={} is not implemented; supported: memory, sqlite",
            cfg.store.kind
        )));
    }
    if cfg.store.kind == "memory" && cfg.store.sqlite_path.is_some() {
        return Err(ConfigError::UnsupportedConfig(
            "store.sqlite_path is not supported when store.type=memory".to_string(),
        ));
    }
    if cfg.store.kind == "sqlite"
        && cfg
            .store
            .sqlite_path
            .as_ref()
            .map(|v| v.trim().is_empty())
            .unwrap_or(true)
    {
        return Err(ConfigError::UnsupportedConfig(
            "store.sqlite_path is required when store.type=sqlite".to_string(),
        ));
    }

    match cfg.identity.mode.as_str() {
        "static" => {
            if cfg.identity.tokens.is_empty() {
                return Err(ConfigError::UnsupportedConfig(
                    "identity.tokens must not be empty when identity.mode=static".to_string(),
                ));
            }
            for token in &cfg.identity.tokens {
                if token.role.parse::<Role>().is_err() {
                    return Err(ConfigError::UnsupportedConfig(format!(
                        "identity.tokens[{}].role={} is not a known role",
                        token.id, token.role
                    )));
                }
            }
        }
        "remote" => {
            if cfg
                .identity
                .endpoint
                .as_ref()
                .map(|v| v.trim().is_empty())
                .unwrap_or(true)
            {
                return Err(ConfigError::UnsupportedConfig(
                    "identity.endpoint is required when identity.mode=remote".to_string(),
                ));
            }
        }
        other => {
            return Err(ConfigError::UnsupportedConfig(format!(
                "identity.mode={other} is not implemented; supported: static, remote"
            )));
        }
    }
    if cfg.identity.timeout_ms == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "identity.timeout_ms must be >= 1".to_string(),
        ));
    }

    if cfg.rate_limit.backend != "memory" && cfg.rate_limit.backend != "sqlite" {
        return Err(ConfigError::UnsupportedConfig(format!(
            "rate_limit.backend={} is not implemented; supported: memory, sqlite",
            cfg.rate_limit.backend
        )));
    }
    if cfg.rate_limit.backend == "sqlite" && cfg.store.kind != "sqlite" {
        return Err(ConfigError::UnsupportedConfig(
            "rate_limit.backend=sqlite requires store.type=sqlite".to_string(),
        ));
    }

    if cfg.forwarding.timeout_ms == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "forwarding.timeout_ms must be >= 1".to_string(),
        ));
    }

    if cfg.routes.is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "routes must declare at least one route".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for route in &cfg.routes {
        if !route.path.starts_with('/') {
            return Err(ConfigError::UnsupportedConfig(format!(
                "route path {} must start with '/'",
                route.path
            )));
        }
        if route.methods.is_empty() {
            return Err(ConfigError::UnsupportedConfig(format!(
                "route {} must allow at least one method",
                route.path
            )));
        }
        if let Some(method) = route
            .methods
            .iter()
            .find(|m| !KNOWN_METHODS.contains(&m.as_str()))
        {
            return Err(ConfigError::UnsupportedConfig(format!(
                "route {} declares unsupported method {method}",
                route.path
            )));
        }
        if let Some(method) = route
            .methods
            .iter()
            .find(|m| !seen.insert((route.path.as_str(), m.as_str())))
        {
            return Err(ConfigError::UnsupportedConfig(format!(
                "route {method} {} is declared twice",
                route.path
            )));
        }
        if route.rate_limit == Some(0) {
            return Err(ConfigError::UnsupportedConfig(format!(
                "route {} rate_limit must be >= 1",
                route.path
            )));
        }
        if !cfg.forwarding.targets.contains_key(&route.target) {
            return Err(ConfigError::UnsupportedConfig(format!(
                "route {} targets unknown handler {}",
                route.path, route.target
            )));
        }
    }
    Ok(())
}
