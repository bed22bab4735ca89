use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use gateway_config::Config;
use gateway_contracts::RouteDefinition;
use gateway_kernel::{MemoryWindowCounter, RouteTable, WindowCounter};
use tokio::sync::Mutex;
use tracing::{info, warn};

mod actions;
mod audit;
mod error;
mod forward;
mod gateway;
mod handlers;
mod identity;
mod rate_limit;
pub mod store;

pub use audit::{verify_audit_chain, verify_audit_chain_with_mirror};
pub use error::ApiError;
pub use identity::AuthError;

use audit::AuditJsonl;
use forward::Forwarder;
use handlers::HandlerRegistry;
use identity::IdentityValidator;
use rate_limit::SqliteWindowCounter;
use store::Store;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let state = AppState::new(cfg).await?;
    spawn_window_pruner(state.limiter.clone());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    info!(%addr, "agency gateway listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

pub async fn build_app(cfg: Config) -> Result<Router, String> {
    Ok(router(AppState::new(cfg).await?))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/agent-actions",
            post(actions::invoke).options(gateway::preflight),
        )
        .route(
            "/v1/agent-actions/{id}",
            get(actions::get_action).options(gateway::preflight),
        )
        .method_not_allowed_fallback(gateway::method_not_allowed)
        .fallback(gateway::gateway)
        .with_state(state)
}

#[derive(Clone)]
pub(crate) struct AppState {
    routes: RouteTable,
    limiter: Arc<dyn WindowCounter>,
    identity: Arc<IdentityValidator>,
    forwarder: Arc<Forwarder>,
    store: Arc<Mutex<Store>>,
    audit: Arc<AuditJsonl>,
    handlers: Arc<HandlerRegistry>,
    max_body_bytes: usize,
}

impl AppState {
    async fn new(cfg: Config) -> Result<Self, String> {
        gateway_config::validate_runtime_support(&cfg).map_err(|e| e.to_string())?;

        let limiter: Arc<dyn WindowCounter> = if cfg.rate_limit.backend == "sqlite" {
            let sqlite_path = cfg
                .store
                .sqlite_path
                .as_deref()
                .ok_or_else(|| "store.sqlite_path is required for sqlite rate limiting".to_string())?;
            Arc::new(SqliteWindowCounter::new(sqlite_path)?)
        } else {
            Arc::new(MemoryWindowCounter::new())
        };

        let routes = cfg
            .routes
            .iter()
            .map(|r| RouteDefinition {
                path: r.path.clone(),
                methods: r.methods.clone(),
                require_auth: r.require_auth,
                rate_limit: r.rate_limit,
                target: r.target.clone(),
                description: r.description.clone(),
            })
            .collect();

        Ok(Self {
            routes: RouteTable::new(routes),
            limiter,
            identity: Arc::new(IdentityValidator::new(&cfg)?),
            forwarder: Arc::new(Forwarder::new(&cfg)?),
            store: Arc::new(Mutex::new(Store::open(
                &cfg.store.kind,
                cfg.store.sqlite_path.as_deref(),
            )?)),
            audit: Arc::new(
                AuditJsonl::new(
                    &cfg.audit.jsonl_path,
                    cfg.audit.immutable_mirror_path.as_deref(),
                )
                .await?,
            ),
            handlers: Arc::new(HandlerRegistry::with_defaults()),
            max_body_bytes: cfg.forwarding.max_body_bytes,
        })
    }
}

fn spawn_window_pruner(limiter: Arc<dyn WindowCounter>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            match limiter.prune_expired(Utc::now()) {
                Ok(0) => {}
                Ok(n) => tracing::debug!(pruned = n, "expired rate-limit windows removed"),
                Err(e) => warn!(error = %e, "rate-limit window pruning failed"),
            }
        }
    });
}
