use std::env;

use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage:
  agency-gateway serve --config <path>
  agency-gateway audit verify --path <jsonl> [--mirror <path>]";

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("serve") => serve(&args[1..]).await,
        Some("audit") if args.get(1).map(String::as_str) == Some("verify") => {
            verify_audit(&args[2..])
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

async fn serve(args: &[String]) {
    let config_path =
        flag_value(args, "--config").unwrap_or_else(|| "./config/example-config.yaml".to_string());

    let cfg = match gateway_config::load_and_validate(&config_path) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(&cfg.server.log_level);
    info!(config = %config_path, routes = cfg.routes.len(), "config loaded");

    tokio::select! {
        result = gateway_server::serve(cfg) => {
            if let Err(e) = result {
                error!(error = %e, "server exited with error");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }
}

fn verify_audit(args: &[String]) {
    let Some(path) = flag_value(args, "--path") else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    let mirror = flag_value(args, "--mirror");
    match gateway_server::verify_audit_chain_with_mirror(&path, mirror.as_deref()) {
        Ok(summary) => println!("{summary}"),
        Err(e) => {
            eprintln!("audit verification failed: {e}");
            std::process::exit(1);
        }
    }
}

// RUST_LOG wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
