pub mod authz;
pub mod rate_limit;
pub mod routes;

pub use authz::{
    approval_gate, authorize, requires_approval, required_role, AuthorizeError, GateOutcome,
    APPROVAL_REQUIRED, PERMISSIONS,
};
pub use rate_limit::{
    advance_window, MemoryWindowCounter, RateDecision, Window, WindowCounter, RETRY_AFTER_SECS,
    WINDOW_SECS,
};
pub use routes::{RouteNotFound, RouteTable};

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|v| v.with_timezone(&Utc))
}

pub fn jcs_sha256_hex(value: &Value) -> Result<String, String> {
    let canonical = serde_jcs::to_string(value)
        .map_err(|err| format!("failed to canonicalize JSON via JCS: {err}"))?;
    Ok(sha256_hex(canonical.as_bytes()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn rate_limit_key(caller_id: Option<&str>, route_path: &str) -> String {
    format!("{}:{route_path}", caller_id.unwrap_or("anonymous"))
}
