use chrono::Utc;
use gateway_kernel::sha256_hex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub(crate) struct AuditJsonl {
    file: Mutex<tokio::fs::File>,
    immutable_mirror: Option<Mutex<tokio::fs::File>>,
    last_hash: Mutex<Option<String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub(crate) struct AuditRecord {
    audit_id: String,
    caller_id: String,
    client_id: String,
    action: String,
    stage: String,
    result: String,
    reason: String,
    ts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    action_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prev_hash: Option<String>,
    record_hash: String,
}

impl AuditRecord {
    pub(crate) fn new(
        caller_id: &str,
        client_id: &str,
        action: &str,
        stage: &str,
        result: &str,
        reason: &str,
    ) -> Self {
        Self {
            audit_id: format!("audit_{}", uuid::Uuid::new_v4().as_simple()),
            caller_id: caller_id.to_string(),
            client_id: client_id.to_string(),
            action: action.to_string(),
            stage: stage.to_string(),
            result: result.to_string(),
            reason: reason.to_string(),
            ts: Utc::now().to_rfc3339(),
            action_id: None,
            payload_hash: None,
            prev_hash: None,
            record_hash: String::new(),
        }
    }

    pub(crate) fn with_action_id(mut self, action_id: &str) -> Self {
        self.action_id = Some(action_id.to_string());
        self
    }

    pub(crate) fn with_payload_hash(mut self, hash: Option<String>) -> Self {
        self.payload_hash = hash;
        self
    }
}

impl AuditJsonl {
    pub(crate) async fn new(path: &str, immutable_mirror_path: Option<&str>) -> Result<Self, String> {
        let last_hash = std::fs::read_to_string(path).ok().and_then(|text| {
            text.lines().rev().find_map(|line| {
                serde_json::from_str::<serde_json::Value>(line)
                    .ok()
                    .and_then(|v| {
                        v.get("record_hash")
                            .and_then(|hash| hash.as_str())
                            .map(|s| s.to_string())
                    })
            })
        });

        let file = open_append(path).await?;
        let immutable_mirror = match immutable_mirror_path {
            Some(path) if !path.is_empty() => Some(Mutex::new(open_append(path).await?)),
            _ => None,
        };

        Ok(Self {
            file: Mutex::new(file),
            immutable_mirror,
            last_hash: Mutex::new(last_hash),
        })
    }

    // The chain head advances once the primary write lands.
    pub(crate) async fn append(&self, mut rec: AuditRecord) -> Result<String, String> {
        let mut last_hash = self.last_hash.lock().await;
        rec.prev_hash = last_hash.clone();
        rec.record_hash.clear();
        let seed = serde_json::to_string(&rec).map_err(|e| e.to_string())?;
        rec.record_hash = sha256_hex(seed.as_bytes());
        let line = serde_json::to_string(&rec).map_err(|e| e.to_string())?;

        {
            let mut file = self.file.lock().await;
            write_line(&mut file, &line).await?;
        }
        *last_hash = Some(rec.record_hash.clone());

        if let Some(mirror) = &self.immutable_mirror {
            let mut mirror_file = mirror.lock().await;
            write_line(&mut mirror_file, &line)
                .await
                .map_err(|e| format!("immutable mirror write failed: {e}"))?;
        }
        Ok(rec.audit_id)
    }
}

async fn open_append(path: &str) -> Result<tokio::fs::File, String> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| format!("open audit file {path} failed: {e}"))
}

async fn write_line(file: &mut tokio::fs::File, line: &str) -> Result<(), String> {
    file.write_all(line.as_bytes())
        .await
        .map_err(|e| e.to_string())?;
    file.write_all(b"\n").await.map_err(|e| e.to_string())?;
    file.flush().await.map_err(|e| e.to_string())
}

pub fn verify_audit_chain(path: &str) -> Result<String, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let mut prev: Option<String> = None;
    let mut count = 0usize;

    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let rec: AuditRecord = serde_json::from_str(line)
            .map_err(|e| format!("line {} parse failed: {e}", idx + 1))?;
        if rec.prev_hash != prev {
            return Err(format!(
                "line {} prev_hash mismatch: expected {:?}, got {:?}",
                idx + 1,
                prev,
                rec.prev_hash
            ));
        }
        let mut seeded = rec.clone();
        seeded.record_hash.clear();
        let seed = serde_json::to_string(&seeded)
            .map_err(|e| format!("line {} hash seed serialize failed: {e}", idx + 1))?;
        let expected_hash = sha256_hex(seed.as_bytes());
        if rec.record_hash != expected_hash {
            return Err(format!(
                "line {} record_hash mismatch: expected {}, got {}",
                idx + 1,
                expected_hash,
                rec.record_hash
            ));
        }
        prev = Some(rec.record_hash);
        count += 1;
    }

    Ok(format!("audit chain verified: {count} records"))
}

pub fn verify_audit_chain_with_mirror(path: &str, mirror: Option<&str>) -> Result<String, String> {
    let summary = verify_audit_chain(path)?;
    if let Some(mirror_path) = mirror {
        let primary = std::fs::read(path).map_err(|e| e.to_string())?;
        let copy = std::fs::read(mirror_path).map_err(|e| e.to_string())?;
        if primary != copy {
            return Err(format!("mirror {mirror_path} diverges from {path}"));
        }
    }
    Ok(summary)
}
