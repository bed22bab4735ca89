use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

pub const WINDOW_SECS: i64 = 60;

// Always the full window, not the time left in it.
pub const RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow { count: u32 },
    Deny { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow { .. })
    }
}

// The read-modify-write for one key must be atomic.
pub trait WindowCounter: Send + Sync {
    fn hit(&self, key: &str, limit: u32, now: DateTime<Utc>) -> Result<RateDecision, String>;

    fn prune_expired(&self, _now: DateTime<Utc>) -> Result<usize, String> {
        Ok(0)
    }
}

pub fn advance_window(
    current: Option<Window>,
    limit: u32,
    now: DateTime<Utc>,
) -> (Window, RateDecision) {
    match current {
        Some(window) if now < window.reset_at => {
            if window.count < limit {
                let next = Window {
                    count: window.count + 1,
                    reset_at: window.reset_at,
                };
                (next, RateDecision::Allow { count: next.count })
            } else {
                (
                    window,
                    RateDecision::Deny {
                        retry_after_secs: RETRY_AFTER_SECS,
                    },
                )
            }
        }
        _ => {
            let fresh = Window {
                count: 1,
                reset_at: now + Duration::seconds(WINDOW_SECS),
            };
            (fresh, RateDecision::Allow { count: 1 })
        }
    }
}

// Per process; several instances each keep their own map.
#[derive(Default)]
pub struct MemoryWindowCounter {
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryWindowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self, key: &str) -> Option<Window> {
        self.windows.lock().ok()?.get(key).copied()
    }
}

impl WindowCounter for MemoryWindowCounter {
    fn hit(&self, key: &str, limit: u32, now: DateTime<Utc>) -> Result<RateDecision, String> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| "rate limit state poisoned".to_string())?;
        let (next, decision) = advance_window(windows.get(key).copied(), limit, now);
        windows.insert(key.to_string(), next);
        Ok(decision)
    }

    fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize, String> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| "rate limit state poisoned".to_string())?;
        let before = windows.len();
        windows.retain(|_, w| now < w.reset_at);
        Ok(before - windows.len())
    }
}
