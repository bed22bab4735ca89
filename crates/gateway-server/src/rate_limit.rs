use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use gateway_kernel::{advance_window, parse_rfc3339, RateDecision, Window, WindowCounter};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

pub(crate) struct SqliteWindowCounter {
    conn: Mutex<Connection>,
}

impl SqliteWindowCounter {
    pub(crate) fn new(path: &str) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| e.to_string())?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS rate_limit_windows (
                window_key TEXT PRIMARY KEY,
                count INTEGER NOT NULL,
                reset_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| e.to_string())?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl WindowCounter for SqliteWindowCounter {
    fn hit(&self, key: &str, limit: u32, now: DateTime<Utc>) -> Result<RateDecision, String> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| "rate limit connection poisoned".to_string())?;
        // IMMEDIATE takes the write lock up front so concurrent processes
        // serialize on the read-modify-write.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| e.to_string())?;

        let current = tx
            .query_row(
                "SELECT count, reset_at FROM rate_limit_windows WHERE window_key = ?1",
                params![key],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(|e| e.to_string())?
            .and_then(|(count, reset_at)| {
                parse_rfc3339(&reset_at).map(|reset_at| Window {
                    count: count.max(0) as u32,
                    reset_at,
                })
            });

        let (next, decision) = advance_window(current, limit, now);
        if Some(next) != current {
            tx.execute(
                "
                INSERT INTO rate_limit_windows(window_key, count, reset_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(window_key) DO UPDATE SET
                    count=excluded.count,
                    reset_at=excluded.reset_at
                ",
                params![key, next.count as i64, sortable_ts(next.reset_at)],
            )
            .map_err(|e| e.to_string())?;
        }
        tx.commit().map_err(|e| e.to_string())?;
        Ok(decision)
    }

    fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize, String> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| "rate limit connection poisoned".to_string())?;
        conn.execute(
            "DELETE FROM rate_limit_windows WHERE reset_at <= ?1",
            params![sortable_ts(now)],
        )
        .map_err(|e| e.to_string())
    }
}

// Fixed-width UTC timestamps, so text order in sqlite is time order.
fn sortable_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
