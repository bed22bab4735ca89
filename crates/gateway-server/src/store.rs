use std::collections::BTreeMap;

use gateway_contracts::{ActionStatus, AgentAction};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub struct Store {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub id: String,
    pub client_id: String,
    pub name: String,
    pub platform: String,
    pub status: String,
    pub budget: f64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignMetric {
    pub campaign_id: String,
    pub day: String,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: f64,
    pub conversions: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub client_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: String,
    pub status: String,
    pub task_type: String,
    pub due_date: Option<String>,
    pub assigned_to: Option<String>,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub client_id: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    pub id: String,
    pub client_id: String,
    pub category: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub id: String,
    pub client_id: String,
    pub title: String,
    pub report_type: String,
    pub data: Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryEntry {
    pub id: String,
    pub agent_id: Option<String>,
    pub client_id: String,
    pub memory_type: String,
    pub content: Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricTotals {
    pub campaigns: i64,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: f64,
    pub conversions: i64,
    pub revenue: f64,
}

const SEARCH_LIMIT: i64 = 25;

impl Store {
    pub fn open(kind: &str, sqlite_path: Option<&str>) -> Result<Self, String> {
        let conn = match (kind, sqlite_path) {
            ("sqlite", Some(path)) => Connection::open(path).map_err(|e| e.to_string())?,
            ("sqlite", None) => {
                return Err("store.sqlite_path is required for sqlite store".to_string())
            }
            _ => Connection::open_in_memory().map_err(|e| e.to_string())?,
        };
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, String> {
        Self::open("memory", None)
    }

    fn with_connection(conn: Connection) -> Result<Self, String> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                name TEXT NOT NULL,
                platform TEXT NOT NULL,
                status TEXT NOT NULL,
                budget REAL NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS campaign_metrics (
                campaign_id TEXT NOT NULL,
                day TEXT NOT NULL,
                impressions INTEGER NOT NULL,
                clicks INTEGER NOT NULL,
                spend REAL NOT NULL,
                conversions INTEGER NOT NULL,
                revenue REAL NOT NULL,
                PRIMARY KEY (campaign_id, day)
            );
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                priority TEXT NOT NULL,
                status TEXT NOT NULL,
                task_type TEXT NOT NULL,
                due_date TEXT,
                assigned_to TEXT,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS insights (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                category TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                title TEXT NOT NULL,
                report_type TEXT NOT NULL,
                data_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS agent_actions (
                id TEXT PRIMARY KEY,
                agent_id TEXT,
                client_id TEXT NOT NULL,
                action_type TEXT NOT NULL,
                action_data_json TEXT NOT NULL,
                requested_by TEXT NOT NULL,
                status TEXT NOT NULL,
                result_json TEXT,
                created_at TEXT NOT NULL,
                executed_at TEXT
            );
            CREATE TABLE IF NOT EXISTS agent_memory (
                id TEXT PRIMARY KEY,
                agent_id TEXT,
                client_id TEXT NOT NULL,
                memory_type TEXT NOT NULL,
                content_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| e.to_string())?;
        Ok(Self { conn })
    }

    pub fn save_campaign(&mut self, c: &Campaign) -> Result<(), String> {
        self.conn
            .execute(
                "
                INSERT INTO campaigns (id, client_id, name, platform, status, budget, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    name=excluded.name,
                    platform=excluded.platform,
                    status=excluded.status,
                    budget=excluded.budget,
                    updated_at=excluded.updated_at
                ",
                params![
                    c.id,
                    c.client_id,
                    c.name,
                    c.platform,
                    c.status,
                    c.budget,
                    c.updated_at
                ],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn get_campaign(&self, id: &str) -> Result<Option<Campaign>, String> {
        self.conn
            .query_row(
                "SELECT id, client_id, name, platform, status, budget, updated_at FROM campaigns WHERE id = ?1",
                params![id],
                campaign_from_row,
            )
            .optional()
            .map_err(|e| e.to_string())
    }

    pub fn search_campaigns(&self, client_id: &str, query: &str) -> Result<Vec<Campaign>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, client_id, name, platform, status, budget, updated_at
                FROM campaigns
                WHERE client_id = ?1
                  AND (name LIKE ?2 ESCAPE '\\' OR platform LIKE ?2 ESCAPE '\\' OR status LIKE ?2 ESCAPE '\\')
                ORDER BY name
                LIMIT ?3
                ",
            )
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![client_id, like_pattern(query), SEARCH_LIMIT], campaign_from_row)
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }

    pub fn save_metric(&mut self, m: &CampaignMetric) -> Result<(), String> {
        self.conn
            .execute(
                "
                INSERT OR REPLACE INTO campaign_metrics
                (campaign_id, day, impressions, clicks, spend, conversions, revenue)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
                params![
                    m.campaign_id,
                    m.day,
                    m.impressions,
                    m.clicks,
                    m.spend,
                    m.conversions,
                    m.revenue
                ],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    // since_day is YYYY-MM-DD, inclusive.
    pub fn metric_totals(
        &self,
        client_id: &str,
        campaign_id: Option<&str>,
        since_day: Option<&str>,
    ) -> Result<MetricTotals, String> {
        self.conn
            .query_row(
                "
                SELECT
                    COUNT(DISTINCT c.id),
                    COALESCE(SUM(m.impressions), 0),
                    COALESCE(SUM(m.clicks), 0),
                    COALESCE(SUM(m.spend), 0.0),
                    COALESCE(SUM(m.conversions), 0),
                    COALESCE(SUM(m.revenue), 0.0)
                FROM campaigns c
                LEFT JOIN campaign_metrics m
                    ON m.campaign_id = c.id AND (?3 IS NULL OR m.day >= ?3)
                WHERE c.client_id = ?1 AND (?2 IS NULL OR c.id = ?2)
                ",
                params![client_id, campaign_id, since_day],
                |row| {
                    Ok(MetricTotals {
                        campaigns: row.get(0)?,
                        impressions: row.get(1)?,
                        clicks: row.get(2)?,
                        spend: row.get(3)?,
                        conversions: row.get(4)?,
                        revenue: row.get(5)?,
                    })
                },
            )
            .map_err(|e| e.to_string())
    }

    pub fn insert_task(&mut self, t: &Task) -> Result<(), String> {
        self.conn
            .execute(
                "
                INSERT INTO tasks
                (id, client_id, title, description, priority, status, task_type, due_date, assigned_to, created_by, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ",
                params![
                    t.id,
                    t.client_id,
                    t.title,
                    t.description,
                    t.priority,
                    t.status,
                    t.task_type,
                    t.due_date,
                    t.assigned_to,
                    t.created_by,
                    t.created_at
                ],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>, String> {
        self.conn
            .query_row(
                "
                SELECT id, client_id, title, description, priority, status, task_type, due_date, assigned_to, created_by, created_at
                FROM tasks WHERE id = ?1
                ",
                params![id],
                task_from_row,
            )
            .optional()
            .map_err(|e| e.to_string())
    }

    pub fn search_tasks(&self, client_id: &str, query: &str) -> Result<Vec<Task>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, client_id, title, description, priority, status, task_type, due_date, assigned_to, created_by, created_at
                FROM tasks
                WHERE client_id = ?1 AND (title LIKE ?2 ESCAPE '\\' OR description LIKE ?2 ESCAPE '\\')
                ORDER BY created_at DESC
                LIMIT ?3
                ",
            )
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![client_id, like_pattern(query), SEARCH_LIMIT], task_from_row)
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }

    pub fn task_status_counts(&self, client_id: &str) -> Result<BTreeMap<String, i64>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM tasks WHERE client_id = ?1 GROUP BY status")
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![client_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<BTreeMap<_, _>, _>>()
            .map_err(|e| e.to_string())
    }

    pub fn insert_notification(&mut self, n: &Notification) -> Result<(), String> {
        self.conn
            .execute(
                "
                INSERT INTO notifications (id, user_id, client_id, title, message, kind, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
                params![
                    n.id,
                    n.user_id,
                    n.client_id,
                    n.title,
                    n.message,
                    n.kind,
                    n.created_at
                ],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn count_notifications(&self, client_id: &str) -> Result<i64, String> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM notifications WHERE client_id = ?1",
                params![client_id],
                |row| row.get(0),
            )
            .map_err(|e| e.to_string())
    }

    pub fn insert_insight(&mut self, i: &Insight) -> Result<(), String> {
        self.conn
            .execute(
                "
                INSERT INTO insights (id, client_id, category, content, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![i.id, i.client_id, i.category, i.content, i.created_at],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn latest_insights(
        &self,
        client_id: &str,
        category: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Insight>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, client_id, category, content, created_at
                FROM insights
                WHERE client_id = ?1 AND (?2 IS NULL OR category = ?2)
                ORDER BY created_at DESC
                LIMIT ?3
                ",
            )
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![client_id, category, limit], |row| {
                Ok(Insight {
                    id: row.get(0)?,
                    client_id: row.get(1)?,
                    category: row.get(2)?,
                    content: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }

    pub fn insert_report(&mut self, r: &Report) -> Result<(), String> {
        let data = serde_json::to_string(&r.data).map_err(|e| e.to_string())?;
        self.conn
            .execute(
                "
                INSERT INTO reports (id, client_id, title, report_type, data_json, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
                params![r.id, r.client_id, r.title, r.report_type, data, r.created_at],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn get_report(&self, id: &str) -> Result<Option<Report>, String> {
        let row = self
            .conn
            .query_row(
                "
                SELECT id, client_id, title, report_type, data_json, created_at
                FROM reports WHERE id = ?1
                ",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| e.to_string())?;
        row.map(|(id, client_id, title, report_type, data_json, created_at)| {
            Ok(Report {
                id,
                client_id,
                title,
                report_type,
                data: serde_json::from_str(&data_json).map_err(|e| e.to_string())?,
                created_at,
            })
        })
        .transpose()
    }

    pub fn insert_agent_action(&mut self, a: &AgentAction) -> Result<(), String> {
        let action_data = serde_json::to_string(&a.action_data).map_err(|e| e.to_string())?;
        let result = a
            .result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| e.to_string())?;
        self.conn
            .execute(
                "
                INSERT INTO agent_actions
                (id, agent_id, client_id, action_type, action_data_json, requested_by, status, result_json, created_at, executed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ",
                params![
                    a.id,
                    a.agent_id,
                    a.client_id,
                    a.action_type,
                    action_data,
                    a.requested_by,
                    a.status.as_str(),
                    result,
                    a.created_at,
                    a.executed_at
                ],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn get_agent_action(&self, id: &str) -> Result<Option<AgentAction>, String> {
        let row = self
            .conn
            .query_row(
                "
                SELECT id, agent_id, client_id, action_type, action_data_json, requested_by, status, result_json, created_at, executed_at
                FROM agent_actions WHERE id = ?1
                ",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, Option<String>>(9)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| e.to_string())?;

        let Some((
            id,
            agent_id,
            client_id,
            action_type,
            action_data,
            requested_by,
            status,
            result,
            created_at,
            executed_at,
        )) = row
        else {
            return Ok(None);
        };
        Ok(Some(AgentAction {
            id,
            agent_id,
            client_id,
            action_type,
            action_data: serde_json::from_str(&action_data).map_err(|e| e.to_string())?,
            requested_by,
            status: status.parse::<ActionStatus>()?,
            result: result
                .map(|v| serde_json::from_str(&v))
                .transpose()
                .map_err(|e| e.to_string())?,
            created_at,
            executed_at,
        }))
    }

    pub fn count_agent_actions(&self, client_id: &str) -> Result<i64, String> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM agent_actions WHERE client_id = ?1",
                params![client_id],
                |row| row.get(0),
            )
            .map_err(|e| e.to_string())
    }

    pub fn insert_memory(&mut self, m: &MemoryEntry) -> Result<(), String> {
        let content = serde_json::to_string(&m.content).map_err(|e| e.to_string())?;
        self.conn
            .execute(
                "
                INSERT INTO agent_memory (id, agent_id, client_id, memory_type, content_json, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
                params![m.id, m.agent_id, m.client_id, m.memory_type, content, m.created_at],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    pub fn memories(&self, client_id: &str, memory_type: &str) -> Result<Vec<MemoryEntry>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, agent_id, client_id, memory_type, content_json, created_at
                FROM agent_memory
                WHERE client_id = ?1 AND memory_type = ?2
                ORDER BY created_at
                ",
            )
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![client_id, memory_type], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| e.to_string())?;
        let mut out = Vec::new();
        for row in rows {
            let (id, agent_id, client_id, memory_type, content, created_at) =
                row.map_err(|e| e.to_string())?;
            out.push(MemoryEntry {
                id,
                agent_id,
                client_id,
                memory_type,
                content: serde_json::from_str(&content).map_err(|e| e.to_string())?,
                created_at,
            });
        }
        Ok(out)
    }
}

fn campaign_from_row(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: row.get(0)?,
        client_id: row.get(1)?,
        name: row.get(2)?,
        platform: row.get(3)?,
        status: row.get(4)?,
        budget: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        client_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        priority: row.get(4)?,
        status: row.get(5)?,
        task_type: row.get(6)?,
        due_date: row.get(7)?,
        assigned_to: row.get(8)?,
        created_by: row.get(9)?,
        created_at: row.get(10)?,
    })
}

// Pairs with `ESCAPE '\'` in the query text.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn campaign(id: &str, client_id: &str) -> Campaign {
        Campaign {
            id: id.to_string(),
            client_id: client_id.to_string(),
            name: format!("Spring {id}"),
            platform: "google_ads".to_string(),
            status: "active".to_string(),
            budget: 1500.0,
            updated_at: "2026-02-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn agent_action_round_trips_with_null_result() {
        let mut store = Store::open_in_memory().unwrap();
        let action = AgentAction {
            id: "a1".to_string(),
            agent_id: Some("agent-7".to_string()),
            client_id: "c1".to_string(),
            action_type: "update_campaign".to_string(),
            action_data: json!({"campaign_id": "k1"}),
            requested_by: "u1".to_string(),
            status: ActionStatus::Pending,
            result: None,
            created_at: "2026-02-14T00:00:00Z".to_string(),
            executed_at: None,
        };
        store.insert_agent_action(&action).unwrap();
        assert_eq!(store.get_agent_action("a1").unwrap(), Some(action));
        assert_eq!(store.get_agent_action("missing").unwrap(), None);
    }

    #[test]
    fn metric_totals_respect_client_and_day_filters() {
        let mut store = Store::open_in_memory().unwrap();
        store.save_campaign(&campaign("k1", "c1")).unwrap();
        store.save_campaign(&campaign("k2", "c2")).unwrap();
        for (campaign_id, day, clicks) in [("k1", "2026-01-01", 10), ("k1", "2026-02-01", 20), ("k2", "2026-02-01", 99)] {
            store
                .save_metric(&CampaignMetric {
                    campaign_id: campaign_id.to_string(),
                    day: day.to_string(),
                    impressions: clicks * 10,
                    clicks,
                    spend: 5.0,
                    conversions: 1,
                    revenue: 20.0,
                })
                .unwrap();
        }
        let all = store.metric_totals("c1", None, None).unwrap();
        assert_eq!(all.campaigns, 1);
        assert_eq!(all.clicks, 30);
        let recent = store.metric_totals("c1", None, Some("2026-01-15")).unwrap();
        assert_eq!(recent.clicks, 20);
        assert_eq!(recent.spend, 5.0);
    }

    #[test]
    fn search_is_scoped_to_client() {
        let mut store = Store::open_in_memory().unwrap();
        store.save_campaign(&campaign("k1", "c1")).unwrap();
        store.save_campaign(&campaign("k2", "c2")).unwrap();
        let hits = store.search_campaigns("c1", "spring").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "k1");
    }

    #[test]
    fn search_treats_wildcards_literally() {
        let mut store = Store::open_in_memory().unwrap();
        let mut launch = campaign("k1", "c1");
        launch.name = "q3_launch".to_string();
        launch.platform = "meta_ads".to_string();
        store.save_campaign(&launch).unwrap();
        let mut lookalike = campaign("k2", "c1");
        lookalike.name = "q3xlaunch".to_string();
        store.save_campaign(&lookalike).unwrap();

        let hits = store.search_campaigns("c1", "q3_launch").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "k1");
        assert_eq!(store.search_campaigns("c1", "meta_ads").unwrap().len(), 1);
        assert!(store.search_campaigns("c1", "100%").unwrap().is_empty());
    }
}
