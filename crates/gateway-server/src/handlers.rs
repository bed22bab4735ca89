use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use gateway_contracts::ActionType;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::store::{Campaign, Insight, Notification, Report, Store, Task};

pub(crate) struct ActionContext<'a> {
    pub client_id: &'a str,
    pub caller_id: &'a str,
    pub params: &'a Value,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HandlerOutput {
    pub summary: String,
    pub data: Value,
}

impl HandlerOutput {
    fn new(summary: impl Into<String>, data: Value) -> Self {
        Self {
            summary: summary.into(),
            data,
        }
    }

    // {summary, ...data}
    pub(crate) fn into_result(self) -> Value {
        let mut out = Map::new();
        out.insert("summary".to_string(), Value::String(self.summary));
        match self.data {
            Value::Object(fields) => out.extend(fields),
            Value::Null => {}
            other => {
                out.insert("data".to_string(), other);
            }
        }
        Value::Object(out)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub(crate) enum HandlerError {
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("{0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("handler for {0} returned an empty summary")]
    EmptySummary(ActionType),
    #[error("no handler registered for {0}")]
    Unregistered(ActionType),
}

impl From<String> for HandlerError {
    fn from(err: String) -> Self {
        HandlerError::Store(err)
    }
}

pub(crate) trait ActionHandler: Send + Sync {
    fn action_type(&self) -> ActionType;
    fn execute(&self, store: &mut Store, ctx: &ActionContext<'_>)
        -> Result<HandlerOutput, HandlerError>;
}

pub(crate) struct HandlerRegistry {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub(crate) fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub(crate) fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(SearchData));
        registry.register(Arc::new(GenerateReport));
        registry.register(Arc::new(CreateTask));
        registry.register(Arc::new(SendNotification));
        registry.register(Arc::new(UpdateCampaign));
        registry.register(Arc::new(ScheduleFollowup));
        registry.register(Arc::new(AnalyzePerformance));
        registry.register(Arc::new(GetInsights));
        registry
    }

    pub(crate) fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler.action_type(), handler);
    }

    pub(crate) fn dispatch(
        &self,
        action: ActionType,
        store: &mut Store,
        ctx: &ActionContext<'_>,
    ) -> Result<HandlerOutput, HandlerError> {
        let handler = self
            .handlers
            .get(&action)
            .ok_or(HandlerError::Unregistered(action))?;
        let output = handler.execute(store, ctx)?;
        if output.summary.trim().is_empty() {
            return Err(HandlerError::EmptySummary(action));
        }
        Ok(output)
    }
}

struct SearchData;
struct GenerateReport;
struct CreateTask;
struct SendNotification;
struct UpdateCampaign;
struct ScheduleFollowup;
struct AnalyzePerformance;
struct GetInsights;

impl ActionHandler for SearchData {
    fn action_type(&self) -> ActionType {
        ActionType::SearchData
    }

    fn execute(&self, store: &mut Store, ctx: &ActionContext<'_>) -> Result<HandlerOutput, HandlerError> {
        let query = required_str(ctx.params, "query")?;
        let entity = optional_str(ctx.params, "entity").unwrap_or("all");
        let (tasks, campaigns) = match entity {
            "tasks" => (store.search_tasks(ctx.client_id, query)?, Vec::new()),
            "campaigns" => (Vec::new(), store.search_campaigns(ctx.client_id, query)?),
            "all" => (
                store.search_tasks(ctx.client_id, query)?,
                store.search_campaigns(ctx.client_id, query)?,
            ),
            other => {
                return Err(HandlerError::InvalidParams(format!(
                    "entity must be tasks, campaigns or all, got {other}"
                )))
            }
        };
        let total = tasks.len() + campaigns.len();
        Ok(HandlerOutput::new(
            format!("Found {total} records matching \"{query}\""),
            json!({
                "query": query,
                "total": total,
                "results": {"tasks": tasks, "campaigns": campaigns},
            }),
        ))
    }
}

impl ActionHandler for GenerateReport {
    fn action_type(&self) -> ActionType {
        ActionType::GenerateReport
    }

    fn execute(&self, store: &mut Store, ctx: &ActionContext<'_>) -> Result<HandlerOutput, HandlerError> {
        let report_type = optional_str(ctx.params, "report_type").unwrap_or("performance");
        let days = bounded_int(ctx.params, "period_days", 30, 1, 365)?;
        let since = (ctx.now - Duration::days(days)).date_naive().to_string();
        let metrics = store.metric_totals(ctx.client_id, None, Some(&since))?;
        let tasks = store.task_status_counts(ctx.client_id)?;
        let task_total: i64 = tasks.values().sum();

        let snapshot = json!({
            "period_days": days,
            "since": since,
            "metrics": metrics,
            "tasks_by_status": tasks,
        });
        let report = Report {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: ctx.client_id.to_string(),
            title: format!("{report_type} report, last {days} days"),
            report_type: report_type.to_string(),
            data: snapshot.clone(),
            created_at: ctx.now.to_rfc3339(),
        };
        store.insert_report(&report)?;

        Ok(HandlerOutput::new(
            format!(
                "Generated {report_type} report covering {days} days ({} campaigns, {task_total} tasks)",
                metrics.campaigns
            ),
            json!({"report_id": report.id, "report": snapshot}),
        ))
    }
}

impl ActionHandler for CreateTask {
    fn action_type(&self) -> ActionType {
        ActionType::CreateTask
    }

    fn execute(&self, store: &mut Store, ctx: &ActionContext<'_>) -> Result<HandlerOutput, HandlerError> {
        let title = required_str(ctx.params, "title")?;
        let priority = optional_str(ctx.params, "priority").unwrap_or("medium");
        if !matches!(priority, "low" | "medium" | "high" | "urgent") {
            return Err(HandlerError::InvalidParams(format!(
                "priority must be low, medium, high or urgent, got {priority}"
            )));
        }
        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: ctx.client_id.to_string(),
            title: title.to_string(),
            description: optional_str(ctx.params, "description").map(str::to_string),
            priority: priority.to_string(),
            status: "todo".to_string(),
            task_type: optional_str(ctx.params, "task_type")
                .unwrap_or("general")
                .to_string(),
            due_date: optional_str(ctx.params, "due_date").map(str::to_string),
            assigned_to: optional_str(ctx.params, "assigned_to").map(str::to_string),
            created_by: ctx.caller_id.to_string(),
            created_at: ctx.now.to_rfc3339(),
        };
        store.insert_task(&task)?;
        Ok(HandlerOutput::new(
            format!("Created task \"{}\"", task.title),
            json!({"task": task}),
        ))
    }
}

impl ActionHandler for SendNotification {
    fn action_type(&self) -> ActionType {
        ActionType::SendNotification
    }

    fn execute(&self, store: &mut Store, ctx: &ActionContext<'_>) -> Result<HandlerOutput, HandlerError> {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: optional_str(ctx.params, "user_id")
                .unwrap_or(ctx.caller_id)
                .to_string(),
            client_id: ctx.client_id.to_string(),
            title: required_str(ctx.params, "title")?.to_string(),
            message: required_str(ctx.params, "message")?.to_string(),
            kind: optional_str(ctx.params, "type").unwrap_or("info").to_string(),
            created_at: ctx.now.to_rfc3339(),
        };
        store.insert_notification(&notification)?;
        Ok(HandlerOutput::new(
            format!(
                "Queued notification \"{}\" for {}",
                notification.title, notification.user_id
            ),
            json!({"notification": notification}),
        ))
    }
}

impl ActionHandler for UpdateCampaign {
    fn action_type(&self) -> ActionType {
        ActionType::UpdateCampaign
    }

    fn execute(&self, store: &mut Store, ctx: &ActionContext<'_>) -> Result<HandlerOutput, HandlerError> {
        let campaign_id = required_str(ctx.params, "campaign_id")?;
        let mut campaign: Campaign = store
            .get_campaign(campaign_id)?
            .filter(|c| c.client_id == ctx.client_id)
            .ok_or_else(|| HandlerError::NotFound(format!("campaign {campaign_id} not found")))?;

        let mut changes = Vec::new();
        if let Some(status) = optional_str(ctx.params, "status") {
            if !matches!(status, "active" | "paused" | "completed" | "draft") {
                return Err(HandlerError::InvalidParams(format!(
                    "status must be active, paused, completed or draft, got {status}"
                )));
            }
            changes.push(format!("status {} -> {status}", campaign.status));
            campaign.status = status.to_string();
        }
        if let Some(budget) = ctx.params.get("budget").filter(|v| !v.is_null()) {
            let budget = budget
                .as_f64()
                .filter(|b| *b >= 0.0)
                .ok_or_else(|| HandlerError::InvalidParams("budget must be a non-negative number".to_string()))?;
            changes.push(format!("budget {} -> {budget}", campaign.budget));
            campaign.budget = budget;
        }
        if let Some(name) = optional_str(ctx.params, "name") {
            changes.push(format!("name {} -> {name}", campaign.name));
            campaign.name = name.to_string();
        }
        if changes.is_empty() {
            return Err(HandlerError::InvalidParams(
                "nothing to update: pass status, budget or name".to_string(),
            ));
        }
        campaign.updated_at = ctx.now.to_rfc3339();
        store.save_campaign(&campaign)?;

        Ok(HandlerOutput::new(
            format!("Updated campaign \"{}\": {}", campaign.name, changes.join(", ")),
            json!({"campaign": campaign, "changes": changes}),
        ))
    }
}

impl ActionHandler for ScheduleFollowup {
    fn action_type(&self) -> ActionType {
        ActionType::ScheduleFollowup
    }

    fn execute(&self, store: &mut Store, ctx: &ActionContext<'_>) -> Result<HandlerOutput, HandlerError> {
        let days = bounded_int(ctx.params, "days_from_now", 3, 0, 365)?;
        let due = (ctx.now + Duration::days(days)).date_naive().to_string();
        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: ctx.client_id.to_string(),
            title: optional_str(ctx.params, "title")
                .unwrap_or("Follow up with client")
                .to_string(),
            description: optional_str(ctx.params, "notes").map(str::to_string),
            priority: "medium".to_string(),
            status: "todo".to_string(),
            task_type: "follow_up".to_string(),
            due_date: Some(due.clone()),
            assigned_to: Some(
                optional_str(ctx.params, "assigned_to")
                    .unwrap_or(ctx.caller_id)
                    .to_string(),
            ),
            created_by: ctx.caller_id.to_string(),
            created_at: ctx.now.to_rfc3339(),
        };
        store.insert_task(&task)?;
        Ok(HandlerOutput::new(
            format!("Scheduled follow-up \"{}\" for {due}", task.title),
            json!({"task": task}),
        ))
    }
}

impl ActionHandler for AnalyzePerformance {
    fn action_type(&self) -> ActionType {
        ActionType::AnalyzePerformance
    }

    fn execute(&self, store: &mut Store, ctx: &ActionContext<'_>) -> Result<HandlerOutput, HandlerError> {
        let days = bounded_int(ctx.params, "period_days", 30, 1, 365)?;
        let since = (ctx.now - Duration::days(days)).date_naive().to_string();
        let campaign_id = optional_str(ctx.params, "campaign_id");
        let totals = store.metric_totals(ctx.client_id, campaign_id, Some(&since))?;

        let ctr = ratio(totals.clicks as f64 * 100.0, totals.impressions as f64);
        let cpc = ratio(totals.spend, totals.clicks as f64);
        let roas = ratio(totals.revenue, totals.spend);
        let conversion_rate = ratio(totals.conversions as f64 * 100.0, totals.clicks as f64);

        Ok(HandlerOutput::new(
            format!(
                "Analyzed {} campaigns over {days} days: CTR {ctr:.2}%, ROAS {roas:.2}",
                totals.campaigns
            ),
            json!({
                "period_days": days,
                "totals": totals,
                "ctr": ctr,
                "cpc": cpc,
                "roas": roas,
                "conversion_rate": conversion_rate,
            }),
        ))
    }
}

impl ActionHandler for GetInsights {
    fn action_type(&self) -> ActionType {
        ActionType::GetInsights
    }

    fn execute(&self, store: &mut Store, ctx: &ActionContext<'_>) -> Result<HandlerOutput, HandlerError> {
        let limit = bounded_int(ctx.params, "limit", 5, 1, 50)?;
        let category = optional_str(ctx.params, "category");
        let insights: Vec<Insight> = store.latest_insights(ctx.client_id, category, limit)?;
        let summary = match category {
            Some(c) => format!("Retrieved {} insights in {c}", insights.len()),
            None => format!("Retrieved {} insights", insights.len()),
        };
        Ok(HandlerOutput::new(summary, json!({"insights": insights})))
    }
}

fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, HandlerError> {
    optional_str(params, key)
        .ok_or_else(|| HandlerError::InvalidParams(format!("{key} is required")))
}

fn bounded_int(params: &Value, key: &str, default: i64, min: i64, max: i64) -> Result<i64, HandlerError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_i64()
            .filter(|n| (min..=max).contains(n))
            .ok_or_else(|| {
                HandlerError::InvalidParams(format!("{key} must be an integer in {min}..={max}"))
            }),
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
