use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const API_VERSION: &str = "1.0.0";

// Most privileged first. Position in ALL is the hierarchy index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    AgencyManager,
    TeamManager,
    Employee,
    PremiumClient,
    BasicClient,
    Demo,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::SuperAdmin,
        Role::Admin,
        Role::AgencyManager,
        Role::TeamManager,
        Role::Employee,
        Role::PremiumClient,
        Role::BasicClient,
        Role::Demo,
    ];

    pub fn index(self) -> usize {
        Role::ALL
            .iter()
            .position(|r| *r == self)
            .unwrap_or(Role::ALL.len() - 1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::AgencyManager => "agency_manager",
            Role::TeamManager => "team_manager",
            Role::Employee => "employee",
            Role::PremiumClient => "premium_client",
            Role::BasicClient => "basic_client",
            Role::Demo => "demo",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Role::SuperAdmin => "Super Admin",
            Role::Admin => "Admin",
            Role::AgencyManager => "Agency Manager",
            Role::TeamManager => "Team Manager",
            Role::Employee => "Employee",
            Role::PremiumClient => "Premium Client",
            Role::BasicClient => "Basic Client",
            Role::Demo => "Demo",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role: {s}"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SearchData,
    GenerateReport,
    CreateTask,
    SendNotification,
    UpdateCampaign,
    ScheduleFollowup,
    AnalyzePerformance,
    GetInsights,
}

impl ActionType {
    pub const ALL: [ActionType; 8] = [
        ActionType::SearchData,
        ActionType::GenerateReport,
        ActionType::CreateTask,
        ActionType::SendNotification,
        ActionType::UpdateCampaign,
        ActionType::ScheduleFollowup,
        ActionType::AnalyzePerformance,
        ActionType::GetInsights,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::SearchData => "search_data",
            ActionType::GenerateReport => "generate_report",
            ActionType::CreateTask => "create_task",
            ActionType::SendNotification => "send_notification",
            ActionType::UpdateCampaign => "update_campaign",
            ActionType::ScheduleFollowup => "schedule_followup",
            ActionType::AnalyzePerformance => "analyze_performance",
            ActionType::GetInsights => "get_insights",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ActionType::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Approved => "approved",
            ActionStatus::Rejected => "rejected",
            ActionStatus::Executed => "executed",
        }
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "approved" => Ok(ActionStatus::Approved),
            "rejected" => Ok(ActionStatus::Rejected),
            "executed" => Ok(ActionStatus::Executed),
            other => Err(format!("unknown action status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallerIdentity {
    pub id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteDefinition {
    pub path: String,
    pub methods: Vec<String>,
    pub require_auth: bool,
    #[serde(default)]
    pub rate_limit: Option<u32>,
    pub target: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub path: String,
    pub methods: Vec<String>,
    pub description: String,
    pub require_auth: bool,
}

impl From<&RouteDefinition> for RouteSummary {
    fn from(route: &RouteDefinition) -> Self {
        Self {
            path: route.path.clone(),
            methods: route.methods.clone(),
            description: route.description.clone(),
            require_auth: route.require_auth,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InvokeActionRequest {
    pub action: String,
    pub client_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub skip_approval: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentAction {
    pub id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    pub client_id: String,
    pub action_type: String,
    pub action_data: Value,
    pub requested_by: String,
    pub status: ActionStatus,
    #[serde(default)]
    pub result: Option<Value>,
    pub created_at: String,
    #[serde(default)]
    pub executed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvokeActionResponse {
    PendingApproval {
        #[serde(rename = "actionId")]
        action_id: String,
        message: String,
    },
    Success {
        action: String,
        #[serde(rename = "actionId")]
        action_id: String,
        result: Value,
    },
}
