use gateway_contracts::{ActionType, Role};
use thiserror::Error;

pub const PERMISSIONS: [(ActionType, Role); 8] = [
    (ActionType::SearchData, Role::BasicClient),
    (ActionType::GetInsights, Role::PremiumClient),
    (ActionType::GenerateReport, Role::Employee),
    (ActionType::CreateTask, Role::Employee),
    (ActionType::ScheduleFollowup, Role::Employee),
    (ActionType::AnalyzePerformance, Role::Employee),
    (ActionType::SendNotification, Role::TeamManager),
    (ActionType::UpdateCampaign, Role::TeamManager),
];

pub const APPROVAL_REQUIRED: [ActionType; 2] =
    [ActionType::SendNotification, ActionType::UpdateCampaign];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorizeError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("This action requires {} role or higher", .required.display_name())]
    PermissionDenied { required: Role },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Park,
    Dispatch,
}

pub fn required_role(action: ActionType) -> Role {
    PERMISSIONS
        .iter()
        .find(|(a, _)| *a == action)
        .map(|(_, role)| *role)
        .unwrap_or(Role::SuperAdmin)
}

pub fn requires_approval(action: ActionType) -> bool {
    APPROVAL_REQUIRED.contains(&action)
}

// Lower index is more privileged.
pub fn authorize(role: Role, action: &str) -> Result<ActionType, AuthorizeError> {
    let action_type =
        ActionType::parse(action).ok_or_else(|| AuthorizeError::UnknownAction(action.to_string()))?;
    let required = required_role(action_type);
    if role.index() <= required.index() {
        Ok(action_type)
    } else {
        Err(AuthorizeError::PermissionDenied { required })
    }
}

pub fn approval_gate(action: ActionType, skip_approval: bool) -> GateOutcome {
    if requires_approval(action) && !skip_approval {
        GateOutcome::Park
    } else {
        GateOutcome::Dispatch
    }
}
