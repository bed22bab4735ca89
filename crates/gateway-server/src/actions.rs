use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use gateway_contracts::{
    ActionStatus, ActionType, AgentAction, CallerIdentity, InvokeActionRequest, InvokeActionResponse,
    Role,
};
use gateway_kernel::{approval_gate, authorize, jcs_sha256_hex, AuthorizeError, GateOutcome};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::audit::AuditRecord;
use crate::error::{with_cors, ApiError};
use crate::handlers::ActionContext;
use crate::store::MemoryEntry;
use crate::AppState;

const PENDING_MESSAGE: &str = "Action requires approval and has been queued for review";
const ACTION_READER: Role = Role::Employee;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InvokeOutcome {
    Parked {
        action_id: String,
    },
    Executed {
        action: ActionType,
        action_id: String,
        result: Value,
    },
}

impl From<InvokeOutcome> for InvokeActionResponse {
    fn from(outcome: InvokeOutcome) -> Self {
        match outcome {
            InvokeOutcome::Parked { action_id } => InvokeActionResponse::PendingApproval {
                action_id,
                message: PENDING_MESSAGE.to_string(),
            },
            InvokeOutcome::Executed {
                action,
                action_id,
                result,
            } => InvokeActionResponse::Success {
                action: action.as_str().to_string(),
                action_id,
                result,
            },
        }
    }
}

pub(crate) async fn invoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let caller = state.identity.authenticate(&headers).await?;
    let request = parse_request(&body)?;
    let outcome = state.invoke_action(&caller, request).await?;
    Ok(with_cors(
        Json(InvokeActionResponse::from(outcome)).into_response(),
    ))
}

pub(crate) async fn get_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let caller = state.identity.authenticate(&headers).await?;
    if caller.role.index() > ACTION_READER.index() {
        warn!(caller = %caller.id, role = %caller.role, action_id = %id, "agent action lookup denied");
        return Err(ApiError::PermissionDenied {
            required: ACTION_READER,
        });
    }
    let action = {
        let store = state.store.lock().await;
        store.get_agent_action(&id).map_err(ApiError::Store)?
    };
    let action = action.ok_or(ApiError::NotFound(id))?;
    Ok(with_cors(Json(action).into_response()))
}

fn parse_request(body: &[u8]) -> Result<InvokeActionRequest, ApiError> {
    let mut request: InvokeActionRequest =
        serde_json::from_slice(body).map_err(|e| ApiError::InvalidBody(e.to_string()))?;
    if request.action.trim().is_empty() || request.client_id.trim().is_empty() {
        return Err(ApiError::Validation(
            "action and clientId are required".to_string(),
        ));
    }
    match request.params {
        Value::Null => request.params = json!({}),
        Value::Object(_) => {}
        _ => return Err(ApiError::Validation("params must be an object".to_string())),
    }
    Ok(request)
}

impl AppState {
    // Dispatch and its audit writes happen under the store lock.
    pub(crate) async fn invoke_action(
        &self,
        caller: &CallerIdentity,
        request: InvokeActionRequest,
    ) -> Result<InvokeOutcome, ApiError> {
        let action = authorize(caller.role, &request.action).map_err(|err| match err {
            AuthorizeError::UnknownAction(action) => ApiError::UnknownAction(action),
            AuthorizeError::PermissionDenied { required } => {
                warn!(
                    caller = %caller.id,
                    role = %caller.role,
                    action = %request.action,
                    required = %required,
                    "agent action denied by role check"
                );
                ApiError::PermissionDenied { required }
            }
        })?;
        let payload_hash = jcs_sha256_hex(&request.params).ok();
        let now = Utc::now();
        let mut store = self.store.lock().await;

        if approval_gate(action, request.skip_approval) == GateOutcome::Park {
            let row = AgentAction {
                id: uuid::Uuid::new_v4().to_string(),
                agent_id: request.agent_id.clone(),
                client_id: request.client_id.clone(),
                action_type: action.as_str().to_string(),
                action_data: request.params.clone(),
                requested_by: caller.id.clone(),
                status: ActionStatus::Pending,
                result: None,
                created_at: now.to_rfc3339(),
                executed_at: None,
            };
            store.insert_agent_action(&row).map_err(ApiError::Audit)?;
            self.audit
                .append(
                    AuditRecord::new(
                        &caller.id,
                        &request.client_id,
                        action.as_str(),
                        "approval_gate",
                        "pending_approval",
                        "approval required",
                    )
                    .with_action_id(&row.id)
                    .with_payload_hash(payload_hash),
                )
                .await
                .map_err(ApiError::Audit)?;
            info!(action = %action, action_id = %row.id, caller = %caller.id, "agent action parked for approval");
            return Ok(InvokeOutcome::Parked { action_id: row.id });
        }

        let ctx = ActionContext {
            client_id: &request.client_id,
            caller_id: &caller.id,
            params: &request.params,
            now,
        };
        let output = match self.handlers.dispatch(action, &mut store, &ctx) {
            Ok(output) => output,
            Err(err) => {
                error!(action = %action, caller = %caller.id, error = %err, "agent action handler failed");
                if let Err(audit_err) = self
                    .audit
                    .append(
                        AuditRecord::new(
                            &caller.id,
                            &request.client_id,
                            action.as_str(),
                            "dispatch",
                            "handler_error",
                            &err.to_string(),
                        )
                        .with_payload_hash(payload_hash),
                    )
                    .await
                {
                    error!(action = %action, error = %audit_err, "handler failure not audited");
                }
                return Err(ApiError::Handler(err.to_string()));
            }
        };

        let summary = output.summary.clone();
        let result = output.into_result();
        let row = AgentAction {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: request.agent_id.clone(),
            client_id: request.client_id.clone(),
            action_type: action.as_str().to_string(),
            action_data: request.params.clone(),
            requested_by: caller.id.clone(),
            status: ActionStatus::Executed,
            result: Some(result.clone()),
            created_at: now.to_rfc3339(),
            executed_at: Some(Utc::now().to_rfc3339()),
        };
        store.insert_agent_action(&row).map_err(ApiError::Audit)?;
        store
            .insert_memory(&MemoryEntry {
                id: uuid::Uuid::new_v4().to_string(),
                agent_id: request.agent_id.clone(),
                client_id: request.client_id.clone(),
                memory_type: "action_history".to_string(),
                content: json!({
                    "action": action.as_str(),
                    "action_id": row.id,
                    "params": request.params,
                    "summary": summary,
                }),
                created_at: now.to_rfc3339(),
            })
            .map_err(ApiError::Audit)?;
        self.audit
            .append(
                AuditRecord::new(
                    &caller.id,
                    &request.client_id,
                    action.as_str(),
                    "dispatch",
                    "executed",
                    &summary,
                )
                .with_action_id(&row.id)
                .with_payload_hash(payload_hash),
            )
            .await
            .map_err(ApiError::Audit)?;
        info!(action = %action, action_id = %row.id, caller = %caller.id, "agent action executed");

        Ok(InvokeOutcome::Executed {
            action,
            action_id: row.id,
            result,
        })
    }
}
