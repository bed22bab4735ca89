use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::{Json, Router};
use gateway_config::{
    Audit, Config, Forwarding, Identity, RateLimit, Route, Server, StaticToken, Store,
};
use gateway_contracts::API_VERSION;
use gateway_server::store::{Campaign, Store as DataStore};
use gateway_server::{build_app, verify_audit_chain, verify_audit_chain_with_mirror};
use serde_json::{json, Value};
use tower::util::ServiceExt;

fn temp_path(prefix: &str, ext: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_nanos();
    std::env::temp_dir()
        .join(format!("{prefix}-{nanos}.{ext}"))
        .to_string_lossy()
        .to_string()
}

fn token(token: &str, id: &str, role: &str) -> StaticToken {
    StaticToken {
        token: token.to_string(),
        id: id.to_string(),
        role: role.to_string(),
    }
}

fn route(path: &str, methods: &[&str], require_auth: bool, rate_limit: Option<u32>, target: &str) -> Route {
    Route {
        path: path.to_string(),
        methods: methods.iter().map(|m| m.to_string()).collect(),
        require_auth,
        rate_limit,
        target: target.to_string(),
        description: format!("{target} service"),
    }
}

fn test_config(downstream: &str) -> Config {
    let mut targets = BTreeMap::new();
    targets.insert("health".to_string(), format!("{downstream}/health"));
    targets.insert("task-analyzer".to_string(), format!("{downstream}/analyze"));
    targets.insert("ai-general".to_string(), format!("{downstream}/ai"));
    targets.insert("clients-api".to_string(), format!("{downstream}/clients"));
    targets.insert("dead".to_string(), "http://127.0.0.1:9".to_string());

    Config {
        server: Server {
            listen_addr: "127.0.0.1:0".to_string(),
            log_level: "info".to_string(),
        },
        store: Store {
            kind: "memory".to_string(),
            sqlite_path: None,
        },
        identity: Identity {
            mode: "static".to_string(),
            endpoint: None,
            timeout_ms: 1_000,
            tokens: vec![
                token("tok-admin", "u-admin", "admin"),
                token("tok-manager", "u-manager", "team_manager"),
                token("tok-employee", "u-employee", "employee"),
                token("tok-basic", "u-basic", "basic_client"),
                token("tok-demo", "u-demo", "demo"),
            ],
        },
        rate_limit: RateLimit {
            backend: "memory".to_string(),
        },
        forwarding: Forwarding {
            timeout_ms: 2_000,
            max_body_bytes: 1024 * 1024,
            targets,
        },
        routes: vec![
            route("/health", &["GET"], false, None, "health"),
            route("/ai/task-analyzer", &["POST"], true, Some(5), "task-analyzer"),
            route("/ai", &["POST"], true, None, "ai-general"),
            route("/clients", &["GET", "POST"], true, Some(100), "clients-api"),
            route("/legacy", &["GET"], false, None, "dead"),
        ],
        audit: Audit {
            jsonl_path: temp_path("agency-audit", "jsonl"),
            immutable_mirror_path: None,
        },
    }
}

fn test_config_sqlite(downstream: &str, db_path: &str) -> Config {
    let mut cfg = test_config(downstream);
    cfg.store.kind = "sqlite".to_string();
    cfg.store.sqlite_path = Some(db_path.to_string());
    cfg
}

// Echo server standing in for downstream services.
async fn spawn_downstream() -> String {
    let app = Router::new().fallback(|req: Request<Body>| async move {
        let (parts, body) = req.into_parts();
        let body = to_bytes(body, usize::MAX).await.unwrap_or_default();
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        (
            [("x-downstream", "echo")],
            Json(json!({
                "method": parts.method.as_str(),
                "uri": parts.uri.to_string(),
                "route": header("x-gateway-route"),
                "original_path": header("x-original-path"),
                "authorization": header("authorization"),
                "body": String::from_utf8_lossy(&body),
            })),
        )
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn invoke_request(bearer: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/agent-actions")
        .header("content-type", "application/json");
    if let Some(tok) = bearer {
        builder = builder.header("authorization", format!("Bearer {tok}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(tok) = bearer {
        builder = builder.header("authorization", format!("Bearer {tok}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn load_contract(rel: &str) -> Value {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join(rel);
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn seed_campaign(db_path: &str) {
    let mut store = DataStore::open("sqlite", Some(db_path)).unwrap();
    store
        .save_campaign(&Campaign {
            id: "camp-1".to_string(),
            client_id: "client-1".to_string(),
            name: "Spring Launch".to_string(),
            platform: "google_ads".to_string(),
            status: "active".to_string(),
            budget: 1500.0,
            updated_at: "2026-02-01T00:00:00Z".to_string(),
        })
        .unwrap();
}

#[tokio::test]
async fn scenario_a_health_is_public_and_forwarded() {
    let downstream = spawn_downstream().await;
    let app = build_app(test_config(&downstream)).await.unwrap();

    let response = send(&app, get_request("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-downstream"], "echo");
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body = body_json(response).await;
    assert_eq!(body["method"], "GET");
    assert_eq!(body["uri"], "/health");
}

#[tokio::test]
async fn scenario_b_protected_route_without_header_is_401() {
    let downstream = spawn_downstream().await;
    let app = build_app(test_config(&downstream)).await.unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/ai/task-analyzer")
        .body(Body::from("{}"))
        .unwrap();
    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body = body_json(response).await;
    assert_eq!(body["error"], "Missing or invalid authorization header");

    let req = Request::builder()
        .method("POST")
        .uri("/ai/task-analyzer")
        .header("authorization", "Bearer not-a-token")
        .body(Body::from("{}"))
        .unwrap();
    let body = body_json(send(&app, req).await).await;
    assert_eq!(body["error"], "Invalid token");
}

#[tokio::test]
async fn scenario_c_basic_client_cannot_update_campaign() {
    let downstream = spawn_downstream().await;
    let app = build_app(test_config(&downstream)).await.unwrap();

    let response = send(
        &app,
        invoke_request(
            Some("tok-basic"),
            json!({"action": "update_campaign", "clientId": "client-1", "params": {"campaign_id": "camp-1"}}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Permission denied");
    assert_eq!(body["message"], "This action requires Team Manager role or higher");
    assert_eq!(body["requiredRole"], "team_manager");
}

#[tokio::test]
async fn scenario_d_employee_create_task_executes() {
    let downstream = spawn_downstream().await;
    let app = build_app(test_config(&downstream)).await.unwrap();

    let response = send(
        &app,
        invoke_request(
            Some("tok-employee"),
            json!({
                "action": "create_task",
                "clientId": "client-1",
                "agentId": "agent-7",
                "params": {"title": "Draft Q3 media plan", "priority": "high"}
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["action"], "create_task");
    assert!(body["result"]["summary"]
        .as_str()
        .unwrap()
        .contains("Draft Q3 media plan"));

    let action_id = body["actionId"].as_str().unwrap();
    let response = send(
        &app,
        get_request(&format!("/v1/agent-actions/{action_id}"), Some("tok-employee")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let row = body_json(response).await;
    assert_eq!(row["status"], "executed");
    assert_eq!(row["requested_by"], "u-employee");
    assert_eq!(row["agent_id"], "agent-7");
    assert!(row["executed_at"].is_string());
    assert_eq!(row["result"]["summary"], body["result"]["summary"]);

    let validator =
        jsonschema::validator_for(&load_contract("contracts/v1/agent_action.schema.json")).unwrap();
    assert!(validator.is_valid(&row), "executed row violates contract: {row}");
}

#[tokio::test]
async fn scenario_e_sixth_request_in_window_is_rate_limited() {
    let downstream = spawn_downstream().await;
    let app = build_app(test_config(&downstream)).await.unwrap();

    let analyze = || {
        Request::builder()
            .method("POST")
            .uri("/ai/task-analyzer")
            .header("authorization", "Bearer tok-employee")
            .body(Body::from(r#"{"text":"fix the landing page"}"#))
            .unwrap()
    };
    for i in 1..=5 {
        let response = send(&app, analyze()).await;
        assert_eq!(response.status(), StatusCode::OK, "request {i}");
    }
    let response = send(&app, analyze()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "60");
    let body = body_json(response).await;
    assert_eq!(body["error"], "Rate limit exceeded");
    assert_eq!(body["retryAfter"], 60);

    // Windows are per caller.
    let other = Request::builder()
        .method("POST")
        .uri("/ai/task-analyzer")
        .header("authorization", "Bearer tok-manager")
        .body(Body::from("{}"))
        .unwrap();
    assert_eq!(send(&app, other).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn scenario_f_approval_required_action_is_parked_and_campaign_unchanged() {
    let downstream = spawn_downstream().await;
    let db_path = temp_path("agency-store", "db");
    seed_campaign(&db_path);
    let app = build_app(test_config_sqlite(&downstream, &db_path))
        .await
        .unwrap();

    let response = send(
        &app,
        invoke_request(
            Some("tok-manager"),
            json!({
                "action": "update_campaign",
                "clientId": "client-1",
                "params": {"campaign_id": "camp-1", "status": "paused", "budget": 10}
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending_approval");
    let action_id = body["actionId"].as_str().unwrap().to_string();
    assert!(!action_id.is_empty());

    let store = DataStore::open("sqlite", Some(&db_path)).unwrap();
    let campaign = store.get_campaign("camp-1").unwrap().unwrap();
    assert_eq!(campaign.status, "active");
    assert_eq!(campaign.budget, 1500.0);

    let row = store.get_agent_action(&action_id).unwrap().unwrap();
    assert_eq!(row.status.as_str(), "pending");
    assert!(row.result.is_none());
    assert!(row.executed_at.is_none());
    assert_eq!(row.action_data["status"], "paused");
}

#[tokio::test]
async fn skip_approval_dispatches_approval_required_action() {
    let downstream = spawn_downstream().await;
    let db_path = temp_path("agency-store", "db");
    seed_campaign(&db_path);
    let app = build_app(test_config_sqlite(&downstream, &db_path))
        .await
        .unwrap();

    let response = send(
        &app,
        invoke_request(
            Some("tok-manager"),
            json!({
                "action": "update_campaign",
                "clientId": "client-1",
                "skipApproval": true,
                "params": {"campaign_id": "camp-1", "status": "paused"}
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");

    let store = DataStore::open("sqlite", Some(&db_path)).unwrap();
    assert_eq!(store.get_campaign("camp-1").unwrap().unwrap().status, "paused");
    let history = store.memories("client-1", "action_history").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content["action"], "update_campaign");
}

#[tokio::test]
async fn parked_notification_is_not_queued() {
    let downstream = spawn_downstream().await;
    let db_path = temp_path("agency-store", "db");
    let app = build_app(test_config_sqlite(&downstream, &db_path))
        .await
        .unwrap();

    let response = send(
        &app,
        invoke_request(
            Some("tok-admin"),
            json!({
                "action": "send_notification",
                "clientId": "client-1",
                "params": {"title": "Budget alert", "message": "Spend is at 90%"}
            }),
        ),
    )
    .await;
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending_approval");

    let store = DataStore::open("sqlite", Some(&db_path)).unwrap();
    assert_eq!(store.count_notifications("client-1").unwrap(), 0);
    assert_eq!(store.count_agent_actions("client-1").unwrap(), 1);
    assert!(store.memories("client-1", "action_history").unwrap().is_empty());
}

#[tokio::test]
async fn unknown_action_and_bad_bodies_are_400() {
    let downstream = spawn_downstream().await;
    let app = build_app(test_config(&downstream)).await.unwrap();

    let response = send(
        &app,
        invoke_request(
            Some("tok-admin"),
            json!({"action": "launch_rocket", "clientId": "client-1"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Unknown action");
    assert_eq!(body["action"], "launch_rocket");

    let response = send(
        &app,
        invoke_request(Some("tok-admin"), json!({"action": "search_data", "clientId": ""})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Validation error");

    let req = Request::builder()
        .method("POST")
        .uri("/v1/agent-actions")
        .header("authorization", "Bearer tok-admin")
        .body(Body::from("not json"))
        .unwrap();
    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid request body");
}

#[tokio::test]
async fn agent_actions_require_a_bearer_token() {
    let downstream = spawn_downstream().await;
    let app = build_app(test_config(&downstream)).await.unwrap();

    let response = send(
        &app,
        invoke_request(None, json!({"action": "search_data", "clientId": "client-1"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, get_request("/v1/agent-actions/missing", Some("tok-admin"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "Action not found");
}

#[tokio::test]
async fn action_lookup_requires_employee_role() {
    let downstream = spawn_downstream().await;
    let app = build_app(test_config(&downstream)).await.unwrap();

    let created = body_json(
        send(
            &app,
            invoke_request(
                Some("tok-admin"),
                json!({
                    "action": "send_notification",
                    "clientId": "client-1",
                    "params": {"title": "Budget alert"}
                }),
            ),
        )
        .await,
    )
    .await;
    let uri = format!("/v1/agent-actions/{}", created["actionId"].as_str().unwrap());

    for bearer in ["tok-basic", "tok-demo"] {
        let response = send(&app, get_request(&uri, Some(bearer))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{bearer}");
        let body = body_json(response).await;
        assert_eq!(body["error"], "Permission denied");
        assert_eq!(body["requiredRole"], "employee");
    }

    let response = send(&app, get_request(&uri, Some("tok-employee"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["requested_by"], "u-admin");
}

#[tokio::test]
async fn wrong_method_on_agent_actions_is_json_405() {
    let downstream = spawn_downstream().await;
    let app = build_app(test_config(&downstream)).await.unwrap();

    let response = send(&app, get_request("/v1/agent-actions", Some("tok-admin"))).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body = body_json(response).await;
    assert_eq!(body["error"], "Method not allowed");
    assert_eq!(body["method"], "GET");
    assert_eq!(body["path"], "/v1/agent-actions");

    let req = Request::builder()
        .method("DELETE")
        .uri("/v1/agent-actions/a1")
        .header("authorization", "Bearer tok-admin")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(body_json(response).await["error"], "Method not allowed");
}

#[tokio::test]
async fn skipped_approval_notification_is_queued() {
    let downstream = spawn_downstream().await;
    let db_path = temp_path("agency-store", "db");
    let app = build_app(test_config_sqlite(&downstream, &db_path))
        .await
        .unwrap();

    let response = send(
        &app,
        invoke_request(
            Some("tok-admin"),
            json!({
                "action": "send_notification",
                "clientId": "client-1",
                "skipApproval": true,
                "params": {"title": "Budget alert", "message": "Spend is at 90%", "user_id": "u-manager"}
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["action"], "send_notification");
    assert_eq!(body["result"]["notification"]["title"], "Budget alert");

    let store = DataStore::open("sqlite", Some(&db_path)).unwrap();
    assert_eq!(store.count_notifications("client-1").unwrap(), 1);
    let row = store
        .get_agent_action(body["actionId"].as_str().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(row.status.as_str(), "executed");
    assert!(row.executed_at.is_some());
}

#[tokio::test]
async fn anonymous_callers_share_one_window() {
    let downstream = spawn_downstream().await;
    let mut cfg = test_config(&downstream);
    cfg.routes.insert(0, route("/status", &["GET"], false, Some(2), "health"));
    let app = build_app(cfg).await.unwrap();

    for i in 1..=2 {
        let response = send(&app, get_request("/status", None)).await;
        assert_eq!(response.status(), StatusCode::OK, "request {i}");
    }
    let response = send(&app, get_request("/status/deep", None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "60");

    // The unlimited route is unaffected.
    assert_eq!(send(&app, get_request("/health", None)).await.status(), StatusCode::OK);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn handler_error_survives_failed_audit_write() {
    let downstream = spawn_downstream().await;
    let mut cfg = test_config(&downstream);
    cfg.audit.immutable_mirror_path = Some("/dev/full".to_string());
    let audit_path = cfg.audit.jsonl_path.clone();
    let app = build_app(cfg).await.unwrap();

    let response = send(
        &app,
        invoke_request(
            Some("tok-employee"),
            json!({"action": "create_task", "clientId": "client-1", "params": {}}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Action failed");
    assert!(body["message"].as_str().unwrap().contains("title"));

    assert_eq!(
        verify_audit_chain(&audit_path).unwrap(),
        "audit chain verified: 1 records"
    );
}

#[tokio::test]
async fn handler_failure_is_500_and_writes_no_action_row() {
    let downstream = spawn_downstream().await;
    let db_path = temp_path("agency-store", "db");
    let app = build_app(test_config_sqlite(&downstream, &db_path))
        .await
        .unwrap();

    let response = send(
        &app,
        invoke_request(
            Some("tok-employee"),
            json!({"action": "create_task", "clientId": "client-1", "params": {}}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Action failed");
    assert!(body["message"].as_str().unwrap().contains("title"));

    let store = DataStore::open("sqlite", Some(&db_path)).unwrap();
    assert_eq!(store.count_agent_actions("client-1").unwrap(), 0);
}

#[tokio::test]
async fn retried_invocation_creates_a_second_row() {
    let downstream = spawn_downstream().await;
    let db_path = temp_path("agency-store", "db");
    let app = build_app(test_config_sqlite(&downstream, &db_path))
        .await
        .unwrap();
    let request = json!({
        "action": "schedule_followup",
        "clientId": "client-1",
        "params": {"title": "Check in on renewal"}
    });

    let first = body_json(send(&app, invoke_request(Some("tok-employee"), request.clone())).await).await;
    let second = body_json(send(&app, invoke_request(Some("tok-employee"), request)).await).await;
    assert_ne!(first["actionId"], second["actionId"]);

    let store = DataStore::open("sqlite", Some(&db_path)).unwrap();
    assert_eq!(store.count_agent_actions("client-1").unwrap(), 2);
}

#[tokio::test]
async fn audit_chain_covers_parked_and_executed_actions() {
    let downstream = spawn_downstream().await;
    let mut cfg = test_config(&downstream);
    let mirror = temp_path("agency-audit-mirror", "jsonl");
    cfg.audit.immutable_mirror_path = Some(mirror.clone());
    let audit_path = cfg.audit.jsonl_path.clone();
    let app = build_app(cfg).await.unwrap();

    for body in [
        json!({"action": "search_data", "clientId": "client-1", "params": {"query": "spring"}}),
        json!({"action": "update_campaign", "clientId": "client-1", "params": {"campaign_id": "c"}}),
        json!({"action": "analyze_performance", "clientId": "client-1"}),
    ] {
        let response = send(&app, invoke_request(Some("tok-admin"), body)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let text = std::fs::read_to_string(&audit_path).unwrap();
    let records: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["result"], "executed");
    assert_eq!(records[1]["result"], "pending_approval");
    assert_eq!(records[1]["stage"], "approval_gate");
    assert!(records[0]["payload_hash"].is_string());
    assert!(records[1]["action_id"].is_string());

    verify_audit_chain(&audit_path).unwrap();
    verify_audit_chain_with_mirror(&audit_path, Some(&mirror)).unwrap();
}

#[tokio::test]
async fn unmatched_path_lists_available_routes() {
    let downstream = spawn_downstream().await;
    let app = build_app(test_config(&downstream)).await.unwrap();

    let response = send(&app, get_request("/nowhere", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body = body_json(response).await;
    assert_eq!(body["error"], "Route not found");
    assert_eq!(body["path"], "/nowhere");
    assert_eq!(body["method"], "GET");
    assert_eq!(
        body["availableRoutes"],
        json!(["/health", "/ai/task-analyzer", "/ai", "/clients", "/legacy"])
    );

    // Path matches but the method does not.
    let req = Request::builder()
        .method("DELETE")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn preflight_and_local_pages() {
    let downstream = spawn_downstream().await;
    let app = build_app(test_config(&downstream)).await.unwrap();

    let req = Request::builder()
        .method("OPTIONS")
        .uri("/clients/42")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert!(response.headers()["access-control-allow-methods"]
        .to_str()
        .unwrap()
        .contains("POST"));

    let req = Request::builder()
        .method("OPTIONS")
        .uri("/v1/agent-actions")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, req).await.status(), StatusCode::OK);

    let index = body_json(send(&app, get_request("/", None)).await).await;
    assert_eq!(index["status"], "healthy");
    assert_eq!(index["version"], API_VERSION);
    assert_eq!(index["routes"][1]["path"], "/ai/task-analyzer");
    assert_eq!(index["routes"][1]["requireAuth"], true);

    let docs = body_json(send(&app, get_request("/docs", None)).await).await;
    assert_eq!(docs["openapi"], "3.0.0");
    assert!(docs["paths"]["/clients"]["post"].is_object());
}

#[tokio::test]
async fn forwarding_strips_prefix_and_adds_trace_headers() {
    let downstream = spawn_downstream().await;
    let app = build_app(test_config(&downstream)).await.unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/clients/42/notes?draft=true")
        .header("authorization", "Bearer tok-employee")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"note":"call back"}"#))
        .unwrap();
    let response = send(&app, req).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["method"], "POST");
    assert_eq!(body["uri"], "/clients/42/notes?draft=true");
    assert_eq!(body["route"], "/clients");
    assert_eq!(body["original_path"], "/clients/42/notes");
    assert_eq!(body["authorization"], "Bearer tok-employee");
    assert_eq!(body["body"], r#"{"note":"call back"}"#);
}

#[tokio::test]
async fn first_declared_route_wins_over_longer_prefix() {
    let downstream = spawn_downstream().await;
    let mut cfg = test_config(&downstream);
    // Move `/ai` ahead of `/ai/task-analyzer`.
    cfg.routes.swap(1, 2);
    let app = build_app(cfg).await.unwrap();

    let req = Request::builder()
        .method("POST")
        .uri("/ai/task-analyzer")
        .header("authorization", "Bearer tok-employee")
        .body(Body::from("{}"))
        .unwrap();
    let body = body_json(send(&app, req).await).await;
    assert_eq!(body["route"], "/ai");
    assert_eq!(body["uri"], "/ai/task-analyzer");
}

#[tokio::test]
async fn unreachable_target_is_502() {
    let downstream = spawn_downstream().await;
    let app = build_app(test_config(&downstream)).await.unwrap();

    let response = send(&app, get_request("/legacy/report", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body = body_json(response).await;
    assert_eq!(body["error"], "Gateway error");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn build_app_rejects_route_with_unknown_target() {
    let downstream = spawn_downstream().await;
    let mut cfg = test_config(&downstream);
    cfg.routes.push(route("/billing", &["GET"], true, None, "billing-api"));
    let err = build_app(cfg).await.err().unwrap();
    assert!(err.contains("billing-api"));
}
