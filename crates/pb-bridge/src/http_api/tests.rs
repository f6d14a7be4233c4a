use super::*;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::time::Duration;
use tower::ServiceExt;

use pb_agents::{BridgeOrchestrator, OrchestratorConfig, QueueOptions, RequestQueue};
use pb_core::agent::{AgentAuthProbe, AgentFailure, AgentPort, AuthStep, StepOutcome};
use pb_core::types::Credentials;

/// Logs in when given any password; asks for code "4242" when `with_code`.
struct StubAgent {
    with_code: bool,
    logged_in: bool,
    awaiting_code: bool,
}

#[async_trait]
impl AgentPort for StubAgent {
    async fn initialize(&mut self) -> Result<(), AgentFailure> {
        Ok(())
    }

    async fn authenticate_step(&mut self, step: AuthStep) -> Result<StepOutcome, AgentFailure> {
        Ok(match step {
            AuthStep::Email(_) => StepOutcome::Accepted,
            AuthStep::Password(p) if p.expose() == "wrong" => StepOutcome::Rejected("bad password".into()),
            AuthStep::Password(_) if self.with_code => {
                self.awaiting_code = true;
                StepOutcome::CodeRequired
            }
            AuthStep::Password(_) => StepOutcome::Authenticated,
            AuthStep::Code(code) if code == "4242" => {
                self.logged_in = true;
                StepOutcome::Accepted
            }
            AuthStep::Code(_) => StepOutcome::Rejected("bad code".into()),
        })
    }

    async fn auth_probe(&mut self) -> Result<AgentAuthProbe, AgentFailure> {
        Ok(match (self.logged_in, self.awaiting_code) {
            (true, _) => AgentAuthProbe::LoggedIn,
            (false, true) => AgentAuthProbe::CodeRequired,
            _ => AgentAuthProbe::LoggedOut,
        })
    }

    async fn submit(&mut self, prompt: &str) -> Result<String, AgentFailure> {
        if prompt == "slow" {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(format!("echo: {prompt}"))
    }

    async fn shutdown(&mut self) -> Result<(), AgentFailure> {
        Ok(())
    }
}

fn test_app(with_code: bool, credentials: Option<Credentials>) -> (axum::Router, Arc<ApiState>) {
    let factory = move || -> Box<dyn AgentPort> {
        Box::new(StubAgent {
            with_code,
            logged_in: false,
            awaiting_code: false,
        })
    };
    let orchestrator = Arc::new(BridgeOrchestrator::new(
        Arc::new(factory),
        OrchestratorConfig::default(),
        credentials,
    ));
    let queue = RequestQueue::new(
        orchestrator.clone(),
        QueueOptions {
            inter_request_pause: Duration::ZERO,
        },
    );
    let state = Arc::new(ApiState::new(queue, orchestrator).with_ask_timeout(Duration::from_millis(200)));
    (api_router(state.clone()), state)
}

fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: axum::Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_ask_returns_answer() {
    let (app, _) = test_app(false, Some(Credentials::new("a@b.c", "pw")));
    let (status, json) = send(app, json_post("/ask", serde_json::json!({"prompt": "hi"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["answer"], "echo: hi");
}

#[tokio::test]
async fn test_ask_missing_prompt_is_400() {
    let (app, _) = test_app(false, None);
    let (status, json) = send(app.clone(), json_post("/ask", serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("prompt is required"));

    let (status, _) = send(app, json_post("/ask", serde_json::json!({"prompt": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ask_before_login_is_500_with_message() {
    let (app, _) = test_app(false, None);
    let (status, json) = send(app, json_post("/ask", serde_json::json!({"prompt": "hi"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("not authenticated"));
}

#[tokio::test]
async fn test_ask_times_out_with_504() {
    let (app, _) = test_app(false, Some(Credentials::new("a@b.c", "pw")));
    let (status, json) = send(app, json_post("/ask", serde_json::json!({"prompt": "slow"}))).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(json["error"].as_str().unwrap().contains("no answer"));
}

#[tokio::test]
async fn test_health_reports_queue_and_auth() {
    let (app, _) = test_app(false, None);
    let (status, json) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "prompt-bridge");
    assert_eq!(json["queue_size"], 0);
    assert_eq!(json["processing"], false);
    assert_eq!(json["auth_state"], "not_authenticated");
    assert_eq!(json["restart_count"], 0);
    assert!(json["current_request"].is_null());
}

#[tokio::test]
async fn test_login_and_code_flow() {
    let (app, state) = test_app(true, None);

    let (status, json) = send(
        app.clone(),
        json_post("/auth", serde_json::json!({"email": "a@b.c", "password": "pw"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["auth_state"], "awaiting_code");

    let (_, json) = send(app.clone(), get("/auth/status")).await;
    assert_eq!(json["status"], "awaiting_code");
    assert_eq!(json["email_provided"], true);
    assert_eq!(json["password_provided"], true);
    assert_eq!(json["code_provided"], false);
    assert_eq!(json["agent_initialized"], true);

    let (status, _) = send(app.clone(), json_post("/auth/code", serde_json::json!({"code": "0000"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(app.clone(), json_post("/auth/code", serde_json::json!({"code": "4242"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert_eq!(state.orchestrator.auth_state(), pb_core::types::AuthState::Completed);

    // A second login is out of order.
    let (status, _) = send(
        app,
        json_post("/auth", serde_json::json!({"email": "a@b.c", "password": "pw"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_login_validation_and_failure() {
    let (app, _) = test_app(false, None);
    let (status, _) = send(app.clone(), json_post("/auth", serde_json::json!({"email": "a@b.c"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(
        app,
        json_post("/auth", serde_json::json!({"email": "a@b.c", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "authentication failed");
}

#[tokio::test]
async fn test_code_outside_awaiting_code_is_400() {
    let (app, _) = test_app(false, None);
    let (status, json) = send(app.clone(), json_post("/auth/code", serde_json::json!({"code": "4242"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("not_authenticated"));

    let (status, _) = send(app, json_post("/auth/code", serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let (app, _) = test_app(false, None);
    let response = app.oneshot(get("/health")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}
