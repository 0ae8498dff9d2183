use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use riddler_core::config::{GatewayConfig, SessionsConfig};
use riddler_pipeline::Workflow;

use crate::routes;
use crate::state::AppState;
use crate::sweeper::SessionSweeper;

/// HTTP gateway server built on axum.
pub struct GatewayServer {
    state: Arc<AppState>,
    sessions_config: SessionsConfig,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, sessions_config: SessionsConfig, workflow: Arc<Workflow>) -> Self {
        Self {
            state: Arc::new(AppState::new(config, workflow)),
            sessions_config,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// All routes, with CORS open to any origin.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(routes::index))
            .route("/health", get(routes::health))
            .route("/riddle", post(routes::ask))
            .route("/riddle/sessions", post(routes::start_session))
            .route(
                "/riddle/sessions/{id}",
                get(routes::session_status).delete(routes::cancel_session),
            )
            .route("/riddle/sessions/{id}/continue", post(routes::continue_session))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let sweeper = SessionSweeper::new(
            self.state.sessions.clone(),
            self.sessions_config.cleanup_interval_secs,
            shutdown.child_token(),
        );
        let sweep_task = tokio::spawn(async move { sweeper.run().await });

        let bind = &self.state.config.bind;
        let listener = TcpListener::bind(bind).await?;
        info!(
            bind = %bind,
            environment = %self.state.config.environment,
            "Gateway listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        sweep_task.abort();
        info!("Gateway shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use riddler_core::error::{Result, RiddleError};
    use riddler_pipeline::{pipeline, StepOptions, YieldResponse};

    async fn shout(input: Value) -> Result<Value> {
        let question = input["question"].as_str().unwrap_or_default();
        if question == "boom" {
            return Err(RiddleError::LlmRequest("HTTP 503".into()));
        }
        Ok(json!({ "loud": question.to_uppercase() }))
    }

    async fn finish(input: Value) -> Result<Value> {
        Ok(json!({ "finalResponse": format!("{}!", input["loud"].as_str().unwrap_or_default()) }))
    }

    fn server() -> GatewayServer {
        let workflow = pipeline()
            .step("shout", shout, StepOptions::new())
            .yield_point("shouted", |_| {
                Ok(YieldResponse::new().next_step("finish").action("finishing"))
            })
            .step("finish", finish, StepOptions::new())
            .build()
            .unwrap();
        let config = GatewayConfig {
            environment: "test".into(),
            ..GatewayConfig::default()
        };
        GatewayServer::new(config, SessionsConfig::default(), Arc::new(workflow))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    #[tokio::test]
    async fn test_index_and_health() {
        let app = server().router();
        let (status, body) = send(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_str().unwrap().contains("POST /riddle"));

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("healthy"));
        assert_eq!(body["environment"], json!("test"));
        assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));
        assert!(body["buildTime"].is_string());
    }

    #[tokio::test]
    async fn test_riddle_runs_to_completion() {
        let app = server().router();
        let (status, body) = send(&app, "POST", "/riddle", Some(json!({"question": "hi"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"finalResponse": "HI!"}));
    }

    #[tokio::test]
    async fn test_riddle_requires_question() {
        let app = server().router();
        let (status, body) = send(&app, "POST", "/riddle", Some(json!({"question": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Question is required"}));
    }

    #[tokio::test]
    async fn test_riddle_failure_is_generic_500() {
        let app = server().router();
        let (status, body) = send(&app, "POST", "/riddle", Some(json!({"question": "boom"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Failed to process question"}));
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let app = server().router();
        let (status, started) = send(
            &app,
            "POST",
            "/riddle/sessions",
            Some(json!({"question": "hey", "sessionId": "abc"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(started["sessionId"], json!("abc"));
        assert_eq!(started["nextStep"], json!("finish"));
        assert_eq!(started["canContinue"], json!(true));

        let (status, _) = send(
            &app,
            "POST",
            "/riddle/sessions/abc/continue",
            Some(json!({"expectedStep": "shout"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, done) = send(&app, "POST", "/riddle/sessions/abc/continue", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(done["completed"], json!(true));
        assert_eq!(done["payload"], json!({"finalResponse": "HEY!"}));

        let (status, snapshot) = send(&app, "GET", "/riddle/sessions/abc", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["progress"], json!("2/2 steps complete"));
    }

    #[tokio::test]
    async fn test_cancel_and_unknown_sessions() {
        let app = server().router();
        send(&app, "POST", "/riddle/sessions", Some(json!({"question": "x", "sessionId": "c1"}))).await;

        let (status, _) = send(&app, "DELETE", "/riddle/sessions/c1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, after) = send(&app, "POST", "/riddle/sessions/c1/continue", None).await;
        assert_eq!(after["cancelled"], json!(true));
        assert_eq!(after["canContinue"], json!(false));

        let (status, body) = send(&app, "GET", "/riddle/sessions/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("missing"));

        let (status, _) = send(&app, "DELETE", "/riddle/sessions/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
