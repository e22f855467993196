//! HTTP server for trackflow.
//!
//! Exposes the step registry, the composed definition schema, definition
//! validation, and the run log as a server-sent-event stream.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | GET    | `/api/steps`      | Registered steps and their config    |
//! | GET    | `/api/schema`     | Composed pipeline JSON Schema        |
//! | POST   | `/api/validate`   | Validate a pipeline definition       |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::LOG_BROADCASTER;
use super::types::{error_response, StepsResponse, ValidateResponse};
use crate::steps::StepRegistry;
use crate::validation::PipelineValidator;

/// Shared by every handler.
pub struct AppState {
    registry: StepRegistry,
    validator: PipelineValidator,
}

impl AppState {
    pub fn new(registry: StepRegistry) -> Result<Self, crate::error::ConfigErrors> {
        let validator = PipelineValidator::new(&registry)?;
        Ok(Self { registry, validator })
    }
}

/// Build the router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/steps", get(list_steps))
        .route("/api/schema", get(pipeline_schema))
        .route("/api/validate", post(validate_definition))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server with the built-in steps.
pub async fn start_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(StepRegistry::builtin())?);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("trackflow server listening on http://localhost:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "trackflow",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_steps(State(state): State<Arc<AppState>>) -> Json<StepsResponse> {
    Json(StepsResponse::from(&state.registry))
}

async fn pipeline_schema(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.validator.schema().clone())
}

/// Always 200 for a well-formed body; `valid` carries the verdict.
async fn validate_definition(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<ValidateResponse>, (StatusCode, Json<Value>)> {
    let document: Value = serde_json::from_str(&body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(error_response(&format!("request body is not JSON: {}", e))),
        )
    })?;

    let response = match state.validator.validate(&document) {
        Ok(()) => ValidateResponse::ok(),
        Err(errors) => ValidateResponse::from(errors),
    };
    Ok(Json(response))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers drop the missed entries and keep streaming.
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn spawn_server() -> String {
        let state = Arc::new(AppState::new(StepRegistry::builtin()).unwrap());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health_and_steps() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let health: Value = client.get(format!("{}/health", base)).send().await.unwrap().json().await.unwrap();
        assert_eq!(health["status"], "ok");

        let steps: Value = client.get(format!("{}/api/steps", base)).send().await.unwrap().json().await.unwrap();
        let ids: Vec<&str> = steps["steps"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_str().unwrap())
            .collect();
        assert!(ids.contains(&"filter"));
        assert!(ids.contains(&"update_playlist_details"));
    }

    #[tokio::test]
    async fn test_schema_endpoint_serves_composed_schema() {
        let base = spawn_server().await;
        let schema: Value = reqwest::get(format!("{}/api/schema", base)).await.unwrap().json().await.unwrap();
        assert!(jsonschema::draft7::is_valid(
            &schema,
            &json!({ "name": "x", "steps": { "a": { "type": "get_library_tracks" } } })
        ));
    }

    #[tokio::test]
    async fn test_validate_endpoint() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let ok: ValidateResponse = client
            .post(format!("{}/api/validate", base))
            .json(&json!({ "name": "x", "steps": { "a": { "type": "get_library_tracks" } } }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(ok.valid);
        assert!(ok.violations.is_empty());

        let bad: ValidateResponse = client
            .post(format!("{}/api/validate", base))
            .json(&json!({ "name": "x", "steps": { "a": { "type": "explode" } } }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(!bad.valid);
        assert_eq!(bad.violations[0].kind, "unknown_step_type");
        assert!(bad.violations[0].allowed.as_ref().unwrap().contains(&"dedupe".to_string()));

        let status = client
            .post(format!("{}/api/validate", base))
            .body("{ not json")
            .send()
            .await
            .unwrap()
            .status();
        assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    }
}
