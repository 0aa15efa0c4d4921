//! Integration tests for the HTTP simulation client
//!
//! An axum router bound to an ephemeral local port plays the remote service,
//! so requests travel through reqwest exactly as they would in production.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use seawatch_abm::api::wire::{CreateRequest, ResponseStatus, SimulationParams, StartReply};
use seawatch_abm::api::{HttpSimulationClient, SimulationService};
use seawatch_abm::core::{ApiConfig, ApiError, ClientId, SessionId};
use seawatch_abm::session::LoadingStage;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct Recorded {
    create_body: Arc<Mutex<Option<Value>>>,
    reset_body: Arc<Mutex<Option<Value>>>,
}

async fn create(State(recorded): State<Recorded>, Json(body): Json<Value>) -> Response {
    *recorded.create_body.lock().unwrap() = Some(body);
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "status": "initializing",
            "message": "Simulation initialization started",
            "simulation_id": "abc",
            "loading_stage": "INITIALIZING",
            "loading_progress": 0
        })),
    )
        .into_response()
}

async fn reset(
    State(recorded): State<Recorded>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    *recorded.reset_body.lock().unwrap() = Some(body);
    Json(json!({
        "status": "success",
        "message": "Simulation reset",
        "simulation_id": format!("{}-2", id),
        "loading_stage": "INITIALIZING",
        "loading_progress": 0
    }))
    .into_response()
}

async fn state(Path(id): Path<String>) -> Response {
    if id != "abc" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "message": "Simulation not found"})),
        )
            .into_response();
    }
    Json(json!({
        "status": "success",
        "running": true,
        "step_count": 42,
        "fps": 2.0,
        "grid_state": [
            {"Shape": "rect", "Color": "grey", "Filled": "true", "Layer": 0, "x": 3, "y": 4,
             "w": 1, "h": 1, "port_name": "Rotterdam", "max_capacity": 10, "current_capacity": 4},
            {"Shape": "circle", "Color": "red", "Filled": "true", "Layer": 1, "x": 5, "y": 6,
             "r": 0.5, "ship_id": 7, "is_scrubber": true}
        ],
        "model_data": {"NumShips": 1, "PortRevenues": {"Rotterdam": [{"step": 1, "revenue": 150.0}]}},
        "loading_stage": "COMPLETE",
        "loading_progress": 100
    }))
    .into_response()
}

async fn start(Path(id): Path<String>) -> Response {
    if id == "loading" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": "Cannot start simulation until initialization is complete",
                "loading_stage": "CREATING_AGENTS"
            })),
        )
            .into_response();
    }
    if id == "broken" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "message": "Simulation initialization failed"})),
        )
            .into_response();
    }
    Json(json!({"status": "success", "message": "Simulation started"})).into_response()
}

async fn stop() -> Response {
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({"status": "success"})).into_response()
}

async fn step() -> Response {
    (StatusCode::TOO_MANY_REQUESTS, "<html>slow down</html>").into_response()
}

async fn fps(Json(body): Json<Value>) -> Response {
    let requested = body.get("fps").and_then(Value::as_f64).unwrap_or(1.0);
    Json(json!({"status": "success", "fps": requested.clamp(0.5, 10.0)})).into_response()
}

async fn delete() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"status": "error", "message": "Simulation not found"})),
    )
        .into_response()
}

async fn serve(recorded: Recorded) -> String {
    let app = Router::new()
        .route("/api/v1/abm/simulations/create/", post(create))
        .route("/api/v1/abm/simulations/:id/", get(state))
        .route("/api/v1/abm/simulations/:id/start/", post(start))
        .route("/api/v1/abm/simulations/:id/stop/", post(stop))
        .route("/api/v1/abm/simulations/:id/step/", post(step))
        .route("/api/v1/abm/simulations/:id/fps/", post(fps))
        .route("/api/v1/abm/simulations/:id/reset/", post(reset))
        .route("/api/v1/abm/simulations/:id/delete/", post(delete))
        .with_state(recorded);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base_url: String) -> HttpSimulationClient {
    HttpSimulationClient::new(&ApiConfig {
        base_url,
        request_timeout_ms: 500,
    })
}

#[tokio::test]
async fn test_create_sends_params_and_accepts_initialization_started() {
    let recorded = Recorded::default();
    let base = serve(recorded.clone()).await;
    let client = client(base);

    let request = CreateRequest {
        params: SimulationParams {
            national_ban: "Norway".to_string(),
            num_ships: Some(25),
            ..SimulationParams::default()
        },
        client_id: ClientId("client_1_abc".to_string()),
        is_developer_test: true,
    };
    let response = client
        .create(&request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.simulation_id, Some(SessionId::from("abc")));
    assert_eq!(response.loading_stage, Some(LoadingStage::Initializing));

    let body = recorded.create_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["national_ban"], "Norway");
    assert_eq!(body["custom_port_policies"], "None");
    assert_eq!(body["num_ships"], 25);
    assert_eq!(body["client_id"], "client_1_abc");
    assert_eq!(body["is_developer_test"], true);
    assert!(body.get("width").is_none());
}

#[tokio::test]
async fn test_state_snapshot_decoded() {
    let base = serve(Recorded::default()).await;
    let client = client(format!("{}/api/v1/", base));

    let state = client
        .get_state(&SessionId::from("abc"), &CancellationToken::new())
        .await
        .unwrap();
    assert!(state.running);
    assert_eq!(state.step_count, 42);
    assert_eq!(state.grid_state.len(), 2);
    assert!(state.grid_state[0].is_port());
    assert!(state.grid_state[1].is_ship());
    assert_eq!(state.grid_state[1].extra["ship_id"], 7);
    assert_eq!(state.model_data.latest_port_revenue("Rotterdam"), Some(150.0));
}

#[tokio::test]
async fn test_missing_session_is_not_found() {
    let base = serve(Recorded::default()).await;
    let client = client(base);

    let result = client
        .get_state(&SessionId::from("gone"), &CancellationToken::new())
        .await;
    assert_eq!(result, Err(ApiError::NotFound));
}

#[tokio::test]
async fn test_start_distinguishes_not_ready() {
    let base = serve(Recorded::default()).await;
    let client = client(base);
    let cancel = CancellationToken::new();

    let reply = client.start(&SessionId::from("loading"), &cancel).await.unwrap();
    match reply {
        StartReply::NotReady { loading_stage, .. } => {
            assert_eq!(loading_stage, Some(LoadingStage::CreatingAgents));
        }
        other => panic!("expected not-ready reply, got {:?}", other),
    }

    let reply = client.start(&SessionId::from("abc"), &cancel).await.unwrap();
    assert!(matches!(reply, StartReply::Started(_)));
}

#[tokio::test]
async fn test_failed_initialization_is_not_soft() {
    let base = serve(Recorded::default()).await;
    let client = client(base);

    let result = client
        .start(&SessionId::from("broken"), &CancellationToken::new())
        .await;
    match result {
        Err(ApiError::Rejected { status, message, .. }) => {
            assert_eq!(status, Some(400));
            assert_eq!(message, "Simulation initialization failed");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_call_times_out() {
    let base = serve(Recorded::default()).await;
    let client = client(base);

    let result = client
        .stop(&SessionId::from("abc"), &CancellationToken::new())
        .await;
    assert_eq!(result, Err(ApiError::Timeout));
}

#[tokio::test]
async fn test_cancelled_call_is_timeout() {
    let base = serve(Recorded::default()).await;
    let client = client(base).with_timeout(Duration::from_secs(10));
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });
    let result = client.stop(&SessionId::from("abc"), &cancel).await;
    assert_eq!(result, Err(ApiError::Timeout));
}

#[tokio::test]
async fn test_non_json_rejection_gets_generic_message() {
    let base = serve(Recorded::default()).await;
    let client = client(base);

    let result = client
        .step(&SessionId::from("abc"), &CancellationToken::new())
        .await;
    match result {
        Err(ApiError::Rejected { status, message, .. }) => {
            assert_eq!(status, Some(429));
            assert_eq!(message, "Request failed with status 429");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_speed_echo_and_delete_of_missing_session() {
    let base = serve(Recorded::default()).await;
    let client = client(base);
    let cancel = CancellationToken::new();
    let id = SessionId::from("abc");

    let response = client.set_speed(&id, 25.0, &cancel).await.unwrap();
    assert_eq!(response.fps, Some(10.0));

    let response = client.delete(&id, &cancel).await.unwrap();
    assert_eq!(response.status, ResponseStatus::Success);
}

#[tokio::test]
async fn test_reset_sends_params_and_returns_replacement() {
    let recorded = Recorded::default();
    let base = serve(recorded.clone()).await;
    let client = client(base);

    let request = CreateRequest {
        params: SimulationParams {
            national_ban: "Denmark".to_string(),
            fps: 2.0,
            ..SimulationParams::default()
        },
        client_id: ClientId("client_2_xyz".to_string()),
        is_developer_test: false,
    };
    let response = client
        .reset(&SessionId::from("abc"), &request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.simulation_id, Some(SessionId::from("abc-2")));
    assert_eq!(response.loading_stage, Some(LoadingStage::Initializing));

    let body = recorded.reset_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["national_ban"], "Denmark");
    assert_eq!(body["fps"], 2.0);
    assert_eq!(body["client_id"], "client_2_xyz");
    assert_eq!(body["is_developer_test"], false);
}
