//! HTTP front-ends: the analysis API (`/analyze`, `/health`) and the API
//! behind the single-page app (`/api/*`), served from one router that
//! shares one [`RequestPipeline`].
//!
//! Handlers are thin: decode the body leniently, run the pipeline on a
//! blocking worker, translate the result into the route's JSON shape.
//! Client errors map to 400, load and inference failures to 500 with a
//! generic message (details go to the server log only).

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    cache::CacheStatus,
    error::ServiceError,
    pipeline::{PredictRequest, RequestPipeline},
    types::{Device, InferenceResult, ModelVariant},
    validate::FenCheck,
};

const LOAD_FAILED_MESSAGE: &str = "Model could not be loaded. Check the server logs.";
const INFERENCE_FAILED_MESSAGE: &str = "Inference could not be run. Check the server logs.";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RequestPipeline>,
}

/// A request body read field by field from a JSON object.
trait FromObject: Default {
    fn from_object(object: Map<String, Value>) -> Self;
}

impl FromObject for PredictRequest {
    fn from_object(object: Map<String, Value>) -> Self {
        PredictRequest::from_object(object)
    }
}

/// Bodies that are missing, not JSON or not an object count as `{}`.
fn lenient<T: FromObject>(body: &Bytes) -> T {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => T::from_object(object),
        _ => T::default(),
    }
}

fn status_code(error: &ServiceError) -> StatusCode {
    if error.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn public_message(error: &ServiceError) -> String {
    match error {
        ServiceError::InvalidInput { .. } => error.to_string(),
        ServiceError::ModelLoadFailure(_) => LOAD_FAILED_MESSAGE.to_string(),
        ServiceError::InferenceFailure(_) => INFERENCE_FAILED_MESSAGE.to_string(),
    }
}

/// Run synchronous pipeline work off the async executor. If the worker
/// itself dies, that is reported like any other server-side failure.
async fn blocking<T, F>(f: F) -> Result<T, (StatusCode, String)>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!(error = %e, "blocking worker failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            INFERENCE_FAILED_MESSAGE.to_string(),
        )
    })
}

#[derive(Debug, Serialize)]
pub struct MoveEntry {
    pub uci: String,
    pub probability: f32,
}

/// Response body for `POST /analyze`.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub model_type: ModelVariant,
    pub player_elo: u32,
    pub opponent_elo: u32,
    pub win_probability: f32,
    pub moves: Vec<MoveEntry>,
}

impl From<InferenceResult> for AnalyzeResponse {
    fn from(result: InferenceResult) -> Self {
        Self {
            model_type: result.variant,
            player_elo: result.ratings.own,
            opponent_elo: result.ratings.opponent,
            win_probability: result.win_probability,
            moves: result
                .ranked_moves
                .into_iter()
                .map(|m| MoveEntry {
                    uci: m.uci.to_string(),
                    probability: m.probability,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn analyze_error(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorBody { error })).into_response()
}

async fn handle_analyze(State(state): State<AppState>, body: Bytes) -> Response {
    let request: PredictRequest = lenient(&body);
    let pipeline = Arc::clone(&state.pipeline);
    match blocking(move || pipeline.handle(&request)).await {
        Ok(Ok(result)) => Json(AnalyzeResponse::from(result)).into_response(),
        Ok(Err(e)) => analyze_error(status_code(&e), public_message(&e)),
        Err((status, message)) => analyze_error(status, message),
    }
}

#[derive(Debug, Serialize)]
pub struct TopMove {
    #[serde(rename = "move")]
    pub uci: String,
    pub probability: f32,
}

/// Response body for `POST /api/predict`.
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub model_type: ModelVariant,
    pub player_elo: u32,
    pub opponent_elo: u32,
    pub win_probability: f32,
    pub top_moves: Vec<TopMove>,
}

impl From<InferenceResult> for PredictResponse {
    fn from(result: InferenceResult) -> Self {
        Self {
            success: true,
            model_type: result.variant,
            player_elo: result.ratings.own,
            opponent_elo: result.ratings.opponent,
            win_probability: result.win_probability,
            top_moves: result
                .ranked_moves
                .into_iter()
                .map(|m| TopMove {
                    uci: m.uci.to_string(),
                    probability: m.probability,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FailureBody {
    success: bool,
    message: String,
}

fn api_error(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(FailureBody {
            success: false,
            message,
        }),
    )
        .into_response()
}

async fn handle_api_predict(State(state): State<AppState>, body: Bytes) -> Response {
    let mut request: PredictRequest = lenient(&body);
    // the app initialises a model first and then omits model_type/device
    let active = state.pipeline.status();
    if request.model_type.is_none() {
        request.model_type = active.variant.map(|v| Value::from(v.as_str()));
    }
    if request.device.is_none() {
        request.device = active.device.map(|d| Value::from(d.as_str()));
    }
    let pipeline = Arc::clone(&state.pipeline);
    match blocking(move || pipeline.handle(&request)).await {
        Ok(Ok(result)) => Json(PredictResponse::from(result)).into_response(),
        Ok(Err(e)) => api_error(status_code(&e), public_message(&e)),
        Err((status, message)) => api_error(status, message),
    }
}

#[derive(Debug, Default)]
pub struct InitRequest {
    pub model_type: Option<Value>,
    pub device: Option<Value>,
}

impl FromObject for InitRequest {
    fn from_object(mut object: Map<String, Value>) -> Self {
        Self {
            model_type: object.remove("model_type"),
            device: object.remove("device"),
        }
    }
}

/// Configuration echo shared by `/api/init`, `/api/status` and `/health`.
#[derive(Debug, Serialize)]
pub struct ConfigEcho {
    #[serde(rename = "type")]
    pub model_type: Option<ModelVariant>,
    pub device: Option<Device>,
    pub initialized: bool,
}

impl From<CacheStatus> for ConfigEcho {
    fn from(status: CacheStatus) -> Self {
        Self {
            model_type: status.variant,
            device: status.device,
            initialized: status.loaded,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InitResponse {
    pub success: bool,
    pub message: String,
    pub config: ConfigEcho,
}

async fn handle_api_init(State(state): State<AppState>, body: Bytes) -> Response {
    let request: InitRequest = lenient(&body);
    let pipeline = Arc::clone(&state.pipeline);
    let outcome = blocking(move || {
        pipeline.init(request.model_type.as_ref(), request.device.as_ref())
    })
    .await;
    match outcome {
        Ok(Ok(model)) => Json(InitResponse {
            success: true,
            message: format!(
                "Model {} initialised on {}",
                model.variant,
                model.device.as_str().to_uppercase()
            ),
            config: ConfigEcho {
                model_type: Some(model.variant),
                device: Some(model.device),
                initialized: true,
            },
        })
        .into_response(),
        Ok(Err(e)) => api_error(status_code(&e), public_message(&e)),
        Err((status, message)) => api_error(status, message),
    }
}

/// Response body for `GET /health` and `GET /api/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub status: &'static str,
    pub model_cached: bool,
    pub initialized: bool,
    pub config: ConfigEcho,
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.pipeline.status();
    Json(StatusResponse {
        success: true,
        status: "ok",
        model_cached: status.loaded,
        initialized: status.loaded,
        config: status.into(),
    })
}

#[derive(Debug, Default)]
pub struct ValidateFenRequest {
    pub fen: Option<Value>,
}

impl FromObject for ValidateFenRequest {
    fn from_object(mut object: Map<String, Value>) -> Self {
        Self {
            fen: object.remove("fen"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidateFenResponse {
    pub success: bool,
    #[serde(flatten)]
    pub check: FenCheck,
}

async fn handle_validate_fen(
    State(state): State<AppState>,
    body: Bytes,
) -> Json<ValidateFenResponse> {
    let request: ValidateFenRequest = lenient(&body);
    Json(ValidateFenResponse {
        success: true,
        check: state.pipeline.validate_fen(request.fen.as_ref()),
    })
}

/// Build the router for both APIs.
pub fn router(pipeline: Arc<RequestPipeline>) -> Router {
    let state = AppState { pipeline };
    Router::new()
        .route("/analyze", post(handle_analyze))
        .route("/health", get(handle_status))
        .route("/api/init", post(handle_api_init))
        .route("/api/predict", post(handle_api_predict))
        .route("/api/status", get(handle_status))
        .route("/api/validate_fen", post(handle_validate_fen))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server on `bind_addr` until Ctrl+C / SIGTERM.
pub async fn run_http(pipeline: Arc<RequestPipeline>, bind_addr: &str) -> Result<()> {
    let app = router(pipeline);
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on {} (Ctrl+C/SIGTERM to stop)", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fake_pipeline;
    use crate::types::{MoveProbability, RatingPair};

    #[test]
    fn lenient_bodies_default_to_empty() {
        for raw in [&b""[..], b"not json", b"[1,2]", b"null"] {
            let request: PredictRequest = lenient(&Bytes::from_static(raw));
            assert!(request.fen.is_none());
        }
    }

    #[test]
    fn lenient_body_with_duplicate_names_keeps_the_fen() {
        let raw = br#"{"fen":"x","model_type":"rapid","game_type":"rapid"}"#;
        let request: PredictRequest = lenient(&Bytes::from_static(raw));
        assert!(request.fen.is_some());
        assert_eq!(request.model_type, Some(Value::from("rapid")));
    }

    #[test]
    fn server_errors_hide_details() {
        let err = ServiceError::ModelLoadFailure(crate::MaiaError::MissingArtifact(
            "/secret/path/maia_rapid.onnx".into(),
        ));
        assert_eq!(status_code(&err), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!public_message(&err).contains("secret"));

        let err = ServiceError::invalid(crate::Field::Fen, "fen is required");
        assert_eq!(status_code(&err), StatusCode::BAD_REQUEST);
        assert!(public_message(&err).contains("fen"));
    }

    #[test]
    fn predict_response_renames_move_field() {
        let result = InferenceResult {
            variant: ModelVariant::Blitz,
            ratings: RatingPair {
                own: 1200,
                opponent: 1300,
            },
            win_probability: 0.25,
            ranked_moves: vec![MoveProbability {
                uci: "e2e4".parse().unwrap(),
                probability: 0.5,
            }],
        };
        let json = serde_json::to_value(PredictResponse::from(result)).unwrap();
        assert_eq!(json["top_moves"][0]["move"], "e2e4");
        assert_eq!(json["model_type"], "blitz");
        assert_eq!(json["player_elo"], 1200);
    }

    #[test]
    fn status_echo_before_and_after_init() {
        let pipeline = fake_pipeline(0.5, false);
        let echo = ConfigEcho::from(pipeline.status());
        assert!(!echo.initialized);
        pipeline.init(None, None).unwrap();
        let json = serde_json::to_value(ConfigEcho::from(pipeline.status())).unwrap();
        assert_eq!(json["type"], "rapid");
        assert_eq!(json["device"], "cpu");
        assert_eq!(json["initialized"], true);
    }
}
