//! HTTP/WebSocket Handlers

use axum::{
    Json,
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use agent_core::{AgentError, AgentStep, Message as ChatMessage, RunContext, RunStatus, Session, SessionId};
use climate_advisor::AdvisorError;
use climate_advisor::model::ClimateTable;
use climate_advisor::sources::{EarthQuery, Era5Request};

use crate::state::AppState;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// An error answered as `{error, code}` JSON
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse { error: error.into(), code },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Session(message) => Self::new(StatusCode::NOT_FOUND, "SESSION_NOT_FOUND", message),
            other => {
                tracing::error!(error = %other, "Agent error");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "AGENT_ERROR", other.user_message())
            }
        }
    }
}

impl From<AdvisorError> for ApiError {
    fn from(err: AdvisorError) -> Self {
        match &err {
            AdvisorError::InvalidRequest(message) => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message.clone())
            }
            AdvisorError::Api { .. } | AdvisorError::Network(_) => {
                tracing::warn!(error = %err, "Upstream climate service failed");
                Self::new(StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", err.to_string())
            }
            _ => {
                tracing::error!(error = %err, "Climate data error");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "DATA_ERROR", err.to_string())
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub llm_connected: bool,
    pub sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: SessionId,
    pub answer: String,
    pub status: RunStatus,
    pub iterations: usize,
    pub tool_calls: usize,
    pub steps: Vec<AgentStep>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: SessionId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            title: session.title(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            messages: session.conversation.messages().to_vec(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DailyParams {
    pub location_id: String,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageryParams {
    pub lon: f64,
    pub lat: f64,
    pub date: String,
    pub dim: Option<f64>,
    #[serde(default)]
    pub cloud_score: bool,
}

#[derive(Debug, Deserialize)]
pub struct Era5Params {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    #[serde(default = "default_hour")]
    pub hour: u8,
    /// North, West, South, East
    pub area: Option<[f64; 4]>,
}

const fn default_hour() -> u8 {
    12
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let llm_connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        llm_connected,
        sessions: state.chat.sessions().len().await,
    })
}

/// Start a session holding only the greeting
pub async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionResponse>) {
    let handle = state.chat.sessions().create().await;
    let session = handle.lock().await;
    (StatusCode::CREATED, Json(SessionResponse::from(&*session)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionResponse>> {
    let handle = state.chat.sessions().get(&SessionId::from_string(id)).await?;
    let session = handle.lock().await;
    Ok(Json(SessionResponse::from(&*session)))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.chat.sessions().remove(&SessionId::from_string(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Ask a question and wait for the final answer
pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    if payload.message.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "EMPTY_MESSAGE", "Message must not be empty"));
    }

    let session_id = SessionId::from_string(id);
    let outcome = state
        .chat
        .ask(&session_id, &payload.message, RunContext::new())
        .await?;

    Ok(Json(ChatResponse {
        session_id,
        answer: outcome.answer,
        status: outcome.status,
        iterations: outcome.iterations,
        tool_calls: outcome.tool_calls,
        steps: outcome.steps,
    }))
}

/// WebSocket streaming chat
pub async fn chat_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let session_id = SessionId::from_string(id);
    state.chat.sessions().get(&session_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_stream(socket, state, session_id)))
}

fn frame(value: &Value) -> Message {
    Message::Text(value.to_string().into())
}

async fn handle_stream(socket: WebSocket, state: AppState, session_id: SessionId) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!("WebSocket error: {}", e);
                break;
            }
            _ => continue,
        };

        let request: ChatRequest = match serde_json::from_str(text.as_str()) {
            Ok(r) => r,
            Err(e) => {
                let error = json!({"type": "error", "error": e.to_string()});
                let _ = sender.send(frame(&error)).await;
                continue;
            }
        };

        let cancel = CancellationToken::new();
        let mut events = match state
            .chat
            .ask_streaming(&session_id, &request.message, cancel.clone())
            .await
        {
            Ok(events) => events,
            Err(e) => {
                let error = json!({"type": "error", "error": e.user_message()});
                let _ = sender.send(frame(&error)).await;
                continue;
            }
        };

        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(event) => {
                        let Ok(payload) = serde_json::to_value(&event) else { continue };
                        if sender.send(frame(&payload)).await.is_err() {
                            cancel.cancel();
                            return;
                        }
                    }
                    None => break,
                },
                incoming = receiver.next() => match incoming {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => {
                        tracing::info!(session = %session_id, "Client left mid-run, cancelling");
                        cancel.cancel();
                        return;
                    }
                    Some(Ok(Message::Text(_))) => {
                        let busy = json!({"type": "error", "error": "A question is already being answered"});
                        let _ = sender.send(frame(&busy)).await;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }

        let done = json!({"type": "done", "session_id": session_id});
        if sender.send(frame(&done)).await.is_err() {
            break;
        }
    }
}

/// Daily TMAX/TMIN/PRCP for a NOAA location
pub async fn noaa_daily(
    State(state): State<AppState>,
    Query(params): Query<DailyParams>,
) -> ApiResult<Json<ClimateTable>> {
    let table = state
        .noaa
        .daily_summaries(&params.location_id, &params.start_date, &params.end_date)
        .await?;
    Ok(Json(table))
}

/// Landsat asset metadata for a point
pub async fn nasa_asset(
    State(state): State<AppState>,
    Query(query): Query<EarthQuery>,
) -> ApiResult<Json<Value>> {
    Ok(Json(state.nasa.landsat_asset(&query).await?))
}

/// Landsat imagery URL for a point
pub async fn nasa_imagery(
    State(state): State<AppState>,
    Query(params): Query<ImageryParams>,
) -> ApiResult<Json<Value>> {
    let mut query = EarthQuery::new(params.lon, params.lat, params.date);
    if let Some(dim) = params.dim {
        query.dim = dim;
    }
    let url = state.nasa.landsat_imagery_url(&query, params.cloud_score).await?;
    Ok(Json(json!({ "url": url })))
}

/// Queue an ERA5 retrieval of the agricultural variables
pub async fn era5_retrieve(
    State(state): State<AppState>,
    Json(params): Json<Era5Params>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut request = Era5Request::agriculture(params.year, params.month, params.day, params.hour);
    if let Some([north, west, south, east]) = params.area {
        request = request.with_area(north, west, south, east);
    }
    let job = state.copernicus.retrieve(&request).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}
