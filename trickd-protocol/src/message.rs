//! JSON message types for trickd requests and responses.

use crate::error::ErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Protocol operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    // Session management
    Hello,
    Auth,
    Ping,
    Bye,

    // Server info
    Info,

    // Game lifecycle
    CreateGame,
    JoinGame,
    GetGame,
    FindGame,

    // Gameplay
    SubmitSetClip,
    JudgeSet,
    SubmitResponseClip,
    JudgeResponse,
    SelfFailSet,
    SelfFailResponse,

    // Subscriptions
    WatchGame,
    Unwatch,
}

impl Operation {
    /// Name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Hello => "HELLO",
            Operation::Auth => "AUTH",
            Operation::Ping => "PING",
            Operation::Bye => "BYE",
            Operation::Info => "INFO",
            Operation::CreateGame => "CREATE_GAME",
            Operation::JoinGame => "JOIN_GAME",
            Operation::GetGame => "GET_GAME",
            Operation::FindGame => "FIND_GAME",
            Operation::SubmitSetClip => "SUBMIT_SET_CLIP",
            Operation::JudgeSet => "JUDGE_SET",
            Operation::SubmitResponseClip => "SUBMIT_RESPONSE_CLIP",
            Operation::JudgeResponse => "JUDGE_RESPONSE",
            Operation::SelfFailSet => "SELF_FAIL_SET",
            Operation::SelfFailResponse => "SELF_FAIL_RESPONSE",
            Operation::WatchGame => "WATCH_GAME",
            Operation::Unwatch => "UNWATCH",
        }
    }
}

/// Request message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Message type, always "request".
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Unique request ID for correlation.
    pub id: String,

    /// Operation to perform.
    pub op: Operation,

    /// Operation-specific parameters.
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn new(id: impl Into<String>, op: Operation) -> Self {
        Self {
            msg_type: "request".to_string(),
            id: id.into(),
            op,
            params: Value::Object(Default::default()),
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// Error details in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    /// Stable error code.
    pub code: ErrorCode,

    /// Human-readable error message.
    pub message: String,

    /// Whether the same request may succeed later.
    pub retryable: bool,

    /// Additional error details.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, Value>,
}

impl ResponseError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            retryable: code.is_retryable(),
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Response metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Server timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time: Option<DateTime<Utc>>,

    /// Game version after a write, or of the snapshot returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_version: Option<u64>,
}

/// Response message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Message type, always "response".
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Request ID this response correlates to.
    pub id: String,

    /// Response status.
    pub status: ResponseStatus,

    /// Result payload (for successful responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error details (for error responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,

    /// Response metadata.
    #[serde(default, skip_serializing_if = "is_meta_empty")]
    pub meta: ResponseMeta,
}

fn is_meta_empty(meta: &ResponseMeta) -> bool {
    meta.server_time.is_none() && meta.game_version.is_none()
}

impl Response {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            msg_type: "response".to_string(),
            id: id.into(),
            status: ResponseStatus::Ok,
            result: Some(result),
            error: None,
            meta: ResponseMeta::default(),
        }
    }

    pub fn error(id: impl Into<String>, error: ResponseError) -> Self {
        Self {
            msg_type: "response".to_string(),
            id: id.into(),
            status: ResponseStatus::Error,
            result: None,
            error: Some(error),
            meta: ResponseMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }
}

/// Pushed to watchers after every committed change to a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Message type, always "event".
    #[serde(rename = "type")]
    pub msg_type: String,

    pub subscription_id: String,

    pub game_id: String,

    /// Game version after the change.
    pub version: u64,

    /// What happened, e.g. `set_submitted`.
    pub event: String,

    /// Phase after the change.
    pub phase: String,

    /// Full game snapshot after the change.
    pub game: Value,
}

impl StreamEvent {
    pub fn new(
        subscription_id: impl Into<String>,
        game_id: impl Into<String>,
        version: u64,
        event: impl Into<String>,
        phase: impl Into<String>,
        game: Value,
    ) -> Self {
        Self {
            msg_type: "event".to_string(),
            subscription_id: subscription_id.into(),
            game_id: game_id.into(),
            version,
            event: event.into(),
            phase: phase.into(),
            game,
        }
    }
}

// ============================================================================
// Session parameter and result types
// ============================================================================

/// Parameters for HELLO request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloParams {
    pub protocol_version: u16,
    #[serde(default)]
    pub client_name: Option<String>,
}

/// Result for HELLO response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloResult {
    pub protocol_version: u16,
    pub server_name: String,
    pub server_version: String,
    pub features: Vec<String>,
}

/// Parameters for AUTH request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthParams {
    pub method: String,
    pub token: String,
}

/// Result for AUTH response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    pub authenticated: bool,
    pub uid: String,
}

/// Result for INFO response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResult {
    pub server_name: String,
    pub server_version: String,
    pub protocol_version: u16,
    pub games: u64,
    pub auth_required: bool,
    pub allowed_clip_extensions: Vec<String>,
}

// ============================================================================
// Game parameter and result types
// ============================================================================

/// Parameters for CREATE_GAME request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameParams {
    pub name: String,
}

/// Parameters for JOIN_GAME request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGameParams {
    pub code: String,
    pub name: String,
}

/// Result for CREATE_GAME and JOIN_GAME responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRefResult {
    pub game_id: String,
    pub code: String,
}

/// Parameters for GET_GAME, SELF_FAIL_SET and SELF_FAIL_RESPONSE requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameIdParams {
    pub game_id: String,
}

/// Parameters for FIND_GAME request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindGameParams {
    pub code: String,
}

/// Result for GET_GAME and FIND_GAME responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshotResult {
    pub version: u64,
    pub game: Value,
}

/// Parameters for SUBMIT_SET_CLIP and SUBMIT_RESPONSE_CLIP requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitClipParams {
    pub game_id: String,
    /// Storage path of the uploaded clip.
    pub clip: String,
}

/// Parameters for JUDGE_SET and JUDGE_RESPONSE requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeParams {
    pub game_id: String,
    pub approve: bool,
}

/// Result for gameplay responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub game_id: String,
    pub phase: String,
    pub turn: String,
    #[serde(default)]
    pub winner: Option<String>,
    pub version: u64,
    pub event: String,
}

// ============================================================================
// Watch/Streaming parameter and result types
// ============================================================================

/// Parameters for WATCH_GAME request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchGameParams {
    pub game_id: String,
}

/// Result for WATCH_GAME response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchGameResult {
    pub subscription_id: String,
    pub game_id: String,
    /// Version of the snapshot below; events continue from here.
    pub version: u64,
    pub game: Value,
}

/// Parameters for UNWATCH request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnwatchParams {
    pub subscription_id: String,
}

/// Result for UNWATCH response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnwatchResult {
    pub subscription_id: String,
    pub removed: bool,
}
