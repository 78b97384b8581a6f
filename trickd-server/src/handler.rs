//! Command handlers.

use crate::auth::{IdentityProvider, TrustedIdentities};
use crate::broadcast::{GameUpdate, UpdateBroadcaster};
use crate::error::ServerError;
use crate::metrics::Metrics;
use crate::session::{Session, SessionState};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use trickd_core::{Commit, Game, GameEngine, GameError, Versioned};
use trickd_protocol::message::*;
use trickd_protocol::{ErrorCode, PROTOCOL_VERSION};

/// Server identity advertised by HELLO and INFO.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub features: Vec<String>,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "trickd".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            features: vec!["watch".to_string(), "rate_limits".to_string()],
        }
    }
}

/// A live WATCH_GAME subscription handed to the connection loop.
pub struct WatchSubscription {
    pub subscription_id: String,
    pub game_id: String,
    /// Version of the snapshot returned to the client. Updates at or below
    /// it are already reflected there.
    pub snapshot_version: u64,
    pub receiver: broadcast::Receiver<GameUpdate>,
}

/// Successful result plus the game version it reflects, if any.
struct Reply {
    value: Value,
    game_version: Option<u64>,
}

impl Reply {
    fn plain(value: Value) -> Self {
        Self {
            value,
            game_version: None,
        }
    }

    fn versioned(value: Value, version: u64) -> Self {
        Self {
            value,
            game_version: Some(version),
        }
    }
}

/// Command handler.
pub struct CommandHandler {
    engine: Arc<GameEngine>,
    identities: Arc<dyn IdentityProvider>,
    auth_required: bool,
    info: ServerInfo,
    /// Update broadcaster for watch subscriptions.
    broadcaster: Option<Arc<UpdateBroadcaster>>,
    /// Metrics for request tracking.
    metrics: Option<Arc<Metrics>>,
}

impl CommandHandler {
    /// Creates a handler that trusts any non-empty bearer token.
    pub fn new(engine: Arc<GameEngine>) -> Self {
        Self {
            engine,
            identities: Arc::new(TrustedIdentities),
            auth_required: false,
            info: ServerInfo::default(),
            broadcaster: None,
            metrics: None,
        }
    }

    /// Sets how bearer tokens are resolved to players.
    pub fn with_identities(
        mut self,
        identities: Arc<dyn IdentityProvider>,
        required: bool,
    ) -> Self {
        self.identities = identities;
        self.auth_required = required;
        self
    }

    pub fn with_info(mut self, info: ServerInfo) -> Self {
        self.info = info;
        self
    }

    /// Sets the update broadcaster for watch subscriptions.
    pub fn with_broadcaster(mut self, broadcaster: Arc<UpdateBroadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn engine(&self) -> &Arc<GameEngine> {
        &self.engine
    }

    /// Returns a reference to the broadcaster, if set.
    pub fn broadcaster(&self) -> Option<&Arc<UpdateBroadcaster>> {
        self.broadcaster.as_ref()
    }

    /// Returns a reference to the metrics, if set.
    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Updates gauge metrics from current engine state.
    pub fn update_gauge_metrics(&self) {
        if let Some(ref metrics) = self.metrics {
            metrics.update_engine_stats(self.engine.stats(), self.engine.game_count());
            if let Some(ref broadcaster) = self.broadcaster {
                metrics
                    .subscriptions_active
                    .set(broadcaster.subscription_count() as f64);
            }
        }
    }

    /// Handles a request and returns a response.
    pub fn handle(&self, session: &mut Session, request: &Request) -> Response {
        self.instrumented(session, request, |this, session| {
            this.dispatch(session, request)
        })
    }

    /// Handles WATCH_GAME, returning the subscription to forward on success.
    pub fn handle_watch_game(
        &self,
        session: &mut Session,
        request: &Request,
    ) -> (Response, Option<WatchSubscription>) {
        let mut subscription = None;
        let response = self.instrumented(session, request, |this, session| {
            let (reply, watch) = this.watch_game(session, &request.params)?;
            subscription = Some(watch);
            Ok(reply)
        });
        (response, subscription)
    }

    fn instrumented<F>(&self, session: &mut Session, request: &Request, f: F) -> Response
    where
        F: FnOnce(&Self, &mut Session) -> Result<Reply, ServerError>,
    {
        session.record_request();

        let op_name = request.op.as_str();

        // Start timing for metrics
        let timer = self.metrics.as_ref().map(|m| {
            m.request_duration
                .with_label_values(&[op_name])
                .start_timer()
        });

        let result = f(self, session);

        if let Some(ref metrics) = self.metrics {
            metrics.requests_total.with_label_values(&[op_name]).inc();
            if let Err(ref e) = result {
                metrics
                    .errors_total
                    .with_label_values(&[e.error_code().as_str()])
                    .inc();
            }
        }
        drop(timer); // Observation happens on drop
        self.update_gauge_metrics();

        match result {
            Ok(reply) => Response::ok(&request.id, reply.value).with_meta(ResponseMeta {
                server_time: Some(Utc::now()),
                game_version: reply.game_version,
            }),
            Err(e) => {
                tracing::debug!(
                    session = %session.id,
                    op = op_name,
                    code = e.error_code().as_str(),
                    "request rejected"
                );
                Response::error(&request.id, Self::error_response(&e))
            }
        }
    }

    fn dispatch(&self, session: &mut Session, request: &Request) -> Result<Reply, ServerError> {
        let params = &request.params;
        match request.op {
            Operation::Hello => self.handle_hello(session, params),
            Operation::Auth => self.handle_auth(session, params),
            Operation::Ping => Ok(Reply::plain(json!({ "pong": true }))),
            Operation::Bye => {
                session.set_state(SessionState::Closing);
                Ok(Reply::plain(json!({})))
            }
            Operation::Info => self.handle_info(),
            Operation::CreateGame => {
                let p: CreateGameParams = parse_params(params)?;
                let commit = self.engine.create_game(&session.actor_context(), &p.name)?;
                self.game_ref_reply(commit)
            }
            Operation::JoinGame => {
                let p: JoinGameParams = parse_params(params)?;
                let commit = self
                    .engine
                    .join_game(&session.actor_context(), &p.code, &p.name)?;
                self.game_ref_reply(commit)
            }
            Operation::GetGame => {
                let p: GameIdParams = parse_params(params)?;
                let record = self.engine.get_game(&session.actor_context(), &p.game_id)?;
                snapshot_reply(&record)
            }
            Operation::FindGame => {
                let p: FindGameParams = parse_params(params)?;
                let record = self.engine.find_game(&session.actor_context(), &p.code)?;
                snapshot_reply(&record)
            }
            Operation::SubmitSetClip => {
                let p: SubmitClipParams = parse_params(params)?;
                let commit =
                    self.engine
                        .submit_set_clip(&session.actor_context(), &p.game_id, &p.clip)?;
                self.action_reply(commit)
            }
            Operation::SubmitResponseClip => {
                let p: SubmitClipParams = parse_params(params)?;
                let commit = self.engine.submit_response_clip(
                    &session.actor_context(),
                    &p.game_id,
                    &p.clip,
                )?;
                self.action_reply(commit)
            }
            Operation::JudgeSet => {
                let p: JudgeParams = parse_params(params)?;
                let commit = self
                    .engine
                    .judge_set(&session.actor_context(), &p.game_id, p.approve)?;
                self.action_reply(commit)
            }
            Operation::JudgeResponse => {
                let p: JudgeParams = parse_params(params)?;
                let commit =
                    self.engine
                        .judge_response(&session.actor_context(), &p.game_id, p.approve)?;
                self.action_reply(commit)
            }
            Operation::SelfFailSet => {
                let p: GameIdParams = parse_params(params)?;
                let commit = self
                    .engine
                    .self_fail_set(&session.actor_context(), &p.game_id)?;
                self.action_reply(commit)
            }
            Operation::SelfFailResponse => {
                let p: GameIdParams = parse_params(params)?;
                let commit = self
                    .engine
                    .self_fail_response(&session.actor_context(), &p.game_id)?;
                self.action_reply(commit)
            }
            // Needs the connection loop to forward updates.
            Operation::WatchGame => Err(ServerError::InvalidRequest(
                "WATCH_GAME requires a streaming connection".to_string(),
            )),
            Operation::Unwatch => self.handle_unwatch(session, params),
        }
    }

    fn handle_hello(&self, session: &mut Session, params: &Value) -> Result<Reply, ServerError> {
        let p: HelloParams = parse_params(params)?;
        if p.protocol_version != PROTOCOL_VERSION {
            return Err(ServerError::UnsupportedProtocol(p.protocol_version));
        }

        session.complete_handshake(p.protocol_version, p.client_name);
        tracing::debug!(
            session = %session.id,
            client = session.client_name().unwrap_or("-"),
            "handshake complete"
        );

        let result = HelloResult {
            protocol_version: PROTOCOL_VERSION,
            server_name: self.info.name.clone(),
            server_version: self.info.version.clone(),
            features: self.info.features.clone(),
        };
        Ok(Reply::plain(serde_json::to_value(result)?))
    }

    fn handle_auth(&self, session: &mut Session, params: &Value) -> Result<Reply, ServerError> {
        let p: AuthParams = parse_params(params)?;
        if !p.method.eq_ignore_ascii_case("bearer") {
            return Err(ServerError::AuthFailed(format!(
                "unsupported auth method: {}",
                p.method
            )));
        }

        let uid = self
            .identities
            .resolve(&p.token)
            .ok_or_else(|| ServerError::AuthFailed("invalid token".to_string()))?;

        tracing::info!(session = %session.id, uid = %uid, "session authenticated");
        session.authenticate(uid.clone());

        let result = AuthResult {
            authenticated: true,
            uid,
        };
        Ok(Reply::plain(serde_json::to_value(result)?))
    }

    fn handle_info(&self) -> Result<Reply, ServerError> {
        let result = InfoResult {
            server_name: self.info.name.clone(),
            server_version: self.info.version.clone(),
            protocol_version: PROTOCOL_VERSION,
            games: self.engine.game_count() as u64,
            auth_required: self.auth_required,
            allowed_clip_extensions: self
                .engine
                .config()
                .clip_policy
                .allowed_extensions()
                .to_vec(),
        };
        Ok(Reply::plain(serde_json::to_value(result)?))
    }

    fn watch_game(
        &self,
        session: &mut Session,
        params: &Value,
    ) -> Result<(Reply, WatchSubscription), ServerError> {
        let p: WatchGameParams = parse_params(params)?;
        let broadcaster = self
            .broadcaster
            .as_ref()
            .ok_or_else(|| ServerError::InvalidRequest("watching is not enabled".to_string()))?;
        let ctx = session.actor_context();
        if ctx.uid.is_none() {
            return Err(GameError::Unauthenticated.into());
        }

        // Subscribe before reading so no commit falls between the two.
        let (subscription_id, receiver) = broadcaster.subscribe(&p.game_id);
        let record = match self.engine.get_game(&ctx, &p.game_id) {
            Ok(record) => record,
            Err(e) => {
                broadcaster.unsubscribe(&subscription_id);
                return Err(e.into());
            }
        };

        session.add_subscription(subscription_id.clone(), p.game_id.clone());
        tracing::debug!(
            session = %session.id,
            subscription_id = %subscription_id,
            game_id = %p.game_id,
            "watching game"
        );

        let result = WatchGameResult {
            subscription_id: subscription_id.clone(),
            game_id: p.game_id.clone(),
            version: record.version,
            game: serde_json::to_value(&record.value)?,
        };
        let watch = WatchSubscription {
            subscription_id,
            game_id: p.game_id,
            snapshot_version: record.version,
            receiver,
        };
        Ok((
            Reply::versioned(serde_json::to_value(result)?, record.version),
            watch,
        ))
    }

    fn handle_unwatch(&self, session: &mut Session, params: &Value) -> Result<Reply, ServerError> {
        let p: UnwatchParams = parse_params(params)?;

        // Only the session's own subscriptions can be cancelled.
        let removed = session.remove_subscription(&p.subscription_id).is_some();
        if removed {
            if let Some(ref broadcaster) = self.broadcaster {
                broadcaster.unsubscribe(&p.subscription_id);
            }
        }

        let result = UnwatchResult {
            subscription_id: p.subscription_id,
            removed,
        };
        Ok(Reply::plain(serde_json::to_value(result)?))
    }

    fn publish(&self, commit: &Commit) {
        if let Some(ref broadcaster) = self.broadcaster {
            let delivered = broadcaster.notify(commit);
            if delivered > 0 {
                tracing::debug!(
                    game_id = %commit.game().id,
                    version = commit.record.version,
                    delivered,
                    "published game update"
                );
            }
        }
    }

    fn game_ref_reply(&self, commit: Commit) -> Result<Reply, ServerError> {
        self.publish(&commit);
        let game_ref = commit.game_ref();
        let result = GameRefResult {
            game_id: game_ref.game_id,
            code: game_ref.code.to_string(),
        };
        Ok(Reply::versioned(
            serde_json::to_value(result)?,
            commit.record.version,
        ))
    }

    fn action_reply(&self, commit: Commit) -> Result<Reply, ServerError> {
        self.publish(&commit);
        let outcome = commit.outcome();
        let result = ActionResult {
            game_id: outcome.game_id,
            phase: outcome.phase.as_str().to_string(),
            turn: outcome.turn.as_str().to_string(),
            winner: outcome.winner.map(|w| w.as_str().to_string()),
            version: outcome.version,
            event: outcome.event.as_str().to_string(),
        };
        Ok(Reply::versioned(serde_json::to_value(result)?, outcome.version))
    }

    /// Builds the wire error for `e`.
    pub fn error_response(e: &ServerError) -> ResponseError {
        let error = ResponseError::new(e.error_code(), e.client_message());
        match e {
            ServerError::Game(GameError::RateLimited { retry_after_secs }) => {
                error.with_detail("retry_after_secs", *retry_after_secs)
            }
            ServerError::UnsupportedProtocol(_) => {
                error.with_detail("supported_version", PROTOCOL_VERSION)
            }
            _ => error,
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, ServerError> {
    serde_json::from_value(params.clone()).map_err(|e| ServerError::InvalidRequest(e.to_string()))
}

fn snapshot_reply(record: &Versioned<Game>) -> Result<Reply, ServerError> {
    let result = GameSnapshotResult {
        version: record.version,
        game: serde_json::to_value(&record.value)?,
    };
    Ok(Reply::versioned(serde_json::to_value(result)?, record.version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenIdentities;
    use std::net::SocketAddr;
    use trickd_core::{FixedWindowLimiter, MemoryStore, RateLimitRule};

    fn handler() -> CommandHandler {
        let engine = Arc::new(GameEngine::new(Arc::new(MemoryStore::new())));
        CommandHandler::new(engine).with_broadcaster(Arc::new(UpdateBroadcaster::default()))
    }

    fn session(port: u16) -> Session {
        Session::new(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    fn request(op: Operation, params: Value) -> Request {
        Request::new("1", op).with_params(params)
    }

    fn authed(handler: &CommandHandler, uid: &str, port: u16) -> Session {
        let mut s = session(port);
        let resp = handler.handle(
            &mut s,
            &request(Operation::Auth, json!({"method": "bearer", "token": uid})),
        );
        assert!(resp.is_ok());
        s
    }

    fn ok(resp: Response) -> Value {
        assert!(resp.is_ok(), "unexpected error: {:?}", resp.error);
        resp.result.unwrap()
    }

    fn code(resp: &Response) -> ErrorCode {
        resp.error.as_ref().unwrap().code
    }

    /// Creates a game by `a`, joined by `b`. Returns the game id.
    fn started(handler: &CommandHandler, a: &mut Session, b: &mut Session) -> String {
        let created = ok(handler.handle(
            a,
            &request(Operation::CreateGame, json!({"name": "Alice"})),
        ));
        let game_id = created["game_id"].as_str().unwrap().to_string();
        let code = created["code"].as_str().unwrap().to_string();
        ok(handler.handle(
            b,
            &request(Operation::JoinGame, json!({"code": code, "name": "Bob"})),
        ));
        game_id
    }

    #[test]
    fn test_hello() {
        let h = handler();
        let mut s = session(1);
        let result = ok(h.handle(
            &mut s,
            &request(Operation::Hello, json!({"protocol_version": 1, "client_name": "cli"})),
        ));
        assert_eq!(result["server_name"], "trickd");
        assert_eq!(s.state(), SessionState::Ready);

        let resp = h.handle(&mut s, &request(Operation::Hello, json!({"protocol_version": 9})));
        assert_eq!(code(&resp), ErrorCode::UnsupportedProtocol);
        assert_eq!(resp.error.unwrap().details["supported_version"], 1);
    }

    #[test]
    fn test_game_ops_require_auth() {
        let h = handler();
        let mut s = session(1);
        let resp = h.handle(&mut s, &request(Operation::CreateGame, json!({"name": "Alice"})));
        assert_eq!(code(&resp), ErrorCode::Unauthenticated);

        let resp = h.handle(&mut s, &request(Operation::WatchGame, json!({"game_id": "g"})));
        assert_eq!(code(&resp), ErrorCode::BadRequest);
        let (resp, sub) =
            h.handle_watch_game(&mut s, &request(Operation::WatchGame, json!({"game_id": "g"})));
        assert_eq!(code(&resp), ErrorCode::Unauthenticated);
        assert!(sub.is_none());
    }

    #[test]
    fn test_auth_with_token_identities() {
        let engine = Arc::new(GameEngine::new(Arc::new(MemoryStore::new())));
        let identities = TokenIdentities::new([(
            "alice".to_string(),
            TokenIdentities::hash_token("s3cret"),
        )]);
        let h = CommandHandler::new(engine).with_identities(Arc::new(identities), true);
        let mut s = session(1);

        let resp = h.handle(
            &mut s,
            &request(Operation::Auth, json!({"method": "bearer", "token": "wrong"})),
        );
        assert_eq!(code(&resp), ErrorCode::AuthFailed);
        assert!(!s.is_authenticated());

        let resp = h.handle(
            &mut s,
            &request(Operation::Auth, json!({"method": "basic", "token": "s3cret"})),
        );
        assert_eq!(code(&resp), ErrorCode::AuthFailed);

        let result = ok(h.handle(
            &mut s,
            &request(Operation::Auth, json!({"method": "bearer", "token": "s3cret"})),
        ));
        assert_eq!(result["uid"], "alice");
        assert_eq!(s.actor(), Some("alice"));

        let info = ok(h.handle(&mut s, &request(Operation::Info, Value::Null)));
        assert_eq!(info["auth_required"], true);
    }

    #[test]
    fn test_full_round_over_handler() {
        let h = handler();
        let mut a = authed(&h, "alice", 1);
        let mut b = authed(&h, "bob", 2);
        let game_id = started(&h, &mut a, &mut b);

        let clip = format!("games/{}/set/kickflip.mp4", game_id);
        let result = ok(h.handle(
            &mut a,
            &request(Operation::SubmitSetClip, json!({"game_id": game_id, "clip": clip})),
        ));
        assert_eq!(result["phase"], "SET_JUDGE");
        assert_eq!(result["event"], "set_submitted");

        let resp = h.handle(
            &mut a,
            &request(Operation::JudgeSet, json!({"game_id": game_id, "approve": true})),
        );
        assert_eq!(code(&resp), ErrorCode::WrongRole);

        let resp = h.handle(
            &mut b,
            &request(Operation::JudgeSet, json!({"game_id": game_id, "approve": true})),
        );
        assert_eq!(resp.meta.game_version, Some(4));
        assert_eq!(ok(resp)["phase"], "RESP_RECORD");

        let result = ok(h.handle(
            &mut b,
            &request(Operation::SelfFailResponse, json!({"game_id": game_id})),
        ));
        assert_eq!(result["phase"], "SET_RECORD");
        assert_eq!(result["turn"], "B");
        assert_eq!(result["winner"], Value::Null);

        let snapshot = ok(h.handle(
            &mut b,
            &request(Operation::GetGame, json!({"game_id": game_id})),
        ));
        assert_eq!(snapshot["version"], 5);
        assert_eq!(snapshot["game"]["players"]["B"]["letters"], "S");
        assert_eq!(snapshot["game"]["history"][0]["result"], "failed");
    }

    #[test]
    fn test_bad_params() {
        let h = handler();
        let mut a = authed(&h, "alice", 1);
        let resp = h.handle(&mut a, &request(Operation::CreateGame, json!({"nom": "x"})));
        assert_eq!(code(&resp), ErrorCode::BadRequest);
        let resp = h.handle(&mut a, &request(Operation::JudgeSet, Value::Null));
        assert_eq!(code(&resp), ErrorCode::BadRequest);
        let resp = h.handle(&mut a, &request(Operation::CreateGame, json!({"name": "  "})));
        assert_eq!(code(&resp), ErrorCode::InvalidInput);
    }

    #[test]
    fn test_rate_limited_reply_carries_retry_after() {
        let limiter = FixedWindowLimiter::new(RateLimitRule::new(60, 1));
        let engine = Arc::new(
            GameEngine::new(Arc::new(MemoryStore::new())).with_rate_limiter(Arc::new(limiter)),
        );
        let h = CommandHandler::new(engine);
        let mut a = authed(&h, "alice", 1);

        ok(h.handle(&mut a, &request(Operation::CreateGame, json!({"name": "Alice"}))));
        let resp = h.handle(&mut a, &request(Operation::CreateGame, json!({"name": "Alice"})));
        let error = resp.error.unwrap();
        assert_eq!(error.code, ErrorCode::RateLimited);
        assert!(error.retryable);
        assert!(error.details["retry_after_secs"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_watch_receives_commits() {
        let h = handler();
        let mut a = authed(&h, "alice", 1);
        let mut b = authed(&h, "bob", 2);
        let mut watcher = authed(&h, "carol", 3);
        let game_id = started(&h, &mut a, &mut b);

        let (resp, sub) = h.handle_watch_game(
            &mut watcher,
            &request(Operation::WatchGame, json!({"game_id": game_id})),
        );
        let result = ok(resp);
        let mut sub = sub.unwrap();
        assert_eq!(sub.snapshot_version, 2);
        assert_eq!(result["game"]["phase"], "SET_RECORD");
        assert_eq!(watcher.subscription_count(), 1);

        ok(h.handle(&mut a, &request(Operation::SelfFailSet, json!({"game_id": game_id}))));
        let update = sub.receiver.recv().await.unwrap();
        assert_eq!(update.record.version, 3);
        assert_eq!(update.event.as_str(), "set_failed");
        assert_eq!(update.game_id(), game_id);

        let unwatch = request(
            Operation::Unwatch,
            json!({"subscription_id": sub.subscription_id}),
        );
        // Other sessions cannot cancel it.
        assert_eq!(ok(h.handle(&mut a, &unwatch))["removed"], false);
        assert_eq!(ok(h.handle(&mut watcher, &unwatch))["removed"], true);
        assert!(!h.broadcaster().unwrap().is_subscribed(&sub.subscription_id));
    }

    #[test]
    fn test_watch_missing_game() {
        let h = handler();
        let mut s = authed(&h, "alice", 1);
        let (resp, sub) = h.handle_watch_game(
            &mut s,
            &request(Operation::WatchGame, json!({"game_id": "missing"})),
        );
        assert_eq!(code(&resp), ErrorCode::NotFound);
        assert!(sub.is_none());
        assert_eq!(h.broadcaster().unwrap().subscription_count(), 0);
        assert_eq!(s.subscription_count(), 0);
    }

    #[test]
    fn test_metrics_recorded() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let h = handler().with_metrics(metrics.clone());
        let mut s = session(1);
        h.handle(&mut s, &request(Operation::Ping, Value::Null));
        h.handle(&mut s, &request(Operation::CreateGame, json!({"name": "Alice"})));

        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains(r#"trickd_requests_total{operation="PING"} 1"#));
        assert!(text.contains(r#"trickd_errors_total{code="UNAUTHENTICATED"} 1"#));
        assert!(text.contains("trickd_engine_rejections 1"));
    }

    #[test]
    fn test_bye_closes_session() {
        let h = handler();
        let mut s = session(1);
        ok(h.handle(&mut s, &request(Operation::Bye, Value::Null)));
        assert_eq!(s.state(), SessionState::Closing);
    }
}
