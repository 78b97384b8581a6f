//! Game engine - admits requests, runs transitions and commits them.

use crate::action::{Action, ClipKind};
use crate::error::GameError;
use crate::game::{Game, Phase, PlayerSlot};
use crate::machine::{transition, GameEvent};
use crate::ratelimit::{NoLimits, RateLimiter};
use crate::store::{GameStore, StoreError, Versioned};
use crate::validate::{ClipPolicy, JoinCode, PlayerName};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Operation names used for rate limiting and logs.
pub mod ops {
    pub const CREATE_GAME: &str = "create_game";
    pub const JOIN_GAME: &str = "join_game";
    pub const GET_GAME: &str = "get_game";
    pub const FIND_GAME: &str = "find_game";
    pub const SUBMIT_SET_CLIP: &str = "submit_set_clip";
    pub const JUDGE_SET: &str = "judge_set";
    pub const SUBMIT_RESPONSE_CLIP: &str = "submit_response_clip";
    pub const JUDGE_RESPONSE: &str = "judge_response";
    pub const SELF_FAIL_SET: &str = "self_fail_set";
    pub const SELF_FAIL_RESPONSE: &str = "self_fail_response";
}

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Load-transition-CAS rounds before giving up with `Contention`.
    pub max_commit_attempts: u32,
    /// Join codes drawn before `create_game` gives up.
    pub max_code_attempts: u32,
    pub clip_policy: ClipPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: 5,
            max_code_attempts: 10,
            clip_policy: ClipPolicy::default(),
        }
    }
}

/// Who is asking, as far as the transport knows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorContext {
    /// Authenticated identity, if any.
    pub uid: Option<String>,
    /// Network origin (usually the peer IP), used for rate limiting.
    pub origin: Option<String>,
}

impl ActorContext {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            origin: None,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// Result of create/join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRef {
    pub game_id: String,
    pub code: JoinCode,
}

/// Result of a gameplay action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub game_id: String,
    pub phase: Phase,
    pub turn: PlayerSlot,
    pub winner: Option<PlayerSlot>,
    pub version: u64,
    pub event: GameEvent,
}

/// A committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub record: Versioned<Game>,
    pub event: GameEvent,
}

impl Commit {
    pub fn game(&self) -> &Game {
        &self.record.value
    }

    pub fn game_ref(&self) -> GameRef {
        GameRef {
            game_id: self.record.value.id.clone(),
            code: self.record.value.code.clone(),
        }
    }

    pub fn outcome(&self) -> ActionOutcome {
        let game = &self.record.value;
        ActionOutcome {
            game_id: game.id.clone(),
            phase: game.phase,
            turn: game.turn,
            winner: game.winner,
            version: self.record.version,
            event: self.event,
        }
    }
}

/// Engine counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    commits: AtomicU64,
    rejections: AtomicU64,
    conflicts: AtomicU64,
    games_created: AtomicU64,
}

impl EngineStats {
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    pub fn games_created(&self) -> u64 {
        self.games_created.load(Ordering::Relaxed)
    }
}

/// The transactional applier.
///
/// Every write is load, pure transition, then compare-and-swap against the
/// version that was loaded. A lost race re-runs the transition on a fresh
/// snapshot; a rejection aborts without writing.
pub struct GameEngine {
    store: Arc<dyn GameStore>,
    limiter: Arc<dyn RateLimiter>,
    config: EngineConfig,
    stats: EngineStats,
}

impl GameEngine {
    /// Creates an engine with no rate limits and default settings.
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        Self {
            store,
            limiter: Arc::new(NoLimits),
            config: EngineConfig::default(),
            stats: EngineStats::default(),
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Number of stored games.
    pub fn game_count(&self) -> usize {
        self.store.len()
    }

    /// Starts a game with the caller in seat A.
    pub fn create_game(&self, ctx: &ActorContext, name: &str) -> Result<Commit, GameError> {
        self.run(ops::CREATE_GAME, || {
            let uid = self.admit(ctx, ops::CREATE_GAME)?;
            let name = PlayerName::parse(name)?;

            for attempt in 1..=self.config.max_code_attempts {
                let game = Game::create(
                    uuid::Uuid::new_v4().to_string(),
                    JoinCode::random(),
                    uid,
                    name.clone(),
                    Utc::now(),
                );
                match self.store.insert(game) {
                    Ok(record) => {
                        self.stats.commits.fetch_add(1, Ordering::Relaxed);
                        self.stats.games_created.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(
                            game_id = %record.value.id,
                            code = %record.value.code,
                            "game created"
                        );
                        return Ok(Commit {
                            record,
                            event: GameEvent::GameCreated,
                        });
                    }
                    Err(StoreError::CodeTaken(code)) => {
                        tracing::debug!(attempt, code = %code, "join code collision");
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            Err(GameError::internal(format!(
                "no free join code after {} attempts",
                self.config.max_code_attempts
            )))
        })
    }

    /// Takes seat B of the game holding `code`.
    pub fn join_game(
        &self,
        ctx: &ActorContext,
        code: &str,
        name: &str,
    ) -> Result<Commit, GameError> {
        self.run(ops::JOIN_GAME, || {
            let uid = self.admit(ctx, ops::JOIN_GAME)?;
            let code = JoinCode::parse(code)?;
            let name = PlayerName::parse(name)?;
            let game_id = self
                .store
                .find_by_code(&code)
                .map(|r| r.value.id)
                .ok_or_else(|| GameError::NotFound(code.to_string()))?;
            self.commit(uid, &game_id, &Action::Join { name })
        })
    }

    pub fn submit_set_clip(
        &self,
        ctx: &ActorContext,
        game_id: &str,
        clip: &str,
    ) -> Result<Commit, GameError> {
        self.submit_clip(ctx, ops::SUBMIT_SET_CLIP, ClipKind::Set, game_id, clip)
    }

    pub fn submit_response_clip(
        &self,
        ctx: &ActorContext,
        game_id: &str,
        clip: &str,
    ) -> Result<Commit, GameError> {
        self.submit_clip(
            ctx,
            ops::SUBMIT_RESPONSE_CLIP,
            ClipKind::Response,
            game_id,
            clip,
        )
    }

    fn submit_clip(
        &self,
        ctx: &ActorContext,
        op: &'static str,
        kind: ClipKind,
        game_id: &str,
        clip: &str,
    ) -> Result<Commit, GameError> {
        self.run(op, || {
            let uid = self.admit(ctx, op)?;
            let clip = self.config.clip_policy.validate(game_id, kind, clip)?;
            self.commit(uid, game_id, &Action::SubmitClip { kind, clip })
        })
    }

    pub fn judge_set(
        &self,
        ctx: &ActorContext,
        game_id: &str,
        approve: bool,
    ) -> Result<Commit, GameError> {
        self.act(ctx, ops::JUDGE_SET, game_id, Action::JudgeSet { approve })
    }

    pub fn judge_response(
        &self,
        ctx: &ActorContext,
        game_id: &str,
        approve: bool,
    ) -> Result<Commit, GameError> {
        self.act(
            ctx,
            ops::JUDGE_RESPONSE,
            game_id,
            Action::JudgeResponse { approve },
        )
    }

    pub fn self_fail_set(&self, ctx: &ActorContext, game_id: &str) -> Result<Commit, GameError> {
        self.act(
            ctx,
            ops::SELF_FAIL_SET,
            game_id,
            Action::SelfFail {
                kind: ClipKind::Set,
            },
        )
    }

    pub fn self_fail_response(
        &self,
        ctx: &ActorContext,
        game_id: &str,
    ) -> Result<Commit, GameError> {
        self.act(
            ctx,
            ops::SELF_FAIL_RESPONSE,
            game_id,
            Action::SelfFail {
                kind: ClipKind::Response,
            },
        )
    }

    /// Reads a game by id. Any authenticated caller may read.
    pub fn get_game(
        &self,
        ctx: &ActorContext,
        game_id: &str,
    ) -> Result<Versioned<Game>, GameError> {
        self.run(ops::GET_GAME, || {
            self.admit(ctx, ops::GET_GAME)?;
            self.store
                .get(game_id)
                .ok_or_else(|| GameError::NotFound(game_id.to_string()))
        })
    }

    /// Reads the unfinished game holding `code`.
    pub fn find_game(&self, ctx: &ActorContext, code: &str) -> Result<Versioned<Game>, GameError> {
        self.run(ops::FIND_GAME, || {
            self.admit(ctx, ops::FIND_GAME)?;
            let code = JoinCode::parse(code)?;
            self.store
                .find_by_code(&code)
                .ok_or_else(|| GameError::NotFound(code.to_string()))
        })
    }

    fn act(
        &self,
        ctx: &ActorContext,
        op: &'static str,
        game_id: &str,
        action: Action,
    ) -> Result<Commit, GameError> {
        self.run(op, || {
            let uid = self.admit(ctx, op)?;
            self.commit(uid, game_id, &action)
        })
    }

    /// Requires an identity, then charges the identity and the origin
    /// together: a request refused for either key charges neither.
    fn admit<'a>(&self, ctx: &'a ActorContext, op: &str) -> Result<&'a str, GameError> {
        let uid = ctx
            .uid
            .as_deref()
            .filter(|uid| !uid.is_empty())
            .ok_or(GameError::Unauthenticated)?;
        let mut keys = vec![format!("uid:{}", uid)];
        if let Some(origin) = ctx.origin.as_deref() {
            keys.push(format!("ip:{}", origin));
        }
        self.limiter.check_all(op, &keys)?;
        Ok(uid)
    }

    fn commit(&self, actor: &str, game_id: &str, action: &Action) -> Result<Commit, GameError> {
        for attempt in 1..=self.config.max_commit_attempts {
            let current = self
                .store
                .get(game_id)
                .ok_or_else(|| GameError::NotFound(game_id.to_string()))?;

            let next = transition(&current.value, action, actor, Utc::now())?;

            match self.store.compare_and_swap(current.version, next.game) {
                Ok(record) => {
                    self.stats.commits.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        game_id,
                        version = record.version,
                        event = next.event.as_str(),
                        phase = %record.value.phase,
                        "committed"
                    );
                    return Ok(Commit {
                        record,
                        event: next.event,
                    });
                }
                Err(StoreError::Conflict { expected, actual }) => {
                    self.stats.conflicts.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        game_id,
                        attempt,
                        expected,
                        actual,
                        "version conflict, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(GameError::Contention)
    }

    fn run<T>(
        &self,
        op: &'static str,
        f: impl FnOnce() -> Result<T, GameError>,
    ) -> Result<T, GameError> {
        let result = f();
        if let Err(e) = &result {
            self.stats.rejections.fetch_add(1, Ordering::Relaxed);
            match e {
                GameError::Internal(reason) => {
                    tracing::error!(op, reason = %reason, "operation failed")
                }
                _ => tracing::debug!(op, code = e.error_code(), error = %e, "operation rejected"),
            }
        }
        result
    }
}
