//! # trickd-core
//!
//! Game rules for trickd.
//!
//! This crate provides:
//! - The game data model and penalty letters
//! - Validation of names, join codes and clip references
//! - The pure transition function
//! - Optimistic game storage and rate limiting
//! - The transactional game engine

pub mod action;
pub mod engine;
pub mod error;
pub mod game;
pub mod letters;
pub mod machine;
pub mod ratelimit;
pub mod store;
pub mod validate;

pub use action::{Action, ClipKind};
pub use engine::{ActionOutcome, ActorContext, Commit, EngineConfig, EngineStats, GameEngine, GameRef};
pub use error::GameError;
pub use game::{
    CurrentAttempt, Game, History, HistoryEntry, Phase, Player, PlayerSlot, Players, RoundResult,
};
pub use letters::{next_letters, Letters, PENALTY_WORD};
pub use machine::{transition, GameEvent, Transition};
pub use ratelimit::{FixedWindowLimiter, NoLimits, RateLimitRule, RateLimiter};
pub use store::{GameStore, MemoryStore, StoreError, Versioned};
pub use validate::{ClipPolicy, ClipRef, JoinCode, PlayerName};
