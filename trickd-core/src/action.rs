//! Player intents accepted by the transition function.

use crate::validate::{ClipRef, PlayerName};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which half of a round a clip belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipKind {
    Set,
    Response,
}

impl ClipKind {
    /// Path segment used for this kind under a game's clip namespace.
    pub fn as_str(self) -> &'static str {
        match self {
            ClipKind::Set => "set",
            ClipKind::Response => "response",
        }
    }
}

impl fmt::Display for ClipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A gameplay action. Game creation is not an action; see `Game::create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Take the empty B slot.
    Join { name: PlayerName },
    /// Attach a set or response clip to the current attempt.
    SubmitClip { kind: ClipKind, clip: ClipRef },
    /// Opponent approves or declines the set clip.
    JudgeSet { approve: bool },
    /// Setter rules the response landed or failed.
    JudgeResponse { approve: bool },
    /// Give up the current set or response without a clip.
    SelfFail { kind: ClipKind },
}

impl Action {
    /// Short description used in error messages and logs.
    pub fn describe(&self) -> &'static str {
        match self {
            Action::Join { .. } => "join",
            Action::SubmitClip {
                kind: ClipKind::Set,
                ..
            } => "submit a set clip",
            Action::SubmitClip {
                kind: ClipKind::Response,
                ..
            } => "submit a response clip",
            Action::JudgeSet { .. } => "judge a set",
            Action::JudgeResponse { .. } => "judge a response",
            Action::SelfFail {
                kind: ClipKind::Set,
            } => "self-fail a set",
            Action::SelfFail {
                kind: ClipKind::Response,
            } => "self-fail a response",
        }
    }
}
