//! Game aggregate.

use crate::error::GameError;
use crate::letters::Letters;
use crate::validate::{ClipRef, JoinCode, PlayerName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two seats in a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerSlot {
    A,
    B,
}

impl PlayerSlot {
    pub fn opponent(self) -> PlayerSlot {
        match self {
            PlayerSlot::A => PlayerSlot::B,
            PlayerSlot::B => PlayerSlot::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlayerSlot::A => "A",
            PlayerSlot::B => "B",
        }
    }
}

impl fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Setter records a trick.
    SetRecord,
    /// Opponent judges the set clip.
    SetJudge,
    /// Responder records an attempt at the same trick.
    RespRecord,
    /// Setter judges the response.
    RespJudge,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::SetRecord => "SET_RECORD",
            Phase::SetJudge => "SET_JUDGE",
            Phase::RespRecord => "RESP_RECORD",
            Phase::RespJudge => "RESP_JUDGE",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A seated player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Stable external identity.
    pub uid: String,
    pub name: PlayerName,
    pub letters: Letters,
}

impl Player {
    pub fn new(uid: impl Into<String>, name: PlayerName) -> Self {
        Self {
            uid: uid.into(),
            name,
            letters: Letters::EMPTY,
        }
    }
}

/// Both seats. B stays empty until someone joins, then never empties again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Players {
    #[serde(rename = "A")]
    pub a: Player,
    #[serde(rename = "B")]
    pub b: Option<Player>,
}

impl Players {
    pub fn get(&self, slot: PlayerSlot) -> Option<&Player> {
        match slot {
            PlayerSlot::A => Some(&self.a),
            PlayerSlot::B => self.b.as_ref(),
        }
    }

    pub fn get_mut(&mut self, slot: PlayerSlot) -> Option<&mut Player> {
        match slot {
            PlayerSlot::A => Some(&mut self.a),
            PlayerSlot::B => self.b.as_mut(),
        }
    }

    /// Resolves an identity to its seat.
    pub fn slot_of(&self, uid: &str) -> Option<PlayerSlot> {
        if self.a.uid == uid {
            Some(PlayerSlot::A)
        } else if self.b.as_ref().is_some_and(|b| b.uid == uid) {
            Some(PlayerSlot::B)
        } else {
            None
        }
    }

    pub fn is_full(&self) -> bool {
        self.b.is_some()
    }
}

/// The in-flight attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentAttempt {
    /// Present setter.
    pub by: PlayerSlot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_clip: Option<ClipRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_clip: Option<ClipRef>,
}

impl CurrentAttempt {
    /// A clean attempt for `by`.
    pub fn fresh(by: PlayerSlot) -> Self {
        Self {
            by,
            set_clip: None,
            response_clip: None,
        }
    }
}

/// Outcome tag of a history entry.
///
/// `ApprovedSet` is the only pending tag: the round is open until the
/// response is judged, at which point the entry resolves to `Landed` or
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundResult {
    DeclinedSet,
    ApprovedSet,
    Landed,
    Failed,
}

impl RoundResult {
    pub fn is_pending(self) -> bool {
        self == RoundResult::ApprovedSet
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoundResult::DeclinedSet => "declined_set",
            RoundResult::ApprovedSet => "approved_set",
            RoundResult::Landed => "landed",
            RoundResult::Failed => "failed",
        }
    }
}

/// How a pending round can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseVerdict {
    Landed,
    Failed,
}

impl From<ResponseVerdict> for RoundResult {
    fn from(verdict: ResponseVerdict) -> Self {
        match verdict {
            ResponseVerdict::Landed => RoundResult::Landed,
            ResponseVerdict::Failed => RoundResult::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Setter of the round.
    pub by: PlayerSlot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_clip: Option<ClipRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_clip: Option<ClipRef>,
    pub result: RoundResult,
    pub at: DateTime<Utc>,
}

/// Append-only round log.
///
/// Entries can only be appended, and only a pending last entry can be
/// rewritten, through [`History::resolve_last`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<HistoryEntry>);

impl History {
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.0.last()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.0.push(entry);
    }

    /// Returns true if the last entry is an approved set awaiting a verdict.
    pub fn has_pending(&self) -> bool {
        self.last().is_some_and(|e| e.result.is_pending())
    }

    /// Resolves the pending last entry.
    ///
    /// Fails with `Internal` when the last entry is missing or not pending;
    /// that means the stored game is inconsistent.
    pub fn resolve_last(
        &mut self,
        verdict: ResponseVerdict,
        response_clip: Option<ClipRef>,
        at: DateTime<Utc>,
    ) -> Result<(), GameError> {
        let last = self
            .0
            .last_mut()
            .ok_or_else(|| GameError::internal("history is empty during response phase"))?;
        if !last.result.is_pending() {
            return Err(GameError::internal(format!(
                "last history entry is {} during response phase",
                last.result.as_str()
            )));
        }
        last.result = verdict.into();
        last.response_clip = response_clip;
        last.at = at;
        Ok(())
    }
}

/// One match between two players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub code: JoinCode,
    pub phase: Phase,
    /// Current setter. Always equal to `current.by`.
    pub turn: PlayerSlot,
    /// Set once, when a player spells the full penalty word.
    pub winner: Option<PlayerSlot>,
    pub players: Players,
    pub current: CurrentAttempt,
    pub history: History,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Game {
    /// A new game with the creator seated as A and setting first.
    pub fn create(
        id: impl Into<String>,
        code: JoinCode,
        creator_uid: impl Into<String>,
        name: PlayerName,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            code,
            phase: Phase::SetRecord,
            turn: PlayerSlot::A,
            winner: None,
            players: Players {
                a: Player::new(creator_uid, name),
                b: None,
            },
            current: CurrentAttempt::fresh(PlayerSlot::A),
            history: History::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.winner.is_some()
    }

    pub fn setter(&self) -> PlayerSlot {
        self.current.by
    }

    pub fn responder(&self) -> PlayerSlot {
        self.current.by.opponent()
    }

    /// Hands the next round to `slot` with a clean attempt.
    pub(crate) fn start_round(&mut self, slot: PlayerSlot) {
        self.turn = slot;
        self.current = CurrentAttempt::fresh(slot);
        self.phase = Phase::SetRecord;
    }
}
