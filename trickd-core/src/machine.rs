//! The game transition function.
//!
//! `transition` is pure: it reads the current game, an action and the acting
//! identity, and either returns the next game or a rejection. Nothing here
//! touches storage or the clock.

use crate::action::{Action, ClipKind};
use crate::error::GameError;
use crate::game::{Game, HistoryEntry, Phase, Player, PlayerSlot, ResponseVerdict, RoundResult};
use crate::validate::{ClipRef, PlayerName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an accepted action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEvent {
    GameCreated,
    PlayerJoined,
    SetSubmitted,
    SetFailed,
    SetApproved,
    SetDeclined,
    ResponseSubmitted,
    ResponseLanded,
    ResponseFailed,
    /// A failed response spelled the full word.
    GameWon,
}

impl GameEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            GameEvent::GameCreated => "game_created",
            GameEvent::PlayerJoined => "player_joined",
            GameEvent::SetSubmitted => "set_submitted",
            GameEvent::SetFailed => "set_failed",
            GameEvent::SetApproved => "set_approved",
            GameEvent::SetDeclined => "set_declined",
            GameEvent::ResponseSubmitted => "response_submitted",
            GameEvent::ResponseLanded => "response_landed",
            GameEvent::ResponseFailed => "response_failed",
            GameEvent::GameWon => "game_won",
        }
    }
}

/// An accepted action: the next game state and what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub game: Game,
    pub event: GameEvent,
}

/// Applies `action` by `actor` to `game`.
///
/// Checks run in a fixed order: participant, terminal, duplicate clip, phase,
/// role, then action-specific preconditions. A rejection leaves `game`
/// untouched.
pub fn transition(
    game: &Game,
    action: &Action,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<Transition, GameError> {
    if let Action::Join { name } = action {
        return join(game, name, actor, now);
    }

    let slot = game
        .players
        .slot_of(actor)
        .ok_or(GameError::NotParticipant)?;
    if game.is_finished() {
        return Err(GameError::invalid_phase("game is over"));
    }

    let mut next = game.clone();
    let event = match action {
        // Seated actors joining again.
        Action::Join { .. } => return Err(GameError::AlreadyJoined),
        Action::SubmitClip {
            kind: ClipKind::Set,
            clip,
        } => submit_set(&mut next, slot, clip, action)?,
        Action::SubmitClip {
            kind: ClipKind::Response,
            clip,
        } => submit_response(&mut next, slot, clip, action)?,
        Action::JudgeSet { approve } => judge_set(&mut next, slot, *approve, action, now)?,
        Action::JudgeResponse { approve } => {
            judge_response(&mut next, slot, *approve, action, now)?
        }
        Action::SelfFail {
            kind: ClipKind::Set,
        } => self_fail_set(&mut next, slot, action, now)?,
        Action::SelfFail {
            kind: ClipKind::Response,
        } => self_fail_response(&mut next, slot, action, now)?,
    };
    next.updated_at = now;

    Ok(Transition { game: next, event })
}

fn join(
    game: &Game,
    name: &PlayerName,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<Transition, GameError> {
    if game.players.slot_of(actor).is_some() {
        return Err(GameError::AlreadyJoined);
    }
    if game.is_finished() {
        return Err(GameError::invalid_phase("game is over"));
    }
    if game.players.is_full() {
        return Err(GameError::AlreadyFull);
    }

    let mut next = game.clone();
    next.players.b = Some(Player::new(actor, name.clone()));
    next.updated_at = now;
    Ok(Transition {
        game: next,
        event: GameEvent::PlayerJoined,
    })
}

fn expect_phase(game: &Game, phase: Phase, action: &Action) -> Result<(), GameError> {
    if game.phase == phase {
        Ok(())
    } else {
        Err(GameError::invalid_phase(format!(
            "cannot {} during {}",
            action.describe(),
            game.phase
        )))
    }
}

fn expect_role(
    actual: PlayerSlot,
    required: PlayerSlot,
    role: &'static str,
    action: &Action,
) -> Result<(), GameError> {
    if actual == required {
        Ok(())
    } else {
        Err(GameError::WrongRole {
            action: action.describe(),
            required: role,
        })
    }
}

fn expect_opponent(game: &Game) -> Result<(), GameError> {
    if game.players.is_full() {
        Ok(())
    } else {
        Err(GameError::invalid_phase("waiting for an opponent to join"))
    }
}

fn expect_pending_round(game: &Game) -> Result<(), GameError> {
    if game.history.has_pending() {
        Ok(())
    } else {
        Err(GameError::internal(
            "response phase without an approved set in history",
        ))
    }
}

fn submit_set(
    game: &mut Game,
    slot: PlayerSlot,
    clip: &ClipRef,
    action: &Action,
) -> Result<GameEvent, GameError> {
    if game.current.set_clip.is_some() {
        return Err(GameError::AlreadySubmitted { clip: "set" });
    }
    expect_phase(game, Phase::SetRecord, action)?;
    expect_role(slot, game.setter(), "setter", action)?;
    expect_opponent(game)?;

    game.current.set_clip = Some(clip.clone());
    game.phase = Phase::SetJudge;
    Ok(GameEvent::SetSubmitted)
}

fn self_fail_set(
    game: &mut Game,
    slot: PlayerSlot,
    action: &Action,
    now: DateTime<Utc>,
) -> Result<GameEvent, GameError> {
    expect_phase(game, Phase::SetRecord, action)?;
    expect_role(slot, game.setter(), "setter", action)?;
    expect_opponent(game)?;

    let setter = game.setter();
    game.history.push(HistoryEntry {
        by: setter,
        set_clip: None,
        response_clip: None,
        result: RoundResult::Failed,
        at: now,
    });
    game.start_round(setter.opponent());
    Ok(GameEvent::SetFailed)
}

fn judge_set(
    game: &mut Game,
    slot: PlayerSlot,
    approve: bool,
    action: &Action,
    now: DateTime<Utc>,
) -> Result<GameEvent, GameError> {
    expect_phase(game, Phase::SetJudge, action)?;
    expect_role(slot, game.responder(), "opponent of the setter", action)?;
    let set_clip = game
        .current
        .set_clip
        .clone()
        .ok_or(GameError::MissingClip { clip: "set" })?;

    let setter = game.setter();
    if approve {
        game.history.push(HistoryEntry {
            by: setter,
            set_clip: Some(set_clip),
            response_clip: None,
            result: RoundResult::ApprovedSet,
            at: now,
        });
        game.phase = Phase::RespRecord;
        Ok(GameEvent::SetApproved)
    } else {
        game.history.push(HistoryEntry {
            by: setter,
            set_clip: Some(set_clip),
            response_clip: None,
            result: RoundResult::DeclinedSet,
            at: now,
        });
        // Declined sets go back to the same setter.
        game.start_round(setter);
        Ok(GameEvent::SetDeclined)
    }
}

fn submit_response(
    game: &mut Game,
    slot: PlayerSlot,
    clip: &ClipRef,
    action: &Action,
) -> Result<GameEvent, GameError> {
    if game.current.response_clip.is_some() {
        return Err(GameError::AlreadySubmitted { clip: "response" });
    }
    expect_phase(game, Phase::RespRecord, action)?;
    expect_role(slot, game.responder(), "responder", action)?;

    game.current.response_clip = Some(clip.clone());
    game.phase = Phase::RespJudge;
    Ok(GameEvent::ResponseSubmitted)
}

fn self_fail_response(
    game: &mut Game,
    slot: PlayerSlot,
    action: &Action,
    now: DateTime<Utc>,
) -> Result<GameEvent, GameError> {
    expect_phase(game, Phase::RespRecord, action)?;
    expect_role(slot, game.responder(), "responder", action)?;
    expect_pending_round(game)?;

    let responder = game.responder();
    game.history
        .resolve_last(ResponseVerdict::Failed, None, now)?;
    let won = penalize(game, responder)?;
    game.start_round(responder);
    Ok(if won {
        GameEvent::GameWon
    } else {
        GameEvent::ResponseFailed
    })
}

fn judge_response(
    game: &mut Game,
    slot: PlayerSlot,
    approve: bool,
    action: &Action,
    now: DateTime<Utc>,
) -> Result<GameEvent, GameError> {
    expect_phase(game, Phase::RespJudge, action)?;
    expect_role(slot, game.setter(), "setter", action)?;
    if game.current.set_clip.is_none() {
        return Err(GameError::MissingClip { clip: "set" });
    }
    let response_clip = game
        .current
        .response_clip
        .clone()
        .ok_or(GameError::MissingClip { clip: "response" })?;
    expect_pending_round(game)?;

    let responder = game.responder();
    let event = if approve {
        game.history
            .resolve_last(ResponseVerdict::Landed, Some(response_clip), now)?;
        GameEvent::ResponseLanded
    } else {
        game.history
            .resolve_last(ResponseVerdict::Failed, Some(response_clip), now)?;
        if penalize(game, responder)? {
            GameEvent::GameWon
        } else {
            GameEvent::ResponseFailed
        }
    };
    game.start_round(responder);
    Ok(event)
}

/// Gives `loser` the next letter. Returns true if that ended the game.
fn penalize(game: &mut Game, loser: PlayerSlot) -> Result<bool, GameError> {
    let player = game
        .players
        .get_mut(loser)
        .ok_or_else(|| GameError::internal(format!("slot {} is empty", loser)))?;
    let (letters, completed) = player.letters.advance();
    player.letters = letters;

    if completed && game.winner.is_none() {
        game.winner = Some(loser.opponent());
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{ClipPolicy, JoinCode};
    use proptest::prelude::*;

    const ALICE: &str = "uid-alice";
    const BOB: &str = "uid-bob";
    const MALLORY: &str = "uid-mallory";

    fn new_game() -> Game {
        Game::create(
            "g1",
            JoinCode::parse("ABC234").unwrap(),
            ALICE,
            PlayerName::parse("Alice").unwrap(),
            Utc::now(),
        )
    }

    fn clip(kind: ClipKind, file: &str) -> ClipRef {
        ClipPolicy::default()
            .validate("g1", kind, &format!("games/g1/{}/{}", kind, file))
            .unwrap()
    }

    fn submit(kind: ClipKind) -> Action {
        Action::SubmitClip {
            kind,
            clip: clip(kind, "take.mp4"),
        }
    }

    fn apply(game: &Game, action: Action, actor: &str) -> Result<Game, GameError> {
        transition(game, &action, actor, Utc::now()).map(|t| t.game)
    }

    fn joined_game() -> Game {
        let join = Action::Join {
            name: PlayerName::parse("Bob").unwrap(),
        };
        apply(&new_game(), join, BOB).unwrap()
    }

    /// Runs set -> approve -> respond -> decline with `setter` setting.
    fn failed_round(game: &Game, setter: &str, responder: &str) -> Game {
        let g = apply(game, submit(ClipKind::Set), setter).unwrap();
        let g = apply(&g, Action::JudgeSet { approve: true }, responder).unwrap();
        let g = apply(&g, submit(ClipKind::Response), responder).unwrap();
        apply(&g, Action::JudgeResponse { approve: false }, setter).unwrap()
    }

    /// Responder fails, then hands the set straight back by self-failing it.
    fn fail_and_return_turn(game: &Game) -> Game {
        let g = failed_round(game, ALICE, BOB);
        assert_eq!(g.turn, PlayerSlot::B);
        if g.is_finished() {
            return g;
        }
        apply(
            &g,
            Action::SelfFail {
                kind: ClipKind::Set,
            },
            BOB,
        )
        .unwrap()
    }

    #[test]
    fn test_join_populates_b_and_keeps_phase() {
        let game = new_game();
        let joined = joined_game();
        assert_eq!(joined.players.b.as_ref().unwrap().name.as_str(), "Bob");
        assert_eq!(joined.phase, game.phase);
        assert_eq!(joined.turn, game.turn);
    }

    #[test]
    fn test_join_conflicts() {
        let game = joined_game();
        let join = |n: &str| Action::Join {
            name: PlayerName::parse(n).unwrap(),
        };
        assert_eq!(
            apply(&new_game(), join("Alice"), ALICE).unwrap_err(),
            GameError::AlreadyJoined
        );
        assert_eq!(
            apply(&game, join("Bob"), BOB).unwrap_err(),
            GameError::AlreadyJoined
        );
        assert_eq!(
            apply(&game, join("Mallory"), MALLORY).unwrap_err(),
            GameError::AlreadyFull
        );
    }

    #[test]
    fn test_set_requires_opponent() {
        let err = apply(&new_game(), submit(ClipKind::Set), ALICE).unwrap_err();
        assert!(matches!(err, GameError::InvalidPhase { .. }));
        let err = apply(
            &new_game(),
            Action::SelfFail {
                kind: ClipKind::Set,
            },
            ALICE,
        )
        .unwrap_err();
        assert!(matches!(err, GameError::InvalidPhase { .. }));
    }

    #[test]
    fn test_declined_set_keeps_setter() {
        let g = apply(&joined_game(), submit(ClipKind::Set), ALICE).unwrap();
        assert_eq!(g.phase, Phase::SetJudge);
        let g = apply(&g, Action::JudgeSet { approve: false }, BOB).unwrap();

        assert_eq!(g.phase, Phase::SetRecord);
        assert_eq!(g.turn, PlayerSlot::A);
        assert_eq!(g.current.by, PlayerSlot::A);
        assert!(g.current.set_clip.is_none());
        assert_eq!(g.history.len(), 1);
        assert_eq!(g.history.last().unwrap().result, RoundResult::DeclinedSet);
        assert_eq!(g.players.a.letters.as_str(), "");
        assert_eq!(g.players.b.as_ref().unwrap().letters.as_str(), "");
    }

    #[test]
    fn test_failed_response_gives_letter_and_turn() {
        let g = failed_round(&joined_game(), ALICE, BOB);

        assert_eq!(g.players.b.as_ref().unwrap().letters.as_str(), "S");
        assert_eq!(g.players.a.letters.as_str(), "");
        assert_eq!(g.turn, PlayerSlot::B);
        assert_eq!(g.current.by, PlayerSlot::B);
        assert_eq!(g.phase, Phase::SetRecord);
        assert_eq!(g.history.len(), 1);
        let last = g.history.last().unwrap();
        assert_eq!(last.result, RoundResult::Failed);
        assert!(last.set_clip.is_some());
        assert!(last.response_clip.is_some());
    }

    #[test]
    fn test_landed_response_rotates_without_letter() {
        let g = apply(&joined_game(), submit(ClipKind::Set), ALICE).unwrap();
        let g = apply(&g, Action::JudgeSet { approve: true }, BOB).unwrap();
        assert_eq!(g.phase, Phase::RespRecord);
        assert_eq!(g.history.last().unwrap().result, RoundResult::ApprovedSet);
        // Set clip is retained while the response is recorded.
        assert!(g.current.set_clip.is_some());

        let g = apply(&g, submit(ClipKind::Response), BOB).unwrap();
        let t = transition(&g, &Action::JudgeResponse { approve: true }, ALICE, Utc::now())
            .unwrap();
        assert_eq!(t.event, GameEvent::ResponseLanded);
        let g = t.game;
        assert_eq!(g.history.last().unwrap().result, RoundResult::Landed);
        assert_eq!(g.players.b.as_ref().unwrap().letters.as_str(), "");
        assert_eq!(g.turn, PlayerSlot::B);
        assert!(g.current.set_clip.is_none());
        assert!(g.current.response_clip.is_none());
    }

    #[test]
    fn test_self_fail_set_passes_turn() {
        let t = transition(
            &joined_game(),
            &Action::SelfFail {
                kind: ClipKind::Set,
            },
            ALICE,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(t.event, GameEvent::SetFailed);
        assert_eq!(t.game.turn, PlayerSlot::B);
        assert_eq!(t.game.phase, Phase::SetRecord);
        assert_eq!(t.game.history.last().unwrap().result, RoundResult::Failed);
        assert_eq!(t.game.history.last().unwrap().by, PlayerSlot::A);
        assert_eq!(t.game.players.a.letters.as_str(), "");
    }

    #[test]
    fn test_self_fail_response_rewrites_pending_entry() {
        let g = apply(&joined_game(), submit(ClipKind::Set), ALICE).unwrap();
        let g = apply(&g, Action::JudgeSet { approve: true }, BOB).unwrap();
        let g = apply(
            &g,
            Action::SelfFail {
                kind: ClipKind::Response,
            },
            BOB,
        )
        .unwrap();

        assert_eq!(g.history.len(), 1);
        let last = g.history.last().unwrap();
        assert_eq!(last.result, RoundResult::Failed);
        assert!(last.response_clip.is_none());
        assert_eq!(g.players.b.as_ref().unwrap().letters.as_str(), "S");
        assert_eq!(g.turn, PlayerSlot::B);
    }

    #[test]
    fn test_three_failures_end_the_game() {
        let mut g = joined_game();
        let mut seen = Vec::new();
        for _ in 0..3 {
            g = fail_and_return_turn(&g);
            seen.push(g.players.b.as_ref().unwrap().letters.as_str());
        }
        assert_eq!(seen, vec!["S", "SK", "SK8"]);
        assert_eq!(g.winner, Some(PlayerSlot::A));

        // Terminal: any further gameplay is rejected.
        let err = apply(&g, submit(ClipKind::Set), BOB).unwrap_err();
        assert!(matches!(err, GameError::InvalidPhase { .. }));
        let err = apply(&g, Action::JudgeSet { approve: true }, ALICE).unwrap_err();
        assert!(matches!(err, GameError::InvalidPhase { .. }));
    }

    #[test]
    fn test_winning_event() {
        let mut g = joined_game();
        g = fail_and_return_turn(&g);
        g = fail_and_return_turn(&g);

        let g = apply(&g, submit(ClipKind::Set), ALICE).unwrap();
        let g = apply(&g, Action::JudgeSet { approve: true }, BOB).unwrap();
        let g = apply(&g, submit(ClipKind::Response), BOB).unwrap();
        let t = transition(&g, &Action::JudgeResponse { approve: false }, ALICE, Utc::now())
            .unwrap();
        assert_eq!(t.event, GameEvent::GameWon);
        assert_eq!(t.game.winner, Some(PlayerSlot::A));
    }

    #[test]
    fn test_duplicate_set_clip_rejected_for_any_participant() {
        let g = apply(&joined_game(), submit(ClipKind::Set), ALICE).unwrap();
        for actor in [ALICE, BOB] {
            assert_eq!(
                apply(&g, submit(ClipKind::Set), actor).unwrap_err(),
                GameError::AlreadySubmitted { clip: "set" }
            );
        }
        // Still present during the response phase.
        let g = apply(&g, Action::JudgeSet { approve: true }, BOB).unwrap();
        assert_eq!(
            apply(&g, submit(ClipKind::Set), ALICE).unwrap_err(),
            GameError::AlreadySubmitted { clip: "set" }
        );
    }

    #[test]
    fn test_duplicate_response_clip_rejected() {
        let g = apply(&joined_game(), submit(ClipKind::Set), ALICE).unwrap();
        let g = apply(&g, Action::JudgeSet { approve: true }, BOB).unwrap();
        let g = apply(&g, submit(ClipKind::Response), BOB).unwrap();
        assert_eq!(
            apply(&g, submit(ClipKind::Response), BOB).unwrap_err(),
            GameError::AlreadySubmitted { clip: "response" }
        );
    }

    #[test]
    fn test_wrong_role() {
        let g = joined_game();
        assert!(matches!(
            apply(&g, submit(ClipKind::Set), BOB).unwrap_err(),
            GameError::WrongRole { .. }
        ));

        let g = apply(&g, submit(ClipKind::Set), ALICE).unwrap();
        assert!(matches!(
            apply(&g, Action::JudgeSet { approve: true }, ALICE).unwrap_err(),
            GameError::WrongRole { .. }
        ));

        let g = apply(&g, Action::JudgeSet { approve: true }, BOB).unwrap();
        assert!(matches!(
            apply(&g, submit(ClipKind::Response), ALICE).unwrap_err(),
            GameError::WrongRole { .. }
        ));

        let g = apply(&g, submit(ClipKind::Response), BOB).unwrap();
        assert!(matches!(
            apply(&g, Action::JudgeResponse { approve: true }, BOB).unwrap_err(),
            GameError::WrongRole { .. }
        ));
    }

    #[test]
    fn test_wrong_phase() {
        let g = joined_game();
        assert!(matches!(
            apply(&g, Action::JudgeSet { approve: true }, BOB).unwrap_err(),
            GameError::InvalidPhase { .. }
        ));
        assert!(matches!(
            apply(&g, submit(ClipKind::Response), BOB).unwrap_err(),
            GameError::InvalidPhase { .. }
        ));
    }

    #[test]
    fn test_missing_clip_when_judging() {
        let mut g = joined_game();
        g.phase = Phase::SetJudge;
        assert_eq!(
            apply(&g, Action::JudgeSet { approve: true }, BOB).unwrap_err(),
            GameError::MissingClip { clip: "set" }
        );

        let mut g = apply(&joined_game(), submit(ClipKind::Set), ALICE).unwrap();
        g = apply(&g, Action::JudgeSet { approve: true }, BOB).unwrap();
        g.phase = Phase::RespJudge;
        assert_eq!(
            apply(&g, Action::JudgeResponse { approve: false }, ALICE).unwrap_err(),
            GameError::MissingClip { clip: "response" }
        );
    }

    #[test]
    fn test_corrupt_history_is_internal() {
        let g = apply(&joined_game(), submit(ClipKind::Set), ALICE).unwrap();
        let g = apply(&g, Action::JudgeSet { approve: true }, BOB).unwrap();
        let mut g = apply(&g, submit(ClipKind::Response), BOB).unwrap();
        g.history = Default::default();

        let err = apply(&g, Action::JudgeResponse { approve: true }, ALICE).unwrap_err();
        assert!(matches!(err, GameError::Internal(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_non_participant_always_rejected() {
        let g = joined_game();
        let actions = [
            submit(ClipKind::Set),
            submit(ClipKind::Response),
            Action::JudgeSet { approve: true },
            Action::JudgeResponse { approve: false },
            Action::SelfFail {
                kind: ClipKind::Set,
            },
            Action::SelfFail {
                kind: ClipKind::Response,
            },
        ];
        for action in actions {
            assert_eq!(
                apply(&g, action, MALLORY).unwrap_err(),
                GameError::NotParticipant
            );
        }
    }

    #[test]
    fn test_rejection_leaves_game_untouched() {
        let g = joined_game();
        let before = g.clone();
        let _ = transition(&g, &Action::JudgeSet { approve: true }, ALICE, Utc::now());
        assert_eq!(g, before);
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(submit(ClipKind::Set)),
            Just(submit(ClipKind::Response)),
            any::<bool>().prop_map(|approve| Action::JudgeSet { approve }),
            any::<bool>().prop_map(|approve| Action::JudgeResponse { approve }),
            Just(Action::SelfFail {
                kind: ClipKind::Set
            }),
            Just(Action::SelfFail {
                kind: ClipKind::Response
            }),
        ]
    }

    fn arb_actor() -> impl Strategy<Value = &'static str> {
        prop_oneof![4 => Just(ALICE), 4 => Just(BOB), 1 => Just(MALLORY)]
    }

    proptest! {
        #[test]
        fn prop_history_and_winner_invariants(
            steps in prop::collection::vec((arb_actor(), arb_action()), 0..120)
        ) {
            let mut game = joined_game();
            for (actor, action) in steps {
                let before = game.clone();
                match transition(&game, &action, actor, Utc::now()) {
                    Ok(t) => {
                        let next = t.game;
                        let old = before.history.entries();
                        let new = next.history.entries();

                        // History only grows.
                        prop_assert!(new.len() >= old.len());
                        // Everything but the old last entry is frozen.
                        if !old.is_empty() {
                            prop_assert_eq!(&new[..old.len() - 1], &old[..old.len() - 1]);
                        }
                        // The old last entry may only change if it was pending.
                        if let Some(last) = old.last() {
                            if !last.result.is_pending() {
                                prop_assert_eq!(&new[old.len() - 1], last);
                            }
                        }
                        // Winner is set once and never moves.
                        if let Some(w) = before.winner {
                            prop_assert_eq!(next.winner, Some(w));
                        }
                        prop_assert_eq!(next.turn, next.current.by);
                        game = next;
                    }
                    Err(_) => prop_assert_eq!(&game, &before),
                }

                // A winner exists exactly when the loser spelled the word.
                let a_done = game.players.a.letters.is_complete();
                let b_done = game.players.b.as_ref().is_some_and(|b| b.letters.is_complete());
                match game.winner {
                    None => prop_assert!(!a_done && !b_done),
                    Some(PlayerSlot::A) => prop_assert!(b_done),
                    Some(PlayerSlot::B) => prop_assert!(a_done),
                }
            }
        }
    }
}
