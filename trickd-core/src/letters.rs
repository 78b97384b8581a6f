//! Penalty letters.
//!
//! A player's letters are always a prefix of [`PENALTY_WORD`]. Spelling the
//! whole word eliminates the player.

use crate::error::GameError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The penalty word. Each failed response earns the next letter.
pub const PENALTY_WORD: &str = "SK8";

/// Number of letters a player has earned, stored as a prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Letters(u8);

impl Letters {
    pub const EMPTY: Letters = Letters(0);

    /// Parses a prefix of the penalty word.
    pub fn parse(s: &str) -> Result<Self, GameError> {
        if s.len() <= PENALTY_WORD.len() && PENALTY_WORD.starts_with(s) {
            Ok(Letters(s.len() as u8))
        } else {
            Err(GameError::invalid_input(format!(
                "'{}' is not a prefix of {}",
                s, PENALTY_WORD
            )))
        }
    }

    /// Number of letters earned.
    pub fn count(self) -> usize {
        self.0 as usize
    }

    pub fn as_str(self) -> &'static str {
        &PENALTY_WORD[..self.count()]
    }

    /// Returns true once the full word has been spelled.
    pub fn is_complete(self) -> bool {
        self.count() == PENALTY_WORD.len()
    }

    /// Earns the next letter. Saturates at the full word.
    ///
    /// Returns the new value and whether the word is now complete.
    pub fn advance(self) -> (Letters, bool) {
        let next = if self.is_complete() {
            self
        } else {
            Letters(self.0 + 1)
        };
        (next, next.is_complete())
    }
}

/// String form of [`Letters::advance`].
pub fn next_letters(current: &str) -> Result<(String, bool), GameError> {
    let (next, completed) = Letters::parse(current)?.advance();
    Ok((next.as_str().to_string(), completed))
}

impl fmt::Display for Letters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Letters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Letters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Letters::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_letters_walks_the_word() {
        assert_eq!(next_letters("").unwrap(), ("S".to_string(), false));
        assert_eq!(next_letters("S").unwrap(), ("SK".to_string(), false));
        assert_eq!(next_letters("SK").unwrap(), ("SK8".to_string(), true));
    }

    #[test]
    fn test_next_letters_idempotent_when_complete() {
        assert_eq!(next_letters("SK8").unwrap(), ("SK8".to_string(), true));
        let (once, _) = Letters::parse("SK8").unwrap().advance();
        let (twice, done) = once.advance();
        assert_eq!(once, twice);
        assert!(done);
    }

    #[test]
    fn test_rejects_non_prefix() {
        assert!(next_letters("K").is_err());
        assert!(next_letters("SK8S").is_err());
        assert!(Letters::parse("s").is_err());
        assert!(matches!(
            Letters::parse("SKATE"),
            Err(GameError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_serde_uses_prefix_string() {
        let (one, _) = Letters::EMPTY.advance();
        assert_eq!(serde_json::to_string(&one).unwrap(), "\"S\"");
        assert_eq!(
            serde_json::from_str::<Letters>("\"SK\"").unwrap().count(),
            2
        );
        assert!(serde_json::from_str::<Letters>("\"8\"").is_err());
    }
}
