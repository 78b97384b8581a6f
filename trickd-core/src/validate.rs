//! Validated inputs: player names, join codes and clip references.

use crate::action::ClipKind;
use crate::error::GameError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum display name length, in characters.
pub const MAX_NAME_CHARS: usize = 60;

/// Join code length.
pub const CODE_LEN: usize = 6;

/// Join code alphabet. Excludes I, O, 0 and 1.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Maximum clip reference length, in bytes.
pub const MAX_CLIP_REF_LEN: usize = 256;

/// Maximum clip file name length, in bytes.
pub const MAX_CLIP_FILE_LEN: usize = 128;

/// Top-level clip namespace.
const CLIP_ROOT: &str = "games";

/// A trimmed display name of 1 to 60 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerName(String);

impl PlayerName {
    pub fn parse(raw: &str) -> Result<Self, GameError> {
        let name = raw.trim();
        let chars = name.chars().count();
        if chars == 0 {
            return Err(GameError::invalid_input("name must not be empty"));
        }
        if chars > MAX_NAME_CHARS {
            return Err(GameError::invalid_input(format!(
                "name must be at most {} characters",
                MAX_NAME_CHARS
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(GameError::invalid_input(
                "name must not contain control characters",
            ));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A six-character shareable join code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JoinCode(String);

impl JoinCode {
    /// Parses user input. Surrounding whitespace is ignored and lowercase
    /// letters are accepted.
    pub fn parse(raw: &str) -> Result<Self, GameError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() != CODE_LEN {
            return Err(GameError::invalid_input(format!(
                "join code must be {} characters",
                CODE_LEN
            )));
        }
        if !code.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
            return Err(GameError::invalid_input(
                "join code contains an invalid character",
            ));
        }
        Ok(Self(code))
    }

    /// Draws a code uniformly from the alphabet.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Draws a code from the thread-local generator.
    pub fn random() -> Self {
        Self::generate(&mut rand::rng())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for JoinCode {
    type Error = GameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        JoinCode::parse(&value)
    }
}

impl From<JoinCode> for String {
    fn from(code: JoinCode) -> Self {
        code.0
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A clip reference that passed [`ClipPolicy::validate`].
///
/// Shape: `games/<game_id>/<set|response>/<file>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipRef(String);

impl ClipRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClipRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rules for accepting clip references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipPolicy {
    allowed_extensions: Vec<String>,
}

impl Default for ClipPolicy {
    fn default() -> Self {
        Self::new(["mp4", "mov", "webm"])
    }
}

impl ClipPolicy {
    /// Creates a policy allowing the given extensions (case-insensitive,
    /// leading dots ignored).
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Checks that `raw` points at a file of the right kind inside the
    /// game's own namespace.
    pub fn validate(
        &self,
        game_id: &str,
        kind: ClipKind,
        raw: &str,
    ) -> Result<ClipRef, GameError> {
        if raw.is_empty() {
            return Err(GameError::invalid_input("clip reference is empty"));
        }
        if raw.len() > MAX_CLIP_REF_LEN {
            return Err(GameError::invalid_input(format!(
                "clip reference exceeds {} bytes",
                MAX_CLIP_REF_LEN
            )));
        }
        if raw.starts_with('/') || raw.contains('\\') {
            return Err(GameError::invalid_input(
                "clip reference must be a relative forward-slash path",
            ));
        }

        let segments: Vec<&str> = raw.split('/').collect();
        if segments
            .iter()
            .any(|s| s.is_empty() || *s == "." || *s == "..")
        {
            return Err(GameError::invalid_input(
                "clip reference contains an empty or relative segment",
            ));
        }

        match segments.as_slice() {
            [root, id, category, file]
                if *root == CLIP_ROOT && *id == game_id && *category == kind.as_str() =>
            {
                self.check_file_name(file)?;
                Ok(ClipRef(raw.to_string()))
            }
            _ => Err(GameError::invalid_input(format!(
                "clip reference must be {}/{}/{}/<file>",
                CLIP_ROOT, game_id, kind
            ))),
        }
    }

    fn check_file_name(&self, file: &str) -> Result<(), GameError> {
        if file.len() > MAX_CLIP_FILE_LEN {
            return Err(GameError::invalid_input(format!(
                "clip file name exceeds {} bytes",
                MAX_CLIP_FILE_LEN
            )));
        }
        if !file
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
        {
            return Err(GameError::invalid_input(
                "clip file name may only contain letters, digits, '_', '-' and '.'",
            ));
        }

        let (stem, ext) = file
            .rsplit_once('.')
            .ok_or_else(|| GameError::invalid_input("clip file name has no extension"))?;
        if !stem.bytes().any(|b| b.is_ascii_alphanumeric()) {
            return Err(GameError::invalid_input("clip file name has an empty stem"));
        }
        let ext = ext.to_ascii_lowercase();
        if !self.allowed_extensions.iter().any(|a| *a == ext) {
            return Err(GameError::invalid_input(format!(
                "clip extension '.{}' is not allowed",
                ext
            )));
        }
        Ok(())
    }
}
