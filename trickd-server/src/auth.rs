//! Bearer token identity resolution.
//!
//! Tokens are matched against SHA-256 hashes stored in configuration, so
//! plaintext tokens never sit on disk. Each hash maps to the stable player
//! identity (uid) the token authenticates as.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Resolves a bearer token to a player identity.
pub trait IdentityProvider: Send + Sync {
    /// Returns the uid for `token`, or `None` if the token is not accepted.
    fn resolve(&self, token: &str) -> Option<String>;
}

/// Maps SHA-256 token hashes to uids.
#[derive(Debug, Clone, Default)]
pub struct TokenIdentities {
    /// Token hash (lowercase hex) -> uid.
    by_hash: HashMap<String, String>,
}

impl TokenIdentities {
    /// Creates a provider from `(uid, token_hash)` pairs.
    pub fn new(identities: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            by_hash: identities
                .into_iter()
                .map(|(uid, hash)| (hash.to_ascii_lowercase(), uid))
                .collect(),
        }
    }

    /// Returns whether any identities are configured.
    pub fn has_identities(&self) -> bool {
        !self.by_hash.is_empty()
    }

    /// Returns the number of configured identities.
    pub fn identity_count(&self) -> usize {
        self.by_hash.len()
    }

    /// Hashes a token using SHA-256, returning a lowercase hex string.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl IdentityProvider for TokenIdentities {
    fn resolve(&self, token: &str) -> Option<String> {
        if token.is_empty() {
            return None;
        }
        self.by_hash.get(&Self::hash_token(token)).cloned()
    }
}

/// Development provider: the token itself is the uid.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedIdentities;

impl IdentityProvider for TrustedIdentities {
    fn resolve(&self, token: &str) -> Option<String> {
        let uid = token.trim();
        if uid.is_empty() {
            None
        } else {
            Some(uid.to_string())
        }
    }
}

/// Parses a `uid:sha256hex` identity line.
///
/// Returns `None` for malformed lines: a missing separator, an empty uid, or
/// a hash that is not 64 hex characters.
pub fn parse_identity_line(line: &str) -> Option<(String, String)> {
    let (uid, hash) = line.trim().split_once(':')?;
    let uid = uid.trim();
    let hash = hash.trim();
    if uid.is_empty() || hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some((uid.to_string(), hash.to_ascii_lowercase()))
}
