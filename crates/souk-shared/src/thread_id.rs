//! Deterministic conversation thread identities.
//!
//! A thread id is a pure function of its two participants (order-insensitive)
//! and an optional scope, usually the listing the conversation is about:
//!
//! - `thread_{p1}_{p2}`
//! - `thread_scoped_{scope}_{p1}_{p2}`
//!
//! with `p1 < p2` lexicographically. As long as party ids contain no `_`
//! (see [`validate_party`]) the last two segments are always the parties, so
//! distinct inputs never map to the same id.

use crate::constants::{SCOPED_THREAD_PREFIX, THREAD_PREFIX};
use crate::types::ThreadId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartyError {
    #[error("Party id is blank")]
    Blank,

    #[error("Party id {0:?} contains a reserved character ('_' or '/')")]
    ReservedCharacter(String),

    #[error("Both parties are the same user: {0}")]
    SameParty(String),
}

/// Compute the thread id for `party_a` and `party_b`, optionally scoped.
///
/// A blank scope is treated as no scope.
pub fn resolve(party_a: &str, party_b: &str, scope: Option<&str>) -> ThreadId {
    let (p1, p2) = if party_a <= party_b {
        (party_a, party_b)
    } else {
        (party_b, party_a)
    };

    match scope.map(str::trim).filter(|s| !s.is_empty()) {
        Some(scope) => ThreadId(format!("{SCOPED_THREAD_PREFIX}{scope}_{p1}_{p2}")),
        None => ThreadId(format!("{THREAD_PREFIX}{p1}_{p2}")),
    }
}

/// Check that a party id can take part in a thread id without ambiguity.
pub fn validate_party(id: &str) -> Result<(), PartyError> {
    if id.trim().is_empty() {
        return Err(PartyError::Blank);
    }
    if id.contains('_') || id.contains('/') {
        return Err(PartyError::ReservedCharacter(id.to_string()));
    }
    Ok(())
}

/// Validate both parties of a two-party thread.
pub fn validate_pair(party_a: &str, party_b: &str) -> Result<(), PartyError> {
    validate_party(party_a)?;
    validate_party(party_b)?;
    if party_a == party_b {
        return Err(PartyError::SameParty(party_a.to_string()));
    }
    Ok(())
}
