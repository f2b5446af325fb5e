//! Incremental synchronisation: the opaque token and the all-or-nothing delta
//!
//! The state machine is `Uninitialized → Baseline(token) → Delta-in-flight →
//! {Baseline(new token) | Truncated-error}`. Tokens are opaque: the client never
//! parses, compares or orders them beyond equality, only the server's ordering
//! guarantee matters.
//!
//! The token is caller-owned. This library never persists one, and two concurrent
//! delta fetches against the same token are a caller error that it does not
//! arbitrate.

use serde::{Deserialize, Serialize};

use super::response::ChangesResponse;
use crate::error::{Error, Result};

/// An opaque, server-issued cursor into the account's change log.
///
/// Valid only for producing the *next* delta from that exact point. After a failed
/// or truncated delta it must not be reused as a safe resumption point: re-baseline
/// via [`crate::client::Client::event_sync_token`] instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncToken(String);

impl SyncToken {
    pub fn new<S: ToString>(token: S) -> Self {
        SyncToken(token.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SyncToken {
    fn from(token: String) -> Self {
        SyncToken(token)
    }
}

impl std::fmt::Display for SyncToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One successfully applied delta: everything that changed between the consumed
/// token and [`SyncDelta::token`].
#[derive(Clone, Debug)]
pub struct SyncDelta {
    /// Newly created objects, as iCal text
    pub created: Vec<String>,
    /// Modified objects, as iCal text
    pub updated: Vec<String>,
    /// Server ids of destroyed objects; the objects themselves are gone
    pub destroyed: Vec<String>,
    /// The token to persist, replacing the consumed one atomically
    pub token: SyncToken,
}

/// Enforce the all-or-nothing contract on a changes result.
///
/// A truncated change log (`hasMoreChanges`) is a hard error, never a partial
/// result: this runs before any object or token from the response is surfaced, so a
/// failed delta leaves the caller's stored token untouched.
pub fn ensure_complete(changes: &ChangesResponse) -> Result<()> {
    if changes.has_more_changes {
        log::warn!(
            "change log truncated between {:?} and {:?}, refusing the partial delta",
            changes.old_state,
            changes.new_state
        );
        return Err(Error::SyncTruncated);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncated_changes_are_refused() {
        let changes = ChangesResponse::parse(&json!({
            "oldState": "tok-1",
            "newState": "tok-1b",
            "hasMoreChanges": true,
            "created": [],
            "updated": [],
            "destroyed": []
        }))
        .unwrap();

        assert!(matches!(ensure_complete(&changes), Err(Error::SyncTruncated)));
    }

    #[test]
    fn test_complete_changes_pass() {
        let changes = ChangesResponse::parse(&json!({
            "oldState": "tok-1",
            "newState": "tok-2",
            "created": ["ev-1"],
            "updated": [],
            "destroyed": []
        }))
        .unwrap();

        assert!(ensure_complete(&changes).is_ok());
    }

    #[test]
    fn test_tokens_are_equality_only() {
        let a = SyncToken::new("tok-1");
        let b = SyncToken::new("tok-1");
        let c = SyncToken::new("tok-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "tok-1");
    }
}
