//! JMAP session bootstrap and capability resolution
//!
//! The session document is fetched once per client lifetime from the well-known URI
//! and cached; see [`crate::client::Client`]. This module only knows how to interpret
//! the document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// The core JMAP capability every request claims (RFC 8620).
pub const CAPABILITY_CORE: &str = "urn:ietf:params:jmap:core";
/// The calendars capability (draft-ietf-jmap-calendars).
pub const CAPABILITY_CALENDARS: &str = "urn:ietf:params:jmap:calendars";
/// The tasks capability (draft-ietf-jmap-tasks).
pub const CAPABILITY_TASKS: &str = "urn:ietf:params:jmap:tasks";

/// One account visible in the session document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Account {
    pub name: Option<String>,
    pub is_personal: bool,
    pub is_read_only: bool,
    /// Capability URN → capability-specific properties
    pub account_capabilities: BTreeMap<String, serde_json::Value>,
}

/// The server's session/capability document (RFC 8620 §2).
///
/// Immutable once fetched; a missing expected capability is a hard
/// [`Error::Capability`], never a retryable condition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Session {
    pub capabilities: BTreeMap<String, serde_json::Value>,
    pub accounts: BTreeMap<String, Account>,
    /// Capability URN → the account to use for it by default
    pub primary_accounts: BTreeMap<String, String>,
    /// The method-invocation endpoint; may be origin-relative
    pub api_url: String,
    pub username: Option<String>,
    pub state: Option<String>,
}

impl Session {
    /// The well-known bootstrap URI for a server origin.
    pub fn well_known(base: &Url) -> Result<Url> {
        Ok(base.join("/.well-known/jmap")?)
    }

    /// Resolve the method-invocation endpoint.
    ///
    /// `apiUrl` may be an absolute URL or a path relative to the origin we
    /// bootstrapped from; this is proper URL resolution, not string concatenation.
    pub fn resolve_api_url(&self, origin: &Url) -> Result<Url> {
        if self.api_url.is_empty() {
            return Err(Error::Protocol("session document has no apiUrl".into()));
        }
        Ok(origin.join(&self.api_url)?)
    }

    /// Hard check that the server advertises a capability, either globally or on
    /// at least one visible account.
    pub fn require_capability(&self, urn: &str) -> Result<()> {
        let advertised = self.capabilities.contains_key(urn)
            || self
                .accounts
                .values()
                .any(|account| account.account_capabilities.contains_key(urn));
        if advertised {
            Ok(())
        } else {
            Err(Error::Capability { urn: urn.to_string() })
        }
    }

    /// The account to address for a capability: the advertised primary account if
    /// there is one, otherwise the first visible account carrying the capability.
    pub fn primary_account_id(&self, urn: &str) -> Result<&str> {
        if let Some(id) = self.primary_accounts.get(urn) {
            return Ok(id.as_str());
        }
        self.accounts
            .iter()
            .find(|(_, account)| account.account_capabilities.contains_key(urn))
            .map(|(id, _)| id.as_str())
            .ok_or_else(|| Error::Capability { urn: urn.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_session() -> Session {
        serde_json::from_value(serde_json::json!({
            "capabilities": {
                "urn:ietf:params:jmap:core": {}
            },
            "accounts": {
                "u-1": {
                    "name": "alice@example.com",
                    "isPersonal": true,
                    "isReadOnly": false,
                    "accountCapabilities": {
                        "urn:ietf:params:jmap:calendars": {}
                    }
                }
            },
            "primaryAccounts": {},
            "apiUrl": "/jmap/api/"
        }))
        .unwrap()
    }

    #[test]
    fn test_relative_api_url_resolution() {
        let session = example_session();
        let origin = Url::parse("https://jmap.example.com/some/page").unwrap();
        let api = session.resolve_api_url(&origin).unwrap();
        assert_eq!(api.as_str(), "https://jmap.example.com/jmap/api/");
    }

    #[test]
    fn test_absolute_api_url_resolution() {
        let mut session = example_session();
        session.api_url = "https://api.example.com/jmap/".to_string();
        let origin = Url::parse("https://jmap.example.com/").unwrap();
        let api = session.resolve_api_url(&origin).unwrap();
        assert_eq!(api.as_str(), "https://api.example.com/jmap/");
    }

    #[test]
    fn test_primary_account_fallback_scan() {
        // No primary account advertised: fall back to scanning the account list
        let session = example_session();
        assert_eq!(session.primary_account_id(CAPABILITY_CALENDARS).unwrap(), "u-1");
    }

    #[test]
    fn test_advertised_primary_account_wins() {
        let mut session = example_session();
        session
            .primary_accounts
            .insert(CAPABILITY_CALENDARS.to_string(), "u-9".to_string());
        assert_eq!(session.primary_account_id(CAPABILITY_CALENDARS).unwrap(), "u-9");
    }

    #[test]
    fn test_missing_capability_is_a_hard_error() {
        let session = example_session();
        let err = session.require_capability(CAPABILITY_TASKS).unwrap_err();
        match err {
            Error::Capability { urn } => assert_eq!(urn, CAPABILITY_TASKS),
            other => panic!("expected a capability error, got {:?}", other),
        }
        assert!(session.primary_account_id(CAPABILITY_TASKS).is_err());
    }

    #[test]
    fn test_well_known_uri() {
        let base = Url::parse("https://jmap.example.com/login").unwrap();
        let well_known = Session::well_known(&base).unwrap();
        assert_eq!(well_known.as_str(), "https://jmap.example.com/.well-known/jmap");
    }
}
