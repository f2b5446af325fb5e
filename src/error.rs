//! The error type shared by every protocol implementation in this crate
//!
//! Both the JMAP client and the CalDAV client report their failures through [`Error`],
//! so a handler written against this one type catches errors from either protocol.

use thiserror::Error;

/// A convenience alias used throughout this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Every error this crate can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// The server rejected our credentials (HTTP 401 or 403).
    ///
    /// Both protocols send full credentials on every request, there is no
    /// challenge-response round. Retrying with the same credentials cannot succeed;
    /// the caller must supply different ones.
    #[error("authentication rejected by the server (HTTP {status})")]
    Authentication {
        /// The HTTP status code the server answered with (401 or 403)
        status: u16,
    },

    /// The server's session document does not advertise a capability we need.
    #[error("server does not advertise the {urn} capability")]
    Capability {
        /// The capability URN that is missing
        urn: String,
    },

    /// A JMAP method call came back as a structured error object.
    ///
    /// `error_type` is the server's machine-readable token (e.g. `invalidArguments`,
    /// `stateMismatch`), kept verbatim so callers can branch on it. Whether a given
    /// token is worth retrying is a caller decision, not encoded here.
    #[error("method call failed: {error_type}")]
    Method {
        /// The server's error type token, verbatim
        error_type: String,
        /// The server's human-readable description, when it sent one
        description: Option<String>,
    },

    /// The server truncated a change log (`hasMoreChanges`).
    ///
    /// A partial delta is never applied: accepting it and advancing the sync token
    /// would leave objects permanently missing with no way to detect the gap.
    /// The caller must re-baseline with a fresh token and a full fetch.
    #[error("the server truncated the change log; a re-baseline is required")]
    SyncTruncated,

    /// The server answered with an unexpected HTTP status code.
    #[error("unexpected HTTP status code {status}")]
    Status {
        /// The offending status code
        status: u16,
    },

    /// The HTTP transport failed before any server answer could be interpreted.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with something we cannot make sense of.
    #[error("unexpected response from the server: {0}")]
    Protocol(String),

    /// iCalendar data could not be parsed or generated.
    #[error("invalid iCalendar data: {0}")]
    Ical(String),

    /// A URL could not be parsed or resolved.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Build an [`Error::Method`] from a server error object.
    pub fn method<S: ToString>(error_type: S, description: Option<String>) -> Self {
        Error::Method {
            error_type: error_type.to_string(),
            description,
        }
    }

    /// Whether this error is the hard authentication failure.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }
}
