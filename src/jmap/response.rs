//! Parsers for JMAP method-call responses
//!
//! The counterpart of [`crate::jmap::request`]: pure functions from the raw response
//! envelope to typed results. A method-level error becomes [`Error::Method`] carrying
//! the server's literal error-type token; it is never collapsed to a bare string, and
//! it is a different failure than a transport-level 401/403.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::request::Invocation;
use crate::error::{Error, Result};

/// The response envelope of a method-call POST.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub method_responses: Vec<Invocation>,
    #[serde(default)]
    pub session_state: Option<String>,
}

/// The body of an `"error"` method response.
#[derive(Clone, Debug, Deserialize)]
struct MethodErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    #[serde(default)]
    description: Option<String>,
}

impl Response {
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|err| Error::Protocol(format!("malformed response envelope: {}", err)))
    }

    /// Find the result of the call with the given id, expecting the given method.
    ///
    /// An `"error"` response surfaces as [`Error::Method`]; a missing call id or a
    /// response under a different method name is a protocol error.
    pub fn expect(&self, method: &str, call_id: &str) -> Result<&Value> {
        let invocation = self
            .method_responses
            .iter()
            .find(|invocation| invocation.call_id() == call_id)
            .ok_or_else(|| Error::Protocol(format!("no response for call id {:?}", call_id)))?;

        if invocation.name() == "error" {
            let body: MethodErrorBody = serde_json::from_value(invocation.arguments().clone())
                .map_err(|err| Error::Protocol(format!("malformed method error: {}", err)))?;
            return Err(Error::Method {
                error_type: body.error_type,
                description: body.description,
            });
        }
        if invocation.name() != method {
            return Err(Error::Protocol(format!(
                "expected a {} response for call id {:?}, got {}",
                method,
                call_id,
                invocation.name()
            )));
        }
        Ok(invocation.arguments())
    }
}

/// The result of a `…/get` call.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetResponse<T> {
    #[serde(default)]
    pub account_id: Option<String>,
    /// The account's current state string for this data type
    pub state: String,
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
    #[serde(default)]
    pub not_found: Vec<String>,
}

impl<T: DeserializeOwned> GetResponse<T> {
    pub fn parse(arguments: &Value) -> Result<Self> {
        serde_json::from_value(arguments.clone())
            .map_err(|err| Error::Protocol(format!("malformed get response: {}", err)))
    }
}

/// One per-object failure inside a `…/set` result.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetError {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<&SetError> for Error {
    fn from(set_error: &SetError) -> Self {
        Error::Method {
            error_type: set_error.error_type.clone(),
            description: set_error.description.clone(),
        }
    }
}

/// The result of a `…/set` call.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetResponse {
    pub account_id: Option<String>,
    pub old_state: Option<String>,
    pub new_state: Option<String>,
    /// Creation id → the server-created object (at least its server-assigned id)
    pub created: BTreeMap<String, Value>,
    pub updated: BTreeMap<String, Option<Value>>,
    pub destroyed: Vec<String>,
    pub not_created: BTreeMap<String, SetError>,
    pub not_updated: BTreeMap<String, SetError>,
    pub not_destroyed: BTreeMap<String, SetError>,
}

impl SetResponse {
    pub fn parse(arguments: &Value) -> Result<Self> {
        serde_json::from_value(arguments.clone())
            .map_err(|err| Error::Protocol(format!("malformed set response: {}", err)))
    }

    /// The server-assigned id for a creation, or the server's per-object error.
    pub fn created_id(&self, create_id: &str) -> Result<String> {
        if let Some(object) = self.created.get(create_id) {
            return object
                .get("id")
                .and_then(|id| id.as_str())
                .map(|id| id.to_string())
                .ok_or_else(|| {
                    Error::Protocol(format!("created object {:?} has no id", create_id))
                });
        }
        if let Some(set_error) = self.not_created.get(create_id) {
            return Err(set_error.into());
        }
        Err(Error::Protocol(format!(
            "set response mentions neither created nor notCreated for {:?}",
            create_id
        )))
    }

    /// Check that an update went through, surfacing the per-object error otherwise.
    pub fn ensure_updated(&self, id: &str) -> Result<()> {
        if self.updated.contains_key(id) {
            return Ok(());
        }
        if let Some(set_error) = self.not_updated.get(id) {
            return Err(set_error.into());
        }
        Err(Error::Protocol(format!(
            "set response mentions neither updated nor notUpdated for {:?}",
            id
        )))
    }

    /// Check that a destroy went through, surfacing the per-object error otherwise.
    pub fn ensure_destroyed(&self, id: &str) -> Result<()> {
        if self.destroyed.iter().any(|destroyed| destroyed == id) {
            return Ok(());
        }
        if let Some(set_error) = self.not_destroyed.get(id) {
            return Err(set_error.into());
        }
        Err(Error::Protocol(format!(
            "set response mentions neither destroyed nor notDestroyed for {:?}",
            id
        )))
    }
}

/// The result of a `…/query` call.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub query_state: Option<String>,
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl QueryResponse {
    pub fn parse(arguments: &Value) -> Result<Self> {
        serde_json::from_value(arguments.clone())
            .map_err(|err| Error::Protocol(format!("malformed query response: {}", err)))
    }
}

/// The result of a `…/changes` call.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesResponse {
    #[serde(default)]
    pub account_id: Option<String>,
    pub old_state: String,
    pub new_state: String,
    #[serde(default)]
    pub has_more_changes: bool,
    #[serde(default)]
    pub created: Vec<String>,
    #[serde(default)]
    pub updated: Vec<String>,
    /// Bare ids only: these objects no longer exist and cannot be fetched
    #[serde(default)]
    pub destroyed: Vec<String>,
}

impl ChangesResponse {
    pub fn parse(arguments: &Value) -> Result<Self> {
        serde_json::from_value(arguments.clone())
            .map_err(|err| Error::Protocol(format!("malformed changes response: {}", err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(invocations: Value) -> Response {
        Response::from_value(json!({
            "methodResponses": invocations,
            "sessionState": "s-1"
        }))
        .unwrap()
    }

    #[test]
    fn test_expect_finds_the_right_call() {
        let response = envelope(json!([
            ["CalendarEvent/query", { "ids": ["ev-1"] }, "0"],
            ["CalendarEvent/get", { "state": "s-2", "list": [] }, "1"],
        ]));
        let arguments = response.expect("CalendarEvent/get", "1").unwrap();
        assert_eq!(arguments["state"], "s-2");
    }

    #[test]
    fn test_method_error_keeps_the_server_token() {
        let response = envelope(json!([
            ["error", { "type": "invalidArguments", "description": "bad filter" }, "0"],
        ]));
        let err = response.expect("CalendarEvent/query", "0").unwrap_err();
        match err {
            Error::Method { error_type, description } => {
                assert_eq!(error_type, "invalidArguments");
                assert_eq!(description.as_deref(), Some("bad filter"));
            }
            other => panic!("expected a method error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_call_id_is_a_protocol_error() {
        let response = envelope(json!([]));
        assert!(matches!(
            response.expect("CalendarEvent/get", "0"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_set_response_created_id() {
        let arguments = json!({
            "accountId": "u-1",
            "newState": "s-3",
            "created": { "k-1": { "id": "ev-42" } },
            "notCreated": { "k-2": { "type": "invalidProperties" } }
        });
        let set = SetResponse::parse(&arguments).unwrap();
        assert_eq!(set.created_id("k-1").unwrap(), "ev-42");

        let err = set.created_id("k-2").unwrap_err();
        match err {
            Error::Method { error_type, .. } => assert_eq!(error_type, "invalidProperties"),
            other => panic!("expected a method error, got {:?}", other),
        }
    }

    #[test]
    fn test_set_response_update_and_destroy_checks() {
        let arguments = json!({
            "updated": { "ev-1": null },
            "destroyed": ["ev-2"],
            "notUpdated": { "ev-3": { "type": "notFound" } }
        });
        let set = SetResponse::parse(&arguments).unwrap();
        assert!(set.ensure_updated("ev-1").is_ok());
        assert!(set.ensure_destroyed("ev-2").is_ok());
        assert!(matches!(
            set.ensure_updated("ev-3"),
            Err(Error::Method { .. })
        ));
        assert!(matches!(set.ensure_destroyed("ev-9"), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_changes_response_parsing() {
        let arguments = json!({
            "accountId": "u-1",
            "oldState": "tok-1",
            "newState": "tok-2",
            "hasMoreChanges": false,
            "created": ["ev-1"],
            "updated": [],
            "destroyed": ["ev-0"]
        });
        let changes = ChangesResponse::parse(&arguments).unwrap();
        assert_eq!(changes.old_state, "tok-1");
        assert_eq!(changes.new_state, "tok-2");
        assert!(!changes.has_more_changes);
        assert_eq!(changes.destroyed, vec!["ev-0"]);
    }

    #[test]
    fn test_parsing_is_pure() {
        let arguments = json!({ "state": "s-1", "list": [], "notFound": [] });
        let before = arguments.clone();
        let _first: GetResponse<Value> = GetResponse::parse(&arguments).unwrap();
        let _second: GetResponse<Value> = GetResponse::parse(&arguments).unwrap();
        assert_eq!(arguments, before, "parsing must not mutate its input");
    }
}
