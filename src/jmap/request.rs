//! Builders for JMAP method-call payloads
//!
//! Every builder here is a pure function from typed arguments to a JSON-serializable
//! structure; sending it is the client's job. Call ids are supplied by the caller and
//! used to correlate results, see [`crate::jmap::response`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::session::{CAPABILITY_CALENDARS, CAPABILITY_CORE, CAPABILITY_TASKS};

/// The object kinds this client manipulates.
///
/// Dispatch over the protocol's method names is an explicit enum resolved at compile
/// time, never a method looked up by a string name at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Event,
    Task,
}

impl ObjectKind {
    /// The JMAP data type name (`CalendarEvent/get` etc. derive from this).
    pub fn type_name(self) -> &'static str {
        match self {
            ObjectKind::Event => "CalendarEvent",
            ObjectKind::Task => "Task",
        }
    }

    /// The capability URN requests about this kind must claim.
    pub fn capability(self) -> &'static str {
        match self {
            ObjectKind::Event => CAPABILITY_CALENDARS,
            ObjectKind::Task => CAPABILITY_TASKS,
        }
    }

    /// The property tying an object of this kind to its containing collection.
    pub fn membership_property(self) -> &'static str {
        match self {
            ObjectKind::Event => "calendarIds",
            ObjectKind::Task => "taskListIds",
        }
    }

    pub fn method(self, operation: &str) -> String {
        format!("{}/{}", self.type_name(), operation)
    }
}

/// One method invocation, serialized as the RFC 8620 three-element array
/// `[name, arguments, callId]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invocation(pub String, pub Value, pub String);

impl Invocation {
    pub fn new<N: ToString, C: ToString>(name: N, arguments: Value, call_id: C) -> Self {
        Invocation(name.to_string(), arguments, call_id.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
    pub fn arguments(&self) -> &Value {
        &self.1
    }
    pub fn call_id(&self) -> &str {
        &self.2
    }
}

/// The full request envelope POSTed to the API endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub using: Vec<String>,
    pub method_calls: Vec<Invocation>,
}

impl Request {
    /// An empty request claiming the core capability plus the one for `kind`.
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            using: vec![CAPABILITY_CORE.to_string(), kind.capability().to_string()],
            method_calls: Vec::new(),
        }
    }

    pub fn push(mut self, invocation: Invocation) -> Self {
        self.method_calls.push(invocation);
        self
    }
}

/// The filter of a `…/query` call: a time window and/or a free-text match.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    /// Only objects in these collections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_calendars: Option<Vec<String>>,
    /// Only objects ending after this UTC date-time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Only objects starting before this UTC date-time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    /// Free-text search over the object's textual properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl QueryFilter {
    /// Restrict to the time range `[after, before)` (UTC date-times).
    pub fn between<S: ToString, T: ToString>(after: S, before: T) -> Self {
        Self {
            after: Some(after.to_string()),
            before: Some(before.to_string()),
            ..Self::default()
        }
    }

    /// Match objects containing the given text.
    pub fn matching<S: ToString>(text: S) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

/// `…/get` for explicit ids. `None` means "every object in the account".
pub fn get(kind: ObjectKind, account_id: &str, ids: Option<&[&str]>, call_id: &str) -> Invocation {
    let ids = match ids {
        Some(ids) => json!(ids),
        None => Value::Null,
    };
    Invocation::new(
        kind.method("get"),
        json!({ "accountId": account_id, "ids": ids }),
        call_id,
    )
}

/// `…/get` with an empty id list: transfers no object data, but returns the
/// account's current state string. This is the sync baseline entry point.
pub fn get_state(kind: ObjectKind, account_id: &str, call_id: &str) -> Invocation {
    get(kind, account_id, Some(&[]), call_id)
}

/// `Calendar/get` for the account's calendar list.
pub fn get_calendars(account_id: &str, call_id: &str) -> Invocation {
    Invocation::new(
        "Calendar/get",
        json!({ "accountId": account_id, "ids": Value::Null }),
        call_id,
    )
}

/// `…/set` creating one object under a caller-chosen creation id.
pub fn set_create(
    kind: ObjectKind,
    account_id: &str,
    create_id: &str,
    object: Value,
    call_id: &str,
) -> Invocation {
    Invocation::new(
        kind.method("set"),
        json!({ "accountId": account_id, "create": { create_id: object } }),
        call_id,
    )
}

/// `…/set` updating one object.
///
/// Server-immutable fields are stripped from the outgoing patch here rather than
/// letting the server reject them: the caller's iCal text legitimately carries a UID,
/// but a JMAP update must not try to write it.
pub fn set_update(
    kind: ObjectKind,
    account_id: &str,
    id: &str,
    mut patch: Value,
    call_id: &str,
) -> Invocation {
    if let Some(object) = patch.as_object_mut() {
        object.remove("uid");
        object.remove("@type");
    }
    Invocation::new(
        kind.method("set"),
        json!({ "accountId": account_id, "update": { id: patch } }),
        call_id,
    )
}

/// `…/set` destroying one object.
pub fn set_destroy(kind: ObjectKind, account_id: &str, id: &str, call_id: &str) -> Invocation {
    Invocation::new(
        kind.method("set"),
        json!({ "accountId": account_id, "destroy": [id] }),
        call_id,
    )
}

/// `…/query` with a filter.
pub fn query(kind: ObjectKind, account_id: &str, filter: &QueryFilter, call_id: &str) -> Invocation {
    Invocation::new(
        kind.method("query"),
        json!({ "accountId": account_id, "filter": filter }),
        call_id,
    )
}

/// `…/changes` since an opaque state token.
pub fn changes(
    kind: ObjectKind,
    account_id: &str,
    since_state: &str,
    max_changes: Option<u64>,
    call_id: &str,
) -> Invocation {
    let mut arguments = json!({ "accountId": account_id, "sinceState": since_state });
    if let Some(max) = max_changes {
        arguments["maxChanges"] = json!(max);
    }
    Invocation::new(kind.method("changes"), arguments, call_id)
}

/// `…/get` whose ids are a result reference into an earlier call of this request.
///
/// This is what keeps composite operations at one HTTP round trip: the referenced
/// call's output feeds this call inside the same batch.
pub fn get_result_of(
    kind: ObjectKind,
    account_id: &str,
    referenced_call_id: &str,
    referenced_method: &str,
    path: &str,
    call_id: &str,
) -> Invocation {
    Invocation::new(
        kind.method("get"),
        json!({
            "accountId": account_id,
            "#ids": {
                "resultOf": referenced_call_id,
                "name": referenced_method,
                "path": path,
            }
        }),
        call_id,
    )
}

/// A complete search: query plus fetch of every match, in one request.
///
/// Splitting this into two round trips would be a contract violation, not a
/// performance detail, so the composition lives here rather than in the client.
pub fn search_request(kind: ObjectKind, account_id: &str, filter: &QueryFilter) -> Request {
    Request::new(kind)
        .push(query(kind, account_id, filter, "0"))
        .push(get_result_of(
            kind,
            account_id,
            "0",
            &kind.method("query"),
            "/ids",
            "1",
        ))
}

/// A complete delta fetch: changes since a token plus full fetches of the added and
/// the modified objects, in one request. Destroyed objects come back as bare ids in
/// the changes result itself (they no longer exist, there is nothing to fetch).
pub fn changes_request(
    kind: ObjectKind,
    account_id: &str,
    since_state: &str,
    max_changes: Option<u64>,
) -> Request {
    let changes_method = kind.method("changes");
    Request::new(kind)
        .push(changes(kind, account_id, since_state, max_changes, "0"))
        .push(get_result_of(kind, account_id, "0", &changes_method, "/created", "1"))
        .push(get_result_of(kind, account_id, "0", &changes_method, "/updated", "2"))
}
