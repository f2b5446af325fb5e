//! Calendar events, represented as JSCalendar `Event` objects (RFC 8984)
//!
//! This is the canonical in-memory representation of one event. It maps 1:1 onto the
//! JSON the JMAP wire carries, with every JSON map stored as a [`BTreeMap`] so that
//! serializing the same value twice yields byte-identical output.
//!
//! A `CalendarEvent` is a plain immutable value: "mutation" means building a new value
//! (usually via `clone()` and field updates) and explicitly handing it over to whatever
//! owns the authoritative copy. No two representations of the same event are ever kept
//! alive behind shared mutable state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A JSCalendar patch: the keys of an overridden occurrence that differ from the
/// master event, with JSON `null` marking a removed key. Never a full copy.
pub type PatchObject = serde_json::Map<String, serde_json::Value>;

/// The time-of-day sentinel used for all-day dates (`showWithoutTime`).
/// It carries no temporal meaning.
pub const ALL_DAY_SENTINEL_TIME: &str = "T00:00:00";

/// The iCalendar `CLASS` vocabulary, minus the implicit default.
///
/// An event with no explicit classification has no `privacy` field at all
/// (JSCalendar's "default"), so there is no variant for it here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    Private,
    /// iCalendar calls this `CONFIDENTIAL`
    Secret,
}

/// Whether the event blocks time on a free/busy view.
///
/// `Busy` is JSCalendar's implicit default and is never emitted back to iCalendar
/// as an explicit `TRANSP:OPAQUE`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreeBusyStatus {
    Free,
    Busy,
}

/// A physical location attached to an event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Location {
    #[serde(rename = "@type")]
    pub object_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            object_type: "Location".to_string(),
            name: None,
        }
    }
}

impl Location {
    pub fn named<S: ToString>(name: S) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }
}

/// Someone involved in an event (iCalendar `ORGANIZER` or `ATTENDEE`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Participant {
    #[serde(rename = "@type")]
    pub object_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// What kind of entity this is (`individual`, `group`, `resource`, `location`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// The set of roles this participant holds (`owner`, `attendee`, `chair`,
    /// `optional`, `informational`), as the JSCalendar role-set map
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub roles: BTreeMap<String, bool>,
    /// `needs-action`, `accepted`, `declined`, `tentative` or `delegated`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participation_status: Option<String>,
    /// Whether the organizer expects an answer (iCalendar `RSVP=TRUE`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expect_reply: Option<bool>,
}

impl Default for Participant {
    fn default() -> Self {
        Self {
            object_type: "Participant".to_string(),
            name: None,
            email: None,
            kind: None,
            roles: BTreeMap::new(),
            participation_status: None,
            expect_reply: None,
        }
    }
}

impl Participant {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.get(role).copied().unwrap_or(false)
    }
}

/// A reminder attached to an event (iCalendar `VALARM`).
///
/// The trigger is either a signed ISO-8601 duration relative to the event
/// (e.g. `-PT15M`), or an absolute UTC date-time (e.g. `2026-01-15T09:45:00Z`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Alert {
    #[serde(rename = "@type")]
    pub object_type: String,
    pub trigger: String,
    /// `start` or `end`; only meaningful for relative triggers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_to: Option<String>,
    /// `display` or `email`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl Default for Alert {
    fn default() -> Self {
        Self {
            object_type: "Alert".to_string(),
            trigger: String::new(),
            relative_to: None,
            action: None,
        }
    }
}

/// One `BYDAY` entry of a structured recurrence rule: a week day, optionally
/// restricted to the nth occurrence within the period (`2MO` → `{day: "mo", nthOfPeriod: 2}`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NDay {
    #[serde(rename = "@type")]
    pub object_type: String,
    pub day: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nth_of_period: Option<i32>,
}

impl Default for NDay {
    fn default() -> Self {
        Self {
            object_type: "NDay".to_string(),
            day: String::new(),
            nth_of_period: None,
        }
    }
}

/// A structured recurrence rule (iCalendar `RRULE`/`EXRULE`), fully parsed:
/// never a string passthrough.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecurrenceRule {
    #[serde(rename = "@type")]
    pub object_type: String,
    /// `yearly`, `monthly`, `weekly`, `daily`, `hourly`, `minutely` or `secondly`
    pub frequency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    /// The calendar system the rule is evaluated in (iCalendar `RSCALE`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rscale: Option<String>,
    /// What to do with invalid expanded dates (`omit`, `backward`, `forward`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<String>,
    /// iCalendar `WKST`, lowercased two-letter day
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_day_of_week: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_day: Option<Vec<NDay>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_month_day: Option<Vec<i32>>,
    /// String-typed in JSCalendar because leap months are written `"5L"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_month: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_year_day: Option<Vec<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_week_no: Option<Vec<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_hour: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_minute: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_second: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_set_position: Option<Vec<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// A local date-time string; iCalendar's UTC `UNTIL` loses its `Z` here
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self {
            object_type: "RecurrenceRule".to_string(),
            frequency: String::new(),
            interval: None,
            rscale: None,
            skip: None,
            first_day_of_week: None,
            by_day: None,
            by_month_day: None,
            by_month: None,
            by_year_day: None,
            by_week_no: None,
            by_hour: None,
            by_minute: None,
            by_second: None,
            by_set_position: None,
            count: None,
            until: None,
        }
    }
}

/// A calendar event.
///
/// `uid` is the persistent, protocol-independent identity of the event and never
/// changes across its lifecycle. The server-assigned handle (a JMAP id or a CalDAV
/// URL) is a separate thing and is deliberately *not* part of this object.
///
/// `start` is a local date-time with no UTC offset; `(start, timeZone)` together
/// are the only source of absolute time. When `showWithoutTime` is set, the
/// time-of-day part of `start` is the `T00:00:00` sentinel and means nothing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalendarEvent {
    #[serde(rename = "@type")]
    pub object_type: String,

    /// Persistent, globally unique identifier for the calendar component
    /// The [RFC](https://tools.ietf.org/html/rfc5545#page-117) recommends concatenating a timestamp with the server's domain name, but UUID are even better
    pub uid: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Local date-time, `2026-01-15T10:00:00` form, never with an offset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// ISO-8601 duration, e.g. `PT1H`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// An IANA zone name, or whatever opaque `TZID` the producer used (kept verbatim)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    /// The all-day flag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_without_time: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    /// 1 (highest) to 9 (lowest); iCalendar's `PRIORITY:0` ("undefined") maps to no field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy: Option<Privacy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_busy_status: Option<FreeBusyStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// JSCalendar stores keyword sets as a map of keyword → true
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub keywords: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub locations: BTreeMap<String, Location>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub participants: BTreeMap<String, Participant>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recurrence_rules: Vec<RecurrenceRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded_recurrence_rules: Vec<RecurrenceRule>,
    /// Patches keyed by the recurrence id (a local date-time string).
    /// `{"excluded": true}` marks a cancelled occurrence (iCalendar `EXDATE`).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub recurrence_overrides: BTreeMap<String, PatchObject>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub alerts: BTreeMap<String, Alert>,
}

impl Default for CalendarEvent {
    fn default() -> Self {
        Self {
            object_type: "Event".to_string(),
            uid: String::new(),
            title: None,
            description: None,
            start: None,
            duration: None,
            time_zone: None,
            show_without_time: None,
            sequence: None,
            priority: None,
            privacy: None,
            free_busy_status: None,
            color: None,
            keywords: BTreeMap::new(),
            locations: BTreeMap::new(),
            participants: BTreeMap::new(),
            recurrence_rules: Vec::new(),
            excluded_recurrence_rules: Vec::new(),
            recurrence_overrides: BTreeMap::new(),
            alerts: BTreeMap::new(),
        }
    }
}

impl CalendarEvent {
    /// Create an empty event with the given UID.
    pub fn new<S: ToString>(uid: S) -> Self {
        Self {
            uid: uid.to_string(),
            ..Self::default()
        }
    }

    /// This event's set of keywords, as plain strings.
    pub fn keyword_set(&self) -> Vec<&str> {
        self.keywords
            .iter()
            .filter(|(_, set)| **set)
            .map(|(kw, _)| kw.as_str())
            .collect()
    }

    /// The JSON map representation of this event.
    ///
    /// Used for computing and applying recurrence-override patches; the maps it
    /// produces are deterministic because every collection here is ordered.
    pub fn to_json_map(&self) -> PatchObject {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => PatchObject::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_is_camel_case_and_sparse() {
        let mut event = CalendarEvent::new("abc-123");
        event.title = Some("Team sync".to_string());
        event.show_without_time = Some(true);
        event.keywords.insert("work".to_string(), true);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["@type"], "Event");
        assert_eq!(json["uid"], "abc-123");
        assert_eq!(json["title"], "Team sync");
        assert_eq!(json["showWithoutTime"], true);
        assert_eq!(json["keywords"]["work"], true);
        // Unset fields must not appear at all
        assert!(json.get("description").is_none());
        assert!(json.get("recurrenceRules").is_none());
    }

    #[test]
    fn deserialization_accepts_missing_type_markers() {
        let event: CalendarEvent = serde_json::from_str(
            r#"{"uid": "u-1", "title": "No @type anywhere", "privacy": "secret"}"#,
        )
        .unwrap();
        assert_eq!(event.object_type, "Event");
        assert_eq!(event.uid, "u-1");
        assert_eq!(event.privacy, Some(Privacy::Secret));
    }

    #[test]
    fn identical_values_serialize_identically() {
        let mut event = CalendarEvent::new("determinism");
        for kw in &["zeta", "alpha", "midway"] {
            event.keywords.insert(kw.to_string(), true);
        }
        let once = serde_json::to_string(&event).unwrap();
        let twice = serde_json::to_string(&event.clone()).unwrap();
        assert_eq!(once, twice);
    }
}
