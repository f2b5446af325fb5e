//! To-do tasks, represented as JSCalendar `Task` objects (iCal `VTODO` items)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How far along a task is.
///
/// RFC 5545 spreads completion over several optional fields (`STATUS`, `COMPLETED`,
/// `PERCENT-COMPLETE`), and some combinations make no sense. The conversion layer
/// keeps them coherent: a `completed` timestamp is only ever attached to a task
/// whose progress is [`Progress::Completed`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Progress {
    NeedsAction,
    InProcess,
    Completed,
    Failed,
    Cancelled,
}

/// A to-do task.
///
/// Shares the event model's conventions: `uid` is the protocol-independent
/// identity, `due` is a local date-time whose absolute meaning comes from
/// `timeZone`, and all maps are ordered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalendarTask {
    #[serde(rename = "@type")]
    pub object_type: String,

    /// Persistent, globally unique identifier for the calendar component
    pub uid: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// When the task is due, as a local date-time string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_without_time: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    /// UTC date-time at which the task was completed.
    /// Only present when `progress` is `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy: Option<crate::event::Privacy>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub keywords: BTreeMap<String, bool>,
}

impl Default for CalendarTask {
    fn default() -> Self {
        Self {
            object_type: "Task".to_string(),
            uid: String::new(),
            title: None,
            description: None,
            due: None,
            time_zone: None,
            show_without_time: None,
            progress: None,
            completed: None,
            percent_complete: None,
            sequence: None,
            priority: None,
            privacy: None,
            keywords: BTreeMap::new(),
        }
    }
}

impl CalendarTask {
    /// Create an empty task with the given UID.
    pub fn new<S: ToString>(uid: S) -> Self {
        Self {
            uid: uid.to_string(),
            ..Self::default()
        }
    }

    pub fn is_completed(&self) -> bool {
        self.progress == Some(Progress::Completed)
    }

    /// Mark this task completed (or not), keeping the completion timestamp coherent.
    pub fn set_progress(&mut self, progress: Option<Progress>, completed_on: Option<String>) {
        self.progress = progress;
        self.completed = match progress {
            Some(Progress::Completed) => completed_on,
            _ => None,
        };
    }
}
