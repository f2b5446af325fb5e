//! Calendars (the JMAP `Calendar` object)
//!
//! The calendar's server id is the handle every event operation scopes to; it is a
//! protocol-level identifier, not a UID.

use csscolorparser::Color;
use serde::{Deserialize, Serialize};

/// A calendar as the server describes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Calendar {
    /// The server-assigned id, used to scope event operations
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Any CSS color the server advertises, normalized by the parser
    pub color: Option<Color>,
    pub is_default: bool,
    pub is_visible: bool,
    pub is_subscribed: bool,
    pub sort_order: u32,
}

impl Default for Calendar {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            description: None,
            color: None,
            is_default: false,
            is_visible: true,
            is_subscribed: true,
            sort_order: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_parsing() {
        let calendar: Calendar = serde_json::from_value(serde_json::json!({
            "id": "cal-1",
            "name": "Personal",
            "color": "#ff0000",
            "isDefault": true,
            "sortOrder": 3
        }))
        .unwrap();

        assert_eq!(calendar.id, "cal-1");
        assert_eq!(calendar.name, "Personal");
        assert!(calendar.is_default);
        assert!(calendar.is_visible, "visibility defaults to true");
        assert_eq!(calendar.sort_order, 3);
        assert!(calendar.color.is_some());
    }
}
