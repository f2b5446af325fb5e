//! A module to parse iCal text into JSCalendar objects
//!
//! This is the lossy-by-contract half of the conversion layer. Properties with no
//! JSCalendar counterpart (`RDATE`, `COMMENT`, `GEO`, `X-*`, and the server-managed
//! `DTSTAMP`/`CREATED`/`LAST-MODIFIED`) are dropped, silently: asserting that loss is
//! part of the test suite, it is not an oversight.

use std::collections::BTreeMap;

use ical::parser::ical::component::{IcalAlarm, IcalCalendar, IcalEvent, IcalTodo};
use ical::property::Property;
use serde_json::Value;

use super::{read_ical_datetime, read_utc_datetime, split_unescaped_commas, unescape_text};
use crate::error::{Error, Result};
use crate::event::{
    Alert, CalendarEvent, FreeBusyStatus, Location, NDay, Participant, PatchObject, Privacy,
    RecurrenceRule,
};
use crate::task::{CalendarTask, Progress};

/// Keys that never appear in a recurrence-override patch.
const PATCH_EXCLUDED_KEYS: &[&str] = &[
    "@type",
    "uid",
    "recurrenceRules",
    "excludedRecurrenceRules",
    "recurrenceOverrides",
];

/// Parse an iCal file into a [`CalendarEvent`].
///
/// The file must contain exactly one "master" `VEVENT` (the one without a
/// `RECURRENCE-ID`); any further `VEVENT`s must be overrides of it, sharing its UID.
/// Each override becomes a patch containing only the fields that differ from the master.
pub fn parse(content: &str) -> Result<CalendarEvent> {
    let calendar = single_calendar(content)?;

    if calendar.events.is_empty() {
        return Err(Error::Ical("no VEVENT in this iCal data".into()));
    }

    let mut master: Option<&IcalEvent> = None;
    let mut overrides: Vec<&IcalEvent> = Vec::new();
    for vevent in &calendar.events {
        if find_prop(&vevent.properties, "RECURRENCE-ID").is_some() {
            overrides.push(vevent);
        } else if master.is_some() {
            return Err(Error::Ical("multiple master VEVENTs are not supported".into()));
        } else {
            master = Some(vevent);
        }
    }
    let master = master.ok_or_else(|| Error::Ical("only override VEVENTs found, no master".into()))?;

    let mut event = convert_event(master)?;
    let master_json = event.to_json_map();

    for vevent in overrides {
        let rid_prop = find_prop(&vevent.properties, "RECURRENCE-ID")
            .expect("overrides were selected on RECURRENCE-ID presence");
        let rid = read_ical_datetime(
            prop_value(rid_prop)?,
            param(rid_prop, "TZID"),
            param_is(rid_prop, "VALUE", "DATE"),
        )?;

        let mut override_event = convert_event(vevent)?;
        if override_event.uid != event.uid {
            return Err(Error::Ical(format!(
                "override VEVENT has UID {:?}, master has {:?}",
                override_event.uid, event.uid
            )));
        }
        // An occurrence starting at its natural time is not a start change
        if override_event.start.as_deref() == Some(rid.local.as_str()) {
            override_event.start = event.start.clone();
        }

        let patch = diff_patch(&master_json, &override_event.to_json_map());
        event.recurrence_overrides.insert(rid.local, patch);
    }

    Ok(event)
}

/// Parse an iCal file into a [`CalendarTask`] (a single `VTODO`).
pub fn parse_task(content: &str) -> Result<CalendarTask> {
    let calendar = single_calendar(content)?;

    if calendar.todos.len() != 1 {
        return Err(Error::Ical(format!(
            "expected exactly one VTODO, found {}",
            calendar.todos.len()
        )));
    }
    convert_todo(&calendar.todos[0])
}

/// Pull the first (and only) VCALENDAR out of the stream.
fn single_calendar(content: &str) -> Result<IcalCalendar> {
    let mut reader = ical::IcalParser::new(content.as_bytes());
    let calendar = match reader.next() {
        None => return Err(Error::Ical("no iCal data to parse".into())),
        Some(Err(err)) => return Err(Error::Ical(format!("unable to parse iCal data: {}", err))),
        Some(Ok(calendar)) => calendar,
    };

    // What to do with multiple items?
    if reader.next().map(|r| r.is_ok()) == Some(true) {
        return Err(Error::Ical("parsing multiple iCal objects is not supported".into()));
    }

    Ok(calendar)
}

fn convert_event(vevent: &IcalEvent) -> Result<CalendarEvent> {
    let mut event = CalendarEvent::default();
    let mut dtend: Option<super::IcalDateTime> = None;
    let mut organizer: Option<Participant> = None;
    let mut attendees: Vec<Participant> = Vec::new();
    let mut location_seq = 0u32;

    for prop in &vevent.properties {
        match prop.name.as_str() {
            "UID" => event.uid = prop_value(prop)?.to_string(),
            "SUMMARY" => event.title = Some(unescape_text(prop_value(prop)?)),
            "DESCRIPTION" => event.description = Some(unescape_text(prop_value(prop)?)),
            "DTSTART" => {
                let start = read_ical_datetime(
                    prop_value(prop)?,
                    param(prop, "TZID"),
                    param_is(prop, "VALUE", "DATE"),
                )?;
                if start.date_only {
                    event.show_without_time = Some(true);
                }
                event.time_zone = start.time_zone.clone();
                event.start = Some(start.local);
            }
            "DTEND" => {
                dtend = Some(read_ical_datetime(
                    prop_value(prop)?,
                    param(prop, "TZID"),
                    param_is(prop, "VALUE", "DATE"),
                )?);
            }
            "DURATION" => {
                let value = prop_value(prop)?.trim().to_ascii_uppercase();
                super::parse_duration(&value)?;
                event.duration = Some(value);
            }
            "SEQUENCE" => {
                event.sequence = Some(parse_int(prop_value(prop)?, "SEQUENCE")?);
            }
            "PRIORITY" => {
                // PRIORITY:0 means "undefined" and maps to no field at all
                let priority: u32 = parse_int(prop_value(prop)?, "PRIORITY")?;
                if priority != 0 {
                    event.priority = Some(priority);
                }
            }
            "CLASS" => event.privacy = read_class(prop_value(prop)?),
            "TRANSP" => {
                if prop_value(prop)?.eq_ignore_ascii_case("TRANSPARENT") {
                    event.free_busy_status = Some(FreeBusyStatus::Free);
                }
            }
            "COLOR" => event.color = Some(prop_value(prop)?.to_string()),
            "CATEGORIES" => {
                for keyword in split_unescaped_commas(prop_value(prop)?) {
                    event.keywords.insert(unescape_text(&keyword), true);
                }
            }
            "LOCATION" => {
                location_seq += 1;
                event.locations.insert(
                    location_seq.to_string(),
                    Location::named(unescape_text(prop_value(prop)?)),
                );
            }
            "ORGANIZER" => {
                let mut participant = read_cal_address(prop);
                participant.roles.insert("owner".to_string(), true);
                organizer = Some(participant);
            }
            "ATTENDEE" => attendees.push(read_attendee(prop)),
            "RRULE" => event.recurrence_rules.push(parse_rrule(prop_value(prop)?)?),
            "EXRULE" => event
                .excluded_recurrence_rules
                .push(parse_rrule(prop_value(prop)?)?),
            "EXDATE" => {
                for raw in prop_value(prop)?.split(',') {
                    let excluded = read_ical_datetime(
                        raw,
                        param(prop, "TZID"),
                        param_is(prop, "VALUE", "DATE"),
                    )?;
                    let mut patch = PatchObject::new();
                    patch.insert("excluded".to_string(), Value::Bool(true));
                    event.recurrence_overrides.insert(excluded.local, patch);
                }
            }
            // Documented one-way losses (RDATE, COMMENT, GEO, X-*, DTSTAMP, CREATED,
            // LAST-MODIFIED) and anything else without a mapping fall through here
            _ => {}
        }
    }

    if event.uid.is_empty() {
        return Err(Error::Ical("VEVENT has no UID".into()));
    }

    // DTEND and DURATION are mutually derivable, the JSON side only keeps a duration
    if event.duration.is_none() {
        if let (Some(start), Some(end)) = (event.start.as_deref(), dtend.as_ref()) {
            let start = super::parse_local(start)?;
            let end = super::parse_local(&end.local)?;
            event.duration = Some(super::format_duration(&(end - start)));
        }
    }

    event.participants = assemble_participants(organizer, attendees);

    let mut alert_seq = 0u32;
    for alarm in &vevent.alarms {
        if let Some(alert) = convert_alarm(alarm)? {
            alert_seq += 1;
            event.alerts.insert(alert_seq.to_string(), alert);
        }
    }

    Ok(event)
}

fn convert_todo(vtodo: &IcalTodo) -> Result<CalendarTask> {
    let mut task = CalendarTask::default();
    let mut completed_on: Option<String> = None;

    for prop in &vtodo.properties {
        match prop.name.as_str() {
            "UID" => task.uid = prop_value(prop)?.to_string(),
            "SUMMARY" => task.title = Some(unescape_text(prop_value(prop)?)),
            "DESCRIPTION" => task.description = Some(unescape_text(prop_value(prop)?)),
            "DUE" => {
                let due = read_ical_datetime(
                    prop_value(prop)?,
                    param(prop, "TZID"),
                    param_is(prop, "VALUE", "DATE"),
                )?;
                if due.date_only {
                    task.show_without_time = Some(true);
                }
                task.time_zone = due.time_zone.clone();
                task.due = Some(due.local);
            }
            "STATUS" => {
                task.progress = match prop_value(prop)?.to_ascii_uppercase().as_str() {
                    "NEEDS-ACTION" => Some(Progress::NeedsAction),
                    "IN-PROCESS" => Some(Progress::InProcess),
                    "COMPLETED" => Some(Progress::Completed),
                    "CANCELLED" => Some(Progress::Cancelled),
                    _ => None,
                };
            }
            "COMPLETED" => completed_on = Some(read_utc_datetime(prop_value(prop)?)?),
            "PERCENT-COMPLETE" => {
                task.percent_complete = Some(parse_int(prop_value(prop)?, "PERCENT-COMPLETE")?);
            }
            "PRIORITY" => {
                let priority: u32 = parse_int(prop_value(prop)?, "PRIORITY")?;
                if priority != 0 {
                    task.priority = Some(priority);
                }
            }
            "SEQUENCE" => task.sequence = Some(parse_int(prop_value(prop)?, "SEQUENCE")?),
            "CLASS" => task.privacy = read_class(prop_value(prop)?),
            "CATEGORIES" => {
                for keyword in split_unescaped_commas(prop_value(prop)?) {
                    task.keywords.insert(unescape_text(&keyword), true);
                }
            }
            _ => {}
        }
    }

    if task.uid.is_empty() {
        return Err(Error::Ical("VTODO has no UID".into()));
    }

    // A completion date only makes sense on a completed task
    if completed_on.is_some() && task.progress.is_none() {
        task.progress = Some(Progress::Completed);
    }
    task.completed = match task.progress {
        Some(Progress::Completed) => completed_on,
        _ => None,
    };

    Ok(task)
}

fn convert_alarm(alarm: &IcalAlarm) -> Result<Option<Alert>> {
    let trigger_prop = match find_prop(&alarm.properties, "TRIGGER") {
        Some(prop) => prop,
        // A VALARM without TRIGGER is not usable, skip it
        None => return Ok(None),
    };
    let raw = prop_value(trigger_prop)?.trim();

    let mut alert = Alert::default();
    let relative = !param_is(trigger_prop, "VALUE", "DATE-TIME")
        && (raw.starts_with('P') || raw.starts_with("-P") || raw.starts_with("+P"));
    if relative {
        super::parse_duration(raw)?;
        alert.trigger = raw.to_string();
        if param_is(trigger_prop, "RELATED", "END") {
            alert.relative_to = Some("end".to_string());
        }
    } else {
        alert.trigger = read_utc_datetime(raw)?;
    }

    if let Some(action) = find_prop(&alarm.properties, "ACTION") {
        alert.action = match prop_value(action)?.to_ascii_uppercase().as_str() {
            "EMAIL" => Some("email".to_string()),
            // JSCalendar has no audio action, DISPLAY is the closest rendition
            "DISPLAY" | "AUDIO" => Some("display".to_string()),
            _ => None,
        };
    }

    Ok(Some(alert))
}

/// Common part of `ORGANIZER` and `ATTENDEE`: a cal-address plus a `CN` name.
fn read_cal_address(prop: &Property) -> Participant {
    let mut participant = Participant::default();
    if let Some(value) = prop.value.as_deref() {
        let email = value.strip_prefix("mailto:").unwrap_or(value);
        participant.email = Some(email.to_string());
    }
    if let Some(name) = param(prop, "CN") {
        participant.name = Some(name.trim_matches('"').to_string());
    }
    participant
}

fn read_attendee(prop: &Property) -> Participant {
    let mut participant = read_cal_address(prop);

    match param(prop, "ROLE").map(|r| r.to_ascii_uppercase()) {
        Some(role) if role == "CHAIR" => {
            participant.roles.insert("attendee".to_string(), true);
            participant.roles.insert("chair".to_string(), true);
        }
        Some(role) if role == "OPT-PARTICIPANT" => {
            participant.roles.insert("attendee".to_string(), true);
            participant.roles.insert("optional".to_string(), true);
        }
        Some(role) if role == "NON-PARTICIPANT" => {
            participant.roles.insert("informational".to_string(), true);
        }
        // REQ-PARTICIPANT, unknown roles and no role at all are plain attendees
        _ => {
            participant.roles.insert("attendee".to_string(), true);
        }
    }

    if let Some(partstat) = param(prop, "PARTSTAT") {
        let status = partstat.to_ascii_lowercase();
        if matches!(
            status.as_str(),
            "needs-action" | "accepted" | "declined" | "tentative" | "delegated"
        ) {
            participant.participation_status = Some(status);
        }
    }

    if let Some(cutype) = param(prop, "CUTYPE") {
        participant.kind = match cutype.to_ascii_uppercase().as_str() {
            "INDIVIDUAL" => Some("individual".to_string()),
            "GROUP" => Some("group".to_string()),
            "RESOURCE" => Some("resource".to_string()),
            "ROOM" => Some("location".to_string()),
            _ => None,
        };
    }

    if param(prop, "RSVP").map(|v| v.eq_ignore_ascii_case("TRUE")) == Some(true) {
        participant.expect_reply = Some(true);
    }

    participant
}

/// Merge the organizer into the attendee list (they are often the same person) and
/// key everyone with deterministic positional ids, so that parsing is a pure function.
fn assemble_participants(
    organizer: Option<Participant>,
    mut attendees: Vec<Participant>,
) -> BTreeMap<String, Participant> {
    if let Some(organizer) = organizer {
        let same_address = attendees
            .iter_mut()
            .find(|a| a.email.is_some() && a.email == organizer.email);
        match same_address {
            Some(attendee) => {
                attendee.roles.insert("owner".to_string(), true);
                if attendee.name.is_none() {
                    attendee.name = organizer.name;
                }
            }
            None => attendees.insert(0, organizer),
        }
    }

    attendees
        .into_iter()
        .enumerate()
        .map(|(i, p)| ((i + 1).to_string(), p))
        .collect()
}

fn read_class(value: &str) -> Option<Privacy> {
    match value.to_ascii_uppercase().as_str() {
        "PUBLIC" => Some(Privacy::Public),
        "PRIVATE" => Some(Privacy::Private),
        "CONFIDENTIAL" => Some(Privacy::Secret),
        _ => None,
    }
}

/// Parse an `RRULE`/`EXRULE` value into the structured JSCalendar rule.
fn parse_rrule(value: &str) -> Result<RecurrenceRule> {
    let mut rule = RecurrenceRule::default();

    for part in value.split(';').filter(|p| !p.is_empty()) {
        let mut kv = part.splitn(2, '=');
        let key = kv.next().unwrap_or_default().to_ascii_uppercase();
        let val = kv
            .next()
            .ok_or_else(|| Error::Ical(format!("RRULE part {:?} has no value", part)))?;

        match key.as_str() {
            "FREQ" => rule.frequency = val.to_ascii_lowercase(),
            "INTERVAL" => {
                let interval: u32 = parse_int(val, "INTERVAL")?;
                // 1 is the implied default and is not represented explicitly
                if interval > 1 {
                    rule.interval = Some(interval);
                }
            }
            "RSCALE" => rule.rscale = Some(val.to_ascii_lowercase()),
            "SKIP" => rule.skip = Some(val.to_ascii_lowercase()),
            "WKST" => rule.first_day_of_week = Some(val.to_ascii_lowercase()),
            "BYDAY" => {
                let mut days = Vec::new();
                for day in val.split(',') {
                    days.push(parse_nday(day)?);
                }
                rule.by_day = Some(days);
            }
            "BYMONTHDAY" => rule.by_month_day = Some(parse_int_list(val, "BYMONTHDAY")?),
            "BYMONTH" => {
                rule.by_month = Some(val.split(',').map(|m| m.to_string()).collect());
            }
            "BYYEARDAY" => rule.by_year_day = Some(parse_int_list(val, "BYYEARDAY")?),
            "BYWEEKNO" => rule.by_week_no = Some(parse_int_list(val, "BYWEEKNO")?),
            "BYHOUR" => rule.by_hour = Some(parse_int_list(val, "BYHOUR")?),
            "BYMINUTE" => rule.by_minute = Some(parse_int_list(val, "BYMINUTE")?),
            "BYSECOND" => rule.by_second = Some(parse_int_list(val, "BYSECOND")?),
            "BYSETPOS" => rule.by_set_position = Some(parse_int_list(val, "BYSETPOS")?),
            "COUNT" => rule.count = Some(parse_int(val, "COUNT")?),
            "UNTIL" => {
                let until = read_ical_datetime(val, None, val.len() == 8)?;
                rule.until = Some(until.local);
            }
            _ => {}
        }
    }

    if rule.frequency.is_empty() {
        return Err(Error::Ical(format!("RRULE {:?} has no FREQ", value)));
    }
    Ok(rule)
}

fn parse_nday(day: &str) -> Result<NDay> {
    let day = day.trim();
    let split = day
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| Error::Ical(format!("invalid BYDAY entry {:?}", day)))?;
    let (ordinal, weekday) = day.split_at(split);

    let mut nday = NDay {
        day: weekday.to_ascii_lowercase(),
        ..NDay::default()
    };
    if !ordinal.is_empty() {
        nday.nth_of_period = Some(
            ordinal
                .parse()
                .map_err(|_| Error::Ical(format!("invalid BYDAY ordinal {:?}", day)))?,
        );
    }
    Ok(nday)
}

/// Compute the patch between a master event and one of its overrides: keys whose
/// values differ carry the override value, mapped keys the override dropped carry
/// `null`. The patch is minimal, it never contains an unchanged field.
fn diff_patch(master: &PatchObject, override_json: &PatchObject) -> PatchObject {
    let mut patch = PatchObject::new();

    for (key, value) in override_json {
        if PATCH_EXCLUDED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if master.get(key) != Some(value) {
            patch.insert(key.clone(), value.clone());
        }
    }
    for key in master.keys() {
        if PATCH_EXCLUDED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if !override_json.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }

    patch
}

fn find_prop<'a>(properties: &'a [Property], name: &str) -> Option<&'a Property> {
    properties.iter().find(|prop| prop.name == name)
}

fn prop_value(prop: &Property) -> Result<&str> {
    prop.value
        .as_deref()
        .ok_or_else(|| Error::Ical(format!("property {} has no value", prop.name)))
}

fn param<'a>(prop: &'a Property, key: &str) -> Option<&'a str> {
    prop.params.as_ref().and_then(|params| {
        params
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .and_then(|(_, values)| values.first())
            .map(|v| v.as_str())
    })
}

fn param_is(prop: &Property, key: &str, expected: &str) -> bool {
    param(prop, key).map(|v| v.eq_ignore_ascii_case(expected)) == Some(true)
}

fn parse_int<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Ical(format!("invalid {} value {:?}", what, value)))
}

fn parse_int_list<T: std::str::FromStr>(value: &str, what: &str) -> Result<Vec<T>> {
    value.split(',').map(|v| parse_int(v, what)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_ICAL: &str = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:-//Nextcloud Calendar v3.3.1
BEGIN:VEVENT
UID:abc-123
DTSTAMP:20260110T120000Z
SUMMARY:Team sync
DESCRIPTION:Weekly catch-up\, bring coffee
DTSTART:20260115T100000Z
DTEND:20260115T110000Z
SEQUENCE:2
PRIORITY:5
CLASS:CONFIDENTIAL
TRANSP:TRANSPARENT
CATEGORIES:WORK,MEETING
LOCATION:Room 42
END:VEVENT
END:VCALENDAR
"#;

    const EXAMPLE_RECURRING: &str = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:-//Test//
BEGIN:VEVENT
UID:rec-1
DTSTAMP:20260101T000000Z
SUMMARY:Standup
DTSTART;TZID=Europe/Paris:20260105T093000
DTEND;TZID=Europe/Paris:20260105T094500
RRULE:FREQ=WEEKLY;BYDAY=MO,WE;COUNT=10;WKST=SU
EXDATE;TZID=Europe/Paris:20260112T093000
END:VEVENT
BEGIN:VEVENT
UID:rec-1
DTSTAMP:20260101T000000Z
RECURRENCE-ID;TZID=Europe/Paris:20260114T093000
SUMMARY:Standup (moved room)
DTSTART;TZID=Europe/Paris:20260114T093000
DTEND;TZID=Europe/Paris:20260114T094500
END:VEVENT
END:VCALENDAR
"#;

    const EXAMPLE_TODO: &str = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:-//Nextcloud Tasks v0.13.6
BEGIN:VTODO
UID:0633de27-8c32-42be-bcb8-63bc879c6185
CREATED:20210321T001600
LAST-MODIFIED:20210321T001600
DTSTAMP:20210321T001600
SUMMARY:Do not forget to do this
DUE;VALUE=DATE:20260201
STATUS:COMPLETED
COMPLETED:20260115T160000Z
PERCENT-COMPLETE:100
END:VTODO
END:VCALENDAR
"#;

    #[test]
    fn test_basic_event_parsing() {
        let event = parse(EXAMPLE_ICAL).unwrap();

        assert_eq!(event.uid, "abc-123");
        assert_eq!(event.title.as_deref(), Some("Team sync"));
        assert_eq!(event.description.as_deref(), Some("Weekly catch-up, bring coffee"));
        assert_eq!(event.start.as_deref(), Some("2026-01-15T10:00:00"));
        assert_eq!(event.time_zone.as_deref(), Some("Etc/UTC"));
        assert_eq!(event.duration.as_deref(), Some("PT1H"));
        assert_eq!(event.sequence, Some(2));
        assert_eq!(event.priority, Some(5));
        assert_eq!(event.privacy, Some(Privacy::Secret));
        assert_eq!(event.free_busy_status, Some(FreeBusyStatus::Free));
        assert_eq!(event.keyword_set(), vec!["MEETING", "WORK"]);
        assert_eq!(event.locations["1"].name.as_deref(), Some("Room 42"));
        assert_eq!(event.show_without_time, None);
    }

    #[test]
    fn test_dropped_properties_stay_dropped() {
        let event = parse(EXAMPLE_ICAL).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        // DTSTAMP is server-managed and must not survive the conversion
        assert!(json.get("dtstamp").is_none());
        assert!(json.get("created").is_none());
    }

    #[test]
    fn test_priority_zero_is_undefined() {
        let ical = EXAMPLE_ICAL.replace("PRIORITY:5", "PRIORITY:0");
        let event = parse(&ical).unwrap();
        assert_eq!(event.priority, None);
    }

    #[test]
    fn test_recurring_event_parsing() {
        let event = parse(EXAMPLE_RECURRING).unwrap();

        assert_eq!(event.time_zone.as_deref(), Some("Europe/Paris"));
        assert_eq!(event.recurrence_rules.len(), 1);
        let rule = &event.recurrence_rules[0];
        assert_eq!(rule.frequency, "weekly");
        assert_eq!(rule.count, Some(10));
        assert_eq!(rule.first_day_of_week.as_deref(), Some("su"));
        assert_eq!(rule.interval, None);
        let by_day = rule.by_day.as_ref().unwrap();
        assert_eq!(by_day.len(), 2);
        assert_eq!(by_day[0].day, "mo");
        assert_eq!(by_day[0].nth_of_period, None);

        // The EXDATE is an excluded override
        let excluded = &event.recurrence_overrides["2026-01-12T09:30:00"];
        assert_eq!(excluded.get("excluded"), Some(&Value::Bool(true)));

        // The modified occurrence is a patch with only the differing fields
        let patch = &event.recurrence_overrides["2026-01-14T09:30:00"];
        assert_eq!(
            patch.get("title"),
            Some(&Value::String("Standup (moved room)".to_string()))
        );
        assert!(patch.get("uid").is_none());
        assert!(patch.get("start").is_none(), "natural start must not be patched");
        assert!(patch.get("duration").is_none(), "unchanged duration must not be patched");
    }

    #[test]
    fn test_attendee_parsing() {
        let ical = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:-//Test//
BEGIN:VEVENT
UID:meet-1
DTSTAMP:20260101T000000Z
SUMMARY:Planning
DTSTART:20260115T100000Z
ORGANIZER;CN=Alice:mailto:alice@example.com
ATTENDEE;PARTSTAT=ACCEPTED;ROLE=REQ-PARTICIPANT:mailto:bob@example.com
ATTENDEE;PARTSTAT=TENTATIVE;ROLE=CHAIR;CN=Alice:mailto:alice@example.com
ATTENDEE;ROLE=OPT-PARTICIPANT;RSVP=TRUE;CUTYPE=INDIVIDUAL:mailto:carol@example.com
END:VEVENT
END:VCALENDAR
"#;
        let event = parse(ical).unwrap();
        assert_eq!(event.participants.len(), 3);

        let bob = &event.participants["1"];
        assert_eq!(bob.email.as_deref(), Some("bob@example.com"));
        assert_eq!(bob.participation_status.as_deref(), Some("accepted"));
        assert!(bob.has_role("attendee"));
        assert!(!bob.has_role("chair"));

        // Alice is both organizer and chair attendee, merged into one participant
        let alice = &event.participants["2"];
        assert_eq!(alice.email.as_deref(), Some("alice@example.com"));
        assert!(alice.has_role("owner"));
        assert!(alice.has_role("chair"));
        assert_eq!(alice.name.as_deref(), Some("Alice"));

        let carol = &event.participants["3"];
        assert!(carol.has_role("optional"));
        assert_eq!(carol.expect_reply, Some(true));
        assert_eq!(carol.kind.as_deref(), Some("individual"));
    }

    #[test]
    fn test_alarm_parsing() {
        let ical = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:-//Test//
BEGIN:VEVENT
UID:alarm-1
DTSTAMP:20260101T000000Z
SUMMARY:Dentist
DTSTART:20260115T100000Z
BEGIN:VALARM
ACTION:DISPLAY
DESCRIPTION:Reminder
TRIGGER:-PT15M
END:VALARM
BEGIN:VALARM
ACTION:EMAIL
DESCRIPTION:Reminder
SUMMARY:Reminder
TRIGGER;VALUE=DATE-TIME:20260115T080000Z
END:VALARM
END:VEVENT
END:VCALENDAR
"#;
        let event = parse(ical).unwrap();
        assert_eq!(event.alerts.len(), 2);
        assert_eq!(event.alerts["1"].trigger, "-PT15M");
        assert_eq!(event.alerts["1"].action.as_deref(), Some("display"));
        assert_eq!(event.alerts["2"].trigger, "2026-01-15T08:00:00Z");
        assert_eq!(event.alerts["2"].action.as_deref(), Some("email"));
    }

    #[test]
    fn test_all_day_parsing() {
        let ical = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:-//Test//
BEGIN:VEVENT
UID:allday-1
DTSTAMP:20260101T000000Z
SUMMARY:Conference
DTSTART;VALUE=DATE:20260301
DTEND;VALUE=DATE:20260303
END:VEVENT
END:VCALENDAR
"#;
        let event = parse(ical).unwrap();
        assert_eq!(event.show_without_time, Some(true));
        assert_eq!(event.start.as_deref(), Some("2026-03-01T00:00:00"));
        assert_eq!(event.duration.as_deref(), Some("P2D"));
    }

    #[test]
    fn test_opaque_tzid_passthrough() {
        let ical = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:-//Test//
BEGIN:VEVENT
UID:win-1
DTSTAMP:20260101T000000Z
SUMMARY:Legacy
DTSTART;TZID=W. Europe Standard Time:20260115T100000
END:VEVENT
END:VCALENDAR
"#;
        let event = parse(ical).unwrap();
        assert_eq!(event.time_zone.as_deref(), Some("W. Europe Standard Time"));
    }

    #[test]
    fn test_todo_parsing() {
        let task = parse_task(EXAMPLE_TODO).unwrap();
        assert_eq!(task.uid, "0633de27-8c32-42be-bcb8-63bc879c6185");
        assert_eq!(task.title.as_deref(), Some("Do not forget to do this"));
        assert_eq!(task.due.as_deref(), Some("2026-02-01T00:00:00"));
        assert_eq!(task.show_without_time, Some(true));
        assert!(task.is_completed());
        assert_eq!(task.completed.as_deref(), Some("2026-01-15T16:00:00Z"));
        assert_eq!(task.percent_complete, Some(100));
    }

    #[test]
    fn test_multiple_objects_are_rejected() {
        let twice = format!("{}{}", EXAMPLE_TODO, EXAMPLE_TODO);
        assert!(parse_task(&twice).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(parse("this is not ical").is_err());
        assert!(parse_task("BEGIN:VCALENDAR\nEND:VCALENDAR\n").is_err());
    }
}
