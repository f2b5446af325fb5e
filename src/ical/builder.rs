//! A module to build iCal text from JSCalendar objects
//!
//! The reverse half of the conversion layer. JSON-only fields (`virtualLocations`,
//! `links`, `localizations`, per-user overlays) have no iCal counterpart and are not
//! emitted; multiple locations collapse to the first one. Both are documented, tested
//! fidelity losses, not bugs.

use chrono::{DateTime, Utc};
use ics::components::{Parameter, Property};
use ics::properties::{
    Attendee, Categories, Class, Completed, Description, DtEnd, DtStart, Due, ExDate,
    Location as IcsLocation, Organizer, Priority, RRule, Sequence, Status, Summary, Transp,
    Trigger,
};
use ics::{Alarm, Event as IcsEvent, ICalendar, ToDo};

use super::{ical_date, ical_datetime, is_utc_zone, parse_duration, parse_local, utc_to_ical};
use crate::error::{Error, Result};
use crate::event::{CalendarEvent, FreeBusyStatus, NDay, Participant, PatchObject, Privacy, RecurrenceRule};
use crate::task::{CalendarTask, Progress};

/// Serialize a [`CalendarEvent`] to iCal text.
///
/// `DTSTAMP` is regenerated from the current clock on every call: repeatedly fetching
/// and re-storing an event advances its timestamp even when nothing else changed.
/// Use [`build_from_with_timestamp`] when reproducible output matters.
pub fn build_from(event: &CalendarEvent) -> Result<String> {
    build_from_with_timestamp(event, Utc::now())
}

/// Serialize a [`CalendarEvent`] to iCal text with an explicit `DTSTAMP`.
///
/// This is the pure core: identical input (event and timestamp) yields byte-identical
/// output, and the event is never mutated.
pub fn build_from_with_timestamp(event: &CalendarEvent, dtstamp: DateTime<Utc>) -> Result<String> {
    if event.uid.is_empty() {
        return Err(Error::Ical("cannot serialize an event without a uid".into()));
    }
    let stamp = format_stamp(dtstamp);

    let mut calendar = ICalendar::new("2.0", super::default_prod_id());
    calendar.add_event(build_vevent(event, None, &stamp)?);

    // Modified occurrences become their own VEVENTs keyed by RECURRENCE-ID;
    // excluded ones were already emitted as EXDATE on the master
    for (recurrence_id, patch) in &event.recurrence_overrides {
        if is_exclusion(patch) {
            continue;
        }
        let mut patched = apply_patch(event, patch)?;
        // Unless the patch moved it, the occurrence starts at its natural time
        if !patch.contains_key("start") {
            patched.start = Some(recurrence_id.clone());
        }
        calendar.add_event(build_vevent(&patched, Some(recurrence_id), &stamp)?);
    }

    Ok(calendar.to_string())
}

/// Serialize a [`CalendarTask`] to iCal text (a `VTODO`).
///
/// Same `DTSTAMP` caveat as [`build_from`].
pub fn build_from_task(task: &CalendarTask) -> Result<String> {
    build_from_task_with_timestamp(task, Utc::now())
}

/// Serialize a [`CalendarTask`] to iCal text with an explicit `DTSTAMP`.
pub fn build_from_task_with_timestamp(task: &CalendarTask, dtstamp: DateTime<Utc>) -> Result<String> {
    if task.uid.is_empty() {
        return Err(Error::Ical("cannot serialize a task without a uid".into()));
    }

    let mut todo = ToDo::new(task.uid.clone(), format_stamp(dtstamp));

    if let Some(title) = &task.title {
        todo.push(Summary::new(escape(title)));
    }
    if let Some(description) = &task.description {
        todo.push(Description::new(escape(description)));
    }

    if let Some(due) = &task.due {
        let all_day = task.show_without_time == Some(true);
        let utc = task.time_zone.as_deref().map(is_utc_zone) == Some(true);
        if all_day {
            let mut prop = Due::new(ical_date(due)?);
            prop.add(Parameter::new("VALUE", "DATE"));
            todo.push(prop);
        } else {
            let mut prop = Due::new(ical_datetime(due, utc)?);
            if !utc {
                if let Some(zone) = &task.time_zone {
                    prop.add(Parameter::new("TZID", zone.clone()));
                }
            }
            todo.push(prop);
        }
    }

    match task.progress {
        Some(Progress::NeedsAction) => todo.push(Status::needs_action()),
        Some(Progress::InProcess) => todo.push(Status::in_process()),
        Some(Progress::Completed) => todo.push(Status::completed()),
        Some(Progress::Cancelled) => todo.push(Status::cancelled()),
        // RFC 5545 has no VTODO status for a failed task
        Some(Progress::Failed) | None => {}
    }
    if task.is_completed() {
        if let Some(completed) = &task.completed {
            todo.push(Completed::new(utc_to_ical(completed)?));
        }
    }
    if let Some(percent) = task.percent_complete {
        todo.push(Property::new("PERCENT-COMPLETE", percent.to_string()));
    }

    if let Some(sequence) = task.sequence {
        todo.push(Sequence::new(sequence.to_string()));
    }
    if let Some(priority) = task.priority {
        todo.push(Priority::new(priority.to_string()));
    }
    if let Some(class) = class_value(task.privacy) {
        todo.push(Class::new(class));
    }
    if !task.keywords.is_empty() {
        todo.push(Categories::new(join_keywords(&task.keywords)));
    }

    let mut calendar = ICalendar::new("2.0", super::default_prod_id());
    calendar.add_todo(todo);
    Ok(calendar.to_string())
}

fn build_vevent(
    event: &CalendarEvent,
    recurrence_id: Option<&str>,
    stamp: &str,
) -> Result<IcsEvent<'static>> {
    let mut vevent = IcsEvent::new(event.uid.clone(), stamp.to_string());

    let all_day = event.show_without_time == Some(true);
    let utc = event.time_zone.as_deref().map(is_utc_zone) == Some(true);

    if let Some(rid) = recurrence_id {
        let mut prop = if all_day {
            let mut p = Property::new("RECURRENCE-ID", ical_date(rid)?);
            p.add(Parameter::new("VALUE", "DATE"));
            p
        } else {
            Property::new("RECURRENCE-ID", ical_datetime(rid, utc)?)
        };
        if !utc && !all_day {
            if let Some(zone) = &event.time_zone {
                prop.add(Parameter::new("TZID", zone.clone()));
            }
        }
        vevent.push(prop);
    }

    if let Some(title) = &event.title {
        vevent.push(Summary::new(escape(title)));
    }
    if let Some(description) = &event.description {
        vevent.push(Description::new(escape(description)));
    }

    if let Some(start) = &event.start {
        if all_day {
            let mut prop = DtStart::new(ical_date(start)?);
            prop.add(Parameter::new("VALUE", "DATE"));
            vevent.push(prop);
        } else {
            let mut prop = DtStart::new(ical_datetime(start, utc)?);
            if !utc {
                if let Some(zone) = &event.time_zone {
                    prop.add(Parameter::new("TZID", zone.clone()));
                }
            }
            vevent.push(prop);
        }

        // DTEND is rebuilt from start + duration; fractional seconds were already
        // truncated by the duration parser
        if let Some(duration) = &event.duration {
            let end = parse_local(start)? + parse_duration(duration)?;
            let end_local = super::format_local(&end);
            if all_day {
                let mut prop = DtEnd::new(ical_date(&end_local)?);
                prop.add(Parameter::new("VALUE", "DATE"));
                vevent.push(prop);
            } else {
                let mut prop = DtEnd::new(ical_datetime(&end_local, utc)?);
                if !utc {
                    if let Some(zone) = &event.time_zone {
                        prop.add(Parameter::new("TZID", zone.clone()));
                    }
                }
                vevent.push(prop);
            }
        }
    }

    if let Some(class) = class_value(event.privacy) {
        vevent.push(Class::new(class));
    }
    // OPAQUE is the implied default and is never written out explicitly
    if event.free_busy_status == Some(FreeBusyStatus::Free) {
        vevent.push(Transp::new("TRANSPARENT"));
    }
    if let Some(sequence) = event.sequence {
        vevent.push(Sequence::new(sequence.to_string()));
    }
    if let Some(priority) = event.priority {
        vevent.push(Priority::new(priority.to_string()));
    }
    if let Some(color) = &event.color {
        vevent.push(Property::new("COLOR", color.clone()));
    }
    if !event.keywords.is_empty() {
        vevent.push(Categories::new(join_keywords(&event.keywords)));
    }

    // Several locations cannot be represented in a single LOCATION property:
    // the first one wins, the rest are dropped
    if let Some(location) = event.locations.values().next() {
        if let Some(name) = &location.name {
            vevent.push(IcsLocation::new(escape(name)));
        }
    }

    if let Some(organizer) = event.participants.values().find(|p| p.has_role("owner")) {
        if let Some(email) = &organizer.email {
            let mut prop = Organizer::new(format!("mailto:{}", email));
            if let Some(name) = &organizer.name {
                prop.add(Parameter::new("CN", name.clone()));
            }
            vevent.push(prop);
        }
    }
    for participant in event.participants.values() {
        if let Some(prop) = build_attendee(participant) {
            vevent.push(prop);
        }
    }

    for rule in &event.recurrence_rules {
        vevent.push(RRule::new(rrule_value(rule)?));
    }
    for rule in &event.excluded_recurrence_rules {
        vevent.push(Property::new("EXRULE", rrule_value(rule)?));
    }

    for (rid, patch) in &event.recurrence_overrides {
        if !is_exclusion(patch) {
            continue;
        }
        if all_day {
            let mut prop = ExDate::new(ical_date(rid)?);
            prop.add(Parameter::new("VALUE", "DATE"));
            vevent.push(prop);
        } else {
            let mut prop = ExDate::new(ical_datetime(rid, utc)?);
            if !utc {
                if let Some(zone) = &event.time_zone {
                    prop.add(Parameter::new("TZID", zone.clone()));
                }
            }
            vevent.push(prop);
        }
    }

    for alert in event.alerts.values() {
        let trigger_value = alert.trigger.trim();
        let relative = trigger_value.starts_with('P')
            || trigger_value.starts_with("-P")
            || trigger_value.starts_with("+P");
        let trigger = if relative {
            let mut t = Trigger::new(trigger_value.to_string());
            if alert.relative_to.as_deref() == Some("end") {
                t.add(Parameter::new("RELATED", "END"));
            }
            t
        } else {
            let mut t = Trigger::new(utc_to_ical(trigger_value)?);
            t.add(Parameter::new("VALUE", "DATE-TIME"));
            t
        };

        let alarm = if alert.action.as_deref() == Some("email") {
            Alarm::email(trigger, Description::new("Reminder"), Summary::new("Reminder"))
        } else {
            Alarm::display(trigger, Description::new("Reminder"))
        };
        vevent.add_alarm(alarm);
    }

    Ok(vevent)
}

fn build_attendee(participant: &Participant) -> Option<Property<'static>> {
    let is_attendee = participant.has_role("attendee")
        || participant.has_role("chair")
        || participant.has_role("optional")
        || participant.has_role("informational");
    if !is_attendee {
        return None;
    }
    let email = participant.email.as_ref()?;

    let mut prop = Attendee::new(format!("mailto:{}", email));
    if let Some(name) = &participant.name {
        prop.add(Parameter::new("CN", name.clone()));
    }
    if let Some(cutype) = participant.kind.as_deref().and_then(|kind| match kind {
        "individual" => Some("INDIVIDUAL"),
        "group" => Some("GROUP"),
        "resource" => Some("RESOURCE"),
        "location" => Some("ROOM"),
        _ => None,
    }) {
        prop.add(Parameter::new("CUTYPE", cutype));
    }

    let role = if participant.has_role("chair") {
        "CHAIR"
    } else if participant.has_role("optional") {
        "OPT-PARTICIPANT"
    } else if participant.has_role("attendee") {
        "REQ-PARTICIPANT"
    } else {
        "NON-PARTICIPANT"
    };
    prop.add(Parameter::new("ROLE", role));

    if let Some(status) = &participant.participation_status {
        prop.add(Parameter::new("PARTSTAT", status.to_ascii_uppercase()));
    }
    if participant.expect_reply == Some(true) {
        prop.add(Parameter::new("RSVP", "TRUE"));
    }

    Some(prop.into())
}

/// Rebuild the `RRULE` value string from a structured rule, in a fixed part order.
fn rrule_value(rule: &RecurrenceRule) -> Result<String> {
    if rule.frequency.is_empty() {
        return Err(Error::Ical("recurrence rule has no frequency".into()));
    }
    let mut parts = vec![format!("FREQ={}", rule.frequency.to_ascii_uppercase())];

    if let Some(rscale) = &rule.rscale {
        parts.push(format!("RSCALE={}", rscale.to_ascii_uppercase()));
    }
    if let Some(skip) = &rule.skip {
        parts.push(format!("SKIP={}", skip.to_ascii_uppercase()));
    }
    if let Some(interval) = rule.interval {
        parts.push(format!("INTERVAL={}", interval));
    }
    if let Some(by_day) = &rule.by_day {
        let days: Vec<String> = by_day.iter().map(nday_value).collect();
        parts.push(format!("BYDAY={}", days.join(",")));
    }
    if let Some(list) = &rule.by_month_day {
        parts.push(format!("BYMONTHDAY={}", join_ints(list)));
    }
    if let Some(months) = &rule.by_month {
        parts.push(format!("BYMONTH={}", months.join(",")));
    }
    if let Some(list) = &rule.by_year_day {
        parts.push(format!("BYYEARDAY={}", join_ints(list)));
    }
    if let Some(list) = &rule.by_week_no {
        parts.push(format!("BYWEEKNO={}", join_ints(list)));
    }
    if let Some(list) = &rule.by_hour {
        parts.push(format!("BYHOUR={}", join_ints(list)));
    }
    if let Some(list) = &rule.by_minute {
        parts.push(format!("BYMINUTE={}", join_ints(list)));
    }
    if let Some(list) = &rule.by_second {
        parts.push(format!("BYSECOND={}", join_ints(list)));
    }
    if let Some(list) = &rule.by_set_position {
        parts.push(format!("BYSETPOS={}", join_ints(list)));
    }
    if let Some(count) = rule.count {
        parts.push(format!("COUNT={}", count));
    }
    if let Some(until) = &rule.until {
        parts.push(format!("UNTIL={}", ical_datetime(until, true)?));
    }
    if let Some(wkst) = &rule.first_day_of_week {
        parts.push(format!("WKST={}", wkst.to_ascii_uppercase()));
    }

    Ok(parts.join(";"))
}

fn nday_value(nday: &NDay) -> String {
    match nday.nth_of_period {
        Some(nth) => format!("{}{}", nth, nday.day.to_ascii_uppercase()),
        None => nday.day.to_ascii_uppercase(),
    }
}

fn join_ints<T: std::fmt::Display>(list: &[T]) -> String {
    list.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn join_keywords(keywords: &std::collections::BTreeMap<String, bool>) -> String {
    keywords
        .iter()
        .filter(|(_, set)| **set)
        .map(|(kw, _)| escape(kw))
        .collect::<Vec<_>>()
        .join(",")
}

fn class_value(privacy: Option<Privacy>) -> Option<&'static str> {
    match privacy {
        Some(Privacy::Public) => Some("PUBLIC"),
        Some(Privacy::Private) => Some("PRIVATE"),
        Some(Privacy::Secret) => Some("CONFIDENTIAL"),
        None => None,
    }
}

fn is_exclusion(patch: &PatchObject) -> bool {
    patch.get("excluded") == Some(&serde_json::Value::Bool(true))
}

/// Materialize one overridden occurrence: apply the patch to the master's JSON
/// (`null` removes a key) and read the result back as an event.
fn apply_patch(master: &CalendarEvent, patch: &PatchObject) -> Result<CalendarEvent> {
    let mut json = master.to_json_map();
    for (key, value) in patch {
        if value.is_null() {
            json.remove(key);
        } else {
            json.insert(key.clone(), value.clone());
        }
    }
    // An override occurrence does not itself recur
    json.remove("recurrenceRules");
    json.remove("excludedRecurrenceRules");
    json.remove("recurrenceOverrides");

    serde_json::from_value(serde_json::Value::Object(json))
        .map_err(|err| Error::Ical(format!("unusable recurrence override patch: {}", err)))
}

fn format_stamp(dtstamp: DateTime<Utc>) -> String {
    dtstamp.format("%Y%m%dT%H%M%SZ").to_string()
}

fn escape(text: &str) -> String {
    ics::escape_text(text).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stamp() -> DateTime<Utc> {
        Utc.ymd(2026, 1, 10).and_hms(12, 0, 0)
    }

    #[test]
    fn test_ical_from_event() {
        let mut event = CalendarEvent::new("abc-123");
        event.title = Some("Team sync".to_string());
        event.start = Some("2026-01-15T10:00:00".to_string());
        event.duration = Some("PT1H".to_string());
        event.time_zone = Some("Etc/UTC".to_string());

        let expected_ical = "BEGIN:VCALENDAR\r\n\
            VERSION:2.0\r\n\
            PRODID:-//My organization//Jampot//EN\r\n\
            BEGIN:VEVENT\r\n\
            UID:abc-123\r\n\
            DTSTAMP:20260110T120000Z\r\n\
            SUMMARY:Team sync\r\n\
            DTSTART:20260115T100000Z\r\n\
            DTEND:20260115T110000Z\r\n\
            END:VEVENT\r\n\
            END:VCALENDAR\r\n";

        let ical = build_from_with_timestamp(&event, stamp()).unwrap();
        assert_eq!(ical, expected_ical);
    }

    #[test]
    fn test_ical_from_all_day_event() {
        let mut event = CalendarEvent::new("allday-1");
        event.title = Some("Conference".to_string());
        event.start = Some("2026-03-01T00:00:00".to_string());
        event.duration = Some("P2D".to_string());
        event.show_without_time = Some(true);

        let expected_ical = "BEGIN:VCALENDAR\r\n\
            VERSION:2.0\r\n\
            PRODID:-//My organization//Jampot//EN\r\n\
            BEGIN:VEVENT\r\n\
            UID:allday-1\r\n\
            DTSTAMP:20260110T120000Z\r\n\
            SUMMARY:Conference\r\n\
            DTSTART;VALUE=DATE:20260301\r\n\
            DTEND;VALUE=DATE:20260303\r\n\
            END:VEVENT\r\n\
            END:VCALENDAR\r\n";

        let ical = build_from_with_timestamp(&event, stamp()).unwrap();
        assert_eq!(ical, expected_ical);
    }

    #[test]
    fn test_zoned_event_keeps_its_tzid() {
        let mut event = CalendarEvent::new("zoned-1");
        event.start = Some("2026-01-15T10:00:00".to_string());
        event.duration = Some("PT30M".to_string());
        event.time_zone = Some("W. Europe Standard Time".to_string());

        let ical = build_from_with_timestamp(&event, stamp()).unwrap();
        assert!(ical.contains("DTSTART;TZID=W. Europe Standard Time:20260115T100000\r\n"));
        assert!(ical.contains("DTEND;TZID=W. Europe Standard Time:20260115T103000\r\n"));
    }

    #[test]
    fn test_text_is_escaped() {
        let mut event = CalendarEvent::new("esc-1");
        event.title = Some("Lunch, then talk; maybe".to_string());

        let ical = build_from_with_timestamp(&event, stamp()).unwrap();
        assert!(ical.contains("SUMMARY:Lunch\\, then talk\\; maybe\r\n"));
    }

    #[test]
    fn test_busy_and_undefined_priority_are_not_emitted() {
        let mut event = CalendarEvent::new("defaults-1");
        event.free_busy_status = Some(FreeBusyStatus::Busy);

        let ical = build_from_with_timestamp(&event, stamp()).unwrap();
        assert!(!ical.contains("TRANSP"), "OPAQUE is the implied default");
        assert!(!ical.contains("PRIORITY"));
    }

    #[test]
    fn test_rrule_value() {
        let mut rule = RecurrenceRule::default();
        rule.frequency = "monthly".to_string();
        rule.interval = Some(2);
        rule.by_day = Some(vec![NDay {
            day: "mo".to_string(),
            nth_of_period: Some(-1),
            ..NDay::default()
        }]);
        rule.until = Some("2026-06-01T00:00:00".to_string());
        rule.first_day_of_week = Some("su".to_string());

        assert_eq!(
            rrule_value(&rule).unwrap(),
            "FREQ=MONTHLY;INTERVAL=2;BYDAY=-1MO;UNTIL=20260601T000000Z;WKST=SU"
        );
    }

    #[test]
    fn test_excluded_override_becomes_exdate() {
        let mut event = CalendarEvent::new("rec-2");
        event.start = Some("2026-01-05T09:30:00".to_string());
        event.duration = Some("PT15M".to_string());
        event.time_zone = Some("Europe/Paris".to_string());
        let mut rule = RecurrenceRule::default();
        rule.frequency = "weekly".to_string();
        event.recurrence_rules.push(rule);
        let mut exclusion = PatchObject::new();
        exclusion.insert("excluded".to_string(), serde_json::Value::Bool(true));
        event
            .recurrence_overrides
            .insert("2026-01-12T09:30:00".to_string(), exclusion);

        let ical = build_from_with_timestamp(&event, stamp()).unwrap();
        assert!(ical.contains("EXDATE;TZID=Europe/Paris:20260112T093000\r\n"));
        // An exclusion is not a modified occurrence, no second VEVENT is emitted
        assert_eq!(ical.matches("BEGIN:VEVENT").count(), 1);
    }

    #[test]
    fn test_modified_override_becomes_second_vevent() {
        let mut event = CalendarEvent::new("rec-3");
        event.title = Some("Standup".to_string());
        event.start = Some("2026-01-05T09:30:00".to_string());
        event.duration = Some("PT15M".to_string());
        event.time_zone = Some("Etc/UTC".to_string());
        let mut rule = RecurrenceRule::default();
        rule.frequency = "daily".to_string();
        event.recurrence_rules.push(rule);
        let mut patch = PatchObject::new();
        patch.insert(
            "title".to_string(),
            serde_json::Value::String("Standup (longer)".to_string()),
        );
        patch.insert(
            "duration".to_string(),
            serde_json::Value::String("PT45M".to_string()),
        );
        event
            .recurrence_overrides
            .insert("2026-01-07T09:30:00".to_string(), patch);

        let ical = build_from_with_timestamp(&event, stamp()).unwrap();
        assert_eq!(ical.matches("BEGIN:VEVENT").count(), 2);
        assert!(ical.contains("RECURRENCE-ID:20260107T093000Z\r\n"));
        assert!(ical.contains("SUMMARY:Standup (longer)\r\n"));
        assert!(ical.contains("DTEND:20260107T101500Z\r\n"));
        // The override VEVENT must not carry the master's RRULE
        assert_eq!(ical.matches("RRULE").count(), 1);
    }

    #[test]
    fn test_ical_from_task() {
        let mut task = CalendarTask::new("t-42");
        task.title = Some("Buy groceries".to_string());
        task.set_progress(
            Some(Progress::Completed),
            Some("2026-01-09T18:00:00Z".to_string()),
        );

        let expected_ical = "BEGIN:VCALENDAR\r\n\
            VERSION:2.0\r\n\
            PRODID:-//My organization//Jampot//EN\r\n\
            BEGIN:VTODO\r\n\
            UID:t-42\r\n\
            DTSTAMP:20260110T120000Z\r\n\
            SUMMARY:Buy groceries\r\n\
            STATUS:COMPLETED\r\n\
            COMPLETED:20260109T180000Z\r\n\
            END:VTODO\r\n\
            END:VCALENDAR\r\n";

        let ical = build_from_task_with_timestamp(&task, stamp()).unwrap();
        assert_eq!(ical, expected_ical);
    }

    #[test]
    fn test_purity_of_timestamped_builder() {
        let mut event = CalendarEvent::new("pure-1");
        event.title = Some("Same in, same out".to_string());
        event.start = Some("2026-01-15T10:00:00".to_string());
        event.duration = Some("PT1H".to_string());

        let before = event.clone();
        let once = build_from_with_timestamp(&event, stamp()).unwrap();
        let twice = build_from_with_timestamp(&event, stamp()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(event, before, "input must not be mutated");
    }
}
