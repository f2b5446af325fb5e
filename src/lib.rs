//! This crate provides a way to manage calendar data against JMAP Calendars and CalDAV servers.
//!
//! It provides a JMAP client in the [`client`] module (and a blocking twin in [`blocking`]),
//! and a CalDAV client in the [`caldav`] module. Both speak iCal text at their boundary, so
//! data can flow between them without adaptation.
//!
//! Under the JMAP client sits the heart of the crate: a pure, bidirectional conversion layer
//! between iCal text and JSCalendar objects in the [`ical`] module, and the incremental-sync
//! plumbing in [`jmap`]. \
//! Both clients report their failures through the one [`Error`] type, so a generic handler
//! catches either protocol uniformly.

pub mod error;
pub use error::Error;

pub mod event;
pub use event::CalendarEvent;
mod task;
pub use task::CalendarTask;
pub mod calendar;
pub use calendar::Calendar;

pub mod ical;
pub mod jmap;
pub use jmap::request::QueryFilter;
pub use jmap::sync::{SyncDelta, SyncToken};

pub mod transport;
pub mod client;
pub use client::Client;
pub mod blocking;

pub mod caldav;

pub mod config;
pub mod utils;
