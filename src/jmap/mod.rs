//! The JMAP protocol plumbing (RFC 8620 + the calendars extension)
//!
//! Everything in here is pure data handling: [`session`] resolves the capability
//! document, [`request`] builds method-call payloads, [`response`] picks typed results
//! back out, and [`sync`] enforces the incremental-sync contract. None of these
//! modules performs I/O; the round trips live in [`crate::client`].

pub mod request;
pub mod response;
pub mod session;
pub mod sync;
