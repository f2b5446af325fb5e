//! A blocking facade over the asynchronous client
//!
//! Method-for-method the same surface as [`crate::client::Client`], minus `async`:
//! all protocol logic lives in the async client and in the pure modules it calls,
//! this file is only the suspension shim. Callers can treat the two clients as
//! interchangeable aside from how they invoke operations.

use std::sync::Arc;

use crate::calendar::Calendar;
use crate::error::{Error, Result};
use crate::jmap::request::QueryFilter;
use crate::jmap::sync::{SyncDelta, SyncToken};
use crate::transport::{Credentials, HttpTransport};

/// A blocking JMAP Calendars client.
///
/// Owns a private current-thread runtime; do not construct one inside an async
/// context.
pub struct Client {
    inner: crate::client::Client,
    runtime: tokio::runtime::Runtime,
}

impl Client {
    /// Create a client with Basic credentials. This does not start a connection.
    pub fn new<S: AsRef<str>, T: ToString, U: ToString>(
        url: S,
        username: T,
        password: U,
    ) -> Result<Self> {
        Self::wrap(crate::client::Client::new(url, username, password)?)
    }

    /// Create a client with explicit credentials (e.g. a Bearer token).
    pub fn with_credentials<S: AsRef<str>>(url: S, credentials: Credentials) -> Result<Self> {
        Self::wrap(crate::client::Client::with_credentials(url, credentials)?)
    }

    /// Substitute the HTTP transport (tests, custom pooling, instrumented clients).
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.inner = self.inner.with_transport(transport);
        self
    }

    fn wrap(inner: crate::client::Client) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| Error::Protocol(format!("unable to start a runtime: {}", err)))?;
        Ok(Self { inner, runtime })
    }

    /// Drop the cached session document; the next operation bootstraps again.
    pub fn reset(&mut self) {
        self.inner.reset();
    }

    /// See [`crate::client::Client::get_calendars`].
    pub fn get_calendars(&self) -> Result<Vec<Calendar>> {
        self.runtime.block_on(self.inner.get_calendars())
    }

    /// See [`crate::client::Client::get_event`].
    pub fn get_event(&self, id: &str) -> Result<Option<String>> {
        self.runtime.block_on(self.inner.get_event(id))
    }

    /// See [`crate::client::Client::create_event`].
    pub fn create_event(&self, calendar_id: &str, ical_text: &str) -> Result<String> {
        self.runtime
            .block_on(self.inner.create_event(calendar_id, ical_text))
    }

    /// See [`crate::client::Client::update_event`].
    pub fn update_event(&self, id: &str, ical_text: &str) -> Result<()> {
        self.runtime.block_on(self.inner.update_event(id, ical_text))
    }

    /// See [`crate::client::Client::delete_event`].
    pub fn delete_event(&self, id: &str) -> Result<()> {
        self.runtime.block_on(self.inner.delete_event(id))
    }

    /// See [`crate::client::Client::search_events`].
    pub fn search_events(&self, filter: &QueryFilter) -> Result<Vec<String>> {
        self.runtime.block_on(self.inner.search_events(filter))
    }

    /// See [`crate::client::Client::event_sync_token`].
    pub fn event_sync_token(&self) -> Result<SyncToken> {
        self.runtime.block_on(self.inner.event_sync_token())
    }

    /// See [`crate::client::Client::get_objects_by_sync_token`].
    pub fn get_objects_by_sync_token(&self, token: &SyncToken) -> Result<SyncDelta> {
        self.runtime
            .block_on(self.inner.get_objects_by_sync_token(token))
    }

    /// See [`crate::client::Client::get_task`].
    pub fn get_task(&self, id: &str) -> Result<Option<String>> {
        self.runtime.block_on(self.inner.get_task(id))
    }

    /// See [`crate::client::Client::create_task`].
    pub fn create_task(&self, task_list_id: &str, ical_text: &str) -> Result<String> {
        self.runtime
            .block_on(self.inner.create_task(task_list_id, ical_text))
    }

    /// See [`crate::client::Client::update_task`].
    pub fn update_task(&self, id: &str, ical_text: &str) -> Result<()> {
        self.runtime.block_on(self.inner.update_task(id, ical_text))
    }

    /// See [`crate::client::Client::delete_task`].
    pub fn delete_task(&self, id: &str) -> Result<()> {
        self.runtime.block_on(self.inner.delete_task(id))
    }

    /// See [`crate::client::Client::search_tasks`].
    pub fn search_tasks(&self, filter: &QueryFilter) -> Result<Vec<String>> {
        self.runtime.block_on(self.inner.search_tasks(filter))
    }
}
