//! This module provides a client to connect to a JMAP Calendars server
//!
//! Each public method is one logical operation and costs exactly one HTTP round trip,
//! after a one-time session bootstrap that is cached for the client's lifetime.
//! Events and tasks cross this boundary as iCal text: callers that already produce
//! iCal (e.g. through the [`crate::caldav`] client) need no adaptation.

use std::sync::Arc;

use tokio::sync::OnceCell;
use url::Url;
use uuid::Uuid;

use crate::calendar::Calendar;
use crate::error::{Error, Result};
use crate::event::CalendarEvent;
use crate::ical;
use crate::jmap::request::{self, ObjectKind, QueryFilter, Request};
use crate::jmap::response::{ChangesResponse, GetResponse, Response, SetResponse};
use crate::jmap::session::{Session, CAPABILITY_CALENDARS};
use crate::jmap::sync::{self, SyncDelta, SyncToken};
use crate::task::CalendarTask;
use crate::transport::{Credentials, HttpTransport, ReqwestTransport};

/// The session document plus what we resolved out of it once.
#[derive(Debug)]
struct Bootstrap {
    session: Session,
    api_url: Url,
}

/// A JMAP Calendars client.
///
/// The session document is fetched on first use and cached behind a single-flight
/// guard: concurrent first operations share one bootstrap request, and later
/// operations reuse the cached document until [`Client::reset`].
pub struct Client {
    base_url: Url,
    credentials: Credentials,
    transport: Arc<dyn HttpTransport>,
    bootstrap: OnceCell<Bootstrap>,
}

impl Client {
    /// Create a client with Basic credentials. This does not start a connection.
    pub fn new<S: AsRef<str>, T: ToString, U: ToString>(
        url: S,
        username: T,
        password: U,
    ) -> Result<Self> {
        Self::with_credentials(
            url,
            Credentials::Basic {
                username: username.to_string(),
                password: password.to_string(),
            },
        )
    }

    /// Create a client with explicit credentials (e.g. a Bearer token).
    pub fn with_credentials<S: AsRef<str>>(url: S, credentials: Credentials) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(url.as_ref())?,
            credentials,
            transport: Arc::new(ReqwestTransport::new()),
            bootstrap: OnceCell::new(),
        })
    }

    /// Substitute the HTTP transport (tests, custom pooling, instrumented clients).
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Drop the cached session document; the next operation bootstraps again.
    pub fn reset(&mut self) {
        self.bootstrap = OnceCell::new();
    }

    /// Fetch (once) and cache the session document.
    ///
    /// The calendars capability is checked eagerly here: a server that does not
    /// advertise it fails the very first operation with [`Error::Capability`].
    async fn bootstrap(&self) -> Result<&Bootstrap> {
        self.bootstrap
            .get_or_try_init(|| async {
                let well_known = Session::well_known(&self.base_url)?;
                let (status, body) = self
                    .transport
                    .get_json(&well_known, &self.credentials)
                    .await?;
                check_status(status)?;

                let session: Session = serde_json::from_value(body).map_err(|err| {
                    Error::Protocol(format!("malformed session document: {}", err))
                })?;
                session.require_capability(CAPABILITY_CALENDARS)?;
                let api_url = session.resolve_api_url(&self.base_url)?;
                log::debug!("JMAP API endpoint is {}", api_url);

                Ok(Bootstrap { session, api_url })
            })
            .await
    }

    async fn account_id(&self, kind: ObjectKind) -> Result<String> {
        let bootstrap = self.bootstrap().await?;
        bootstrap.session.require_capability(kind.capability())?;
        Ok(bootstrap
            .session
            .primary_account_id(kind.capability())?
            .to_string())
    }

    /// One HTTP round trip: POST the request envelope, interpret the status,
    /// parse the response envelope. No retries, ever.
    async fn call(&self, request: &Request) -> Result<Response> {
        let bootstrap = self.bootstrap().await?;
        let body = serde_json::to_value(request)
            .map_err(|err| Error::Protocol(format!("unserializable request: {}", err)))?;
        let (status, body) = self
            .transport
            .post_json(&bootstrap.api_url, &body, &self.credentials)
            .await?;
        check_status(status)?;
        Response::from_value(body)
    }

    /// Return the list of calendars.
    pub async fn get_calendars(&self) -> Result<Vec<Calendar>> {
        let account_id = self.account_id(ObjectKind::Event).await?;
        let request =
            Request::new(ObjectKind::Event).push(request::get_calendars(&account_id, "0"));
        let response = self.call(&request).await?;
        let calendars: GetResponse<Calendar> = GetResponse::parse(response.expect("Calendar/get", "0")?)?;
        log::debug!("found {} calendars", calendars.list.len());
        Ok(calendars.list)
    }

    /// Fetch one event by its server id, as iCal text.
    ///
    /// Note that the emitted `DTSTAMP` is regenerated on every fetch; repeated
    /// fetch-and-store cycles advance it even when nothing else changed.
    pub async fn get_event(&self, id: &str) -> Result<Option<String>> {
        let account_id = self.account_id(ObjectKind::Event).await?;
        let request = Request::new(ObjectKind::Event).push(request::get(
            ObjectKind::Event,
            &account_id,
            Some(&[id]),
            "0",
        ));
        let response = self.call(&request).await?;
        let events: GetResponse<CalendarEvent> =
            GetResponse::parse(response.expect("CalendarEvent/get", "0")?)?;
        match events.list.first() {
            Some(event) => Ok(Some(ical::build_from(event)?)),
            None => Ok(None),
        }
    }

    /// Create an event in a calendar from iCal text; returns the server-assigned id.
    pub async fn create_event(&self, calendar_id: &str, ical_text: &str) -> Result<String> {
        self.create_object(ObjectKind::Event, calendar_id, ical::parse(ical_text)?)
            .await
    }

    /// Update an event from iCal text.
    ///
    /// Server-immutable fields (the `uid` in particular) are stripped from the
    /// outgoing patch rather than letting the server reject the call.
    pub async fn update_event(&self, id: &str, ical_text: &str) -> Result<()> {
        self.update_object(ObjectKind::Event, id, ical::parse(ical_text)?)
            .await
    }

    /// Delete an event by its server id.
    pub async fn delete_event(&self, id: &str) -> Result<()> {
        self.destroy_object(ObjectKind::Event, id).await
    }

    /// Search events by time range and/or text; returns matching events as iCal text.
    ///
    /// Query and fetch travel in the same batched request (the query's result ids
    /// feed the fetch through a result reference), so this is one round trip.
    pub async fn search_events(&self, filter: &QueryFilter) -> Result<Vec<String>> {
        let account_id = self.account_id(ObjectKind::Event).await?;
        let request = request::search_request(ObjectKind::Event, &account_id, filter);
        let response = self.call(&request).await?;

        // The query result itself only matters for error reporting
        response.expect("CalendarEvent/query", "0")?;
        let events: GetResponse<CalendarEvent> =
            GetResponse::parse(response.expect("CalendarEvent/get", "1")?)?;
        events.list.iter().map(ical::build_from).collect()
    }

    /// Get the current sync baseline: a token with no object data attached.
    ///
    /// This is also the explicit recovery path after [`Error::SyncTruncated`].
    pub async fn event_sync_token(&self) -> Result<SyncToken> {
        let account_id = self.account_id(ObjectKind::Event).await?;
        let request = Request::new(ObjectKind::Event).push(request::get_state(
            ObjectKind::Event,
            &account_id,
            "0",
        ));
        let response = self.call(&request).await?;
        let state: GetResponse<CalendarEvent> =
            GetResponse::parse(response.expect("CalendarEvent/get", "0")?)?;
        Ok(SyncToken::new(state.state))
    }

    /// Fetch everything that changed since `token`, in one round trip.
    ///
    /// On success the returned delta carries the next token; persist it atomically
    /// in place of the consumed one. On [`Error::SyncTruncated`] nothing is
    /// returned and the caller's stored token must stay what it was: re-baseline
    /// with [`Client::event_sync_token`] and a full fetch.
    pub async fn get_objects_by_sync_token(&self, token: &SyncToken) -> Result<SyncDelta> {
        let account_id = self.account_id(ObjectKind::Event).await?;
        let request =
            request::changes_request(ObjectKind::Event, &account_id, token.as_str(), None);
        let response = self.call(&request).await?;

        let changes = ChangesResponse::parse(response.expect("CalendarEvent/changes", "0")?)?;
        // The truncation check runs before anything from this response is surfaced
        sync::ensure_complete(&changes)?;

        let created: GetResponse<CalendarEvent> =
            GetResponse::parse(response.expect("CalendarEvent/get", "1")?)?;
        let updated: GetResponse<CalendarEvent> =
            GetResponse::parse(response.expect("CalendarEvent/get", "2")?)?;

        Ok(SyncDelta {
            created: created
                .list
                .iter()
                .map(ical::build_from)
                .collect::<Result<_>>()?,
            updated: updated
                .list
                .iter()
                .map(ical::build_from)
                .collect::<Result<_>>()?,
            destroyed: changes.destroyed,
            token: SyncToken::new(changes.new_state),
        })
    }

    /// Fetch one task by its server id, as iCal text.
    pub async fn get_task(&self, id: &str) -> Result<Option<String>> {
        let account_id = self.account_id(ObjectKind::Task).await?;
        let request = Request::new(ObjectKind::Task).push(request::get(
            ObjectKind::Task,
            &account_id,
            Some(&[id]),
            "0",
        ));
        let response = self.call(&request).await?;
        let tasks: GetResponse<CalendarTask> =
            GetResponse::parse(response.expect("Task/get", "0")?)?;
        match tasks.list.first() {
            Some(task) => Ok(Some(ical::build_from_task(task)?)),
            None => Ok(None),
        }
    }

    /// Create a task in a task list from iCal text; returns the server-assigned id.
    pub async fn create_task(&self, task_list_id: &str, ical_text: &str) -> Result<String> {
        self.create_object(ObjectKind::Task, task_list_id, ical::parse_task(ical_text)?)
            .await
    }

    /// Update a task from iCal text.
    pub async fn update_task(&self, id: &str, ical_text: &str) -> Result<()> {
        self.update_object(ObjectKind::Task, id, ical::parse_task(ical_text)?)
            .await
    }

    /// Delete a task by its server id.
    pub async fn delete_task(&self, id: &str) -> Result<()> {
        self.destroy_object(ObjectKind::Task, id).await
    }

    /// Search tasks by time range and/or text; returns matching tasks as iCal text.
    pub async fn search_tasks(&self, filter: &QueryFilter) -> Result<Vec<String>> {
        let account_id = self.account_id(ObjectKind::Task).await?;
        let request = request::search_request(ObjectKind::Task, &account_id, filter);
        let response = self.call(&request).await?;

        response.expect("Task/query", "0")?;
        let tasks: GetResponse<CalendarTask> =
            GetResponse::parse(response.expect("Task/get", "1")?)?;
        tasks.list.iter().map(ical::build_from_task).collect()
    }

    async fn create_object<T: serde::Serialize>(
        &self,
        kind: ObjectKind,
        collection_id: &str,
        object: T,
    ) -> Result<String> {
        let account_id = self.account_id(kind).await?;
        let mut json = serde_json::to_value(&object)
            .map_err(|err| Error::Protocol(format!("unserializable object: {}", err)))?;
        if let Some(map) = json.as_object_mut() {
            map.insert(
                kind.membership_property().to_string(),
                serde_json::json!({ collection_id: true }),
            );
        }

        let create_id = Uuid::new_v4().to_hyphenated().to_string();
        let request =
            Request::new(kind).push(request::set_create(kind, &account_id, &create_id, json, "0"));
        let response = self.call(&request).await?;
        let set = SetResponse::parse(response.expect(&kind.method("set"), "0")?)?;
        set.created_id(&create_id)
    }

    async fn update_object<T: serde::Serialize>(
        &self,
        kind: ObjectKind,
        id: &str,
        object: T,
    ) -> Result<()> {
        let account_id = self.account_id(kind).await?;
        let json = serde_json::to_value(&object)
            .map_err(|err| Error::Protocol(format!("unserializable object: {}", err)))?;

        let request = Request::new(kind).push(request::set_update(kind, &account_id, id, json, "0"));
        let response = self.call(&request).await?;
        let set = SetResponse::parse(response.expect(&kind.method("set"), "0")?)?;
        set.ensure_updated(id)
    }

    async fn destroy_object(&self, kind: ObjectKind, id: &str) -> Result<()> {
        let account_id = self.account_id(kind).await?;
        let request = Request::new(kind).push(request::set_destroy(kind, &account_id, id, "0"));
        let response = self.call(&request).await?;
        let set = SetResponse::parse(response.expect(&kind.method("set"), "0")?)?;
        set.ensure_destroyed(id)
    }
}

/// Interpret a transport status: 401/403 are the hard authentication failure, any
/// other non-success is surfaced with its code.
fn check_status(status: u16) -> Result<()> {
    match status {
        401 | 403 => Err(Error::Authentication { status }),
        200..=299 => Ok(()),
        status => Err(Error::Status { status }),
    }
}
