//! This module provides a client to connect to a CalDAV server
//!
//! The sibling protocol implementation next to [`crate::client`]: same iCal text at
//! the boundary, same [`crate::Error`] taxonomy, but WebDAV XML discovery and
//! ETag-conditioned object access instead of JMAP method calls.

use std::collections::HashMap;
use std::convert::TryFrom;

use bitflags::bitflags;
use minidom::Element;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::utils::{find_elem, find_elems};

static DAVCLIENT_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:">
       <d:prop>
           <d:current-user-principal />
       </d:prop>
    </d:propfind>
"#;

static HOMESET_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav" >
      <d:self/>
      <d:prop>
        <c:calendar-home-set />
      </d:prop>
    </d:propfind>
"#;

static CAL_BODY: &str = r#"
    <d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav" >
       <d:prop>
         <d:displayname />
         <d:resourcetype />
         <c:supported-calendar-component-set />
       </d:prop>
    </d:propfind>
"#;

bitflags! {
    /// The component types a calendar collection accepts
    #[derive(Serialize, Deserialize)]
    pub struct SupportedComponents: u8 {
        /// An event, such as a calendar meeting
        const EVENT = 1;
        /// A to-do item, such as a reminder
        const TODO = 2;
    }
}

impl TryFrom<&Element> for SupportedComponents {
    type Error = Error;

    /// Create an instance from an XML <supported-calendar-component-set> element
    fn try_from(element: &Element) -> Result<Self> {
        if element.name() != "supported-calendar-component-set" {
            return Err(Error::Protocol(
                "element must be a <supported-calendar-component-set>".into(),
            ));
        }

        let mut flags = Self::empty();
        for child in element.children() {
            match child.attr("name") {
                None => continue,
                Some("VEVENT") => flags.insert(Self::EVENT),
                Some("VTODO") => flags.insert(Self::TODO),
                Some(other) => {
                    log::warn!("Unimplemented supported component type: {:?}. Ignoring it", other);
                    continue;
                }
            };
        }

        Ok(flags)
    }
}

/// A version tag is basically a CalDAV `etag`: an opaque marker that changes
/// whenever the object changes. Used for conditional writes, compared only for
/// equality.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionTag {
    tag: String,
}

impl From<String> for VersionTag {
    fn from(tag: String) -> VersionTag {
        Self { tag }
    }
}

impl VersionTag {
    pub fn as_str(&self) -> &str {
        &self.tag
    }
}

/// A calendar collection discovered on a CalDAV server.
///
/// Its URL is the server-side handle and must not be confused with the UIDs of the
/// objects it contains.
#[derive(Clone, Debug)]
pub struct RemoteCalendar {
    name: String,
    url: Url,
    supported_components: SupportedComponents,
}

impl RemoteCalendar {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn url(&self) -> &Url {
        &self.url
    }
    pub fn supported_components(&self) -> SupportedComponents {
        self.supported_components
    }
}

/// A CalDAV client.
///
/// Like its JMAP sibling, discovery results (principal, home set, calendar list)
/// are fetched lazily and cached for the lifetime of the instance.
pub struct Client {
    url: Url,
    username: String,
    password: String,

    principal: Option<Url>,
    calendar_home_set: Option<Url>,
    calendars: Option<HashMap<Url, RemoteCalendar>>,
}

impl Client {
    /// Create a client. This does not start a connection
    pub fn new<S: AsRef<str>, T: ToString, U: ToString>(
        url: S,
        username: T,
        password: U,
    ) -> Result<Self> {
        Ok(Self {
            url: Url::parse(url.as_ref())?,
            username: username.to_string(),
            password: password.to_string(),
            principal: None,
            calendar_home_set: None,
            calendars: None,
        })
    }

    async fn sub_request(&self, url: &Url, body: String, depth: u32) -> Result<String> {
        let method = Method::from_bytes(b"PROPFIND").expect("cannot create PROPFIND method.");

        let res = reqwest::Client::new()
            .request(method, url.as_str())
            .header("Depth", depth)
            .header(CONTENT_TYPE, "application/xml")
            .basic_auth(&self.username, Some(&self.password))
            .body(body)
            .send()
            .await?;
        check_status(res.status().as_u16())?;
        Ok(res.text().await?)
    }

    async fn sub_request_and_process(
        &self,
        url: &Url,
        body: String,
        items: &[&str],
    ) -> Result<String> {
        let text = self.sub_request(url, body, 0).await?;

        let root: Element = text
            .parse()
            .map_err(|err| Error::Protocol(format!("unparseable DAV response: {}", err)))?;
        let mut current_element = &root;
        for item in items {
            current_element = find_elem(current_element, item)
                .ok_or_else(|| Error::Protocol(format!("missing element <{}>", item)))?;
        }

        Ok(current_element.text())
    }

    /// Return the Principal URL, or fetch it from server if not known yet
    async fn get_principal(&mut self) -> Result<Url> {
        if let Some(principal) = &self.principal {
            return Ok(principal.clone());
        }

        let url = self.url.clone();
        let href = self
            .sub_request_and_process(&url, DAVCLIENT_BODY.into(), &["current-user-principal", "href"])
            .await?;
        let mut principal_url = self.url.clone();
        principal_url.set_path(&href);
        self.principal = Some(principal_url.clone());
        log::debug!("Principal URL is {}", href);

        Ok(principal_url)
    }

    /// Return the Homeset URL, or fetch it from server if not known yet
    async fn get_cal_home_set(&mut self) -> Result<Url> {
        if let Some(home_set) = &self.calendar_home_set {
            return Ok(home_set.clone());
        }
        let principal_url = self.get_principal().await?;

        let href = self
            .sub_request_and_process(
                &principal_url,
                HOMESET_BODY.into(),
                &["calendar-home-set", "href"],
            )
            .await?;
        let mut home_set_url = self.url.clone();
        home_set_url.set_path(&href);
        self.calendar_home_set = Some(home_set_url.clone());
        log::debug!("Calendar home set URL is {:?}", home_set_url.path());

        Ok(home_set_url)
    }

    /// Return the list of calendars, or fetch from server if not known yet
    pub async fn get_calendars(&mut self) -> Result<HashMap<Url, RemoteCalendar>> {
        if let Some(calendars) = &self.calendars {
            return Ok(calendars.clone());
        }
        let cal_home_set = self.get_cal_home_set().await?;

        let text = self.sub_request(&cal_home_set, CAL_BODY.into(), 1).await?;
        let root: Element = text
            .parse()
            .map_err(|err| Error::Protocol(format!("unparseable DAV response: {}", err)))?;

        let mut calendars = HashMap::new();
        for response in find_elems(&root, "response") {
            let display_name = find_elem(response, "displayname")
                .map(|e| e.text())
                .unwrap_or_else(|| "<no name>".to_string());
            log::debug!("Considering calendar {}", display_name);

            // We filter out non-calendar items
            let resource_types = match find_elem(response, "resourcetype") {
                None => continue,
                Some(rt) => rt,
            };
            let mut found_calendar_type = false;
            for resource_type in resource_types.children() {
                if resource_type.name() == "calendar" {
                    found_calendar_type = true;
                    break;
                }
            }
            if !found_calendar_type {
                continue;
            }

            // We filter out the root calendar collection, that has an empty supported-calendar-component-set
            let el_supported_comps = match find_elem(response, "supported-calendar-component-set") {
                None => continue,
                Some(comps) => comps,
            };
            if el_supported_comps.children().count() == 0 {
                continue;
            }

            let calendar_href = match find_elem(response, "href") {
                None => {
                    log::warn!("Calendar {} has no URL! Ignoring it.", display_name);
                    continue;
                }
                Some(h) => h.text(),
            };

            let mut this_calendar_url = self.url.clone();
            this_calendar_url.set_path(&calendar_href);

            let supported_components = match SupportedComponents::try_from(el_supported_comps) {
                Err(err) => {
                    log::warn!(
                        "Calendar {} has invalid supported components ({})! Ignoring it.",
                        display_name,
                        err
                    );
                    continue;
                }
                Ok(sc) => sc,
            };

            let this_calendar = RemoteCalendar {
                name: display_name,
                url: this_calendar_url.clone(),
                supported_components,
            };
            log::info!("Found calendar {}", this_calendar.name());
            calendars.insert(this_calendar_url, this_calendar);
        }

        self.calendars = Some(calendars.clone());
        Ok(calendars)
    }

    /// Fetch one calendar object by its URL, as iCal text plus its version tag
    /// (when the server sends one).
    pub async fn get_item(&self, url: &Url) -> Result<(String, Option<VersionTag>)> {
        let res = reqwest::Client::new()
            .get(url.as_str())
            .header(CONTENT_TYPE, "text/calendar")
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        check_status(res.status().as_u16())?;

        let version_tag = extract_etag(res.headers())?;
        Ok((res.text().await?, version_tag))
    }

    /// Create a calendar object at the given URL. Fails if one already exists there.
    pub async fn create_item(&self, url: &Url, ical_text: &str) -> Result<VersionTag> {
        let res = reqwest::Client::new()
            .put(url.as_str())
            .header("If-None-Match", "*")
            .header(CONTENT_TYPE, "text/calendar")
            .header(CONTENT_LENGTH, ical_text.len())
            .basic_auth(&self.username, Some(&self.password))
            .body(ical_text.to_string())
            .send()
            .await?;
        check_status(res.status().as_u16())?;

        extract_etag(res.headers())?.ok_or_else(|| {
            Error::Protocol(format!("no ETag in the response headers for {}", url))
        })
    }

    /// Overwrite a calendar object, conditioned on the version we last saw.
    pub async fn update_item(
        &self,
        url: &Url,
        ical_text: &str,
        previous: &VersionTag,
    ) -> Result<VersionTag> {
        let res = reqwest::Client::new()
            .put(url.as_str())
            .header("If-Match", previous.as_str())
            .header(CONTENT_TYPE, "text/calendar")
            .header(CONTENT_LENGTH, ical_text.len())
            .basic_auth(&self.username, Some(&self.password))
            .body(ical_text.to_string())
            .send()
            .await?;
        check_status(res.status().as_u16())?;

        extract_etag(res.headers())?.ok_or_else(|| {
            Error::Protocol(format!("no ETag in the response headers for {}", url))
        })
    }

    /// Delete a calendar object.
    pub async fn delete_item(&self, url: &Url) -> Result<()> {
        let res = reqwest::Client::new()
            .delete(url.as_str())
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        check_status(res.status().as_u16())
    }
}

fn extract_etag(headers: &reqwest::header::HeaderMap) -> Result<Option<VersionTag>> {
    match headers.get("ETag") {
        None => Ok(None),
        Some(etag) => {
            let tag = etag
                .to_str()
                .map_err(|err| Error::Protocol(format!("unreadable ETag header: {}", err)))?;
            Ok(Some(VersionTag::from(tag.to_string())))
        }
    }
}

fn check_status(status: u16) -> Result<()> {
    match status {
        401 | 403 => Err(Error::Authentication { status }),
        200..=299 => Ok(()),
        status => Err(Error::Status { status }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPPORTED_COMPS_XML: &str = r#"<c:supported-calendar-component-set xmlns:c="urn:ietf:params:xml:ns:caldav">
        <c:comp name="VEVENT" />
        <c:comp name="VTODO" />
    </c:supported-calendar-component-set>"#;

    const MULTISTATUS_XML: &str = r#"<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
        <d:response>
            <d:href>/calendars/alice/personal/</d:href>
            <d:propstat>
                <d:prop>
                    <d:displayname>Personal</d:displayname>
                    <d:resourcetype><d:collection/><c:calendar/></d:resourcetype>
                </d:prop>
            </d:propstat>
        </d:response>
    </d:multistatus>"#;

    #[test]
    fn test_supported_components_from_xml() {
        let element: Element = SUPPORTED_COMPS_XML.parse().unwrap();
        let components = SupportedComponents::try_from(&element).unwrap();
        assert!(components.contains(SupportedComponents::EVENT));
        assert!(components.contains(SupportedComponents::TODO));
    }

    #[test]
    fn test_supported_components_rejects_other_elements() {
        let element: Element = r#"<d:resourcetype xmlns:d="DAV:" />"#.parse().unwrap();
        assert!(SupportedComponents::try_from(&element).is_err());
    }

    #[test]
    fn test_multistatus_extraction() {
        let root: Element = MULTISTATUS_XML.parse().unwrap();
        let responses = find_elems(&root, "response");
        assert_eq!(responses.len(), 1);
        assert_eq!(
            find_elem(responses[0], "href").unwrap().text(),
            "/calendars/alice/personal/"
        );
        let resource_type = find_elem(responses[0], "resourcetype").unwrap();
        assert!(resource_type.children().any(|child| child.name() == "calendar"));
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(207).is_ok());
        assert!(matches!(check_status(401), Err(Error::Authentication { .. })));
        assert!(matches!(check_status(500), Err(Error::Status { status: 500 })));
    }
}
