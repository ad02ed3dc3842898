//! Authenticated access to the calendar REST surface.
//!
//! [`CalendarService`] is the seam the day report, event creation and
//! calendar creation are written against. [`Session`] implements it over
//! HTTP with a bearer token; tests substitute in-memory doubles.

use crate::auth::Credential;
use crate::error::{config_error, Error, Result};
use crate::models::{Calendar, CalendarListEntry, Event, Page};
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Closed time window, both ends RFC 3339 with an explicit offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub time_min: String,
    pub time_max: String,
}

/// The four remote operations calday consumes.
pub trait CalendarService {
    /// Every calendar visible to the authenticated identity, in service order.
    fn list_calendars(&self) -> Result<Vec<CalendarListEntry>>;

    /// Events overlapping `window`, recurring events expanded into single
    /// occurrences, ordered by start time.
    fn list_events(&self, calendar_id: &str, window: &TimeWindow) -> Result<Vec<Event>>;

    fn insert_event(&self, calendar_id: &str, event: &Event) -> Result<Event>;

    fn insert_calendar(&self, calendar: &Calendar) -> Result<Calendar>;
}

/// Authenticated handle bound to the calendar API.
pub struct Session {
    credential: Credential,
    client: Client,
    base_url: Url,
}

impl Session {
    pub fn new(credential: Credential, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid API base URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(config_error("API base URL cannot carry a path"));
        }

        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Session {
            credential,
            client,
            base_url,
        })
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get_paginated<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = query.to_vec();
            if let Some(token) = page_token.take() {
                params.push(("pageToken", token));
            }

            debug!(url = %url, "GET");
            let page: Page<T> = self.execute(self.client.get(url.clone()).query(&params))?;
            items.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(items)
    }

    fn post<B: Serialize, T: DeserializeOwned>(&self, url: Url, body: &B) -> Result<T> {
        debug!(url = %url, "POST");
        self.execute(self.client.post(url).json(body))
    }

    fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.bearer_auth(&self.credential.access_token).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            let message = extract_error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
            error!(status = status.as_u16(), %message, "Calendar API request rejected");
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

impl CalendarService for Session {
    fn list_calendars(&self) -> Result<Vec<CalendarListEntry>> {
        self.get_paginated(self.endpoint(&["users", "me", "calendarList"]), &[])
    }

    fn list_events(&self, calendar_id: &str, window: &TimeWindow) -> Result<Vec<Event>> {
        let query = [
            ("timeMin", window.time_min.clone()),
            ("timeMax", window.time_max.clone()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        self.get_paginated(self.endpoint(&["calendars", calendar_id, "events"]), &query)
    }

    fn insert_event(&self, calendar_id: &str, event: &Event) -> Result<Event> {
        self.post(self.endpoint(&["calendars", calendar_id, "events"]), event)
    }

    fn insert_calendar(&self, calendar: &Calendar) -> Result<Calendar> {
        self.post(self.endpoint(&["calendars"]), calendar)
    }
}

/// Pulls `error.message` out of a Google API error envelope.
fn extract_error_message(body: &str) -> Option<String> {
    let parsed: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = parsed.get("error")?;

    match error.get("message").and_then(|m| m.as_str()) {
        Some(message) => Some(message.to_string()),
        // OAuth-style errors: {"error": "invalid_grant", "error_description": "..."}
        None => error.as_str().map(|code| {
            match parsed.get("error_description").and_then(|d| d.as_str()) {
                Some(description) => format!("{code}: {description}"),
                None => code.to_string(),
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn session_for(server: &mockito::Server) -> Session {
        Session::new(Credential::bearer("test-token"), &server.url()).unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path_and_encodes_ids() {
        let session =
            Session::new(Credential::bearer("t"), DEFAULT_API_BASE_URL).unwrap();
        let url = session.endpoint(&["calendars", "en.usa#holiday@group.v.calendar.google.com", "events"]);
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/en.usa%23holiday@group.v.calendar.google.com/events"
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let result = Session::new(Credential::bearer("t"), "not a url");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_list_calendars_follows_pages() {
        let mut server = mockito::Server::new();
        let first = server
            .mock("GET", "/users/me/calendarList")
            .match_header("authorization", "Bearer test-token")
            .match_query(Matcher::Any)
            .expect(1)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"items":[{"id":"work","summary":"Work"}],"nextPageToken":"p2"}"#)
            .create();
        let second = server
            .mock("GET", "/users/me/calendarList")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "p2".into()))
            .expect(1)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"items":[{"id":"home","summary":"Personal","timeZone":"UTC"}]}"#)
            .create();

        let calendars = session_for(&server).list_calendars().unwrap();

        first.assert();
        second.assert();
        assert_eq!(calendars.len(), 2);
        assert_eq!(calendars[0].summary, "Work");
        assert_eq!(calendars[1].time_zone.as_deref(), Some("UTC"));
    }

    #[test]
    fn test_list_events_sends_window_and_expansion_params() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/calendars/work/events")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("timeMin".into(), "2023-09-13T00:00:00+03:00".into()),
                Matcher::UrlEncoded("timeMax".into(), "2023-09-13T23:59:59+03:00".into()),
                Matcher::UrlEncoded("singleEvents".into(), "true".into()),
                Matcher::UrlEncoded("orderBy".into(), "startTime".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"items":[{"id":"e1","summary":"Standup"}]}"#)
            .create();

        let window = TimeWindow {
            time_min: "2023-09-13T00:00:00+03:00".to_string(),
            time_max: "2023-09-13T23:59:59+03:00".to_string(),
        };
        let events = session_for(&server).list_events("work", &window).unwrap();

        mock.assert();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary.as_deref(), Some("Standup"));
    }

    #[test]
    fn test_list_events_without_items_is_empty() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/calendars/empty/events")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"kind":"calendar#events"}"#)
            .create();

        let window = TimeWindow {
            time_min: "a".to_string(),
            time_max: "b".to_string(),
        };
        let events = session_for(&server).list_events("empty", &window).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_insert_event_posts_json() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/calendars/primary/events")
            .match_body(Matcher::PartialJsonString(
                r#"{"summary":"Meeting","start":{"dateTime":"2023-09-13T10:00:00","timeZone":"Asia/Jerusalem"}}"#
                    .to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"new-id","summary":"Meeting","htmlLink":"https://calendar.example/new-id"}"#)
            .create();

        let event = Event {
            summary: Some("Meeting".to_string()),
            start: Some(crate::models::EventDateTime::from_literal(
                "2023-09-13T10:00:00",
                "Asia/Jerusalem",
            )),
            ..Default::default()
        };
        let created = session_for(&server).insert_event("primary", &event).unwrap();

        mock.assert();
        assert_eq!(created.id.as_deref(), Some("new-id"));
    }

    #[test]
    fn test_insert_calendar_posts_json() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/calendars")
            .match_body(Matcher::Json(serde_json::json!({
                "summary": "Garden",
                "timeZone": "Asia/Jerusalem"
            })))
            .with_status(200)
            .with_body(r#"{"id":"cal-1","summary":"Garden","timeZone":"Asia/Jerusalem"}"#)
            .create();

        let calendar = Calendar {
            id: None,
            summary: "Garden".to_string(),
            time_zone: Some("Asia/Jerusalem".to_string()),
        };
        let created = session_for(&server).insert_calendar(&calendar).unwrap();

        mock.assert();
        assert_eq!(created.id.as_deref(), Some("cal-1"));
    }

    #[test]
    fn test_rejection_maps_to_api_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/calendars")
            .with_status(403)
            .with_body(r#"{"error":{"code":403,"message":"Insufficient Permission"}}"#)
            .create();

        let calendar = Calendar {
            summary: "Nope".to_string(),
            ..Default::default()
        };
        let err = session_for(&server).insert_calendar(&calendar).unwrap_err();

        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Insufficient Permission");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_error_message_variants() {
        assert_eq!(
            extract_error_message(r#"{"error":{"code":400,"message":"Bad"}}"#).as_deref(),
            Some("Bad")
        );
        assert_eq!(
            extract_error_message(r#"{"error":"invalid_grant","error_description":"Token expired"}"#)
                .as_deref(),
            Some("invalid_grant: Token expired")
        );
        assert_eq!(extract_error_message("<html>"), None);
    }
}
