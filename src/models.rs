use serde::{Deserialize, Serialize};

/// Event resource as exchanged with the calendar API.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
}

/// Either a whole-day `date` or a `dateTime`, kept as the literal strings the
/// service sent.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    /// Builds a start/end value from user input, using `date` for `YYYY-MM-DD`
    /// literals and `dateTime` for everything else.
    pub fn from_literal(value: &str, time_zone: &str) -> Self {
        let is_date_only = value.len() == 10 && !value.contains('T');
        EventDateTime {
            date: is_date_only.then(|| value.to_string()),
            date_time: (!is_date_only).then(|| value.to_string()),
            time_zone: Some(time_zone.to_string()),
        }
    }

    /// The `dateTime` value when present, else the whole-day `date`.
    pub fn display_value(&self) -> Option<&str> {
        self.date_time.as_deref().or(self.date.as_deref())
    }
}

/// Entry of the authenticated user's calendar list.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarListEntry {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// Calendar resource used for creation.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// One page of a list response.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

/// Denormalized projection of one event for the day report.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    #[serde(rename = "Calendar Name")]
    pub calendar_name: String,
    #[serde(rename = "Event Summary")]
    pub summary: String,
    #[serde(rename = "Event Start")]
    pub start: String,
    #[serde(rename = "Event End")]
    pub end: String,
}

/// Service-assigned reference to a created event.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EventRef {
    pub id: String,
    pub html_link: Option<String>,
}

/// Service-assigned reference to a created calendar.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CalendarRef {
    pub id: String,
    pub summary: String,
}
