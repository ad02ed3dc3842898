//! The day report, event creation and calendar creation.

use crate::error::{validation_error, Error, Result};
use crate::models::{Calendar, CalendarListEntry, CalendarRef, Event, EventDateTime, EventRef, EventRow};
use crate::session::{CalendarService, TimeWindow};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone};
use chrono_tz::Tz;
use std::fmt;
use tracing::{debug, warn};

/// Summary shown for events that have none.
pub const UNKNOWN_SUMMARY: &str = "Unknown";

pub const DEFAULT_TIME_ZONE: Tz = chrono_tz::Asia::Jerusalem;

/// Parses a `YYYY-MM-DD` calendar day.
pub fn parse_day(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|e| Error::Validation(format!("expected a YYYY-MM-DD date, got {input:?}: {e}")))
}

/// `[00:00:00, 23:59:59]` of `date` in `tz`, with the zone's actual offsets
/// on that day.
pub fn day_window(date: NaiveDate, tz: Tz) -> TimeWindow {
    let midnight = date.and_time(NaiveTime::MIN);
    let last_second = midnight + Duration::seconds(86_399);

    TimeWindow {
        time_min: resolve_local(tz, midnight, true).to_rfc3339_opts(SecondsFormat::Secs, false),
        time_max: resolve_local(tz, last_second, false).to_rfc3339_opts(SecondsFormat::Secs, false),
    }
}

/// Maps a wall-clock time to an instant. Ambiguous times pick the earlier or
/// later reading; times inside a DST gap move forward (or backward) to the
/// nearest minute that exists.
fn resolve_local(tz: Tz, local: NaiveDateTime, earliest: bool) -> DateTime<Tz> {
    let step = if earliest { 1 } else { -1 };
    (0..=24 * 60)
        .find_map(|minutes| {
            let candidate = local + Duration::minutes(step * minutes);
            match tz.from_local_datetime(&candidate) {
                LocalResult::Single(dt) => Some(dt),
                LocalResult::Ambiguous(early, late) => Some(if earliest { early } else { late }),
                LocalResult::None => None,
            }
        })
        .unwrap_or_else(|| tz.from_utc_datetime(&local))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchWarning {
    NoEventsFound { date: NaiveDate },
}

impl fmt::Display for FetchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchWarning::NoEventsFound { date } => {
                write!(f, "No events found for the specified date ({date}).")
            }
        }
    }
}

/// Rows of one day report, in calendar order then start-time order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReport {
    pub date: NaiveDate,
    pub rows: Vec<EventRow>,
    pub warning: Option<FetchWarning>,
}

impl EventReport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Plain-text table with one line per row.
    pub fn to_table(&self) -> String {
        const HEADERS: [&str; 4] = ["Calendar Name", "Event Summary", "Event Start", "Event End"];

        let cells: Vec<[&str; 4]> = self
            .rows
            .iter()
            .map(|row| {
                [
                    row.calendar_name.as_str(),
                    row.summary.as_str(),
                    row.start.as_str(),
                    row.end.as_str(),
                ]
            })
            .collect();

        let mut widths = HEADERS.map(|h| h.chars().count());
        for line in &cells {
            for (width, cell) in widths.iter_mut().zip(line) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let render = |line: &[&str; 4]| {
            line.iter()
                .zip(widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = render(&HEADERS);
        out.push('\n');
        out.push_str(&widths.map(|w| "-".repeat(w)).join("  "));
        out.push('\n');
        for line in &cells {
            out.push_str(&render(line));
            out.push('\n');
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.rows)?)
    }
}

fn project(calendar_name: &str, event: &Event) -> EventRow {
    let value = |dt: &Option<EventDateTime>| {
        dt.as_ref()
            .and_then(EventDateTime::display_value)
            .unwrap_or_default()
            .to_string()
    };

    EventRow {
        calendar_name: calendar_name.to_string(),
        summary: event
            .summary
            .clone()
            .unwrap_or_else(|| UNKNOWN_SUMMARY.to_string()),
        start: value(&event.start),
        end: value(&event.end),
    }
}

/// Lists every event overlapping `date` across all visible calendars.
///
/// Calendars are queried one after another. An empty result is not an error;
/// the report carries [`FetchWarning::NoEventsFound`] instead.
pub fn fetch_events<S: CalendarService + ?Sized>(
    service: &S,
    date: NaiveDate,
    tz: Tz,
    verbose: bool,
) -> Result<EventReport> {
    let window = day_window(date, tz);

    if verbose {
        println!("Fetching events for {date}.");
    }
    debug!(time_min = %window.time_min, time_max = %window.time_max, "Day window");

    let calendars = service.list_calendars()?;
    let mut rows = Vec::new();

    for calendar in &calendars {
        let events = service.list_events(&calendar.id, &window)?;
        debug!(calendar = %calendar.summary, count = events.len(), "Listed events");

        if events.is_empty() && verbose {
            println!("No events found for calendar: {}", calendar.summary);
        }

        rows.extend(events.iter().map(|event| project(&calendar.summary, event)));
    }

    let warning = if rows.is_empty() {
        warn!(%date, "No events found for the specified date.");
        Some(FetchWarning::NoEventsFound { date })
    } else {
        None
    };

    Ok(EventReport {
        date,
        rows,
        warning,
    })
}

pub fn list_calendars<S: CalendarService + ?Sized>(
    service: &S,
    verbose: bool,
) -> Result<Vec<CalendarListEntry>> {
    let calendars = service.list_calendars()?;
    if verbose {
        println!("Found {} calendars.", calendars.len());
    }
    Ok(calendars)
}

/// Input for [`add_event`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewEvent {
    pub calendar_id: String,
    pub title: String,
    pub start: String,
    pub end: String,
    pub description: String,
    pub location: String,
}

impl NewEvent {
    pub fn new(calendar_id: &str, title: &str, start: &str, end: &str) -> Self {
        NewEvent {
            calendar_id: calendar_id.to_string(),
            title: title.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_location(mut self, location: &str) -> Self {
        self.location = location.to_string();
        self
    }

    /// Required fields must be non-blank. Start is not compared with end;
    /// the service rejects inverted ranges itself.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("calendar_id", &self.calendar_id),
            ("title", &self.title),
            ("start", &self.start),
            ("end", &self.end),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "essential event details must be provided: {}",
                missing.join(", ")
            )))
        }
    }

    fn to_event(&self, tz: Tz) -> Event {
        Event {
            summary: Some(self.title.trim().to_string()),
            location: Some(self.location.clone()),
            description: Some(self.description.clone()),
            start: Some(EventDateTime::from_literal(self.start.trim(), tz.name())),
            end: Some(EventDateTime::from_literal(self.end.trim(), tz.name())),
            ..Default::default()
        }
    }
}

/// Inserts one event. Validation happens before any request is made.
pub fn add_event<S: CalendarService + ?Sized>(
    service: &S,
    new_event: &NewEvent,
    tz: Tz,
    verbose: bool,
) -> Result<EventRef> {
    new_event.validate()?;

    let created = service.insert_event(new_event.calendar_id.trim(), &new_event.to_event(tz))?;
    let reference = EventRef {
        id: created.id.unwrap_or_default(),
        html_link: created.html_link,
    };

    if verbose {
        println!(
            "Event created: {}",
            reference.html_link.as_deref().unwrap_or("<no link>")
        );
    }

    Ok(reference)
}

pub fn create_calendar<S: CalendarService + ?Sized>(
    service: &S,
    title: &str,
    tz: Tz,
    verbose: bool,
) -> Result<CalendarRef> {
    if title.trim().is_empty() {
        return Err(validation_error("calendar summary must be provided"));
    }

    let calendar = Calendar {
        id: None,
        summary: title.to_string(),
        time_zone: Some(tz.name().to_string()),
    };
    let created = service.insert_calendar(&calendar)?;

    let reference = CalendarRef {
        id: created.id.unwrap_or_default(),
        summary: if created.summary.is_empty() {
            title.to_string()
        } else {
            created.summary
        },
    };

    if verbose {
        println!("Created calendar: {}, ID: {}", reference.summary, reference.id);
    }

    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        parse_day(s).unwrap()
    }

    #[test]
    fn test_parse_day() {
        assert_eq!(day("2023-09-13"), NaiveDate::from_ymd_opt(2023, 9, 13).unwrap());
        assert_eq!(day(" 2023-09-13 "), NaiveDate::from_ymd_opt(2023, 9, 13).unwrap());
        assert!(parse_day("13/09/2023").unwrap_err().is_validation());
        assert!(parse_day("2023-02-30").is_err());
    }

    #[test]
    fn test_day_window_uses_daylight_offset() {
        let window = day_window(day("2023-09-13"), chrono_tz::Asia::Jerusalem);
        assert_eq!(window.time_min, "2023-09-13T00:00:00+03:00");
        assert_eq!(window.time_max, "2023-09-13T23:59:59+03:00");
    }

    #[test]
    fn test_day_window_uses_standard_offset() {
        let window = day_window(day("2023-01-15"), chrono_tz::Asia::Jerusalem);
        assert_eq!(window.time_min, "2023-01-15T00:00:00+02:00");
        assert_eq!(window.time_max, "2023-01-15T23:59:59+02:00");
    }

    #[test]
    fn test_day_window_on_transition_day() {
        // Clocks in New York jump from 02:00 to 03:00 on 2024-03-10.
        let window = day_window(day("2024-03-10"), chrono_tz::America::New_York);
        assert_eq!(window.time_min, "2024-03-10T00:00:00-05:00");
        assert_eq!(window.time_max, "2024-03-10T23:59:59-04:00");
    }

    #[test]
    fn test_day_window_midnight_in_gap() {
        // Santiago springs forward at midnight: 2023-09-03 00:00 does not exist.
        let window = day_window(day("2023-09-03"), chrono_tz::America::Santiago);
        assert_eq!(window.time_min, "2023-09-03T01:00:00-03:00");
    }

    #[test]
    fn test_day_window_utc() {
        let window = day_window(day("2023-09-13"), chrono_tz::UTC);
        assert_eq!(window.time_min, "2023-09-13T00:00:00+00:00");
    }

    #[test]
    fn test_project_prefers_date_time_and_defaults_summary() {
        let event = Event {
            start: Some(EventDateTime {
                date: Some("2023-09-13".to_string()),
                date_time: Some("2023-09-13T09:00:00+02:00".to_string()),
                time_zone: None,
            }),
            end: Some(EventDateTime {
                date: Some("2023-09-14".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let row = project("Work", &event);

        assert_eq!(row.summary, UNKNOWN_SUMMARY);
        assert_eq!(row.start, "2023-09-13T09:00:00+02:00");
        assert_eq!(row.end, "2023-09-14");
    }

    #[test]
    fn test_validate_lists_missing_fields() {
        let err = NewEvent::new("primary", "  ", "", "2023-09-13T11:00:00")
            .validate()
            .unwrap_err();
        match err {
            Error::Validation(message) => {
                assert!(message.contains("title"));
                assert!(message.contains("start"));
                assert!(!message.contains("calendar_id"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_to_event_annotates_time_zone() {
        let event = NewEvent::new("primary", "Meeting", "2023-09-13T10:00:00", "2023-09-13")
            .with_location("Office")
            .to_event(chrono_tz::Asia::Jerusalem);

        let start = event.start.unwrap();
        assert_eq!(start.date_time.as_deref(), Some("2023-09-13T10:00:00"));
        assert_eq!(start.time_zone.as_deref(), Some("Asia/Jerusalem"));
        let end = event.end.unwrap();
        assert_eq!(end.date.as_deref(), Some("2023-09-13"));
        assert_eq!(end.time_zone.as_deref(), Some("Asia/Jerusalem"));
        assert_eq!(event.location.as_deref(), Some("Office"));
        assert_eq!(event.description.as_deref(), Some(""));
    }

    #[test]
    fn test_to_event_trims_padded_literals() {
        let event = NewEvent::new("primary", " Meeting ", " 2023-09-13", "2023-09-13T11:00:00 ")
            .to_event(chrono_tz::Asia::Jerusalem);

        assert_eq!(event.summary.as_deref(), Some("Meeting"));
        let start = event.start.unwrap();
        assert_eq!(start.date.as_deref(), Some("2023-09-13"));
        assert!(start.date_time.is_none());
        assert_eq!(
            event.end.unwrap().date_time.as_deref(),
            Some("2023-09-13T11:00:00")
        );
    }

    #[test]
    fn test_table_rendering() {
        let report = EventReport {
            date: day("2023-09-13"),
            rows: vec![EventRow {
                calendar_name: "Work".to_string(),
                summary: "Standup".to_string(),
                start: "2023-09-13T09:00:00+02:00".to_string(),
                end: "2023-09-13T10:00:00+02:00".to_string(),
            }],
            warning: None,
        };

        let table = report.to_table();
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Calendar Name  Event Summary"));
        assert!(lines[1].starts_with("-------------  -------------"));
        assert!(lines[2].starts_with("Work           Standup        2023-09-13T09:00:00+02:00"));
    }

    #[test]
    fn test_json_rendering() {
        let report = EventReport {
            date: day("2023-09-13"),
            rows: Vec::new(),
            warning: Some(FetchWarning::NoEventsFound {
                date: day("2023-09-13"),
            }),
        };
        assert_eq!(report.to_json().unwrap(), "[]");
        assert_eq!(
            report.warning.unwrap().to_string(),
            "No events found for the specified date (2023-09-13)."
        );
    }
}
