pub mod auth;
pub mod calendar;
pub mod consent;
pub mod error;
pub mod models;
pub mod session;
pub mod store;

pub use auth::{Authenticator, ClientSecrets, Credential, CALENDAR_SCOPE};
pub use calendar::{
    add_event, create_calendar, day_window, fetch_events, list_calendars, parse_day,
    EventReport, FetchWarning, NewEvent,
};
pub use consent::{CredentialAcquirer, InteractiveConsent, ProvidedCredential};
pub use error::{Error, Result};
pub use models::{CalendarListEntry, CalendarRef, EventRef, EventRow};
pub use session::{CalendarService, Session, TimeWindow, DEFAULT_API_BASE_URL};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

use chrono::NaiveDate;
use chrono_tz::Tz;
use std::path::PathBuf;

/// Day shown when the binary runs without a subcommand.
pub const DEMO_DATE: &str = "2023-09-13";

pub struct Config {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub time_zone: Tz,
    pub api_base_url: String,
    /// Skips interactive consent when set.
    pub access_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            time_zone: calendar::DEFAULT_TIME_ZONE,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            access_token: None,
        }
    }
}

impl Config {
    pub fn build(
        credentials_path: PathBuf,
        token_path: PathBuf,
        time_zone: &str,
        api_base_url: String,
        access_token: Option<String>,
    ) -> Result<Config> {
        Ok(Config {
            credentials_path,
            token_path,
            time_zone: parse_time_zone(time_zone)?,
            api_base_url,
            access_token: access_token.filter(|token| !token.trim().is_empty()),
        })
    }

    /// File-backed authenticator using consent. A configured access token
    /// takes precedence over `token.json` and is kept in memory only.
    pub fn authenticator(&self) -> Authenticator {
        let (store, acquirer): (Box<dyn CredentialStore>, Box<dyn CredentialAcquirer>) =
            match &self.access_token {
                Some(token) => (
                    Box::new(MemoryCredentialStore::new()),
                    Box::new(ProvidedCredential::new(token)),
                ),
                None => (
                    Box::new(FileCredentialStore::new(&self.token_path)),
                    Box::new(InteractiveConsent::new(&self.credentials_path)),
                ),
            };

        Authenticator::new(store, acquirer, &self.credentials_path)
            .with_api_base_url(&self.api_base_url)
    }
}

/// Parses an IANA zone name such as `Asia/Jerusalem`.
pub fn parse_time_zone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| Error::Config(format!("unknown time zone {name:?}: {e}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Verbose report for [`DEMO_DATE`].
    Demo,
    Events { date: NaiveDate, format: OutputFormat },
    Calendars,
    AddEvent(NewEvent),
    CreateCalendar { title: String },
}

pub fn run(config: Config, action: Action, verbose: bool) -> Result<()> {
    let tz = config.time_zone;

    // Fail on bad input before the consent flow can open a browser.
    match &action {
        Action::AddEvent(new_event) => new_event.validate()?,
        Action::CreateCalendar { title } if title.trim().is_empty() => {
            return Err(error::validation_error("calendar summary must be provided"))
        }
        _ => {}
    }

    match action {
        Action::Demo => {
            let session = config.authenticator().obtain_session(true)?;
            let report = fetch_events(&session, parse_day(DEMO_DATE)?, tz, true)?;
            print_report(&report, OutputFormat::Table)?;
        }
        Action::Events { date, format } => {
            let session = config.authenticator().obtain_session(verbose)?;
            let report = fetch_events(&session, date, tz, verbose)?;
            print_report(&report, format)?;
        }
        Action::Calendars => {
            let session = config.authenticator().obtain_session(verbose)?;
            for calendar in list_calendars(&session, verbose)? {
                println!(
                    "{}\t{}\t{}",
                    calendar.id,
                    calendar.summary,
                    calendar.time_zone.as_deref().unwrap_or("-")
                );
            }
        }
        Action::AddEvent(new_event) => {
            let session = config.authenticator().obtain_session(verbose)?;
            let created = add_event(&session, &new_event, tz, verbose)?;
            if !verbose {
                println!("{}", created.html_link.as_deref().unwrap_or(&created.id));
            }
        }
        Action::CreateCalendar { title } => {
            let session = config.authenticator().obtain_session(verbose)?;
            let created = create_calendar(&session, &title, tz, verbose)?;
            if !verbose {
                println!("{}", created.id);
            }
        }
    }

    Ok(())
}

fn print_report(report: &EventReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => match &report.warning {
            Some(warning) => println!("{warning}"),
            None => print!("{}", report.to_table()),
        },
        OutputFormat::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}
