use calday::{Action, Config, NewEvent, OutputFormat, DEFAULT_API_BASE_URL};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "List a day's events across all your calendars, add events, create calendars")]
struct Cli {
    /// OAuth client configuration downloaded from the cloud console
    #[arg(long, env = "CALDAY_CREDENTIALS", default_value = "credentials.json", global = true)]
    credentials: PathBuf,

    /// Where the access credential is persisted
    #[arg(long, env = "CALDAY_TOKEN", default_value = "token.json", global = true)]
    token: PathBuf,

    /// IANA time zone used for day windows and new events
    #[arg(long, env = "CALDAY_TIMEZONE", default_value = "Asia/Jerusalem", global = true)]
    timezone: String,

    #[arg(long, env = "CALDAY_API_BASE_URL", default_value = DEFAULT_API_BASE_URL, global = true)]
    api_base_url: String,

    /// Pre-provisioned access token; disables the browser consent flow
    #[arg(long, env = "CALDAY_ACCESS_TOKEN", hide_env_values = true, global = true)]
    access_token: Option<String>,

    #[arg(short, long, env = "CALDAY_VERBOSE", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List every event of one day
    Events {
        /// Day as YYYY-MM-DD
        date: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// List the calendars visible to the account
    Calendars,
    /// Insert an event into a calendar
    AddEvent {
        #[arg(long, default_value = "primary")]
        calendar: String,
        #[arg(long)]
        title: String,
        /// RFC 3339 date-time, or YYYY-MM-DD for all-day events
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        location: String,
    },
    /// Create a new calendar
    CreateCalendar { title: String },
}

impl Command {
    fn into_action(self) -> calday::Result<Action> {
        Ok(match self {
            Command::Events { date, format } => Action::Events {
                date: calday::parse_day(&date)?,
                format,
            },
            Command::Calendars => Action::Calendars,
            Command::AddEvent {
                calendar,
                title,
                start,
                end,
                description,
                location,
            } => Action::AddEvent(
                NewEvent::new(&calendar, &title, &start, &end)
                    .with_description(&description)
                    .with_location(&location),
            ),
            Command::CreateCalendar { title } => Action::CreateCalendar { title },
        })
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "warn,calday=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::build(
        cli.credentials,
        cli.token,
        &cli.timezone,
        cli.api_base_url,
        cli.access_token,
    )
    .unwrap_or_else(|err| {
        eprintln!("Problem parsing arguments: {err}");
        process::exit(1);
    });

    let action = match cli.command {
        Some(command) => command.into_action(),
        None => Ok(Action::Demo),
    }
    .unwrap_or_else(|err| {
        eprintln!("Problem parsing arguments: {err}");
        process::exit(1);
    });

    if let Err(e) = calday::run(config, action, cli.verbose) {
        eprintln!("Application error: {e}");
        process::exit(1);
    }
}
