use clap::Parser;
use log::{error, info};
use server::config::{RaceTuning, ServerConfig};
use server::network::{BoxError, CourseDocuments, Server};
use server::polar::PolarTable;
use server::race::Race;
use shared::course::CourseDefinition;
use shared::{DEFAULT_PORT, STATE_UPDATES_PER_SECOND};
use std::path::{Path, PathBuf};

/// Authoritative sailing race server
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Tick rate (updates per second)
    #[clap(short, long, default_value_t = STATE_UPDATES_PER_SECOND)]
    tick_rate: u32,
    /// Maximum number of players, overriding the course setting
    #[clap(short, long)]
    max_players: Option<usize>,
    /// Course definition as JSON; a built-in course is used when omitted
    #[clap(short, long)]
    course: Option<PathBuf>,
    /// Race XML document sent to clients on registration
    #[clap(long)]
    race_xml: Option<PathBuf>,
    /// Regatta XML document sent to clients on registration
    #[clap(long)]
    regatta_xml: Option<PathBuf>,
    /// Boats XML document sent to clients on registration
    #[clap(long)]
    boats_xml: Option<PathBuf>,
    /// Spawn power-up tokens during the race
    #[clap(long)]
    tokens: bool,
    /// Seconds between the host starting the race and the start gun [default: 10]
    #[clap(long)]
    start_delay: Option<u64>,
    /// Race tuning overrides as JSON
    #[clap(long)]
    tuning: Option<PathBuf>,
    /// Boat speed polar table as JSON; a built-in table is used when omitted
    #[clap(long)]
    polars: Option<PathBuf>,
}

fn load_course(path: Option<&Path>) -> Result<CourseDefinition, BoxError> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let course: CourseDefinition = serde_json::from_str(&text)?;
            info!("Loaded course '{}' from {}", course.name, path.display());
            Ok(course)
        }
        None => {
            info!("No course given, using the built-in course");
            Ok(CourseDefinition::default_course())
        }
    }
}

fn load_tuning(path: Option<&Path>) -> Result<RaceTuning, BoxError> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            info!("Loaded race tuning from {}", path.display());
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(RaceTuning::default()),
    }
}

fn load_polars(path: Option<&Path>) -> Result<PolarTable, BoxError> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            info!("Loaded polar table from {}", path.display());
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(PolarTable::default()),
    }
}

fn load_document(path: Option<&Path>) -> Result<Option<String>, BoxError> {
    Ok(path.map(std::fs::read_to_string).transpose()?)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut course = load_course(args.course.as_deref())?;
    if let Some(max_players) = args.max_players {
        course.max_players = max_players;
    }
    course.tokens_enabled |= args.tokens;

    let mut tuning = load_tuning(args.tuning.as_deref())?;
    tuning.tick_rate = args.tick_rate;
    if let Some(seconds) = args.start_delay {
        tuning.start_delay_ms = seconds * 1000;
    }
    let race = Race::new(&course, tuning)?.with_polar(load_polars(args.polars.as_deref())?);

    let documents = CourseDocuments {
        regatta: load_document(args.regatta_xml.as_deref())?,
        race: load_document(args.race_xml.as_deref())?,
        boats: load_document(args.boats_xml.as_deref())?,
    };

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        tick_rate: args.tick_rate,
        max_players: course.max_players,
        ..ServerConfig::default()
    };

    let mut server = Server::new(config, race, documents).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => match result {
            Ok(()) => info!("Race over, shutting down"),
            Err(e) => error!("Server stopped: {}", e),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
