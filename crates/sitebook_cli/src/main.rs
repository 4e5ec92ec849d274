//! Sitebook command-line entry point.
//!
//! # Responsibility
//! - Open the project database and run one lifecycle operation per call.
//! - Print the outcome message, or the full outcome as JSON with `--json`.
//!
//! Exit codes: `0` success, `1` failure, `2` confirmation or name choice
//! required.

use clap::{ArgAction, Parser, Subcommand};
use sitebook_core::{
    default_log_level, init_logging, open_db, Coordinates, CreateProjectRequest, LifecycleOutcome,
    OfflineGeocoder, ProjectLifecycleManager, ProjectSearchFilters, SitebookConfig,
    SqliteProjectStore, SqliteSessionStore,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sitebook", version, about = "Wind farm site project manager")]
struct Cli {
    /// SQLite database file.
    #[arg(long, default_value = "sitebook.db", global = true)]
    db: PathBuf,
    /// Conversation/session identifier for reference resolution.
    #[arg(long, default_value = "cli", global = true)]
    session: String,
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Confirm destructive operations.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    confirm: bool,
    /// Print the full outcome as JSON.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    json: bool,
    /// Absolute directory for rolling log files; logging is off when unset.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Run a free-text lifecycle command, e.g. "delete project x".
    Run {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Create a project from a description and optional coordinates.
    Create {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
        /// Explicit project name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Resolve a project reference against the session.
    Resolve {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// List projects near a point.
    Duplicates {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long)]
        radius_km: Option<f64>,
    },
    /// Search projects by location, stages, creation time and archive flag.
    Search {
        #[arg(long)]
        location: Option<String>,
        #[arg(long = "stage", action = ArgAction::Append)]
        stages: Vec<String>,
        #[arg(long)]
        created_after: Option<i64>,
        #[arg(long)]
        created_before: Option<i64>,
        #[arg(long)]
        archived: Option<bool>,
    },
    /// Write a project export document to a file or stdout.
    Export {
        name: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Import a project from an export document.
    Import { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(outcome) => report(&outcome, cli.json),
        Err(err) => {
            eprintln!("sitebook: {err}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<LifecycleOutcome, Box<dyn Error>> {
    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }

    let config = match &cli.config {
        Some(path) => SitebookConfig::load(path)?,
        None => SitebookConfig::default(),
    };
    let conn = open_db(&cli.db)?;
    let store = Arc::new(SqliteProjectStore::new(&conn));
    let sessions = Arc::new(SqliteSessionStore::new(&conn, config.history_limit));
    let manager = ProjectLifecycleManager::new(store, sessions, OfflineGeocoder, config);
    log::debug!(
        "event=cli_command module=cli status=start session={}",
        cli.session
    );

    let outcome = match &cli.command {
        Action::Run { text } => manager.handle_command(&cli.session, &text.join(" "), cli.confirm),
        Action::Create {
            query,
            lat,
            lon,
            name,
        } => {
            let mut request = CreateProjectRequest::from_query(query.join(" "));
            if let (Some(lat), Some(lon)) = (lat, lon) {
                request = request.at(Coordinates::new(*lat, *lon));
            }
            if let Some(name) = name {
                request = request.named(name.clone());
            }
            manager.create_project(&cli.session, &request)
        }
        Action::Resolve { query } => manager.resolve_reference(&cli.session, &query.join(" ")),
        Action::Duplicates {
            lat,
            lon,
            radius_km,
        } => manager.check_for_duplicates(Coordinates::new(*lat, *lon), *radius_km),
        Action::Search {
            location,
            stages,
            created_after,
            created_before,
            archived,
        } => manager.search_projects(&ProjectSearchFilters {
            location: location.clone(),
            stages: stages.clone(),
            created_after: *created_after,
            created_before: *created_before,
            archived: *archived,
        }),
        Action::Export { name, out } => {
            let outcome = manager.export_project(name);
            if let Some(document) = &outcome.payload.export {
                match out {
                    Some(path) => std::fs::write(path, document.to_json()?)?,
                    None if !cli.json => println!("{}", document.to_json()?),
                    None => {}
                }
            }
            outcome
        }
        Action::Import { file } => manager.import_project(&std::fs::read_to_string(file)?),
    };
    Ok(outcome)
}

fn report(outcome: &LifecycleOutcome, json: bool) -> ExitCode {
    if json {
        match serde_json::to_string_pretty(outcome) {
            Ok(text) => println!("{text}"),
            Err(err) => {
                eprintln!("sitebook: cannot encode outcome: {err}");
                return ExitCode::from(1);
            }
        }
    } else {
        println!("{}", outcome.message);
    }

    if outcome.success {
        ExitCode::SUCCESS
    } else if outcome.requires_confirmation || outcome.requires_name_choice {
        ExitCode::from(2)
    } else {
        ExitCode::from(1)
    }
}
