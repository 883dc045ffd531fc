mod config;
mod dump;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use revdump_core::{HttpMethod, NamespaceScope};
use revdump_logging::{dump_error, level_for_verbosity, LogDestination};

use crate::config::{FileConfig, Settings};

#[derive(Debug, Parser)]
#[command(name = "revdump")]
#[command(version, about = "Export the revision history of a MediaWiki wiki as an XML dump")]
pub struct Cli {
    /// URL of the wiki's api.php
    #[arg(long)]
    api: Option<String>,

    /// `all` or a comma-separated list of namespace ids
    #[arg(long)]
    namespaces: Option<NamespaceScope>,

    /// Export only the latest revision of each page
    #[arg(long)]
    current_only: bool,

    /// Initial HTTP method; POST falls back to GET if the server rejects it [default: POST]
    #[arg(long)]
    http_method: Option<HttpMethod>,

    /// Resume the per-title export at this title
    #[arg(long)]
    start: Option<String>,

    /// Read titles from this file instead of listing them through the API
    #[arg(long)]
    titles_file: Option<PathBuf>,

    /// Titles per request in the per-title export [default: 1]
    #[arg(long)]
    batch_size: Option<usize>,

    /// Seconds to wait before every request [default: 0]
    #[arg(long)]
    delay: Option<f64>,

    /// Seconds to wait after a timeout or server-side failure [default: 20]
    #[arg(long)]
    cooldown: Option<u64>,

    /// Give up after this many consecutive cooldowns on one request [default: unlimited]
    #[arg(long)]
    max_cooldowns: Option<u32>,

    /// Per-request timeout in seconds [default: 60]
    #[arg(long)]
    timeout: Option<u64>,

    /// Directory for the dump and errors.log [default: ./dump]
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// RON file with default settings
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short, action = ArgAction::Count)]
    verbose: u8,

    /// Also write the log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let destination = match &cli.log_file {
        Some(path) => LogDestination::TerminalAndFile(path.clone()),
        None => LogDestination::Terminal,
    };
    revdump_logging::initialize(level_for_verbosity(cli.verbose), destination);

    match settings(&cli).and_then(|settings| run::run(&settings)) {
        Ok(run::RunOutcome::Complete) => ExitCode::SUCCESS,
        Ok(run::RunOutcome::Failed) => ExitCode::from(1),
        Err(err) => {
            dump_error!("{:#}", err);
            ExitCode::from(1)
        }
    }
}

fn settings(cli: &Cli) -> anyhow::Result<Settings> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    Settings::resolve(cli, file)
}
