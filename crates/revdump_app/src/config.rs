//! Run settings: command-line flags layered over an optional RON file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use revdump_core::{ExportMode, HttpMethod, NamespaceScope};
use revdump_engine::RetryPolicy;
use serde::Deserialize;

use crate::Cli;

const DEFAULT_OUTPUT: &str = "./dump";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Contents of a `--config` file. Every field may be left out.
///
/// ```ron
/// (
///     api: Some("https://wiki.example.org/w/api.php"),
///     namespaces: Some("0,4"),
///     cooldown_secs: Some(30),
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub api: Option<String>,
    pub namespaces: Option<String>,
    pub current_only: Option<bool>,
    pub http_method: Option<String>,
    pub start: Option<String>,
    pub titles_file: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub delay_secs: Option<f64>,
    pub cooldown_secs: Option<u64>,
    pub max_cooldowns: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub output: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        ron::from_str(&text)
            .with_context(|| format!("could not parse config file {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api: String,
    pub scope: NamespaceScope,
    pub mode: ExportMode,
    pub http_method: HttpMethod,
    pub start: Option<String>,
    pub titles_file: Option<PathBuf>,
    pub batch_size: usize,
    pub policy: RetryPolicy,
    pub timeout: Duration,
    pub output: PathBuf,
}

impl Settings {
    /// Flags win over the file, the file wins over built-in defaults.
    pub fn resolve(cli: &Cli, file: FileConfig) -> anyhow::Result<Self> {
        let Some(api) = cli.api.clone().or(file.api) else {
            bail!("no API endpoint given; pass --api or set `api` in the config file");
        };

        let scope = match (&cli.namespaces, file.namespaces) {
            (Some(scope), _) => scope.clone(),
            (None, Some(text)) => text
                .parse()
                .with_context(|| format!("invalid namespaces {text:?} in config file"))?,
            (None, None) => NamespaceScope::All,
        };

        let http_method = match (cli.http_method, file.http_method) {
            (Some(method), _) => method,
            (None, Some(text)) => text
                .parse()
                .with_context(|| format!("invalid http_method {text:?} in config file"))?,
            (None, None) => HttpMethod::Post,
        };

        let delay_secs = cli.delay.or(file.delay_secs).unwrap_or(0.0);
        if !delay_secs.is_finite() || delay_secs < 0.0 {
            bail!("delay must be a non-negative number of seconds, got {delay_secs}");
        }
        let defaults = RetryPolicy::default();
        let policy = RetryPolicy {
            cooldown: cli
                .cooldown
                .or(file.cooldown_secs)
                .map_or(defaults.cooldown, Duration::from_secs),
            max_cooldowns: cli.max_cooldowns.or(file.max_cooldowns),
            request_delay: Duration::from_secs_f64(delay_secs),
        };

        Ok(Self {
            api,
            scope,
            mode: ExportMode::from_current_only(
                cli.current_only || file.current_only.unwrap_or(false),
            ),
            http_method,
            start: cli.start.clone().or(file.start),
            titles_file: cli.titles_file.clone().or(file.titles_file),
            batch_size: cli.batch_size.or(file.batch_size).unwrap_or(1),
            policy,
            timeout: Duration::from_secs(
                cli.timeout
                    .or(file.timeout_secs)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            output: cli
                .output
                .clone()
                .or(file.output)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
        })
    }
}
