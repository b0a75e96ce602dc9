//! Process-wide `tracing` setup.
//!
//! Console logs go to stderr so stdout stays free for command output (`costbot handle` prints its
//! invocation result there). `COSTBOT_JSON_LOG_PATH` switches to JSON lines in a file.

use std::io::IsTerminal as _;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "info";
const DEFAULT_LOG_FILE: &str = "costbot.logs.jsonl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Disabled,
    /// Compact human-readable lines on stderr.
    Console,
    /// JSON lines appended to this file.
    JsonFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub sink: LogSink,
    pub filter: String,
}

fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Keys:
    /// - `COSTBOT_OBSERVABILITY_ENABLED` / `COSTBOT_OBSERVABILITY`: on/off flag, default on.
    /// - `COSTBOT_LOG_LEVEL`, then `RUST_LOG`: filter directives; invalid ones are skipped.
    /// - `COSTBOT_JSON_LOG_PATH`: JSON-lines file instead of the console.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = ["COSTBOT_OBSERVABILITY_ENABLED", "COSTBOT_OBSERVABILITY"]
            .into_iter()
            .find_map(|key| lookup(key))
            .map(|value| parse_bool_flag(&value).unwrap_or(true))
            .unwrap_or(true);

        let filter = ["COSTBOT_LOG_LEVEL", "RUST_LOG"]
            .into_iter()
            .filter_map(|key| lookup(key))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());

        let sink = if !enabled {
            LogSink::Disabled
        } else {
            match lookup("COSTBOT_JSON_LOG_PATH").filter(|p| !p.trim().is_empty()) {
                Some(path) => LogSink::JsonFile(PathBuf::from(path.trim())),
                None => LogSink::Console,
            }
        };

        Self { sink, filter }
    }
}

/// Initialize logging once per process from the environment.
pub fn init_observability() {
    init_with(LogSettings::from_env());
}

/// First call wins; later calls are no-ops.
pub fn init_with(settings: LogSettings) {
    INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_new(&settings.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        match settings.sink {
            LogSink::Disabled => {}
            LogSink::Console => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_ansi(std::io::stderr().is_terminal())
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
            LogSink::JsonFile(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    let _ = std::fs::create_dir_all(parent);
                }
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(DEFAULT_LOG_FILE);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
        }
    });
}
