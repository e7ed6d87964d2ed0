//! Tracing subscriber setup.
//!
//! The base level comes from `LOGLEVEL` (default `WARNING`). Each `-v`
//! lowers it one step, at most two steps; `-q` raises it one step.
//! `RUST_LOG`, when set, replaces the computed filter entirely.

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ConfigError;

pub const LOGLEVEL_ENV: &str = "LOGLEVEL";

/// Most-to-least severe.
const LEVELS: [Level; 5] = [
    Level::ERROR,
    Level::WARN,
    Level::INFO,
    Level::DEBUG,
    Level::TRACE,
];

/// Parse a `LOGLEVEL` value. Python-style names are accepted too.
pub fn parse_level(value: &str) -> Result<Level, ConfigError> {
    match value.trim().to_ascii_uppercase().as_str() {
        "CRITICAL" | "FATAL" | "ERROR" => Ok(Level::ERROR),
        "WARNING" | "WARN" => Ok(Level::WARN),
        "INFO" => Ok(Level::INFO),
        "DEBUG" => Ok(Level::DEBUG),
        "TRACE" => Ok(Level::TRACE),
        _ => Err(ConfigError::Invalid {
            name: LOGLEVEL_ENV,
            expected: "log level",
            value: value.to_string(),
        }),
    }
}

/// Shift `base` by `verbosity` steps, clamped to the known levels.
pub fn resolve_level(base: Level, verbosity: i8) -> Level {
    let verbosity = verbosity.min(2) as isize;
    let index = LEVELS.iter().position(|l| *l == base).unwrap_or(1) as isize;
    let shifted = (index + verbosity).clamp(0, LEVELS.len() as isize - 1);
    LEVELS[shifted as usize]
}

/// Level for this process from `LOGLEVEL` and the CLI verbosity.
pub fn level_from_env(verbosity: i8) -> Result<Level, ConfigError> {
    let base = match std::env::var(LOGLEVEL_ENV) {
        Ok(value) if !value.trim().is_empty() => parse_level(&value)?,
        _ => Level::WARN,
    };
    Ok(resolve_level(base, verbosity))
}

/// Install the global subscriber. Messages go to stdout without targets.
pub fn init(level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(LevelFilter::from_level(level).into()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
