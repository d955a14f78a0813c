use std::ffi::OsStr;

use log::{LevelFilter, SetLoggerError};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

/// Environment variable holding the log level.
pub const LOG_VAR: &str = "LCSIM_LOG";

/// Level used when [`LOG_VAR`] is unset or not a level name.
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Warn;

/// Install the terminal logger at the level requested by the environment. Logs go to stderr,
/// leaving stdout to the program's own output.
pub fn init() -> Result<(), SetLoggerError> {
    TermLogger::init(
        log_level(),
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
}

pub fn log_level() -> LevelFilter {
    parse_level(var(LOG_VAR).as_deref())
}

fn parse_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_LEVEL)
}

fn var(name: impl AsRef<OsStr>) -> Option<String> {
    std::env::var(name.as_ref()).ok().filter(|v| !v.is_empty())
}
