use std::{env, fmt::Display};

use colored::Colorize;
use log::{Level, LevelFilter, SetLoggerError};

/// Names the most verbose level syncroom's own crates log at, e.g. `debug`
const LOG_LEVEL_VAR: &str = "SYNCROOM_LOG";

/// External crates only need to log warnings and errors
const EXTERNAL_LEVEL: LevelFilter = LevelFilter::Warn;
const DEFAULT_LOCAL_LEVEL: LevelFilter = LevelFilter::Info;

/// Installs the global logger. Fails if one was already installed.
pub fn init_logger() -> Result<(), SetLoggerError> {
    let local_level = local_level(env::var(LOG_LEVEL_VAR).ok().as_deref());

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let target = Target::from_str(record.target());
            let now = chrono::Local::now();

            out.finish(format_args!(
                "{:^5} {} {:^8} {}",
                level_to_string(&record.level()),
                now.format("%H:%M:%S").to_string().bright_black(),
                target,
                message
            ))
        })
        .filter(move |meta| {
            let max_level = if Target::from_str(meta.target()).is_local() {
                local_level
            } else {
                EXTERNAL_LEVEL
            };

            meta.level() <= max_level
        })
        .chain(std::io::stdout())
        .apply()
}

/// Reads the local level from the environment. Unknown values fall back to info.
fn local_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_LOCAL_LEVEL)
}

enum Target {
    External(String),
    Main,
    Server,
    Collab,
    Core,
}

impl Target {
    fn from_str(str: &str) -> Self {
        let module = str.split("::").next().unwrap_or_default();

        match module {
            "syncroom" => Self::Main,
            "syncroom_core" => Self::Core,
            "syncroom_server" => Self::Server,
            "syncroom_collab" => Self::Collab,
            other => Target::External(other.to_string()),
        }
    }

    fn is_local(&self) -> bool {
        !matches!(self, Self::External(_))
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            Target::External(x) => x.as_str().clear(),
            Target::Main => "MAIN".bright_cyan(),
            Target::Server => "SERVER".bright_green(),
            Target::Collab => "COLLAB".bright_purple(),
            Target::Core => "CORE".blue(),
        };

        Display::fmt(&result, f)
    }
}

fn level_to_string(level: &Level) -> String {
    match level {
        Level::Error => " ERR ".black().on_red().bold().to_string(),
        Level::Warn => " WRN ".black().on_yellow().bold().to_string(),
        Level::Info => " INF ".black().on_blue().bold().to_string(),
        Level::Debug => " DBG ".white().on_black().to_string(),
        Level::Trace => " TRC ".to_string(),
    }
}
