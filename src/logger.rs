//! log4rs setup. Library code only logs through the `log` facade; applications
//! pick one of these initializers (or their own logger) at startup.

use log::LevelFilter;
use log4rs::Handle;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const RETENTION: u32 = 7;

static HANDLE: LazyLock<Mutex<Option<Handle>>> = LazyLock::new(|| Mutex::new(None));

/// Initializes logging from `log4rs.yaml` in the working directory.
///
/// # Errors
/// Missing or invalid file, or a logger is already installed.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    init_path(Path::new("log4rs.yaml"))
}

/// Initializes logging from an explicit log4rs config file.
///
/// # Errors
/// Missing or invalid file, or a logger is already installed.
pub fn init_path(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}

/// `error|warn|info|debug|trace|off`, any case; anything else is `info`.
#[must_use]
pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Log file written by [`configure_logging`] under `dir`.
#[must_use]
pub fn log_file(dir: &Path) -> PathBuf {
    dir.join("odmlite.log")
}

/// Programmatic setup: console output, plus a size-rolled `odmlite.log` under
/// `dir` when given. Calling it again replaces the active configuration.
///
/// # Errors
/// The directory cannot be created, an appender cannot be built, or a
/// non-log4rs logger is already installed.
pub fn configure_logging(dir: Option<&Path>, level: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let lvl = level.map_or(LevelFilter::Info, parse_level);
    let console = ConsoleAppender::builder().encoder(Box::new(PatternEncoder::new(PATTERN))).build();
    let mut builder = Config::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut root = Root::builder().appender("console");
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir)?;
        let roller = FixedWindowRoller::builder().build(&format!("{}", dir.join("odmlite.{}.log").display()), RETENTION)?;
        let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
        let file = RollingFileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build(log_file(dir), Box::new(policy))?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }
    let config = builder.build(root.build(lvl))?;

    let mut handle = HANDLE.lock();
    match handle.as_ref() {
        Some(h) => h.set_config(config),
        None => *handle = Some(log4rs::init_config(config)?),
    }
    Ok(())
}

/// [`configure_logging`] driven by `ODMLITE_LOG_DIR` and `ODMLITE_LOG_LEVEL`.
///
/// # Errors
/// As [`configure_logging`].
pub fn configure_from_env() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::var("ODMLITE_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("ODMLITE_LOG_LEVEL").ok();
    configure_logging(dir.as_deref(), level.as_deref())
}
