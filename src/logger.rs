use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::LazyLock;
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
};

/// Set to any value to mirror log lines to stderr and let HTTP and provider
/// client logs through.
pub const VERBOSE_ENV: &str = "AOH_REVIEW_VERBOSE";

const DEFAULT_FILTER: &str = "aoh_review=debug,rig=info,warn";

struct ReviewLogger;

static LOGGER: ReviewLogger = ReviewLogger;
static LOGGING_ENABLED: LazyLock<Mutex<bool>> = LazyLock::new(|| Mutex::new(false));
static LOG_FILE: LazyLock<Mutex<Option<std::fs::File>>> = LazyLock::new(|| Mutex::new(None));
static LOG_TO_STDERR: LazyLock<Mutex<bool>> = LazyLock::new(|| Mutex::new(false));
static VERBOSE_LOGGING: LazyLock<Mutex<bool>> = LazyLock::new(|| Mutex::new(false));

/// Targets that flood the log with transport detail
const NOISY_TARGETS: &[&str] = &["reqwest", "hyper", "h2", "rustls", "want", "mio"];

/// Sends tracing output (rig's spans) to the same sinks as log lines
#[derive(Clone)]
struct SinkWriter;

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !*LOGGING_ENABLED.lock() {
            return Ok(buf.len());
        }
        if let Some(file) = LOG_FILE.lock().as_mut() {
            let _ = file.write_all(buf);
            let _ = file.flush();
        }
        if *LOG_TO_STDERR.lock() {
            let _ = io::stderr().write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = LOG_FILE.lock().as_mut() {
            let _ = file.flush();
        }
        Ok(())
    }
}

impl<'a> fmt::MakeWriter<'a> for SinkWriter {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter
    }
}

impl log::Log for ReviewLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if !*LOGGING_ENABLED.lock() {
            return false;
        }

        let target = metadata.target();
        if target.starts_with("aoh_review") {
            return metadata.level() <= Level::Debug;
        }
        if target.starts_with("rig") {
            return metadata.level() <= Level::Info;
        }
        if !*VERBOSE_LOGGING.lock() && NOISY_TARGETS.iter().any(|t| target.starts_with(t)) {
            return false;
        }

        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let message = format!(
            "{} {} [{}] - {}\n",
            timestamp,
            record.level(),
            record.target(),
            record.args()
        );

        if let Some(file) = LOG_FILE.lock().as_mut() {
            let _ = file.write_all(message.as_bytes());
            let _ = file.flush();
        }

        // Reports go to stdout; keep log lines off it
        if *LOG_TO_STDERR.lock() {
            eprint!("{message}");
        }
    }

    fn flush(&self) {}
}

/// Install the `log` logger and the tracing subscriber once per process
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::{Once, OnceLock};
    static INIT: Once = Once::new();
    static INIT_RESULT: OnceLock<Result<(), String>> = OnceLock::new();

    INIT.call_once(|| {
        let verbose_from_env = std::env::var(VERBOSE_ENV).is_ok()
            || std::env::var("RUST_LOG").is_ok_and(|v| v.contains("debug") || v.contains("trace"));
        if verbose_from_env {
            set_verbose_logging(true);
        }

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
        let fmt_layer = fmt::Layer::new()
            .with_target(true)
            .with_level(true)
            .with_timer(fmt::time::ChronoUtc::rfc_3339())
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(SinkWriter);

        // `try_init` would also claim the `log` facade through its bridge
        let subscriber = Registry::default().with(env_filter).with(fmt_layer);
        let tracing_result = tracing::subscriber::set_global_default(subscriber);
        let log_result = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Debug));

        let result = match (tracing_result, log_result) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(_)) => {
                eprintln!("Note: Using tracing-only logging (log crate setup skipped)");
                Ok(())
            }
            (Err(tracing_err), Ok(())) => {
                eprintln!("Note: Using log-only logging (tracing setup failed: {tracing_err})");
                Ok(())
            }
            (Err(tracing_err), Err(log_err)) => Err(format!(
                "Failed to initialize logging: tracing={tracing_err}, log={log_err}"
            )),
        };

        let _ = INIT_RESULT.set(result);
    });

    match INIT_RESULT.get() {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(e.clone().into()),
        None => Err("Initialization failed unexpectedly".into()),
    }
}

pub fn enable_logging() {
    *LOGGING_ENABLED.lock() = true;
}

pub fn disable_logging() {
    *LOGGING_ENABLED.lock() = false;
}

pub fn set_verbose_logging(enabled: bool) {
    *VERBOSE_LOGGING.lock() = enabled;
}

pub fn set_log_file(file_path: &str) -> std::io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)?;
    *LOG_FILE.lock() = Some(file);
    Ok(())
}

pub fn set_log_to_stderr(enabled: bool) {
    *LOG_TO_STDERR.lock() = enabled;
}

/// Whether the environment asks for log lines on stderr
pub fn verbose_requested() -> bool {
    std::env::var(VERBOSE_ENV).is_ok()
}

/// Route log lines to `file_path` and/or stderr. With neither sink, logging is off.
pub fn configure(file_path: Option<&str>, to_stderr: bool) -> std::io::Result<()> {
    if let Some(path) = file_path {
        set_log_file(path)?;
    }
    set_log_to_stderr(to_stderr);
    if file_path.is_some() || to_stderr {
        enable_logging();
    } else {
        disable_logging();
    }
    Ok(())
}

pub fn is_logging_enabled() -> bool {
    *LOGGING_ENABLED.lock()
}

pub fn logs_to_stderr() -> bool {
    *LOG_TO_STDERR.lock()
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        log::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        log::warn!($($arg)*)
    };
}
