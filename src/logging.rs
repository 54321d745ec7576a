use crate::error::{Result, TableError};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEBUG_LOG_FILE: &str = "csv-tools.log";
pub const CRASH_LOG_FILE: &str = "csv-tools-crash.log";
const LOG_MAX_BYTES: u64 = 10 * 1024 * 1024;

fn now_timestamp() -> String {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let ms = duration.subsec_millis();
    format!("{secs}.{ms:03}")
}

/// Cache directory for logs, falling back to the working directory.
pub fn default_log_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "csv-tools")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn maybe_truncate_log(path: &Path) {
    let Ok(meta) = std::fs::metadata(path) else {
        return;
    };
    if meta.len() <= LOG_MAX_BYTES {
        return;
    }
    let _ = std::fs::write(path, b"");
}

fn append_log_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

fn install_panic_hook(crash_log: PathBuf) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let backtrace = std::backtrace::Backtrace::capture();
        let message = format!("[{}] PANIC: {info}\n{backtrace}\n", now_timestamp());
        let _ = append_log_line(&crash_log, &message);
        tracing::error!("{message}");
        previous(info);
    }));
}

/// Map `-v` occurrences onto a level; WARN when none are given.
pub fn level_from_verbosity(verbose: u8) -> tracing::Level {
    match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

/// Route `tracing` output to a log file and install the crash-log panic hook.
///
/// `RUST_LOG` takes precedence over `level`.
pub fn init_with(custom_log_path: Option<PathBuf>, level: tracing::Level) -> Result<PathBuf> {
    let log_path = custom_log_path.unwrap_or_else(|| default_log_dir().join(DEBUG_LOG_FILE));
    let log_dir = log_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&log_dir).map_err(|err| TableError::io(&log_dir, err))?;
    maybe_truncate_log(&log_path);

    // Fail early on an unwritable log path.
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|err| TableError::io(&log_path, err))?;

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let writer_path = log_path.clone();
    let file_layer = fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_writer(move || -> Box<dyn Write> {
            match OpenOptions::new().create(true).append(true).open(&writer_path) {
                Ok(file) => Box::new(file),
                Err(_) => Box::new(std::io::sink()),
            }
        })
        .with_target(false)
        .with_ansi(false)
        .with_filter(env_filter);

    // An already-installed global subscriber stays in place.
    let _ = tracing_subscriber::registry().with(file_layer).try_init();

    install_panic_hook(log_dir.join(CRASH_LOG_FILE));
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(level_from_verbosity(0), tracing::Level::WARN);
        assert_eq!(level_from_verbosity(1), tracing::Level::INFO);
        assert_eq!(level_from_verbosity(2), tracing::Level::DEBUG);
        assert_eq!(level_from_verbosity(9), tracing::Level::TRACE);
    }

    #[test]
    fn oversized_logs_are_truncated() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(DEBUG_LOG_FILE);
        std::fs::write(&path, vec![b'x'; (LOG_MAX_BYTES + 1) as usize]).expect("write log");
        maybe_truncate_log(&path);
        assert_eq!(std::fs::metadata(&path).expect("meta").len(), 0);
    }

    #[test]
    fn small_logs_are_kept() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(DEBUG_LOG_FILE);
        append_log_line(&path, "hello").expect("append");
        maybe_truncate_log(&path);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "hello\n");
    }
}
