use crate::{
    config::Config,
    log::{log_msg::LogMsg, logger_handle::LoggerHandle},
};

use std::{
    fs::{self, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, TrySendError},
    thread,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::log::log_level::LogLevel;

// -----------------------------------------------------------------------------
// COMPILE-TIME CONFIGURATION
// -----------------------------------------------------------------------------

/// Flush to disk every 100 lines if debugging/tracing (to see crashes near real-time).
#[cfg(feature = "log-debug")]
const FLUSH_BATCH_SIZE: u32 = 100;

/// Flush to disk every 1000 lines in production/default (to save I/O & CPU).
#[cfg(not(feature = "log-debug"))]
const FLUSH_BATCH_SIZE: u32 = 1_000;

// -----------------------------------------------------------------------------

/// Bounded, non-blocking logger that writes to a per-process log file.
///
/// # Architecture
///
/// 1. **Producers**: relay loop, connection threads and the client event loop
///    call `LogSink::log` on a cloned [`LoggerHandle`].
/// 2. **Queue**: a bounded `mpsc` channel buffers messages; overflow is dropped.
/// 3. **Consumer**: a dedicated worker thread writes lines to disk, flushes every
///    `FLUSH_BATCH_SIZE` lines and always flushes on `Warn`/`Error`.
pub struct Logger {
    handle: LoggerHandle,
    _thread: Option<thread::JoinHandle<()>>,
    file_path: PathBuf,
}

impl Logger {
    /// Starts the logger for a mesh client, reading `[Logging] client_log_*`.
    #[must_use]
    pub fn start_client(cap: usize, config: &Config) -> Self {
        Self::start("client_log_filename", "client_log_path", cap, config)
    }

    /// Starts the logger for the relay, reading `[Logging] server_log_*`.
    #[must_use]
    pub fn start_server(cap: usize, config: &Config) -> Self {
        Self::start("server_log_filename", "server_log_path", cap, config)
    }

    #[must_use]
    fn start(fn_key: &str, path_key: &str, cap: usize, config: &Config) -> Self {
        let app_name = config.get_non_empty("Logging", fn_key);

        if let Some(dir_str) = config.get_non_empty("Logging", path_key) {
            let dir = expand_path(dir_str);
            Self::start_in_dir(dir, app_name, cap)
        } else {
            Self::start_default(app_name, cap)
        }
    }

    /// Creates a `logs/` directory next to the executable and starts the logger there.
    ///
    /// # Example Filename
    /// `target/debug/logs/signaling_server-20251102_023045-pid1234.log`
    #[must_use]
    pub fn start_default(app_name: Option<&str>, cap: usize) -> Self {
        let base = exe_dir_fallback_cwd().join("logs");
        Self::start_in_dir(base, app_name, cap)
    }

    /// Starts the logger in a specific directory, creating it if missing.
    ///
    /// * `cap` - capacity of the log channel; producers drop messages beyond it.
    pub fn start_in_dir<D: AsRef<Path>>(dir: D, app_name: Option<&str>, cap: usize) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let _ = fs::create_dir_all(&dir);

        let ts = timestamp_for_filename();
        let pid = std::process::id();

        let fname = if let Some(name) = app_name {
            format!("{}-{}-pid{}.log", name, ts, pid)
        } else {
            format!("{}-pid{}.log", ts, pid)
        };

        let file_path = dir.join(&fname);

        let (tx, rx) = mpsc::sync_channel::<LogMsg>(cap.max(1));
        let handle = LoggerHandle { tx };

        let file_path_clone = file_path.clone();

        let _thread = thread::Builder::new()
            .name("logger-worker".into())
            .spawn(move || {
                // Try target file -> temp file -> sink (never panic).
                let writer: Box<dyn Write + Send> = if let Ok(f) = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&file_path_clone)
                {
                    Box::new(f)
                } else {
                    let fallback = std::env::temp_dir().join("meshrtc-fallback.log");
                    match OpenOptions::new().create(true).append(true).open(&fallback) {
                        Ok(f) => Box::new(f),
                        Err(_) => Box::new(io::sink()),
                    }
                };

                let mut out: BufWriter<Box<dyn Write + Send>> = BufWriter::new(writer);
                let mut lines_written: u32 = 0;

                while let Ok(m) = rx.recv() {
                    let _ = writeln!(&mut out, "{}", m.render());
                    lines_written = lines_written.wrapping_add(1);

                    if matches!(m.level, LogLevel::Warn | LogLevel::Error)
                        || lines_written.is_multiple_of(FLUSH_BATCH_SIZE)
                    {
                        let _ = out.flush();
                    }
                }

                let _ = out.flush();
            })
            .ok();

        Self {
            handle,
            _thread,
            file_path,
        }
    }

    /// Attempts to enqueue a log message without blocking the current thread.
    ///
    /// # Errors
    /// Returns [`TrySendError<LogMsg>`] when the queue is full or the worker is gone;
    /// the message is **not sent** in that case.
    pub fn try_log<S: Into<String>>(
        &self,
        level: LogLevel,
        text: S,
        target: &'static str,
    ) -> Result<(), TrySendError<LogMsg>> {
        self.handle.try_log(level, text, target)
    }

    /// Returns a cloneable handle to the logger sink.
    #[must_use]
    pub fn handle(&self) -> LoggerHandle {
        self.handle.clone()
    }

    /// Returns the path of the active log file.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Directory of the running executable, or the current working directory on error.
fn exe_dir_fallback_cwd() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// Human-readable UTC timestamp for filenames: `YYYYMMDD_HHMMSS`.
fn timestamp_for_filename() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    unix_to_utc(secs).map_or_else(
        |_| format!("unix_{secs}"),
        |tm| {
            format!(
                "{:04}{:02}{:02}_{:02}{:02}{:02}",
                tm.year, tm.mon, tm.day, tm.hour, tm.min, tm.sec
            )
        },
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SimpleUtc {
    year: i32,
    mon: u32,
    day: u32,
    hour: u32,
    min: u32,
    sec: u32,
}

#[derive(Debug)]
enum UtcConvError {
    Year,
    Month,
    Day,
}

/// Civil-from-days conversion of a UNIX timestamp to a Gregorian UTC date.
#[allow(clippy::many_single_char_names)]
fn unix_to_utc(mut s: u64) -> Result<SimpleUtc, UtcConvError> {
    let sec = (s % 60) as u32;
    s /= 60;
    let min = (s % 60) as u32;
    s /= 60;
    let hour = (s % 24) as u32;
    s /= 24;

    let z: i128 = i128::from(s) + 719_468;

    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097; // [0, 146096]
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let d = doy - (153 * mp + 2) / 5 + 1; // [1, 31]
    let m = mp + if mp < 10 { 3 } else { -9 }; // [1, 12]

    let year_i = y + i128::from(m <= 2);

    let year = i32::try_from(year_i).map_err(|_| UtcConvError::Year)?;
    let mon = u32::try_from(m).map_err(|_| UtcConvError::Month)?;
    let day = u32::try_from(d).map_err(|_| UtcConvError::Day)?;

    Ok(SimpleUtc {
        year,
        mon,
        day,
        hour,
        min,
        sec,
    })
}

/// Expands a leading `~` to the user's home directory.
fn expand_path(path_str: &str) -> PathBuf {
    if path_str.starts_with('~') {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .ok()
            .map(PathBuf::from);

        if let Some(mut home_path) = home {
            if path_str == "~" {
                return home_path;
            }
            if path_str.starts_with("~/") || path_str.starts_with("~\\") {
                home_path.push(&path_str[2..]);
                return home_path;
            }
        }
    }
    PathBuf::from(path_str)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::time::Duration;

    #[test]
    fn unix_epoch_and_known_date_convert() {
        let epoch = unix_to_utc(0).expect("epoch converts");
        assert_eq!((epoch.year, epoch.mon, epoch.day), (1970, 1, 1));

        // 2024-02-29 12:34:56 UTC
        let leap = unix_to_utc(1_709_210_096).expect("date converts");
        assert_eq!(
            leap,
            SimpleUtc {
                year: 2024,
                mon: 2,
                day: 29,
                hour: 12,
                min: 34,
                sec: 56,
            }
        );
    }

    #[test]
    fn expand_path_leaves_plain_paths_alone() {
        assert_eq!(expand_path("/var/log/mesh"), PathBuf::from("/var/log/mesh"));
    }

    #[test]
    fn warn_lines_reach_the_file() {
        let dir = std::env::temp_dir().join(format!("meshrtc_logger_test_{}", std::process::id()));
        let logger = Logger::start_in_dir(&dir, Some("unit"), 16);
        logger
            .try_log(LogLevel::Warn, "pending candidate expired", "test::logger")
            .expect("queue has room");

        let path = logger.file_path().to_path_buf();
        let mut found = false;
        for _ in 0..50 {
            if let Ok(content) = fs::read_to_string(&path) {
                if content.contains("pending candidate expired") {
                    found = true;
                    break;
                }
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(found, "expected warn line in {:?}", path);
        let _ = fs::remove_dir_all(&dir);
    }
}
