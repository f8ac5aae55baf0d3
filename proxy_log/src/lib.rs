use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

pub const LEVEL_TRACE: u8 = 0;
pub const LEVEL_DEBUG: u8 = 1;
pub const LEVEL_INFO: u8 = 2;
pub const LEVEL_WARN: u8 = 3;
pub const LEVEL_ERROR: u8 = 4;

static MIN_LEVEL: AtomicU8 = AtomicU8::new(LEVEL_INFO);
static SINK: OnceLock<Mutex<std::fs::File>> = OnceLock::new();

/// Sets the process-wide minimum level; calls below it become no-ops.
pub fn set_level(min_level: u8) {
    MIN_LEVEL.store(min_level, Ordering::Relaxed);
}

pub fn enabled(level: u8) -> bool {
    level >= MIN_LEVEL.load(Ordering::Relaxed)
}

/// Redirects subsequent log lines to `path` instead of stderr. Can only be set once.
pub fn set_log_file(path: &std::path::Path) -> std::io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let _ = SINK.set(Mutex::new(file));
    Ok(())
}

pub fn format_time(now: SystemTime) -> String {
    let duration = now.duration_since(UNIX_EPOCH).unwrap();
    let secs = duration.as_secs();

    let year = 1970 + (secs / 31_557_600); // Rough years
    let month = ((secs % 31_557_600) / 2_628_000) as u8 + 1;
    let day = ((secs % 2_628_000) / 86_400) as u8 + 1;
    let hour = ((secs % 86_400) / 3600) as u8;
    let minute = ((secs % 3600) / 60) as u8;
    let second = (secs % 60) as u8;

    format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", year, month, day, hour, minute, second)
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            for c2 in chars.by_ref() {
                if c2 == 'm' {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[doc(hidden)]
pub fn write_line(line: &str) {
    if let Some(mutex) = SINK.get() {
        if let Ok(mut file) = mutex.lock() {
            let _ = writeln!(file, "{}", strip_ansi(line));
            return;
        }
    }
    eprintln!("{}", line);
}

#[macro_export]
macro_rules! log {
    ($level_num:expr, $level:expr, $color:expr, $($arg:tt)*) => {
        if $crate::enabled($level_num) {
            let ts = $crate::format_time(std::time::SystemTime::now());
            let line = format!(
                "[{}] \x1b[30m #|| litefs ||# \x1b[0m \x1b[{}m{}\x1b[0m: {}",
                ts,
                $color,
                $level,
                format!($($arg)*)
            );
            $crate::write_line(&line);
        }
    };
}

#[macro_export]
macro_rules! trace { ($($arg:tt)*) => { $crate::log!($crate::LEVEL_TRACE, "TRACE", "34", $($arg)*); }; } // Blue
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => { $crate::log!($crate::LEVEL_DEBUG, "DEBUG", "36", $($arg)*); }; } // Cyan
#[macro_export]
macro_rules! info { ($($arg:tt)*) => { $crate::log!($crate::LEVEL_INFO, "INFO ", "32", $($arg)*); }; } // Green
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => { $crate::log!($crate::LEVEL_WARN, "WARN ", "33", $($arg)*); }; } // Yellow
#[macro_export]
macro_rules! errors { ($($arg:tt)*) => { $crate::log!($crate::LEVEL_ERROR, "ERROR", "31", $($arg)*); }; } // Red
