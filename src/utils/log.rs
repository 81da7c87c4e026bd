//! Leveled, colored logging to stderr.
//!
//! Messages go to stderr so program output written through `SYSCALL` stays
//! clean on stdout. Each line is stamped with the time elapsed since the first
//! message, which is what matters when tracing a run.
//!
//! Use the [`debug!`](crate::debug), [`info!`](crate::info),
//! [`warn!`](crate::warn) and [`error!`](crate::error) macros. Messages below
//! the threshold set with [`set_level`] are dropped before formatting.

use std::fmt::Display;
use std::io::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Log level for filtering messages.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Level::Debug,
            1 => Level::Info,
            2 => Level::Warn,
            _ => Level::Error,
        }
    }

    fn color(self) -> ColorSpec {
        let mut spec = ColorSpec::new();
        match self {
            Level::Debug => spec.set_fg(Some(Color::Cyan)),
            Level::Info => &mut spec,
            Level::Warn => spec.set_fg(Some(Color::Yellow)).set_bold(true),
            Level::Error => spec.set_fg(Some(Color::Red)).set_bold(true),
        };
        spec
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        };
        f.pad(label)
    }
}

static THRESHOLD: AtomicU8 = AtomicU8::new(Level::Info as u8);
static START: OnceLock<Instant> = OnceLock::new();

/// Prefix lines with the elapsed time.
pub static SHOW_ELAPSED: AtomicBool = AtomicBool::new(true);
/// Prefix lines with the level.
pub static SHOW_LEVEL: AtomicBool = AtomicBool::new(true);

/// Sets the lowest level that is printed. Defaults to [`Level::Info`].
pub fn set_level(level: Level) {
    THRESHOLD.store(level as u8, Ordering::Relaxed);
}

pub fn level() -> Level {
    Level::from_u8(THRESHOLD.load(Ordering::Relaxed))
}

/// Returns true when messages at `level` are printed.
pub fn enabled(level: Level) -> bool {
    level >= self::level()
}

/// Renders `elapsed` as `seconds.millis`, right-aligned.
fn format_elapsed(elapsed: Duration) -> String {
    format!("{:>4}.{:03}", elapsed.as_secs(), elapsed.subsec_millis())
}

/// Internal logging function. Use the logging macros instead.
#[doc(hidden)]
pub fn log(level: Level, message: &str) {
    let elapsed = START.get_or_init(Instant::now).elapsed();

    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let _ = stderr.set_color(&level.color());

    if SHOW_ELAPSED.load(Ordering::Relaxed) {
        let _ = write!(stderr, "[{}] ", format_elapsed(elapsed));
    }
    if SHOW_LEVEL.load(Ordering::Relaxed) {
        let _ = write!(stderr, "{:<5} ", level);
    }
    let _ = writeln!(stderr, "{}", message);
    let _ = stderr.reset();
}

/// Logs a debug-level message. Off unless the level was lowered to
/// [`Level::Debug`](crate::utils::log::Level::Debug).
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::__log!($crate::utils::log::Level::Debug, $($arg)*)
    };
}

/// Logs an info-level message.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::__log!($crate::utils::log::Level::Info, $($arg)*)
    };
}

/// Logs a warning-level message.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::__log!($crate::utils::log::Level::Warn, $($arg)*)
    };
}

/// Logs an error-level message.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::__log!($crate::utils::log::Level::Error, $($arg)*)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log {
    ($level:expr, $($arg:tt)*) => {{
        if cfg!(not(test)) && $crate::utils::log::enabled($level) {
            $crate::utils::log::log($level, &format!($($arg)*))
        }
    }};
}
