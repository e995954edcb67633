//! Centralized category logging for the device core.
//!
//! Every controller logs through [`log`] with a [`LogCategory`] and a
//! [`LogLevel`]. Levels are held in atomics so the hot path (a disabled
//! category) costs one relaxed load and never formats the message.
//!
//! # Architecture
//!
//! - **LogConfig**: global singleton, one atomic level per category plus a
//!   global fallback level
//! - **RateLimiter**: sliding one-second window per category so a guest
//!   hammering an unmapped register cannot flood the output
//! - **log()**: lazy message construction, optional background file writer
//!
//! # Usage
//!
//! ```rust
//! use rcp_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Dma, LogLevel::Warn, || {
//!     format!("PI: no DMA handler for cart address {:08X}", 0x0600_0000u32)
//! });
//! ```

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Entries of a log filter string that name no known category or level
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized log filter entries: {0:?}")]
pub struct LogFilterError(pub Vec<String>);

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Log category for the device components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// CP0 timing: COUNT/COMPARE, execution engine hooks
    CPU,
    /// Memory bus dispatch, open bus, handler remapping, breakpoints
    Bus,
    /// Event queue and MI interrupt lines
    Interrupts,
    /// Audio interface
    Audio,
    /// Video interface, RDP front-end, framebuffer tracking
    Video,
    /// PI/SI/SP DMA and PIF command processing
    Dma,
    /// Unimplemented or undefined hardware paths
    Stubs,
}

const CATEGORY_COUNT: usize = 7;

impl LogCategory {
    /// Every category, in index order
    pub const ALL: [LogCategory; CATEGORY_COUNT] = [
        LogCategory::CPU,
        LogCategory::Bus,
        LogCategory::Interrupts,
        LogCategory::Audio,
        LogCategory::Video,
        LogCategory::Dma,
        LogCategory::Stubs,
    ];

    fn index(self) -> usize {
        match self {
            LogCategory::CPU => 0,
            LogCategory::Bus => 1,
            LogCategory::Interrupts => 2,
            LogCategory::Audio => 3,
            LogCategory::Video => 4,
            LogCategory::Dma => 5,
            LogCategory::Stubs => 6,
        }
    }

    /// Parse a category name as accepted on the command line
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cpu" | "cp0" => Some(LogCategory::CPU),
            "bus" | "mem" => Some(LogCategory::Bus),
            "irq" | "interrupts" | "events" => Some(LogCategory::Interrupts),
            "ai" | "audio" => Some(LogCategory::Audio),
            "vi" | "video" | "rdp" => Some(LogCategory::Video),
            "dma" | "pi" | "si" | "pif" => Some(LogCategory::Dma),
            "stubs" => Some(LogCategory::Stubs),
            _ => None,
        }
    }
}

/// One category's last second of accepted messages.
#[derive(Default)]
struct Window {
    accepted: VecDeque<Instant>,
    dropped: usize,
    reported_at: Option<Instant>,
}

impl Window {
    fn expire(&mut self, now: Instant, span: Duration) {
        while self
            .accepted
            .front()
            .is_some_and(|&t| now.duration_since(t) > span)
        {
            self.accepted.pop_front();
        }
    }

    /// Hand out the drop count if a summary is due.
    fn take_dropped(&mut self, now: Instant, force: bool) -> Option<usize> {
        let due = force
            || self
                .reported_at
                .map_or(true, |last| now.duration_since(last) >= Duration::from_secs(1));
        if self.dropped == 0 || !due {
            return None;
        }
        self.reported_at = Some(now);
        Some(std::mem::take(&mut self.dropped))
    }
}

/// What the limiter decided for one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Verdict {
    allowed: bool,
    /// Messages dropped since the last summary, when one should be written now
    summary: Option<usize>,
}

/// Sliding one-second window per category
struct RateLimiter {
    per_second: AtomicUsize,
    windows: Mutex<[Window; CATEGORY_COUNT]>,
}

impl RateLimiter {
    fn new(per_second: usize) -> Self {
        Self {
            per_second: AtomicUsize::new(per_second),
            windows: Mutex::new(std::array::from_fn(|_| Window::default())),
        }
    }

    fn limit(&self) -> usize {
        self.per_second.load(Ordering::Relaxed)
    }

    fn check(&self, category: LogCategory) -> Verdict {
        let now = Instant::now();
        // a poisoned lock only means another thread panicked mid-log
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let window = &mut windows[category.index()];
        window.expire(now, Duration::from_secs(1));

        if window.accepted.len() < self.limit() {
            window.accepted.push_back(now);
            return Verdict {
                allowed: true,
                summary: window.take_dropped(now, true),
            };
        }
        window.dropped += 1;
        Verdict {
            allowed: false,
            summary: window.take_dropped(now, false),
        }
    }
}

/// Global logging configuration
pub struct LogConfig {
    /// Fallback for categories without their own level
    global_level: AtomicU8,
    category_levels: [AtomicU8; CATEGORY_COUNT],
    log_sender: Mutex<Option<Sender<String>>>,
    file_logging_enabled: AtomicBool,
    rate_limiter: RateLimiter,
}

impl LogConfig {
    /// All logging disabled, 60 messages per second per category
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            category_levels: std::array::from_fn(|_| AtomicU8::new(LogLevel::Off as u8)),
            log_sender: Mutex::new(None),
            file_logging_enabled: AtomicBool::new(false),
            rate_limiter: RateLimiter::new(60),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.category_levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.category_levels[category.index()].load(Ordering::Relaxed))
    }

    /// A category with its own level uses it; otherwise the global level applies.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        let category_level = self.get_level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.get_global_level()
        }
    }

    /// Reset all logging to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    /// Apply a comma separated `category=level` list, e.g. `"dma=debug,video=warn"`.
    ///
    /// A bare level (`"info"`) sets the global level. Valid entries are applied
    /// even when others are rejected.
    pub fn apply_filter(&self, filter: &str) -> Result<(), LogFilterError> {
        let mut rejected = Vec::new();
        for entry in filter.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.split_once('=') {
                Some((cat, lvl)) => match (LogCategory::from_str(cat), LogLevel::from_str(lvl)) {
                    (Some(cat), Some(lvl)) => self.set_level(cat, lvl),
                    _ => rejected.push(entry.to_string()),
                },
                None => match LogLevel::from_str(entry) {
                    Some(lvl) => self.set_global_level(lvl),
                    None => rejected.push(entry.to_string()),
                },
            }
        }
        if rejected.is_empty() {
            Ok(())
        } else {
            Err(LogFilterError(rejected))
        }
    }

    /// Messages per second and category; 0 silences everything.
    pub fn set_rate_limit(&self, per_second: usize) {
        self.rate_limiter.per_second.store(per_second, Ordering::Relaxed);
    }

    pub fn get_rate_limit(&self) -> usize {
        self.rate_limiter.limit()
    }

    /// Redirect output to a file written by a background thread.
    ///
    /// Replaces any previous writer; the old thread exits once its sender drops.
    pub fn set_log_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = channel::<String>();

        thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                let mut file = file;
                while let Ok(message) = receiver.recv() {
                    let _ = writeln!(file, "{}", message);
                    let _ = file.flush();
                }
                let _ = file.flush();
            })?;

        *self.log_sender.lock().unwrap_or_else(|e| e.into_inner()) = Some(sender);
        self.file_logging_enabled.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Stop logging to file and fall back to stderr
    pub fn clear_log_file(&self) {
        *self.log_sender.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.file_logging_enabled.store(false, Ordering::Relaxed);
    }

    fn write_message(&self, message: &str) {
        if self.file_logging_enabled.load(Ordering::Relaxed) {
            let log_sender = self.log_sender.lock().unwrap_or_else(|e| e.into_inner());
            match *log_sender {
                Some(ref sender) if sender.send(message.to_string()).is_ok() => {}
                _ => eprintln!("{}", message),
            }
        } else {
            eprintln!("{}", message);
        }
    }
}

/// Log a message with the specified category and level.
///
/// The closure only runs when the category/level is enabled and the rate
/// limiter lets the message through. When messages were dropped a one-line
/// summary is written first.
///
/// ```rust
/// use rcp_core::logging::{log, LogCategory, LogLevel};
///
/// log(LogCategory::Interrupts, LogLevel::Debug, || {
///     format!("event VI scheduled at count {:08X}", 0x1000u32)
/// });
/// ```
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let verdict = config.rate_limiter.check(category);
    if let Some(count) = verdict.summary {
        config.write_message(&format!(
            "[{:?}] {} message(s) dropped by the rate limit",
            category, count
        ));
    }

    if verdict.allowed {
        let message = message_fn();
        config.write_message(&format!("[{:?}] {}", category, message));
    }
}
