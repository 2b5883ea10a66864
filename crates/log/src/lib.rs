//! Process-wide leveled logging sink.
//!
//! This crate provides the logging backend shared by every component of the
//! server: a leveled logger with per-level ring buffers, optional syslog
//! fan-out, console and file sinks, and an independent Apache Combined Log
//! Format access-log destination with rotation by line count.
//!
//! # Components
//!
//! - [`Logger`]: the sink itself. One instance is process-wide, reachable
//!   through [`logger()`].
//! - [`Level`] / [`DebugFlag`]: bitmask-backed level and debug-category
//!   selectors, configurable from comma-separated flag strings.
//! - [`LogLine`]: a retained line, returned by [`Logger::get_log`].
//!
//! # Concurrency
//!
//! Every emission and every retrieval runs under one internal mutex, so any
//! thread may log at any time. Sequence mode ([`Logger::sequence_start`])
//! is single-writer: the caller must not interleave sequences across
//! threads.

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use chrono::Local;

/// Capacity of each per-level ring buffer, and of the error-notification ring.
const MAX_LOG_LINE_BUFFER: usize = 100;

/// Access-log rotation threshold: the file is closed and reopened after this
/// many lines.
pub const MAX_ACLFLOG_LINES: usize = 100_000;

/// Log levels. The discriminants are bit values so a set of enabled levels
/// is a plain `u32` mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Level {
    Normal = 0x01,
    Status = 0x02,
    Error = 0x04,
    Debug = 0x08,
}

impl Level {
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// The `Level:` prefix written in front of the line body. Normal lines
    /// carry no prefix.
    fn prefix(self) -> &'static str {
        match self {
            Level::Normal => "",
            Level::Status => "Status: ",
            Level::Error => "Error: ",
            Level::Debug => "Debug: ",
        }
    }
}

/// Mask with every log level enabled.
pub const LOG_ALL: u32 =
    Level::Normal.bits() | Level::Status.bits() | Level::Error.bits() | Level::Debug.bits();

/// Debug categories, admitted only while [`Level::Debug`] is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DebugFlag {
    Normal = 0x0001,
    Hardware = 0x0002,
    Received = 0x0004,
    Webserver = 0x0008,
    Eventsystem = 0x0010,
    Python = 0x0020,
    ThreadIds = 0x0040,
    Sql = 0x0080,
    Auth = 0x0100,
}

impl DebugFlag {
    pub const fn bits(self) -> u32 {
        self as u32
    }
}

/// Mask with every debug category enabled.
pub const DEBUG_ALL: u32 = 0x01FF;

/// A retained log line.
#[derive(Debug, Clone)]
pub struct LogLine {
    /// Unix timestamp (seconds) at which the line was emitted.
    pub logtime: i64,
    pub level: Level,
    /// The formatted line, including timestamp and prefix.
    pub message: String,
}

// Access-log destination flags.
const ACLF_ENABLED: u32 = 0x01;
const ACLF_FILE: u32 = 0x02;
const ACLF_SYSLOG: u32 = 0x04;

#[cfg(unix)]
type SyslogWriter = syslog::Logger<syslog::LoggerBackend, syslog::Formatter3164>;

struct Inner {
    output_file: Option<File>,
    aclf_file: Option<File>,
    aclf_path: Option<PathBuf>,
    aclf_lines: usize,
    aclf_max_lines: usize,
    rings: HashMap<u32, VecDeque<LogLine>>,
    notification_ring: VecDeque<LogLine>,
    in_sequence: bool,
    sequence: String,
    notify_hook: Option<Box<dyn Fn() + Send + Sync>>,
    #[cfg(unix)]
    syslog: Option<SyslogWriter>,
    #[cfg(unix)]
    aclf_syslog: Option<SyslogWriter>,
}

impl Inner {
    fn new() -> Self {
        Inner {
            output_file: None,
            aclf_file: None,
            aclf_path: None,
            aclf_lines: 0,
            aclf_max_lines: MAX_ACLFLOG_LINES,
            rings: HashMap::new(),
            notification_ring: VecDeque::new(),
            in_sequence: false,
            sequence: String::new(),
            notify_hook: None,
            #[cfg(unix)]
            syslog: None,
            #[cfg(unix)]
            aclf_syslog: None,
        }
    }
}

/// The thread-safe logging sink.
///
/// One instance is shared process-wide (see [`logger()`]); separate
/// instances exist only in tests.
pub struct Logger {
    log_flags: AtomicU32,
    debug_flags: AtomicU32,
    aclf_flags: AtomicU32,
    timestamps: AtomicBool,
    forward_errors: AtomicBool,
    use_syslog: AtomicBool,
    daemon: AtomicBool,
    last_notification_send: AtomicU64,
    inner: Mutex<Inner>,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// The process-wide logger instance.
pub fn logger() -> &'static Logger {
    LOGGER.get_or_init(Logger::new)
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    pub fn new() -> Self {
        Logger {
            log_flags: AtomicU32::new(Level::Normal.bits() | Level::Status.bits() | Level::Error.bits()),
            debug_flags: AtomicU32::new(DebugFlag::Normal.bits()),
            aclf_flags: AtomicU32::new(0),
            timestamps: AtomicBool::new(true),
            forward_errors: AtomicBool::new(false),
            use_syslog: AtomicBool::new(false),
            daemon: AtomicBool::new(false),
            last_notification_send: AtomicU64::new(0),
            inner: Mutex::new(Inner::new()),
        }
    }

    // ---- flag configuration ----------------------------------------------

    /// Parses a comma-separated level list: `all,normal,status,error,debug`.
    ///
    /// A numeric token is taken as a raw bitmask and ends parsing; unknown
    /// tokens are skipped. An empty result falls back to `status,error`.
    pub fn set_log_flags_str(&self, flags: &str) {
        let mut bits = 0u32;
        for token in flags.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if let Ok(raw) = token.parse::<u32>() {
                bits = raw;
                break;
            }
            match token {
                "all" => bits |= LOG_ALL,
                "normal" => bits |= Level::Normal.bits(),
                "status" => bits |= Level::Status.bits(),
                "error" => bits |= Level::Error.bits(),
                "debug" => bits |= Level::Debug.bits(),
                _ => continue,
            }
        }
        if bits == 0 {
            bits = Level::Status.bits() | Level::Error.bits();
        }
        self.set_log_flags(bits);
    }

    pub fn set_log_flags(&self, bits: u32) {
        self.log_flags.store(bits, Ordering::SeqCst);
    }

    pub fn log_flags(&self) -> u32 {
        self.log_flags.load(Ordering::SeqCst)
    }

    /// Parses a comma-separated debug-category list:
    /// `all,normal,hardware,received,webserver,eventsystem,python,thread_id,sql,auth`.
    ///
    /// Enabling any category implicitly enables the `Debug` level (announced
    /// with a status line); enabling `webserver` also enables the access log.
    pub fn set_debug_flags_str(&self, flags: &str) {
        let mut bits = 0u32;
        for token in flags.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if let Ok(raw) = token.parse::<u32>() {
                bits = raw;
                break;
            }
            match token {
                "all" => bits |= DEBUG_ALL,
                "normal" => bits |= DebugFlag::Normal.bits(),
                "hardware" => bits |= DebugFlag::Hardware.bits(),
                "received" => bits |= DebugFlag::Received.bits(),
                "webserver" => bits |= DebugFlag::Webserver.bits(),
                "eventsystem" => bits |= DebugFlag::Eventsystem.bits(),
                "python" => bits |= DebugFlag::Python.bits(),
                "thread_id" => bits |= DebugFlag::ThreadIds.bits(),
                "sql" => bits |= DebugFlag::Sql.bits(),
                "auth" => bits |= DebugFlag::Auth.bits(),
                _ => continue,
            }
        }
        self.set_debug_flags(bits);
        if self.is_debug_enabled(DebugFlag::Webserver) {
            self.aclf_flags.fetch_or(ACLF_ENABLED, Ordering::SeqCst);
        }
        if bits != 0 && !self.is_level_enabled(Level::Debug) {
            self.log_flags.fetch_or(Level::Debug.bits(), Ordering::SeqCst);
            self.log(Level::Status, "Enabling Debug logging!");
        }
    }

    pub fn set_debug_flags(&self, bits: u32) {
        self.debug_flags.store(bits, Ordering::SeqCst);
    }

    pub fn debug_flags(&self) -> u32 {
        self.debug_flags.load(Ordering::SeqCst)
    }

    pub fn is_level_enabled(&self, level: Level) -> bool {
        self.log_flags.load(Ordering::SeqCst) & level.bits() != 0
    }

    pub fn is_debug_enabled(&self, flag: DebugFlag) -> bool {
        if self.log_flags.load(Ordering::SeqCst) & Level::Debug.bits() == 0 {
            return false;
        }
        self.debug_flags.load(Ordering::SeqCst) & flag.bits() != 0
    }

    pub fn is_aclf_enabled(&self) -> bool {
        self.aclf_flags.load(Ordering::SeqCst) & ACLF_ENABLED != 0
    }

    // ---- sink configuration ----------------------------------------------

    /// Opens the plain log file sink. Append mode in release builds,
    /// truncate in debug builds. `None` closes the sink.
    pub fn set_output_file(&self, path: Option<&Path>) {
        let mut inner = self.inner.lock().unwrap();
        inner.output_file = None;
        let path = match path {
            Some(p) => p,
            None => return,
        };
        match open_log_file(path) {
            Ok(file) => inner.output_file = Some(file),
            Err(_) => eprintln!("Error opening output log file..."),
        }
    }

    /// Configures the access-log destination. A target starting with
    /// `syslog:` routes lines to syslog with the LOCAL1 facility; anything
    /// else is a filesystem path. Either way the access log is enabled.
    pub fn set_aclf_output(&self, target: &str) {
        if target.starts_with("syslog:") {
            self.log(Level::Status, "Weblogs are send to SYSLOG!");
            self.aclf_flags.fetch_or(ACLF_SYSLOG, Ordering::SeqCst);
        } else {
            let mut inner = self.inner.lock().unwrap();
            inner.aclf_path = Some(PathBuf::from(target));
            drop(inner);
            self.aclf_flags.fetch_or(ACLF_FILE, Ordering::SeqCst);
        }
        self.aclf_flags.fetch_or(ACLF_ENABLED, Ordering::SeqCst);
    }

    /// Routes every admitted line to syslog as well, suppressing the
    /// timestamp prefix (syslog stamps lines itself).
    #[cfg(unix)]
    pub fn enable_syslog(&self, process: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.syslog = open_syslog(process, syslog::Facility::LOG_USER);
        inner.aclf_syslog = open_syslog(process, syslog::Facility::LOG_LOCAL1);
        drop(inner);
        self.use_syslog.store(true, Ordering::SeqCst);
    }

    /// Marks the process as daemonized: the console sink is skipped.
    pub fn set_daemonized(&self, daemonized: bool) {
        self.daemon.store(daemonized, Ordering::SeqCst);
    }

    pub fn enable_timestamps(&self, enable: bool) {
        self.timestamps.store(enable, Ordering::SeqCst);
    }

    pub fn is_timestamps_enabled(&self) -> bool {
        self.timestamps.load(Ordering::SeqCst) && !self.use_syslog.load(Ordering::SeqCst)
    }

    /// Enables mirroring of error lines into the notification ring. The
    /// ring is cleared when forwarding is switched off.
    pub fn forward_errors_to_notification_system(&self, forward: bool) {
        self.forward_errors.store(forward, Ordering::SeqCst);
        if !forward {
            self.inner.lock().unwrap().notification_ring.clear();
        }
    }

    pub fn notification_logs_enabled(&self) -> bool {
        self.forward_errors.load(Ordering::SeqCst)
    }

    /// Registers the wakeup hook for the notification worker. Called (under
    /// the logger mutex, so keep it cheap) when an error enters an empty
    /// ring and the last drain is at least five seconds old.
    pub fn set_notification_hook(&self, hook: Box<dyn Fn() + Send + Sync>) {
        self.inner.lock().unwrap().notify_hook = Some(hook);
    }

    // ---- emission --------------------------------------------------------

    /// Emits one line at `level`, fanning it out to every configured sink.
    pub fn log(&self, level: Level, message: impl AsRef<str>) {
        if !self.is_level_enabled(level) {
            return;
        }
        let message = message.as_ref();

        let mut line = String::with_capacity(message.len() + 32);
        if self.is_timestamps_enabled() {
            line.push_str(&Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string());
            line.push_str("  ");
        }
        if self.is_level_enabled(Level::Debug) && self.is_debug_enabled(DebugFlag::ThreadIds) {
            line.push_str(&format!("[{:04x}] ", current_thread_tag()));
        }
        line.push_str(level.prefix());
        line.push_str(message);

        let now = Local::now().timestamp();
        let mut inner = self.inner.lock().unwrap();

        #[cfg(unix)]
        if self.use_syslog.load(Ordering::SeqCst) {
            if let Some(writer) = inner.syslog.as_mut() {
                let _ = match level {
                    Level::Error => writer.err(message),
                    Level::Status => writer.notice(message),
                    _ => writer.info(message),
                };
            }
        }

        if level == Level::Error && self.forward_errors.load(Ordering::SeqCst) {
            if inner.notification_ring.len() >= MAX_LOG_LINE_BUFFER {
                inner.notification_ring.pop_front();
            }
            inner.notification_ring.push_back(LogLine {
                logtime: now,
                level,
                message: line.clone(),
            });
            let last = self.last_notification_send.load(Ordering::SeqCst) as i64;
            if inner.notification_ring.len() == 1 && now - last >= 5 {
                if let Some(hook) = inner.notify_hook.as_ref() {
                    hook();
                }
            }
        }

        if !self.daemon.load(Ordering::SeqCst) {
            print_console(level, &line);
        }

        if let Some(file) = inner.output_file.as_mut() {
            let _ = writeln!(file, "{line}");
            let _ = file.flush();
        }

        let ring = inner.rings.entry(level.bits()).or_default();
        if ring.len() >= MAX_LOG_LINE_BUFFER {
            ring.pop_front();
        }
        ring.push_back(LogLine {
            logtime: now,
            level,
            message: line,
        });
    }

    /// Emits a debug line in the given category. Dropped unless both the
    /// `Debug` level and the category are enabled.
    pub fn debug(&self, flag: DebugFlag, message: impl AsRef<str>) {
        if !self.is_debug_enabled(flag) {
            return;
        }
        self.log(Level::Debug, message);
    }

    /// Emits one access-log line to the configured ACLF destination.
    ///
    /// The file sink rotates (close + reopen) every
    /// [`MAX_ACLFLOG_LINES`] lines.
    pub fn aclf(&self, line: impl AsRef<str>) {
        if !self.is_aclf_enabled() {
            return;
        }
        let line = line.as_ref();

        if self.is_debug_enabled(DebugFlag::Webserver) {
            self.debug(DebugFlag::Webserver, format!("Web ACLF: {line}"));
        }

        let flags = self.aclf_flags.load(Ordering::SeqCst);
        if flags & ACLF_FILE != 0 {
            let mut inner = self.inner.lock().unwrap();
            if inner.aclf_lines >= inner.aclf_max_lines || inner.aclf_file.is_none() {
                inner.aclf_file = None;
                if let Some(path) = inner.aclf_path.clone() {
                    match open_log_file(&path) {
                        Ok(file) => inner.aclf_file = Some(file),
                        Err(_) => {
                            eprintln!("Error opening Apache Combined LogFormat webserver log file...")
                        }
                    }
                }
                inner.aclf_lines = 1;
            } else {
                inner.aclf_lines += 1;
            }
            if let Some(file) = inner.aclf_file.as_mut() {
                let _ = writeln!(file, "{line}");
                let _ = file.flush();
            }
        }

        #[cfg(unix)]
        if self.use_syslog.load(Ordering::SeqCst) && flags & ACLF_SYSLOG != 0 {
            let mut inner = self.inner.lock().unwrap();
            if let Some(writer) = inner.aclf_syslog.as_mut() {
                let _ = writer.info(line);
            }
        }
    }

    // ---- sequence mode ---------------------------------------------------

    /// Enters sequence mode: subsequent [`Logger::sequence_add`] calls
    /// accumulate into one buffer that is emitted atomically by
    /// [`Logger::sequence_end`].
    pub fn sequence_start(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.in_sequence = true;
        inner.sequence.clear();
    }

    pub fn sequence_add(&self, line: &str) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.in_sequence {
            return;
        }
        inner.sequence.push_str(line);
        inner.sequence.push('\n');
    }

    pub fn sequence_add_no_lf(&self, line: &str) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.in_sequence {
            return;
        }
        inner.sequence.push_str(line);
    }

    /// Emits the accumulated sequence as one line (trailing newline
    /// trimmed) and leaves sequence mode.
    pub fn sequence_end(&self, level: Level) {
        let message = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.in_sequence {
                return;
            }
            inner.in_sequence = false;
            let mut message = std::mem::take(&mut inner.sequence);
            if message.ends_with('\n') {
                message.pop();
            }
            message
        };
        self.log(level, message);
    }

    // ---- retrieval -------------------------------------------------------

    /// Returns the buffered lines newer than `since` (unix seconds), sorted
    /// ascending by time. `None` merges every level.
    pub fn get_log(&self, level: Option<Level>, since: i64) -> Vec<LogLine> {
        let inner = self.inner.lock().unwrap();
        let mut lines: Vec<LogLine> = match level {
            Some(level) => inner
                .rings
                .get(&level.bits())
                .map(|ring| ring.iter().filter(|l| l.logtime > since).cloned().collect())
                .unwrap_or_default(),
            None => inner
                .rings
                .values()
                .flat_map(|ring| ring.iter())
                .filter(|l| l.logtime > since)
                .cloned()
                .collect(),
        };
        lines.sort_by_key(|l| l.logtime);
        lines
    }

    pub fn clear_log(&self) {
        self.inner.lock().unwrap().rings.clear();
    }

    /// Drains the error-notification ring, stamping the drain time for the
    /// wakeup rate limit.
    pub fn get_notification_logs(&self) -> Vec<LogLine> {
        let mut inner = self.inner.lock().unwrap();
        let lines: Vec<LogLine> = inner.notification_ring.drain(..).collect();
        if !lines.is_empty() {
            self.last_notification_send
                .store(Local::now().timestamp() as u64, Ordering::SeqCst);
        }
        lines
    }

    #[cfg(test)]
    fn set_aclf_max_lines(&self, max: usize) {
        self.inner.lock().unwrap().aclf_max_lines = max;
    }
}

/// Renders a level mask back into the token form accepted by
/// [`Logger::set_log_flags_str`].
pub fn log_flags_to_string(bits: u32) -> String {
    let mut tokens = Vec::new();
    if bits & Level::Normal.bits() != 0 {
        tokens.push("normal");
    }
    if bits & Level::Status.bits() != 0 {
        tokens.push("status");
    }
    if bits & Level::Error.bits() != 0 {
        tokens.push("error");
    }
    if bits & Level::Debug.bits() != 0 {
        tokens.push("debug");
    }
    tokens.join(",")
}

/// Renders a debug-category mask back into the token form accepted by
/// [`Logger::set_debug_flags_str`].
pub fn debug_flags_to_string(bits: u32) -> String {
    const NAMES: [(DebugFlag, &str); 9] = [
        (DebugFlag::Normal, "normal"),
        (DebugFlag::Hardware, "hardware"),
        (DebugFlag::Received, "received"),
        (DebugFlag::Webserver, "webserver"),
        (DebugFlag::Eventsystem, "eventsystem"),
        (DebugFlag::Python, "python"),
        (DebugFlag::ThreadIds, "thread_id"),
        (DebugFlag::Sql, "sql"),
        (DebugFlag::Auth, "auth"),
    ];
    let mut tokens = Vec::new();
    for (flag, name) in NAMES {
        if bits & flag.bits() != 0 {
            tokens.push(name);
        }
    }
    tokens.join(",")
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true);
    if cfg!(debug_assertions) {
        options.truncate(true);
    } else {
        options.append(true);
    }
    options.open(path)
}

#[cfg(unix)]
fn open_syslog(process: &str, facility: syslog::Facility) -> Option<SyslogWriter> {
    let formatter = syslog::Formatter3164 {
        facility,
        hostname: None,
        process: process.to_string(),
        pid: std::process::id(),
    };
    syslog::unix(formatter).ok()
}

/// Small per-thread tag for the `[tid]` line prefix. Thread ids are not
/// numerically exposed by std, so threads draw from a process-local counter
/// on first log.
fn current_thread_tag() -> u64 {
    static NEXT_TAG: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TAG: u64 = NEXT_TAG.fetch_add(1, Ordering::Relaxed);
    }
    TAG.with(|tag| *tag)
}

#[cfg(unix)]
fn print_console(level: Level, line: &str) {
    if level == Level::Error {
        // timestamp stays plain, the body turns red
        let split = color_split(line);
        println!("{}\x1b[1;31m{}\x1b[0;0m", &line[..split], &line[split..]);
    } else {
        println!("{line}");
    }
}

#[cfg(not(unix))]
fn print_console(_level: Level, line: &str) {
    println!("{line}");
}

/// Byte 25 is the first byte after `YYYY-mm-dd HH:MM:SS.mmm` plus two
/// spaces; fall back to the whole line when the prefix is absent.
#[cfg(unix)]
fn color_split(line: &str) -> usize {
    let split = 25;
    if line.len() >= split && line.is_char_boundary(split) {
        split
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn quiet(logger: &Logger) -> &Logger {
        // tests do not want console noise
        logger.set_daemonized(true);
        logger
    }

    #[test]
    fn log_flag_parse_round_trips() {
        let logger = Logger::new();
        for bits in 1..=LOG_ALL {
            logger.set_log_flags_str(&log_flags_to_string(bits));
            assert_eq!(logger.log_flags(), bits, "mask {bits:#x}");
        }
    }

    #[test]
    fn debug_flag_parse_round_trips() {
        let logger = Logger::new();
        quiet(&logger);
        for bits in [
            DebugFlag::Hardware.bits(),
            DebugFlag::Webserver.bits() | DebugFlag::Sql.bits(),
            DEBUG_ALL,
        ] {
            logger.set_debug_flags_str(&debug_flags_to_string(bits));
            assert_eq!(logger.debug_flags(), bits, "mask {bits:#x}");
        }
    }

    #[test]
    fn numeric_token_short_circuits() {
        let logger = Logger::new();
        logger.set_log_flags_str("5,error");
        assert_eq!(logger.log_flags(), 5);
    }

    #[test]
    fn unknown_tokens_are_skipped() {
        let logger = Logger::new();
        logger.set_log_flags_str("bogus,error,alsobogus");
        assert_eq!(logger.log_flags(), Level::Error.bits());
    }

    #[test]
    fn empty_flags_default_to_status_and_error() {
        let logger = Logger::new();
        logger.set_log_flags_str("nothing,known");
        assert_eq!(
            logger.log_flags(),
            Level::Status.bits() | Level::Error.bits()
        );
    }

    #[test]
    fn debug_flags_enable_debug_level() {
        let logger = Logger::new();
        quiet(&logger);
        logger.set_log_flags(Level::Status.bits());
        logger.set_debug_flags_str("hardware");
        assert!(logger.is_level_enabled(Level::Debug));
        // the announcement landed in the status ring
        let lines = logger.get_log(Some(Level::Status), 0);
        assert!(lines.iter().any(|l| l.message.contains("Enabling Debug logging!")));
    }

    #[test]
    fn webserver_debug_enables_access_log() {
        let logger = Logger::new();
        quiet(&logger);
        assert!(!logger.is_aclf_enabled());
        logger.set_debug_flags_str("webserver");
        assert!(logger.is_aclf_enabled());
    }

    #[test]
    fn ring_buffer_caps_at_one_hundred() {
        let logger = Logger::new();
        quiet(&logger);
        logger.set_log_flags(LOG_ALL);
        for i in 0..150 {
            logger.log(Level::Normal, format!("line {i}"));
        }
        let lines = logger.get_log(Some(Level::Normal), 0);
        assert_eq!(lines.len(), 100);
        assert!(lines[0].message.contains("line 50"));
        assert!(lines[99].message.contains("line 149"));
    }

    #[test]
    fn get_log_filters_and_sorts() {
        let logger = Logger::new();
        quiet(&logger);
        logger.set_log_flags(LOG_ALL);
        logger.log(Level::Normal, "one");
        logger.log(Level::Error, "two");
        logger.log(Level::Status, "three");
        let all = logger.get_log(None, 0);
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].logtime <= w[1].logtime));
        // everything was just logged; a future cutoff filters all of it
        let future = Local::now().timestamp() + 60;
        assert!(logger.get_log(None, future).is_empty());
    }

    #[test]
    fn level_prefix_and_timestamp_shape() {
        let logger = Logger::new();
        quiet(&logger);
        logger.log(Level::Status, "hello");
        let line = &logger.get_log(Some(Level::Status), 0)[0].message;
        // "YYYY-mm-dd HH:MM:SS.mmm  Status: hello"
        assert_eq!(&line[23..25], "  ");
        assert!(line[25..].starts_with("Status: hello"));
    }

    #[test]
    fn sequence_mode_emits_one_line() {
        let logger = Logger::new();
        quiet(&logger);
        logger.sequence_start();
        logger.sequence_add("first");
        logger.sequence_add_no_lf("sec");
        logger.sequence_add("ond");
        logger.sequence_end(Level::Status);
        let lines = logger.get_log(Some(Level::Status), 0);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].message.ends_with("first\nsecond"));
        // adds outside sequence mode are dropped
        logger.sequence_add("stray");
        logger.sequence_end(Level::Status);
        assert_eq!(logger.get_log(Some(Level::Status), 0).len(), 1);
    }

    #[test]
    fn notification_ring_drains_and_rate_limits() {
        let logger = Logger::new();
        quiet(&logger);
        let wakeups = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakeups);
        logger.set_notification_hook(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        logger.forward_errors_to_notification_system(true);

        logger.log(Level::Error, "boom");
        logger.log(Level::Error, "boom again");
        // only the transition into a non-empty ring wakes the worker
        assert_eq!(wakeups.load(Ordering::SeqCst), 1);

        let drained = logger.get_notification_logs();
        assert_eq!(drained.len(), 2);
        assert!(logger.get_notification_logs().is_empty());

        // drained moments ago: the five second limit suppresses the wakeup
        logger.log(Level::Error, "boom once more");
        assert_eq!(wakeups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disabling_forwarding_clears_the_ring() {
        let logger = Logger::new();
        quiet(&logger);
        logger.forward_errors_to_notification_system(true);
        logger.log(Level::Error, "kept?");
        logger.forward_errors_to_notification_system(false);
        assert!(logger.get_notification_logs().is_empty());
    }

    #[test]
    fn aclf_rotates_by_line_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let logger = Logger::new();
        quiet(&logger);
        logger.set_aclf_output(path.to_str().unwrap());
        logger.set_aclf_max_lines(5);

        for i in 1..=5 {
            logger.aclf(format!("line {i}"));
        }
        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents.lines().count(), 5);

        // line max+1 lands in a freshly (re)opened file
        logger.aclf("line 6");
        contents.clear();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents.trim_end(), "line 6");
    }

    #[test]
    fn aclf_disabled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.log");
        let logger = Logger::new();
        quiet(&logger);
        logger.aclf("dropped");
        assert!(!path.exists());
    }

    #[test]
    fn disabled_level_is_dropped() {
        let logger = Logger::new();
        quiet(&logger);
        logger.set_log_flags(Level::Error.bits());
        logger.log(Level::Normal, "invisible");
        assert!(logger.get_log(Some(Level::Normal), 0).is_empty());
    }
}
