//! Boot Log Ring Buffer
//!
//! Circular buffer backend for the `log` facade. Captures driver and
//! variable-store messages before any console exists, so the boot UI or a
//! serial dump can replay them later.
//!
//! # Design
//!
//! - Fixed-size, no_std compatible (no heap allocation for buffer)
//! - Overwrites oldest entries when full
//! - Stage tracking derived from the record target
//! - Instance based: declare one `static` logger and [`install`] it
//!
//! ```ignore
//! static LOGGER: RingLogger = RingLogger::new(log::LevelFilter::Debug);
//!
//! octeon_bootlog::install(&LOGGER)?;
//! log::info!("nix: link up");
//!
//! while let Some(entry) = LOGGER.pop() {
//!     let mut line = [0u8; 128];
//!     let n = entry.format(&mut line);
//!     serial_write(&line[..n]);
//! }
//! ```

#![no_std]

use core::fmt::{self, Write};

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

/// Maximum message length in bytes
pub const LOG_MSG_LEN: usize = 96;

/// Number of entries in the ring buffer (power of 2 for efficient modulo)
pub const LOG_RING_SIZE: usize = 32;

/// Subsystem a log entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    /// DMA arena
    Dma = 0,
    /// NIX/NPA packet engine
    Nix = 1,
    /// Variable store
    Var = 2,
    /// Authenticated variable checks
    Auth = 3,
    /// Anything else
    General = 4,
}

impl Stage {
    /// Get human-readable stage name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Dma => "DMA",
            Self::Nix => "NIX",
            Self::Var => "VAR",
            Self::Auth => "AUTH",
            Self::General => "GEN",
        }
    }

    /// Map a `log` target (module path) to a stage
    pub fn from_target(target: &str) -> Self {
        if target.starts_with("dma_pool") {
            Self::Dma
        } else if target.starts_with("octeon_nix") {
            Self::Nix
        } else if target.starts_with("octeon_efivar::auth") {
            Self::Auth
        } else if target.starts_with("octeon_efivar") {
            Self::Var
        } else {
            Self::General
        }
    }
}

/// Single log entry in the ring buffer
#[derive(Clone)]
pub struct LogEntry {
    /// Message content
    pub msg: [u8; LOG_MSG_LEN],
    /// Actual message length
    pub len: u8,
    /// Subsystem that produced the entry
    pub stage: Stage,
    /// Severity
    pub level: Level,
}

impl LogEntry {
    const fn empty() -> Self {
        Self {
            msg: [0u8; LOG_MSG_LEN],
            len: 0,
            stage: Stage::General,
            level: Level::Trace,
        }
    }

    /// Get message as string slice
    pub fn message(&self) -> &str {
        let len = (self.len as usize).min(LOG_MSG_LEN);
        match core::str::from_utf8(&self.msg[..len]) {
            Ok(s) => s,
            // Truncation may split a multi-byte character.
            Err(e) => core::str::from_utf8(&self.msg[..e.valid_up_to()]).unwrap_or(""),
        }
    }

    /// True for warnings and errors
    pub fn is_error(&self) -> bool {
        self.level <= Level::Warn
    }

    /// Format entry for display: "[LEVEL STAGE] message"
    ///
    /// Returns the number of bytes written; output is truncated to `buf`.
    pub fn format(&self, buf: &mut [u8]) -> usize {
        let mut out = SliceWriter { buf, pos: 0 };
        let _ = write!(
            out,
            "[{} {}] {}",
            self.level.as_str(),
            self.stage.name(),
            self.message()
        );
        out.pos
    }
}

impl Default for LogEntry {
    fn default() -> Self {
        Self::empty()
    }
}

/// Truncating writer over a byte slice.
struct SliceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.buf.len() - self.pos;
        let n = s.len().min(room);
        self.buf[self.pos..self.pos + n].copy_from_slice(&s.as_bytes()[..n]);
        self.pos += n;
        Ok(())
    }
}

struct Ring {
    entries: [LogEntry; LOG_RING_SIZE],
    /// Next slot to write (monotonic)
    write: usize,
    /// Next slot to read (monotonic)
    read: usize,
    /// Entries overwritten before being read
    dropped: usize,
}

impl Ring {
    const fn new() -> Self {
        const EMPTY: LogEntry = LogEntry::empty();
        Self {
            entries: [EMPTY; LOG_RING_SIZE],
            write: 0,
            read: 0,
            dropped: 0,
        }
    }

    fn push(&mut self, entry: LogEntry) {
        if self.write - self.read == LOG_RING_SIZE {
            self.read += 1;
            self.dropped += 1;
        }
        self.entries[self.write % LOG_RING_SIZE] = entry;
        self.write += 1;
    }

    fn pop(&mut self) -> Option<LogEntry> {
        if self.read == self.write {
            return None;
        }
        let entry = self.entries[self.read % LOG_RING_SIZE].clone();
        self.read += 1;
        Some(entry)
    }
}

/// `log::Log` implementation writing into a fixed ring.
pub struct RingLogger {
    ring: Mutex<Ring>,
    level: LevelFilter,
}

impl RingLogger {
    /// Create a logger that keeps records at `level` and above.
    pub const fn new(level: LevelFilter) -> Self {
        Self {
            ring: Mutex::new(Ring::new()),
            level,
        }
    }

    /// Maximum level this logger records.
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Pop the oldest entry from the ring buffer
    ///
    /// Returns `None` if buffer is empty
    pub fn pop(&self) -> Option<LogEntry> {
        self.ring.lock().pop()
    }

    /// Drain all pending entries, oldest first
    pub fn drain<F: FnMut(&LogEntry)>(&self, mut f: F) -> usize {
        let mut count = 0;
        while let Some(entry) = self.pop() {
            f(&entry);
            count += 1;
        }
        count
    }

    /// Number of unread entries
    pub fn pending(&self) -> usize {
        let ring = self.ring.lock();
        ring.write - ring.read
    }

    /// Number of entries overwritten before they were read
    pub fn dropped(&self) -> usize {
        self.ring.lock().dropped
    }

    /// Check whether any unread entry is a warning or error
    pub fn has_errors(&self) -> bool {
        let ring = self.ring.lock();
        (ring.read..ring.write).any(|i| ring.entries[i % LOG_RING_SIZE].is_error())
    }

    /// Discard all entries
    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.read = ring.write;
    }
}

impl Log for RingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut entry = LogEntry::empty();
        entry.stage = Stage::from_target(record.target());
        entry.level = record.level();

        let mut out = SliceWriter {
            buf: &mut entry.msg,
            pos: 0,
        };
        let _ = write!(out, "{}", record.args());
        entry.len = out.pos as u8;

        self.ring.lock().push(entry);
    }

    fn flush(&self) {}
}

/// Install `logger` as the global `log` backend.
pub fn install(logger: &'static RingLogger) -> Result<(), SetLoggerError> {
    log::set_logger(logger)?;
    log::set_max_level(logger.level());
    Ok(())
}
