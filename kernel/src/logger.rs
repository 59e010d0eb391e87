//! Kernel logger
//!
//! Routes `log` records to a host sink. Each record is formatted as
//! `[LEVEL] message` into a fixed stack buffer, so logging never allocates
//! and is usable inside the critical section.

use core::fmt::Write;
use log::{Level, LevelFilter, Metadata, Record};
use spin::Once;

/// Host output function (serial port, test capture, ...)
pub type LogSink = fn(&str);

const LINE_CAPACITY: usize = 256;

struct KernelLogger {
    sink: Once<LogSink>,
}

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(sink) = self.sink.get() else {
            return;
        };

        let level_str = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };

        let mut buf = [0u8; LINE_CAPACITY];
        let pos = {
            let mut writer = BufferWriter { buffer: &mut buf, pos: 0 };
            let _ = write!(&mut writer, "[{}] {}", level_str, record.args());
            writer.pos
        };
        sink(as_str(&buf[..pos]));
    }

    fn flush(&self) {}
}

/// Buffer writer for formatting without alloc; truncates when full
pub struct BufferWriter<'a> {
    pub buffer: &'a mut [u8],
    pub pos: usize,
}

impl<'a> Write for BufferWriter<'a> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.buffer.len() - self.pos;
        let to_write = bytes.len().min(remaining);

        if to_write > 0 {
            self.buffer[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
            self.pos += to_write;
        }

        Ok(())
    }
}

/// Longest valid UTF-8 prefix (truncation may split a character)
fn as_str(bytes: &[u8]) -> &str {
    match core::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => core::str::from_utf8(&bytes[..err.valid_up_to()]).unwrap_or_default(),
    }
}

/// Global logger instance
static LOGGER: KernelLogger = KernelLogger { sink: Once::new() };

/// Initialize the logger at `Info`
pub fn init(sink: LogSink) -> Result<(), log::SetLoggerError> {
    init_with_level(sink, LevelFilter::Info)
}

/// Initialize with specific log level
///
/// The first sink wins; a second call only changes the level and reports
/// the `log` crate's error.
pub fn init_with_level(sink: LogSink, level: LevelFilter) -> Result<(), log::SetLoggerError> {
    LOGGER.sink.call_once(|| sink);
    log::set_max_level(level);
    log::set_logger(&LOGGER)
}
