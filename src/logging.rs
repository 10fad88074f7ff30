//! Kernel logging facility
//!
//! Provides the `log` crate facade for the kernel. Records are formatted as
//! "[LEVEL] message" and written through whatever console sink the embedder
//! registers; until one is registered, records are dropped.

use core::fmt::{self, Write};
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// Minimal console output contract; the actual driver lives outside this
/// crate.
pub trait Console: Send {
    fn write_str(&mut self, s: &str);
}

/// Global logger instance available throughout the kernel
pub static LOGGER: Logger = Logger::new();

pub struct Logger {
    sink: Mutex<Option<&'static mut dyn Console>>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    pub const fn new() -> Logger {
        Logger {
            sink: Mutex::new(None),
        }
    }
}

struct SinkWriter<'a>(&'a mut dyn Console);

impl fmt::Write for SinkWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut sink = self.sink.lock();
        if let Some(console) = sink.as_deref_mut() {
            let _ = writeln!(
                SinkWriter(console),
                "[{}] {}",
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

/// Registers the console sink and installs the logger.
///
/// Debug builds log at `Debug`, release builds at `Info`.
pub fn init(console: &'static mut dyn Console) {
    *LOGGER.sink.lock() = Some(console);
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(level))
        .expect("logger initialization failed");
}
