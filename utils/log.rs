//! Console logger for the PM firmware
//!
//! This module provides a `log` backend suitable for a no_std firmware
//! environment. Records are formatted as `[LEVEL] message` and handed to a
//! console sink supplied by the board code.

use core::fmt;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Console output function
pub type Sink = fn(&fmt::Arguments<'_>);

cfg_if::cfg_if! {
    if #[cfg(all(feature = "debug", feature = "verbose"))] {
        const MAX_LEVEL: LevelFilter = LevelFilter::Trace;
    } else if #[cfg(feature = "debug")] {
        const MAX_LEVEL: LevelFilter = LevelFilter::Debug;
    } else {
        const MAX_LEVEL: LevelFilter = LevelFilter::Info;
    }
}

/// Get the compile-time maximum log level
pub const fn level() -> LevelFilter {
    MAX_LEVEL
}

/// `log` backend writing to a console sink
pub struct PmuLogger {
    sink: Sink,
}

impl PmuLogger {
    /// Create a logger writing to `sink`
    pub const fn new(sink: Sink) -> Self {
        Self { sink }
    }
}

impl Log for PmuLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            (self.sink)(&format_args!("[{}] {}\n", record.level(), record.args()));
        }
    }

    fn flush(&self) {}
}

/// Install a logger as the global `log` backend
pub fn init(logger: &'static PmuLogger) -> Result<(), SetLoggerError> {
    log::set_logger(logger)?;
    log::set_max_level(level());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use std::sync::Mutex;

    static CAPTURED: Mutex<Vec<String>> = Mutex::new(Vec::new());

    fn capture(args: &fmt::Arguments<'_>) {
        CAPTURED.lock().unwrap().push(args.to_string());
    }

    #[test]
    fn test_level_filter() {
        let logger = PmuLogger::new(capture);
        assert!(logger.enabled(&Metadata::builder().level(Level::Error).build()));
        assert!(logger.enabled(&Metadata::builder().level(Level::Info).build()));
        assert_eq!(
            logger.enabled(&Metadata::builder().level(Level::Trace).build()),
            level() == LevelFilter::Trace
        );
    }

    #[test]
    fn test_record_format() {
        let logger = PmuLogger::new(capture);
        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .args(format_args!("PM: {} denied", "write"))
                .build(),
        );
        let captured = CAPTURED.lock().unwrap();
        assert!(captured.iter().any(|line| line == "[WARN] PM: write denied\n"));
    }
}
