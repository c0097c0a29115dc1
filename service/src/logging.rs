//! The logging capability handed to the bridge at construction.
//!
//! Records are plain `log` records, so by default they end up wherever the process-wide logger
//! (e.g. `env_logger`) sends them. Tests hand in their own sink to inspect what was logged.

use log::{Level, Log, Metadata, Record};
use std::fmt;
use std::sync::Arc;

const TARGET: &str = "node_bridge";

/// Forwards to whatever logger is installed for the process at the time of the call.
struct ProcessLogger;

impl Log for ProcessLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        log::logger().log(record)
    }

    fn flush(&self) {
        log::logger().flush()
    }
}

#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn Log>,
}

impl Logger {
    pub fn new(sink: Arc<dyn Log>) -> Self {
        Self { sink }
    }

    /// The logger that writes through the `log` facade.
    pub fn process() -> Self {
        Self::new(Arc::new(ProcessLogger))
    }

    pub fn log(&self, level: Level, args: fmt::Arguments) {
        self.sink.log(
            &Record::builder()
                .args(args)
                .level(level)
                .target(TARGET)
                .module_path_static(Some(module_path!()))
                .build(),
        );
    }

    /// There is no level above `error` in `log`, failures that need an operator's attention use
    /// this one.
    pub fn error(&self, args: fmt::Arguments) {
        self.log(Level::Error, args)
    }

    pub fn warn(&self, args: fmt::Arguments) {
        self.log(Level::Warn, args)
    }

    pub fn info(&self, args: fmt::Arguments) {
        self.log(Level::Info, args)
    }

    pub fn debug(&self, args: fmt::Arguments) {
        self.log(Level::Debug, args)
    }

    pub fn trace(&self, args: fmt::Arguments) {
        self.log(Level::Trace, args)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::process()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Logger")
    }
}
