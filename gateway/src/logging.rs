//! Thin wrapper around [`gateway_logchan::LogWriter`] that turns a
//! structured [`crate::event::Event`] into the one payload string the log
//! channel carries, and absorbs write failures: logged to stderr, dropped,
//! never fatal.

use std::sync::Arc;

use log::warn;

use gateway_logchan::LogWriter;

use crate::event::Event;

#[derive(Clone)]
pub struct Logger {
    writer: Arc<LogWriter>,
}

impl Logger {
    pub fn new(writer: Arc<LogWriter>) -> Self {
        Logger { writer }
    }

    pub fn log(&self, event: Event) {
        let payload = event.payload();
        if let Err(e) = self.writer.write_event(&payload) {
            warn!("LOG_WRITE failed for event {payload:?}: {e}");
        }
    }
}

/// A `Logger` that discards everything, for tests in sibling modules that
/// need one to satisfy a function signature but assert nothing about it.
#[cfg(test)]
pub mod tests_support {
    use super::Logger;
    use gateway_logchan::LogWriter;
    use std::path::Path;
    use std::sync::Arc;

    pub fn null_logger() -> Logger {
        let writer = LogWriter::open(Path::new("/dev/null"), 256).expect("/dev/null is writable");
        Logger::new(Arc::new(writer))
    }
}
