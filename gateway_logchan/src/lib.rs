//! Log Channel (LC): delivers human-readable log entries from any gateway
//! thread to a dedicated log-writer child process over a named pipe.
//!
//! The gateway process only ever writes to the pipe; the `log-writerd`
//! binary (see `src/bin/log_writerd.rs`) is the sole reader and the sole
//! owner of the monotonic sequence number.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use log::warn;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;

/// Default cap on one LC message, matching `MAX_LOG_BYTES`.
pub const DEFAULT_MAX_LOG_BYTES: usize = 256;

/// Creates the named pipe at `path` if it does not already exist. Any error
/// other than "already exists" is returned to the caller.
pub fn ensure_fifo(path: &Path) -> io::Result<()> {
    match mkfifo(path, Mode::from_bits_truncate(0o666)) {
        Ok(()) => Ok(()),
        Err(nix::Error::EEXIST) => Ok(()),
        Err(e) => Err(io::Error::from(e)),
    }
}

/// The gateway-process side of the log channel: a single writing end of the
/// named pipe, serialized behind one process-wide mutex, truncating any
/// payload longer than `max_bytes` so that every write stays within one
/// pipe `write()` call and therefore within one reader-side message
/// boundary.
pub struct LogWriter {
    file: Mutex<File>,
    max_bytes: usize,
}

impl LogWriter {
    /// Opens `path` (which must already exist, e.g. via [`ensure_fifo`]) for
    /// writing. This blocks, per ordinary FIFO semantics, until the
    /// log-writer child has opened its reading end.
    pub fn open(path: &Path, max_bytes: usize) -> io::Result<Self> {
        let file = OpenOptions::new().write(true).open(path)?;
        Ok(LogWriter {
            file: Mutex::new(file),
            max_bytes,
        })
    }

    /// Writes one message. A failure here is logged to stderr by the caller
    /// and the event is dropped; it never terminates the gateway, so this
    /// returns a plain `io::Result` rather than a fatal error type.
    pub fn write_event(&self, payload: &str) -> io::Result<()> {
        let bytes = truncate_to(payload, self.max_bytes);
        let mut file = self.file.lock().unwrap();
        file.write_all(bytes)
    }
}

fn truncate_to(payload: &str, max_bytes: usize) -> &[u8] {
    let bytes = payload.as_bytes();
    if bytes.len() <= max_bytes {
        return bytes;
    }
    // Truncate on a char boundary so we never emit invalid UTF-8.
    let mut end = max_bytes;
    while end > 0 && !payload.is_char_boundary(end) {
        end -= 1;
    }
    warn!("log payload truncated from {} to {end} bytes", bytes.len());
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_to_leaves_short_payloads_untouched() {
        assert_eq!(truncate_to("hello", 256), b"hello");
    }

    #[test]
    fn truncate_to_caps_long_payloads_on_a_char_boundary() {
        let long = "x".repeat(300);
        assert_eq!(truncate_to(&long, 256).len(), 256);
    }

    #[test]
    fn write_event_reports_a_gone_reader_instead_of_panicking() {
        // Simulates the log-writer child dying mid-run: its read end closes,
        // and the next write must surface as an ordinary io::Error rather
        // than taking the whole gateway process down with it.
        let (read_fd, write_fd) = nix::unistd::pipe().unwrap();
        drop(File::from(read_fd));
        let writer = LogWriter {
            file: Mutex::new(File::from(write_fd)),
            max_bytes: 256,
        };

        assert!(writer.write_event("FATAL log-writer gone").is_err());
    }
}
