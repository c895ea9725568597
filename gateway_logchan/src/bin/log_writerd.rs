//! The log-writer child: the sole reader of the log channel's named pipe
//! and the sole owner of the monotonic sequence number.
//!
//! Spawned by the gateway's supervisor as a genuine child process (see
//! `gateway::supervisor`); reads one message per `read()` off the pipe,
//! stamps it with a sequence number and a wall-clock timestamp, and appends
//! a line to the log file. Exits cleanly on EOF, which happens once the
//! gateway process closes its writing end.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::PathBuf;

use chrono::Local;
use clap::Parser;

#[derive(Parser)]
struct Cli {
    /// Path to the named pipe to read log messages from.
    #[arg(long)]
    fifo: PathBuf,

    /// Path to the log file to append formatted entries to.
    #[arg(long)]
    log_file: PathBuf,

    /// Maximum size of a single LC message.
    #[arg(long, default_value_t = gateway_logchan::DEFAULT_MAX_LOG_BYTES)]
    max_log_bytes: usize,
}

fn main() {
    let args = Cli::parse();

    let mut logfile = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.log_file)
        .unwrap_or_else(|e| {
            eprintln!("log-writerd: cannot open {}: {e}", args.log_file.display());
            std::process::exit(1);
        });

    let mut fifo = std::fs::File::open(&args.fifo).unwrap_or_else(|e| {
        eprintln!("log-writerd: cannot open {}: {e}", args.fifo.display());
        std::process::exit(1);
    });

    let mut buf = vec![0u8; args.max_log_bytes];
    let mut seq: u64 = 0;

    loop {
        let n = match fifo.read(&mut buf) {
            Ok(0) => break, // writer closed its end: EOF, exit cleanly.
            Ok(n) => n,
            Err(e) => {
                eprintln!("log-writerd: read error: {e}");
                break;
            }
        };

        let payload = String::from_utf8_lossy(&buf[..n]);
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        if writeln!(logfile, "{seq} {timestamp} {payload}").is_err() {
            eprintln!("log-writerd: failed to append to {}", args.log_file.display());
        }
        seq += 1;
    }
}
