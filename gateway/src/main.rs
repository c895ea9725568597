//! Sensor gateway server: accepts sensor TCP connections, maintains a
//! running average per sensor, reports threshold crossings and protocol
//! errors to an operational log, and persists every reading to SQLite.

use clap::Parser;

use gateway::config::{Cli, Config};
use gateway::supervisor;

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let cfg = match Config::from_cli_and_env(cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    match supervisor::run(cfg) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("gateway exited with an error: {e}");
            std::process::exit(1);
        }
    }
}
