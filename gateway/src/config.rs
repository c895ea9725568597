//! Environment / compile-time configuration, plus the CLI surface that lets
//! the hardcoded filenames be overridden rather than baked in.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// `gateway <port>`: the positional port argument plus override flags for
/// the filenames that are otherwise hardcoded defaults.
#[derive(Parser, Debug)]
#[command(about = "Sensor gateway server")]
pub struct Cli {
    /// TCP port to listen on for sensor node connections.
    pub port: u16,

    /// Sensor-to-room map file, lines of "sensor_id,room_id".
    #[arg(long, default_value = "room_sensor.map")]
    pub room_sensor_map: PathBuf,

    /// Where the connection manager appends its best-effort receive trace.
    #[arg(long, default_value = "sensor_data_recv.txt")]
    pub recv_trace: PathBuf,

    /// Disables the receive trace file entirely: it is a debugging aid,
    /// not an interface, so it may be disabled.
    #[arg(long)]
    pub no_trace: bool,

    /// Named pipe used for the log channel.
    #[arg(long, default_value = "logFifo")]
    pub log_fifo: PathBuf,

    /// File the log-writer child appends formatted entries to.
    #[arg(long, default_value = "gateway.log")]
    pub gateway_log: PathBuf,

    /// Path to the SQLite database file backing the storage manager.
    #[arg(long, default_value = "gateway.db")]
    pub db_path: PathBuf,

    /// Truncates the storage table at boot.
    #[arg(long)]
    pub fresh: bool,
}

/// The full set of tunables, resolved from environment variables (mandatory
/// ones fail startup if unset) plus the CLI.
pub struct Config {
    pub port: u16,

    pub idle_timeout: Duration,
    pub run_avg_window: usize,
    pub set_min_temp: f64,
    pub set_max_temp: f64,

    pub table_name: String,
    pub conn_retries: u32,
    pub conn_backoff: Duration,
    pub max_log_bytes: usize,

    pub room_sensor_map: PathBuf,
    pub recv_trace: Option<PathBuf>,
    pub log_fifo: PathBuf,
    pub gateway_log: PathBuf,
    pub db_path: PathBuf,
    pub fresh: bool,
}

#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Result<Self, ConfigError> {
        let idle_timeout = env_required_u64("IDLE_TIMEOUT")?;
        let set_min_temp = env_required_f64("SET_MIN_TEMP")?;
        let set_max_temp = env_required_f64("SET_MAX_TEMP")?;

        let run_avg_window = env_optional::<usize>("RUN_AVG_WINDOW")?
            .unwrap_or(gateway_registry::DEFAULT_RUN_AVG_WINDOW);
        if run_avg_window == 0 {
            return Err(ConfigError("RUN_AVG_WINDOW must be at least 1".to_string()));
        }
        let table_name =
            std::env::var("TABLE_NAME").unwrap_or_else(|_| "sensor_data".to_string());
        let conn_retries = env_optional::<u32>("CONN_RETRIES")?.unwrap_or(3);
        let conn_backoff_secs = env_optional::<u64>("CONN_BACKOFF")?.unwrap_or(1);
        let max_log_bytes = env_optional::<usize>("MAX_LOG_BYTES")?
            .unwrap_or(gateway_logchan::DEFAULT_MAX_LOG_BYTES);

        Ok(Config {
            port: cli.port,
            idle_timeout: Duration::from_secs(idle_timeout),
            run_avg_window,
            set_min_temp,
            set_max_temp,
            table_name,
            conn_retries,
            conn_backoff: Duration::from_secs(conn_backoff_secs),
            max_log_bytes,
            room_sensor_map: cli.room_sensor_map,
            recv_trace: if cli.no_trace { None } else { Some(cli.recv_trace) },
            log_fifo: cli.log_fifo,
            gateway_log: cli.gateway_log,
            db_path: cli.db_path,
            fresh: cli.fresh,
        })
    }
}

fn env_required_u64(name: &str) -> Result<u64, ConfigError> {
    std::env::var(name)
        .map_err(|_| ConfigError(format!("{name} is required")))?
        .parse()
        .map_err(|_| ConfigError(format!("{name} must be an integer")))
}

fn env_required_f64(name: &str) -> Result<f64, ConfigError> {
    std::env::var(name)
        .map_err(|_| ConfigError(format!("{name} is required")))?
        .parse()
        .map_err(|_| ConfigError(format!("{name} must be a number")))
}

fn env_optional<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(v) => v
            .parse()
            .map(Some)
            .map_err(|_| ConfigError(format!("{name} must be an integer"))),
        Err(_) => Ok(None),
    }
}
