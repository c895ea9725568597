//! Supervisor (SV): boots the log channel and its child process, wires the
//! shared buffer and the sensor registry, starts the connection, data, and
//! storage managers as worker threads, and joins them for an orderly
//! shutdown.
//!
//! This replaces the original's single-process `fork()`-based log-writer
//! spawn with `std::process::Command`: running un-exec'd Rust after a raw
//! `fork()` is unsound around libstd's allocator and thread state, so the
//! child is a real `exec`'d process from the start (see DESIGN.md).

use std::fs::File;
use std::io::BufReader;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{error, info};

use gateway_buffer::SharedBuffer;
use gateway_logchan::{ensure_fifo, LogWriter};
use gateway_registry::SensorRegistry;
use gateway_store::{SqliteStore, Store, StoreError};
use gateway_wire::Record;

use crate::config::Config;
use crate::logging::Logger;
use crate::sensormap::SensorMapIter;
use crate::{connmgr, datamgr, storagemgr};

/// Runs the gateway to completion. Returns `Ok(())` for a clean shutdown
/// (exit code 0) and `Err` for anything that should exit non-zero, including
/// a storage manager that exhausted its reconnect budget.
pub fn run(cfg: Config) -> Result<(), String> {
    ensure_fifo(&cfg.log_fifo).map_err(|e| format!("could not create log fifo: {e}"))?;

    let mut log_writerd = spawn_log_writer(&cfg)?;

    let writer = LogWriter::open(&cfg.log_fifo, cfg.max_log_bytes)
        .map_err(|e| format!("could not open log channel: {e}"))?;
    let log = Logger::new(Arc::new(writer));

    let outcome = run_inner(&cfg, &log);

    // The log-writer child exits on EOF once we drop our write end (which
    // happens when `log` and everything cloned from it goes out of scope);
    // dropping `log` explicitly here makes that happen before the join.
    drop(log);
    if let Err(e) = log_writerd.wait() {
        error!("log-writer child did not exit cleanly: {e}");
    }

    outcome
}

fn run_inner(cfg: &Config, log: &Logger) -> Result<(), String> {
    let map_file = File::open(&cfg.room_sensor_map)
        .map_err(|e| format!("could not open {}: {e}", cfg.room_sensor_map.display()))?;
    let pairs = SensorMapIter::new(BufReader::new(map_file));
    let registry = SensorRegistry::load_from(cfg.run_avg_window, pairs);
    info!(
        "loaded sensor registry: {} sensors",
        registry.get_total_sensors()
    );

    let sb: Arc<SharedBuffer<Record>> = Arc::new(SharedBuffer::new(2));
    let dm_reader = sb.reader(0);
    let sm_reader = sb.reader(1);

    // Boot connect goes through the same bounded retry-with-backoff path the
    // storage manager uses at runtime (spec §4.4 Startup: up to CONN_RETRIES
    // attempts, CONN_BACKOFF apart, each failure reported over LC), rather
    // than a single uninstrumented attempt.
    let mut startup_connect = {
        let db_path = cfg.db_path.clone();
        let table_name = cfg.table_name.clone();
        let fresh = cfg.fresh;
        move || -> Result<Box<dyn Store>, StoreError> {
            SqliteStore::connect(
                db_path.to_str().expect("db path must be valid UTF-8"),
                &table_name,
                fresh,
            )
            .map(|s| Box::new(s) as Box<dyn Store>)
        }
    };
    let initial_store = storagemgr::reconnect_with_retry(
        &mut startup_connect,
        cfg.conn_retries,
        cfg.conn_backoff,
        log,
    )
    .map_err(|_| "storage unreachable at startup".to_string())?;

    let shutdown = Arc::new(AtomicBool::new(false));

    let cm_handle = {
        let sb = Arc::clone(&sb);
        let log = log.clone();
        let port = cfg.port;
        let idle_timeout = cfg.idle_timeout;
        let recv_trace = cfg.recv_trace.clone();
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || {
            connmgr::listen(
                port,
                idle_timeout,
                &sb,
                &log,
                recv_trace.as_deref(),
                shutdown,
            )
        })
    };

    let dm_handle = {
        let sb = Arc::clone(&sb);
        let log = log.clone();
        let set_min_temp = cfg.set_min_temp;
        let set_max_temp = cfg.set_max_temp;
        thread::spawn(move || {
            datamgr::run(&sb, dm_reader, &registry, set_min_temp, set_max_temp, &log);
        })
    };

    let sm_handle = {
        let sb = Arc::clone(&sb);
        let log = log.clone();
        let conn_retries = cfg.conn_retries;
        let conn_backoff = cfg.conn_backoff;
        let db_path = cfg.db_path.clone();
        let table_name = cfg.table_name.clone();
        let shutdown = Arc::clone(&shutdown);
        thread::spawn(move || {
            let store: Box<dyn Store> = initial_store;
            let reconnect = move || -> Result<Box<dyn Store>, StoreError> {
                SqliteStore::connect(
                    db_path.to_str().expect("db path must be valid UTF-8"),
                    &table_name,
                    false,
                )
                .map(|s| Box::new(s) as Box<dyn Store>)
            };
            let result = storagemgr::run(
                &sb,
                sm_reader,
                store,
                reconnect,
                conn_retries,
                conn_backoff,
                &log,
            );
            if result.is_err() {
                shutdown.store(true, Ordering::Relaxed);
            }
            result
        })
    };

    // Join all three unconditionally before propagating any error: a panic
    // or fatal result in one worker must not skip waiting for the others,
    // or they would be left running (and the process could exit) mid-drain.
    let cm_result = cm_handle.join().map_err(|_| "connection manager panicked".to_string());
    let dm_result = dm_handle.join().map_err(|_| "data manager panicked".to_string());
    let sm_result = sm_handle.join().map_err(|_| "storage manager panicked".to_string());

    cm_result?.map_err(|e| format!("connection manager error: {e}"))?;
    dm_result?;
    sm_result?.map_err(|_| "storage manager exhausted its reconnect budget".to_string())?;

    Ok(())
}

fn spawn_log_writer(cfg: &Config) -> Result<Child, String> {
    let exe = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join("log-writerd")))
        .unwrap_or_else(|| "log-writerd".into());

    Command::new(exe)
        .arg("--fifo")
        .arg(&cfg.log_fifo)
        .arg("--log-file")
        .arg(&cfg.gateway_log)
        .arg("--max-log-bytes")
        .arg(cfg.max_log_bytes.to_string())
        .spawn()
        .map_err(|e| format!("could not spawn log-writerd: {e}"))
}

