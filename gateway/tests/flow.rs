//! End-to-end exercise of the connection, data, and storage managers wired
//! together the way the supervisor wires them, minus the log-writer child
//! process (the `Logger` here writes straight to a plain file so the test
//! doesn't need a FIFO or a second binary).

use std::io::Read;
use std::net::TcpStream;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gateway::connmgr;
use gateway::datamgr;
use gateway::logging::Logger;
use gateway::storagemgr;
use gateway_buffer::SharedBuffer;
use gateway_logchan::LogWriter;
use gateway_registry::SensorRegistry;
use gateway_store::{SqliteStore, Store, StoreError};
use gateway_wire::Record;

fn free_port() -> u16 {
    // Bind to an ephemeral port just to learn which one the OS hands out,
    // then release it immediately; connmgr::listen rebinds by number.
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().port()
}

#[test]
fn sensor_readings_flow_from_socket_to_log_and_store() {
    let tmp = tempfile::tempdir().unwrap();
    let log_path = tmp.path().join("gateway.log");
    let db_path = tmp.path().join("gateway.db");

    std::fs::File::create(&log_path).unwrap();
    let writer = LogWriter::open(&log_path, 256).unwrap();
    let logger = Logger::new(Arc::new(writer));

    let sb: Arc<SharedBuffer<Record>> = Arc::new(SharedBuffer::new(2));
    let dm_reader = sb.reader(0);
    let sm_reader = sb.reader(1);

    // Sensor 21 lives in room 7 with a 3-sample window; sensor 99 is
    // deliberately left out of the map so it exercises the unknown-sensor
    // path.
    let registry = SensorRegistry::load_from(3, [Ok((21u16, 7u16))]);

    let port = free_port();
    let shutdown = Arc::new(AtomicBool::new(false));

    let cm_sb = Arc::clone(&sb);
    let cm_log = logger.clone();
    let cm_shutdown = Arc::clone(&shutdown);
    let cm_handle = thread::spawn(move || {
        connmgr::listen(
            port,
            Duration::from_millis(150),
            &cm_sb,
            &cm_log,
            None,
            cm_shutdown,
        )
    });

    // Give the listener a moment to come up before connecting.
    thread::sleep(Duration::from_millis(30));

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    for value in [30.0, 31.0, 32.0] {
        Record {
            sensor_id: 21,
            value,
            ts: 1,
        }
        .write_to(&mut stream)
        .unwrap();
    }
    Record {
        sensor_id: 99,
        value: 10.0,
        ts: 1,
    }
    .write_to(&mut stream)
    .unwrap();
    drop(stream);

    let dm_sb = Arc::clone(&sb);
    let dm_log = logger.clone();
    let dm_handle = thread::spawn(move || {
        datamgr::run(&dm_sb, dm_reader, &registry, 10.0, 25.0, &dm_log);
        registry
    });

    let sm_sb = Arc::clone(&sb);
    let sm_log = logger.clone();
    let db_path_for_store = db_path.clone();
    let sm_handle = thread::spawn(move || {
        let store: Box<dyn Store> =
            Box::new(SqliteStore::connect(db_path_for_store.to_str().unwrap(), "sensor_data", false).unwrap());
        let db_path_for_reconnect = db_path_for_store.clone();
        let reconnect = move || -> Result<Box<dyn Store>, StoreError> {
            SqliteStore::connect(db_path_for_reconnect.to_str().unwrap(), "sensor_data", false)
                .map(|s| Box::new(s) as Box<dyn Store>)
        };
        storagemgr::run(
            &sm_sb,
            sm_reader,
            store,
            reconnect,
            3,
            Duration::from_millis(10),
            &sm_log,
        )
    });

    cm_handle.join().unwrap().unwrap();
    let registry = dm_handle.join().unwrap();
    sm_handle.join().unwrap().unwrap();
    drop(logger);

    // Sensor 21's average crosses the configured hot threshold (25.0) on
    // its third sample: (30+31+32)/3 = 31.
    assert_eq!(registry.get_avg(21), 31.0);

    let mut log_contents = String::new();
    std::fs::File::open(&log_path)
        .unwrap()
        .read_to_string(&mut log_contents)
        .unwrap();
    assert!(log_contents.contains("PEER_OPEN"));
    assert!(log_contents.contains("THRESHOLD_HOT sensor_id=21"));
    assert!(log_contents.contains("UNKNOWN_SENSOR sensor_id=99"));

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM sensor_data", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 4);
}
