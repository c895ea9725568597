//! Storage Manager (SM): drains its reader slot of the shared buffer and
//! persists each record, retrying a failed store with backoff before
//! giving up and asking the supervisor for a fatal shutdown.

use std::thread;
use std::time::Duration;

use gateway_buffer::{ReaderId, SharedBuffer};
use gateway_store::{Store, StoreError};
use gateway_wire::Record;

use crate::event::Event;
use crate::logging::Logger;

/// Persistence was lost and could not be recovered within the configured
/// retry budget; the supervisor should shut the gateway down.
#[derive(Debug)]
pub struct StorageFatal;

/// Runs until the shared buffer closes and this reader's backlog drains.
/// `store` is consumed; `reconnect` is called to obtain a fresh `Store` when
/// the current one fails, so SM never needs to know about connection
/// parameters directly.
pub fn run(
    sb: &SharedBuffer<Record>,
    reader: ReaderId,
    mut store: Box<dyn Store>,
    mut reconnect: impl FnMut() -> Result<Box<dyn Store>, StoreError>,
    conn_retries: u32,
    conn_backoff: Duration,
    log: &Logger,
) -> Result<(), StorageFatal> {
    let mut rows_inserted = 0u64;
    // Consecutive records that have failed to insert, reset on the first
    // success. A healthy reconnect that keeps failing to insert the same
    // record must still escalate eventually (spec §4.4 Runtime: "repeated
    // failure up to CONN_RETRIES consecutive records"), independent of
    // whether `reconnect` itself is succeeding.
    let mut consecutive_failures = 0u32;

    while let Some(record) = sb.remove(reader) {
        loop {
            match store.insert(&record) {
                Ok(()) => {
                    rows_inserted += 1;
                    consecutive_failures = 0;
                    break;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    log.log(Event::StoreUnavailable {
                        attempt: consecutive_failures,
                        detail: e.to_string(),
                    });
                    if consecutive_failures >= conn_retries {
                        log.log(Event::Fatal {
                            detail: format!(
                                "storage unreachable after {conn_retries} consecutive failing records"
                            ),
                        });
                        return Err(StorageFatal);
                    }
                    store = reconnect_with_retry(&mut reconnect, conn_retries, conn_backoff, log)?;
                }
            }
        }
    }

    let _ = store.disconnect();
    log.log(Event::StorageManagerSummary { rows_inserted });
    Ok(())
}

/// Attempts to (re)establish a store connection, retrying up to
/// `conn_retries` times with `conn_backoff` between attempts. Every failed
/// attempt is reported as [`Event::StoreUnavailable`]; exhausting the budget
/// is reported as [`Event::Fatal`] and surfaced to the caller.
pub fn reconnect_with_retry(
    reconnect: &mut impl FnMut() -> Result<Box<dyn Store>, StoreError>,
    conn_retries: u32,
    conn_backoff: Duration,
    log: &Logger,
) -> Result<Box<dyn Store>, StorageFatal> {
    for attempt in 1..=conn_retries {
        match reconnect() {
            Ok(store) => return Ok(store),
            Err(e) => {
                log.log(Event::StoreUnavailable {
                    attempt,
                    detail: e.to_string(),
                });
                if attempt < conn_retries {
                    thread::sleep(conn_backoff);
                }
            }
        }
    }

    log.log(Event::Fatal {
        detail: format!("storage unreachable after {conn_retries} attempts"),
    });
    Err(StorageFatal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_store::SqliteStore;

    #[test]
    fn reconnect_succeeds_on_a_later_attempt() {
        let log = crate::logging::tests_support::null_logger();
        let mut calls = 0u32;
        let mut reconnect = || {
            calls += 1;
            if calls < 2 {
                SqliteStore::connect("/nonexistent/dir/does-not-exist.db", "sensor_data", false)
                    .map(|s| Box::new(s) as Box<dyn Store>)
            } else {
                SqliteStore::connect(":memory:", "sensor_data", false)
                    .map(|s| Box::new(s) as Box<dyn Store>)
            }
        };

        let result = reconnect_with_retry(&mut reconnect, 3, Duration::from_millis(1), &log);
        assert!(result.is_ok());
        assert_eq!(calls, 2);
    }

    #[test]
    fn reconnect_gives_up_after_exhausting_the_budget() {
        let log = crate::logging::tests_support::null_logger();
        let mut reconnect = || {
            SqliteStore::connect("/nonexistent/dir/does-not-exist.db", "sensor_data", false)
                .map(|s| Box::new(s) as Box<dyn Store>)
        };

        let result = reconnect_with_retry(&mut reconnect, 2, Duration::from_millis(1), &log);
        assert!(result.is_err());
    }

    /// A store whose `insert` always fails, no matter how many times it is
    /// replaced by `reconnect`: a healthy connection that keeps rejecting the
    /// same record.
    struct AlwaysFailingStore;

    impl Store for AlwaysFailingStore {
        fn insert(&mut self, _record: &Record) -> Result<(), StoreError> {
            Err(StoreError::Insert(rusqlite::Error::QueryReturnedNoRows))
        }

        fn disconnect(self: Box<Self>) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn persistently_failing_inserts_escalate_even_though_reconnect_keeps_succeeding() {
        let log = crate::logging::tests_support::null_logger();
        let sb: SharedBuffer<Record> = SharedBuffer::new(1);
        let reader = sb.reader(0);
        sb.insert(Record {
            sensor_id: 21,
            value: 17.5,
            ts: 1,
        })
        .unwrap();
        sb.close();

        let store: Box<dyn Store> = Box::new(AlwaysFailingStore);
        let reconnect = || -> Result<Box<dyn Store>, StoreError> { Ok(Box::new(AlwaysFailingStore)) };

        let result = run(&sb, reader, store, reconnect, 3, Duration::from_millis(1), &log);
        assert!(matches!(result, Err(StorageFatal)));
    }
}
