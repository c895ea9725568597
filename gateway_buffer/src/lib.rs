//! A bounded-lifetime FIFO with multi-reader fan-out: every record inserted
//! is delivered to every registered reader exactly once, and a record is
//! reclaimed only once every reader has observed it.
//!
//! This generalizes the original single-consumer buffer (see DESIGN.md) to
//! two independent reader slots (data manager, storage manager), each
//! getting its own FIFO view over the same underlying sequence of records.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex};

/// Errors surfaced by [`SharedBuffer`] operations.
#[derive(Debug, PartialEq, Eq)]
pub enum BufferError {
    /// `insert` was called after `close`.
    Closed,
}

impl std::error::Error for BufferError {}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "insert on a closed buffer"),
        }
    }
}

/// Identifies one reader slot. Slots are allocated in order starting at 0
/// when the buffer is created; this configuration uses two (data manager,
/// storage manager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderId(usize);

struct Entry<T> {
    data: T,
    /// One flag per reader slot; the entry is reclaimed once all are set.
    read_by: Vec<bool>,
}

struct Inner<T> {
    entries: VecDeque<Entry<T>>,
    /// Absolute index of `entries[0]`; lets each reader track its position
    /// without the queue needing to keep fully-read entries around.
    base_index: u64,
    /// Next absolute index each reader will read.
    cursors: Vec<u64>,
    closed: bool,
}

/// A FIFO of `T` with independent per-reader cursors.
///
/// `T` must be `Clone` because each reader slot observes its own copy of the
/// same logical record; [`gateway_wire::Record`] is `Copy`, so this is cheap
/// in practice.
pub struct SharedBuffer<T> {
    inner: Mutex<Inner<T>>,
    /// One condvar per reader slot; `insert` and `close` notify all of them,
    /// `remove` only ever waits on its own.
    not_empty: Vec<Condvar>,
}

impl<T: Clone> SharedBuffer<T> {
    /// Creates an empty buffer with `num_readers` independent reader slots.
    pub fn new(num_readers: usize) -> Self {
        assert!(num_readers > 0, "a buffer with no readers can never drain");
        SharedBuffer {
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                base_index: 0,
                cursors: vec![0; num_readers],
                closed: false,
            }),
            not_empty: (0..num_readers).map(|_| Condvar::new()).collect(),
        }
    }

    /// The reader slot identified by `index` (0-based, in allocation order).
    pub fn reader(&self, index: usize) -> ReaderId {
        assert!(index < self.not_empty.len(), "no such reader slot");
        ReaderId(index)
    }

    /// Appends `data`, visible to every reader slot. Never blocks on reader
    /// progress. Refused once [`SharedBuffer::close`] has been called.
    pub fn insert(&self, data: T) -> Result<(), BufferError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(BufferError::Closed);
        }
        let num_readers = inner.cursors.len();
        inner.entries.push_back(Entry {
            data,
            read_by: vec![false; num_readers],
        });
        drop(inner);
        for cv in &self.not_empty {
            cv.notify_all();
        }
        Ok(())
    }

    /// Returns the next unread record for `reader`, blocking until one is
    /// available or the buffer closes. `Ok(None)` is the END sentinel: the
    /// buffer is closed and no unread record remains for this reader.
    pub fn remove(&self, reader: ReaderId) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            let cursor = inner.cursors[reader.0];
            let offset = (cursor - inner.base_index) as usize;
            if offset < inner.entries.len() {
                let data = inner.entries[offset].data.clone();
                inner.entries[offset].read_by[reader.0] = true;
                inner.cursors[reader.0] += 1;
                reclaim_front(&mut inner);
                return Some(data);
            }
            if inner.closed {
                return None;
            }
            inner = self.not_empty[reader.0].wait(inner).unwrap();
        }
    }

    /// Marks the buffer terminal. Wakes every blocked `remove`. An `insert`
    /// racing with `close` is refused, never silently dropped or accepted
    /// after the barrier.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        drop(inner);
        for cv in &self.not_empty {
            cv.notify_all();
        }
    }

    /// Reclaims internal state. A no-op beyond what `Drop` already does;
    /// kept for interface symmetry with the buffer this type replaces.
    /// Calling it while a reader is still blocked in `remove` is undefined
    /// behavior in the original and is simply unreachable here: `remove`
    /// borrows `self` for its whole blocking wait, so the borrow checker
    /// rules the unsafe case out at compile time.
    pub fn free(self) {
        drop(self)
    }

    /// Number of records currently buffered (not yet read by every slot).
    /// Exposed for tests and diagnostics, not part of the reader contract.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn reclaim_front<T>(inner: &mut Inner<T>) {
    while let Some(front) = inner.entries.front() {
        if front.read_by.iter().all(|&r| r) {
            inner.entries.pop_front();
            inner.base_index += 1;
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fan_out_delivers_every_record_to_every_reader() {
        let buf: Arc<SharedBuffer<u32>> = Arc::new(SharedBuffer::new(2));
        let dm = buf.reader(0);
        let sm = buf.reader(1);

        for v in 0..5 {
            buf.insert(v).unwrap();
        }
        buf.close();

        let mut dm_seen = Vec::new();
        while let Some(v) = buf.remove(dm) {
            dm_seen.push(v);
        }
        let mut sm_seen = Vec::new();
        while let Some(v) = buf.remove(sm) {
            sm_seen.push(v);
        }

        assert_eq!(dm_seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(sm_seen, vec![0, 1, 2, 3, 4]);
        assert!(buf.is_empty());
    }

    #[test]
    fn insert_after_close_is_refused() {
        let buf: SharedBuffer<u32> = SharedBuffer::new(1);
        buf.close();
        assert_eq!(buf.insert(1), Err(BufferError::Closed));
    }

    #[test]
    fn remove_blocks_until_insert_then_observes_it() {
        let buf = Arc::new(SharedBuffer::new(1));
        let reader = buf.reader(0);

        let buf2 = Arc::clone(&buf);
        let handle = thread::spawn(move || buf2.remove(reader));

        thread::sleep(std::time::Duration::from_millis(20));
        buf.insert(42u32).unwrap();

        assert_eq!(handle.join().unwrap(), Some(42));
    }

    #[test]
    fn remove_returns_none_after_close_drains_remaining() {
        let buf = Arc::new(SharedBuffer::new(1));
        let reader = buf.reader(0);

        let buf2 = Arc::clone(&buf);
        let handle = thread::spawn(move || buf2.remove(reader));

        thread::sleep(std::time::Duration::from_millis(20));
        buf.close();

        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn slow_reader_does_not_lose_records_to_a_fast_one() {
        let buf = Arc::new(SharedBuffer::new(2));
        let fast = buf.reader(0);
        let slow = buf.reader(1);

        buf.insert(1u32).unwrap();
        buf.insert(2u32).unwrap();

        assert_eq!(buf.remove(fast), Some(1));
        assert_eq!(buf.remove(fast), Some(2));
        // Neither entry is reclaimed yet: `slow` has not read them.
        assert_eq!(buf.len(), 2);

        assert_eq!(buf.remove(slow), Some(1));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.remove(slow), Some(2));
        assert_eq!(buf.len(), 0);
    }
}
