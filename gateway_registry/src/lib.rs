//! Sensor Map Registry (SMR): the authoritative, read-mostly table of
//! `sensor_id -> (room_id, running statistics)`.
//!
//! Entries are created once at startup from a finite stream of
//! `(sensor_id, room_id)` pairs and never added or removed afterward;
//! mutation (applying a new sample) is the only thing that changes after
//! load, funneled through a single mutex since only the data manager
//! writes to it.

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

use log::{debug, warn};

use gateway_wire::Record;

/// Default ring size (`RUN_AVG_WINDOW`) when the environment does not
/// override it.
pub const DEFAULT_RUN_AVG_WINDOW: usize = 5;

/// Sentinel room_id returned by [`SensorRegistry::get_room_id`] for an
/// unknown sensor.
pub const UNKNOWN_ROOM_ID: u16 = u16::MAX;

/// Per-sensor running statistics and identity.
#[derive(Debug, Clone)]
pub struct SensorEntry {
    sensor_id: u16,
    room_id: u16,
    /// Newest-first ring of the last `window` samples; always exactly
    /// `window` long. Unoccupied slots (before `samples_seen` reaches
    /// `window`) read as `0.0` and do not participate in `running_avg`.
    ring: Vec<f64>,
    samples_seen: usize,
    last_modified: i64,
}

impl SensorEntry {
    fn new(sensor_id: u16, room_id: u16, window: usize) -> Self {
        SensorEntry {
            sensor_id,
            room_id,
            ring: vec![0.0; window],
            samples_seen: 0,
            last_modified: 0,
        }
    }

    /// Shifts the ring right by one (dropping the oldest sample) and writes
    /// `value` at position 0. A zero-length ring (`window == 0`) keeps no
    /// history; `last_modified` still advances, but nothing is written.
    fn push_sample(&mut self, value: f64, ts: i64) {
        let n = self.ring.len();
        self.last_modified = ts;
        if n == 0 {
            return;
        }
        self.ring.copy_within(0..n - 1, 1);
        self.ring[0] = value;
        if self.samples_seen < n {
            self.samples_seen += 1;
        }
    }

    pub fn sensor_id(&self) -> u16 {
        self.sensor_id
    }

    pub fn room_id(&self) -> u16 {
        self.room_id
    }

    pub fn last_modified(&self) -> i64 {
        self.last_modified
    }

    /// The arithmetic mean of the ring, once it has received `window`
    /// samples. `None` before that point: "not yet valid" is represented as
    /// the absence of a value rather than overloading `0.0` as a sentinel a
    /// caller might mistake for a genuine cold reading.
    pub fn running_avg(&self) -> Option<f64> {
        if self.ring.is_empty() || self.samples_seen < self.ring.len() {
            None
        } else {
            Some(self.ring.iter().sum::<f64>() / self.ring.len() as f64)
        }
    }
}

/// Outcome of applying one record to the registry.
#[derive(Debug, Clone, Copy)]
pub enum ApplyOutcome {
    /// `record.sensor_id` is not present in the registry.
    UnknownSensor,
    /// The sample was merged; `running_avg` is `Some` once `window` samples
    /// have been seen for this sensor, `None` otherwise.
    Applied { running_avg: Option<f64> },
}

struct Inner {
    window: usize,
    sensors: HashMap<u16, SensorEntry>,
}

/// The Sensor Map Registry.
pub struct SensorRegistry {
    inner: Mutex<Inner>,
}

impl SensorRegistry {
    /// Builds a registry from a finite stream of `(sensor_id, room_id)`
    /// pairs, draining it to exhaustion. A sensor_id repeated later in the
    /// stream is ignored and logged.
    pub fn load_from<I>(window: usize, pairs: I) -> Self
    where
        I: IntoIterator<Item = io::Result<(u16, u16)>>,
    {
        let mut sensors = HashMap::new();
        let mut loaded = 0usize;

        for pair in pairs {
            match pair {
                Ok((sensor_id, room_id)) => {
                    if sensors.contains_key(&sensor_id) {
                        warn!("duplicate sensor_id {sensor_id} in room_sensor.map, ignoring");
                        continue;
                    }
                    sensors.insert(sensor_id, SensorEntry::new(sensor_id, room_id, window));
                    loaded += 1;
                }
                Err(e) => warn!("error reading sensor map entry: {e}"),
            }
        }

        debug!("sensor registry loaded with {loaded} entries, window={window}");

        SensorRegistry {
            inner: Mutex::new(Inner { window, sensors }),
        }
    }

    /// Merges `record` into the matching entry's ring. Returns
    /// [`ApplyOutcome::UnknownSensor`] without mutating anything if the
    /// record's sensor_id is not registered.
    pub fn apply(&self, record: &Record) -> ApplyOutcome {
        let mut inner = self.inner.lock().unwrap();
        match inner.sensors.get_mut(&record.sensor_id) {
            None => ApplyOutcome::UnknownSensor,
            Some(entry) => {
                entry.push_sample(record.value, record.ts);
                ApplyOutcome::Applied {
                    running_avg: entry.running_avg(),
                }
            }
        }
    }

    pub fn get_room_id(&self, sensor_id: u16) -> u16 {
        self.inner
            .lock()
            .unwrap()
            .sensors
            .get(&sensor_id)
            .map(|e| e.room_id)
            .unwrap_or(UNKNOWN_ROOM_ID)
    }

    /// `f64::NAN` for an unknown sensor; `0.0` for a known sensor that has
    /// not yet received `window` samples; the running mean otherwise.
    pub fn get_avg(&self, sensor_id: u16) -> f64 {
        self.inner
            .lock()
            .unwrap()
            .sensors
            .get(&sensor_id)
            .map(|e| e.running_avg().unwrap_or(0.0))
            .unwrap_or(f64::NAN)
    }

    pub fn get_last_modified(&self, sensor_id: u16) -> i64 {
        self.inner
            .lock()
            .unwrap()
            .sensors
            .get(&sensor_id)
            .map(|e| e.last_modified)
            .unwrap_or(0)
    }

    pub fn get_total_sensors(&self) -> usize {
        self.inner.lock().unwrap().sensors.len()
    }
}
