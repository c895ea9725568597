//! Data Manager (DM): drains its reader slot of the shared buffer, folds
//! each record into the sensor registry, and reports threshold crossings
//! and unknown-sensor records as they happen.

use gateway_buffer::{ReaderId, SharedBuffer};
use gateway_registry::{ApplyOutcome, SensorRegistry};
use gateway_wire::Record;

use crate::event::Event;
use crate::logging::Logger;

/// Runs until the shared buffer closes and this reader's backlog drains,
/// then emits one [`Event::DataManagerSummary`].
pub fn run(
    sb: &SharedBuffer<Record>,
    reader: ReaderId,
    registry: &SensorRegistry,
    set_min_temp: f64,
    set_max_temp: f64,
    log: &Logger,
) {
    while let Some(record) = sb.remove(reader) {
        match registry.apply(&record) {
            ApplyOutcome::UnknownSensor => {
                log.log(Event::UnknownSensor {
                    sensor_id: record.sensor_id,
                });
            }
            ApplyOutcome::Applied {
                running_avg: Some(avg),
            } => {
                if avg < set_min_temp {
                    log.log(Event::ThresholdCold {
                        sensor_id: record.sensor_id,
                        avg,
                    });
                } else if avg > set_max_temp {
                    log.log(Event::ThresholdHot {
                        sensor_id: record.sensor_id,
                        avg,
                    });
                }
            }
            ApplyOutcome::Applied { running_avg: None } => {}
        }
    }

    log.log(Event::DataManagerSummary {
        total_sensors: registry.get_total_sensors(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_crossings_are_reported_once_window_is_full() {
        let sb: SharedBuffer<Record> = SharedBuffer::new(1);
        let reader = sb.reader(0);
        let registry = SensorRegistry::load_from(5, [Ok((21u16, 7u16))]);
        let log = crate::logging::tests_support::null_logger();

        for v in [10.0, 10.0, 10.0, 10.0, 10.0] {
            sb.insert(Record {
                sensor_id: 21,
                value: v,
                ts: 0,
            })
            .unwrap();
        }
        sb.close();

        run(&sb, reader, &registry, 12.0, 25.0, &log);
        assert_eq!(registry.get_avg(21), 10.0);
    }
}
