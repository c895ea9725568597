//! The gateway's error/event taxonomy, represented as a typed enum so only
//! the log channel does string formatting. Every gateway thread constructs
//! one of these and hands it to [`crate::logging::Logger`]; nothing else
//! formats a payload line by hand.

use std::fmt;

/// Why a connection manager peer was closed.
#[derive(Debug, Clone, Copy)]
pub enum CloseReason {
    PeerClosed,
    DecodeError,
    IdleEviction,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "PEER_CLOSED"),
            Self::DecodeError => write!(f, "DECODE_ERROR"),
            Self::IdleEviction => write!(f, "IDLE_EVICTION"),
        }
    }
}

/// One reportable condition the gateway can log.
#[derive(Debug, Clone)]
pub enum Event {
    PeerOpen { peer: String },
    PeerClosed { peer: String, sensor_id: Option<u16>, reason: CloseReason },
    AcceptFailure { detail: String },
    UnknownSensor { sensor_id: u16 },
    ThresholdCold { sensor_id: u16, avg: f64 },
    ThresholdHot { sensor_id: u16, avg: f64 },
    StoreUnavailable { attempt: u32, detail: String },
    MapParse { detail: String },
    LogWrite { detail: String },
    Fatal { detail: String },
    DataManagerSummary { total_sensors: usize },
    StorageManagerSummary { rows_inserted: u64 },
}

impl Event {
    /// The payload string the log channel carries; the log-writer child
    /// prepends its own sequence number and timestamp to this.
    pub fn payload(&self) -> String {
        match self {
            Event::PeerOpen { peer } => format!("PEER_OPEN {peer}"),
            Event::PeerClosed {
                peer,
                sensor_id,
                reason,
            } => format!(
                "{reason} peer={peer} sensor_id={}",
                sensor_id.map(|s| s.to_string()).unwrap_or_else(|| "?".into())
            ),
            Event::AcceptFailure { detail } => format!("ACCEPT_FAILURE {detail}"),
            Event::UnknownSensor { sensor_id } => format!("UNKNOWN_SENSOR sensor_id={sensor_id}"),
            Event::ThresholdCold { sensor_id, avg } => {
                format!("THRESHOLD_COLD sensor_id={sensor_id} avg={avg:.2}")
            }
            Event::ThresholdHot { sensor_id, avg } => {
                format!("THRESHOLD_HOT sensor_id={sensor_id} avg={avg:.2}")
            }
            Event::StoreUnavailable { attempt, detail } => {
                format!("STORE_UNAVAILABLE attempt={attempt} {detail}")
            }
            Event::MapParse { detail } => format!("MAP_PARSE {detail}"),
            Event::LogWrite { detail } => format!("LOG_WRITE {detail}"),
            Event::Fatal { detail } => format!("FATAL {detail}"),
            Event::DataManagerSummary { total_sensors } => {
                format!("DATAMGR_DONE total_sensors={total_sensors}")
            }
            Event::StorageManagerSummary { rows_inserted } => {
                format!("STORAGEMGR_DONE rows_inserted={rows_inserted}")
            }
        }
    }
}
