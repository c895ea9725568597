//! Fixed-layout measurement record used on the sensor-to-gateway wire.
//!
//! A record is a back-to-back triple `(sensor_id: u16, value: f64, ts: i64)`
//! with no length prefix and no framing. Readers must read exactly
//! [`RECORD_LEN`] bytes per record; there is no recovery from a short read
//! across a record boundary.

use std::fmt;
use std::io::{self, Read, Write};

/// Size in bytes of one encoded record: 2 (sensor_id) + 8 (value) + 8 (ts).
pub const RECORD_LEN: usize = 2 + 8 + 8;

/// A single measurement reported by a sensor node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    pub sensor_id: u16,
    pub value: f64,
    pub ts: i64,
}

/// Errors that can arise while decoding or encoding a [`Record`].
#[derive(Debug)]
pub enum Error {
    /// The stream ended (or otherwise failed) before a full record was read.
    Decode,

    /// An I/O failure occurred while reading or writing.
    Io(io::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode => write!(f, "short or malformed record"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl Record {
    /// Decodes a record from exactly [`RECORD_LEN`] bytes in the host's native
    /// endianness. This is the same layout used on the wire by the sensor
    /// nodes, so there is no byte-order conversion to perform here; that is
    /// also why this format is not portable across architectures with
    /// differing endianness.
    pub fn from_bytes(buf: &[u8; RECORD_LEN]) -> Record {
        let sensor_id = u16::from_ne_bytes(buf[0..2].try_into().unwrap());
        let value = f64::from_ne_bytes(buf[2..10].try_into().unwrap());
        let ts = i64::from_ne_bytes(buf[10..18].try_into().unwrap());
        Record {
            sensor_id,
            value,
            ts,
        }
    }

    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[0..2].copy_from_slice(&self.sensor_id.to_ne_bytes());
        buf[2..10].copy_from_slice(&self.value.to_ne_bytes());
        buf[10..18].copy_from_slice(&self.ts.to_ne_bytes());
        buf
    }

    /// Reads exactly one record from `stream`. A read that returns fewer than
    /// `RECORD_LEN` bytes (including a clean EOF at the record boundary) is
    /// reported as [`Error::Decode`]; a clean EOF before any bytes are read
    /// is distinguished so callers can tell a closed peer (no event other
    /// than PEER_GONE) from a genuinely truncated record.
    pub fn read_from<S: Read>(stream: &mut S) -> Result<Record, Error> {
        let mut buf = [0u8; RECORD_LEN];
        stream.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::Decode
            } else {
                Error::Io(e)
            }
        })?;
        Ok(Record::from_bytes(&buf))
    }

    /// Attempts to read exactly one record, returning `Ok(None)` if the peer
    /// closed the connection cleanly before any bytes of a new record
    /// arrived (PEER_GONE), and `Err` if bytes arrived but the record could
    /// not be completed (PROTOCOL_DECODE).
    pub fn try_read_from<S: Read>(stream: &mut S) -> Result<Option<Record>, Error> {
        let mut buf = [0u8; RECORD_LEN];
        let mut filled = 0;
        while filled < RECORD_LEN {
            match stream.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(Error::Decode),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(Some(Record::from_bytes(&buf)))
    }

    pub fn write_to<S: Write>(&self, stream: &mut S) -> Result<(), Error> {
        stream.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Renders the record the way the connection manager's receive trace
    /// file expects: `"<sensor_id> <value> <ts>\n"`.
    pub fn trace_line(&self) -> String {
        format!("{} {} {}\n", self.sensor_id, self.value, self.ts)
    }
}
