//! Library half of the sensor gateway: everything the `gateway` binary
//! wires together, split out so integration tests can drive the connection,
//! data, and storage managers without going through the CLI front end.

pub mod config;
pub mod connmgr;
pub mod datamgr;
pub mod event;
pub mod logging;
pub mod sensormap;
pub mod storagemgr;
pub mod supervisor;
