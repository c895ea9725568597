//! Connection Manager (CM): accepts sensor TCP connections, multiplexes
//! them with a single readiness wait, decodes fixed-layout records, detects
//! idle peers, and publishes records into the shared buffer.
//!
//! The original's `select()`-based multiplexing mixed with per-peer polling
//! is collapsed here into one `poll()` call per iteration with a uniform
//! idle-sweep pass afterward (see DESIGN.md).

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::info;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use gateway_buffer::SharedBuffer;
use gateway_wire::{Record, RECORD_LEN};

use crate::event::{CloseReason, Event};
use crate::logging::Logger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Opening,
    Active,
    Closing,
}

struct Connection {
    stream: TcpStream,
    peer_addr: String,
    sensor_id: Option<u16>,
    last_activity: Instant,
    state: ConnState,
    /// Bytes of the in-progress record accumulated so far. Peer sockets are
    /// non-blocking, so one readiness notification may deliver only part of
    /// a record; the remainder is read on a later pass through the poll loop
    /// instead of blocking the whole event loop waiting for the rest.
    partial: Vec<u8>,
}

/// The longest a single `poll()` wait is allowed to run, independent of the
/// configured idle timeout, so a shutdown request is noticed promptly even
/// when `idle_timeout` is large.
const MAX_POLL_WAIT: Duration = Duration::from_secs(1);

/// Runs the connection manager until no peer (nor the listening socket
/// itself) has been active for `idle_timeout`, or `shutdown` is set by the
/// supervisor. Either way, closes `sb` on the way out: CM is the shared
/// buffer's sole producer, so it alone decides when no more records can
/// possibly arrive.
pub fn listen(
    port: u16,
    idle_timeout: Duration,
    sb: &SharedBuffer<Record>,
    log: &Logger,
    recv_trace: Option<&Path>,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))?;
    listener.set_nonblocking(true)?;

    let mut trace_file = recv_trace.map(File::create).transpose()?;

    let mut conns: HashMap<RawFd, Connection> = HashMap::new();
    let mut listener_last_activity = Instant::now();

    let wait = idle_timeout.min(MAX_POLL_WAIT);
    let timeout = PollTimeout::try_from(wait.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(PollTimeout::MAX);

    let result = (|| -> std::io::Result<()> {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("connection manager received shutdown request, terminating");
                return Ok(());
            }

            let order: Vec<RawFd> = conns.keys().copied().collect();
            let mut fds: Vec<PollFd> = Vec::with_capacity(order.len() + 1);
            fds.push(PollFd::new(listener.as_fd(), PollFlags::POLLIN));
            for fd in &order {
                fds.push(PollFd::new(conns[fd].stream.as_fd(), PollFlags::POLLIN));
            }

            let ready = poll(&mut fds, timeout)?;

            if ready == 0 {
                sweep_idle(&mut conns, idle_timeout, log);
                if conns.is_empty() && listener_last_activity.elapsed() >= idle_timeout {
                    info!("connection manager idle, terminating");
                    return Ok(());
                }
                continue;
            }

            if fds[0]
                .revents()
                .is_some_and(|r| r.contains(PollFlags::POLLIN))
            {
                accept_new_connection(&listener, &mut conns, log);
                listener_last_activity = Instant::now();
            }

            for (i, fd) in order.iter().enumerate() {
                let revents = fds[i + 1].revents();
                if revents.is_some_and(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP)) {
                    handle_peer_readable(*fd, &mut conns, sb, log, trace_file.as_mut());
                }
            }
        }
    })();

    sb.close();
    result
}

fn accept_new_connection(
    listener: &TcpListener,
    conns: &mut HashMap<RawFd, Connection>,
    log: &Logger,
) {
    match listener.accept() {
        Ok((stream, addr)) => {
            let _ = stream.set_nonblocking(true);
            let fd = stream.as_raw_fd();
            let peer_addr = addr.to_string();
            log.log(Event::PeerOpen {
                peer: peer_addr.clone(),
            });
            conns.insert(
                fd,
                Connection {
                    stream,
                    peer_addr,
                    sensor_id: None,
                    last_activity: Instant::now(),
                    state: ConnState::Opening,
                    partial: Vec::with_capacity(RECORD_LEN),
                },
            );
        }
        Err(e) => {
            log.log(Event::AcceptFailure {
                detail: e.to_string(),
            });
        }
    }
}

/// Drains whatever is currently available on `fd` without blocking, folding
/// bytes into the connection's in-progress record and publishing each record
/// completed along the way. Stops at the first `WouldBlock` (nothing more to
/// read right now) so that one peer can never stall the others sharing this
/// thread's single poll wait.
fn handle_peer_readable(
    fd: RawFd,
    conns: &mut HashMap<RawFd, Connection>,
    sb: &SharedBuffer<Record>,
    log: &Logger,
    mut trace_file: Option<&mut File>,
) {
    loop {
        let Some(conn) = conns.get_mut(&fd) else {
            return;
        };

        let have = conn.partial.len();
        let mut chunk = [0u8; RECORD_LEN];
        match conn.stream.read(&mut chunk[..RECORD_LEN - have]) {
            Ok(0) => {
                // A clean close with no partial record pending is an ordinary
                // peer disconnect; a close mid-record is a decode failure.
                let reason = if have == 0 {
                    CloseReason::PeerClosed
                } else {
                    CloseReason::DecodeError
                };
                close_connection(fd, conns, log, reason);
                return;
            }
            Ok(n) => {
                conn.partial.extend_from_slice(&chunk[..n]);
                if conn.partial.len() < RECORD_LEN {
                    continue;
                }

                let bytes: [u8; RECORD_LEN] = conn.partial[..].try_into().unwrap();
                let record = Record::from_bytes(&bytes);
                conn.partial.clear();
                conn.last_activity = Instant::now();
                conn.sensor_id = Some(record.sensor_id);
                conn.state = ConnState::Active;

                if let Some(file) = trace_file.as_deref_mut() {
                    let _ = file.write_all(record.trace_line().as_bytes());
                }

                if sb.insert(record).is_err() {
                    // SB closed underneath us: nothing more to publish.
                }
                // Keep draining: the peer may have pipelined more records
                // into the same readiness notification.
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => {
                close_connection(fd, conns, log, CloseReason::DecodeError);
                return;
            }
        }
    }
}

fn close_connection(
    fd: RawFd,
    conns: &mut HashMap<RawFd, Connection>,
    log: &Logger,
    reason: CloseReason,
) {
    if let Some(mut conn) = conns.remove(&fd) {
        conn.state = ConnState::Closing;
        log.log(Event::PeerClosed {
            peer: conn.peer_addr.clone(),
            sensor_id: conn.sensor_id,
            reason,
        });
    }
}

fn sweep_idle(conns: &mut HashMap<RawFd, Connection>, idle_timeout: Duration, log: &Logger) {
    let stale: Vec<RawFd> = conns
        .iter()
        .filter(|(_, c)| c.last_activity.elapsed() >= idle_timeout)
        .map(|(fd, _)| *fd)
        .collect();

    for fd in stale {
        close_connection(fd, conns, log, CloseReason::IdleEviction);
    }
}
