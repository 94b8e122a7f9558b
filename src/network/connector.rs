//! Outbound dialing
//!
//! A connector is one-shot: dial, hand the socket to the coordinator, done.
//! A refused dial is an ordinary outcome (the remote is simply not up) and
//! ends normally; any other failure is returned so the supervisor may retry
//! under its transient policy.

use crate::error::{ChainError, Result};
use crate::network::logic::LogicEvent;
use crate::network::peer::Direction;
use log::{error, info, warn};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc::Sender;
use std::time::Duration;

const DIAL_TIMEOUT_MS: u64 = 5_000;

/// Dial `addr` and hand the socket off to the coordinator.
pub fn dial(addr: SocketAddr, events: &Sender<LogicEvent>) -> Result<()> {
    match TcpStream::connect_timeout(&addr, Duration::from_millis(DIAL_TIMEOUT_MS)) {
        Ok(stream) => {
            info!("connected to {addr}");
            events
                .send(LogicEvent::ClientSocket {
                    stream,
                    direction: Direction::Outbound,
                })
                .map_err(|_| {
                    ChainError::Network(format!("coordinator gone while connecting {addr}"))
                })
        }
        Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
            warn!("connection to {addr} refused");
            Ok(())
        }
        Err(e) => {
            error!("failed to connect to {addr}: {e}");
            Err(ChainError::Network(format!(
                "Failed to connect to {addr}: {e}"
            )))
        }
    }
}
