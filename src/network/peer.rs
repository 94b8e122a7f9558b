//! Peer connections
//!
//! One peer per connected socket. The reader side is a supervised thread
//! that exclusively owns the read half, pulls one frame at a time and
//! forwards each decoded message to the coordinator; the write half lives in
//! the [`PeerHandle`] the coordinator owns, so writes are serialized by the
//! coordinator's single thread.

use crate::error::{ChainError, Result};
use crate::network::logic::LogicEvent;
use crate::network::wire::{self, Message};
use log::debug;
use std::fmt;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::mpsc::Sender;

pub type PeerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// The coordinator-owned side of a peer connection.
pub struct PeerHandle {
    id: PeerId,
    addr: SocketAddr,
    direction: Direction,
    writer: TcpStream,
    ready: bool,
}

impl PeerHandle {
    pub fn new(id: PeerId, addr: SocketAddr, direction: Direction, writer: TcpStream) -> PeerHandle {
        PeerHandle {
            id,
            addr,
            direction,
            writer,
            ready: false,
        }
    }

    pub fn get_id(&self) -> PeerId {
        self.id
    }

    pub fn get_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn get_direction(&self) -> Direction {
        self.direction
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    /// Push one frame to the peer.
    pub fn send(&mut self, msg: &Message) -> Result<()> {
        wire::write_frame(&mut self.writer, msg)
            .map_err(|e| ChainError::Network(format!("send to peer {} failed: {e}", self.id)))
    }

    /// Close both socket halves. Unblocks the reader thread, which then
    /// reports the closure.
    pub fn close(&self) {
        let _ = self.writer.shutdown(Shutdown::Both);
    }
}

/// Read loop for one peer. Demand-driven: one frame is decoded and handed
/// to the coordinator before the next read starts. Exactly one
/// `ClientClosed` is reported, whether the socket closed or a frame failed
/// to decode.
pub fn run_reader(id: PeerId, stream: &mut TcpStream, events: &Sender<LogicEvent>) {
    loop {
        match wire::read_frame(stream) {
            Ok(msg) => {
                if events.send(LogicEvent::ClientData { peer: id, msg }).is_err() {
                    // Coordinator is gone; nothing left to report to.
                    break;
                }
            }
            Err(e) => {
                let reason = close_reason(&e);
                debug!("peer {id} reader stopping: {reason}");
                let _ = events.send(LogicEvent::ClientClosed { peer: id, reason });
                break;
            }
        }
    }
    let _ = stream.shutdown(Shutdown::Both);
}

fn close_reason(err: &ChainError) -> String {
    match err {
        ChainError::Io(desc) => format!("connection closed ({desc})"),
        other => format!("{other}"),
    }
}
