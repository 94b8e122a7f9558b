//! TCP acceptor
//!
//! Binds the node address and accepts inbound sockets on its own thread.
//! Each accepted socket is handed off to the coordinator, which spawns the
//! inbound peer; the listener never touches a socket after the handoff.

use crate::error::{ChainError, Result};
use crate::network::logic::LogicEvent;
use crate::network::peer::Direction;
use log::{debug, error, info};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

pub struct Listener {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
}

impl Listener {
    /// Bind `addr` and start accepting. Bind errors surface to the caller;
    /// accept errors are logged and the loop continues.
    pub fn spawn(addr: SocketAddr, events: Sender<LogicEvent>) -> Result<Arc<Listener>> {
        let socket = TcpListener::bind(addr)
            .map_err(|e| ChainError::Network(format!("Failed to bind to {addr}: {e}")))?;
        let local_addr = socket.local_addr()?;
        info!("listening on {local_addr}");

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        thread::spawn(move || {
            let mut reason = "accept loop ended".to_string();
            for stream in socket.incoming() {
                if flag.load(Ordering::SeqCst) {
                    reason = "shutdown".to_string();
                    break;
                }
                match stream {
                    Ok(stream) => {
                        let handoff = events.send(LogicEvent::ClientSocket {
                            stream,
                            direction: Direction::Inbound,
                        });
                        if handoff.is_err() {
                            reason = "coordinator gone".to_string();
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error accepting connection: {e}");
                    }
                }
            }
            debug!("listener on {local_addr} terminating: {reason}");
            let _ = events.send(LogicEvent::ListenerTerminating { reason });
        });

        Ok(Arc::new(Listener {
            addr: local_addr,
            shutdown,
        }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Raise the shutdown flag and poke the socket so the blocking accept
    /// observes it.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect(self.addr);
    }
}
