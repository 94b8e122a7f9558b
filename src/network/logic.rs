//! Per-node coordinator
//!
//! One coordinator thread per node owns the chain and every peer handle.
//! All chain mutation funnels through its mailbox, so mutations are totally
//! ordered; messages from a single peer arrive in wire order, and nothing
//! here ever calls back into a peer synchronously.

use crate::core::Block;
use crate::error::{ChainError, Result};
use crate::network::node::NodeUri;
use crate::network::peer::{self, Direction, PeerHandle, PeerId};
use crate::network::supervisor::Supervisor;
use crate::network::wire::{BlockQuery, BlockResponse, Message, QueryError};
use crate::storage::BlockStore;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Bound on synchronous calls into the coordinator
const CALL_TIMEOUT_MS: u64 = 5_000;

/// Everything the coordinator reacts to.
pub enum LogicEvent {
    /// Socket ownership handoff from the listener or a connector
    ClientSocket {
        stream: TcpStream,
        direction: Direction,
    },
    /// A decoded frame from a peer's reader
    ClientData { peer: PeerId, msg: Message },
    /// The peer's socket closed or its stream failed to decode
    ClientClosed { peer: PeerId, reason: String },
    ListenerTerminating { reason: String },
    /// A locally mined block to adopt and gossip
    SubmitBlock {
        block: Block,
        reply: Sender<Result<Block>>,
    },
    /// Chain and peer-set snapshot for callers and tests
    Inspect { reply: Sender<ChainSnapshot> },
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct ChainSnapshot {
    /// Newest first; the tail is genesis
    pub chain: Vec<Block>,
    pub peer_count: usize,
}

/// Cloneable address of a coordinator.
#[derive(Clone)]
pub struct LogicHandle {
    tx: Sender<LogicEvent>,
}

impl LogicHandle {
    pub fn sender(&self) -> Sender<LogicEvent> {
        self.tx.clone()
    }

    /// Hand a locally mined block to the coordinator and wait for the
    /// verdict.
    pub fn submit_block(&self, block: Block) -> Result<Block> {
        let (reply, verdict) = mpsc::channel();
        self.tx
            .send(LogicEvent::SubmitBlock { block, reply })
            .map_err(|_| ChainError::Network("coordinator is gone".to_string()))?;
        verdict
            .recv_timeout(Duration::from_millis(CALL_TIMEOUT_MS))
            .map_err(|_| ChainError::Network("coordinator call timed out".to_string()))?
    }

    pub fn snapshot(&self) -> Result<ChainSnapshot> {
        let (reply, snapshot) = mpsc::channel();
        self.tx
            .send(LogicEvent::Inspect { reply })
            .map_err(|_| ChainError::Network("coordinator is gone".to_string()))?;
        snapshot
            .recv_timeout(Duration::from_millis(CALL_TIMEOUT_MS))
            .map_err(|_| ChainError::Network("coordinator call timed out".to_string()))
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(LogicEvent::Shutdown);
    }
}

pub struct Logic {
    uri: NodeUri,
    store: BlockStore,
    chain: Vec<Block>,
    peers: HashMap<PeerId, PeerHandle>,
    next_peer_id: PeerId,
    clients: Supervisor,
    events: Sender<LogicEvent>,
}

/// Spawn the coordinator thread for a node. The chain is rebuilt from the
/// store, so a durable node resumes where it left off.
pub fn spawn(
    uri: NodeUri,
    store: BlockStore,
    clients: Supervisor,
) -> Result<(LogicHandle, JoinHandle<()>)> {
    let genesis = Block::genesis();
    store.store(&genesis)?;
    let chain = load_chain(&store, &genesis)?;
    if chain.len() > 1 {
        info!(
            "{uri}: resuming chain at height {}",
            chain[0].get_height()
        );
    }

    let (tx, rx) = mpsc::channel();
    let mut logic = Logic {
        uri,
        store,
        chain,
        peers: HashMap::new(),
        next_peer_id: 1,
        clients,
        events: tx.clone(),
    };
    let worker = thread::spawn(move || logic.run(rx));
    Ok((LogicHandle { tx }, worker))
}

/// Rebuild the in-memory chain from stored blocks: take the highest block
/// whose lineage walks back to genesis. Orphans and dangling forks are left
/// in the store.
pub fn load_chain(store: &BlockStore, genesis: &Block) -> Result<Vec<Block>> {
    let mut candidates = store.all_blocks()?;
    candidates.sort_by_key(|b| std::cmp::Reverse(b.get_height()));

    for candidate in candidates {
        if candidate.get_hash() == genesis.get_hash() {
            break;
        }
        match candidate.ancestry(store, None) {
            Ok(ancestors) if ancestors.first().map(Block::get_hash) == Some(genesis.get_hash()) => {
                let mut chain = vec![candidate];
                chain.extend(ancestors.into_iter().rev());
                return Ok(chain);
            }
            Ok(_) => continue,
            Err(ChainError::NotFound) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(vec![genesis.clone()])
}

impl Logic {
    fn run(&mut self, rx: Receiver<LogicEvent>) {
        info!("{}: coordinator running", self.uri);
        while let Ok(event) = rx.recv() {
            match event {
                LogicEvent::ClientSocket { stream, direction } => {
                    self.on_client_socket(stream, direction)
                }
                LogicEvent::ClientData { peer, msg } => self.on_client_data(peer, msg),
                LogicEvent::ClientClosed { peer, reason } => self.on_client_closed(peer, &reason),
                LogicEvent::ListenerTerminating { reason } => {
                    warn!("{}: listener terminating: {reason}", self.uri)
                }
                LogicEvent::SubmitBlock { block, reply } => {
                    let _ = reply.send(self.on_submit_block(block));
                }
                LogicEvent::Inspect { reply } => {
                    let _ = reply.send(ChainSnapshot {
                        chain: self.chain.clone(),
                        peer_count: self.peers.len(),
                    });
                }
                LogicEvent::Shutdown => break,
            }
        }
        for peer in self.peers.values() {
            peer.close();
        }
        self.peers.clear();
        self.clients.shutdown();
        info!("{}: coordinator stopped", self.uri);
    }

    fn head(&self) -> &Block {
        &self.chain[0]
    }

    fn on_client_socket(&mut self, stream: TcpStream, direction: Direction) {
        let addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("{}: dropping socket without peer address: {e}", self.uri);
                return;
            }
        };
        let mut reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(e) => {
                error!("{}: failed to split socket for {addr}: {e}", self.uri);
                return;
            }
        };

        let id = self.next_peer_id;
        self.next_peer_id += 1;

        let events = self.events.clone();
        self.clients.add_child(
            &format!("peer-{id}"),
            Box::new(move || {
                peer::run_reader(id, &mut reader, &events);
                Ok(())
            }),
        );

        let mut handle = PeerHandle::new(id, addr, direction, stream);
        info!("{}: peer {id} connected ({direction}, {addr})", self.uri);
        handle.mark_ready();
        self.on_client_ready(&mut handle);
        self.peers.insert(id, handle);
    }

    /// A fresh peer is probed for liveness (outbound only, the side that
    /// initiated) and asked for its highest block to begin chain sync.
    fn on_client_ready(&self, peer: &mut PeerHandle) {
        if peer.get_direction() == Direction::Outbound {
            if let Err(e) = peer.send(&Message::Ping(1)) {
                warn!("{}: {e}", self.uri);
                return;
            }
        }
        if let Err(e) = peer.send(&Message::BlockQuery(BlockQuery::Highest)) {
            warn!("{}: {e}", self.uri);
        }
    }

    fn on_client_data(&mut self, from: PeerId, msg: Message) {
        match msg {
            Message::Ping(n) => self.reply(from, &Message::Pong(n)),
            Message::Pong(n) => debug!("{}: pong {n} from peer {from}", self.uri),
            Message::BlockQuery(query) => {
                let response = self.process_block_query(&query);
                self.reply(from, &Message::BlockResponse(response));
            }
            Message::BlockResponse(BlockResponse::Block(block)) | Message::Announce(block) => {
                self.on_block_received(from, block)
            }
            Message::BlockResponse(BlockResponse::Chain(blocks)) => {
                self.on_chain_received(from, blocks)
            }
            Message::BlockResponse(BlockResponse::Failed(e)) => {
                warn!("{}: peer {from} failed a query: {e}", self.uri)
            }
        }
    }

    fn on_client_closed(&mut self, peer: PeerId, reason: &str) {
        if self.peers.remove(&peer).is_some() {
            info!("{}: peer {peer} disconnected: {reason}", self.uri);
        }
    }

    /// Answer a block query. Ancestry answers include the queried block
    /// itself, oldest first, so the response is a complete usable chain.
    fn process_block_query(&self, query: &BlockQuery) -> BlockResponse {
        match query {
            BlockQuery::Genesis => BlockResponse::Block(Block::genesis()),
            BlockQuery::Highest => BlockResponse::Block(self.head().clone()),
            BlockQuery::Ancestry(hash) => match self.store.find_by_hash(hash) {
                Ok(target) => match target.ancestry(&self.store, None) {
                    Ok(mut line) => {
                        line.push(target);
                        BlockResponse::Chain(line)
                    }
                    Err(e) => {
                        warn!("{}: ancestry walk from {hash} failed: {e}", self.uri);
                        BlockResponse::Failed(QueryError::UnknownBlockHash)
                    }
                },
                Err(ChainError::NotFound) => BlockResponse::Failed(QueryError::UnknownBlockHash),
                Err(e) => {
                    warn!("{}: lookup of {hash} failed: {e}", self.uri);
                    BlockResponse::Failed(QueryError::UnknownBlockHash)
                }
            },
        }
    }

    /// Adopt `block` as the new head iff it is mined and extends the head
    /// by exactly one height.
    fn try_extend(&mut self, block: &Block) -> Result<()> {
        block.ensure_final()?;
        block.ensure_known_parent(&self.store)?;
        let head = self.head();
        if block.get_parent_hash() != head.get_hash()
            || block.get_height() != head.get_height() + 1
        {
            return Err(ChainError::StaleBlock);
        }
        self.store.store(block)?;
        self.chain.insert(0, block.clone());
        Ok(())
    }

    fn on_block_received(&mut self, from: PeerId, block: Block) {
        if self.chain.iter().any(|b| b.get_hash() == block.get_hash()) {
            debug!(
                "{}: block {} already chained",
                self.uri,
                block.get_hash().readable_short()
            );
            return;
        }
        if self.store.find_by_hash(block.get_hash()).is_ok() {
            debug!(
                "{}: block {} already stored",
                self.uri,
                block.get_hash().readable_short()
            );
            return;
        }

        match self.try_extend(&block) {
            Ok(()) => {
                info!(
                    "{}: chain extended to height {} by {}",
                    self.uri,
                    block.get_height(),
                    block.get_hash().readable_short()
                );
                self.broadcast(&Message::Announce(block), Some(from));
            }
            Err(ChainError::UnknownParent) | Err(ChainError::StaleBlock) => {
                // Internally final, just not on top of our head. Keep it;
                // fork choice is undefined, so the chain is not rewound.
                if let Err(e) = self.store.store(&block) {
                    error!("{}: failed to store block: {e}", self.uri);
                    return;
                }
                warn!(
                    "{}: stored orphaned block {} at height {}",
                    self.uri,
                    block.get_hash().readable_short(),
                    block.get_height()
                );
                if block.get_height() > self.head().get_height()
                    && block.ensure_known_parent(&self.store).is_err()
                {
                    // The sender knows a taller line we cannot link up.
                    // Ask for the whole of it.
                    debug!(
                        "{}: requesting ancestry of {} from peer {from}",
                        self.uri,
                        block.get_hash().readable_short()
                    );
                    self.reply(
                        from,
                        &Message::BlockQuery(BlockQuery::Ancestry(*block.get_hash())),
                    );
                }
            }
            Err(e) => {
                warn!(
                    "{}: rejected block {} from peer {from}: {e}",
                    self.uri,
                    block.get_hash().readable_short()
                );
            }
        }
    }

    /// Bulk import of an ancestry response, oldest first. Blocks extend the
    /// chain where they fit; anything valid that does not fit is stored for
    /// later.
    fn on_chain_received(&mut self, from: PeerId, blocks: Vec<Block>) {
        let before = self.head().get_height();
        for block in blocks {
            if self.chain.iter().any(|b| b.get_hash() == block.get_hash()) {
                continue;
            }
            match self.try_extend(&block) {
                Ok(()) => {}
                Err(ChainError::UnknownParent) | Err(ChainError::StaleBlock) => {
                    if let Err(e) = self.store.store(&block) {
                        error!("{}: failed to store block: {e}", self.uri);
                        return;
                    }
                }
                Err(e) => {
                    warn!(
                        "{}: stopping chain import from peer {from} at invalid block {}: {e}",
                        self.uri,
                        block.get_hash().readable_short()
                    );
                    return;
                }
            }
        }
        let head = self.head().clone();
        if head.get_height() > before {
            info!(
                "{}: synced to height {} from peer {from}",
                self.uri,
                head.get_height()
            );
            self.broadcast(&Message::Announce(head), Some(from));
        }
    }

    fn on_submit_block(&mut self, block: Block) -> Result<Block> {
        self.try_extend(&block)?;
        info!(
            "{}: mined block {} adopted at height {}",
            self.uri,
            block.get_hash().readable_short(),
            block.get_height()
        );
        self.broadcast(&Message::Announce(block.clone()), None);
        Ok(block)
    }

    fn reply(&mut self, to: PeerId, msg: &Message) {
        match self.peers.get_mut(&to) {
            Some(peer) => {
                if let Err(e) = peer.send(msg) {
                    warn!("{}: {e}", self.uri);
                    peer.close();
                }
            }
            None => debug!("{}: peer {to} vanished before reply", self.uri),
        }
    }

    fn broadcast(&mut self, msg: &Message, except: Option<PeerId>) {
        let mut failed: Vec<PeerId> = Vec::new();
        for (id, peer) in self.peers.iter_mut() {
            if Some(*id) == except {
                continue;
            }
            if let Err(e) = peer.send(msg) {
                warn!("{}: {e}", self.uri);
                peer.close();
                failed.push(*id);
            }
        }
        // Closed sockets report back through their readers; dropping the
        // handles here just avoids more doomed writes.
        for id in failed {
            self.peers.remove(&id);
        }
    }
}
