//! Node integration tests
//!
//! Spin up real nodes on loopback sockets and exercise the protocol end to
//! end: handshake, block queries, gossip and catch-up sync.

use lattice_chain::network::wire::{self, BlockQuery, BlockResponse, Message, QueryError};
use lattice_chain::{start, GenesisConfig, Handle, Hash};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

/// Reserve a loopback port by binding and immediately releasing it.
fn free_uri() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("tcp://127.0.0.1:{port}")
}

fn start_node() -> Handle {
    start(&free_uri(), GenesisConfig::dev()).unwrap()
}

fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

/// Send one message and read frames until something other than the node's
/// own sync traffic comes back.
fn request(stream: &mut TcpStream, msg: &Message) -> Message {
    wire::write_frame(stream, msg).unwrap();
    loop {
        match wire::read_frame(stream).unwrap() {
            // The node queries every fresh peer for its highest block;
            // that is not the reply we are waiting for.
            Message::BlockQuery(_) => continue,
            reply => return reply,
        }
    }
}

fn raw_client(handle: &Handle) -> TcpStream {
    let addr = handle.get_uri().socket_addr().unwrap();
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

#[test]
fn test_start_is_idempotent_per_uri() {
    let uri = free_uri();
    let first = start(&uri, GenesisConfig::dev()).unwrap();
    let second = start(&uri, GenesisConfig::dev()).unwrap();

    assert_eq!(first.get_uri(), second.get_uri());
    // Both handles address the same coordinator.
    let mined = first
        .mine_and_announce(Hash::digest(b"idempotent"), 100)
        .unwrap();
    assert_eq!(second.head().unwrap(), mined);

    first.shutdown();
}

#[test]
fn test_shutdown_releases_the_port() {
    let uri = free_uri();
    let handle = start(&uri, GenesisConfig::dev()).unwrap();
    let addr = handle.get_uri().socket_addr().unwrap();
    handle.shutdown();

    assert!(wait_for(Duration::from_secs(5), || TcpListener::bind(addr)
        .is_ok()));
}

#[test]
fn test_two_nodes_handshake_and_gossip() {
    let a = start_node();
    let b = start_node();

    b.connect(&a.get_uri().to_string()).unwrap();
    assert!(wait_for(Duration::from_secs(5), || {
        a.peer_count().unwrap() == 1 && b.peer_count().unwrap() == 1
    }));

    // A block mined on one node reaches the other through gossip.
    let mined_on_b = b.mine_and_announce(Hash::digest(b"from-b"), 1_001).unwrap();
    assert!(wait_for(Duration::from_secs(5), || {
        a.head().unwrap() == mined_on_b
    }));

    // And back the other way on top of the synced head.
    let mined_on_a = a.mine_and_announce(Hash::digest(b"from-a"), 1_002).unwrap();
    assert_eq!(mined_on_a.get_height(), 2);
    assert!(wait_for(Duration::from_secs(5), || {
        b.head().unwrap() == mined_on_a
    }));

    a.shutdown();
    b.shutdown();
}

#[test]
fn test_late_joiner_catches_up() {
    let a = start_node();
    for i in 0..3u64 {
        a.mine_and_announce(Hash::digest(format!("early-{i}").as_bytes()), 2_000 + i)
            .unwrap();
    }
    let target = a.head().unwrap();
    assert_eq!(target.get_height(), 3);

    // A node arriving late sees only the announced head, asks the sender
    // for its ancestry, and imports the whole line.
    let b = start_node();
    b.connect(&a.get_uri().to_string()).unwrap();
    assert!(wait_for(Duration::from_secs(10), || {
        b.head().unwrap() == target
    }));
    assert_eq!(b.chain().unwrap().len(), 4);

    a.shutdown();
    b.shutdown();
}

#[test]
fn test_serves_block_queries_over_the_wire() {
    let node = start_node();
    let genesis = node.head().unwrap();
    for i in 0..2u64 {
        node.mine_and_announce(Hash::digest(format!("q-{i}").as_bytes()), 3_000 + i)
            .unwrap();
    }
    let head = node.head().unwrap();

    let mut stream = raw_client(&node);

    assert_eq!(request(&mut stream, &Message::Ping(7)), Message::Pong(7));

    assert_eq!(
        request(&mut stream, &Message::BlockQuery(BlockQuery::Genesis)),
        Message::BlockResponse(BlockResponse::Block(genesis.clone()))
    );

    assert_eq!(
        request(&mut stream, &Message::BlockQuery(BlockQuery::Highest)),
        Message::BlockResponse(BlockResponse::Block(head.clone()))
    );

    // Ancestry of the head is the entire chain, oldest first, target last.
    match request(
        &mut stream,
        &Message::BlockQuery(BlockQuery::Ancestry(*head.get_hash())),
    ) {
        Message::BlockResponse(BlockResponse::Chain(blocks)) => {
            assert_eq!(blocks.len(), 3);
            assert_eq!(blocks[0], genesis);
            assert_eq!(blocks[2], head);
        }
        other => panic!("expected chain response, got {other:?}"),
    }

    assert_eq!(
        request(
            &mut stream,
            &Message::BlockQuery(BlockQuery::Ancestry(Hash::digest(b"unknown"))),
        ),
        Message::BlockResponse(BlockResponse::Failed(QueryError::UnknownBlockHash))
    );

    node.shutdown();
}

#[test]
fn test_malformed_frame_drops_peer_not_node() {
    use std::io::Write;

    let node = start_node();

    let mut bad = raw_client(&node);
    assert!(wait_for(Duration::from_secs(5), || {
        node.peer_count().unwrap() == 1
    }));

    // A well-formed length prefix followed by garbage: the peer is dropped,
    // the node keeps running.
    bad.write_all(&4u32.to_be_bytes()).unwrap();
    bad.write_all(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
    bad.flush().unwrap();
    assert!(wait_for(Duration::from_secs(5), || {
        node.peer_count().unwrap() == 0
    }));

    let mined = node
        .mine_and_announce(Hash::digest(b"still-alive"), 4_000)
        .unwrap();
    let mut fresh = raw_client(&node);
    assert_eq!(
        request(&mut fresh, &Message::BlockQuery(BlockQuery::Highest)),
        Message::BlockResponse(BlockResponse::Block(mined))
    );

    node.shutdown();
}

#[test]
fn test_announced_block_is_adopted_from_raw_peer() {
    let node = start_node();
    let head = node.head().unwrap();

    // Forge a legitimate successor outside the node and announce it.
    let block = lattice_chain::core::miner::mine(
        lattice_chain::Block::new(Hash::digest(b"outsider"), 5_000)
            .as_child_of(&head)
            .seal(),
    );
    let mut stream = raw_client(&node);
    wire::write_frame(&mut stream, &Message::Announce(block.clone())).unwrap();

    assert!(wait_for(Duration::from_secs(5), || {
        node.head().unwrap() == block
    }));

    node.shutdown();
}
