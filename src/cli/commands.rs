// These are the commands I expose on the binary
// I keep the surface small: run a node, or peek at what one has stored
// clap's derive does the parsing; StoreBackend plugs in through FromStr
use crate::config::StoreBackend;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "lattice-chain")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    // When I want to bring a node up and leave it running
    // I can repeat --peer to dial several nodes right away, and --store
    // decides whether the blocks live in memory or in a Sled database
    #[command(name = "startnode", about = "Start a chain node and keep it running")]
    StartNode {
        #[arg(long, help = "Node URI to bind, e.g. tcp://127.0.0.1:7000")]
        addr: Option<String>,
        #[arg(long = "peer", help = "Peer URI to dial at startup (repeatable)")]
        peers: Vec<String>,
        #[arg(long, help = "Block store backend: memory or disk")]
        store: Option<StoreBackend>,
        #[arg(long, help = "Root directory for disk stores")]
        path: Option<PathBuf>,
    },
    // When I want to see the chain a node has persisted (debugging aid -
    // it reads the store directly, no node has to be running)
    #[command(name = "printchain", about = "Print the locally stored chain")]
    Printchain {
        #[arg(long, help = "URI of the node whose store to read")]
        addr: Option<String>,
        #[arg(long, help = "Root directory for disk stores")]
        path: Option<PathBuf>,
    },
}
