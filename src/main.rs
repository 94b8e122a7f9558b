// This is my main entry point for the chain node CLI
// I'm importing the pieces I need to start a node and to inspect its store
use clap::Parser;
use lattice_chain::network::logic;
use lattice_chain::network::node;
use lattice_chain::{
    Block, BlockStore, Command, GenesisConfig, NodeUri, Opt, GLOBAL_CONFIG,
};
use log::{error, LevelFilter};
use std::process;
use std::thread;

// I use this address whenever the user doesn't pick one
const DEFAULT_NODE_ADDR: &str = "tcp://127.0.0.1:7000";

fn main() {
    // I initialize logging so I can see what my node is doing
    // Info level gives me enough detail without drowning in frames
    env_logger::builder().filter_level(LevelFilter::Info).init();

    // I parse the command line arguments using clap - this gives me a nice CLI interface
    let opt = Opt::parse();

    // I run the actual command and handle any errors that might occur
    // If something goes wrong, I log the error and exit with code 1
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

// This is where I handle the different CLI commands
fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        // When I want to run a node: pick the backend, start the actors,
        // dial any peers the user gave me, and then stay out of the way
        Command::StartNode {
            addr,
            peers,
            store,
            path,
        } => {
            // I apply the store selection before anything opens a database
            if let Some(backend) = store {
                GLOBAL_CONFIG.set_store_backend(backend);
            }
            if let Some(root) = path {
                GLOBAL_CONFIG.set_store_root(root);
            }
            let addr = addr.unwrap_or_else(|| DEFAULT_NODE_ADDR.to_string());

            let handle = node::start(&addr, GenesisConfig::dev())?;
            // I dial out to every peer the user listed; each dial runs on
            // its own supervised connector
            for peer in &peers {
                handle.connect(peer)?;
            }
            println!("Node listening on {}", handle.get_uri());

            // The actors carry the node from here - I just keep the
            // process alive
            loop {
                thread::park();
            }
        }
        // When I want to see what a node has on disk (useful for debugging)
        Command::Printchain { addr, path } => {
            if let Some(root) = path {
                GLOBAL_CONFIG.set_store_root(root);
            }
            // I derive the store directory from the node's port, the same
            // way the node itself does
            let addr = addr.unwrap_or_else(|| DEFAULT_NODE_ADDR.to_string());
            let uri = NodeUri::parse(&addr)?;

            let store = BlockStore::open(&GLOBAL_CONFIG.node_store_path(uri.get_port()))?;
            // I rebuild the chain exactly like a restarting node would and
            // print it newest first
            let chain = logic::load_chain(&store, &Block::genesis())?;
            for block in &chain {
                println!("Block hash: {}", block.get_hash());
                println!("Height: {}", block.get_height());
                println!("Timestamp: {}", block.get_timestamp().unwrap_or_default());
                println!("Parent hash: {}", block.get_parent_hash());
                println!();
            }
        }
    }
    Ok(())
}
