//! Configuration management
//!
//! Genesis parameters arrive as a value at node start; the store backend and
//! its root directory come from the environment or the CLI. Everything is
//! held in one process-wide config.

pub mod settings;

pub use settings::{Config, GenesisConfig, StoreBackend, GLOBAL_CONFIG};
