//! accredit-store — repository implementation and configuration.
//!
//! Provides an in-memory implementation of the `MarkRepository` and
//! `CatalogRepository` traits, loads datasets into it, and reads
//! `accredit.toml` configuration.

pub mod config;
pub mod memory;

pub use config::{load_config, load_config_from, AccreditConfig};
pub use memory::MemoryStore;
