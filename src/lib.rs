//! Incremental builder for array-backed game-log datasets.
//!
//! Per-game CSV logs are read with a per-file row cap, coerced to a fixed
//! `(name, label: u8, features: [u16])` schema and appended to a growable
//! on-disk store that training loaders read back.

pub mod config;
pub mod data;
pub mod error;
