//! Schema discovery and heuristic analysis for SQLite database shards.

pub mod analysis;
pub mod checker;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod models;
pub mod reporter;
pub mod sql;
pub mod value;
