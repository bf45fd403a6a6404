//! LONGSHOT — Adaptive Tail-Betting Decision Engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod features;
pub mod model;
pub mod markets;
pub mod scorer;
pub mod ledger;
pub mod optimizer;
pub mod engine;
pub mod store;
