//! Integration test crate: full engine cycles over in-memory stores
//! and deterministic market sources.

mod engine_cycle;
mod mock_sources;
