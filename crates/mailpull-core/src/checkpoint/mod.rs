//! Durable sync state.
//!
//! A checkpoint holds the change-feed continuation token, a dedup ledger of
//! processed message ids and lifetime counters. It is loaded at the start of
//! a run, mutated in place by the sync coordinator and saved at fixed points.

mod model;
mod store;

pub use model::Checkpoint;
pub use store::{CheckpointError, CheckpointStore};
