//! Trajectory Checkpoint Protocol (TCP)
//!
//! Immutable, content-hashed checkpoints of workflow state:
//! - Canonical (key-order independent) state digests
//! - Pluggable storage (in-memory, one JSON file per checkpoint)
//! - Verification, alignment history and chain integrity

pub mod digest;
mod repository;
mod store;

pub use digest::{canonicalize, state_digest};
pub use repository::{CheckpointRepository, FileRepository, InMemoryRepository};
pub use store::CheckpointStore;
