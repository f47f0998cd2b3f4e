//! File-mediated exchange with the external solver: the sync-file
//! handshake, readers for the files the external side writes, and writers
//! for the files this side publishes.

pub mod export;
pub mod external;
pub mod sync;

pub use sync::{CouplingState, mark_external_ready, read_state, reset_sync_state, wait_for_state, write_state};
