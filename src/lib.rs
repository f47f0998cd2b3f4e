#![cfg_attr(docsrs, feature(doc_cfg))]
//! # field-couple
//!
//! field-couple is a Rust library for file-mediated two-way coupling between
//! a distributed CFD solver (one coordinator plus many worker processes) and
//! an external FEA solver. It aggregates spatially partitioned per-cell
//! fields onto the coordinator, builds a bidirectional nearest-neighbor
//! mapping against the external solver's point set, and scatters the mapped
//! fields back to the workers with per-element provenance checks.
//!
//! ## Features
//! - Relay-based gather/scatter over a fixed two-hop process topology
//! - Brute-force nearest-neighbor matching with deterministic tie-breaking
//! - Bounded-retry sync-file handshake that degrades instead of deadlocking
//! - Tri-state exchange status carried across every hop so handshakes
//!   complete even on error
//! - Loose-coupling throttle that skips exchanges below a relative-change
//!   threshold
//! - Pluggable communication backends (inert, threaded, MPI)
//!
//! ## Usage
//! Add `field-couple` as a dependency in your `Cargo.toml` and enable
//! features as needed:
//!
//! ```toml
//! [dependencies]
//! field-couple = "0.3"
//! # Optional features:
//! # features = ["mpi-support", "single-precision"]
//! ```
//!
//! Each rank constructs a [`coupling::CouplingSession`] over a
//! [`algs::communicator::Communicator`] backend and calls the same sequence
//! of session methods; coordinator, relay and worker roles are resolved
//! internally from the [`algs::communicator::ProcessGroup`].

pub mod algs;
pub mod coupling;
pub mod data;
pub mod error;
pub mod io;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{CommTag, Communicator, NoComm, ProcessGroup, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::gather::{gather_cell_counts, gather_zone_field};
    pub use crate::algs::matching::{Mapping, match_point_sets};
    pub use crate::algs::reorder::{reorder_scalars, reorder_vectors};
    pub use crate::algs::scatter::distribute_mapped_field;
    pub use crate::coupling::{
        CouplingConfig, CouplingSession, QuantityFlow, StepOutcome, ZoneConfig, ZoneFiles,
    };
    pub use crate::data::{
        CellId, CountTable, FieldTag, GatheredField, InMemoryZone, PartitionIndex, PointSet,
        SLOT_ERROR_VALUE, SlotStore, ZoneId, ZoneSlice,
    };
    pub use crate::error::{CouplingError, ExchangeStatus};
    pub use crate::io::sync::{CouplingState, read_state, wait_for_state, write_state};
}
