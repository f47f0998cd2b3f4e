//! Distributed algorithms: the communicator seam, wire encoding, relay
//! collectives, gather/scatter of zone fields, nearest-neighbor matching,
//! and index-driven reordering.

pub mod collective;
pub mod communicator;
pub mod gather;
pub mod matching;
pub mod reorder;
pub mod scatter;
pub mod wire;

pub use communicator::{CommTag, Communicator, NoComm, ProcessGroup, ThreadComm};
pub use gather::{gather_cell_counts, gather_zone_field};
pub use matching::{Mapping, match_point_sets};
pub use reorder::{reorder_scalars, reorder_vectors};
pub use scatter::distribute_mapped_field;
