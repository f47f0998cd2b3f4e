//! Data containers for gathered fields and the solver-facing zone seam.

pub mod point_set;
pub mod zone;

pub use point_set::{CountTable, GatheredField, PartitionIndex, PointSet};
pub use zone::{
    CellId, FieldTag, InMemoryZone, SLOT_ERROR_VALUE, SlotStore, ZoneId, ZoneSlice,
};
