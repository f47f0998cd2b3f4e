//! The solver-glue seam: named mesh partitions ("coupled zones"), local
//! per-worker zone slices, and the per-cell auxiliary slot storage the
//! scatter path writes source-term values into.
//!
//! The core never traverses the host solver's mesh directly. A worker's
//! view of a zone is a [`ZoneSlice`]: a fixed-order cell walk plus centroid
//! access. Field values are sampled through a plain capability
//! `Fn(&Z, CellId) -> f64`; the same shape serves coordinates and
//! arbitrary scalars alike.

use std::collections::HashMap;

use crate::error::CouplingError;

/// Identifier of a coupled mesh partition, as named by the host solver.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct ZoneId(pub i32);

/// Worker-local cell handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub u32);

/// Fixed enumeration of per-cell auxiliary slots the coupling writes into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum FieldTag {
    /// Volumetric heat source imported from the external solver.
    HeatSource = 0,
    ForceX = 1,
    ForceY = 2,
    ForceZ = 3,
    /// Tracked scalar as of the last performed exchange, for the
    /// loose-coupling throttle.
    PrevTracked = 4,
}

impl FieldTag {
    pub const COUNT: usize = 5;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Force component for spatial axis `axis` (0-based).
    pub fn force_axis(axis: usize) -> Result<FieldTag, CouplingError> {
        match axis {
            0 => Ok(FieldTag::ForceX),
            1 => Ok(FieldTag::ForceY),
            2 => Ok(FieldTag::ForceZ),
            _ => Err(CouplingError::SlotOutOfRange {
                tag: FieldTag::ForceX.index() + axis,
                slots: FieldTag::COUNT,
            }),
        }
    }
}

/// Sentinel written into a slot when scatter detects ordering corruption,
/// so downstream numerical use is visibly wrong instead of silently wrong.
pub const SLOT_ERROR_VALUE: f64 = -9.99e99;

/// A worker's local slice of a coupled zone.
///
/// `cells()` must yield the same cell sequence on every call; that fixed
/// traversal order is what lets a scatter invert the preceding gather.
pub trait ZoneSlice {
    fn zone(&self) -> ZoneId;
    fn dim(&self) -> usize;
    fn cell_count(&self) -> usize;
    /// Local cells in the fixed traversal order.
    fn cells(&self) -> Box<dyn Iterator<Item = CellId> + '_>;
    /// Write the cell centroid into `out` (length `dim()`).
    fn centroid(&self, cell: CellId, out: &mut [f64]) -> Result<(), CouplingError>;
}

/// Per-cell auxiliary value slots addressed by [`FieldTag`], mutated only
/// by the owning worker.
pub trait SlotStore {
    /// Slots available per cell; tags at or past this index are rejected.
    fn slot_count(&self) -> usize;
    fn write_slot(&mut self, cell: CellId, tag: FieldTag, value: f64) -> Result<(), CouplingError>;
    fn read_slot(&self, cell: CellId, tag: FieldTag) -> Result<f64, CouplingError>;
}

/// In-memory zone slice, the crate's own reference implementation; used by
/// the tests and by demos standing in for a real solver binding.
#[derive(Clone, Debug)]
pub struct InMemoryZone {
    zone: ZoneId,
    dim: usize,
    cells: Vec<CellId>,
    centroids: Vec<f64>,
    values: Vec<f64>,
    slots: Vec<f64>,
    slot_count: usize,
    position: HashMap<CellId, usize>,
}

impl InMemoryZone {
    pub fn new(zone: ZoneId, dim: usize) -> Self {
        Self::with_slot_count(zone, dim, FieldTag::COUNT)
    }

    /// Zone exposing only the first `slots` auxiliary slots per cell,
    /// mirroring a host solver configured with a smaller slot capacity.
    pub fn with_slot_count(zone: ZoneId, dim: usize, slots: usize) -> Self {
        Self {
            zone,
            dim,
            cells: Vec::new(),
            centroids: Vec::new(),
            values: Vec::new(),
            slots: Vec::new(),
            slot_count: slots.min(FieldTag::COUNT),
            position: HashMap::new(),
        }
    }

    fn check_slot(&self, tag: FieldTag) -> Result<(), CouplingError> {
        if tag.index() < self.slot_count {
            Ok(())
        } else {
            Err(CouplingError::SlotOutOfRange {
                tag: tag.index(),
                slots: self.slot_count,
            })
        }
    }

    /// Append a cell in traversal order with its centroid and scalar value.
    pub fn push_cell(&mut self, cell: CellId, centroid: &[f64], value: f64) {
        debug_assert_eq!(centroid.len(), self.dim);
        self.position.insert(cell, self.cells.len());
        self.cells.push(cell);
        self.centroids.extend_from_slice(centroid);
        self.values.push(value);
        self.slots.extend(std::iter::repeat_n(0.0, FieldTag::COUNT));
    }

    /// Primary scalar value of `cell`, if present.
    pub fn scalar(&self, cell: CellId) -> Option<f64> {
        self.position.get(&cell).map(|&i| self.values[i])
    }

    pub fn set_scalar(&mut self, cell: CellId, value: f64) -> Result<(), CouplingError> {
        let i = self
            .position
            .get(&cell)
            .copied()
            .ok_or(CouplingError::UnknownCell { cell: cell.0 })?;
        self.values[i] = value;
        Ok(())
    }
}

impl ZoneSlice for InMemoryZone {
    fn zone(&self) -> ZoneId {
        self.zone
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn cell_count(&self) -> usize {
        self.cells.len()
    }

    fn cells(&self) -> Box<dyn Iterator<Item = CellId> + '_> {
        Box::new(self.cells.iter().copied())
    }

    fn centroid(&self, cell: CellId, out: &mut [f64]) -> Result<(), CouplingError> {
        let i = self
            .position
            .get(&cell)
            .copied()
            .ok_or(CouplingError::UnknownCell { cell: cell.0 })?;
        out.copy_from_slice(&self.centroids[i * self.dim..(i + 1) * self.dim]);
        Ok(())
    }
}

impl SlotStore for InMemoryZone {
    fn slot_count(&self) -> usize {
        self.slot_count
    }

    fn write_slot(&mut self, cell: CellId, tag: FieldTag, value: f64) -> Result<(), CouplingError> {
        self.check_slot(tag)?;
        let i = self
            .position
            .get(&cell)
            .copied()
            .ok_or(CouplingError::UnknownCell { cell: cell.0 })?;
        self.slots[i * FieldTag::COUNT + tag.index()] = value;
        Ok(())
    }

    fn read_slot(&self, cell: CellId, tag: FieldTag) -> Result<f64, CouplingError> {
        self.check_slot(tag)?;
        let i = self
            .position
            .get(&cell)
            .copied()
            .ok_or(CouplingError::UnknownCell { cell: cell.0 })?;
        Ok(self.slots[i * FieldTag::COUNT + tag.index()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_zone() -> InMemoryZone {
        let mut z = InMemoryZone::new(ZoneId(11), 2);
        z.push_cell(CellId(3), &[0.0, 0.0], 0.5);
        z.push_cell(CellId(1), &[1.0, 0.0], 0.7);
        z
    }

    #[test]
    fn traversal_order_is_insertion_order() {
        let z = sample_zone();
        let order: Vec<_> = z.cells().collect();
        assert_eq!(order, vec![CellId(3), CellId(1)]);
        // Repeated walks must be identical.
        assert_eq!(z.cells().collect::<Vec<_>>(), order);
    }

    #[test]
    fn centroid_and_scalar_lookup() {
        let z = sample_zone();
        let mut c = [0.0; 2];
        z.centroid(CellId(1), &mut c).unwrap();
        assert_eq!(c, [1.0, 0.0]);
        assert_eq!(z.scalar(CellId(3)), Some(0.5));
        assert!(z.centroid(CellId(9), &mut c).is_err());
    }

    #[test]
    fn slots_are_per_cell_and_per_tag() {
        let mut z = sample_zone();
        z.write_slot(CellId(3), FieldTag::HeatSource, 42.0).unwrap();
        z.write_slot(CellId(3), FieldTag::ForceY, -1.0).unwrap();
        assert_eq!(z.read_slot(CellId(3), FieldTag::HeatSource), Ok(42.0));
        assert_eq!(z.read_slot(CellId(3), FieldTag::ForceY), Ok(-1.0));
        assert_eq!(z.read_slot(CellId(1), FieldTag::HeatSource), Ok(0.0));
    }

    #[test]
    fn slot_capacity_is_enforced() {
        let mut z = InMemoryZone::with_slot_count(ZoneId(11), 2, 2);
        z.push_cell(CellId(3), &[0.0, 0.0], 0.5);
        z.write_slot(CellId(3), FieldTag::HeatSource, 1.0).unwrap();
        assert_eq!(
            z.write_slot(CellId(3), FieldTag::ForceY, 1.0),
            Err(CouplingError::SlotOutOfRange { tag: 2, slots: 2 })
        );
        assert_eq!(
            z.read_slot(CellId(3), FieldTag::PrevTracked),
            Err(CouplingError::SlotOutOfRange { tag: 4, slots: 2 })
        );
        assert_eq!(z.read_slot(CellId(3), FieldTag::HeatSource), Ok(1.0));
    }

    #[test]
    fn force_axis_mapping() {
        assert_eq!(FieldTag::force_axis(0), Ok(FieldTag::ForceX));
        assert_eq!(FieldTag::force_axis(2), Ok(FieldTag::ForceZ));
        assert!(FieldTag::force_axis(3).is_err());
    }
}
