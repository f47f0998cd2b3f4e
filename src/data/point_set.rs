//! Coordinator-owned aggregate containers produced by a gather.
//!
//! A [`PointSet`] stores flat coordinates with a fixed dimension per point.
//! The parallel [`PartitionIndex`] remembers where every point came from;
//! its ordering (grouped by ascending worker id, worker-local traversal
//! order within each group) is the contract the whole scatter/gather
//! pipeline depends on and must be reproduced identically on every gather.

use crate::error::CouplingError;

/// Ordered set of D-dimensional coordinates (D = 2 or 3), stored flat.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointSet {
    dim: usize,
    coords: Vec<f64>,
}

impl PointSet {
    pub fn new(dim: usize) -> Result<Self, CouplingError> {
        validate_dim(dim)?;
        Ok(Self {
            dim,
            coords: Vec::new(),
        })
    }

    /// Wrap an existing flat coordinate buffer.
    pub fn from_flat(dim: usize, coords: Vec<f64>) -> Result<Self, CouplingError> {
        validate_dim(dim)?;
        if coords.len() % dim != 0 {
            return Err(CouplingError::DimensionMismatch {
                expected: dim,
                found: coords.len() % dim,
            });
        }
        Ok(Self { dim, coords })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len() / self.dim
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Coordinate slice of point `i`.
    #[inline]
    pub fn point(&self, i: usize) -> &[f64] {
        &self.coords[i * self.dim..(i + 1) * self.dim]
    }

    #[inline]
    pub fn as_flat(&self) -> &[f64] {
        &self.coords
    }

    /// Append points from a flat buffer gathered off one worker.
    pub fn extend_flat(&mut self, coords: &[f64]) -> Result<(), CouplingError> {
        if coords.len() % self.dim != 0 {
            return Err(CouplingError::DimensionMismatch {
                expected: self.dim,
                found: coords.len() % self.dim,
            });
        }
        self.coords.extend_from_slice(coords);
        Ok(())
    }
}

fn validate_dim(dim: usize) -> Result<(), CouplingError> {
    if dim == 2 || dim == 3 {
        Ok(())
    } else {
        Err(CouplingError::DimensionMismatch {
            expected: 2,
            found: dim,
        })
    }
}

/// For each gathered point, the `(worker id, local cell id)` it came from.
/// Parallel to the point set, same length, same ordering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionIndex {
    pub worker_ids: Vec<u32>,
    pub cell_ids: Vec<u32>,
}

impl PartitionIndex {
    #[inline]
    pub fn len(&self) -> usize {
        self.worker_ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.worker_ids.is_empty()
    }

    /// Append one worker's block, tagging every entry with its id.
    pub fn extend_block(&mut self, worker: usize, cell_ids: &[u32]) {
        self.worker_ids
            .extend(std::iter::repeat_n(worker as u32, cell_ids.len()));
        self.cell_ids.extend_from_slice(cell_ids);
    }
}

/// Number of points each worker contributed, indexed by worker id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CountTable(Vec<usize>);

impl CountTable {
    pub fn zeros(workers: usize) -> Self {
        Self(vec![0; workers])
    }

    pub fn from_counts(counts: Vec<usize>) -> Self {
        Self(counts)
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn get(&self, worker: usize) -> usize {
        self.0[worker]
    }

    pub fn set(&mut self, worker: usize, count: usize) -> Result<(), CouplingError> {
        match self.0.get_mut(worker) {
            Some(slot) => {
                *slot = count;
                Ok(())
            }
            None => Err(CouplingError::WorkerIdOutOfRange {
                id: worker,
                workers: self.0.len(),
            }),
        }
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }

    /// Split points: `offsets()[w]` is the start of worker `w`'s slice in a
    /// gathered array, `offsets()[workers()]` the total length.
    pub fn offsets(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.0.len() + 1);
        let mut acc = 0usize;
        out.push(0);
        for &c in &self.0 {
            acc += c;
            out.push(acc);
        }
        out
    }

    /// The table must account for every gathered point.
    pub fn validate_total(&self, points: usize) -> Result<(), CouplingError> {
        let table = self.total();
        if table == points {
            Ok(())
        } else {
            Err(CouplingError::CountTableMismatch { table, points })
        }
    }
}

/// Everything one gather produces on the coordinator: the assembled point
/// set, the field values sampled at those points, and the partition index
/// recording provenance.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GatheredField {
    pub points: PointSet,
    pub values: Vec<f64>,
    pub index: PartitionIndex,
}

impl GatheredField {
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
