//! Index-driven reordering of gathered arrays.
//!
//! `dst[i] = src[index[i]]` for every destination position. Out-of-bounds
//! indices are skipped with a log message and reported once at the end, so
//! a single bad entry never discards the rest of an otherwise valid
//! exchange.

use crate::error::CouplingError;

/// Reorder scalars through an index array, best effort.
///
/// The index array and destination must have equal length; that mismatch is
/// rejected up front. Individual out-of-bounds indices leave their
/// destination slot untouched and the first offender is returned after the
/// full pass.
pub fn reorder_scalars(
    src: &[f64],
    index: &[usize],
    dst: &mut [f64],
) -> Result<(), CouplingError> {
    if index.len() != dst.len() {
        return Err(CouplingError::ReorderLengthMismatch {
            index_len: index.len(),
            dest_len: dst.len(),
        });
    }
    let mut first_bad: Option<CouplingError> = None;
    for (pos, &idx) in index.iter().enumerate() {
        if idx >= src.len() {
            log::error!(
                "reorder index {} at position {} exceeds source length {}",
                idx,
                pos,
                src.len()
            );
            first_bad.get_or_insert(CouplingError::ReorderIndexOutOfBounds {
                pos,
                index: idx,
                len: src.len(),
            });
            continue;
        }
        dst[pos] = src[idx];
    }
    match first_bad {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Reorder flat `dim`-component vectors through an index array, best effort.
///
/// `src` and `dst` hold `dim` consecutive components per point; `index`
/// addresses points, not components.
pub fn reorder_vectors(
    src: &[f64],
    dim: usize,
    index: &[usize],
    dst: &mut [f64],
) -> Result<(), CouplingError> {
    if index.len() * dim != dst.len() {
        return Err(CouplingError::ReorderLengthMismatch {
            index_len: index.len(),
            dest_len: dst.len() / dim.max(1),
        });
    }
    let src_points = src.len() / dim.max(1);
    let mut first_bad: Option<CouplingError> = None;
    for (pos, &idx) in index.iter().enumerate() {
        if idx >= src_points {
            log::error!(
                "reorder index {} at position {} exceeds source length {}",
                idx,
                pos,
                src_points
            );
            first_bad.get_or_insert(CouplingError::ReorderIndexOutOfBounds {
                pos,
                index: idx,
                len: src_points,
            });
            continue;
        }
        dst[pos * dim..(pos + 1) * dim].copy_from_slice(&src[idx * dim..(idx + 1) * dim]);
    }
    match first_bad {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
