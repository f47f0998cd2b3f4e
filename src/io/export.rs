//! Writers for the files this side publishes to the external solver, plus
//! debug dumps of gathered fields and mappings.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::algs::reorder::reorder_scalars;
use crate::data::GatheredField;
use crate::error::CouplingError;

/// Write one scalar per line in scientific notation.
pub fn write_scalars(path: &Path, values: &[f64]) -> Result<(), CouplingError> {
    let file = File::create(path).map_err(|e| CouplingError::io(path, e))?;
    let mut out = BufWriter::new(file);
    for v in values {
        writeln!(out, "{v:.9e}").map_err(|e| CouplingError::io(path, e))?;
    }
    out.flush().map_err(|e| CouplingError::io(path, e))
}

/// Write one index per line.
pub fn write_indices(path: &Path, indices: &[usize]) -> Result<(), CouplingError> {
    let file = File::create(path).map_err(|e| CouplingError::io(path, e))?;
    let mut out = BufWriter::new(file);
    for i in indices {
        writeln!(out, "{i}").map_err(|e| CouplingError::io(path, e))?;
    }
    out.flush().map_err(|e| CouplingError::io(path, e))
}

/// Reorder `values` through `index` and write the result, one scalar per
/// line. The output has one line per index entry.
pub fn write_mapped_scalars(
    path: &Path,
    values: &[f64],
    index: &[usize],
) -> Result<(), CouplingError> {
    let mut mapped = vec![0.0; index.len()];
    reorder_scalars(values, index, &mut mapped)?;
    write_scalars(path, &mapped)
}

/// Dump a gathered field with its provenance for offline inspection:
/// `cell_id worker_id value x y [z]` per line.
pub fn write_debug_field(path: &Path, field: &GatheredField) -> Result<(), CouplingError> {
    let file = File::create(path).map_err(|e| CouplingError::io(path, e))?;
    let mut out = BufWriter::new(file);
    for i in 0..field.len() {
        write!(
            out,
            "{} {} {:.9e}",
            field.index.cell_ids[i], field.index.worker_ids[i], field.values[i]
        )
        .map_err(|e| CouplingError::io(path, e))?;
        for c in field.points.point(i) {
            write!(out, " {c:.9e}").map_err(|e| CouplingError::io(path, e))?;
        }
        writeln!(out).map_err(|e| CouplingError::io(path, e))?;
    }
    out.flush().map_err(|e| CouplingError::io(path, e))
}
