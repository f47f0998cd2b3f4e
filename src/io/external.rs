//! Readers for the whitespace-separated text files the external solver
//! writes.
//!
//! Every reader knows how many records to expect (or counts them first)
//! and fails on a shortfall instead of silently truncating; extra trailing
//! columns on a line are ignored.

use std::fs;
use std::path::Path;

use crate::data::PointSet;
use crate::error::CouplingError;

fn parse_f64(token: &str, path: &Path, line: usize) -> Result<f64, CouplingError> {
    token
        .parse::<f64>()
        .map_err(|e| CouplingError::parse(path, format!("line {}: {e}", line + 1)))
}

/// Read a point set: one point per line, the first `dim` columns are
/// coordinates.
pub fn read_point_set(path: &Path, dim: usize) -> Result<PointSet, CouplingError> {
    let content = fs::read_to_string(path).map_err(|e| CouplingError::io(path, e))?;
    let mut points = PointSet::new(dim)?;
    let mut buf = vec![0.0; dim];
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut cols = line.split_whitespace();
        for (d, slot) in buf.iter_mut().enumerate() {
            let token = cols.next().ok_or_else(|| {
                CouplingError::parse(
                    path,
                    format!("line {}: expected {dim} columns, found {d}", lineno + 1),
                )
            })?;
            *slot = parse_f64(token, path, lineno)?;
        }
        points.extend_flat(&buf)?;
    }
    if points.is_empty() {
        return Err(CouplingError::parse(path, "no points in file"));
    }
    log::debug!("read {} points from {}", points.len(), path.display());
    Ok(points)
}

/// Read exactly `expected` lines of `scalar weight` pairs.
pub fn read_scalar_and_weight(
    path: &Path,
    expected: usize,
) -> Result<(Vec<f64>, Vec<f64>), CouplingError> {
    let content = fs::read_to_string(path).map_err(|e| CouplingError::io(path, e))?;
    let mut scalars = Vec::with_capacity(expected);
    let mut weights = Vec::with_capacity(expected);
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut cols = line.split_whitespace();
        let s = cols
            .next()
            .ok_or_else(|| CouplingError::parse(path, format!("line {}: empty", lineno + 1)))?;
        let w = cols.next().ok_or_else(|| {
            CouplingError::parse(path, format!("line {}: missing weight column", lineno + 1))
        })?;
        scalars.push(parse_f64(s, path, lineno)?);
        weights.push(parse_f64(w, path, lineno)?);
    }
    if scalars.len() != expected {
        return Err(CouplingError::parse(
            path,
            format!("expected {expected} records, found {}", scalars.len()),
        ));
    }
    Ok((scalars, weights))
}

/// Read exactly `expected` lines of `dim`-component vectors, returned flat.
pub fn read_vectors(path: &Path, dim: usize, expected: usize) -> Result<Vec<f64>, CouplingError> {
    let content = fs::read_to_string(path).map_err(|e| CouplingError::io(path, e))?;
    let mut out = Vec::with_capacity(expected * dim);
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut cols = line.split_whitespace();
        for d in 0..dim {
            let token = cols.next().ok_or_else(|| {
                CouplingError::parse(
                    path,
                    format!("line {}: expected {dim} columns, found {d}", lineno + 1),
                )
            })?;
            out.push(parse_f64(token, path, lineno)?);
        }
    }
    if out.len() != expected * dim {
        return Err(CouplingError::parse(
            path,
            format!("expected {expected} records, found {}", out.len() / dim.max(1)),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tmp_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn point_set_reads_first_dim_columns() {
        let f = tmp_file("0.0 1.0 extra\n2.0 3.0\n\n4.0 5.0\n");
        let ps = read_point_set(f.path(), 2).unwrap();
        assert_eq!(ps.len(), 3);
        assert_eq!(ps.point(1), &[2.0, 3.0]);
    }

    #[test]
    fn point_set_rejects_short_lines_and_empty_files() {
        let f = tmp_file("1.0\n");
        assert!(read_point_set(f.path(), 2).is_err());
        let f = tmp_file("");
        assert!(read_point_set(f.path(), 2).is_err());
    }

    #[test]
    fn scalar_and_weight_pairs() {
        let f = tmp_file("1.5 0.25\n-2.0 0.75\n");
        let (s, w) = read_scalar_and_weight(f.path(), 2).unwrap();
        assert_eq!(s, vec![1.5, -2.0]);
        assert_eq!(w, vec![0.25, 0.75]);
    }

    #[test]
    fn record_count_mismatch_is_an_error() {
        let f = tmp_file("1.0 1.0\n");
        assert!(read_scalar_and_weight(f.path(), 2).is_err());
        let f = tmp_file("1.0 2.0 3.0\n");
        assert!(read_vectors(f.path(), 3, 2).is_err());
    }

    #[test]
    fn vectors_come_back_flat() {
        let f = tmp_file("1.0 2.0 3.0\n4.0 5.0 6.0\n");
        let v = read_vectors(f.path(), 3, 2).unwrap();
        assert_eq!(v, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
