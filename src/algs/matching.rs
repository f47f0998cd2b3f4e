//! Brute-force nearest-neighbor matching between two point sets.
//!
//! One exhaustive O(N*M) scan builds both directions at once: the forward
//! map falls out of each outer iteration's inner minimum, while the reverse
//! map is updated opportunistically whenever the current outer point beats a
//! reverse candidate's best distance so far. Because the outer scan visits
//! every point of `a`, the reverse map is exact on completion, not an
//! approximation.
//!
//! Distances are squared Euclidean; ties keep the first candidate seen
//! (strict `<` comparison), so the result is deterministic for a fixed
//! input order.

use crate::data::PointSet;
use crate::error::CouplingError;

/// Bidirectional nearest-neighbor index mapping between two point sets.
///
/// `a_to_b[i]` is the index in `b` nearest to `a`'s point `i`, and
/// vice versa for `b_to_a`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mapping {
    pub a_to_b: Vec<usize>,
    pub b_to_a: Vec<usize>,
}

#[inline]
fn dist_sq(p: &[f64], q: &[f64]) -> f64 {
    p.iter()
        .zip(q)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Match `a` against `b` in both directions.
///
/// Both sets must be non-empty and share the same dimension. Progress is
/// logged roughly five times over the outer scan.
pub fn match_point_sets(a: &PointSet, b: &PointSet) -> Result<Mapping, CouplingError> {
    if a.is_empty() || b.is_empty() {
        return Err(CouplingError::EmptyPointSet);
    }
    if a.dim() != b.dim() {
        return Err(CouplingError::DimensionMismatch {
            expected: a.dim(),
            found: b.dim(),
        });
    }

    let n = a.len();
    let m = b.len();
    let mut a_to_b = vec![0usize; n];
    let mut b_to_a = vec![0usize; m];

    // Reverse minima start against a's first point, which the outer scan
    // visits first anyway; the strict `<` below keeps ties on it.
    let mut rev_min: Vec<f64> = (0..m).map(|j| dist_sq(a.point(0), b.point(j))).collect();

    let stride = (n / 5).max(1);
    for i in 0..n {
        if i % stride == 0 {
            log::info!("nearest-neighbor matching: {i} of {n} points");
        }
        let p = a.point(i);
        let mut fwd_min = f64::INFINITY;
        for j in 0..m {
            let d = dist_sq(p, b.point(j));
            if d < fwd_min {
                fwd_min = d;
                a_to_b[i] = j;
            }
            if d < rev_min[j] {
                rev_min[j] = d;
                b_to_a[j] = i;
            }
        }
    }

    Ok(Mapping { a_to_b, b_to_a })
}
