// ========================================================================================
//
//                 Relationship matrices: construction, invariants, filtering
//
// ========================================================================================
//
// Co-clustering (CCM) and ancestor-descendant (AD) matrices are dense `n x n` grids of
// `f64` in [0, 1]. Every helper here walks them one row at a time so that no elementwise
// temporary of the full matrix is materialized on top of the inputs.

use crate::validate::ValidationError;
use ahash::AHashSet;
use itertools::Itertools;
use ndarray::{Array2, ArrayView2, ArrayViewMut2, Zip, s};

/// Absolute and relative tolerances used for approximate comparisons, matching the
/// defaults of the usual `allclose` convention.
pub const CLOSE_ATOL: f64 = 1e-8;
pub const CLOSE_RTOL: f64 = 1e-5;

#[inline]
pub fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= CLOSE_ATOL + CLOSE_RTOL * b.abs()
}

// ========================================================================================
//                                 Cluster assignments
// ========================================================================================

/// Mapping from each mutation to its 1-based cluster id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignment {
    labels: Vec<usize>,
    num_clusters: usize,
}

impl ClusterAssignment {
    /// Builds an assignment whose cluster count is the number of distinct labels.
    /// The labels must be exactly `1..=k`.
    pub fn new(labels: Vec<usize>) -> Result<Self, ValidationError> {
        let distinct = labels.iter().copied().collect::<AHashSet<usize>>().len();
        Self::with_clusters(labels, distinct)
    }

    /// Builds an assignment over exactly `k` clusters; every id in `1..=k` must be used.
    pub fn with_clusters(labels: Vec<usize>, k: usize) -> Result<Self, ValidationError> {
        let used: Vec<usize> = labels
            .iter()
            .copied()
            .collect::<AHashSet<usize>>()
            .into_iter()
            .sorted_unstable()
            .collect();
        let expected: Vec<usize> = (1..=k).collect();
        if used != expected {
            return Err(ValidationError::ClusterIds {
                used: used.iter().join(", "),
                expected: expected.iter().join(", "),
            });
        }
        Ok(Self {
            labels,
            num_clusters: k,
        })
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    /// The `n x k` indicator matrix with a single 1 per row.
    pub fn one_hot(&self) -> Array2<f64> {
        let mut indicator = Array2::zeros((self.labels.len(), self.num_clusters));
        for (row, &label) in self.labels.iter().enumerate() {
            indicator[[row, label - 1]] = 1.0;
        }
        indicator
    }

    /// `one_hot * one_hot^T`: entry (i, j) is 1 iff mutations i and j share a cluster.
    pub fn co_clustering(&self) -> Array2<f64> {
        let indicator = self.one_hot();
        indicator.dot(&indicator.t())
    }

    /// Keeps only the mutations listed in `mask`, in mask order.
    ///
    /// The cluster count is preserved, so clusters populated solely by dropped
    /// mutations become empty columns of the one-hot matrix.
    pub fn restrict(&self, mask: &[usize]) -> Result<Self, ValidationError> {
        check_mask(mask, self.labels.len())?;
        Ok(Self {
            labels: mask.iter().map(|&index| self.labels[index]).collect(),
            num_clusters: self.num_clusters,
        })
    }
}

/// Builds the CCM of an assignment over clusters `1..=k`.
pub fn build_ccm_from_assignment(
    assignment: &[usize],
    k: usize,
) -> Result<Array2<f64>, ValidationError> {
    Ok(ClusterAssignment::with_clusters(assignment.to_vec(), k)?.co_clustering())
}

// ========================================================================================
//                                      Phylogeny
// ========================================================================================

/// Transitive ancestor/descendant closure over clusters `0..=k`, where 0 is the root.
#[derive(Debug, Clone)]
pub struct Phylogeny {
    /// `descendants[[a, d]]` is true iff `d` lies strictly below `a`.
    descendants: Array2<bool>,
}

impl Phylogeny {
    /// Closes `(child, parent)` links transitively. Each link hands the child and its
    /// known descendants to the parent and to every ancestor the parent already has,
    /// so the result does not depend on edge order.
    pub fn from_edges(edges: &[(usize, usize)], k: usize) -> Result<Self, ValidationError> {
        let mut descendants = Array2::from_elem((k + 1, k + 1), false);
        for &(child, parent) in edges {
            if child == 0 || child > k || parent > k {
                return Err(ValidationError::InvalidEdge { child, parent });
            }
            let mut inherited = descendants.row(child).to_owned();
            inherited[child] = true;
            for ancestor in 0..=k {
                if ancestor == parent || descendants[[ancestor, parent]] {
                    Zip::from(descendants.row_mut(ancestor))
                        .and(&inherited)
                        .for_each(|slot, &below| *slot |= below);
                }
            }
        }

        if let Some(cluster) = (1..=k).find(|&c| descendants[[c, c]]) {
            return Err(ValidationError::CyclicPhylogeny { cluster });
        }
        let unreachable: Vec<usize> = (1..=k).filter(|&c| !descendants[[0, c]]).collect();
        if !unreachable.is_empty() {
            return Err(ValidationError::DisconnectedPhylogeny {
                unreachable: unreachable.iter().join(", "),
            });
        }
        Ok(Self { descendants })
    }

    pub fn num_clusters(&self) -> usize {
        self.descendants.nrows() - 1
    }

    #[inline]
    pub fn is_ancestor(&self, ancestor: usize, descendant: usize) -> bool {
        self.descendants[[ancestor, descendant]]
    }

    /// Expands the cluster-level relation to mutations through `assignment`.
    pub fn ancestry(&self, assignment: &ClusterAssignment) -> Array2<f64> {
        let labels = assignment.labels();
        let n = labels.len();
        let mut ad = Array2::zeros((n, n));
        for (mut row, &from) in ad.rows_mut().into_iter().zip(labels) {
            for (slot, &to) in row.iter_mut().zip(labels) {
                if self.is_ancestor(from, to) {
                    *slot = 1.0;
                }
            }
        }
        ad
    }
}

/// Builds the mutation-level AD matrix for a phylogeny over `k` clusters.
pub fn build_ad_from_tree(
    edges: &[(usize, usize)],
    k: usize,
    assignment: &ClusterAssignment,
) -> Result<Array2<f64>, ValidationError> {
    Ok(Phylogeny::from_edges(edges, k)?.ancestry(assignment))
}

// ========================================================================================
//                                   Derived matrices
// ========================================================================================

/// `1 - ccm - ad - ad^T`, computed row by row.
///
/// Entries outside [0, 1] mean an upstream invariant was broken; they are logged
/// and kept as computed.
pub fn cousin(ccm: ArrayView2<f64>, ad: ArrayView2<f64>) -> Result<Array2<f64>, ValidationError> {
    if ccm.dim() != ad.dim() || ccm.nrows() != ccm.ncols() {
        return Err(ValidationError::Shape {
            what: "cousin inputs",
            found: ad.dim(),
            expected: ccm.dim(),
        });
    }
    let mut output = Array2::ones(ccm.dim());
    let mut out_of_range = 0usize;
    for (i, mut row) in output.rows_mut().into_iter().enumerate() {
        Zip::from(&mut row)
            .and(ccm.row(i))
            .and(ad.row(i))
            .and(ad.column(i))
            .for_each(|out, &c, &down, &up| {
                *out -= c + down + up;
                if !(0.0..=1.0).contains(&*out) {
                    out_of_range += 1;
                }
            });
    }
    if out_of_range > 0 {
        log::warn!(
            "Cousin matrix has {out_of_range} entries outside [0, 1]; the CCM/AD inputs violate AD(i,j) + AD(j,i) + CCM(i,j) <= 1."
        );
    }
    Ok(output)
}

// ========================================================================================
//                                  Invariant checks
// ========================================================================================

/// Row-against-column symmetry test that stops at the first mismatching row.
pub fn is_symmetric(matrix: ArrayView2<f64>) -> bool {
    if matrix.nrows() != matrix.ncols() {
        return false;
    }
    (0..matrix.nrows()).all(|i| {
        matrix
            .row(i)
            .iter()
            .zip(matrix.column(i))
            .all(|(&a, &b)| is_close(a, b))
    })
}

/// True iff some strictly-upper pair has `ad(i,j) + ad(j,i) + ccm(i,j) > 1`.
pub fn violates_relationship_sum(ad: ArrayView2<f64>, ccm: ArrayView2<f64>) -> bool {
    let n = ccm.nrows();
    (0..n).any(|i| ((i + 1)..n).any(|j| ad[[i, j]] + ad[[j, i]] + ccm[[i, j]] > 1.0))
}

// ========================================================================================
//                               False-positive filtering
// ========================================================================================

fn check_mask(mask: &[usize], size: usize) -> Result<(), ValidationError> {
    if let Some(&index) = mask.iter().find(|&&index| index >= size) {
        return Err(ValidationError::MaskOutOfBounds { index, size });
    }
    if mask.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(ValidationError::MaskNotIncreasing);
    }
    Ok(())
}

/// Restricts a square matrix to the rows and columns listed in `mask`, in place.
///
/// Entry `(mask[i], mask[j])` moves to `(i, j)`; everything outside the leading
/// `mask.len()` block is zeroed and a view of that block is returned. The mask must be
/// strictly increasing, which guarantees no source entry is overwritten before it is read.
pub fn filter_fps<'a>(
    matrix: &'a mut Array2<f64>,
    mask: &[usize],
) -> Result<ArrayViewMut2<'a, f64>, ValidationError> {
    let size = matrix.nrows();
    if matrix.ncols() != size {
        return Err(ValidationError::Shape {
            what: "filtered matrix",
            found: matrix.dim(),
            expected: (size, size),
        });
    }
    check_mask(mask, size)?;

    let kept = mask.len();
    for (i, &from_row) in mask.iter().enumerate() {
        for (j, &from_col) in mask.iter().enumerate() {
            matrix[[i, j]] = matrix[[from_row, from_col]];
        }
    }
    matrix.slice_mut(s![..kept, kept..]).fill(0.0);
    matrix.slice_mut(s![kept.., ..]).fill(0.0);
    Ok(matrix.slice_mut(s![..kept, ..kept]))
}

/// [`filter_fps`] for an owned matrix; the result shares the input's allocation.
pub fn filter_fps_owned(
    mut matrix: Array2<f64>,
    mask: &[usize],
) -> Result<Array2<f64>, ValidationError> {
    filter_fps(&mut matrix, mask)?;
    let kept = mask.len();
    Ok(matrix.slice_move(s![..kept, ..kept]))
}
