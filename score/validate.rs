// ========================================================================================
//
//                         Structural validation of submitted files
//
// ========================================================================================
//
// Each validator takes the decoded content of one submission file and either returns the
// structure the scorers consume or a `ValidationError` describing the first violated
// constraint. Validation never repairs input.

use crate::matrix::{
    ClusterAssignment, build_ad_from_tree, is_close, is_symmetric, violates_relationship_sum,
};
use ndarray::{Array2, ArrayView2};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input file contains zero lines")]
    EmptyInput,

    #[error("Input file contains more than one line")]
    MultipleLines,

    #[error("Data could not be converted to float: {0}")]
    NotFloat(String),

    #[error("Data could not be converted to int: {0}")]
    NotInteger(String),

    #[error("{what} is non-finite")]
    NonFinite { what: String },

    #[error("{what} is NaN")]
    NotANumber { what: String },

    #[error("{what} was {value}, outside [{min}, {max}]")]
    OutOfRange {
        what: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error(
        "Input file contains a different number of lines than expected. Input: {found} lines Expected: {expected} lines"
    )]
    LineCount { found: usize, expected: usize },

    #[error("Number of lines is {found}; must be between {min} and {max}")]
    LineCountRange { found: usize, min: usize, max: usize },

    #[error("Number of tab separated columns in line {line} is not {expected} (found {found})")]
    ColumnCount {
        line: usize,
        found: usize,
        expected: usize,
    },

    #[error("Cluster ID in line {line} is not {expected}")]
    ClusterIdOrder { line: usize, expected: usize },

    #[error("First column must have {clusters} entries in ascending order starting with 1")]
    TreeOrder { clusters: usize },

    #[error("Entry in line {line} can not be cast as an integer: {content}")]
    LineNotInteger { line: usize, content: String },

    #[error("Entry in line {line} can not be cast as a float: {content}")]
    LineNotFloat { line: usize, content: String },

    #[error("Number of mutations in line {line} is less than 1.")]
    EmptyCluster { line: usize },

    #[error("Total number of reported mutations is {reported}. Should be {expected}")]
    MutationTotal { reported: usize, expected: usize },

    #[error("Cluster IDs used ({used}) is not what is expected ({expected})")]
    ClusterIds { used: String, expected: String },

    #[error("Parent node label in line {line} is not valid.")]
    InvalidParent { line: usize },

    #[error("Phylogeny edge {child} -> {parent} references an unknown cluster.")]
    InvalidEdge { child: usize, parent: usize },

    #[error("Phylogeny contains a cycle through cluster {cluster}.")]
    CyclicPhylogeny { cluster: usize },

    #[error(
        "Root of phylogeny not ancestor of all clusters / Tree is not connected. Unreachable clusters: {unreachable}"
    )]
    DisconnectedPhylogeny { unreachable: String },

    #[error("Shape of {what} {found:?} is wrong.  Should be {expected:?}")]
    Shape {
        what: &'static str,
        found: (usize, usize),
        expected: (usize, usize),
    },

    #[error("Entry in {what} matrix line {line} could not be cast as a float: {content}")]
    MatrixEntry {
        what: &'static str,
        line: usize,
        content: String,
    },

    #[error("Diagonal entries of {what} matrix not {expected}")]
    Diagonal { what: &'static str, expected: f64 },

    #[error("{what} matrix contains NaNs")]
    ContainsNan { what: &'static str },

    #[error("{what} matrix contains non-finite entries")]
    ContainsInfinite { what: &'static str },

    #[error("{what} matrix contains entries greater than 1")]
    AboveOne { what: &'static str },

    #[error("{what} matrix contains entries less than 0")]
    BelowZero { what: &'static str },

    #[error("{what} matrix is not symmetric")]
    NotSymmetric { what: &'static str },

    #[error("For some i, j the sum of AD(i, j) + AD(j, i) + CCM(i, j) > 1.")]
    RelationshipSum,

    #[error("Input VCF contains no SSMs")]
    EmptyVcf,

    #[error("Mask index {index} is out of bounds for a matrix of size {size}.")]
    MaskOutOfBounds { index: usize, size: usize },

    #[error("Mask indices must be strictly increasing.")]
    MaskNotIncreasing,
}

pub const CO_CLUSTERING: &str = "Co-clustering";
pub const ANCESTRY: &str = "AD";

/// Trimmed, non-blank lines of a text file.
pub(crate) fn content_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Parses the one-cluster-id-per-line assignment file for `n` mutations.
pub fn validate_assignment(text: &str, n: usize) -> Result<ClusterAssignment, ValidationError> {
    let lines = content_lines(text);
    if lines.len() != n {
        return Err(ValidationError::LineCount {
            found: lines.len(),
            expected: n,
        });
    }
    let labels = lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            line.parse::<usize>()
                .map_err(|_| ValidationError::LineNotInteger {
                    line: index + 1,
                    content: line.to_string(),
                })
        })
        .collect::<Result<Vec<usize>, _>>()?;
    ClusterAssignment::new(labels)
}

/// Parses the `child<TAB>parent` phylogeny file and expands it to a mutation-level AD
/// matrix through `assignment`.
///
/// There must be one line per cluster, children listed as `1..=k` in order, and every
/// parent in `0..=k` (0 is the root).
pub fn validate_tree(
    text: &str,
    assignment: &ClusterAssignment,
) -> Result<Array2<f64>, ValidationError> {
    let k = assignment.num_clusters();
    let lines = content_lines(text);
    if lines.len() != k {
        return Err(ValidationError::LineCount {
            found: lines.len(),
            expected: k,
        });
    }

    let mut edges = Vec::with_capacity(k);
    for (index, line) in lines.iter().enumerate() {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() != 2 {
            return Err(ValidationError::ColumnCount {
                line: index + 1,
                found: fields.len(),
                expected: 2,
            });
        }
        let parse = |field: &str| {
            field
                .parse::<usize>()
                .map_err(|_| ValidationError::LineNotInteger {
                    line: index + 1,
                    content: line.to_string(),
                })
        };
        edges.push((parse(fields[0])?, parse(fields[1])?));
    }

    if edges
        .iter()
        .enumerate()
        .any(|(index, &(child, _))| child != index + 1)
    {
        return Err(ValidationError::TreeOrder { clusters: k });
    }
    if let Some(index) = edges.iter().position(|&(_, parent)| parent > k) {
        return Err(ValidationError::InvalidParent { line: index + 1 });
    }

    build_ad_from_tree(&edges, k, assignment)
}

/// Entry-wise range checks shared by the CCM and AD validators, in reporting order.
fn check_entries(matrix: ArrayView2<f64>, what: &'static str) -> Result<(), ValidationError> {
    if matrix.iter().any(|v| v.is_nan()) {
        return Err(ValidationError::ContainsNan { what });
    }
    if matrix.iter().any(|v| v.is_infinite()) {
        return Err(ValidationError::ContainsInfinite { what });
    }
    if matrix.iter().any(|&v| v > 1.0) {
        return Err(ValidationError::AboveOne { what });
    }
    if matrix.iter().any(|&v| v < 0.0) {
        return Err(ValidationError::BelowZero { what });
    }
    Ok(())
}

/// Checks a loaded co-clustering matrix for `n` mutations.
///
/// Order of checks: shape, unit diagonal, NaN, infinities, range, symmetry.
pub fn validate_ccm(ccm: ArrayView2<f64>, n: usize) -> Result<(), ValidationError> {
    if ccm.dim() != (n, n) {
        return Err(ValidationError::Shape {
            what: "co-clustering matrix",
            found: ccm.dim(),
            expected: (n, n),
        });
    }
    if !ccm.diag().iter().all(|&d| is_close(d, 1.0)) {
        return Err(ValidationError::Diagonal {
            what: CO_CLUSTERING,
            expected: 1.0,
        });
    }
    check_entries(ccm, CO_CLUSTERING)?;
    if !is_symmetric(ccm) {
        return Err(ValidationError::NotSymmetric {
            what: CO_CLUSTERING,
        });
    }
    Ok(())
}

/// Checks an ancestor-descendant matrix against the already validated CCM.
pub fn validate_ad(ad: ArrayView2<f64>, ccm: ArrayView2<f64>) -> Result<(), ValidationError> {
    if ad.dim() != ccm.dim() {
        return Err(ValidationError::Shape {
            what: "AD matrix",
            found: ad.dim(),
            expected: ccm.dim(),
        });
    }
    if !ad.diag().iter().all(|&d| is_close(d, 0.0)) {
        return Err(ValidationError::Diagonal {
            what: ANCESTRY,
            expected: 0.0,
        });
    }
    check_entries(ad, ANCESTRY)?;
    if violates_relationship_sum(ad, ccm) {
        return Err(ValidationError::RelationshipSum);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn assignment_parses_and_checks_ids() {
        let assignment = validate_assignment("1\n1\n\n2\n", 3).unwrap();
        assert_eq!(assignment.labels(), &[1, 1, 2]);
        assert_eq!(assignment.num_clusters(), 2);

        assert!(matches!(
            validate_assignment("1\n2\n", 3),
            Err(ValidationError::LineCount {
                found: 2,
                expected: 3
            })
        ));
        assert!(matches!(
            validate_assignment("1\nx\n", 2),
            Err(ValidationError::LineNotInteger { line: 2, .. })
        ));
        let err = validate_assignment("1\n3\n", 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cluster IDs used (1, 3) is not what is expected (1, 2)"
        );
    }

    #[test]
    fn tree_builds_chain_ad() {
        let assignment = validate_assignment("1\n1\n2", 3).unwrap();
        let ad = validate_tree("1\t0\n2\t1\n", &assignment).unwrap();
        assert_eq!(
            ad,
            array![[0.0, 0.0, 1.0], [0.0, 0.0, 1.0], [0.0, 0.0, 0.0]]
        );
    }

    #[test]
    fn tree_rejects_malformed_files() {
        let assignment = validate_assignment("1\n2\n3", 3).unwrap();
        assert!(matches!(
            validate_tree("1\t0\n2\t1\n", &assignment),
            Err(ValidationError::LineCount { .. })
        ));
        assert!(matches!(
            validate_tree("1\t0\n2 1\n3\t1\n", &assignment),
            Err(ValidationError::ColumnCount { line: 2, .. })
        ));
        assert!(matches!(
            validate_tree("1\t0\n3\t1\n2\t1\n", &assignment),
            Err(ValidationError::TreeOrder { clusters: 3 })
        ));
        assert!(matches!(
            validate_tree("1\t0\n2\t4\n3\t1\n", &assignment),
            Err(ValidationError::InvalidParent { line: 2 })
        ));
        assert!(matches!(
            validate_tree("1\t0\n2\t3\n3\t2\n", &assignment),
            Err(ValidationError::CyclicPhylogeny { .. })
        ));
    }

    #[test]
    fn ccm_checks_run_in_order() {
        let good = array![[1.0, 0.5], [0.5, 1.0]];
        validate_ccm(good.view(), 2).unwrap();

        assert!(matches!(
            validate_ccm(good.view(), 3),
            Err(ValidationError::Shape { .. })
        ));
        let bad_diag = array![[0.9, 0.5], [0.5, 1.0]];
        assert!(matches!(
            validate_ccm(bad_diag.view(), 2),
            Err(ValidationError::Diagonal { .. })
        ));
        let nan = array![[1.0, f64::NAN], [0.5, 1.0]];
        assert!(matches!(
            validate_ccm(nan.view(), 2),
            Err(ValidationError::ContainsNan { .. })
        ));
        let inf = array![[1.0, f64::INFINITY], [0.5, 1.0]];
        assert!(matches!(
            validate_ccm(inf.view(), 2),
            Err(ValidationError::ContainsInfinite { .. })
        ));
        let big = array![[1.0, 1.5], [1.5, 1.0]];
        assert!(matches!(
            validate_ccm(big.view(), 2),
            Err(ValidationError::AboveOne { .. })
        ));
        let negative = array![[1.0, -0.5], [-0.5, 1.0]];
        assert!(matches!(
            validate_ccm(negative.view(), 2),
            Err(ValidationError::BelowZero { .. })
        ));
        let asym = array![[1.0, 0.2], [0.5, 1.0]];
        let err = validate_ccm(asym.view(), 2).unwrap_err();
        assert_eq!(err.to_string(), "Co-clustering matrix is not symmetric");
    }

    #[test]
    fn ad_must_respect_relationship_sum() {
        let ccm = array![[1.0, 0.5], [0.5, 1.0]];
        let ok = array![[0.0, 0.25], [0.25, 0.0]];
        validate_ad(ok.view(), ccm.view()).unwrap();

        let too_much = array![[0.0, 0.5], [0.25, 0.0]];
        assert!(matches!(
            validate_ad(too_much.view(), ccm.view()),
            Err(ValidationError::RelationshipSum)
        ));
        let diag = array![[0.5, 0.0], [0.0, 0.0]];
        assert!(matches!(
            validate_ad(diag.view(), ccm.view()),
            Err(ValidationError::Diagonal { .. })
        ));
    }
}
