//! # Subchallenge 1: scalar clonal summaries
//!
//! Cellularity (1A), number of lineages (1B) and the small cluster table (1C) are scored
//! directly from their values; none of them needs the matrix machinery.

use crate::validate::{ValidationError, content_lines};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub const MAX_LINEAGES: i64 = 20;
pub const MAX_TABLE_CLUSTERS: usize = 10;

/// Error penalty for 1A and 1C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Penalty {
    #[default]
    Abs,
    Sqr,
}

impl Penalty {
    #[inline]
    fn apply(self, truth: f64, pred: f64) -> f64 {
        match self {
            Penalty::Abs => (truth - pred).abs(),
            Penalty::Sqr => (truth - pred).powi(2),
        }
    }
}

/// Scoring rule for 1B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineageMethod {
    #[default]
    Normalized,
    /// Relative error; smaller is better.
    Orig,
}

fn single_line(text: &str) -> Result<&str, ValidationError> {
    let lines = content_lines(text);
    match lines.as_slice() {
        [] => Err(ValidationError::EmptyInput),
        [line] => Ok(*line),
        _ => Err(ValidationError::MultipleLines),
    }
}

/// Checks a fraction is finite and within [0, 1].
fn check_fraction(value: f64, what: impl Fn() -> String) -> Result<f64, ValidationError> {
    if value.is_infinite() {
        return Err(ValidationError::NonFinite { what: what() });
    }
    if value.is_nan() {
        return Err(ValidationError::NotANumber { what: what() });
    }
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::OutOfRange {
            what: what(),
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(value)
}

// ========================================================================================
//                                    1A: cellularity
// ========================================================================================

pub fn validate_cellularity(text: &str) -> Result<f64, ValidationError> {
    let line = single_line(text)?;
    let value: f64 = line
        .parse()
        .map_err(|_| ValidationError::NotFloat(line.to_string()))?;
    check_fraction(value, || "Cellularity".to_string())
}

pub fn score_cellularity(pred: f64, truth: f64, penalty: Penalty) -> f64 {
    1.0 - penalty.apply(truth, pred)
}

// ========================================================================================
//                                 1B: number of lineages
// ========================================================================================

pub fn validate_lineage_count(text: &str) -> Result<i64, ValidationError> {
    let line = single_line(text)?;
    let value: i64 = line
        .parse()
        .map_err(|_| ValidationError::NotInteger(line.to_string()))?;
    if !(1..=MAX_LINEAGES).contains(&value) {
        return Err(ValidationError::OutOfRange {
            what: "Number of lineages".to_string(),
            value: value as f64,
            min: 1.0,
            max: MAX_LINEAGES as f64,
        });
    }
    Ok(value)
}

pub fn score_lineage_count(pred: i64, truth: i64, method: LineageMethod) -> f64 {
    let (pred, truth) = (pred as f64, truth as f64);
    match method {
        LineageMethod::Normalized => {
            (truth + 1.0 - (truth + 1.0).min((pred - truth).abs())) / (truth + 1.0)
        }
        LineageMethod::Orig => (truth - pred).abs() / truth,
    }
}

// ========================================================================================
//                                  1C: cluster table
// ========================================================================================

/// One row of the 1C table: how many mutations a cluster holds and its cellular fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSummary {
    pub mutations: usize,
    pub fraction: f64,
}

/// Parses `id<TAB>mutations<TAB>fraction` lines; the counts must add up to `total`.
pub fn validate_cluster_table(
    text: &str,
    total: usize,
) -> Result<Vec<ClusterSummary>, ValidationError> {
    let lines = content_lines(text);
    if lines.is_empty() || lines.len() > MAX_TABLE_CLUSTERS {
        return Err(ValidationError::LineCountRange {
            found: lines.len(),
            min: 1,
            max: MAX_TABLE_CLUSTERS,
        });
    }

    let mut table = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        let number = index + 1;
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(ValidationError::ColumnCount {
                line: number,
                found: fields.len(),
                expected: 3,
            });
        }
        let id: usize = fields[0]
            .parse()
            .map_err(|_| ValidationError::LineNotInteger {
                line: number,
                content: fields[0].to_string(),
            })?;
        if id != number {
            return Err(ValidationError::ClusterIdOrder {
                line: number,
                expected: number,
            });
        }
        let mutations: i64 = fields[1]
            .parse()
            .map_err(|_| ValidationError::LineNotInteger {
                line: number,
                content: fields[1].to_string(),
            })?;
        if mutations < 1 {
            return Err(ValidationError::EmptyCluster { line: number });
        }
        let fraction: f64 = fields[2]
            .parse()
            .map_err(|_| ValidationError::LineNotFloat {
                line: number,
                content: fields[2].to_string(),
            })?;
        let fraction = check_fraction(fraction, || {
            format!("Cellular Frequency for cluster {number}")
        })?;
        table.push(ClusterSummary {
            mutations: mutations as usize,
            fraction,
        });
    }

    let reported: usize = table.iter().map(|row| row.mutations).sum();
    if reported != total {
        return Err(ValidationError::MutationTotal {
            reported,
            expected: total,
        });
    }
    Ok(table)
}

/// Per-mutation fractions with clusters ordered by fraction.
fn expand_by_fraction(table: &[ClusterSummary]) -> Vec<f64> {
    table
        .iter()
        .sorted_by(|a, b| a.fraction.total_cmp(&b.fraction))
        .flat_map(|row| std::iter::repeat_n(row.fraction, row.mutations))
        .collect()
}

/// Mean of `1 - error` over mutations after pairing both tables in fraction order.
///
/// Both tables must account for the same number of mutations; validation against the
/// VCF guarantees that for submitted files.
pub fn score_cluster_table(
    pred: &[ClusterSummary],
    truth: &[ClusterSummary],
    penalty: Penalty,
) -> f64 {
    let pred = expand_by_fraction(pred);
    let truth = expand_by_fraction(truth);
    let total: f64 = truth
        .iter()
        .zip(&pred)
        .map(|(&t, &p)| 1.0 - penalty.apply(t, p))
        .sum();
    total / truth.len() as f64
}
