// ========================================================================================
//
//                          Pairwise relationship-matrix metrics
//
// ========================================================================================
//
// Every metric compares a predicted matrix against a truth matrix of the same shape and
// returns a scalar. They read entries straight out of the (possibly strided) views and
// accumulate row by row; the only full-size temporaries are the rank vectors of the
// Spearman coefficient and the score/label pairs of the precision-recall curve.
//
// Degenerate inputs (constant rows, empty label sets) are not repaired here. Callers that
// need well-posed inputs augment both matrices with pseudo counts first.

use crate::config::ConfigError;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Smoothing weight mixed into every entry before the row divergences.
pub const DEFAULT_RND: f64 = 0.01;

/// Upper bound used to squash the raw pseudo-V divergence into [0, 1].
pub const PSEUDO_V_MAX: f64 = 4000.0;

/// Upper bound used to squash the symmetric pseudo-V divergence into [0, 1].
pub const SYM_PSEUDO_V_MAX: f64 = 8000.0;

/// Offset added before thresholding probabilistic entries at 0.5, so values sitting
/// exactly on the threshold after rounding noise are classed consistently.
const MCC_EPSILON: f64 = 1e-10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    #[error(
        "Cannot compare a {pred:?} prediction with a {truth:?} truth; both must be square and of the same size."
    )]
    Shape {
        pred: (usize, usize),
        truth: (usize, usize),
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricOptions {
    /// Use the whole matrix rather than the strict upper triangle.
    pub full_matrix: bool,
    /// Smoothing weight for the divergence metrics.
    pub rnd: f64,
}

impl Default for MetricOptions {
    fn default() -> Self {
        Self {
            full_matrix: true,
            rnd: DEFAULT_RND,
        }
    }
}

/// A similarity or divergence between two equally shaped relationship matrices.
pub trait PairwiseMetric {
    fn evaluate(
        &self,
        pred: ArrayView2<f64>,
        truth: ArrayView2<f64>,
        options: &MetricOptions,
    ) -> Result<f64, MetricError>;

    /// Divergences grow as predictions get worse; correlations shrink.
    fn larger_is_worse(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "orig")]
    Orig,
    #[serde(rename = "sqrt")]
    Sqrt,
    #[serde(rename = "pseudoV")]
    PseudoV,
    #[serde(rename = "sym_pseudoV")]
    SymPseudoV,
    #[serde(rename = "pseudoV_norm")]
    PseudoVNorm,
    #[serde(rename = "sym_pseudoV_norm")]
    SymPseudoVNorm,
    #[serde(rename = "spearman")]
    Spearman,
    #[serde(rename = "pearson")]
    Pearson,
    #[serde(rename = "aupr")]
    Aupr,
    #[serde(rename = "mcc")]
    Mcc,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::Orig,
        Metric::Sqrt,
        Metric::PseudoV,
        Metric::SymPseudoV,
        Metric::PseudoVNorm,
        Metric::SymPseudoVNorm,
        Metric::Spearman,
        Metric::Pearson,
        Metric::Aupr,
        Metric::Mcc,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Orig => "orig",
            Metric::Sqrt => "sqrt",
            Metric::PseudoV => "pseudoV",
            Metric::SymPseudoV => "sym_pseudoV",
            Metric::PseudoVNorm => "pseudoV_norm",
            Metric::SymPseudoVNorm => "sym_pseudoV_norm",
            Metric::Spearman => "spearman",
            Metric::Pearson => "pearson",
            Metric::Aupr => "aupr",
            Metric::Mcc => "mcc",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|metric| metric.name() == s.trim())
            .ok_or_else(|| ConfigError::UnknownMetric(s.to_string()))
    }
}

impl PairwiseMetric for Metric {
    fn evaluate(
        &self,
        pred: ArrayView2<f64>,
        truth: ArrayView2<f64>,
        options: &MetricOptions,
    ) -> Result<f64, MetricError> {
        if pred.dim() != truth.dim() || truth.nrows() != truth.ncols() {
            return Err(MetricError::Shape {
                pred: pred.dim(),
                truth: truth.dim(),
            });
        }
        let full = options.full_matrix;
        Ok(match self {
            Metric::Orig => orig(pred, truth, full),
            Metric::Sqrt => sqrt(pred, truth, full),
            Metric::PseudoV => pseudo_v(pred, truth, options.rnd, full),
            Metric::SymPseudoV => sym_pseudo_v(pred, truth, options.rnd, full),
            Metric::PseudoVNorm => pseudo_v_norm(pred, truth, options),
            Metric::SymPseudoVNorm => sym_pseudo_v_norm(pred, truth, options),
            Metric::Spearman => spearman(pred, truth, full),
            Metric::Pearson => pearson(pred, truth, full),
            Metric::Aupr => aupr(pred, truth, full),
            Metric::Mcc => mcc(pred, truth, full),
        })
    }

    fn larger_is_worse(&self) -> bool {
        matches!(self, Metric::PseudoV | Metric::SymPseudoV)
    }
}

// ========================================================================================
//                                   Entry traversal
// ========================================================================================

/// Column range visited in row `i`: everything, or only `j > i`.
#[inline]
fn columns(i: usize, n: usize, full_matrix: bool) -> std::ops::Range<usize> {
    if full_matrix { 0..n } else { (i + 1).min(n)..n }
}

/// Row-major `(pred, truth)` pairs over the selected region.
fn paired_entries<'p, 't>(
    pred: ArrayView2<'p, f64>,
    truth: ArrayView2<'t, f64>,
    full_matrix: bool,
) -> impl Iterator<Item = (f64, f64)> {
    let n = truth.nrows();
    (0..n).flat_map(move |i| {
        columns(i, n, full_matrix).map(move |j| (pred[[i, j]], truth[[i, j]]))
    })
}

fn entry_count(n: usize, full_matrix: bool) -> f64 {
    let n = n as f64;
    if full_matrix { n * n } else { n * (n - 1.0) / 2.0 }
}

// ========================================================================================
//                                 Absolute difference
// ========================================================================================

/// Off-diagonal pair count used as the denominator of the absolute-difference metrics.
fn pair_count(n: usize, full_matrix: bool) -> f64 {
    let n = n as f64;
    let count = n * n - n;
    if full_matrix { count } else { count / 2.0 }
}

fn mean_abs_difference(pred: ArrayView2<f64>, truth: ArrayView2<f64>, full_matrix: bool) -> f64 {
    let total: f64 = paired_entries(pred, truth, full_matrix)
        .map(|(p, t)| (p - t).abs())
        .sum();
    total / pair_count(truth.nrows(), full_matrix)
}

/// `1 - mean |pred - truth|` over off-diagonal pairs.
pub fn orig(pred: ArrayView2<f64>, truth: ArrayView2<f64>, full_matrix: bool) -> f64 {
    1.0 - mean_abs_difference(pred, truth, full_matrix)
}

/// Square root of [`orig`].
pub fn sqrt(pred: ArrayView2<f64>, truth: ArrayView2<f64>, full_matrix: bool) -> f64 {
    (1.0 - mean_abs_difference(pred, truth, full_matrix)).sqrt()
}

// ========================================================================================
//                                 Pseudo-V divergence
// ========================================================================================

/// Fills `out` with row `i` restricted to the selected region, smoothed and
/// renormalised to sum to one. Entries outside the region count as zero.
fn smoothed_row(matrix: ArrayView2<f64>, i: usize, rnd: f64, full_matrix: bool, out: &mut [f64]) {
    let n = matrix.ncols();
    let kept = columns(i, n, full_matrix);
    let mut total = 0.0;
    for (j, slot) in out.iter_mut().enumerate() {
        let value = if kept.contains(&j) { matrix[[i, j]] } else { 0.0 };
        *slot = (1.0 - rnd) * value + rnd;
        total += *slot;
    }
    for slot in out.iter_mut() {
        *slot /= total;
    }
}

fn row_divergence(
    pred: ArrayView2<f64>,
    truth: ArrayView2<f64>,
    rnd: f64,
    full_matrix: bool,
    symmetric: bool,
) -> f64 {
    let n = truth.ncols();
    let mut pred_row = vec![0.0; n];
    let mut truth_row = vec![0.0; n];
    let mut result = 0.0;
    for i in 0..truth.nrows() {
        smoothed_row(pred, i, rnd, full_matrix, &mut pred_row);
        smoothed_row(truth, i, rnd, full_matrix, &mut truth_row);
        for (&p, &t) in pred_row.iter().zip(&truth_row) {
            let log_ratio = (t / p).ln();
            result += t * log_ratio;
            if symmetric {
                result -= p * log_ratio;
            }
        }
    }
    result
}

/// Sum over rows of `KL(truth_row || pred_row)` after smoothing each row into a
/// distribution. Zero for identical inputs, larger is worse.
pub fn pseudo_v(pred: ArrayView2<f64>, truth: ArrayView2<f64>, rnd: f64, full_matrix: bool) -> f64 {
    row_divergence(pred, truth, rnd, full_matrix, false)
}

/// Two-way form of [`pseudo_v`]: `KL(truth || pred) + KL(pred || truth)` per row.
pub fn sym_pseudo_v(
    pred: ArrayView2<f64>,
    truth: ArrayView2<f64>,
    rnd: f64,
    full_matrix: bool,
) -> f64 {
    row_divergence(pred, truth, rnd, full_matrix, true)
}

/// `max(1 - pseudo_v / 4000, 0)`.
pub fn pseudo_v_norm(pred: ArrayView2<f64>, truth: ArrayView2<f64>, options: &MetricOptions) -> f64 {
    let value = pseudo_v(pred, truth, options.rnd, options.full_matrix);
    (1.0 - value / PSEUDO_V_MAX).max(0.0)
}

/// `max(1 - sym_pseudo_v / 8000, 0)`.
pub fn sym_pseudo_v_norm(
    pred: ArrayView2<f64>,
    truth: ArrayView2<f64>,
    options: &MetricOptions,
) -> f64 {
    let value = sym_pseudo_v(pred, truth, options.rnd, options.full_matrix);
    (1.0 - value / SYM_PSEUDO_V_MAX).max(0.0)
}

// ========================================================================================
//                                    Correlations
// ========================================================================================

/// 1-based ranks with ties sharing the average of the ranks they span.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_unstable_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end hold ranks start+1..=end
        let rank = (start + end + 1) as f64 / 2.0;
        for &index in &order[start..end] {
            ranks[index] = rank;
        }
        start = end;
    }
    ranks
}

/// Spearman's rho from squared rank differences, `1 - 6 sum(d^2) / (N (N^2 - 1))`.
///
/// The differences are scaled by `1/sqrt(N)` before squaring so the sum stays small
/// for matrices with hundreds of millions of entries. Working from rank differences
/// rather than the covariance of ranks keeps the value defined when one input is
/// constant.
pub fn spearman(pred: ArrayView2<f64>, truth: ArrayView2<f64>, full_matrix: bool) -> f64 {
    let (pred_values, truth_values): (Vec<f64>, Vec<f64>) =
        paired_entries(pred, truth, full_matrix).unzip();
    let pred_ranks = average_ranks(&pred_values);
    drop(pred_values);
    let truth_ranks = average_ranks(&truth_values);
    drop(truth_values);

    let count = truth_ranks.len() as f64;
    let scale = count.sqrt();
    let squared: f64 = truth_ranks
        .iter()
        .zip(&pred_ranks)
        .map(|(&t, &p)| {
            let d = (t - p) / scale;
            d * d
        })
        .sum();
    1.0 - 6.0 * squared / (count * count - 1.0)
}

/// Pearson correlation of the flattened entries, accumulated in two streamed passes.
///
/// Standard deviations use the `N - 1` denominator, where `N` is the number of entries
/// visited (`n^2` for the full matrix).
pub fn pearson(pred: ArrayView2<f64>, truth: ArrayView2<f64>, full_matrix: bool) -> f64 {
    let count = entry_count(truth.nrows(), full_matrix);

    let (pred_sum, truth_sum) = paired_entries(pred, truth, full_matrix)
        .fold((0.0, 0.0), |(ps, ts), (p, t)| (ps + p, ts + t));
    let pred_mean = pred_sum / count;
    let truth_mean = truth_sum / count;

    let mut pred_ss = 0.0;
    let mut truth_ss = 0.0;
    let mut cross = 0.0;
    for (p, t) in paired_entries(pred, truth, full_matrix) {
        let dp = p - pred_mean;
        let dt = t - truth_mean;
        pred_ss += dp * dp;
        truth_ss += dt * dt;
        cross += dp * dt;
    }
    let pred_sd = (pred_ss / (count - 1.0)).sqrt();
    let truth_sd = (truth_ss / (count - 1.0)).sqrt();
    cross / (pred_sd * truth_sd) / (count - 1.0)
}

// ========================================================================================
//                                   Classification
// ========================================================================================

#[inline]
fn is_positive(value: f64) -> bool {
    value + MCC_EPSILON > 0.5
}

/// Area under the precision-recall curve, truth entries as labels and predicted
/// entries as scores.
///
/// One curve point is taken per distinct score threshold (descending), the curve is
/// truncated at the first threshold reaching full recall, and `(recall 0, precision 1)`
/// is prepended before trapezoidal integration. Returns NaN when the truth has no
/// positive entries.
pub fn aupr(pred: ArrayView2<f64>, truth: ArrayView2<f64>, full_matrix: bool) -> f64 {
    let mut scored: Vec<(f64, bool)> = paired_entries(pred, truth, full_matrix)
        .map(|(p, t)| (p, is_positive(t)))
        .collect();
    scored.sort_unstable_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    let positives = scored.iter().filter(|(_, label)| *label).count() as f64;
    if positives == 0.0 {
        return f64::NAN;
    }

    let mut area = 0.0;
    let (mut last_recall, mut last_precision) = (0.0, 1.0);
    let (mut tp, mut fp) = (0.0, 0.0);
    let mut index = 0;
    while index < scored.len() {
        let threshold = scored[index].0;
        while index < scored.len() && scored[index].0 == threshold {
            if scored[index].1 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            index += 1;
        }
        let precision = tp / (tp + fp);
        let recall = tp / positives;
        area += (recall - last_recall) * (precision + last_precision) / 2.0;
        last_recall = recall;
        last_precision = precision;
        if tp == positives {
            break;
        }
    }
    area
}

/// Confusion-matrix counts accumulated over the selected region.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfusionCounts {
    pub tp: f64,
    pub tn: f64,
    pub fp: f64,
    pub fn_count: f64,
}

impl ConfusionCounts {
    pub fn tally(pred: ArrayView2<f64>, truth: ArrayView2<f64>, full_matrix: bool) -> Self {
        // 0 = tn, 1 = fp, 2 = fn, 3 = tp: truth + (truth | pred) + (truth & pred)
        let mut bins = [0u64; 4];
        for (p, t) in paired_entries(pred, truth, full_matrix) {
            let truth_bit = is_positive(t);
            let pred_bit = is_positive(p);
            let code = truth_bit as usize
                + (truth_bit | pred_bit) as usize
                + (truth_bit & pred_bit) as usize;
            bins[code] += 1;
        }
        Self {
            tn: bins[0] as f64,
            fp: bins[1] as f64,
            fn_count: bins[2] as f64,
            tp: bins[3] as f64,
        }
    }

    /// Matthews correlation coefficient.
    ///
    /// Zero factors of the denominator are replaced by 1. When the truth has no
    /// positives the numerator becomes `tn - fp`, and when it has no negatives
    /// `tp - fn`.
    pub fn mcc(&self) -> f64 {
        let Self {
            tp,
            tn,
            fp,
            fn_count,
        } = *self;
        let denominator: f64 = [tp + fp, tp + fn_count, tn + fp, tn + fn_count]
            .into_iter()
            .map(|term| if term == 0.0 { 1.0 } else { term })
            .product::<f64>()
            .sqrt();

        let numerator = if tp == 0.0 && fn_count == 0.0 {
            tn - fp
        } else if tn == 0.0 && fp == 0.0 {
            tp - fn_count
        } else {
            tp * tn - fp * fn_count
        };
        numerator / denominator
    }
}

/// Matthews correlation coefficient with predictions and truth thresholded at 0.5.
pub fn mcc(pred: ArrayView2<f64>, truth: ArrayView2<f64>, full_matrix: bool) -> f64 {
    ConfusionCounts::tally(pred, truth, full_matrix).mcc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pseudo::add_pseudo_counts;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    fn two_cluster_ccm() -> Array2<f64> {
        array![
            [1.0, 1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 1.0],
            [0.0, 0.0, 1.0, 1.0]
        ]
    }

    #[test]
    fn metric_names_round_trip() {
        for metric in Metric::ALL {
            assert_eq!(metric.name().parse::<Metric>().unwrap(), metric);
        }
        assert!(matches!(
            "kendall".parse::<Metric>(),
            Err(ConfigError::UnknownMetric(name)) if name == "kendall"
        ));
        assert!(Metric::SymPseudoV.larger_is_worse());
        assert!(!Metric::Mcc.larger_is_worse());
    }

    #[test]
    fn identical_matrices_score_perfectly() {
        let (truth, _) = add_pseudo_counts(two_cluster_ccm(), None, None);
        let options = MetricOptions::default();
        for metric in Metric::ALL {
            let value = metric.evaluate(truth.view(), truth.view(), &options).unwrap();
            let expected = if metric.larger_is_worse() { 0.0 } else { 1.0 };
            assert_abs_diff_eq!(value, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn orig_counts_off_diagonal_pairs() {
        let truth = two_cluster_ccm();
        let pred = Array2::<f64>::eye(4);
        // 4 of the 12 off-diagonal entries differ by one
        assert_abs_diff_eq!(orig(pred.view(), truth.view(), true), 1.0 - 4.0 / 12.0);
        assert_abs_diff_eq!(orig(pred.view(), truth.view(), false), 1.0 - 2.0 / 6.0);
        assert_abs_diff_eq!(
            sqrt(pred.view(), truth.view(), true),
            (1.0 - 4.0 / 12.0_f64).sqrt()
        );
    }

    #[test]
    fn pseudo_v_matches_manual_row_divergence() {
        let truth = array![[1.0, 0.0], [0.0, 1.0]];
        let pred = array![[1.0, 1.0], [1.0, 1.0]];
        let rnd = 0.01;
        // truth row: [1, 0.01] / 1.01, pred row: [0.5, 0.5]
        let t = [1.0_f64 / 1.01, 0.01 / 1.01];
        let row: f64 = t.iter().map(|&x| x * (x / 0.5).ln()).sum();
        assert_abs_diff_eq!(pseudo_v(pred.view(), truth.view(), rnd, true), 2.0 * row, epsilon = 1e-12);

        let sym_row: f64 = t.iter().map(|&x| (x - 0.5) * (x / 0.5).ln()).sum();
        assert_abs_diff_eq!(
            sym_pseudo_v(pred.view(), truth.view(), rnd, true),
            2.0 * sym_row,
            epsilon = 1e-12
        );
    }

    #[test]
    fn pseudo_v_upper_triangle_ignores_lower_entries() {
        let truth = array![[1.0, 1.0, 0.0], [1.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let mut pred = truth.clone();
        pred[[2, 0]] = 1.0;
        pred[[2, 1]] = 1.0;
        assert_eq!(pseudo_v(pred.view(), truth.view(), DEFAULT_RND, false), 0.0);
        assert!(pseudo_v(pred.view(), truth.view(), DEFAULT_RND, true) > 0.0);
    }

    #[test]
    fn normalised_divergences_are_floored() {
        let truth = two_cluster_ccm();
        let options = MetricOptions::default();
        assert_eq!(pseudo_v_norm(truth.view(), truth.view(), &options), 1.0);
        assert_eq!(sym_pseudo_v_norm(truth.view(), truth.view(), &options), 1.0);
        let far = pseudo_v_norm(Array2::zeros((4, 4)).view(), truth.view(), &options);
        assert!((0.0..1.0).contains(&far));
    }

    #[test]
    fn average_ranks_share_ties() {
        assert_eq!(average_ranks(&[3.0, 1.0, 3.0, 2.0]), vec![3.5, 1.0, 3.5, 2.0]);
        assert_eq!(average_ranks(&[0.0, 0.0, 0.0]), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn spearman_matches_textbook_formula() {
        let truth = array![[1.0, 2.0], [3.0, 4.0]];
        let pred = array![[4.0, 3.0], [2.0, 1.0]];
        assert_abs_diff_eq!(spearman(pred.view(), truth.view(), true), -1.0, epsilon = 1e-12);
        let pred = array![[1.0, 3.0], [2.0, 4.0]];
        // d = [0, -1, 1, 0], rho = 1 - 6*2/(4*15)
        assert_abs_diff_eq!(spearman(pred.view(), truth.view(), true), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn spearman_stays_finite_for_constant_prediction() {
        let truth = two_cluster_ccm();
        let pred = Array2::<f64>::ones((4, 4));
        assert!(spearman(pred.view(), truth.view(), true).is_finite());
    }

    #[test]
    fn pearson_matches_direct_computation() {
        let truth = array![[1.0, 0.2, 0.0], [0.2, 1.0, 0.7], [0.0, 0.7, 1.0]];
        let pred = array![[1.0, 0.5, 0.1], [0.5, 1.0, 0.4], [0.1, 0.4, 1.0]];
        let p: Vec<f64> = pred.iter().copied().collect();
        let t: Vec<f64> = truth.iter().copied().collect();
        let mp = p.iter().sum::<f64>() / 9.0;
        let mt = t.iter().sum::<f64>() / 9.0;
        let cov: f64 = p.iter().zip(&t).map(|(a, b)| (a - mp) * (b - mt)).sum();
        let vp: f64 = p.iter().map(|a| (a - mp).powi(2)).sum();
        let vt: f64 = t.iter().map(|b| (b - mt).powi(2)).sum();
        let expected = cov / (vp * vt).sqrt();
        assert_abs_diff_eq!(pearson(pred.view(), truth.view(), true), expected, epsilon = 1e-12);

        let upper = pearson(pred.view(), truth.view(), false);
        let pu = [0.5, 0.1, 0.4];
        let tu = [0.2, 0.0, 0.7];
        let mpu = pu.iter().sum::<f64>() / 3.0;
        let mtu = tu.iter().sum::<f64>() / 3.0;
        let covu: f64 = pu.iter().zip(&tu).map(|(a, b)| (a - mpu) * (b - mtu)).sum();
        let vpu: f64 = pu.iter().map(|a| (a - mpu).powi(2)).sum();
        let vtu: f64 = tu.iter().map(|b| (b - mtu).powi(2)).sum();
        assert_abs_diff_eq!(upper, covu / (vpu * vtu).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn aupr_of_perfect_and_uninformative_scores() {
        let truth = two_cluster_ccm();
        assert_abs_diff_eq!(aupr(truth.view(), truth.view(), true), 1.0);

        // every score tied: one point at (recall 1, precision 8/16)
        let flat = Array2::from_elem((4, 4), 0.5);
        assert_abs_diff_eq!(aupr(flat.view(), truth.view(), true), 0.75, epsilon = 1e-12);

        assert!(aupr(truth.view(), Array2::zeros((4, 4)).view(), true).is_nan());
    }

    #[test]
    fn mcc_counts_and_value() {
        let truth = two_cluster_ccm();
        let pred = Array2::<f64>::eye(4);
        let counts = ConfusionCounts::tally(pred.view(), truth.view(), true);
        assert_eq!(
            counts,
            ConfusionCounts {
                tp: 4.0,
                tn: 8.0,
                fp: 0.0,
                fn_count: 4.0
            }
        );
        let expected = (4.0 * 8.0) / (4.0_f64 * 8.0 * 8.0 * 12.0).sqrt();
        assert_abs_diff_eq!(mcc(pred.view(), truth.view(), true), expected, epsilon = 1e-12);
    }

    #[test]
    fn mcc_thresholds_probabilities_at_one_half() {
        let truth = array![[1.0, 0.0], [0.0, 1.0]];
        let pred = array![[0.5, 0.4999], [0.2, 0.9]];
        let counts = ConfusionCounts::tally(pred.view(), truth.view(), true);
        assert_eq!(counts.tp, 2.0);
        assert_eq!(counts.tn, 2.0);
    }

    #[test]
    fn mcc_degenerate_truth_uses_reduced_numerator() {
        // no positives in truth: numerator tn - fp, zero denominator terms forced to 1
        let truth = Array2::<f64>::zeros((2, 2));
        let pred = array![[1.0, 0.0], [0.0, 0.0]];
        let counts = ConfusionCounts::tally(pred.view(), truth.view(), true);
        assert_eq!(counts.tn, 3.0);
        assert_eq!(counts.fp, 1.0);
        let expected = (3.0 - 1.0) / (1.0_f64 * 1.0 * 4.0 * 3.0).sqrt();
        assert_abs_diff_eq!(counts.mcc(), expected, epsilon = 1e-12);

        // no negatives in truth: numerator tp - fn
        let truth = Array2::<f64>::ones((2, 2));
        let counts = ConfusionCounts::tally(pred.view(), truth.view(), true);
        let expected = (1.0 - 3.0) / (1.0_f64 * 4.0 * 1.0 * 3.0).sqrt();
        assert_abs_diff_eq!(counts.mcc(), expected, epsilon = 1e-12);
    }

    #[test]
    fn transposed_views_are_accepted() {
        let ad = array![[0.0, 1.0, 1.0], [0.0, 0.0, 1.0], [0.0, 0.0, 0.0]];
        let value = Metric::SymPseudoV.evaluate(ad.t(), ad.t(), &MetricOptions::default());
        assert_eq!(value, Ok(0.0));
    }

    #[test]
    fn evaluate_rejects_mismatched_shapes() {
        let truth = Array2::<f64>::eye(4);
        let options = MetricOptions::default();

        let mut larger = Array2::<f64>::eye(5);
        larger[[4, 0]] = 1.0;
        assert_eq!(
            Metric::Orig.evaluate(larger.view(), truth.view(), &options),
            Err(MetricError::Shape {
                pred: (5, 5),
                truth: (4, 4)
            })
        );

        let smaller = Array2::<f64>::eye(3);
        for metric in Metric::ALL {
            assert!(metric.evaluate(smaller.view(), truth.view(), &options).is_err());
        }

        let wide = Array2::<f64>::zeros((4, 5));
        assert!(Metric::Pearson.evaluate(wide.view(), wide.view(), &options).is_err());
    }

    #[test]
    fn normalised_divergences_are_selectable() {
        assert_eq!("pseudoV_norm".parse::<Metric>().unwrap(), Metric::PseudoVNorm);
        assert_eq!("sym_pseudoV_norm".parse::<Metric>().unwrap(), Metric::SymPseudoVNorm);
        assert!(!Metric::SymPseudoVNorm.larger_is_worse());

        let truth = two_cluster_ccm();
        let pred = Array2::<f64>::eye(4);
        let options = MetricOptions::default();
        assert_eq!(
            Metric::PseudoVNorm.evaluate(pred.view(), truth.view(), &options),
            Ok(pseudo_v_norm(pred.view(), truth.view(), &options))
        );
        assert_eq!(
            Metric::SymPseudoVNorm.evaluate(pred.view(), truth.view(), &options),
            Ok(sym_pseudo_v_norm(pred.view(), truth.view(), &options))
        );
    }
}
