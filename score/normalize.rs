// ========================================================================================
//
//                      Baseline-relative normalisation and combination
//
// ========================================================================================
//
// A raw metric value only means something next to the values of the trivial baselines
// against the same truth. Each metric is rescaled so that a perfect prediction scores 1
// and the worse of the OneCluster / NCluster baselines scores 0. Scores below zero are
// meaningful (worse than both baselines) and are never clamped.

use crate::baseline::{AncestryBaseline, BaselineSet, Scenario};
use crate::config::{ConfigError, ScoringOptions};
use crate::matrix::cousin;
use crate::metrics::{Metric, MetricError, MetricOptions, PairwiseMetric};
use crate::types::MatrixSelection;
use crate::validate::ValidationError;
use ndarray::{Array2, ArrayView2};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Invalid scoring configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Metric(#[from] MetricError),

    #[error(
        "Matrix shapes do not line up: prediction {pred:?}, truth {truth:?}, expected {expected:?}."
    )]
    ShapeMismatch {
        pred: (usize, usize),
        truth: (usize, usize),
        expected: (usize, usize),
    },

    #[error("Metric {metric} evaluated to NaN for every selected matrix.")]
    UndefinedScore { metric: Metric },

    #[error(
        "Metric {metric} has no finite normalised score: raw {raw}, worst baseline {worst}. The baselines cannot be told apart from the truth."
    )]
    NonFiniteScore { metric: Metric, raw: f64, worst: f64 },

    #[error("At least one scoring metric is required.")]
    NoMetrics,
}

/// Maps `raw` onto the scale where the truth scores 1 and `worst` scores 0.
pub fn normalize_score(raw: f64, worst: f64, larger_is_worse: bool) -> f64 {
    if larger_is_worse {
        1.0 - raw / worst
    } else {
        (raw - worst) / (1.0 - worst)
    }
}

/// [`normalize_score`], failing when the baselines leave the scale undefined.
fn finite_normalized(metric: Metric, raw: f64, worst: f64) -> Result<f64, ScoringError> {
    let normalized = normalize_score(raw, worst, metric.larger_is_worse());
    if normalized.is_finite() {
        Ok(normalized)
    } else {
        Err(ScoringError::NonFiniteScore { metric, raw, worst })
    }
}

/// The worse of the two baseline values in the metric's direction.
pub fn worst_score(one_cluster: f64, n_cluster: f64, larger_is_worse: bool) -> f64 {
    if larger_is_worse {
        one_cluster.max(n_cluster)
    } else {
        one_cluster.min(n_cluster)
    }
}

/// Normalises optional weights to sum to one, defaulting to equal weights.
pub fn normalized_weights(weights: Option<&[f64]>, count: usize) -> Result<Vec<f64>, ConfigError> {
    let equal = || vec![1.0 / count as f64; count];
    let Some(weights) = weights else {
        return Ok(equal());
    };
    if weights.len() != count {
        return Err(ConfigError::WeightsLength {
            expected: count,
            found: weights.len(),
        });
    }
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        log::warn!("Weights sum to zero so they are invalid, defaulting to equal weights.");
        return Ok(equal());
    }
    Ok(weights.iter().map(|w| w / total).collect())
}

fn check_square(
    pred: ArrayView2<f64>,
    truth: ArrayView2<f64>,
    size: usize,
) -> Result<(), ScoringError> {
    let expected = (size, size);
    if pred.dim() != expected || truth.dim() != expected {
        return Err(ScoringError::ShapeMismatch {
            pred: pred.dim(),
            truth: truth.dim(),
            expected,
        });
    }
    Ok(())
}

// ========================================================================================
//                               Co-clustering subchallenges
// ========================================================================================

/// Scores an (augmented) predicted CCM against an (augmented) truth CCM.
///
/// `mutations` is the real mutation count and `pseudo_count` the number of synthetic
/// mutations already appended to both matrices; the baselines are generated and
/// augmented the same way. The normalised metric values are averaged with equal weight.
pub fn score_co_clustering(
    pred: ArrayView2<f64>,
    truth: ArrayView2<f64>,
    mutations: usize,
    pseudo_count: usize,
    metrics: &[Metric],
    options: &MetricOptions,
) -> Result<f64, ScoringError> {
    if metrics.is_empty() {
        return Err(ScoringError::NoMetrics);
    }
    check_square(pred, truth, mutations + pseudo_count)?;

    let baselines: Vec<BaselineSet> = Scenario::ALL
        .iter()
        .map(|&scenario| BaselineSet::generate(mutations, scenario, pseudo_count))
        .collect();

    let mut total = 0.0;
    for metric in metrics {
        let started = Instant::now();
        let raw = metric.evaluate(pred, truth, options)?;
        let one = metric.evaluate(baselines[0].ccm.view(), truth, options)?;
        let many = metric.evaluate(baselines[1].ccm.view(), truth, options)?;
        let worst = worst_score(one, many, metric.larger_is_worse());
        let normalized = finite_normalized(*metric, raw, worst)?;
        log::info!(
            "method {metric}: raw {raw:.6}, OneCluster {one:.6}, NCluster {many:.6}, normalised {normalized:.6} ({:.2}s)",
            started.elapsed().as_secs_f64()
        );
        total += normalized;
    }
    Ok(total / metrics.len() as f64)
}

// ========================================================================================
//                                 Ancestry subchallenges
// ========================================================================================

/// A co-clustering matrix and its ancestor-descendant matrix, borrowed.
#[derive(Debug, Clone, Copy)]
pub struct Reconstruction<'a> {
    pub ccm: ArrayView2<'a, f64>,
    pub ad: ArrayView2<'a, f64>,
}

impl<'a> Reconstruction<'a> {
    pub fn new(ccm: ArrayView2<'a, f64>, ad: ArrayView2<'a, f64>) -> Self {
        Self { ccm, ad }
    }
}

/// A reconstruction plus its cousin matrix, derived once when the selection needs it.
struct Relations<'a> {
    ccm: ArrayView2<'a, f64>,
    ad: ArrayView2<'a, f64>,
    cousin: Option<Array2<f64>>,
}

impl<'a> Relations<'a> {
    fn derive(
        reconstruction: Reconstruction<'a>,
        selection: MatrixSelection,
    ) -> Result<Self, ScoringError> {
        let cousin = if selection.includes_cousin() {
            Some(cousin(reconstruction.ccm, reconstruction.ad)?)
        } else {
            None
        };
        Ok(Self {
            ccm: reconstruction.ccm,
            ad: reconstruction.ad,
            cousin,
        })
    }
}

fn combine_relations(
    metric: Metric,
    pred: &Relations,
    truth: &Relations,
    selection: MatrixSelection,
    options: &MetricOptions,
) -> Result<f64, ScoringError> {
    let mut terms: Vec<(&str, f64)> = Vec::with_capacity(4);
    if selection.includes_ccm() {
        terms.push(("CCM", metric.evaluate(pred.ccm, truth.ccm, options)?));
    }
    if selection.includes_ad() {
        terms.push(("AD", metric.evaluate(pred.ad, truth.ad, options)?));
    }
    if selection.includes_ad_transpose() {
        terms.push(("AD transpose", metric.evaluate(pred.ad.t(), truth.ad.t(), options)?));
    }
    if let (Some(pred_cousin), Some(truth_cousin)) = (&pred.cousin, &truth.cousin) {
        terms.push((
            "cousin",
            metric.evaluate(pred_cousin.view(), truth_cousin.view(), options)?,
        ));
    }

    let mut sum = 0.0;
    let mut valid = 0usize;
    for (name, value) in &terms {
        if value.is_nan() {
            log::warn!("{metric} is undefined for the {name} matrix; dropping it from the average.");
        } else {
            sum += value;
            valid += 1;
        }
    }
    if valid == 0 {
        return Err(ScoringError::UndefinedScore { metric });
    }
    log::debug!("{metric} terms: {terms:?}");
    Ok(sum / valid as f64)
}

/// Averages `metric` over the matrices chosen by `selection`, skipping NaN terms.
///
/// Fails with [`ScoringError::UndefinedScore`] when every term is NaN, and with
/// [`ScoringError::ShapeMismatch`] unless all four matrices share the truth CCM's
/// square shape.
pub fn ancestry_metric(
    metric: Metric,
    pred: Reconstruction,
    truth: Reconstruction,
    selection: MatrixSelection,
    options: &MetricOptions,
) -> Result<f64, ScoringError> {
    let size = truth.ccm.nrows();
    check_square(pred.ccm, truth.ccm, size)?;
    check_square(pred.ad, truth.ad, size)?;
    let pred = Relations::derive(pred, selection)?;
    let truth = Relations::derive(truth, selection)?;
    combine_relations(metric, &pred, &truth, selection, options)
}

/// How the ancestry subchallenges turn several metrics into one score.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinationPlan {
    pub metrics: Vec<Metric>,
    pub weights: Option<Vec<f64>>,
    pub selection: MatrixSelection,
    pub options: MetricOptions,
}

impl Default for CombinationPlan {
    /// Symmetric pseudo-V over AD, AD^T and the cousin matrix.
    fn default() -> Self {
        Self {
            metrics: vec![Metric::SymPseudoV],
            weights: None,
            selection: MatrixSelection::ExcludeCoClustering,
            options: MetricOptions::default(),
        }
    }
}

impl CombinationPlan {
    pub fn from_options(options: &ScoringOptions) -> Result<Self, ConfigError> {
        Ok(Self {
            metrics: options.sc3_metrics()?,
            weights: options.sc3_weights.clone(),
            selection: options.matrix_selection()?,
            options: options.metric_options(),
        })
    }
}

/// Scores a predicted CCM/AD pair against the truth pair.
///
/// Each metric is combined over the selected matrices, normalised against the two
/// baselines (generated for `mutations` and augmented with `pseudo_count`), and the
/// normalised values are averaged with the plan's weights.
pub fn score_ancestry(
    pred: Reconstruction,
    truth: Reconstruction,
    mutations: usize,
    pseudo_count: usize,
    plan: &CombinationPlan,
) -> Result<f64, ScoringError> {
    if plan.metrics.is_empty() {
        return Err(ScoringError::NoMetrics);
    }
    let size = mutations + pseudo_count;
    check_square(pred.ccm, truth.ccm, size)?;
    check_square(pred.ad, truth.ad, size)?;
    let weights = normalized_weights(plan.weights.as_deref(), plan.metrics.len())?;

    let selection = plan.selection;
    let truth = Relations::derive(truth, selection)?;
    let pred = Relations::derive(pred, selection)?;
    let raw: Vec<f64> = plan
        .metrics
        .iter()
        .map(|&metric| combine_relations(metric, &pred, &truth, selection, &plan.options))
        .collect::<Result<_, _>>()?;
    drop(pred);

    let mut baseline_scores: Vec<Vec<f64>> = Vec::with_capacity(Scenario::ALL.len());
    for scenario in Scenario::ALL {
        let set = AncestryBaseline::generate(mutations, scenario, pseudo_count);
        let relations =
            Relations::derive(Reconstruction::new(set.ccm.view(), set.ad.view()), selection)?;
        let scores = plan
            .metrics
            .iter()
            .map(|&metric| combine_relations(metric, &relations, &truth, selection, &plan.options))
            .collect::<Result<Vec<f64>, _>>()?;
        baseline_scores.push(scores);
    }

    let mut score = 0.0;
    for (index, &metric) in plan.metrics.iter().enumerate() {
        let one = baseline_scores[0][index];
        let many = baseline_scores[1][index];
        let worst = worst_score(one, many, metric.larger_is_worse());
        let normalized = finite_normalized(metric, raw[index], worst)?;
        log::info!(
            "method {metric}: raw {:.6}, OneCluster {one:.6}, NCluster {many:.6}, normalised {normalized:.6}",
            raw[index]
        );
        score += weights[index] * normalized;
    }
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::{bad_ad, bad_ccm};
    use crate::matrix::{ClusterAssignment, build_ad_from_tree};
    use crate::pseudo::add_pseudo_counts;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn chain_truth() -> (Array2<f64>, Array2<f64>) {
        let assignment = ClusterAssignment::new(vec![1, 1, 2]).unwrap();
        let ad = build_ad_from_tree(&[(1, 0), (2, 1)], 2, &assignment).unwrap();
        (assignment.co_clustering(), ad)
    }

    fn four_mutation_ccm() -> Array2<f64> {
        array![
            [1.0, 1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0]
        ]
    }

    #[test]
    fn normalisation_fixed_points() {
        assert_eq!(normalize_score(0.0, 5.0, true), 1.0);
        assert_eq!(normalize_score(5.0, 5.0, true), 0.0);
        assert_eq!(normalize_score(1.0, 0.2, false), 1.0);
        assert_eq!(normalize_score(0.2, 0.2, false), 0.0);
        // worse than the worst baseline stays negative
        assert!(normalize_score(10.0, 5.0, true) < 0.0);
        assert_eq!(worst_score(1.0, 2.0, true), 2.0);
        assert_eq!(worst_score(1.0, 2.0, false), 1.0);
    }

    #[test]
    fn weights_are_renormalised() {
        assert_eq!(normalized_weights(None, 4).unwrap(), vec![0.25; 4]);
        assert_eq!(
            normalized_weights(Some(&[3.0, 1.0]), 2).unwrap(),
            vec![0.75, 0.25]
        );
        assert_eq!(normalized_weights(Some(&[0.0, 0.0]), 2).unwrap(), vec![0.5, 0.5]);
        assert!(matches!(
            normalized_weights(Some(&[1.0]), 2),
            Err(ConfigError::WeightsLength {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn truth_against_itself_scores_one_for_every_metric() {
        let (truth, _) = add_pseudo_counts(four_mutation_ccm(), None, None);
        let options = MetricOptions::default();
        for metric in Metric::ALL {
            let score =
                score_co_clustering(truth.view(), truth.view(), 4, 2, &[metric], &options).unwrap();
            assert_abs_diff_eq!(score, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn worse_baseline_scores_zero() {
        let (truth, _) = add_pseudo_counts(four_mutation_ccm(), None, None);
        let options = MetricOptions::default();
        for metric in Metric::ALL {
            let scores: Vec<f64> = Scenario::ALL
                .iter()
                .map(|&scenario| {
                    let (baseline, _) = add_pseudo_counts(bad_ccm(4, scenario), None, Some(2));
                    score_co_clustering(baseline.view(), truth.view(), 4, 2, &[metric], &options)
                        .unwrap()
                })
                .collect();
            assert!(
                scores.iter().any(|s| s.abs() < 1e-9),
                "{metric}: baseline scores {scores:?}"
            );
        }
    }

    #[test]
    fn co_clustering_rejects_mismatched_shapes() {
        let truth = Array2::<f64>::eye(5);
        let pred = Array2::<f64>::eye(4);
        let err = score_co_clustering(
            pred.view(),
            truth.view(),
            4,
            1,
            &[Metric::Pearson],
            &MetricOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScoringError::ShapeMismatch { .. }));
        let err = score_co_clustering(
            truth.view(),
            truth.view(),
            4,
            1,
            &[],
            &MetricOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ScoringError::NoMetrics));
    }

    #[test]
    fn chain_scored_against_itself_is_perfect() {
        let (ccm, ad) = chain_truth();
        let truth = Reconstruction::new(ccm.view(), ad.view());
        let score = score_ancestry(truth, truth, 3, 0, &CombinationPlan::default()).unwrap();
        assert_abs_diff_eq!(score, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn every_selection_scores_truth_perfectly() {
        let (ccm, ad) = chain_truth();
        let (ccm, ad) = add_pseudo_counts(ccm, Some(ad), None);
        let ad = ad.unwrap();
        let truth = Reconstruction::new(ccm.view(), ad.view());
        for in_mat in 1..=5u8 {
            let plan = CombinationPlan {
                metrics: vec![Metric::SymPseudoV, Metric::Pearson, Metric::Orig],
                weights: Some(vec![2.0, 1.0, 1.0]),
                selection: MatrixSelection::try_from(in_mat).unwrap(),
                options: MetricOptions::default(),
            };
            let score = score_ancestry(truth, truth, 3, 2, &plan).unwrap();
            assert_abs_diff_eq!(score, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn baseline_prediction_scores_zero_for_divergence() {
        let (ccm, ad) = chain_truth();
        let truth = Reconstruction::new(ccm.view(), ad.view());
        let scores: Vec<f64> = Scenario::ALL
            .iter()
            .map(|&scenario| {
                let (bad_c, bad_a) = (bad_ccm(3, scenario), bad_ad(3, scenario));
                let pred = Reconstruction::new(bad_c.view(), bad_a.view());
                score_ancestry(pred, truth, 3, 0, &CombinationPlan::default()).unwrap()
            })
            .collect();
        assert!(scores.iter().any(|s| s.abs() < 1e-12), "{scores:?}");
        assert!(scores.iter().all(|s| (-1e-12..=1.0).contains(s)), "{scores:?}");
    }

    #[test]
    fn indistinguishable_baselines_are_an_error() {
        // one mutation plus one pseudo count: both baselines equal the truth
        let (truth, _) = add_pseudo_counts(Array2::<f64>::eye(1), None, None);
        for metric in [Metric::PseudoV, Metric::Pearson, Metric::Mcc] {
            let err = score_co_clustering(
                truth.view(),
                truth.view(),
                1,
                1,
                &[metric],
                &MetricOptions::default(),
            )
            .unwrap_err();
            assert!(
                matches!(err, ScoringError::NonFiniteScore { metric: m, .. } if m == metric),
                "{metric}: {err}"
            );
        }

        let ccm = Array2::<f64>::eye(1);
        let ad = Array2::<f64>::zeros((1, 1));
        let single = Reconstruction::new(ccm.view(), ad.view());
        let err = score_ancestry(single, single, 1, 0, &CombinationPlan::default());
        assert!(matches!(err, Err(ScoringError::NonFiniteScore { .. })));
    }

    #[test]
    fn ancestry_metric_checks_shapes() {
        let (ccm, ad) = chain_truth();
        let truth = Reconstruction::new(ccm.view(), ad.view());
        let options = MetricOptions::default();

        let small_ccm = Array2::<f64>::eye(2);
        let small_ad = Array2::<f64>::zeros((2, 2));
        let smaller = Reconstruction::new(small_ccm.view(), small_ad.view());
        let err = ancestry_metric(Metric::Orig, smaller, truth, MatrixSelection::All, &options);
        assert!(matches!(err, Err(ScoringError::ShapeMismatch { .. })));

        let big_ccm = Array2::<f64>::eye(4);
        let big_ad = Array2::<f64>::zeros((4, 4));
        let larger = Reconstruction::new(big_ccm.view(), big_ad.view());
        let err = ancestry_metric(Metric::Orig, larger, truth, MatrixSelection::All, &options);
        assert!(matches!(err, Err(ScoringError::ShapeMismatch { .. })));

        // CCM matches but the AD does not
        let mixed = Reconstruction::new(ccm.view(), big_ad.view());
        let err = ancestry_metric(
            Metric::Orig,
            mixed,
            truth,
            MatrixSelection::ExcludeCoClustering,
            &options,
        );
        assert!(matches!(err, Err(ScoringError::ShapeMismatch { .. })));
    }

    #[test]
    fn ancestry_metric_drops_nan_terms() {
        // an all-zero AD has no positive entries, so AUPR is NaN for AD and AD^T
        let ccm = Array2::<f64>::eye(3);
        let ad = Array2::<f64>::zeros((3, 3));
        let recon = Reconstruction::new(ccm.view(), ad.view());
        let value = ancestry_metric(
            Metric::Aupr,
            recon,
            recon,
            MatrixSelection::All,
            &MetricOptions::default(),
        )
        .unwrap();
        assert_abs_diff_eq!(value, 1.0);

        let err = ancestry_metric(
            Metric::Aupr,
            recon,
            recon,
            MatrixSelection::ExcludeCousin,
            &MetricOptions {
                full_matrix: false,
                ..MetricOptions::default()
            },
        );
        // strict upper triangle of the identity CCM has no positives either
        assert!(matches!(err, Err(ScoringError::UndefinedScore { .. })));
    }
}
