// ========================================================================================
//
//                          Subchallenge verification and scoring
//
// ========================================================================================
//
// Drives one subchallenge end to end: read the VCF, validate truth and prediction files,
// drop false-positive mutations from the prediction, augment with pseudo counts and hand
// the matrices to the scorers. Problems with input files never abort the process; they
// are appended to an `ErrorLog` and the subchallenge resolves to "NA" or "Invalid".

use crate::clonal::{
    ClusterSummary, score_cellularity, score_cluster_table,
    score_lineage_count, validate_cellularity, validate_cluster_table, validate_lineage_count,
};
use crate::config::{ScoringOptions, TruthEntry};
use crate::io::{is_compressed, read_matrix, read_matrix_in_identity, read_text};
use crate::matrix::{ClusterAssignment, filter_fps, filter_fps_owned};
use crate::normalize::{
    CombinationPlan, Reconstruction, ScoringError, score_ancestry, score_co_clustering,
};
use crate::pseudo::{
    add_pseudo_counts, add_pseudo_counts_with_ancestry, augment_buffer, resolve_pseudo_count,
    warn_constant_rows,
};
use crate::telemetry::checkpoint;
use crate::types::{ChallengeOutcome, Subchallenge};
use crate::validate::{
    ANCESTRY, CO_CLUSTERING, ValidationError, validate_ad, validate_assignment, validate_ccm,
    validate_tree,
};
use crate::vcf::{VcfSummary, parse_vcf};
use ndarray::{Array2, s};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

// ========================================================================================
//                                   Error accumulation
// ========================================================================================

/// Messages collected over a run, reported together once every subchallenge is done.
#[derive(Debug, Default, Clone)]
pub struct ErrorLog {
    messages: Vec<String>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.messages.push(message);
    }

    /// Records a failed validation of `path` in the given role.
    pub fn record(&mut self, role: &str, path: &Path, error: &ValidationError) {
        match error {
            ValidationError::Io { source, .. } => self.push(format!(
                "Error opening {role} using file {}: {source}",
                path.display()
            )),
            other => self.push(format!("{role} does not validate: {other}")),
        }
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

fn verify<T>(
    path: &Path,
    role: &str,
    errors: &mut ErrorLog,
    validate: impl FnOnce(&Path) -> Result<T, ValidationError>,
) -> Option<T> {
    match validate(path) {
        Ok(value) => Some(value),
        Err(error) => {
            errors.record(role, path, &error);
            None
        }
    }
}

// ========================================================================================
//                                   Per-file loaders
// ========================================================================================

/// Where a set of files comes from, for error messages.
#[derive(Debug, Clone, Copy)]
enum Side {
    Prediction,
    Truth,
}

impl Side {
    fn role(self, challenge: Subchallenge) -> String {
        match self {
            Side::Prediction => format!("prediction file for Challenge {challenge}"),
            Side::Truth => format!("truth file for Challenge {challenge}"),
        }
    }
}

fn load_assignment(
    path: &Path,
    role: &str,
    n: usize,
    errors: &mut ErrorLog,
) -> Option<ClusterAssignment> {
    verify(path, role, errors, |path| {
        validate_assignment(&read_text(path)?, n)
    })
}

/// Loads an `n x n` CCM into a `size x size` identity buffer and validates the real block.
fn load_ccm(
    path: &Path,
    role: &str,
    n: usize,
    size: usize,
    errors: &mut ErrorLog,
) -> Option<Array2<f64>> {
    verify(path, role, errors, |path| {
        let buffer = read_matrix_in_identity(path, CO_CLUSTERING, n, size)?;
        validate_ccm(buffer.slice(s![..n, ..n]), n)?;
        Ok(buffer)
    })
}

fn load_tree(
    files: &[PathBuf],
    role: &str,
    n: usize,
    errors: &mut ErrorLog,
) -> Option<(ClusterAssignment, Array2<f64>)> {
    let assignment = load_assignment(&files[0], role, n, errors)?;
    let ad = verify(&files[1], role, errors, |path| {
        validate_tree(&read_text(path)?, &assignment)
    })?;
    Some((assignment, ad))
}

fn load_ccm_and_ad(
    files: &[PathBuf],
    role: &str,
    n: usize,
    errors: &mut ErrorLog,
) -> Option<(Array2<f64>, Array2<f64>)> {
    let ccm = load_ccm(&files[0], role, n, n, errors)?;
    let ad = verify(&files[1], role, errors, |path| {
        let ad = read_matrix(path, ANCESTRY, n)?;
        validate_ad(ad.view(), ccm.view())?;
        Ok(ad)
    })?;
    Some((ccm, ad))
}

/// Validates the files of one side; `mutations` is the count the files must describe.
fn validate_side(
    challenge: Subchallenge,
    files: &[PathBuf],
    side: Side,
    mutations: usize,
    errors: &mut ErrorLog,
) -> bool {
    let role = side.role(challenge);
    match challenge {
        Subchallenge::Cellularity => verify(&files[0], &role, errors, |path| {
            validate_cellularity(&read_text(path)?)
        })
        .is_some(),
        Subchallenge::LineageCount => verify(&files[0], &role, errors, |path| {
            validate_lineage_count(&read_text(path)?)
        })
        .is_some(),
        Subchallenge::ClusterTable => verify(&files[0], &role, errors, |path| {
            validate_cluster_table(&read_text(path)?, mutations)
        })
        .is_some(),
        Subchallenge::Assignment => load_assignment(&files[0], &role, mutations, errors).is_some(),
        Subchallenge::CoClustering => {
            load_ccm(&files[0], &role, mutations, mutations, errors).is_some()
        }
        Subchallenge::AssignmentTree => load_tree(files, &role, mutations, errors).is_some(),
        Subchallenge::CoClusteringAncestry => {
            load_ccm_and_ad(files, &role, mutations, errors).is_some()
        }
    }
}

// ========================================================================================
//                                    Shared preamble
// ========================================================================================

fn load_vcf(
    challenge: Subchallenge,
    vcf: Option<&Path>,
    errors: &mut ErrorLog,
) -> Result<Option<VcfSummary>, ChallengeOutcome> {
    if !challenge.needs_vcf() {
        return Ok(None);
    }
    let summary = match vcf {
        Some(path) => verify(path, "input VCF", errors, |path| parse_vcf(&read_text(path)?)),
        None => {
            errors.push(format!("Challenge {challenge} requires an input VCF"));
            None
        }
    };
    match summary {
        Some(summary) => Ok(Some(summary)),
        None => {
            errors.push("Could not read input VCF. Exiting");
            Err(ChallengeOutcome::NotAvailable)
        }
    }
}

/// Validates the prediction files of `challenge` without scoring them.
pub fn verify_challenge(
    challenge: Subchallenge,
    predictions: &[PathBuf],
    vcf: Option<&Path>,
    errors: &mut ErrorLog,
) -> ChallengeOutcome {
    let summary = match load_vcf(challenge, vcf, errors) {
        Ok(summary) => summary,
        Err(outcome) => return outcome,
    };
    if predictions.len() != challenge.file_count() {
        errors.push(format!("Not enough input files for Challenge {challenge}"));
        return ChallengeOutcome::Invalid;
    }
    let total = summary.as_ref().map_or(0, |summary| summary.total);
    if validate_side(challenge, predictions, Side::Prediction, total, errors) {
        ChallengeOutcome::Valid
    } else {
        ChallengeOutcome::Invalid
    }
}

/// Validates and scores `challenge`, returning "NA" when anything could not be validated.
pub fn score_challenge(
    challenge: Subchallenge,
    predictions: &[PathBuf],
    truths: &[PathBuf],
    vcf: Option<&Path>,
    options: &ScoringOptions,
    errors: &mut ErrorLog,
) -> ChallengeOutcome {
    let started = Instant::now();
    checkpoint(&format!("START {challenge}"));

    let summary = match load_vcf(challenge, vcf, errors) {
        Ok(summary) => summary,
        Err(outcome) => return outcome,
    };
    if let Some(summary) = &summary {
        log::info!(
            "VCF lists {} mutations, {} true positives",
            summary.total,
            summary.true_positives()
        );
        checkpoint("VERIFY VCF");
    }

    let expected = challenge.file_count();
    if predictions.len() != expected || truths.len() != expected {
        errors.push(format!("Not enough input files for Challenge {challenge}"));
        return ChallengeOutcome::NotAvailable;
    }
    if !challenge.accepts_compressed()
        && truths.iter().chain(predictions).any(|path| is_compressed(path))
    {
        errors.push(format!(
            "Incorrect format, must input a text file for challenge {challenge}"
        ));
        return ChallengeOutcome::NotAvailable;
    }

    let files = ChallengeFiles {
        challenge,
        predictions,
        truths,
    };
    let outcome = match run_scoring(&files, summary.as_ref(), options, errors) {
        Ok(Some(score)) => {
            log::info!("Challenge {challenge} score: {score:.16}");
            ChallengeOutcome::Score(score)
        }
        Ok(None) => ChallengeOutcome::NotAvailable,
        Err(error) => {
            errors.push(format!("Scoring Challenge {challenge} failed: {error}"));
            ChallengeOutcome::NotAvailable
        }
    };
    log::info!(
        "Challenge {challenge} took {:.2}s",
        started.elapsed().as_secs_f64()
    );
    outcome
}

struct ChallengeFiles<'a> {
    challenge: Subchallenge,
    predictions: &'a [PathBuf],
    truths: &'a [PathBuf],
}

impl ChallengeFiles<'_> {
    fn truth_role(&self) -> String {
        Side::Truth.role(self.challenge)
    }

    fn prediction_role(&self) -> String {
        Side::Prediction.role(self.challenge)
    }
}

/// `Ok(None)` means a file failed validation and the failure is already in `errors`.
fn run_scoring(
    files: &ChallengeFiles,
    summary: Option<&VcfSummary>,
    options: &ScoringOptions,
    errors: &mut ErrorLog,
) -> Result<Option<f64>, ScoringError> {
    let Some(summary) = summary else {
        return Ok(score_scalar(files, options, errors));
    };
    match files.challenge {
        Subchallenge::ClusterTable => Ok(score_table(files, summary.total, options, errors)),
        Subchallenge::Assignment => score_assignment(files, summary, options, errors),
        Subchallenge::CoClustering => score_co_clustering_files(files, summary, options, errors),
        Subchallenge::AssignmentTree => score_tree(files, summary, options, errors),
        Subchallenge::CoClusteringAncestry => score_matrices(files, summary, options, errors),
        Subchallenge::Cellularity | Subchallenge::LineageCount => {
            Ok(score_scalar(files, options, errors))
        }
    }
}

// ========================================================================================
//                                     Subchallenge 1
// ========================================================================================

fn score_scalar(
    files: &ChallengeFiles,
    options: &ScoringOptions,
    errors: &mut ErrorLog,
) -> Option<f64> {
    let (truth_role, pred_role) = (files.truth_role(), files.prediction_role());
    match files.challenge {
        Subchallenge::LineageCount => {
            let parse = |path: &Path| validate_lineage_count(&read_text(path)?);
            let truth = verify(&files.truths[0], &truth_role, errors, parse);
            let pred = verify(&files.predictions[0], &pred_role, errors, parse);
            Some(score_lineage_count(pred?, truth?, options.lineage_method))
        }
        _ => {
            let parse = |path: &Path| validate_cellularity(&read_text(path)?);
            let truth = verify(&files.truths[0], &truth_role, errors, parse);
            let pred = verify(&files.predictions[0], &pred_role, errors, parse);
            Some(score_cellularity(pred?, truth?, options.sc1_penalty))
        }
    }
}

fn score_table(
    files: &ChallengeFiles,
    total: usize,
    options: &ScoringOptions,
    errors: &mut ErrorLog,
) -> Option<f64> {
    let parse = |path: &Path| -> Result<Vec<ClusterSummary>, ValidationError> {
        validate_cluster_table(&read_text(path)?, total)
    };
    let truth = verify(&files.truths[0], &files.truth_role(), errors, parse);
    let pred = verify(&files.predictions[0], &files.prediction_role(), errors, parse);
    Some(score_cluster_table(&pred?, &truth?, options.sc1_penalty))
}

// ========================================================================================
//                                     Subchallenge 2
// ========================================================================================

fn score_assignment(
    files: &ChallengeFiles,
    summary: &VcfSummary,
    options: &ScoringOptions,
    errors: &mut ErrorLog,
) -> Result<Option<f64>, ScoringError> {
    let mutations = summary.true_positives();
    let pseudo_count = resolve_pseudo_count(mutations, options.pseudo_counts);

    let truth = load_assignment(&files.truths[0], &files.truth_role(), mutations, errors);
    let pred = load_assignment(
        &files.predictions[0],
        &files.prediction_role(),
        summary.total,
        errors,
    );
    let (Some(truth), Some(pred)) = (truth, pred) else {
        return Ok(None);
    };

    let truth_ccm = truth.co_clustering();
    drop(truth);
    warn_constant_rows(truth_ccm.view(), "Truth CCM", pseudo_count);
    let (truth_ccm, _) = add_pseudo_counts(truth_ccm, None, Some(pseudo_count));
    log::info!("Truth dimensions: {:?}", truth_ccm.dim());
    checkpoint("APC TRUTH");

    let pred_ccm = pred.restrict(&summary.mask)?.co_clustering();
    drop(pred);
    warn_constant_rows(pred_ccm.view(), "Prediction CCM", pseudo_count);
    let (pred_ccm, _) = add_pseudo_counts(pred_ccm, None, Some(pseudo_count));
    log::info!("Prediction dimensions: {:?}", pred_ccm.dim());
    checkpoint("APC PRED");

    let score = score_co_clustering(
        pred_ccm.view(),
        truth_ccm.view(),
        mutations,
        pseudo_count,
        &options.sc2_metrics()?,
        &options.metric_options(),
    )?;
    Ok(Some(score))
}

fn score_co_clustering_files(
    files: &ChallengeFiles,
    summary: &VcfSummary,
    options: &ScoringOptions,
    errors: &mut ErrorLog,
) -> Result<Option<f64>, ScoringError> {
    let mutations = summary.true_positives();
    let pseudo_count = resolve_pseudo_count(mutations, options.pseudo_counts);
    let size = mutations + pseudo_count;

    // The identity tail of the buffer already holds the pseudo counts.
    let truth = load_ccm(
        &files.truths[0],
        &files.truth_role(),
        mutations,
        size,
        errors,
    );
    checkpoint("VERIFY/APC TRUTH");
    let pred = load_ccm(
        &files.predictions[0],
        &files.prediction_role(),
        summary.total,
        summary.total.max(size),
        errors,
    );
    checkpoint("VERIFY PRED");
    let (Some(truth), Some(mut pred)) = (truth, pred) else {
        return Ok(None);
    };
    log::info!("Truth dimensions: {:?}", truth.dim());
    warn_constant_rows(
        truth.slice(s![..mutations, ..mutations]),
        "Truth CCM",
        pseudo_count,
    );

    filter_fps(&mut pred, &summary.mask)?;
    checkpoint("FILTER PRED");
    warn_constant_rows(
        pred.slice(s![..mutations, ..mutations]),
        "Prediction CCM",
        pseudo_count,
    );
    let pred = augment_buffer(pred, mutations, pseudo_count);
    log::info!("Prediction dimensions: {:?}", pred.dim());
    checkpoint("APC PRED");

    let score = score_co_clustering(
        pred.view(),
        truth.view(),
        mutations,
        pseudo_count,
        &options.sc2_metrics()?,
        &options.metric_options(),
    )?;
    Ok(Some(score))
}

// ========================================================================================
//                                     Subchallenge 3
// ========================================================================================

fn score_reconstructions(
    pred: (Array2<f64>, Array2<f64>),
    truth: (Array2<f64>, Array2<f64>),
    mutations: usize,
    options: &ScoringOptions,
) -> Result<f64, ScoringError> {
    let plan = CombinationPlan::from_options(options)?;
    let pseudo_count = options.sc3_pseudo_counts;
    warn_constant_rows(truth.0.view(), "Truth CCM", pseudo_count);
    warn_constant_rows(pred.0.view(), "Prediction CCM", pseudo_count);
    let (truth_ccm, truth_ad) =
        add_pseudo_counts_with_ancestry(truth.0, truth.1, Some(pseudo_count));
    let (pred_ccm, pred_ad) = add_pseudo_counts_with_ancestry(pred.0, pred.1, Some(pseudo_count));
    log::info!(
        "Scoring {} x {} reconstructions with {:?} over {:?}",
        truth_ccm.nrows(),
        truth_ccm.ncols(),
        plan.metrics,
        plan.selection
    );
    score_ancestry(
        Reconstruction::new(pred_ccm.view(), pred_ad.view()),
        Reconstruction::new(truth_ccm.view(), truth_ad.view()),
        mutations,
        pseudo_count,
        &plan,
    )
}

fn score_tree(
    files: &ChallengeFiles,
    summary: &VcfSummary,
    options: &ScoringOptions,
    errors: &mut ErrorLog,
) -> Result<Option<f64>, ScoringError> {
    let mutations = summary.true_positives();
    let truth = load_tree(files.truths, &files.truth_role(), mutations, errors);
    checkpoint("VERIFY TRUTH");
    let pred = load_tree(
        files.predictions,
        &files.prediction_role(),
        summary.total,
        errors,
    );
    checkpoint("VERIFY PRED");
    let (Some((truth_assignment, truth_ad)), Some((pred_assignment, pred_ad))) = (truth, pred)
    else {
        return Ok(None);
    };

    let pred_assignment = pred_assignment.restrict(&summary.mask)?;
    let pred_ad = filter_fps_owned(pred_ad, &summary.mask)?;
    checkpoint("FILTER PRED(S)");
    let truth_ccm = truth_assignment.co_clustering();
    let pred_ccm = pred_assignment.co_clustering();
    checkpoint("3A DOT");

    let score = score_reconstructions(
        (pred_ccm, pred_ad),
        (truth_ccm, truth_ad),
        mutations,
        options,
    )?;
    Ok(Some(score))
}

fn score_matrices(
    files: &ChallengeFiles,
    summary: &VcfSummary,
    options: &ScoringOptions,
    errors: &mut ErrorLog,
) -> Result<Option<f64>, ScoringError> {
    let mutations = summary.true_positives();
    let truth = load_ccm_and_ad(files.truths, &files.truth_role(), mutations, errors);
    checkpoint("VERIFY TRUTH");
    let pred = load_ccm_and_ad(
        files.predictions,
        &files.prediction_role(),
        summary.total,
        errors,
    );
    checkpoint("VERIFY PRED");
    let (Some(truth), Some((pred_ccm, pred_ad))) = (truth, pred) else {
        return Ok(None);
    };

    let pred_ccm = filter_fps_owned(pred_ccm, &summary.mask)?;
    let pred_ad = filter_fps_owned(pred_ad, &summary.mask)?;
    checkpoint("FILTER PRED(S)");

    let score = score_reconstructions((pred_ccm, pred_ad), truth, mutations, options)?;
    Ok(Some(score))
}

// ========================================================================================
//                                      Batch runs
// ========================================================================================

/// Scores (or verifies) every challenge present in both configs, keyed by challenge id.
pub fn run_batch(
    predictions: &BTreeMap<String, Vec<PathBuf>>,
    truths: &BTreeMap<String, TruthEntry>,
    verify_only: bool,
    options: &ScoringOptions,
    errors: &mut ErrorLog,
) -> BTreeMap<String, ChallengeOutcome> {
    let mut results = BTreeMap::new();
    for (id, pred_files) in predictions {
        let Some(truth) = truths.get(id) else {
            log::info!("No truth configured for challenge {id}; skipping");
            continue;
        };
        let challenge: Subchallenge = match id.parse() {
            Ok(challenge) => challenge,
            Err(error) => {
                errors.push(error.to_string());
                results.insert(id.clone(), ChallengeOutcome::NotAvailable);
                continue;
            }
        };
        let outcome = if verify_only {
            verify_challenge(challenge, pred_files, Some(&truth.vcf), errors)
        } else {
            score_challenge(
                challenge,
                pred_files,
                &truth.truth,
                Some(&truth.vcf),
                options,
                errors,
            )
        };
        results.insert(id.clone(), outcome);
    }
    results
}
