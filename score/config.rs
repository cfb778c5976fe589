//! # Scoring configuration
//!
//! Two kinds of configuration reach the scorer:
//!
//! - `ScoringOptions`, an optional TOML file choosing the metric bundles, weights,
//!   matrix selection and pseudo counts. Every field has a default, so an empty file is
//!   the stock benchmark configuration.
//! - Batch configs for scoring several subchallenges in one run: files holding one JSON
//!   object per line, merged in order. The prediction config maps a challenge id to its
//!   list of files; the truth config maps it to `{ "vcf": ..., "truth": [...] }`.

use crate::clonal::{LineageMethod, Penalty};
use crate::metrics::{DEFAULT_RND, Metric, MetricOptions};
use crate::types::MatrixSelection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown scoring metric '{0}'.")]
    UnknownMetric(String),

    #[error("Unknown baseline scenario '{0}'. Choose one of OneCluster or NCluster.")]
    UnknownScenario(String),

    #[error("Unknown or unsupported subchallenge '{0}'.")]
    UnknownSubchallenge(String),

    #[error("{found} weights were supplied for {expected} metrics.")]
    WeightsLength { expected: usize, found: usize },

    #[error("Matrix selection in_mat must be between 1 and 5, but was {0}.")]
    InvalidMatrixSelection(u8),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML scoring options: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse JSON challenge configuration: {0}")]
    Json(#[from] serde_json::Error),
}

fn default_sc2_methods() -> Vec<String> {
    ["pseudoV", "pearson", "mcc"].map(String::from).to_vec()
}

fn default_sc3_methods() -> Vec<String> {
    vec!["sym_pseudoV".to_string()]
}

/// User-facing scoring knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringOptions {
    /// Metrics averaged (equal weights) for the co-clustering subchallenges.
    pub sc2_methods: Vec<String>,
    /// Metrics combined for the ancestry subchallenges.
    pub sc3_methods: Vec<String>,
    /// Optional weights for `sc3_methods`; renormalised to sum to one.
    pub sc3_weights: Option<Vec<f64>>,
    pub full_matrix: bool,
    /// Which of CCM / AD / AD^T / cousin enter the ancestry metrics (1..=5).
    pub in_mat: u8,
    pub rnd: f64,
    /// Synthetic mutations added for the co-clustering subchallenges;
    /// `None` means `ceil(sqrt(n))`.
    pub pseudo_counts: Option<usize>,
    /// Synthetic mutations added for the ancestry subchallenges.
    pub sc3_pseudo_counts: usize,
    /// Error penalty for cellularity (1A) and the cluster table (1C): `abs` or `sqr`.
    pub sc1_penalty: Penalty,
    /// Scoring rule for the lineage count (1B): `normalized` or `orig`.
    pub lineage_method: LineageMethod,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            sc2_methods: default_sc2_methods(),
            sc3_methods: default_sc3_methods(),
            sc3_weights: None,
            full_matrix: true,
            in_mat: 2,
            rnd: DEFAULT_RND,
            pseudo_counts: None,
            sc3_pseudo_counts: 0,
            sc1_penalty: Penalty::Abs,
            lineage_method: LineageMethod::Normalized,
        }
    }
}

impl ScoringOptions {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn sc2_metrics(&self) -> Result<Vec<Metric>, ConfigError> {
        parse_metrics(&self.sc2_methods)
    }

    pub fn sc3_metrics(&self) -> Result<Vec<Metric>, ConfigError> {
        parse_metrics(&self.sc3_methods)
    }

    pub fn matrix_selection(&self) -> Result<MatrixSelection, ConfigError> {
        MatrixSelection::try_from(self.in_mat)
    }

    pub fn metric_options(&self) -> MetricOptions {
        MetricOptions {
            full_matrix: self.full_matrix,
            rnd: self.rnd,
        }
    }
}

fn parse_metrics(names: &[String]) -> Result<Vec<Metric>, ConfigError> {
    names.iter().map(|name| name.parse()).collect()
}

// ========================================================================================
//                                Batch challenge configs
// ========================================================================================

/// Truth side of one batch entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TruthEntry {
    pub vcf: PathBuf,
    pub truth: Vec<PathBuf>,
}

/// Merges every line that parses as a JSON object; other lines are skipped.
fn merge_json_lines(text: &str) -> serde_json::Map<String, serde_json::Value> {
    let mut merged = serde_json::Map::new();
    for line in text.lines() {
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(serde_json::Value::Object(object)) => merged.extend(object),
            Ok(_) => {}
            Err(err) => log::debug!("Skipping non-JSON config line: {err}"),
        }
    }
    merged
}

fn decode_entries<T: for<'de> Deserialize<'de>>(
    text: &str,
) -> Result<BTreeMap<String, T>, ConfigError> {
    merge_json_lines(text)
        .into_iter()
        .map(|(challenge, value)| -> Result<(String, T), ConfigError> {
            Ok((challenge, serde_json::from_value(value)?))
        })
        .collect()
}

pub fn parse_prediction_config(text: &str) -> Result<BTreeMap<String, Vec<PathBuf>>, ConfigError> {
    decode_entries(text)
}

pub fn parse_truth_config(text: &str) -> Result<BTreeMap<String, TruthEntry>, ConfigError> {
    decode_entries(text)
}

pub fn load_prediction_config(path: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>, ConfigError> {
    parse_prediction_config(&fs::read_to_string(path)?)
}

pub fn load_truth_config(path: &Path) -> Result<BTreeMap<String, TruthEntry>, ConfigError> {
    parse_truth_config(&fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let options = ScoringOptions::from_toml_str("").unwrap();
        assert_eq!(options, ScoringOptions::default());
        assert_eq!(
            options.sc2_metrics().unwrap(),
            vec![Metric::PseudoV, Metric::Pearson, Metric::Mcc]
        );
        assert_eq!(options.sc3_metrics().unwrap(), vec![Metric::SymPseudoV]);
        assert_eq!(
            options.matrix_selection().unwrap(),
            MatrixSelection::ExcludeCoClustering
        );
    }

    #[test]
    fn toml_overrides_are_applied() {
        let text = r#"
            sc3_methods = ["pearson", "mcc"]
            sc3_weights = [2.0, 1.0]
            full_matrix = false
            in_mat = 5
            pseudo_counts = 0
        "#;
        let options = ScoringOptions::from_toml_str(text).unwrap();
        assert_eq!(options.sc3_metrics().unwrap(), vec![Metric::Pearson, Metric::Mcc]);
        assert_eq!(options.sc3_weights, Some(vec![2.0, 1.0]));
        assert!(!options.metric_options().full_matrix);
        assert_eq!(options.pseudo_counts, Some(0));
        assert_eq!(options.matrix_selection().unwrap(), MatrixSelection::ExcludeCousin);
    }

    #[test]
    fn clonal_rules_and_normalised_divergences_are_configurable() {
        let text = r#"
            sc2_methods = ["pseudoV_norm"]
            sc3_methods = ["sym_pseudoV_norm"]
            sc1_penalty = "sqr"
            lineage_method = "orig"
        "#;
        let options = ScoringOptions::from_toml_str(text).unwrap();
        assert_eq!(options.sc2_metrics().unwrap(), vec![Metric::PseudoVNorm]);
        assert_eq!(options.sc3_metrics().unwrap(), vec![Metric::SymPseudoVNorm]);
        assert_eq!(options.sc1_penalty, Penalty::Sqr);
        assert_eq!(options.lineage_method, LineageMethod::Orig);

        assert!(matches!(
            ScoringOptions::from_toml_str(r#"sc1_penalty = "cubic""#),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn unknown_metric_and_fields_are_rejected() {
        let options = ScoringOptions::from_toml_str(r#"sc2_methods = ["nope"]"#).unwrap();
        assert!(matches!(options.sc2_metrics(), Err(ConfigError::UnknownMetric(_))));
        assert!(matches!(
            ScoringOptions::from_toml_str("bogus = 1"),
            Err(ConfigError::Toml(_))
        ));
        let options = ScoringOptions::from_toml_str("in_mat = 9").unwrap();
        assert!(matches!(
            options.matrix_selection(),
            Err(ConfigError::InvalidMatrixSelection(9))
        ));
    }

    #[test]
    fn json_lines_are_merged_and_junk_skipped() {
        let pred = "{\"2A\": [\"pred2A.txt\"]}\nnot json\n[1, 2]\n{\"1A\": [\"pred1A.txt\"]}\n";
        let parsed = parse_prediction_config(pred).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["2A"], vec![PathBuf::from("pred2A.txt")]);

        let truth = "{\"2A\": {\"vcf\": \"in.vcf\", \"truth\": [\"t.txt\"]}}";
        let parsed = parse_truth_config(truth).unwrap();
        assert_eq!(parsed["2A"].vcf, PathBuf::from("in.vcf"));
        assert_eq!(parsed["2A"].truth, vec![PathBuf::from("t.txt")]);
    }
}
