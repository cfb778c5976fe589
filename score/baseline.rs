// ========================================================================================
//
//                           Trivial baseline reconstructions
//
// ========================================================================================
//
// The zero point of every normalised score is the worse of two uninformative
// submissions: every mutation in one cluster, or every mutation in its own cluster.

use crate::config::ConfigError;
use crate::pseudo::{add_pseudo_counts, add_pseudo_counts_with_ancestry};
use ndarray::Array2;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// All mutations co-clustered, no ancestry.
    OneCluster,
    /// Every mutation a singleton cluster arranged in one linear lineage.
    NCluster,
}

impl Scenario {
    pub const ALL: [Scenario; 2] = [Scenario::OneCluster, Scenario::NCluster];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::OneCluster => "OneCluster",
            Scenario::NCluster => "NCluster",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "OneCluster" => Ok(Scenario::OneCluster),
            "NCluster" | "NClusterOneLineage" => Ok(Scenario::NCluster),
            other => Err(ConfigError::UnknownScenario(other.to_string())),
        }
    }
}

/// Co-clustering matrix of a baseline: all ones, or the identity.
pub fn bad_ccm(n: usize, scenario: Scenario) -> Array2<f64> {
    match scenario {
        Scenario::OneCluster => Array2::ones((n, n)),
        Scenario::NCluster => Array2::eye(n),
    }
}

/// Ancestor-descendant matrix of a baseline: empty, or every earlier mutation an
/// ancestor of every later one (strict upper triangle).
pub fn bad_ad(n: usize, scenario: Scenario) -> Array2<f64> {
    match scenario {
        Scenario::OneCluster => Array2::zeros((n, n)),
        Scenario::NCluster => Array2::from_shape_fn((n, n), |(i, j)| if j > i { 1.0 } else { 0.0 }),
    }
}

/// A baseline co-clustering matrix augmented with the same pseudo counts as the truth.
#[derive(Debug, Clone)]
pub struct BaselineSet {
    pub scenario: Scenario,
    pub ccm: Array2<f64>,
}

impl BaselineSet {
    /// Builds the baseline for `n` real mutations plus `pseudo_count` synthetic ones.
    pub fn generate(n: usize, scenario: Scenario, pseudo_count: usize) -> Self {
        let (ccm, _) = add_pseudo_counts(bad_ccm(n, scenario), None, Some(pseudo_count));
        Self { scenario, ccm }
    }
}

/// A baseline CCM and AD pair for the ancestry subchallenges.
#[derive(Debug, Clone)]
pub struct AncestryBaseline {
    pub scenario: Scenario,
    pub ccm: Array2<f64>,
    pub ad: Array2<f64>,
}

impl AncestryBaseline {
    pub fn generate(n: usize, scenario: Scenario, pseudo_count: usize) -> Self {
        let (ccm, ad) = add_pseudo_counts_with_ancestry(
            bad_ccm(n, scenario),
            bad_ad(n, scenario),
            Some(pseudo_count),
        );
        Self { scenario, ccm, ad }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn ncluster_baseline_for_four_mutations() {
        assert_eq!(bad_ccm(4, Scenario::NCluster), Array2::<f64>::eye(4));
        assert_eq!(
            bad_ad(4, Scenario::NCluster),
            array![
                [0.0, 1.0, 1.0, 1.0],
                [0.0, 0.0, 1.0, 1.0],
                [0.0, 0.0, 0.0, 1.0],
                [0.0, 0.0, 0.0, 0.0]
            ]
        );
    }

    #[test]
    fn one_cluster_baseline_is_flat() {
        assert_eq!(bad_ccm(3, Scenario::OneCluster), Array2::<f64>::ones((3, 3)));
        assert_eq!(bad_ad(3, Scenario::OneCluster), Array2::<f64>::zeros((3, 3)));
    }

    #[test]
    fn scenario_names_parse() {
        assert_eq!("OneCluster".parse::<Scenario>().unwrap(), Scenario::OneCluster);
        assert_eq!(
            "NClusterOneLineage".parse::<Scenario>().unwrap(),
            Scenario::NCluster
        );
        assert!(matches!(
            "TwoCluster".parse::<Scenario>(),
            Err(ConfigError::UnknownScenario(_))
        ));
    }

    #[test]
    fn generated_set_is_augmented() {
        let set = BaselineSet::generate(4, Scenario::NCluster, 2);
        assert_eq!(set.ccm.dim(), (6, 6));
        assert_eq!(BaselineSet::generate(4, Scenario::OneCluster, 0).ccm.dim(), (4, 4));

        let set = AncestryBaseline::generate(4, Scenario::NCluster, 2);
        assert_eq!(set.ccm.dim(), (6, 6));
        assert_eq!(set.ad.dim(), (6, 6));
        // the first synthetic mutation is an ancestor of every real one
        assert_eq!(set.ad.row(4).slice(ndarray::s![..4]).to_vec(), vec![1.0; 4]);
        assert_eq!(set.ad[[0, 1]], 1.0);
    }
}
