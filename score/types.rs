// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use crate::config::ConfigError;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The benchmark subchallenges understood by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subchallenge {
    /// Cellularity (purity) of the sample.
    Cellularity,
    /// Number of subclonal lineages.
    LineageCount,
    /// Per-cluster mutation counts and cellular fractions.
    ClusterTable,
    /// Mutation to cluster assignment, scored through the co-clustering matrix.
    Assignment,
    /// Probabilistic co-clustering matrix.
    CoClustering,
    /// Assignment plus cluster phylogeny.
    AssignmentTree,
    /// Probabilistic co-clustering plus ancestor-descendant matrices.
    CoClusteringAncestry,
}

impl Subchallenge {
    pub const ALL: [Subchallenge; 7] = [
        Subchallenge::Cellularity,
        Subchallenge::LineageCount,
        Subchallenge::ClusterTable,
        Subchallenge::Assignment,
        Subchallenge::CoClustering,
        Subchallenge::AssignmentTree,
        Subchallenge::CoClusteringAncestry,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Subchallenge::Cellularity => "1A",
            Subchallenge::LineageCount => "1B",
            Subchallenge::ClusterTable => "1C",
            Subchallenge::Assignment => "2A",
            Subchallenge::CoClustering => "2B",
            Subchallenge::AssignmentTree => "3A",
            Subchallenge::CoClusteringAncestry => "3B",
        }
    }

    /// Number of prediction (and truth) files the subchallenge consumes.
    pub fn file_count(self) -> usize {
        match self {
            Subchallenge::AssignmentTree | Subchallenge::CoClusteringAncestry => 2,
            _ => 1,
        }
    }

    /// Whether the subchallenge needs the VCF to know how many mutations to expect.
    pub fn needs_vcf(self) -> bool {
        !matches!(self, Subchallenge::Cellularity | Subchallenge::LineageCount)
    }

    /// Only the dense matrix subchallenges may be submitted gzip-compressed.
    pub fn accepts_compressed(self) -> bool {
        matches!(
            self,
            Subchallenge::CoClustering | Subchallenge::CoClusteringAncestry
        )
    }
}

impl fmt::Display for Subchallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Subchallenge {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Subchallenge::ALL
            .into_iter()
            .find(|challenge| challenge.id().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownSubchallenge(wanted.to_string()))
    }
}

/// Result of verifying or scoring one subchallenge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChallengeOutcome {
    Score(f64),
    Valid,
    Invalid,
    NotAvailable,
}

impl ChallengeOutcome {
    pub fn score(self) -> Option<f64> {
        match self {
            ChallengeOutcome::Score(value) => Some(value),
            _ => None,
        }
    }
}

impl Serialize for ChallengeOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ChallengeOutcome::Score(value) => serializer.serialize_f64(*value),
            ChallengeOutcome::Valid => serializer.serialize_str("Valid"),
            ChallengeOutcome::Invalid => serializer.serialize_str("Invalid"),
            ChallengeOutcome::NotAvailable => serializer.serialize_str("NA"),
        }
    }
}

/// Which of the four relationship matrices enter a combined ancestry metric.
///
/// The numbering follows the `in_mat` convention of the scoring configuration:
/// `1` keeps every matrix, `2..=5` drop the CCM, AD, AD transpose or cousin
/// matrix respectively, so a matrix derivable from the others is not counted twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixSelection {
    All,
    ExcludeCoClustering,
    ExcludeAncestry,
    ExcludeAncestryTranspose,
    ExcludeCousin,
}

impl MatrixSelection {
    pub fn includes_ccm(self) -> bool {
        self != MatrixSelection::ExcludeCoClustering
    }

    pub fn includes_ad(self) -> bool {
        self != MatrixSelection::ExcludeAncestry
    }

    pub fn includes_ad_transpose(self) -> bool {
        self != MatrixSelection::ExcludeAncestryTranspose
    }

    pub fn includes_cousin(self) -> bool {
        self != MatrixSelection::ExcludeCousin
    }
}

impl TryFrom<u8> for MatrixSelection {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MatrixSelection::All),
            2 => Ok(MatrixSelection::ExcludeCoClustering),
            3 => Ok(MatrixSelection::ExcludeAncestry),
            4 => Ok(MatrixSelection::ExcludeAncestryTranspose),
            5 => Ok(MatrixSelection::ExcludeCousin),
            other => Err(ConfigError::InvalidMatrixSelection(other)),
        }
    }
}
