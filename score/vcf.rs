//! Mutation counts from the challenge VCF.
//!
//! Every non-blank, non-header line is one mutation. Lines whose text ends in `True`
//! are true positives; predictions cover all mutations while truth files cover only the
//! true positives, so the mask maps truth rows back into prediction rows.

use crate::validate::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcfSummary {
    /// Mutations listed in the VCF.
    pub total: usize,
    /// Indices (into the full mutation list) of the true positives, ascending.
    pub mask: Vec<usize>,
}

impl VcfSummary {
    pub fn true_positives(&self) -> usize {
        self.mask.len()
    }
}

pub fn parse_vcf(text: &str) -> Result<VcfSummary, ValidationError> {
    let mut total = 0usize;
    let mut mask = Vec::new();
    for line in text.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.ends_with("True") {
            mask.push(total);
        }
        total += 1;
    }
    if total == 0 {
        return Err(ValidationError::EmptyVcf);
    }
    Ok(VcfSummary { total, mask })
}
