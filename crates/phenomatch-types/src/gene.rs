//! Candidate gene entries.

use std::collections::BTreeSet;

use crate::GeneStatus;

/// A gene listed on a patient record with its clinician-assigned status.
///
/// # Examples
///
/// ```
/// use phenomatch_types::{CandidateGene, GeneStatus};
///
/// let gene = CandidateGene::new("SRCAP", "");
/// assert_eq!(gene.status(), Some(GeneStatus::Candidate));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CandidateGene {
    /// Gene symbol (e.g. `SRCAP`).
    pub gene: String,
    /// Raw status label; blank means candidate.
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: String,
}

impl CandidateGene {
    /// Creates a gene entry with the given status label.
    pub fn new(gene: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            gene: gene.into(),
            status: status.into(),
        }
    }

    /// Parsed status, `None` when the label is not recognized.
    pub fn status(&self) -> Option<GeneStatus> {
        GeneStatus::parse(&self.status)
    }
}

/// Selects the genes that count as candidates for matching.
///
/// When any gene is marked solved only the solved genes are used; otherwise
/// genes marked candidate (or left blank) are used. Rejected and carrier genes
/// never count.
pub fn select_candidate_genes<'a, I>(genes: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a CandidateGene>,
{
    let entries: Vec<&CandidateGene> = genes
        .into_iter()
        .filter(|g| !g.gene.trim().is_empty())
        .collect();

    let wanted = if entries
        .iter()
        .any(|g| g.status() == Some(GeneStatus::Solved))
    {
        GeneStatus::Solved
    } else {
        GeneStatus::Candidate
    };

    entries
        .into_iter()
        .filter(|g| g.status() == Some(wanted))
        .map(|g| g.gene.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_without_solved() {
        let genes = vec![
            CandidateGene::new("SRCAP", ""),
            CandidateGene::new("HEXA", "candidate"),
            CandidateGene::new("TTN", "rejected"),
        ];
        let selected = select_candidate_genes(&genes);
        assert_eq!(selected.len(), 2);
        assert!(selected.contains("SRCAP"));
        assert!(selected.contains("HEXA"));
    }

    #[test]
    fn test_solved_gene_wins() {
        let genes = vec![
            CandidateGene::new("SRCAP", "candidate"),
            CandidateGene::new("HEXA", "solved"),
        ];
        let selected = select_candidate_genes(&genes);
        assert_eq!(selected.into_iter().collect::<Vec<_>>(), vec!["HEXA"]);
    }

    #[test]
    fn test_blank_symbols_ignored() {
        let genes = vec![CandidateGene::new("  ", "candidate")];
        assert!(select_candidate_genes(&genes).is_empty());
    }
}
