//! Patient record as seen by the matching core.

use std::collections::BTreeSet;

use crate::{select_candidate_genes, AccessLevel, CandidateGene, Disorder, Feature, Visibility};

/// A patient record: phenotype, diagnoses, genes and sharing settings.
///
/// # Examples
///
/// ```
/// use phenomatch_types::{Feature, Patient};
///
/// let mut patient = Patient::new("P0000001");
/// patient.features.push(Feature::present("HP:0001382", "Joint hypermobility"));
/// patient.features.push(Feature::absent("HP:0000518", "Cataract"));
///
/// let terms: Vec<_> = patient.present_term_ids().collect();
/// assert_eq!(terms, vec!["HP:0001382"]);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Patient {
    /// Record identifier.
    pub id: String,
    /// User who reported (owns) the record.
    pub reporter: Option<String>,
    /// Users granted direct access to the record.
    pub collaborators: Vec<String>,
    /// Observed and ruled-out phenotypic features.
    pub features: Vec<Feature>,
    /// Diagnosed disorders.
    pub disorders: Vec<Disorder>,
    /// Genes with their status labels.
    pub genes: Vec<CandidateGene>,
    /// Global mode of inheritance term ids.
    pub mode_of_inheritance: Vec<String>,
    /// Global age of onset.
    pub age_of_onset: Option<String>,
    /// Sharing setting.
    pub visibility: Visibility,
    /// Whether the case has been solved.
    pub solved: bool,
    /// Contact addresses for the record's owners.
    pub contact_emails: Vec<String>,
}

impl Patient {
    /// Creates an empty private record.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Iterates over observed features.
    pub fn present_features(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter().filter(|f| f.is_present())
    }

    /// Iterates over ontology ids of observed, coded features.
    pub fn present_term_ids(&self) -> impl Iterator<Item = &str> {
        self.present_features()
            .filter(|f| f.is_standard())
            .map(|f| f.id.as_str())
    }

    /// Number of observed features (coded or free text).
    pub fn present_feature_count(&self) -> usize {
        self.present_features().count()
    }

    /// Genes that count as candidates for matching.
    pub fn candidate_genes(&self) -> BTreeSet<String> {
        select_candidate_genes(&self.genes)
    }

    /// Ids of diagnosed disorders.
    pub fn disorder_ids(&self) -> BTreeSet<&str> {
        self.disorders.iter().map(|d| d.id.as_str()).collect()
    }

    /// Access level a user holds on this record.
    ///
    /// The reporter owns the record, collaborators may view it and everyone
    /// else gets what the visibility setting grants.
    pub fn access_for(&self, user: &str) -> AccessLevel {
        if self.reporter.as_deref() == Some(user) {
            AccessLevel::Owner
        } else if self.collaborators.iter().any(|c| c == user) {
            AccessLevel::View
        } else {
            self.visibility.default_access()
        }
    }
}
