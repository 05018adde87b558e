//! Well-known Human Phenotype Ontology term ids.
//!
//! # Examples
//!
//! ```
//! use phenomatch_types::well_known;
//!
//! assert_eq!(well_known::PHENOTYPIC_ABNORMALITY, "HP:0000118");
//! assert!(well_known::is_clustering_root(well_known::ALL));
//! ```

// =============================================================================
// Root Terms
// =============================================================================

/// Root of the whole HPO hierarchy (`All`).
pub const ALL: &str = "HP:0000001";

/// Phenotypic abnormality, the root of the symptom sub-hierarchy.
///
/// Used as the normalization root when computing information content.
pub const PHENOTYPIC_ABNORMALITY: &str = "HP:0000118";

// =============================================================================
// Other Top-Level Branches
// =============================================================================

/// Mode of inheritance.
pub const MODE_OF_INHERITANCE: &str = "HP:0000005";

/// Clinical modifier.
pub const CLINICAL_MODIFIER: &str = "HP:0012823";

/// Onset (age of onset sub-branch of clinical modifiers).
pub const ONSET: &str = "HP:0003674";

/// Frequency.
pub const FREQUENCY: &str = "HP:0040279";

/// Returns true if a cluster ancestor at this term carries no useful grouping.
///
/// Grouping a match under the ontology root or its phenotypic-abnormality child
/// says nothing about the shared phenotype.
pub fn is_clustering_root(term: &str) -> bool {
    term == ALL || term == PHENOTYPIC_ABNORMALITY
}
