//! Phenotypic features and disorders recorded on a patient.

use std::collections::BTreeMap;

use crate::{is_ontology_id, TermId};

/// Metadata key for a feature's age of onset.
pub const META_AGE_OF_ONSET: &str = "age_of_onset";

/// Metadata key for a feature's mode of inheritance.
pub const META_MODE_OF_INHERITANCE: &str = "mode_of_inheritance";

/// A phenotypic feature observed (or explicitly ruled out) on a patient.
///
/// Only present features take part in scoring. Features entered as free text
/// have no ontology id and are carried for display only.
///
/// # Examples
///
/// ```
/// use phenomatch_types::Feature;
///
/// let feature = Feature::present("HP:0001382", "Joint hypermobility");
/// assert!(feature.is_present());
/// assert!(feature.is_standard());
///
/// let absent = Feature::absent("HP:0000518", "Cataract");
/// assert!(!absent.is_present());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Feature {
    /// Ontology term id, or empty for free-text features.
    #[cfg_attr(feature = "serde", serde(default))]
    pub id: TermId,
    /// Display name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    /// Whether the feature was observed (true) or ruled out (false).
    #[cfg_attr(feature = "serde", serde(default = "default_present"))]
    pub present: bool,
    /// Optional metadata such as age of onset.
    #[cfg_attr(feature = "serde", serde(default))]
    pub metadata: BTreeMap<String, String>,
}

#[cfg(feature = "serde")]
fn default_present() -> bool {
    true
}

impl Feature {
    /// Creates an observed feature.
    pub fn present(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            present: true,
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a ruled-out feature.
    pub fn absent(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            present: false,
            ..Self::present(id, name)
        }
    }

    /// Returns true if the feature was observed.
    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Returns true if the feature is coded with an ontology id.
    pub fn is_standard(&self) -> bool {
        is_ontology_id(&self.id)
    }

    /// Returns the recorded age of onset, if any.
    pub fn age_of_onset(&self) -> Option<&str> {
        self.metadata.get(META_AGE_OF_ONSET).map(String::as_str)
    }

    /// Returns the recorded mode of inheritance, if any.
    pub fn mode_of_inheritance(&self) -> Option<&str> {
        self.metadata
            .get(META_MODE_OF_INHERITANCE)
            .map(String::as_str)
    }
}

/// A diagnosed disorder (e.g. an OMIM entry) on a patient record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Disorder {
    /// Disorder identifier, e.g. `MIM:164400`.
    pub id: String,
    /// Display name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
}

impl Disorder {
    /// Creates a disorder.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
