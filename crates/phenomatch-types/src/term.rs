//! Ontology term types.
//!
//! Phenotype ontology terms are identified by stable string ids such as
//! `HP:0001382` and form a DAG through their parent links.

/// A phenotype ontology term identifier (e.g. `HP:0001382`).
///
/// # Examples
///
/// ```
/// use phenomatch_types::TermId;
///
/// let joint_hypermobility: TermId = "HP:0001382".to_string();
/// assert!(phenomatch_types::is_ontology_id(&joint_hypermobility));
/// ```
pub type TermId = String;

/// Returns true if the value looks like a prefixed ontology id (`PREFIX:digits`).
///
/// Free-text phenotypes entered by clinicians do not carry such an id.
pub fn is_ontology_id(value: &str) -> bool {
    match value.split_once(':') {
        Some((prefix, local)) => {
            !prefix.is_empty()
                && prefix.chars().all(|c| c.is_ascii_alphabetic())
                && !local.is_empty()
                && local.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// A term in a phenotype ontology.
///
/// Terms may have several parents, so the hierarchy is a DAG rather than a tree.
/// Immutable once loaded into a store.
///
/// # Examples
///
/// ```
/// use phenomatch_types::OntologyTerm;
///
/// let term = OntologyTerm::new("HP:0000518", "Cataract", ["HP:0000517"]);
/// assert!(term.has_parent("HP:0000517"));
/// assert!(!term.is_root());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OntologyTerm {
    /// Stable term identifier.
    pub id: TermId,
    /// Human readable label.
    pub name: String,
    /// Direct parent term ids.
    pub parents: Vec<TermId>,
    /// Alternative (secondary) ids that resolve to this term.
    #[cfg_attr(feature = "serde", serde(default))]
    pub alt_ids: Vec<TermId>,
}

impl OntologyTerm {
    /// Creates a term with the given parents and no alternative ids.
    pub fn new<I, S>(id: impl Into<String>, name: impl Into<String>, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            parents: parents.into_iter().map(Into::into).collect(),
            alt_ids: Vec::new(),
        }
    }

    /// Returns true if this term has no parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Returns true if `parent` is a direct parent of this term.
    pub fn has_parent(&self, parent: &str) -> bool {
        self.parents.iter().any(|p| p == parent)
    }
}
