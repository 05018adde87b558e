//! In-memory phenotype ontology store.
//!
//! Provides term lookup, alternative id resolution and hierarchy traversal
//! over the parent links loaded from a term table or an OBO file.
//!
//! ```ignore
//! let mut store = OntologyStore::new();
//! store.load_obo("hp.obo")?;
//!
//! let ancestors = store.ancestors_and_self("HP:0001382");
//! let is_phenotype = store.is_descendant_of("HP:0001382", "HP:0000118");
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use phenomatch_types::{OntologyTerm, TermId};

use crate::obo::read_obo_path;
use crate::parser::TsvParser;
use crate::types::{DataFiles, LoadError, LoadResult, LoaderConfig};

/// In-memory store for ontology terms.
///
/// Read-only once loaded; share it behind an `Arc` between scorers.
///
/// # Example
///
/// ```
/// use phenomatch_loader::OntologyStore;
/// use phenomatch_types::OntologyTerm;
///
/// let mut store = OntologyStore::new();
/// store.insert_terms([
///     OntologyTerm::new("HP:0000001", "All", Vec::<String>::new()),
///     OntologyTerm::new("HP:0000118", "Phenotypic abnormality", ["HP:0000001"]),
///     OntologyTerm::new("HP:0001382", "Joint hypermobility", ["HP:0000118"]),
/// ]);
///
/// assert!(store.is_descendant_of("HP:0001382", "HP:0000001"));
/// assert_eq!(store.ancestors_and_self("HP:0001382").len(), 3);
/// ```
#[derive(Clone, Default)]
pub struct OntologyStore {
    /// Terms indexed by primary id.
    terms: HashMap<TermId, OntologyTerm>,
    /// Reverse parent index: term id -> direct children.
    children: HashMap<TermId, Vec<TermId>>,
    /// Alternative id -> primary id.
    alt_ids: HashMap<TermId, TermId>,
}

impl std::fmt::Debug for OntologyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OntologyStore")
            .field("terms", &self.terms.len())
            .field("children", &self.children.len())
            .field("alt_ids", &self.alt_ids.len())
            .finish()
    }
}

impl OntologyStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-allocated capacity.
    pub fn with_capacity(term_count: usize) -> Self {
        Self {
            terms: HashMap::with_capacity(term_count),
            children: HashMap::with_capacity(term_count),
            alt_ids: HashMap::new(),
        }
    }

    /// Loads terms from a tab-separated term table.
    pub fn load_terms<P: AsRef<Path>>(&mut self, path: P, config: LoaderConfig) -> LoadResult<usize> {
        let parser = TsvParser::<_, OntologyTerm>::from_path(path, config)?;
        let mut count = 0;
        let mut errors = 0;

        let mut terms = Vec::new();
        for result in parser {
            match result {
                Ok(term) => {
                    terms.push(term);
                    count += 1;
                }
                Err(e) => {
                    errors += 1;
                    tracing::debug!("Skipping malformed term row: {}", e);
                }
            }
        }
        if errors > 0 {
            tracing::warn!("Skipped {} malformed term rows", errors);
        }

        self.insert_terms(terms);
        Ok(count)
    }

    /// Loads terms from an OBO file.
    pub fn load_obo<P: AsRef<Path>>(&mut self, path: P) -> LoadResult<usize> {
        let terms = read_obo_path(path)?;
        let count = terms.len();
        self.insert_terms(terms);
        Ok(count)
    }

    /// Loads the ontology from a discovered file set, preferring the term table.
    pub fn load_from_files(&mut self, files: &DataFiles, config: LoaderConfig) -> LoadResult<usize> {
        if let Some(path) = &files.terms_file {
            self.load_terms(path, config)
        } else if let Some(path) = &files.obo_file {
            self.load_obo(path)
        } else {
            Err(LoadError::RequiredFileMissing {
                file_type: "Ontology".to_string(),
                directory: "<data files>".to_string(),
            })
        }
    }

    /// Inserts terms directly, maintaining the child and alt-id indices.
    ///
    /// Re-inserting a term replaces its previous definition.
    pub fn insert_terms(&mut self, terms: impl IntoIterator<Item = OntologyTerm>) {
        for term in terms {
            if let Some(previous) = self.terms.remove(&term.id) {
                for parent in &previous.parents {
                    if let Some(kids) = self.children.get_mut(parent) {
                        kids.retain(|k| k != &previous.id);
                    }
                }
            }
            for parent in &term.parents {
                self.children
                    .entry(parent.clone())
                    .or_default()
                    .push(term.id.clone());
            }
            for alt in &term.alt_ids {
                self.alt_ids.insert(alt.clone(), term.id.clone());
            }
            self.terms.insert(term.id.clone(), term);
        }
    }

    // Lookup

    /// Resolves an id (primary or alternative) to the primary id of a known term.
    pub fn resolve<'a>(&'a self, id: &str) -> Option<&'a str> {
        if let Some((primary, _)) = self.terms.get_key_value(id) {
            return Some(primary.as_str());
        }
        self.alt_ids.get(id).map(String::as_str)
    }

    /// Gets a term by primary or alternative id.
    pub fn get_term(&self, id: &str) -> Option<&OntologyTerm> {
        self.resolve(id).and_then(|primary| self.terms.get(primary))
    }

    /// Returns true if the id resolves to a known term.
    pub fn has_term(&self, id: &str) -> bool {
        self.resolve(id).is_some()
    }

    /// Gets the display name of a term.
    pub fn name(&self, id: &str) -> Option<&str> {
        self.get_term(id).map(|t| t.name.as_str())
    }

    // Hierarchy

    /// Gets the direct parents of a term.
    pub fn parents(&self, id: &str) -> &[TermId] {
        self.get_term(id).map(|t| t.parents.as_slice()).unwrap_or(&[])
    }

    /// Gets the direct children of a term.
    pub fn children(&self, id: &str) -> &[TermId] {
        self.resolve(id)
            .and_then(|primary| self.children.get(primary))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the parent with the lexicographically lowest id, if any.
    pub fn lowest_parent(&self, id: &str) -> Option<&str> {
        self.parents(id).iter().map(String::as_str).min()
    }

    /// Gets the transitive closure of parents, including the term itself.
    ///
    /// Unknown ids yield an empty set.
    pub fn ancestors_and_self(&self, id: &str) -> HashSet<TermId> {
        match self.resolve(id) {
            Some(primary) => self.closure_bfs(primary, |t| self.parents(t)),
            None => HashSet::new(),
        }
    }

    /// Gets the transitive closure of children, including the term itself.
    pub fn descendants_and_self(&self, id: &str) -> HashSet<TermId> {
        match self.resolve(id) {
            Some(primary) => self.closure_bfs(primary, |t| self.children(t)),
            None => HashSet::new(),
        }
    }

    /// Returns true if `descendant` equals or lies below `ancestor`.
    pub fn is_descendant_of(&self, descendant: &str, ancestor: &str) -> bool {
        let Some(ancestor) = self.resolve(ancestor) else {
            return false;
        };
        self.ancestors_and_self(descendant).contains(ancestor)
    }

    /// Breadth-first closure following `next` from `start`.
    fn closure_bfs<'a, F>(&'a self, start: &'a str, next: F) -> HashSet<TermId>
    where
        F: Fn(&str) -> &'a [TermId],
    {
        let mut visited: HashSet<TermId> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(start.to_string());
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            for neighbour in next(current) {
                if visited.insert(neighbour.clone()) {
                    queue.push_back(neighbour.as_str());
                }
            }
        }

        visited
    }

    // Statistics

    /// Returns the number of terms in the store.
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Returns an iterator over all terms.
    pub fn terms(&self) -> impl Iterator<Item = &OntologyTerm> {
        self.terms.values()
    }

    /// Returns an iterator over all primary term ids.
    pub fn term_ids(&self) -> impl Iterator<Item = &TermId> {
        self.terms.keys()
    }
}
