//! Information content model.
//!
//! Weights every ontology term by how rarely it (or anything below it) is
//! annotated to a disease: `IC(t) = -ln(clamp(mass(t) / mass(root), ε, 1-ε))`.
//! The table is built once and is read-only afterwards.
//!
//! ## Parallel build
//!
//! With the `parallel` feature (default) mass propagation runs on the rayon
//! thread pool, one symptom term per task.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use phenomatch_types::TermId;

use crate::annotation::{load_annotations, DiseaseAnnotation};
use crate::store::OntologyStore;
use crate::types::{InformationConfig, LoadResult, LoaderConfig};

/// Statistics gathered while building an [`InformationModel`].
#[derive(Debug, Clone, Default)]
pub struct InformationStats {
    /// Distinct diseases contributing symptoms.
    pub diseases: usize,
    /// Disease-symptom pairs that contributed mass.
    pub symptoms_used: usize,
    /// Symptoms skipped because they were unknown or outside the root.
    pub symptoms_ignored: usize,
    /// Terms that received a non-zero information content.
    pub terms_with_ic: usize,
    /// Normalized mass found at the root; 1.0 for a consistent ontology.
    pub root_mass: f64,
    /// Build time in milliseconds.
    pub build_time_ms: u64,
}

/// Precomputed information content for every annotated ontology term.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use phenomatch_loader::{DiseaseAnnotation, InformationConfig, InformationModel, OntologyStore};
/// use phenomatch_types::OntologyTerm;
///
/// let mut store = OntologyStore::new();
/// store.insert_terms([
///     OntologyTerm::new("HP:0000118", "Phenotypic abnormality", Vec::<String>::new()),
///     OntologyTerm::new("HP:0001382", "Joint hypermobility", ["HP:0000118"]),
///     OntologyTerm::new("HP:0000518", "Cataract", ["HP:0000118"]),
/// ]);
///
/// let annotate = |disease: &str, term: &str| DiseaseAnnotation {
///     disease_id: disease.to_string(),
///     disease_name: String::new(),
///     negated: false,
///     term_id: term.to_string(),
///     onset: None,
///     frequency: None,
///     aspect: "P".to_string(),
/// };
/// let annotations = vec![annotate("OMIM:1", "HP:0001382"), annotate("OMIM:2", "HP:0000518")];
///
/// let model = InformationModel::build(Arc::new(store), &annotations, &InformationConfig::default());
/// assert!((model.ic("HP:0001382") - 2f64.ln()).abs() < 1e-9);
/// assert_eq!(model.ic("HP:9999999"), 0.0);
/// ```
pub struct InformationModel {
    store: Arc<OntologyStore>,
    ic: HashMap<TermId, f64>,
    max_ic: f64,
    stats: InformationStats,
}

impl std::fmt::Debug for InformationModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InformationModel")
            .field("store", &self.store)
            .field("ic", &self.ic.len())
            .field("max_ic", &self.max_ic)
            .finish()
    }
}

impl InformationModel {
    /// Builds the table from disease annotations.
    ///
    /// Each disease contributes a frequency of 1 for every distinct symptom.
    /// Unknown symptoms and symptoms outside `config.root` are counted in the
    /// stats and skipped.
    pub fn build(
        store: Arc<OntologyStore>,
        annotations: &[DiseaseAnnotation],
        config: &InformationConfig,
    ) -> Self {
        let start = Instant::now();
        let mut stats = InformationStats::default();

        let allowed = store.descendants_and_self(&config.root);

        // Distinct symptoms per disease
        let mut symptoms_by_disease: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
        for annotation in annotations {
            symptoms_by_disease
                .entry(annotation.disease_id.as_str())
                .or_default()
                .insert(annotation.term_id.as_str());
        }
        stats.diseases = symptoms_by_disease.len();

        let mut counts: HashMap<TermId, f64> = HashMap::new();
        for symptoms in symptoms_by_disease.values() {
            for symptom in symptoms {
                match store.resolve(symptom) {
                    Some(primary) if allowed.contains(primary) => {
                        *counts.entry(primary.to_string()).or_insert(0.0) += 1.0;
                        stats.symptoms_used += 1;
                    }
                    _ => stats.symptoms_ignored += 1,
                }
            }
        }
        if stats.symptoms_ignored > 0 {
            tracing::warn!("Ignored {} symptoms", stats.symptoms_ignored);
        }

        let total: f64 = counts.values().sum();
        let mass = propagate_mass(&store, &counts, &allowed);

        let root_mass = store
            .resolve(&config.root)
            .and_then(|root| mass.get(root))
            .copied()
            .unwrap_or(0.0);
        stats.root_mass = if total > 0.0 { root_mass / total } else { 0.0 };
        if (stats.root_mass - 1.0).abs() > config.root_mass_tolerance {
            tracing::warn!(
                "Root term {} has mass {} instead of 1",
                config.root,
                stats.root_mass
            );
        }

        let mut ic = HashMap::with_capacity(mass.len());
        let mut max_ic = 0.0f64;
        if root_mass > 0.0 {
            for (term, term_mass) in mass {
                let probability = term_mass / root_mass;
                if probability > config.epsilon {
                    let value = -clamp_probability(probability, config.epsilon).ln();
                    max_ic = max_ic.max(value);
                    ic.insert(term, value);
                }
            }
        }
        stats.terms_with_ic = ic.values().filter(|v| **v > 0.0).count();
        stats.build_time_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Built information content for {} terms from {} diseases in {} ms",
            ic.len(),
            stats.diseases,
            stats.build_time_ms
        );

        Self {
            store,
            ic,
            max_ic,
            stats,
        }
    }

    /// Reads an annotation file and builds the table.
    pub fn from_annotation_file<P: AsRef<Path>>(
        store: Arc<OntologyStore>,
        path: P,
        loader_config: LoaderConfig,
        config: &InformationConfig,
    ) -> LoadResult<Self> {
        let (annotations, _) = load_annotations(path, loader_config)?;
        Ok(Self::build(store, &annotations, config))
    }

    /// Creates a model from an explicit IC table.
    ///
    /// Useful when IC values come from an external source.
    pub fn with_ic_values(store: Arc<OntologyStore>, values: HashMap<TermId, f64>) -> Self {
        let max_ic = values.values().copied().fold(0.0, f64::max);
        let stats = InformationStats {
            terms_with_ic: values.values().filter(|v| **v > 0.0).count(),
            root_mass: 1.0,
            ..Default::default()
        };
        Self {
            store,
            ic: values,
            max_ic,
            stats,
        }
    }

    /// Information content of a term, 0 if unknown or never annotated.
    pub fn ic(&self, term: &str) -> f64 {
        self.store
            .resolve(term)
            .and_then(|primary| self.ic.get(primary))
            .copied()
            .unwrap_or(0.0)
    }

    /// Largest information content in the table.
    pub fn max_ic(&self) -> f64 {
        self.max_ic
    }

    /// IC scaled into `[0, 1]` by the maximum IC.
    pub fn normalized_ic(&self, term: &str) -> f64 {
        if self.max_ic > 0.0 {
            self.ic(term) / self.max_ic
        } else {
            0.0
        }
    }

    /// Ancestor closure of a term, including itself. Empty for unknown terms.
    pub fn ancestors_and_self(&self, term: &str) -> HashSet<TermId> {
        self.store.ancestors_and_self(term)
    }

    /// The underlying ontology.
    pub fn store(&self) -> &OntologyStore {
        &self.store
    }

    /// Shared handle to the underlying ontology.
    pub fn store_arc(&self) -> Arc<OntologyStore> {
        Arc::clone(&self.store)
    }

    /// Build statistics.
    pub fn stats(&self) -> &InformationStats {
        &self.stats
    }
}

/// Clamps a probability into `[ε, 1-ε]`.
pub fn clamp_probability(p: f64, epsilon: f64) -> f64 {
    p.max(epsilon).min(1.0 - epsilon)
}

/// Adds each symptom's weight to every ancestor (and itself) inside `allowed`.
#[cfg(feature = "parallel")]
fn propagate_mass(
    store: &OntologyStore,
    counts: &HashMap<TermId, f64>,
    allowed: &HashSet<TermId>,
) -> HashMap<TermId, f64> {
    counts
        .par_iter()
        .fold(HashMap::new, |mut acc: HashMap<TermId, f64>, (term, weight)| {
            for ancestor in store.ancestors_and_self(term) {
                if allowed.contains(&ancestor) {
                    *acc.entry(ancestor).or_insert(0.0) += weight;
                }
            }
            acc
        })
        .reduce(HashMap::new, |mut left, right| {
            for (term, weight) in right {
                *left.entry(term).or_insert(0.0) += weight;
            }
            left
        })
}

/// Adds each symptom's weight to every ancestor (and itself) inside `allowed`.
#[cfg(not(feature = "parallel"))]
fn propagate_mass(
    store: &OntologyStore,
    counts: &HashMap<TermId, f64>,
    allowed: &HashSet<TermId>,
) -> HashMap<TermId, f64> {
    let mut mass: HashMap<TermId, f64> = HashMap::new();
    for (term, weight) in counts {
        for ancestor in store.ancestors_and_self(term) {
            if allowed.contains(&ancestor) {
                *mass.entry(ancestor).or_insert(0.0) += weight;
            }
        }
    }
    mass
}
