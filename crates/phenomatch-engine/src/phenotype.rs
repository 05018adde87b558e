//! Phenotype similarity scoring and feature clustering.
//!
//! Two sets of present terms are compared through their ancestor closures,
//! weighted by information content:
//!
//! ```text
//! score = Σ IC(common ancestors) / Σ IC(all ancestors)
//! ```
//!
//! Shared diagnoses push the score toward 1. Clustering groups the terms of
//! both sides under their most informative shared ancestor for display.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};

use phenomatch_loader::InformationModel;
use phenomatch_types::{well_known, TermId};

use crate::config::ScoringConfig;

/// Display name of the cluster holding terms without a shared ancestor.
pub const UNMATCHED: &str = "Unmatched";

/// A group of reference and match terms under one shared ancestor.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCluster {
    /// Shared ancestor, `None` for the unmatched cluster.
    pub ancestor: Option<TermId>,
    /// Ancestor name, or `Unmatched`.
    pub name: String,
    /// Normalized IC of the ancestor, 0 for the unmatched cluster.
    pub score: f64,
    /// Reference terms in the cluster.
    pub reference: Vec<TermId>,
    /// Match terms in the cluster.
    pub matched: Vec<TermId>,
}

impl FeatureCluster {
    /// Returns true for the cluster of terms with no shared ancestor.
    pub fn is_unmatched(&self) -> bool {
        self.ancestor.is_none()
    }

    /// Full cluster JSON with real term ids on both sides.
    pub fn to_json(&self) -> Value {
        json!({
            "score": self.score,
            "category": {
                "id": self.ancestor,
                "name": self.name,
            },
            "reference": self.reference,
            "match": self.matched,
        })
    }
}

/// Outcome of a phenotype comparison.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhenotypeSimilarity {
    /// Score in `[0, 1]`, including any disorder boost.
    pub score: f64,
    /// Clusters, most informative first; the unmatched cluster comes last.
    pub clusters: Vec<FeatureCluster>,
}

impl PhenotypeSimilarity {
    /// Cluster list as JSON.
    pub fn clusters_json(&self) -> Value {
        Value::Array(self.clusters.iter().map(FeatureCluster::to_json).collect())
    }
}

/// Pushes `score` toward 1 by `(1 - score) / divisor` once per shared disorder.
///
/// Never decreases the score and never exceeds 1.
pub fn apply_disorder_boost(score: f64, shared_disorders: usize, divisor: f64) -> f64 {
    (0..shared_disorders).fold(score, |s, _| s + (1.0 - s) / divisor)
}

/// Scores phenotype sets against an information content table.
#[derive(Debug, Clone, Copy)]
pub struct PhenotypeScorer<'a> {
    model: &'a InformationModel,
    config: &'a ScoringConfig,
}

impl<'a> PhenotypeScorer<'a> {
    /// Creates a scorer.
    pub fn new(model: &'a InformationModel, config: &'a ScoringConfig) -> Self {
        Self { model, config }
    }

    /// Resolves alt ids to primary ids and drops unknown terms.
    pub fn resolve_terms<'t, I>(&self, terms: I) -> BTreeSet<TermId>
    where
        I: IntoIterator<Item = &'t str>,
    {
        let store = self.model.store();
        terms
            .into_iter()
            .filter_map(|t| store.resolve(t))
            .map(str::to_string)
            .collect()
    }

    fn closure(&self, terms: &BTreeSet<TermId>) -> BTreeSet<TermId> {
        terms
            .iter()
            .flat_map(|t| self.model.ancestors_and_self(t))
            .collect()
    }

    /// IC-weighted overlap of the ancestor closures, 0 for empty input.
    pub fn score(&self, matched: &BTreeSet<TermId>, reference: &BTreeSet<TermId>) -> f64 {
        if matched.is_empty() || reference.is_empty() {
            return 0.0;
        }
        let match_closure = self.closure(matched);
        let ref_closure = self.closure(reference);

        let common: f64 = match_closure
            .intersection(&ref_closure)
            .map(|t| self.model.ic(t))
            .sum();
        let union: f64 = match_closure
            .union(&ref_closure)
            .map(|t| self.model.ic(t))
            .sum();

        if union <= 0.0 {
            0.0
        } else {
            (common / union).clamp(0.0, 1.0)
        }
    }

    /// Greedily groups terms under their most informative shared ancestors.
    ///
    /// Stops once only the ontology roots are shared; whatever is left on
    /// either side goes to a final unmatched cluster.
    pub fn cluster(
        &self,
        matched: &BTreeSet<TermId>,
        reference: &BTreeSet<TermId>,
    ) -> Vec<FeatureCluster> {
        let ancestors: BTreeMap<&TermId, BTreeSet<TermId>> = matched
            .iter()
            .chain(reference)
            .map(|t| (t, self.model.ancestors_and_self(t).into_iter().collect()))
            .collect();
        let under = |term: &TermId, ancestor: &str| {
            ancestors.get(term).is_some_and(|a| a.contains(ancestor))
        };

        let mut remaining_match: BTreeSet<&TermId> = matched.iter().collect();
        let mut remaining_ref: BTreeSet<&TermId> = reference.iter().collect();
        let mut clusters = Vec::new();

        while !remaining_match.is_empty() && !remaining_ref.is_empty() {
            let match_ancestors: BTreeSet<&TermId> = remaining_match
                .iter()
                .filter_map(|t| ancestors.get(*t))
                .flatten()
                .collect();
            let ref_ancestors: BTreeSet<&TermId> = remaining_ref
                .iter()
                .filter_map(|t| ancestors.get(*t))
                .flatten()
                .collect();

            let best = match_ancestors
                .intersection(&ref_ancestors)
                .filter(|t| !well_known::is_clustering_root(t))
                .map(|t| (*t, self.model.normalized_ic(t)))
                .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)));

            let Some((ancestor, score)) = best else {
                break;
            };

            let cluster_match: Vec<TermId> = remaining_match
                .iter()
                .filter(|t| under(t, ancestor))
                .map(|t| (*t).clone())
                .collect();
            let cluster_ref: Vec<TermId> = remaining_ref
                .iter()
                .filter(|t| under(t, ancestor))
                .map(|t| (*t).clone())
                .collect();
            remaining_match.retain(|t| !under(t, ancestor));
            remaining_ref.retain(|t| !under(t, ancestor));

            clusters.push(FeatureCluster {
                ancestor: Some(ancestor.clone()),
                name: self.model.store().name(ancestor).unwrap_or_default().to_string(),
                score,
                reference: cluster_ref,
                matched: cluster_match,
            });
        }

        if !remaining_match.is_empty() || !remaining_ref.is_empty() {
            clusters.push(FeatureCluster {
                ancestor: None,
                name: UNMATCHED.to_string(),
                score: 0.0,
                reference: remaining_ref.into_iter().cloned().collect(),
                matched: remaining_match.into_iter().cloned().collect(),
            });
        }

        clusters
    }

    /// Scores, boosts and clusters two raw term lists.
    pub fn compare<'t, M, R>(&self, matched: M, reference: R, shared_disorders: usize) -> PhenotypeSimilarity
    where
        M: IntoIterator<Item = &'t str>,
        R: IntoIterator<Item = &'t str>,
    {
        let matched = self.resolve_terms(matched);
        let reference = self.resolve_terms(reference);
        let base = self.score(&matched, &reference);

        PhenotypeSimilarity {
            score: apply_disorder_boost(base, shared_disorders, self.config.disorder_boost_divisor),
            clusters: self.cluster(&matched, &reference),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use phenomatch_loader::OntologyStore;
    use phenomatch_types::OntologyTerm;

    /// Small eye/joint ontology shared by the engine tests.
    pub(crate) fn sample_model() -> InformationModel {
        let mut store = OntologyStore::new();
        store.insert_terms(vec![
            OntologyTerm::new("HP:0000001", "All", Vec::<String>::new()),
            OntologyTerm::new("HP:0000118", "Phenotypic abnormality", ["HP:0000001"]),
            OntologyTerm::new("HP:0000478", "Abnormality of the eye", ["HP:0000118"]),
            OntologyTerm::new("HP:0000517", "Abnormality of the lens", ["HP:0000478"]),
            OntologyTerm::new("HP:0000518", "Cataract", ["HP:0000517"]),
            OntologyTerm::new("HP:0010696", "Polar cataract", ["HP:0000518"]),
            OntologyTerm::new("HP:0033127", "Abnormality of the musculoskeletal system", ["HP:0000118"]),
            OntologyTerm::new("HP:0011729", "Abnormality of joint mobility", ["HP:0033127"]),
            OntologyTerm::new("HP:0001382", "Joint hypermobility", ["HP:0011729"]),
            OntologyTerm::new("HP:0001371", "Flexion contracture", ["HP:0011729"]),
        ]);

        let ic: HashMap<String, f64> = [
            ("HP:0000478", 0.5),
            ("HP:0000517", 1.2),
            ("HP:0000518", 1.8),
            ("HP:0010696", 3.0),
            ("HP:0033127", 0.3),
            ("HP:0011729", 1.0),
            ("HP:0001382", 2.0),
            ("HP:0001371", 2.5),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        InformationModel::with_ic_values(Arc::new(store), ic)
    }

    fn terms(ids: &[&str]) -> BTreeSet<TermId> {
        ids.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_identical_single_term_scores_one() {
        let mut store = OntologyStore::new();
        store.insert_terms(vec![OntologyTerm::new(
            "HP:0001382",
            "Joint hypermobility",
            Vec::<String>::new(),
        )]);
        let model = InformationModel::with_ic_values(
            Arc::new(store),
            [("HP:0001382".to_string(), 0.005)].into_iter().collect(),
        );
        let config = ScoringConfig::default();
        let scorer = PhenotypeScorer::new(&model, &config);

        let result = scorer.compare(["HP:0001382"], ["HP:0001382"], 0);
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn test_score_partial_overlap() {
        let model = sample_model();
        let config = ScoringConfig::default();
        let scorer = PhenotypeScorer::new(&model, &config);

        // common: 478, 517, 518 (+ roots at 0) = 3.5; union adds 10696 = 6.5
        let score = scorer.score(&terms(&["HP:0010696"]), &terms(&["HP:0000518"]));
        assert!((score - 3.5 / 6.5).abs() < 1e-12);
    }

    #[test]
    fn test_score_symmetric_and_bounded() {
        let model = sample_model();
        let config = ScoringConfig::default();
        let scorer = PhenotypeScorer::new(&model, &config);

        let a = terms(&["HP:0010696", "HP:0001382"]);
        let b = terms(&["HP:0000518", "HP:0001371"]);
        let ab = scorer.score(&a, &b);
        let ba = scorer.score(&b, &a);
        assert_eq!(ab, ba);
        assert!(ab > 0.0 && ab < 1.0);
    }

    #[test]
    fn test_empty_input_scores_zero() {
        let model = sample_model();
        let config = ScoringConfig::default();
        let scorer = PhenotypeScorer::new(&model, &config);
        assert_eq!(scorer.score(&terms(&[]), &terms(&["HP:0000518"])), 0.0);

        let result = scorer.compare(Vec::<&str>::new(), Vec::<&str>::new(), 0);
        assert_eq!(result.score, 0.0);
        assert!(result.clusters.is_empty());
    }

    #[test]
    fn test_unknown_terms_dropped() {
        let model = sample_model();
        let config = ScoringConfig::default();
        let scorer = PhenotypeScorer::new(&model, &config);
        let resolved = scorer.resolve_terms(["HP:0000518", "HP:9999999"]);
        assert_eq!(resolved, terms(&["HP:0000518"]));
    }

    #[test]
    fn test_disorder_boost() {
        assert_eq!(apply_disorder_boost(0.4, 0, 3.0), 0.4);
        assert!((apply_disorder_boost(0.4, 1, 3.0) - 0.6).abs() < 1e-12);
        assert!((apply_disorder_boost(0.0, 1, 3.0) - 1.0 / 3.0).abs() < 1e-12);

        let mut previous = 0.25;
        for k in 1..10 {
            let boosted = apply_disorder_boost(0.25, k, 3.0);
            assert!(boosted > previous);
            assert!(boosted < 1.0);
            previous = boosted;
        }
    }

    #[test]
    fn test_cluster_groups_by_shared_ancestor() {
        let model = sample_model();
        let config = ScoringConfig::default();
        let scorer = PhenotypeScorer::new(&model, &config);

        let clusters = scorer.cluster(
            &terms(&["HP:0010696", "HP:0001382"]),
            &terms(&["HP:0000518", "HP:0001371"]),
        );
        assert_eq!(clusters.len(), 2);

        assert_eq!(clusters[0].ancestor.as_deref(), Some("HP:0000518"));
        assert_eq!(clusters[0].name, "Cataract");
        assert_eq!(clusters[0].reference, vec!["HP:0000518"]);
        assert_eq!(clusters[0].matched, vec!["HP:0010696"]);
        assert!((clusters[0].score - 0.6).abs() < 1e-12);

        assert_eq!(clusters[1].ancestor.as_deref(), Some("HP:0011729"));
        assert_eq!(clusters[1].matched, vec!["HP:0001382"]);
    }

    #[test]
    fn test_cluster_leftovers_unmatched() {
        let model = sample_model();
        let config = ScoringConfig::default();
        let scorer = PhenotypeScorer::new(&model, &config);

        let clusters = scorer.cluster(&terms(&["HP:0010696"]), &terms(&["HP:0001382"]));
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].is_unmatched());
        assert_eq!(clusters[0].name, UNMATCHED);
        assert_eq!(clusters[0].matched, vec!["HP:0010696"]);
        assert_eq!(clusters[0].reference, vec!["HP:0001382"]);

        let json = clusters[0].to_json();
        assert!(json["category"]["id"].is_null());
        assert_eq!(json["category"]["name"], "Unmatched");
    }
}
