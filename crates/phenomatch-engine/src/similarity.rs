//! Combined patient similarity.

use std::sync::Arc;

use phenomatch_types::Patient;

use crate::context::ScoringContext;
use crate::error::{MatchError, MatchResult};
use crate::genotype::{score_genotypes, Genotype, GenotypeSimilarity};
use crate::phenotype::{PhenotypeScorer, PhenotypeSimilarity};

/// Raw, unredacted comparison of a matched patient against a reference patient.
#[derive(Debug, Clone)]
pub struct SimilarityResult {
    /// The patient the comparison was made for.
    pub reference: Arc<Patient>,
    /// The patient found to be similar.
    pub matched: Arc<Patient>,
    /// Phenotype score and clusters.
    pub phenotype: PhenotypeSimilarity,
    /// Genotype score and shared genes.
    pub genotype: GenotypeSimilarity,
    /// Disorder ids diagnosed in both patients.
    pub shared_disorders: Vec<String>,
}

impl SimilarityResult {
    /// Reference patient id.
    pub fn reference_id(&self) -> &str {
        &self.reference.id
    }

    /// Matched patient id.
    pub fn matched_id(&self) -> &str {
        &self.matched.id
    }

    /// Phenotype score in `[0, 1]`.
    pub fn phenotype_score(&self) -> f64 {
        self.phenotype.score
    }

    /// Genotype score in `[0, 1]`.
    pub fn genotype_score(&self) -> f64 {
        self.genotype.score
    }

    /// Average of the phenotype and genotype scores.
    pub fn score(&self) -> f64 {
        (self.phenotype.score + self.genotype.score) / 2.0
    }

    /// Number of present features on the matched patient.
    pub fn features_count(&self) -> usize {
        self.matched.present_feature_count()
    }

    /// True when both records were submitted by the same reporter.
    pub fn my_case(&self) -> bool {
        match (&self.reference.reporter, &self.matched.reporter) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl ScoringContext {
    /// Scores a matched patient against a reference patient.
    pub fn score(&self, matched: &Arc<Patient>, reference: &Arc<Patient>) -> SimilarityResult {
        let matched_genotype = self.genotypes.get_genotype(&matched.id);
        let reference_genotype = self.genotypes.get_genotype(&reference.id);
        score_profiles(
            self,
            matched,
            matched_genotype.as_deref(),
            reference,
            reference_genotype.as_deref(),
        )
    }
}

/// Scores two patients with explicitly supplied genotypes.
pub fn score_profiles(
    context: &ScoringContext,
    matched: &Arc<Patient>,
    matched_genotype: Option<&Genotype>,
    reference: &Arc<Patient>,
    reference_genotype: Option<&Genotype>,
) -> SimilarityResult {
    let reference_disorders = reference.disorder_ids();
    let shared_disorders: Vec<String> = matched
        .disorder_ids()
        .intersection(&reference_disorders)
        .map(|d| d.to_string())
        .collect();

    let scorer = PhenotypeScorer::new(&context.ontology, &context.config);
    let phenotype = scorer.compare(
        matched.present_term_ids(),
        reference.present_term_ids(),
        shared_disorders.len(),
    );
    let genotype = score_genotypes(matched_genotype, reference_genotype, &context.config);

    SimilarityResult {
        reference: Arc::clone(reference),
        matched: Arc::clone(matched),
        phenotype,
        genotype,
        shared_disorders,
    }
}

/// Scores two patients, rejecting a missing side.
pub fn score_patients(
    context: &ScoringContext,
    matched: Option<&Arc<Patient>>,
    reference: Option<&Arc<Patient>>,
) -> MatchResult<SimilarityResult> {
    match (matched, reference) {
        (Some(matched), Some(reference)) => Ok(context.score(matched, reference)),
        _ => Err(MatchError::InvalidArgument(
            "Similar patients require both a match and a reference".to_string(),
        )),
    }
}
