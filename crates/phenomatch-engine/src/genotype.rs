//! Genotype similarity scoring.
//!
//! A patient's genotype combines clinician-curated candidate genes with an
//! optional ranked exome. Each gene gets a per-patient score; two patients
//! are compared gene by gene over the union of their candidates and the
//! strongest shared gene sets the aggregate score.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use phenomatch_loader::Exome;
use phenomatch_types::{Patient, Variant};

use crate::config::ScoringConfig;
use crate::context::{ExomeProvider, GenotypeProvider, PatientRepository};

/// Candidate genes plus exome evidence for one patient.
#[derive(Debug, Clone, Default)]
pub struct Genotype {
    candidate_genes: BTreeSet<String>,
    exome: Option<Arc<Exome>>,
}

impl Genotype {
    /// Creates a genotype from candidate genes and an optional exome.
    pub fn new(candidate_genes: BTreeSet<String>, exome: Option<Arc<Exome>>) -> Self {
        Self {
            candidate_genes,
            exome,
        }
    }

    /// Builds a genotype from a patient's gene list.
    pub fn from_patient(patient: &Patient, exome: Option<Arc<Exome>>) -> Self {
        Self::new(patient.candidate_genes(), exome)
    }

    /// Genes the clinician marked as candidates.
    pub fn candidate_genes(&self) -> &BTreeSet<String> {
        &self.candidate_genes
    }

    /// Exome results, if the patient was sequenced.
    pub fn exome(&self) -> Option<&Exome> {
        self.exome.as_deref()
    }

    /// Returns true if the exome has at least one scored gene.
    pub fn has_exome_data(&self) -> bool {
        self.exome.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Returns true if there is anything to compare.
    pub fn has_genotype_data(&self) -> bool {
        !self.candidate_genes.is_empty() || self.has_exome_data()
    }

    /// Combined score of a gene for this patient.
    ///
    /// An exome score is boosted by `(1 - s) / |candidates|` when the gene is
    /// also a candidate. A candidate without exome evidence scores
    /// `decay^(|candidates| - 1)`. Genes with neither return `None`.
    pub fn gene_score(&self, gene: &str, config: &ScoringConfig) -> Option<f64> {
        let is_candidate = self.candidate_genes.contains(gene);
        let candidates = self.candidate_genes.len();
        let exome_score = self.exome.as_ref().and_then(|e| e.gene_score(gene));

        match (exome_score, is_candidate) {
            (Some(score), true) => Some(score + (1.0 - score) / candidates as f64),
            (Some(score), false) => Some(score),
            (None, true) => Some(config.candidate_decay.powi(candidates as i32 - 1)),
            (None, false) => None,
        }
    }

    /// Top ranked variants in a gene, homozygous variants counting twice.
    pub fn top_variants(&self, gene: &str, k: usize) -> Vec<Variant> {
        self.exome
            .as_ref()
            .map(|e| e.top_variants(gene, k).into_iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Builds genotypes from patient records and an exome source.
pub struct PatientGenotypeProvider {
    patients: Arc<dyn PatientRepository>,
    exomes: Option<Arc<dyn ExomeProvider>>,
}

impl PatientGenotypeProvider {
    /// Creates a provider; without an exome source only candidate genes are used.
    pub fn new(patients: Arc<dyn PatientRepository>, exomes: Option<Arc<dyn ExomeProvider>>) -> Self {
        Self { patients, exomes }
    }
}

impl GenotypeProvider for PatientGenotypeProvider {
    fn get_genotype(&self, patient_id: &str) -> Option<Arc<Genotype>> {
        let patient = self.patients.get(patient_id)?;
        let exome = self.exomes.as_ref().and_then(|e| e.get_exome(patient_id));
        let genotype = Genotype::from_patient(&patient, exome);
        genotype.has_genotype_data().then(|| Arc::new(genotype))
    }
}

/// One gene shared by both patients.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneMatch {
    /// Gene symbol.
    pub gene: String,
    /// Average of the two per-patient scores.
    pub score: f64,
    /// Reference patient's score for the gene.
    pub reference_score: f64,
    /// Matched patient's score for the gene.
    pub match_score: f64,
    /// Reference patient's top variants in the gene.
    pub reference_variants: Vec<Variant>,
    /// Matched patient's top variants in the gene.
    pub match_variants: Vec<Variant>,
}

/// Result of comparing two genotypes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenotypeSimilarity {
    /// Score of the strongest shared gene, 0 if none.
    pub score: f64,
    /// Shared genes by descending score, capped for reporting.
    pub genes: Vec<GeneMatch>,
    /// Whether the reference patient had exome results.
    pub reference_has_exome: bool,
    /// Whether the matched patient had exome results.
    pub match_has_exome: bool,
}

impl GenotypeSimilarity {
    /// Returns true if at least one gene matched.
    pub fn has_matches(&self) -> bool {
        !self.genes.is_empty()
    }

    /// Symbols of the reported genes.
    pub fn gene_symbols(&self) -> BTreeSet<String> {
        self.genes.iter().map(|g| g.gene.clone()).collect()
    }
}

/// Compares two genotypes. Missing genotypes score 0.
pub fn score_genotypes(
    matched: Option<&Genotype>,
    reference: Option<&Genotype>,
    config: &ScoringConfig,
) -> GenotypeSimilarity {
    let (Some(matched), Some(reference)) = (matched, reference) else {
        return GenotypeSimilarity::default();
    };

    let universe: BTreeSet<&String> = matched
        .candidate_genes()
        .iter()
        .chain(reference.candidate_genes())
        .collect();

    let mut genes: Vec<GeneMatch> = universe
        .into_iter()
        .filter_map(|gene| {
            let reference_score = reference.gene_score(gene, config).unwrap_or(0.0);
            let match_score = matched.gene_score(gene, config).unwrap_or(0.0);
            if reference_score < config.gene_score_threshold
                || match_score < config.gene_score_threshold
            {
                return None;
            }
            Some(GeneMatch {
                gene: gene.clone(),
                score: (reference_score + match_score) / 2.0,
                reference_score,
                match_score,
                reference_variants: reference.top_variants(gene, config.max_variants_per_gene),
                match_variants: matched.top_variants(gene, config.max_variants_per_gene),
            })
        })
        .collect();

    genes.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.gene.cmp(&b.gene)));
    let score = genes.first().map(|g| g.score).unwrap_or(0.0);
    genes.truncate(config.max_reported_genes);

    GenotypeSimilarity {
        score,
        genes,
        reference_has_exome: reference.has_exome_data(),
        match_has_exome: matched.has_exome_data(),
    }
}

/// Full variant JSON.
pub fn variant_json(variant: &Variant) -> Value {
    json!({
        "start": variant.position,
        "end": variant.end(),
        "referenceName": variant.chrom,
        "referenceBases": variant.reference,
        "alternateBases": variant.alternate,
        "zygosity": variant.zygosity.as_str(),
        "score": variant.score,
        "effect": variant.effect,
        "annotations": variant.annotations,
    })
}

/// Variant JSON reduced to score and effect.
pub fn restricted_variant_json(variant: &Variant) -> Value {
    json!({
        "score": variant.score,
        "effect": variant.effect,
    })
}

/// `{variants: [...]}`, with the key omitted when there are no variants.
pub(crate) fn variants_object<F>(variants: &[Variant], render: F) -> Value
where
    F: Fn(&Variant) -> Value,
{
    let mut object = Map::new();
    if !variants.is_empty() {
        object.insert(
            "variants".to_string(),
            Value::Array(variants.iter().map(render).collect()),
        );
    }
    Value::Object(object)
}

/// Gene list JSON with full variant detail on both sides.
pub fn genes_json(similarity: &GenotypeSimilarity) -> Value {
    Value::Array(
        similarity
            .genes
            .iter()
            .map(|g| {
                json!({
                    "gene": g.gene,
                    "score": g.score,
                    "reference": variants_object(&g.reference_variants, variant_json),
                    "match": variants_object(&g.match_variants, variant_json),
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use phenomatch_types::Zygosity;

    fn candidates(genes: &[&str]) -> BTreeSet<String> {
        genes.iter().map(|g| g.to_string()).collect()
    }

    fn exome_with(gene: &str, score: f64) -> Arc<Exome> {
        let mut exome = Exome::new();
        exome.add_variant(
            gene,
            score,
            Variant::new("16", 30_748_691, "C", "T", Zygosity::Heterozygous, 0.95, "STOP_GAINED"),
        );
        Arc::new(exome)
    }

    #[test]
    fn test_candidate_only_score_decays() {
        let config = ScoringConfig::default();
        let single = Genotype::new(candidates(&["SRCAP"]), None);
        assert_eq!(single.gene_score("SRCAP", &config), Some(1.0));

        let pair = Genotype::new(candidates(&["SRCAP", "HEXA"]), None);
        assert!((pair.gene_score("SRCAP", &config).unwrap() - 0.9).abs() < 1e-12);
        assert_eq!(pair.gene_score("TTN", &config), None);
    }

    #[test]
    fn test_exome_score_boosted_by_candidate() {
        let config = ScoringConfig::default();
        let genotype = Genotype::new(candidates(&["SRCAP", "HEXA"]), Some(exome_with("SRCAP", 0.6)));
        assert!((genotype.gene_score("SRCAP", &config).unwrap() - 0.8).abs() < 1e-12);

        let not_candidate = Genotype::new(candidates(&["HEXA"]), Some(exome_with("SRCAP", 0.6)));
        assert_eq!(not_candidate.gene_score("SRCAP", &config), Some(0.6));
    }

    #[test]
    fn test_candidate_boost_diminishes() {
        let config = ScoringConfig::default();
        let mut previous = f64::MAX;
        for n in 1..6 {
            let genes: Vec<String> = (0..n).map(|i| format!("GENE{}", i)).collect();
            let genotype = Genotype::new(
                genes.iter().cloned().collect(),
                Some(exome_with("GENE0", 0.5)),
            );
            let boost = genotype.gene_score("GENE0", &config).unwrap() - 0.5;
            assert!(boost <= previous);
            previous = boost;
        }
    }

    #[test]
    fn test_shared_candidate_scenario() {
        let config = ScoringConfig::default();
        let reference = Genotype::new(candidates(&["SRCAP", "HEXA"]), None);
        let matched = Genotype::new(candidates(&["SRCAP", "TTN"]), None);

        let result = score_genotypes(Some(&matched), Some(&reference), &config);
        assert_eq!(result.gene_symbols(), candidates(&["SRCAP"]));
        assert!((result.score - 0.9).abs() < 1e-12);
        assert!((result.genes[0].score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_genotype_score_symmetric() {
        let config = ScoringConfig::default();
        let a = Genotype::new(candidates(&["SRCAP", "TTN"]), Some(exome_with("TTN", 0.3)));
        let b = Genotype::new(candidates(&["TTN"]), Some(exome_with("SRCAP", 0.7)));

        let ab = score_genotypes(Some(&a), Some(&b), &config);
        let ba = score_genotypes(Some(&b), Some(&a), &config);
        assert_eq!(ab.score, ba.score);
        assert_eq!(ab.gene_symbols(), ba.gene_symbols());
        assert!(ab.score >= 0.0 && ab.score <= 1.0);
    }

    #[test]
    fn test_missing_genotype_scores_zero() {
        let config = ScoringConfig::default();
        let a = Genotype::new(candidates(&["SRCAP"]), None);
        let result = score_genotypes(Some(&a), None, &config);
        assert_eq!(result.score, 0.0);
        assert!(!result.has_matches());
    }

    #[test]
    fn test_reported_genes_capped() {
        let config = ScoringConfig {
            max_reported_genes: 2,
            ..Default::default()
        };
        let genes = candidates(&["A1", "A2", "A3", "A4"]);
        let a = Genotype::new(genes.clone(), None);
        let b = Genotype::new(genes, None);
        let result = score_genotypes(Some(&a), Some(&b), &config);
        assert_eq!(result.genes.len(), 2);
        assert_eq!(result.genes[0].gene, "A1");
    }

    #[test]
    fn test_variant_json() {
        let variant = Variant::new("chr1", 1_000, "AC", "A", Zygosity::Homozygous, 0.87, "FRAMESHIFT_VARIANT");
        let full = variant_json(&variant);
        assert_eq!(full["start"], 1_000);
        assert_eq!(full["end"], 1_001);
        assert_eq!(full["referenceName"], "1");
        assert_eq!(full["zygosity"], "homozygous");

        let restricted = restricted_variant_json(&variant);
        assert_eq!(restricted.as_object().unwrap().len(), 2);
        assert_eq!(restricted["effect"], "FRAMESHIFT_VARIANT");
    }
}
