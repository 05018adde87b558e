//! Scoring configuration.

/// Tunable constants for scoring, reporting and match discovery.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Each shared disorder moves the phenotype score `1/divisor` of the way to 1.
    pub disorder_boost_divisor: f64,
    /// Score of a candidate gene without exome evidence is `decay^(candidates - 1)`.
    pub candidate_decay: f64,
    /// Per-side gene scores below this are treated as no evidence.
    pub gene_score_threshold: f64,
    /// Maximum number of genes reported in a genotype comparison.
    pub max_reported_genes: usize,
    /// Maximum number of ranked variants shown per gene and side.
    pub max_variants_per_gene: usize,
    /// Minimum overall score for the match finder to keep a pair.
    pub min_match_score: f64,
    /// Tolerance used when comparing stored scores.
    pub score_epsilon: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            disorder_boost_divisor: 3.0,
            candidate_decay: 0.9,
            gene_score_threshold: 1e-4,
            max_reported_genes: 5,
            max_variants_per_gene: 5,
            min_match_score: 0.1,
            score_epsilon: 1e-7,
        }
    }
}

impl ScoringConfig {
    /// Keeps every scored pair and reports every gene.
    pub fn exhaustive() -> Self {
        Self {
            max_reported_genes: usize::MAX,
            min_match_score: 0.0,
            ..Self::default()
        }
    }

    /// Returns a copy with a different minimum match score.
    pub fn with_min_score(mut self, min_match_score: f64) -> Self {
        self.min_match_score = min_match_score;
        self
    }
}
