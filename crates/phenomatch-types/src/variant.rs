//! Sequence variant type.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::Zygosity;

/// A scored sequence variant from an exome annotation run.
///
/// Positions are 1-based. The harmfulness score lies in `[0, 1]`.
///
/// # Examples
///
/// ```
/// use phenomatch_types::{Variant, Zygosity};
///
/// let variant = Variant::new("chr1", 1_000, "AC", "A", Zygosity::Homozygous, 0.87, "FRAMESHIFT_VARIANT");
/// assert_eq!(variant.chrom, "1");
/// assert_eq!(variant.end(), 1_001);
/// assert!(variant.is_homozygous());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variant {
    /// Normalized chromosome name (`1`..`22`, `X`, `Y`, `M`).
    pub chrom: String,
    /// 1-based start position.
    pub position: u64,
    /// Reference allele.
    pub reference: String,
    /// Alternate allele.
    pub alternate: String,
    /// Called zygosity.
    pub zygosity: Zygosity,
    /// Harmfulness score in `[0, 1]`.
    pub score: f64,
    /// Effect classification (e.g. `MISSENSE_VARIANT`).
    pub effect: String,
    /// Remaining annotation columns.
    #[cfg_attr(feature = "serde", serde(default))]
    pub annotations: BTreeMap<String, String>,
}

impl Variant {
    /// Creates a variant, normalizing the chromosome name.
    pub fn new(
        chrom: &str,
        position: u64,
        reference: impl Into<String>,
        alternate: impl Into<String>,
        zygosity: Zygosity,
        score: f64,
        effect: impl Into<String>,
    ) -> Self {
        Self {
            chrom: normalize_chromosome(chrom),
            position,
            reference: reference.into(),
            alternate: alternate.into(),
            zygosity,
            score,
            effect: effect.into(),
            annotations: BTreeMap::new(),
        }
    }

    /// Returns the 1-based inclusive end position covered by the reference allele.
    pub fn end(&self) -> u64 {
        (self.position + self.reference.len() as u64).saturating_sub(1)
    }

    /// Returns true if both alleles carry the variant.
    pub fn is_homozygous(&self) -> bool {
        self.zygosity == Zygosity::Homozygous
    }

    /// Returns an annotation value by column name.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// Ordering that places higher scoring variants first.
    pub fn cmp_by_score_desc(a: &Variant, b: &Variant) -> Ordering {
        b.score.total_cmp(&a.score)
    }
}

/// Normalizes a chromosome name: uppercase, no `CHR` prefix, `MT` becomes `M`.
pub fn normalize_chromosome(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    let stripped = upper.strip_prefix("CHR").unwrap_or(&upper);
    if stripped == "MT" {
        "M".to_string()
    } else {
        stripped.to_string()
    }
}
