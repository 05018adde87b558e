//! Enumeration types used across patient matching.
//!
//! This module provides enum representations for coded values such as variant
//! zygosity, candidate gene status, match status and viewer access.

use std::fmt;

/// Zygosity of a called variant.
///
/// # Examples
///
/// ```
/// use phenomatch_types::Zygosity;
///
/// assert_eq!(Zygosity::from_genotype("1/1"), Zygosity::Homozygous);
/// assert_eq!(Zygosity::from_genotype("0|1"), Zygosity::Heterozygous);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Zygosity {
    /// One copy of the alternate allele.
    #[default]
    Heterozygous,
    /// Both copies carry the alternate allele.
    Homozygous,
}

impl Zygosity {
    /// Derives zygosity from a VCF-style genotype string.
    ///
    /// Only `1/1` and `1|1` are homozygous; anything else is treated as heterozygous.
    pub fn from_genotype(gt: &str) -> Self {
        match gt.trim() {
            "1/1" | "1|1" => Self::Homozygous,
            _ => Self::Heterozygous,
        }
    }

    /// Returns the lowercase name used in serialized output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heterozygous => "heterozygous",
            Self::Homozygous => "homozygous",
        }
    }

    /// Number of times a variant with this zygosity counts when ranking a gene.
    pub fn allele_count(self) -> usize {
        match self {
            Self::Heterozygous => 1,
            Self::Homozygous => 2,
        }
    }
}

/// Clinician-assigned status of a gene on a patient record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum GeneStatus {
    /// Suspected cause (also used when no status was recorded).
    Candidate,
    /// Confirmed cause.
    Solved,
    /// Ruled out.
    Rejected,
    /// Carrier gene, not causal for this patient.
    Carrier,
}

impl GeneStatus {
    /// Parses a status label.
    ///
    /// Blank labels mean `Candidate`; unknown labels return `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "candidate" => Some(Self::Candidate),
            "solved" => Some(Self::Solved),
            "rejected" => Some(Self::Rejected),
            "carrier" => Some(Self::Carrier),
            _ => None,
        }
    }

    /// Returns the lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Solved => "solved",
            Self::Rejected => "rejected",
            Self::Carrier => "carrier",
        }
    }
}

/// Review status of a stored match.
///
/// Any transition is allowed by direct assignment.
///
/// # Examples
///
/// ```
/// use phenomatch_types::MatchStatus;
///
/// assert_eq!(MatchStatus::parse("saved"), Some(MatchStatus::Saved));
/// assert_eq!(MatchStatus::default().as_str(), "uncategorized");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MatchStatus {
    /// Not yet reviewed.
    #[default]
    Uncategorized,
    /// Kept for follow-up.
    Saved,
    /// Dismissed by a reviewer.
    Rejected,
}

impl MatchStatus {
    /// Parses a status label, returning `None` for unknown labels.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "uncategorized" => Some(Self::Uncategorized),
            "saved" => Some(Self::Saved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Returns the lowercase label stored with a match.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uncategorized => "uncategorized",
            Self::Saved => "saved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access level a viewer holds on a patient record, ordered from weakest to strongest.
///
/// # Examples
///
/// ```
/// use phenomatch_types::AccessLevel;
///
/// assert!(AccessLevel::View > AccessLevel::Match);
/// assert_eq!(AccessLevel::parse("edit"), Some(AccessLevel::Edit));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AccessLevel {
    /// No access at all.
    #[default]
    None,
    /// May learn that the record matches, with restricted detail.
    Match,
    /// May read the record.
    View,
    /// May modify the record.
    Edit,
    /// May manage sharing of the record.
    Manage,
    /// Owns the record.
    Owner,
}

impl AccessLevel {
    /// Parses a level name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "match" => Some(Self::Match),
            "view" => Some(Self::View),
            "edit" => Some(Self::Edit),
            "manage" => Some(Self::Manage),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    /// Returns the lowercase level name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Match => "match",
            Self::View => "view",
            Self::Edit => "edit",
            Self::Manage => "manage",
            Self::Owner => "owner",
        }
    }
}

/// Disclosure tier applied to a similarity result for one viewer.
///
/// Ordered from least to most disclosed: `Private < Limited < Open`.
///
/// # Examples
///
/// ```
/// use phenomatch_types::{AccessLevel, AccessTier};
///
/// assert_eq!(AccessTier::from_level(AccessLevel::Owner), AccessTier::Open);
/// assert_eq!(AccessTier::from_level(AccessLevel::Match), AccessTier::Limited);
/// assert_eq!(AccessTier::from_level(AccessLevel::None), AccessTier::Private);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AccessTier {
    /// Nothing disclosed.
    Private,
    /// Counts and reference side only.
    Limited,
    /// Everything disclosed.
    Open,
}

impl AccessTier {
    /// Maps an access level onto its disclosure tier.
    ///
    /// `view` and above is open, exactly `match` is limited, anything weaker is private.
    pub fn from_level(level: AccessLevel) -> Self {
        if level >= AccessLevel::View {
            Self::Open
        } else if level == AccessLevel::Match {
            Self::Limited
        } else {
            Self::Private
        }
    }

    /// Returns the tier name, also used as the access component of cache keys.
    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Limited => "limited",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Record visibility chosen by the patient's owner, ordered from most to least restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Visibility {
    /// Visible only to owner and collaborators.
    #[default]
    Private,
    /// May take part in matching; other users get match-level access.
    Matchable,
    /// Readable by any registered user.
    Public,
    /// Readable by anyone.
    Open,
}

impl Visibility {
    /// Access level granted to users who are neither owner nor collaborator.
    pub fn default_access(self) -> AccessLevel {
        match self {
            Self::Private => AccessLevel::None,
            Self::Matchable => AccessLevel::Match,
            Self::Public | Self::Open => AccessLevel::View,
        }
    }

    /// Returns true if records with this visibility take part in matching.
    pub fn is_matchable(self) -> bool {
        self >= Self::Matchable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zygosity_from_genotype() {
        assert_eq!(Zygosity::from_genotype("1/1"), Zygosity::Homozygous);
        assert_eq!(Zygosity::from_genotype("1|1"), Zygosity::Homozygous);
        assert_eq!(Zygosity::from_genotype("0/1"), Zygosity::Heterozygous);
        assert_eq!(Zygosity::from_genotype(""), Zygosity::Heterozygous);
        assert_eq!(Zygosity::Homozygous.allele_count(), 2);
    }

    #[test]
    fn test_gene_status_parse() {
        assert_eq!(GeneStatus::parse(""), Some(GeneStatus::Candidate));
        assert_eq!(GeneStatus::parse("Solved"), Some(GeneStatus::Solved));
        assert_eq!(GeneStatus::parse("rejected"), Some(GeneStatus::Rejected));
        assert_eq!(GeneStatus::parse("maybe"), None);
    }

    #[test]
    fn test_match_status_roundtrip() {
        for status in [MatchStatus::Uncategorized, MatchStatus::Saved, MatchStatus::Rejected] {
            assert_eq!(MatchStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MatchStatus::parse("notified"), None);
    }

    #[test]
    fn test_access_tier_ordering() {
        assert!(AccessTier::Open > AccessTier::Limited);
        assert!(AccessTier::Limited > AccessTier::Private);
        assert_eq!(AccessTier::from_level(AccessLevel::View), AccessTier::Open);
        assert_eq!(AccessTier::from_level(AccessLevel::Edit), AccessTier::Open);
        assert_eq!(AccessTier::Limited.to_string(), "limited");
    }

    #[test]
    fn test_visibility_access() {
        assert_eq!(Visibility::Private.default_access(), AccessLevel::None);
        assert_eq!(Visibility::Matchable.default_access(), AccessLevel::Match);
        assert_eq!(Visibility::Public.default_access(), AccessLevel::View);
        assert!(!Visibility::Private.is_matchable());
        assert!(Visibility::Open.is_matchable());
    }
}
