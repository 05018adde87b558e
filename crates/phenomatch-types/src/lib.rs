//! # phenomatch-types
//!
//! Type definitions for phenotype and genotype patient matching.
//!
//! This crate provides the plain data model shared by the loader, the scoring
//! engine and the service: ontology terms, phenotypic features, disorders,
//! variants, candidate genes, patients and the access/status enums.
//!
//! ## Features
//!
//! - `serde` (default): Enables serialization/deserialization support via serde.
//!   Disable this feature for zero-dependency usage.
//!
//! ## Usage
//!
//! ```rust
//! use phenomatch_types::{AccessLevel, AccessTier, CandidateGene, Feature, Patient, Visibility};
//!
//! let mut patient = Patient::new("P0000001");
//! patient.reporter = Some("alice".to_string());
//! patient.visibility = Visibility::Matchable;
//! patient.features.push(Feature::present("HP:0001382", "Joint hypermobility"));
//! patient.genes.push(CandidateGene::new("SRCAP", "candidate"));
//!
//! assert_eq!(patient.candidate_genes().len(), 1);
//! assert_eq!(AccessTier::from_level(patient.access_for("bob")), AccessTier::Limited);
//! assert_eq!(patient.access_for("alice"), AccessLevel::Owner);
//! ```

#![warn(missing_docs)]

mod enums;
mod feature;
mod gene;
mod patient;
mod term;
mod variant;
pub mod well_known;

// Re-export all public types at crate root
pub use enums::{AccessLevel, AccessTier, GeneStatus, MatchStatus, Visibility, Zygosity};
pub use feature::{Disorder, Feature, META_AGE_OF_ONSET, META_MODE_OF_INHERITANCE};
pub use gene::{select_candidate_genes, CandidateGene};
pub use patient::Patient;
pub use term::{is_ontology_id, OntologyTerm, TermId};
pub use variant::{normalize_chromosome, Variant};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_types_are_exported() {
        // Verify all types are accessible from crate root
        let _id: TermId = "HP:0000118".to_string();
        let _status = MatchStatus::Saved;
        let _tier = AccessTier::Limited;
        let _level = AccessLevel::Manage;
        let _zygosity = Zygosity::Homozygous;
        let _visibility = Visibility::Public;
    }

    #[test]
    fn test_well_known_accessible() {
        assert_eq!(well_known::ALL, "HP:0000001");
        assert_eq!(well_known::PHENOTYPIC_ABNORMALITY, "HP:0000118");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_patient_from_json() {
        let json = r#"{
            "id": "P0000003",
            "reporter": "alice",
            "visibility": "matchable",
            "features": [
                {"id": "HP:0001382", "name": "Joint hypermobility"},
                {"id": "HP:0000518", "name": "Cataract", "present": false}
            ],
            "genes": [{"gene": "SRCAP"}, {"gene": "TTN", "status": "rejected"}]
        }"#;

        let patient: Patient = serde_json::from_str(json).unwrap();
        assert_eq!(patient.visibility, Visibility::Matchable);
        assert_eq!(patient.present_feature_count(), 1);
        assert_eq!(
            patient.candidate_genes().into_iter().collect::<Vec<_>>(),
            vec!["SRCAP"]
        );
        assert!(!patient.solved);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let term = OntologyTerm::new("HP:0000518", "Cataract", ["HP:0000517"]);
        let json = serde_json::to_string(&term).unwrap();
        let parsed: OntologyTerm = serde_json::from_str(&json).unwrap();
        assert_eq!(term, parsed);
    }
}
