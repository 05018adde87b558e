//! Collaborator interfaces and the scoring context that threads them through calls.
//!
//! Patient storage, genotype lookup, exome results, notification recipients
//! and permissions all live outside the engine. Each is reached through one
//! narrow trait; [`ScoringContext`] bundles the ones scoring needs.

use std::collections::HashMap;
use std::sync::Arc;

use phenomatch_loader::{Exome, FileSystemExomeStore, InformationModel};
use phenomatch_types::{AccessLevel, Patient};

use crate::config::ScoringConfig;
use crate::genotype::Genotype;

/// Read access to patient records.
pub trait PatientRepository: Send + Sync {
    /// Returns a patient by id.
    fn get(&self, id: &str) -> Option<Arc<Patient>>;

    /// Returns every known patient id.
    fn ids(&self) -> Vec<String>;
}

/// Per-patient genotype lookup.
pub trait GenotypeProvider: Send + Sync {
    /// Returns the patient's genotype, or `None` when nothing is known.
    fn get_genotype(&self, patient_id: &str) -> Option<Arc<Genotype>>;
}

/// Per-patient exome annotation results.
pub trait ExomeProvider: Send + Sync {
    /// Returns the patient's ranked exome, or `None` if it was never annotated.
    fn get_exome(&self, patient_id: &str) -> Option<Arc<Exome>>;
}

/// Resolves who should be told about a patient's matches.
pub trait NotificationEmailResolver: Send + Sync {
    /// Returns the contact addresses for a patient.
    fn get_emails(&self, patient_id: &str) -> Vec<String>;
}

/// Resolves how much of a patient a viewer may see.
pub trait AccessLevelResolver: Send + Sync {
    /// Returns the viewer's access level on the patient.
    fn level_for(&self, viewer_id: &str, patient_id: &str) -> AccessLevel;
}

impl ExomeProvider for FileSystemExomeStore {
    fn get_exome(&self, patient_id: &str) -> Option<Arc<Exome>> {
        FileSystemExomeStore::get_exome(self, patient_id)
    }
}

/// Patients held in memory, keyed by id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPatients {
    patients: HashMap<String, Arc<Patient>>,
}

impl InMemoryPatients {
    /// Creates a repository from patient records.
    pub fn new(patients: impl IntoIterator<Item = Patient>) -> Self {
        Self {
            patients: patients
                .into_iter()
                .map(|p| (p.id.clone(), Arc::new(p)))
                .collect(),
        }
    }

    /// Adds or replaces a patient.
    pub fn insert(&mut self, patient: Patient) {
        self.patients.insert(patient.id.clone(), Arc::new(patient));
    }

    /// Number of patients.
    pub fn len(&self) -> usize {
        self.patients.len()
    }

    /// Returns true if there are no patients.
    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }
}

impl PatientRepository for InMemoryPatients {
    fn get(&self, id: &str) -> Option<Arc<Patient>> {
        self.patients.get(id).cloned()
    }

    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.patients.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl NotificationEmailResolver for InMemoryPatients {
    fn get_emails(&self, patient_id: &str) -> Vec<String> {
        self.patients
            .get(patient_id)
            .map(|p| p.contact_emails.clone())
            .unwrap_or_default()
    }
}

/// Access levels derived from each patient's reporter, collaborators and visibility.
pub struct PatientAccessResolver {
    patients: Arc<dyn PatientRepository>,
}

impl PatientAccessResolver {
    /// Creates a resolver over a repository.
    pub fn new(patients: Arc<dyn PatientRepository>) -> Self {
        Self { patients }
    }
}

impl AccessLevelResolver for PatientAccessResolver {
    fn level_for(&self, viewer_id: &str, patient_id: &str) -> AccessLevel {
        self.patients
            .get(patient_id)
            .map(|p| p.access_for(viewer_id))
            .unwrap_or(AccessLevel::None)
    }
}

/// Everything a scorer needs, passed explicitly instead of looked up globally.
#[derive(Clone)]
pub struct ScoringContext {
    /// Information content table over the loaded ontology.
    pub ontology: Arc<InformationModel>,
    /// Genotype source for both sides of a comparison.
    pub genotypes: Arc<dyn GenotypeProvider>,
    /// Viewer permission source.
    pub access: Arc<dyn AccessLevelResolver>,
    /// Scoring constants.
    pub config: ScoringConfig,
}

impl std::fmt::Debug for ScoringContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringContext")
            .field("terms", &self.ontology.store().term_count())
            .field("config", &self.config)
            .finish()
    }
}

impl ScoringContext {
    /// Creates a context with the default scoring configuration.
    pub fn new(
        ontology: Arc<InformationModel>,
        genotypes: Arc<dyn GenotypeProvider>,
        access: Arc<dyn AccessLevelResolver>,
    ) -> Self {
        Self {
            ontology,
            genotypes,
            access,
            config: ScoringConfig::default(),
        }
    }

    /// Replaces the scoring configuration.
    pub fn with_config(mut self, config: ScoringConfig) -> Self {
        self.config = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phenomatch_types::Visibility;

    fn patients() -> InMemoryPatients {
        let mut owned = Patient::new("P0000001");
        owned.reporter = Some("alice".to_string());
        owned.collaborators = vec!["carol".to_string()];
        owned.visibility = Visibility::Matchable;
        owned.contact_emails = vec!["alice@example.org".to_string()];
        InMemoryPatients::new(vec![owned, Patient::new("P0000002")])
    }

    #[test]
    fn test_in_memory_patients() {
        let repo = patients();
        assert_eq!(repo.len(), 2);
        assert_eq!(repo.ids(), vec!["P0000001", "P0000002"]);
        assert!(repo.get("P0000003").is_none());
        assert_eq!(repo.get_emails("P0000001"), vec!["alice@example.org"]);
        assert!(repo.get_emails("P0000003").is_empty());
    }

    #[test]
    fn test_patient_access_resolver() {
        let resolver = PatientAccessResolver::new(Arc::new(patients()));
        assert_eq!(resolver.level_for("alice", "P0000001"), AccessLevel::Owner);
        assert_eq!(resolver.level_for("carol", "P0000001"), AccessLevel::View);
        assert_eq!(resolver.level_for("bob", "P0000001"), AccessLevel::Match);
        assert_eq!(resolver.level_for("bob", "P0000002"), AccessLevel::None);
        assert_eq!(resolver.level_for("bob", "missing"), AccessLevel::None);
    }
}
