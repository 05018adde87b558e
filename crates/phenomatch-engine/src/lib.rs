//! # phenomatch-engine
//!
//! Patient similarity scoring and the match lifecycle.
//!
//! The engine compares two patients on their phenotypes (information content
//! over the ontology, grouped into clusters under shared ancestors) and on
//! their genotypes (candidate genes and exome evidence), then exposes the
//! comparison through views that disclose only what the viewer may see.
//! Discovered matches are kept as [`MatchRecord`]s in a [`MatchStore`],
//! reviewed, commented on and notified about.
//!
//! ## Components
//!
//! - [`ScoringContext`]: ontology model, genotype and access sources, and config.
//! - [`PhenotypeScorer`] / [`score_genotypes`]: the two halves of a comparison.
//! - [`redact`]: turns a [`SimilarityResult`] into an open, limited or private view.
//! - [`SimilarityViewCache`]: memoized views with per-patient invalidation.
//! - [`MatchFinder`]: scores local patients and saves matches.
//! - [`NotificationManager`]: tells patient owners about their matches.
//! - [`ExomeJobManager`]: runs exome annotation in the background.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use phenomatch_engine::{
//!     InMemoryMatchStore, InMemoryPatients, MatchFinder, PatientAccessResolver,
//!     PatientGenotypeProvider, ScoringContext, SimilarityViewCache,
//! };
//! use phenomatch_loader::{discover_data_files, load_annotations, InformationConfig,
//!     InformationModel, LoaderConfig, OntologyStore};
//!
//! let files = discover_data_files("/data/hpo")?;
//! let mut store = OntologyStore::new();
//! store.load_from_files(&files, LoaderConfig::default())?;
//! let (annotations, _) =
//!     load_annotations(files.annotations_file.as_ref().unwrap(), LoaderConfig::default())?;
//! let model = InformationModel::build(Arc::new(store), &annotations, &InformationConfig::default());
//!
//! let patients = Arc::new(InMemoryPatients::new(Vec::new()));
//! let context = ScoringContext::new(
//!     Arc::new(model),
//!     Arc::new(PatientGenotypeProvider::new(patients.clone(), None)),
//!     Arc::new(PatientAccessResolver::new(patients.clone())),
//! );
//! let finder = MatchFinder::new(
//!     context,
//!     patients,
//!     Arc::new(InMemoryMatchStore::new()),
//!     Arc::new(SimilarityViewCache::new()),
//! );
//!
//! let stats = finder.find_matches(&["P0000001".to_string()]);
//! println!("{} matches", stats.matches_found);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod finder;
pub mod genotype;
pub mod jobs;
pub mod notify;
pub mod phenotype;
pub mod record;
pub mod results;
pub mod similarity;
pub mod storage;
pub mod view;

pub use cache::{SimilarityViewCache, ViewKey};
pub use config::ScoringConfig;
pub use context::{
    AccessLevelResolver, ExomeProvider, GenotypeProvider, InMemoryPatients,
    NotificationEmailResolver, PatientAccessResolver, PatientRepository, ScoringContext,
};
pub use error::{MatchError, MatchResult};
pub use finder::{MatchFinder, MatchRunStats};
pub use genotype::{score_genotypes, GeneMatch, Genotype, GenotypeSimilarity, PatientGenotypeProvider};
pub use jobs::{CompletionHook, ExomeAnnotator, ExomeJobManager, JobStatus};
pub use notify::{MatchNotifier, NotificationManager, NotificationResponse, PatientMatchEmail};
pub use phenotype::{FeatureCluster, PhenotypeScorer, PhenotypeSimilarity};
pub use record::{
    Comment, HistoricMatch, MatchRecord, Note, NotificationHistory, PatientDetails, StorageRow,
    UserInfo,
};
pub use results::MatchedResults;
pub use similarity::{score_patients, score_profiles, SimilarityResult};
pub use storage::{InMemoryMatchStore, MatchFilter, MatchStore};
pub use view::{redact, LimitedView, RedactedView};
