//! # phenomatch-loader
//!
//! Loaders for the reference data behind phenotype matching.
//!
//! This crate reads the phenotype ontology (a tab-separated term table or an
//! OBO file), the disease-phenotype annotation file (`phenotype.hpoa`) and
//! per-patient Exomiser results. From the ontology and annotations it builds
//! the [`InformationModel`], the read-only information content table used by
//! the scoring engine.
//!
//! ## Features
//!
//! - `parallel` (default): Builds the information content table on the rayon
//!   thread pool.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use phenomatch_loader::{
//!     discover_data_files, load_annotations, InformationConfig, InformationModel, LoaderConfig,
//!     OntologyStore,
//! };
//!
//! let files = discover_data_files("/data/hpo")?;
//!
//! let mut store = OntologyStore::new();
//! store.load_from_files(&files, LoaderConfig::default())?;
//!
//! let (annotations, stats) =
//!     load_annotations(files.annotations_file.as_ref().unwrap(), LoaderConfig::default())?;
//! println!("kept {:.1}% of annotation rows", stats.filter_rate());
//!
//! let model = InformationModel::build(Arc::new(store), &annotations, &InformationConfig::default());
//! println!("IC(HP:0001382) = {:.3}", model.ic("HP:0001382"));
//! # Ok::<(), phenomatch_loader::LoadError>(())
//! ```

#![warn(missing_docs)]

pub mod annotation;
pub mod exome;
pub mod information;
pub mod loader;
pub mod obo;
pub mod parser;
pub mod store;
pub mod term;
pub mod types;

pub use annotation::{load_annotations, read_annotations, DiseaseAnnotation, NEGATED_QUALIFIER};
pub use exome::{
    read_exomiser, read_exomiser_path, Exome, FileSystemExomeStore, GeneEvidence,
};
pub use information::{clamp_probability, InformationModel, InformationStats};
pub use loader::discover_data_files;
pub use obo::{read_obo, read_obo_path};
pub use parser::{TsvParser, TsvRecord};
pub use store::OntologyStore;
pub use types::{
    DataFiles, InformationConfig, LoadError, LoadResult, LoaderConfig, ParseStats,
};

// Re-export phenomatch-types for convenience
pub use phenomatch_types;
