//! Exome annotation backed by Exomiser output on disk.

use std::sync::Arc;

use phenomatch_engine::{ExomeAnnotator, MatchError, MatchResult};
use phenomatch_loader::{read_exomiser_path, Exome, FileSystemExomeStore};

/// Re-reads a patient's Exomiser file each time it is annotated.
#[derive(Debug, Clone)]
pub struct ExomiserFileAnnotator {
    exomes: Arc<FileSystemExomeStore>,
}

impl ExomiserFileAnnotator {
    /// Creates an annotator over an exome directory.
    pub fn new(exomes: Arc<FileSystemExomeStore>) -> Self {
        Self { exomes }
    }
}

impl ExomeAnnotator for ExomiserFileAnnotator {
    fn annotate(&self, patient_id: &str) -> MatchResult<Exome> {
        let path = self
            .exomes
            .exome_path(patient_id)
            .filter(|p| p.is_file())
            .ok_or_else(|| MatchError::Annotation {
                patient_id: patient_id.to_string(),
                message: "no exome file".to_string(),
            })?;

        self.exomes.invalidate(patient_id);
        read_exomiser_path(&path).map_err(|e| MatchError::Annotation {
            patient_id: patient_id.to_string(),
            message: e.to_string(),
        })
    }
}
