//! Patient records from `patients.json`.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use phenomatch_engine::InMemoryPatients;
use phenomatch_types::Patient;

use crate::error::ServiceResult;

/// Parses a JSON array of patient records.
///
/// Records without an id are dropped, and of several records sharing an id
/// only the first is kept.
pub fn read_patients<R: Read>(reader: R) -> ServiceResult<Vec<Patient>> {
    let records: Vec<Patient> = serde_json::from_reader(reader)?;
    let total = records.len();

    let mut seen = HashSet::new();
    let patients: Vec<Patient> = records
        .into_iter()
        .filter(|p| !p.id.is_empty() && seen.insert(p.id.clone()))
        .collect();

    if patients.len() < total {
        tracing::warn!(
            "Skipped {} patient records with a missing or duplicate id",
            total - patients.len()
        );
    }
    Ok(patients)
}

/// Loads the patient repository from a file.
pub fn load_patients<P: AsRef<Path>>(path: P) -> ServiceResult<InMemoryPatients> {
    let file = File::open(path.as_ref())?;
    let patients = read_patients(BufReader::new(file))?;
    tracing::info!(
        "Loaded {} patients from {}",
        patients.len(),
        path.as_ref().display()
    );
    Ok(InMemoryPatients::new(patients))
}
