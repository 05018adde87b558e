//! Data directory discovery.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::types::{DataFiles, LoadError, LoadResult};

/// Term table file name.
pub const TERMS_FILE: &str = "terms.tsv";
/// Annotation file name.
pub const ANNOTATIONS_FILE: &str = "phenotype.hpoa";
/// Patient records file name.
pub const PATIENTS_FILE: &str = "patients.json";
/// Exome results directory name.
pub const EXOME_DIR: &str = "exomes";

/// Discovers the input files in a data directory.
///
/// An ontology source (`terms.tsv` or any `*.obo`) and `phenotype.hpoa` are
/// required; `patients.json` and `exomes/` are optional.
pub fn discover_data_files<P: AsRef<Path>>(path: P) -> LoadResult<DataFiles> {
    let path = path.as_ref();

    if !path.is_dir() {
        return Err(LoadError::DirectoryNotFound {
            path: path.display().to_string(),
        });
    }

    let mut files = DataFiles::new();

    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let filename = entry.file_name();
        let filename_str = filename.to_string_lossy();

        if entry.file_type()?.is_dir() {
            if filename_str == EXOME_DIR {
                files.exome_dir = Some(entry.path());
            }
            continue;
        }

        if filename_str == TERMS_FILE {
            files.terms_file = Some(entry.path());
        } else if filename_str == ANNOTATIONS_FILE {
            files.annotations_file = Some(entry.path());
        } else if filename_str == PATIENTS_FILE {
            files.patients_file = Some(entry.path());
        } else if filename_str.ends_with(".obo") {
            // Prefer hp.obo when several ontologies are present
            if files.obo_file.is_none() || filename_str == "hp.obo" {
                files.obo_file = Some(entry.path());
            }
        }
    }

    if let Some(obo) = &files.obo_file {
        files.data_version = obo_data_version(obo)?;
    }

    if !files.has_required_files() {
        let missing = files.missing_files();
        return Err(LoadError::RequiredFileMissing {
            file_type: missing.join(", "),
            directory: path.display().to_string(),
        });
    }

    tracing::debug!("Discovered data files: {:?}", files);
    Ok(files)
}

/// Reads the release date from an OBO header.
///
/// HPO writes `data-version: hp/releases/2024-04-26`; only the last path
/// segment is kept. Returns `None` when the header has no version tag.
pub fn obo_data_version<P: AsRef<Path>>(path: P) -> LoadResult<Option<String>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.starts_with('[') {
            break;
        }
        if let Some(version) = line.strip_prefix("data-version:") {
            let version = version.trim();
            let release = version.rsplit('/').next().unwrap_or(version);
            return Ok(Some(release.to_string()));
        }
    }
    Ok(None)
}
