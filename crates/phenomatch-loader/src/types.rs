//! Loader-specific types: errors, configuration, statistics and file sets.

use std::path::PathBuf;
use thiserror::Error;

use phenomatch_types::well_known;

/// Errors that can occur while loading ontology, annotation or exome files.
#[derive(Error, Debug)]
pub enum LoadError {
    /// I/O error reading an input file.
    #[error("IO error reading input file: {0}")]
    Io(#[from] std::io::Error),

    /// CSV/TSV parsing error.
    #[error("TSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid ontology term id.
    #[error("Invalid term id: {value}")]
    InvalidTermId {
        /// The invalid value that was encountered.
        value: String,
    },

    /// Invalid numeric value.
    #[error("Invalid number: {value}")]
    InvalidNumber {
        /// The invalid value.
        value: String,
    },

    /// Score outside of `[0, 1]`.
    #[error("Score out of range [0, 1]: {value}")]
    ScoreOutOfRange {
        /// The offending score.
        value: f64,
    },

    /// Missing required column in a header-driven file.
    #[error("Missing required column: {column}")]
    MissingColumn {
        /// The name of the missing column.
        column: String,
    },

    /// File not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Directory not found.
    #[error("Directory not found: {path}")]
    DirectoryNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Required file missing from the data directory.
    #[error("Required data file not found: {file_type} in {directory}")]
    RequiredFileMissing {
        /// The type of file that was missing.
        file_type: String,
        /// The directory that was searched.
        directory: String,
    },

    /// Invalid header - column count mismatch.
    #[error("Invalid header: expected {expected} columns, found {found}")]
    InvalidHeader {
        /// Expected column count.
        expected: usize,
        /// Found column count.
        found: usize,
    },

    /// Unexpected column name.
    #[error("Unexpected column '{found}' at position {position}, expected '{expected}'")]
    UnexpectedColumn {
        /// The column position.
        position: usize,
        /// Expected column name.
        expected: String,
        /// Found column name.
        found: String,
    },

    /// Malformed OBO stanza line.
    #[error("OBO syntax error at line {line}: {message}")]
    Obo {
        /// 1-based line number.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },

    /// Generic parse error.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type for loader operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Configuration for reading annotation and term files.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Skip annotations whose qualifier is `NOT`.
    pub skip_negated: bool,
    /// Annotation aspects to keep (empty = all aspects).
    pub aspects: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            skip_negated: true,
            aspects: vec!["P".to_string()],
        }
    }
}

impl LoaderConfig {
    /// Keeps every annotation aspect (inheritance, onset, frequency, ...).
    pub fn all_aspects() -> Self {
        Self {
            aspects: vec![],
            ..Self::default()
        }
    }

    /// Keeps everything, including negated annotations.
    pub fn unfiltered() -> Self {
        Self {
            skip_negated: false,
            aspects: vec![],
            ..Self::default()
        }
    }
}

/// Configuration for building the information content table.
#[derive(Debug, Clone)]
pub struct InformationConfig {
    /// Probability clamp; keeps `-ln(p)` finite.
    pub epsilon: f64,
    /// Term whose descendants receive mass. Symptoms outside it are ignored.
    pub root: String,
    /// Allowed deviation of the root mass from 1 before a warning is logged.
    pub root_mass_tolerance: f64,
}

impl Default for InformationConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-9,
            root: well_known::PHENOTYPIC_ABNORMALITY.to_string(),
            root_mass_tolerance: 1e-6,
        }
    }
}

impl InformationConfig {
    /// Uses the whole ontology (`HP:0000001`) as the normalization root.
    pub fn whole_ontology() -> Self {
        Self {
            root: well_known::ALL.to_string(),
            ..Self::default()
        }
    }
}

/// Statistics from parsing an input file.
#[derive(Debug, Clone, Default)]
pub struct ParseStats {
    /// Total records read from file.
    pub total_records: usize,
    /// Records that passed filters.
    pub filtered_records: usize,
    /// Records skipped (negated, wrong aspect, ...).
    pub skipped_records: usize,
    /// Parse errors encountered (non-fatal).
    pub error_count: usize,
    /// Time taken to parse in milliseconds.
    pub parse_time_ms: u64,
}

impl ParseStats {
    /// Returns the percentage of records that passed filters.
    pub fn filter_rate(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            (self.filtered_records as f64 / self.total_records as f64) * 100.0
        }
    }
}

/// Discovered input files in a data directory.
#[derive(Debug, Clone, Default)]
pub struct DataFiles {
    /// Tab-separated term table (`id`, `name`, `parents`).
    pub terms_file: Option<PathBuf>,
    /// OBO ontology file (used when no term table is present).
    pub obo_file: Option<PathBuf>,
    /// Disease-phenotype annotation file (`phenotype.hpoa`).
    pub annotations_file: Option<PathBuf>,
    /// Patient records (`patients.json`).
    pub patients_file: Option<PathBuf>,
    /// Directory holding per-patient exome results.
    pub exome_dir: Option<PathBuf>,
    /// Ontology release read from the OBO header (e.g. `2024-04-26`).
    pub data_version: Option<String>,
}

impl DataFiles {
    /// Creates a new empty file set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if an ontology source and the annotation file are present.
    pub fn has_required_files(&self) -> bool {
        (self.terms_file.is_some() || self.obo_file.is_some()) && self.annotations_file.is_some()
    }

    /// Returns a list of missing required files.
    pub fn missing_files(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.terms_file.is_none() && self.obo_file.is_none() {
            missing.push("Ontology");
        }
        if self.annotations_file.is_none() {
            missing.push("Annotations");
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_config_default() {
        let config = LoaderConfig::default();
        assert!(config.skip_negated);
        assert_eq!(config.aspects, vec!["P"]);
    }

    #[test]
    fn test_loader_config_unfiltered() {
        let config = LoaderConfig::unfiltered();
        assert!(!config.skip_negated);
        assert!(config.aspects.is_empty());
    }

    #[test]
    fn test_information_config_default() {
        let config = InformationConfig::default();
        assert_eq!(config.epsilon, 1e-9);
        assert_eq!(config.root, "HP:0000118");
        assert_eq!(InformationConfig::whole_ontology().root, "HP:0000001");
    }

    #[test]
    fn test_parse_stats_filter_rate() {
        let stats = ParseStats {
            total_records: 200,
            filtered_records: 150,
            ..Default::default()
        };
        assert!((stats.filter_rate() - 75.0).abs() < 0.01);
        assert_eq!(ParseStats::default().filter_rate(), 0.0);
    }

    #[test]
    fn test_data_files_missing() {
        let files = DataFiles {
            obo_file: Some(PathBuf::from("hp.obo")),
            ..Default::default()
        };

        assert!(!files.has_required_files());
        assert_eq!(files.missing_files(), vec!["Annotations"]);
    }
}
