//! Disease-phenotype annotation parser.
//!
//! Parses HPO annotation files (`phenotype.hpoa`). Lines starting with `#`
//! carry file metadata and are skipped.

use std::io::Read;
use std::path::Path;
use std::time::Instant;

use csv::StringRecord;
use phenomatch_types::TermId;

use crate::parser::{parse, TsvParser, TsvRecord};
use crate::types::{LoadResult, LoaderConfig, ParseStats};

/// Expected columns in a `phenotype.hpoa` file.
const ANNOTATION_COLUMNS: &[&str] = &[
    "database_id",
    "disease_name",
    "qualifier",
    "hpo_id",
    "reference",
    "evidence",
    "onset",
    "frequency",
    "sex",
    "modifier",
    "aspect",
    "biocuration",
];

/// Qualifier marking an explicitly excluded phenotype.
pub const NEGATED_QUALIFIER: &str = "NOT";

/// One disease-to-phenotype annotation row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiseaseAnnotation {
    /// Disease identifier (e.g. `OMIM:164400`).
    pub disease_id: String,
    /// Disease label.
    pub disease_name: String,
    /// True when the phenotype is explicitly excluded for the disease.
    pub negated: bool,
    /// Annotated phenotype term.
    pub term_id: TermId,
    /// Onset term, if recorded.
    pub onset: Option<TermId>,
    /// Raw frequency field, if recorded.
    pub frequency: Option<String>,
    /// Aspect code (`P` phenotype, `I` inheritance, `C` onset, `M` modifier).
    pub aspect: String,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl TsvRecord for DiseaseAnnotation {
    const EXPECTED_COLUMNS: &'static [&'static str] = ANNOTATION_COLUMNS;

    fn from_record(record: &StringRecord) -> LoadResult<Self> {
        Ok(DiseaseAnnotation {
            disease_id: record.get(0).unwrap_or("").trim().to_string(),
            disease_name: record.get(1).unwrap_or("").trim().to_string(),
            negated: record.get(2).unwrap_or("").trim() == NEGATED_QUALIFIER,
            term_id: parse::term_id(record.get(3).unwrap_or(""))?,
            onset: non_empty(record.get(6)),
            frequency: non_empty(record.get(7)),
            aspect: record.get(10).unwrap_or("").trim().to_string(),
        })
    }

    fn passes_filter(&self, config: &LoaderConfig) -> bool {
        if config.skip_negated && self.negated {
            return false;
        }
        if !config.aspects.is_empty() && !config.aspects.iter().any(|a| *a == self.aspect) {
            return false;
        }
        true
    }
}

/// Reads every annotation from a reader, skipping malformed rows.
///
/// Returns the kept annotations along with counts of what was filtered.
pub fn read_annotations<R: Read>(
    reader: R,
    config: LoaderConfig,
) -> LoadResult<(Vec<DiseaseAnnotation>, ParseStats)> {
    collect_annotations(TsvParser::from_reader(reader, config)?)
}

/// Reads every annotation from a `phenotype.hpoa` file.
pub fn load_annotations<P: AsRef<Path>>(
    path: P,
    config: LoaderConfig,
) -> LoadResult<(Vec<DiseaseAnnotation>, ParseStats)> {
    collect_annotations(TsvParser::from_path(path, config)?)
}

fn collect_annotations<R: Read>(
    mut parser: TsvParser<R, DiseaseAnnotation>,
) -> LoadResult<(Vec<DiseaseAnnotation>, ParseStats)> {
    let start = Instant::now();
    let mut annotations = Vec::new();
    let mut stats = ParseStats::default();

    for result in parser.by_ref() {
        match result {
            Ok(annotation) => annotations.push(annotation),
            Err(e) => {
                stats.error_count += 1;
                tracing::debug!("Skipping annotation row: {}", e);
            }
        }
    }

    stats.total_records = parser.records_read();
    stats.filtered_records = annotations.len();
    stats.skipped_records = stats
        .total_records
        .saturating_sub(stats.filtered_records + stats.error_count);
    stats.parse_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        "Loaded {} annotations ({:.1}% kept, {} errors)",
        stats.filtered_records,
        stats.filter_rate(),
        stats.error_count
    );

    Ok((annotations, stats))
}
