//! Term table parser.
//!
//! Parses tab-separated term tables with an `id`, `name` and `parents` column,
//! where parents are `|`-separated term ids.

use csv::StringRecord;
use phenomatch_types::OntologyTerm;

use crate::parser::{parse, TsvRecord};
use crate::types::{LoadResult, LoaderConfig};

/// Expected columns in a term table.
const TERM_COLUMNS: &[&str] = &["id", "name", "parents"];

impl TsvRecord for OntologyTerm {
    const EXPECTED_COLUMNS: &'static [&'static str] = TERM_COLUMNS;

    fn from_record(record: &StringRecord) -> LoadResult<Self> {
        let mut term = OntologyTerm::new(
            parse::term_id(record.get(0).unwrap_or(""))?,
            record.get(1).unwrap_or("").trim(),
            parse::term_list(record.get(2).unwrap_or(""))?,
        );
        // Optional fourth column with alternative ids
        if let Some(alt) = record.get(3) {
            term.alt_ids = parse::term_list(alt)?;
        }
        Ok(term)
    }

    fn passes_filter(&self, _config: &LoaderConfig) -> bool {
        true
    }
}
