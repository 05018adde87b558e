//! Generic tab-separated file parser.
//!
//! Provides a streaming parser for the tab-delimited term and annotation files.

use std::fs::File;
use std::io::{BufReader, Read};
use std::marker::PhantomData;
use std::path::Path;

use csv::{Reader, ReaderBuilder, StringRecord};

use crate::types::{LoadError, LoadResult, LoaderConfig};

/// Trait for types that can be parsed from tab-separated records.
///
/// Implement this trait for custom record types.
pub trait TsvRecord: Sized {
    /// Expected leading column names for this record type.
    const EXPECTED_COLUMNS: &'static [&'static str];

    /// Parse a record from a CSV StringRecord.
    fn from_record(record: &StringRecord) -> LoadResult<Self>;

    /// Returns true if this record passes the given filter config.
    fn passes_filter(&self, config: &LoaderConfig) -> bool;
}

/// A streaming parser for tab-separated files with a header row.
///
/// Lines starting with `#` before or between records are treated as comments.
pub struct TsvParser<R: Read, T: TsvRecord> {
    reader: Reader<R>,
    config: LoaderConfig,
    records_read: usize,
    _marker: PhantomData<T>,
}

impl<T: TsvRecord> TsvParser<BufReader<File>, T> {
    /// Creates a new parser from a file path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or has invalid headers.
    pub fn from_path<P: AsRef<Path>>(path: P, config: LoaderConfig) -> LoadResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(LoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), config)
    }
}

impl<R: Read, T: TsvRecord> TsvParser<R, T> {
    /// Creates a new parser from a reader.
    pub fn from_reader(reader: R, config: LoaderConfig) -> LoadResult<Self> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(false)
            .quoting(false)
            .comment(Some(b'#'))
            .trim(csv::Trim::None)
            .from_reader(reader);

        Self::validate_headers(&mut csv_reader)?;

        Ok(Self {
            reader: csv_reader,
            config,
            records_read: 0,
            _marker: PhantomData,
        })
    }

    /// Validates that the file has the expected column headers.
    fn validate_headers(reader: &mut Reader<R>) -> LoadResult<()> {
        let headers = reader.headers()?;
        let expected = T::EXPECTED_COLUMNS;

        if headers.len() < expected.len() {
            return Err(LoadError::InvalidHeader {
                expected: expected.len(),
                found: headers.len(),
            });
        }

        for (i, expected_col) in expected.iter().enumerate() {
            let found = headers.get(i).unwrap_or("");
            // Handle UTF-8 BOM at start of file
            let found = found.trim_start_matches('\u{feff}');
            if found != *expected_col {
                return Err(LoadError::UnexpectedColumn {
                    position: i,
                    expected: expected_col.to_string(),
                    found: found.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Returns the number of records read so far.
    pub fn records_read(&self) -> usize {
        self.records_read
    }
}

impl<R: Read, T: TsvRecord> Iterator for TsvParser<R, T> {
    type Item = LoadResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut record = StringRecord::new();
            match self.reader.read_record(&mut record) {
                Ok(true) => {
                    self.records_read += 1;

                    if record.is_empty() || record.iter().all(|f| f.trim().is_empty()) {
                        continue;
                    }

                    match T::from_record(&record) {
                        Ok(parsed) => {
                            if parsed.passes_filter(&self.config) {
                                return Some(Ok(parsed));
                            }
                            continue;
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
                Ok(false) => return None,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Helper functions for parsing field values.
pub mod parse {
    use phenomatch_types::{is_ontology_id, TermId};

    use super::{LoadError, LoadResult};

    /// Parses an ontology term id such as `HP:0001382`.
    pub fn term_id(value: &str) -> LoadResult<TermId> {
        let value = value.trim();
        if is_ontology_id(value) {
            Ok(value.to_string())
        } else {
            Err(LoadError::InvalidTermId {
                value: value.to_string(),
            })
        }
    }

    /// Parses a `|`-separated list of term ids. Empty input yields an empty list.
    pub fn term_list(value: &str) -> LoadResult<Vec<TermId>> {
        value
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(term_id)
            .collect()
    }

    /// Parses a 1-based genomic position.
    pub fn position(value: &str) -> LoadResult<u64> {
        match value.trim().parse::<u64>() {
            Ok(pos) if pos > 0 => Ok(pos),
            _ => Err(LoadError::InvalidNumber {
                value: value.to_string(),
            }),
        }
    }

    /// Parses a score that must lie in `[0, 1]`.
    pub fn score(value: &str) -> LoadResult<f64> {
        let parsed: f64 = number(value)?;
        if (0.0..=1.0).contains(&parsed) {
            Ok(parsed)
        } else {
            Err(LoadError::ScoreOutOfRange { value: parsed })
        }
    }

    /// Parses any numeric value.
    pub fn number<T: std::str::FromStr>(value: &str) -> LoadResult<T> {
        value.trim().parse::<T>().map_err(|_| LoadError::InvalidNumber {
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct PairRecord {
        left: String,
        right: String,
    }

    impl TsvRecord for PairRecord {
        const EXPECTED_COLUMNS: &'static [&'static str] = &["left", "right"];

        fn from_record(record: &StringRecord) -> LoadResult<Self> {
            Ok(Self {
                left: parse::term_id(record.get(0).unwrap_or(""))?,
                right: record.get(1).unwrap_or("").to_string(),
            })
        }

        fn passes_filter(&self, _config: &LoaderConfig) -> bool {
            self.right != "skip"
        }
    }

    #[test]
    fn test_parse_term_id() {
        assert_eq!(parse::term_id(" HP:0000118 ").unwrap(), "HP:0000118");
        assert!(parse::term_id("0000118").is_err());
        assert!(parse::term_id("").is_err());
    }

    #[test]
    fn test_parse_term_list() {
        assert_eq!(
            parse::term_list("HP:0000517|HP:0012372").unwrap(),
            vec!["HP:0000517", "HP:0012372"]
        );
        assert!(parse::term_list("").unwrap().is_empty());
        assert!(parse::term_list("HP:1|nope").is_err());
    }

    #[test]
    fn test_parse_score_and_position() {
        assert_eq!(parse::score("0.75").unwrap(), 0.75);
        assert!(parse::score("1.5").is_err());
        assert!(parse::score("abc").is_err());
        assert_eq!(parse::position("12345").unwrap(), 12345);
        assert!(parse::position("0").is_err());
    }

    #[test]
    fn test_parser_skips_comments_and_filters() {
        let data = "#description: test\n\u{feff}left\tright\nHP:0000001\tkeep\nHP:0000002\tskip\nbad\tkeep\nHP:0000003\tkeep\n";
        let parser = TsvParser::<_, PairRecord>::from_reader(data.as_bytes(), LoaderConfig::default())
            .unwrap();
        let results: Vec<_> = parser.collect();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().left, "HP:0000001");
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().left, "HP:0000003");
    }

    #[test]
    fn test_parser_rejects_wrong_header() {
        let data = "right\tleft\nHP:0000001\tkeep\n";
        let result = TsvParser::<_, PairRecord>::from_reader(data.as_bytes(), LoaderConfig::default());
        assert!(matches!(result, Err(LoadError::UnexpectedColumn { position: 0, .. })));
    }
}
