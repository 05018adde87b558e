//! OBO 1.2 ontology reader.
//!
//! Only `[Term]` stanzas are read, and from those only the `id`, `name`,
//! `alt_id`, `is_a` and `is_obsolete` tags. Header tags and other stanza
//! types (`[Typedef]`, `[Instance]`) are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use phenomatch_types::OntologyTerm;

use crate::parser::parse;
use crate::types::{LoadError, LoadResult};

#[derive(Debug, Default)]
struct Stanza {
    id: Option<String>,
    name: String,
    parents: Vec<String>,
    alt_ids: Vec<String>,
    obsolete: bool,
    start_line: usize,
}

impl Stanza {
    fn finish(self) -> LoadResult<Option<OntologyTerm>> {
        let id = self.id.ok_or_else(|| LoadError::Obo {
            line: self.start_line,
            message: "[Term] stanza without id".to_string(),
        })?;
        if self.obsolete {
            return Ok(None);
        }
        let mut term = OntologyTerm::new(id, self.name, self.parents);
        term.alt_ids = self.alt_ids;
        Ok(Some(term))
    }
}

/// Strips trailing `! comment` and `{qualifier}` parts from a tag value.
fn tag_value(raw: &str) -> &str {
    let value = raw.split('!').next().unwrap_or("");
    let value = value.split('{').next().unwrap_or("");
    value.trim()
}

/// Reads all non-obsolete terms from OBO text.
pub fn read_obo<R: BufRead>(reader: R) -> LoadResult<Vec<OntologyTerm>> {
    let mut terms = Vec::new();
    let mut current: Option<Stanza> = None;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('!') {
            continue;
        }

        if trimmed.starts_with('[') {
            if let Some(stanza) = current.take() {
                terms.extend(stanza.finish()?);
            }
            if trimmed == "[Term]" {
                current = Some(Stanza {
                    start_line: line_no,
                    ..Default::default()
                });
            }
            continue;
        }

        let Some(stanza) = current.as_mut() else {
            // Header tags or a non-term stanza
            continue;
        };

        let (tag, raw) = trimmed.split_once(':').ok_or_else(|| LoadError::Obo {
            line: line_no,
            message: format!("expected 'tag: value', found '{}'", trimmed),
        })?;

        match tag.trim() {
            "id" => stanza.id = Some(parse::term_id(tag_value(raw))?),
            "name" => stanza.name = raw.trim().to_string(),
            "alt_id" => stanza.alt_ids.push(parse::term_id(tag_value(raw))?),
            "is_a" => stanza.parents.push(parse::term_id(tag_value(raw))?),
            "is_obsolete" => stanza.obsolete = tag_value(raw) == "true",
            _ => {}
        }
    }

    if let Some(stanza) = current.take() {
        terms.extend(stanza.finish()?);
    }

    Ok(terms)
}

/// Reads all non-obsolete terms from an OBO file.
pub fn read_obo_path<P: AsRef<Path>>(path: P) -> LoadResult<Vec<OntologyTerm>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    read_obo(BufReader::new(File::open(path)?))
}
