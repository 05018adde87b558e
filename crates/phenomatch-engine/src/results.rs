//! Paginated similar-patient results for one reference patient.

use std::sync::Arc;

use serde_json::{json, Value};

use phenomatch_types::Patient;

use crate::error::{MatchError, MatchResult};
use crate::view::RedactedView;

/// Views of every patient similar to a reference, best first.
#[derive(Debug, Clone)]
pub struct MatchedResults {
    reference: Arc<Patient>,
    matches: Vec<Arc<RedactedView>>,
}

impl MatchedResults {
    /// Collects views, sorting them by descending score.
    pub fn new(reference: Arc<Patient>, mut matches: Vec<Arc<RedactedView>>) -> Self {
        matches.sort_by(|a, b| b.score().total_cmp(&a.score()));
        Self { reference, matches }
    }

    /// The reference patient.
    pub fn reference(&self) -> &Patient {
        &self.reference
    }

    /// All views, best first.
    pub fn matches(&self) -> &[Arc<RedactedView>] {
        &self.matches
    }

    /// Number of views.
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Returns true if nothing matched.
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// One page of results.
    ///
    /// `from` is zero-based; a negative `max` returns everything after `from`.
    /// `from` 0 is always accepted, any other offset must point at a view.
    pub fn to_json(&self, from: i64, max: i64) -> MatchResult<Value> {
        if from < 0 {
            return Err(MatchError::InvalidArgument(format!("fromIndex({}) < 0", from)));
        }
        let size = self.matches.len();
        let start = usize::try_from(from).unwrap_or(usize::MAX);
        if start > 0 && start >= size {
            return Err(MatchError::InvalidArgument(format!(
                "fromIndex({}) > numMatches({})",
                from, size
            )));
        }

        let end = match usize::try_from(max) {
            Ok(max) => size.min(start.saturating_add(max)),
            Err(_) => size,
        };
        let results: Vec<Value> = self.matches[start..end].iter().map(|v| v.to_json()).collect();

        Ok(json!({
            "query": query_json(&self.reference),
            "resultsCount": size,
            "returnedCount": results.len(),
            "offset": from + 1,
            "results": results,
        }))
    }
}

/// Reference summary echoed with each page: the id and observed features only.
fn query_json(reference: &Patient) -> Value {
    let features: Vec<Value> = reference
        .present_features()
        .map(|f| json!({ "id": f.id, "name": f.name }))
        .collect();
    json!({
        "id": reference.id,
        "features": features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use phenomatch_types::AccessTier;

    use crate::similarity::tests::{context_for, patient};
    use crate::view::redact;

    fn results() -> MatchedResults {
        let reference = patient("P0000001", "alice", &["HP:0010696"], &["SRCAP"]);
        let others = vec![
            patient("P0000002", "bob", &["HP:0001371"], &[]),
            patient("P0000003", "bob", &["HP:0010696"], &["SRCAP"]),
            patient("P0000004", "bob", &["HP:0000518"], &[]),
        ];
        let mut all = others.clone();
        all.push(reference.clone());
        let (context, _) = context_for(all);

        let reference = Arc::new(reference);
        let views = others
            .into_iter()
            .map(|p| {
                let result = Arc::new(context.score(&Arc::new(p), &reference));
                Arc::new(redact(&result, AccessTier::Open, context.ontology.store()))
            })
            .collect();
        MatchedResults::new(reference, views)
    }

    #[test]
    fn test_sorted_by_score() {
        let results = results();
        let scores: Vec<f64> = results.matches().iter().map(|v| v.score()).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(results.matches()[0].matched_id(), Some("P0000003"));
    }

    #[test]
    fn test_page() {
        let results = results();
        let page = results.to_json(1, 1).unwrap();
        assert_eq!(page["resultsCount"], 3);
        assert_eq!(page["returnedCount"], 1);
        assert_eq!(page["offset"], 2);
        assert_eq!(page["query"]["id"], "P0000001");
        assert_eq!(page["query"]["features"][0]["id"], "HP:0010696");

        let rest = results.to_json(1, -1).unwrap();
        assert_eq!(rest["returnedCount"], 2);
        let capped = results.to_json(2, 10).unwrap();
        assert_eq!(capped["returnedCount"], 1);
    }

    #[test]
    fn test_query_is_summary() {
        let mut reference = patient("P0000001", "alice", &["HP:0010696"], &["SRCAP"]);
        reference.contact_emails = vec!["alice@example.org".to_string()];
        reference.collaborators = vec!["carol".to_string()];
        let results = MatchedResults::new(Arc::new(reference), Vec::new());

        let query = &results.to_json(0, 10).unwrap()["query"];
        let keys: Vec<&String> = query.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["features", "id"]);
        assert!(!query.to_string().contains("alice@example.org"));
        assert!(!query.to_string().contains("SRCAP"));
    }

    #[test]
    fn test_page_bounds() {
        let results = results();
        assert!(matches!(results.to_json(-1, 5), Err(MatchError::InvalidArgument(_))));
        assert!(matches!(results.to_json(3, 5), Err(MatchError::InvalidArgument(_))));

        let empty = MatchedResults::new(Arc::new(Patient::new("P0000009")), Vec::new());
        let page = empty.to_json(0, 10).unwrap();
        assert_eq!(page["returnedCount"], 0);
        assert_eq!(page["offset"], 1);
    }
}
