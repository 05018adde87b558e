//! Match persistence.
//!
//! [`MatchStore`] is the seam to whatever database keeps match rows.
//! [`InMemoryMatchStore`] keeps [`StorageRow`]s in a map and is what the
//! service and tests run against.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;

use phenomatch_types::MatchStatus;

use crate::config::ScoringConfig;
use crate::error::{MatchError, MatchResult};
use crate::record::{HistoricMatch, MatchRecord, StorageRow, UserInfo, SCORE_EPSILON};
use crate::similarity::SimilarityResult;

/// Criteria for [`MatchStore::load_matches`].
#[derive(Debug, Clone, Default)]
pub struct MatchFilter {
    /// Only matches involving this patient on either side.
    pub patient_id: Option<String>,
    /// Minimum overall score.
    pub min_score: f64,
    /// Minimum phenotype score.
    pub min_phenotype_score: f64,
    /// Minimum genotype score.
    pub min_genotype_score: f64,
    /// Earliest found timestamp, inclusive.
    pub from: Option<DateTime<Utc>>,
    /// Latest found timestamp, inclusive.
    pub to: Option<DateTime<Utc>>,
}

impl MatchFilter {
    /// Matches involving one patient.
    pub fn for_patient(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: Some(patient_id.into()),
            ..Self::default()
        }
    }

    /// Returns a copy with a different minimum overall score.
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Returns a copy restricted to a found-date range.
    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Returns true if a row passes every criterion.
    pub fn accepts(&self, row: &StorageRow) -> bool {
        if let Some(patient_id) = &self.patient_id {
            if row.reference_patient_id != *patient_id && row.matched_patient_id != *patient_id {
                return false;
            }
        }
        row.score >= self.min_score
            && row.phenotype_score >= self.min_phenotype_score
            && row.genotype_score >= self.min_genotype_score
            && self.from.map_or(true, |from| row.found_timestamp >= from)
            && self.to.map_or(true, |to| row.found_timestamp <= to)
    }
}

/// Persistence operations on match records.
///
/// Records are stored in canonical orientation and receive monotonically
/// increasing ids. Superseded and removed records are archived, never lost.
pub trait MatchStore: Send + Sync {
    /// Reconciles freshly computed local matches for one reference patient
    /// with the stored ones. Returns the records that were written.
    fn save_local_matches(
        &self,
        results: &[SimilarityResult],
        patient_id: &str,
    ) -> MatchResult<Vec<MatchRecord>>;

    /// Same as [`save_local_matches`](Self::save_local_matches) for matches
    /// against a remote server. `incoming` means the reference patient is remote.
    fn save_remote_matches(
        &self,
        results: &[SimilarityResult],
        patient_id: &str,
        server_id: &str,
        incoming: bool,
    ) -> MatchResult<Vec<MatchRecord>>;

    /// Stored matches passing a filter, ordered by id.
    fn load_matches(&self, filter: &MatchFilter) -> Vec<MatchRecord>;

    /// Stored matches with the given ids. Unknown ids are skipped.
    fn load_matches_by_ids(&self, ids: &[u64]) -> Vec<MatchRecord>;

    /// Sets a match's review status.
    fn set_status(&self, match_id: u64, status: MatchStatus) -> MatchResult<MatchRecord>;

    /// Sets the user-contacted flag.
    fn set_user_contacted(&self, match_id: u64, contacted: bool) -> MatchResult<MatchRecord>;

    /// Appends a comment.
    fn save_comment(&self, match_id: u64, user: &UserInfo, comment: &str) -> MatchResult<MatchRecord>;

    /// Sets a user's note.
    fn add_note(&self, match_id: u64, user: &str, note: &str) -> MatchResult<MatchRecord>;

    /// Appends an interaction to a match's history, and to its mirror if the
    /// match is remote. Returns the updated records.
    fn update_notification_history(
        &self,
        match_id: u64,
        interaction: Value,
    ) -> MatchResult<Vec<MatchRecord>>;

    /// Marks a match as notified.
    fn mark_notified(&self, match_id: u64) -> MatchResult<MatchRecord>;

    /// Archives and removes every match involving a local patient.
    fn delete_matches_for_local_patient(&self, patient_id: &str) -> usize;

    /// Archived records, oldest first.
    fn history(&self) -> Vec<HistoricMatch>;

    /// Number of stored matches involving a remote server.
    fn remote_match_count(&self) -> usize;
}

#[derive(Debug, Default)]
struct StoreInner {
    rows: BTreeMap<u64, StorageRow>,
    history: Vec<HistoricMatch>,
    next_id: u64,
}

impl StoreInner {
    fn insert(&mut self, mut record: MatchRecord) -> MatchRecord {
        self.next_id += 1;
        record.set_id(self.next_id);
        record.canonicalize();
        self.rows.insert(self.next_id, record.to_storage_row());
        record
    }

    fn archive_and_remove(&mut self, id: u64) {
        if let Some(row) = self.rows.remove(&id) {
            self.history
                .push(MatchRecord::from_storage_row(&row).archive_to_history());
        }
    }

    /// Stored matches for a patient against one server, keyed by the other patient's id.
    fn existing_for(
        &self,
        patient_id: &str,
        reference_server_id: &str,
        matched_server_id: &str,
    ) -> HashMap<String, MatchRecord> {
        let mut by_other = HashMap::new();
        for row in self.rows.values() {
            let record = MatchRecord::from_storage_row(row);
            if record.is_reference(patient_id, reference_server_id)
                && record.matched_server_id() == matched_server_id
            {
                by_other.insert(record.matched_patient_id().to_string(), record);
            } else if record.is_matched(patient_id, reference_server_id)
                && record.reference_server_id() == matched_server_id
            {
                by_other.insert(record.reference_patient_id().to_string(), record);
            }
        }
        by_other
    }
}

/// Map-backed [`MatchStore`].
pub struct InMemoryMatchStore {
    inner: RwLock<StoreInner>,
    score_epsilon: f64,
}

impl std::fmt::Debug for InMemoryMatchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InMemoryMatchStore")
            .field("matches", &inner.rows.len())
            .field("history", &inner.history.len())
            .finish()
    }
}

impl Default for InMemoryMatchStore {
    fn default() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            score_epsilon: SCORE_EPSILON,
        }
    }
}

impl InMemoryMatchStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store using the configured score tolerance.
    pub fn with_config(config: &ScoringConfig) -> Self {
        Self {
            score_epsilon: config.score_epsilon,
            ..Self::default()
        }
    }

    /// Number of live matches.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .len()
    }

    /// Returns true if no matches are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn save_matches(
        &self,
        results: &[SimilarityResult],
        patient_id: &str,
        reference_server_id: &str,
        matched_server_id: &str,
    ) -> MatchResult<Vec<MatchRecord>> {
        tracing::debug!(
            "Saving {} matches for patient {} @ server '{}'",
            results.len(),
            patient_id,
            reference_server_id
        );

        if let Some(other) = results.iter().find(|r| r.reference_id() != patient_id) {
            return Err(MatchError::InvalidArgument(format!(
                "Matches to save for reference patient {} also contain reference patient {}",
                patient_id,
                other.reference_id()
            )));
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut existing = inner.existing_for(patient_id, reference_server_id, matched_server_id);
        let mut saved = Vec::new();

        for result in results {
            let mut record = MatchRecord::create(result, reference_server_id, matched_server_id);
            let other_id = record.matched_patient_id().to_string();
            let unchanged = existing
                .get(&other_id)
                .map(|stored| stored.has_same_match_data_within(&record, self.score_epsilon));
            match unchanged {
                Some(true) => {
                    existing.remove(&other_id);
                }
                Some(false) => {
                    // Stored version stays in `existing` so it is archived below.
                    if let Some(stored) = existing.get(&other_id) {
                        record.preserve_meta_from(stored);
                    }
                    saved.push(record);
                }
                None => saved.push(record),
            }
        }

        let stale: Vec<u64> = existing.values().filter_map(MatchRecord::id).collect();
        for id in &stale {
            inner.archive_and_remove(*id);
        }
        let saved: Vec<MatchRecord> = saved.into_iter().map(|r| inner.insert(r)).collect();

        tracing::debug!(
            "Patient {}: {} matches saved, {} archived",
            patient_id,
            saved.len(),
            stale.len()
        );
        Ok(saved)
    }

    fn update<F>(&self, match_id: u64, apply: F) -> MatchResult<MatchRecord>
    where
        F: FnOnce(&mut MatchRecord),
    {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let row = inner
            .rows
            .get_mut(&match_id)
            .ok_or(MatchError::MatchNotFound { id: match_id })?;
        let mut record = MatchRecord::from_storage_row(row);
        apply(&mut record);
        *row = record.to_storage_row();
        Ok(record)
    }
}

impl MatchStore for InMemoryMatchStore {
    fn save_local_matches(
        &self,
        results: &[SimilarityResult],
        patient_id: &str,
    ) -> MatchResult<Vec<MatchRecord>> {
        self.save_matches(results, patient_id, "", "")
    }

    fn save_remote_matches(
        &self,
        results: &[SimilarityResult],
        patient_id: &str,
        server_id: &str,
        incoming: bool,
    ) -> MatchResult<Vec<MatchRecord>> {
        let (reference_server_id, matched_server_id) = if incoming {
            (server_id, "")
        } else {
            ("", server_id)
        };
        self.save_matches(results, patient_id, reference_server_id, matched_server_id)
    }

    fn load_matches(&self, filter: &MatchFilter) -> Vec<MatchRecord> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .rows
            .values()
            .filter(|row| filter.accepts(row))
            .map(MatchRecord::from_storage_row)
            .collect()
    }

    fn load_matches_by_ids(&self, ids: &[u64]) -> Vec<MatchRecord> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        ids.iter()
            .filter_map(|id| inner.rows.get(id))
            .map(MatchRecord::from_storage_row)
            .collect()
    }

    fn set_status(&self, match_id: u64, status: MatchStatus) -> MatchResult<MatchRecord> {
        self.update(match_id, |record| record.set_status(status))
    }

    fn set_user_contacted(&self, match_id: u64, contacted: bool) -> MatchResult<MatchRecord> {
        self.update(match_id, |record| record.set_user_contacted(contacted))
    }

    fn save_comment(&self, match_id: u64, user: &UserInfo, comment: &str) -> MatchResult<MatchRecord> {
        self.update(match_id, |record| record.add_comment(user, comment))
    }

    fn add_note(&self, match_id: u64, user: &str, note: &str) -> MatchResult<MatchRecord> {
        self.update(match_id, |record| record.set_note(user, note))
    }

    fn update_notification_history(
        &self,
        match_id: u64,
        interaction: Value,
    ) -> MatchResult<Vec<MatchRecord>> {
        let updated = self.update(match_id, |record| {
            record.update_notification_history(interaction.clone())
        })?;
        if updated.is_local() {
            return Ok(vec![updated]);
        }

        let mirror_id = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            inner
                .rows
                .values()
                .map(MatchRecord::from_storage_row)
                .find(|other| other.is_equivalent(&updated))
                .and_then(|other| other.id())
        };
        let mut records = vec![updated];
        if let Some(id) = mirror_id {
            records.push(self.update(id, |record| record.update_notification_history(interaction))?);
        }
        Ok(records)
    }

    fn mark_notified(&self, match_id: u64) -> MatchResult<MatchRecord> {
        self.update(match_id, |record| record.set_notified(true))
    }

    fn delete_matches_for_local_patient(&self, patient_id: &str) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let ids: Vec<u64> = inner
            .rows
            .iter()
            .filter(|(_, row)| {
                (row.reference_patient_id == patient_id && row.reference_server_id.is_empty())
                    || (row.matched_patient_id == patient_id && row.matched_server_id.is_empty())
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            inner.archive_and_remove(*id);
        }
        tracing::info!("Deleted {} matches for local patient {}", ids.len(), patient_id);
        ids.len()
    }

    fn history(&self) -> Vec<HistoricMatch> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .clone()
    }

    fn remote_match_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .values()
            .filter(|row| !row.reference_server_id.is_empty() || !row.matched_server_id.is_empty())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    use crate::context::ScoringContext;
    use crate::similarity::tests::{context_for, patient};
    use phenomatch_types::Patient;

    fn fixture() -> (ScoringContext, Vec<Arc<Patient>>) {
        let patients = vec![
            patient("P0000001", "alice", &["HP:0010696"], &["SRCAP"]),
            patient("P0000002", "bob", &["HP:0000518"], &["SRCAP", "TTN"]),
            patient("P0000003", "carol", &["HP:0001371"], &["TTN"]),
        ];
        let (context, _) = context_for(patients.clone());
        (context, patients.into_iter().map(Arc::new).collect())
    }

    fn results_for(context: &ScoringContext, patients: &[Arc<Patient>], reference: usize) -> Vec<SimilarityResult> {
        patients
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != reference)
            .map(|(_, matched)| context.score(matched, &patients[reference]))
            .collect()
    }

    #[test]
    fn test_save_new_matches_canonical() {
        let (context, patients) = fixture();
        let store = InMemoryMatchStore::new();

        let saved = store
            .save_local_matches(&results_for(&context, &patients, 1), "P0000002")
            .unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].id(), Some(1));
        assert_eq!(saved[1].id(), Some(2));

        let stored = store.load_matches(&MatchFilter::default());
        // P0000002 vs P0000001 is stored with the smaller id as reference
        assert_eq!(stored[0].reference_patient_id(), "P0000001");
        assert_eq!(stored[0].matched_patient_id(), "P0000002");
        assert_eq!(stored[1].reference_patient_id(), "P0000002");
    }

    #[test]
    fn test_resave_unchanged_keeps_record() {
        let (context, patients) = fixture();
        let store = InMemoryMatchStore::new();
        let results = results_for(&context, &patients, 1);
        store.save_local_matches(&results, "P0000002").unwrap();
        store.set_status(1, MatchStatus::Saved).unwrap();

        let saved = store.save_local_matches(&results, "P0000002").unwrap();
        assert!(saved.is_empty());
        assert!(store.history().is_empty());
        assert_eq!(store.load_matches_by_ids(&[1])[0].status(), MatchStatus::Saved);
    }

    #[test]
    fn test_resave_from_other_side_matches_mirror() {
        let (context, patients) = fixture();
        let store = InMemoryMatchStore::new();
        store
            .save_local_matches(&results_for(&context, &patients, 1), "P0000002")
            .unwrap();

        // P0000001 against P0000002 is the mirror of the stored pair
        let mirror = vec![context.score(&patients[1], &patients[0])];
        let saved = store.save_local_matches(&mirror, "P0000001").unwrap();
        assert!(saved.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_changed_match_preserves_meta() {
        let (context, patients) = fixture();
        let store = InMemoryMatchStore::new();
        store
            .save_local_matches(&results_for(&context, &patients, 1), "P0000002")
            .unwrap();
        let alice = UserInfo::new("alice", "Alice");
        store.save_comment(1, &alice, "follow up").unwrap();
        store.set_status(1, MatchStatus::Rejected).unwrap();
        let found = store.load_matches_by_ids(&[1])[0].found_timestamp();

        let mut changed = (*patients[0]).clone();
        changed.genes.clear();
        let result = context.score(&Arc::new(changed), &patients[1]);
        let saved = store.save_local_matches(&[result], "P0000002").unwrap();

        assert_eq!(saved.len(), 1);
        let record = &saved[0];
        assert_eq!(record.id(), Some(3));
        assert_eq!(record.status(), MatchStatus::Rejected);
        assert_eq!(record.comments().len(), 1);
        assert_eq!(record.found_timestamp(), found);

        // old version of the pair and the vanished P0000003 match are archived
        let history = store.history();
        assert_eq!(history.len(), 2);
        assert!(history.iter().any(|h| h.row().id == Some(1)));
        assert!(history.iter().any(|h| h.row().id == Some(2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_mixed_reference_rejected() {
        let (context, patients) = fixture();
        let store = InMemoryMatchStore::new();
        let mut results = results_for(&context, &patients, 1);
        results.push(context.score(&patients[1], &patients[0]));

        assert!(matches!(
            store.save_local_matches(&results, "P0000002"),
            Err(MatchError::InvalidArgument(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remote_matches() {
        let (context, patients) = fixture();
        let store = InMemoryMatchStore::new();

        let outgoing = store
            .save_remote_matches(&[context.score(&patients[1], &patients[0])], "P0000001", "partner", false)
            .unwrap();
        assert!(outgoing[0].is_outgoing());
        assert_eq!(outgoing[0].matched_server_id(), "partner");

        // the partner reporting the same pair back is recognized as the stored one
        let mirror = vec![context.score(&patients[0], &patients[1])];
        assert!(store
            .save_remote_matches(&mirror, "P0000002", "partner", true)
            .unwrap()
            .is_empty());

        let incoming = store
            .save_remote_matches(&[context.score(&patients[0], &patients[2])], "P0000003", "partner", true)
            .unwrap();
        assert!(incoming[0].is_incoming());
        assert_eq!(incoming[0].reference_server_id(), "partner");
        assert_eq!(store.remote_match_count(), 2);

        let updated = store
            .update_notification_history(incoming[0].id().unwrap(), json!({"type": "notification"}))
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].notification_history().interactions.len(), 1);
    }

    #[test]
    fn test_load_matches_filter() {
        let (context, patients) = fixture();
        let store = InMemoryMatchStore::new();
        store
            .save_local_matches(&results_for(&context, &patients, 1), "P0000002")
            .unwrap();

        assert_eq!(store.load_matches(&MatchFilter::for_patient("P0000003")).len(), 1);
        assert_eq!(store.load_matches(&MatchFilter::for_patient("P0000009")).len(), 0);
        assert_eq!(
            store
                .load_matches(&MatchFilter::default().with_min_score(1.1))
                .len(),
            0
        );

        let tomorrow = Utc::now() + chrono::Duration::days(1);
        assert!(store
            .load_matches(&MatchFilter::default().between(Some(tomorrow), None))
            .is_empty());
        assert_eq!(
            store
                .load_matches(&MatchFilter::default().between(None, Some(tomorrow)))
                .len(),
            2
        );
    }

    #[test]
    fn test_record_updates() {
        let (context, patients) = fixture();
        let store = InMemoryMatchStore::new();
        store
            .save_local_matches(&results_for(&context, &patients, 1), "P0000002")
            .unwrap();

        store.add_note(1, "alice", "first").unwrap();
        store.add_note(1, "alice", "second").unwrap();
        store.set_user_contacted(1, true).unwrap();
        store.mark_notified(1).unwrap();

        let record = &store.load_matches_by_ids(&[1, 99])[0];
        assert_eq!(record.notes_for("alice"), Some("second"));
        assert!(record.is_user_contacted());
        assert!(record.is_notified());

        assert!(matches!(
            store.set_status(99, MatchStatus::Saved),
            Err(MatchError::MatchNotFound { id: 99 })
        ));
    }

    #[test]
    fn test_delete_matches_for_local_patient() {
        let (context, patients) = fixture();
        let store = InMemoryMatchStore::new();
        store
            .save_local_matches(&results_for(&context, &patients, 1), "P0000002")
            .unwrap();

        assert_eq!(store.delete_matches_for_local_patient("P0000001"), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.history().len(), 1);
        assert_eq!(store.history()[0].record().matched_patient_id(), "P0000002");
    }
}
