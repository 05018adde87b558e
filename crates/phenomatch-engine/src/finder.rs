//! Match discovery over the local patient repository.

use std::sync::Arc;
use std::time::{Duration, Instant};

use phenomatch_types::{AccessLevel, AccessTier, Patient};

use crate::cache::{SimilarityViewCache, ViewKey};
use crate::context::{PatientRepository, ScoringContext};
use crate::error::{MatchError, MatchResult};
use crate::results::MatchedResults;
use crate::similarity::SimilarityResult;
use crate::storage::MatchStore;
use crate::view::{redact, RedactedView};

/// Outcome of a [`MatchFinder::find_matches`] run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchRunStats {
    /// Eligible patients that were scored.
    pub patients_checked: usize,
    /// Patients that could not be loaded or saved.
    pub errors: usize,
    /// Matches at or above the minimum score.
    pub matches_found: usize,
    /// Total scoring and saving time.
    pub elapsed: Duration,
}

impl MatchRunStats {
    /// Mean time spent per checked patient.
    pub fn average_time(&self) -> Duration {
        match u32::try_from(self.patients_checked) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.elapsed / n,
        }
    }
}

/// Scores local patients against each other and records the results.
pub struct MatchFinder {
    context: ScoringContext,
    patients: Arc<dyn PatientRepository>,
    store: Arc<dyn MatchStore>,
    cache: Arc<SimilarityViewCache>,
}

impl std::fmt::Debug for MatchFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchFinder")
            .field("context", &self.context)
            .field("cache", &self.cache)
            .finish()
    }
}

impl MatchFinder {
    /// Creates a finder.
    pub fn new(
        context: ScoringContext,
        patients: Arc<dyn PatientRepository>,
        store: Arc<dyn MatchStore>,
        cache: Arc<SimilarityViewCache>,
    ) -> Self {
        Self {
            context,
            patients,
            store,
            cache,
        }
    }

    /// Scoring context.
    pub fn context(&self) -> &ScoringContext {
        &self.context
    }

    /// Match store.
    pub fn store(&self) -> &Arc<dyn MatchStore> {
        &self.store
    }

    /// View cache.
    pub fn cache(&self) -> &Arc<SimilarityViewCache> {
        &self.cache
    }

    /// Unsolved patients whose owners allow matching take part.
    pub fn is_eligible(&self, patient: &Patient) -> bool {
        !patient.solved && patient.visibility.is_matchable()
    }

    fn candidates_for<'a>(&'a self, reference_id: &'a str) -> impl Iterator<Item = Arc<Patient>> + 'a {
        self.patients
            .ids()
            .into_iter()
            .filter(move |id| id != reference_id)
            .filter_map(move |id| self.patients.get(&id))
            .filter(move |p| self.is_eligible(p))
    }

    /// Scores every eligible patient against `reference`, keeping those at or
    /// above the minimum match score.
    pub fn score_against_all(&self, reference: &Arc<Patient>) -> Vec<SimilarityResult> {
        let min_score = self.context.config.min_match_score;
        self.candidates_for(&reference.id)
            .map(|candidate| self.context.score(&candidate, reference))
            .filter(|result| result.score() >= min_score)
            .collect()
    }

    /// Re-scores the given patients and saves their matches.
    pub fn find_matches(&self, patient_ids: &[String]) -> MatchRunStats {
        let start = Instant::now();
        let mut stats = MatchRunStats::default();

        for id in patient_ids {
            let Some(reference) = self.patients.get(id) else {
                tracing::warn!("Patient {} not found, skipping match run", id);
                stats.errors += 1;
                continue;
            };
            if !self.is_eligible(&reference) {
                tracing::debug!("Patient {} is not eligible for matching", id);
                continue;
            }

            stats.patients_checked += 1;
            let results = self.score_against_all(&reference);
            match self.store.save_local_matches(&results, id) {
                Ok(_) => stats.matches_found += results.len(),
                Err(e) => {
                    tracing::error!("Failed to save matches for {}: {}", id, e);
                    stats.errors += 1;
                }
            }
            self.cache.invalidate(id);
        }

        stats.elapsed = start.elapsed();
        tracing::info!(
            "Match run: {} patients checked, {} matches found, {} errors, {:?} per patient",
            stats.patients_checked,
            stats.matches_found,
            stats.errors,
            stats.average_time()
        );
        stats
    }

    fn patient(&self, patient_id: &str) -> MatchResult<Arc<Patient>> {
        self.patients
            .get(patient_id)
            .ok_or_else(|| MatchError::PatientNotFound {
                id: patient_id.to_string(),
            })
    }

    /// Loads a reference patient the viewer is allowed to read in full.
    ///
    /// Reference-side terms and variants are never redacted, so anything
    /// below view access is refused.
    fn readable_reference(&self, reference_id: &str, viewer_id: &str) -> MatchResult<Arc<Patient>> {
        let reference = self.patient(reference_id)?;
        if self.context.access.level_for(viewer_id, reference_id) < AccessLevel::View {
            tracing::warn!("{} denied access to reference patient {}", viewer_id, reference_id);
            return Err(MatchError::AccessDenied {
                viewer_id: viewer_id.to_string(),
                patient_id: reference_id.to_string(),
            });
        }
        Ok(reference)
    }

    fn cached_view(
        &self,
        candidate: &Arc<Patient>,
        reference: &Arc<Patient>,
        tier: AccessTier,
    ) -> Arc<RedactedView> {
        let key = ViewKey::new(&candidate.id, &reference.id, tier);
        self.cache.get_or_insert_with(key, || {
            let result = Arc::new(self.context.score(candidate, reference));
            Arc::new(redact(&result, tier, self.context.ontology.store()))
        })
    }

    /// One pair scored and redacted for `viewer_id`.
    ///
    /// The viewer needs view access to the reference; the match side is
    /// redacted to whatever tier the viewer holds on it.
    pub fn view_pair(
        &self,
        reference_id: &str,
        match_id: &str,
        viewer_id: &str,
    ) -> MatchResult<Arc<RedactedView>> {
        let reference = self.readable_reference(reference_id, viewer_id)?;
        let matched = self.patient(match_id)?;
        let tier = AccessTier::from_level(self.context.access.level_for(viewer_id, match_id));
        Ok(self.cached_view(&matched, &reference, tier))
    }

    /// Similar patients for a reference, as seen by `viewer_id`.
    ///
    /// The viewer needs view access to the reference. Candidates the viewer
    /// may not see at all are left out.
    pub fn find_similar(&self, reference_id: &str, viewer_id: &str) -> MatchResult<MatchedResults> {
        let reference = self.readable_reference(reference_id, viewer_id)?;
        let min_score = self.context.config.min_match_score;

        let views: Vec<Arc<RedactedView>> = self
            .candidates_for(reference_id)
            .filter_map(|candidate| {
                let level = self.context.access.level_for(viewer_id, &candidate.id);
                let tier = AccessTier::from_level(level);
                if tier == AccessTier::Private {
                    return None;
                }
                let view = self.cached_view(&candidate, &reference, tier);
                (view.score() >= min_score).then_some(view)
            })
            .collect();

        tracing::debug!(
            "{} similar patients for {} as seen by {}",
            views.len(),
            reference_id,
            viewer_id
        );
        Ok(MatchedResults::new(reference, views))
    }

    /// Drops cached views involving a patient whose record changed.
    pub fn invalidate_patient(&self, patient_id: &str) -> usize {
        self.cache.invalidate(patient_id)
    }
}
