//! gRPC server implementation.

use std::sync::Arc;

use serde_json::Value;
use tonic::{Request, Response, Status};

use phenomatch_engine::{
    ExomeJobManager, InMemoryPatients, JobStatus, MatchFilter, MatchFinder, MatchRecord,
    PatientRepository,
};
use phenomatch_types::{AccessLevel, MatchStatus, Patient};

use crate::error::to_status;
use crate::proto::{
    matching_service_server::MatchingService,
    FindMatchesRequest, FindMatchesResponse,
    GetExomeJobStatusRequest, GetExomeJobStatusResponse,
    InvalidatePatientRequest, InvalidatePatientResponse,
    ListMatchesRequest, ListMatchesResponse,
    RefreshMatchesRequest, RefreshMatchesResponse,
    ScorePairRequest, ScorePairResponse,
    SetMatchStatusRequest, SetMatchStatusResponse,
    SubmitExomeJobRequest, SubmitExomeJobResponse,
};

/// Patient matching gRPC server.
#[derive(Clone)]
pub struct MatchingServer {
    patients: Arc<InMemoryPatients>,
    finder: Arc<MatchFinder>,
    jobs: Arc<ExomeJobManager>,
}

impl MatchingServer {
    /// Creates a server over a loaded repository.
    pub fn new(patients: Arc<InMemoryPatients>, finder: MatchFinder, jobs: Arc<ExomeJobManager>) -> Self {
        Self {
            patients,
            finder: Arc::new(finder),
            jobs,
        }
    }

    /// Returns the match finder.
    pub fn finder(&self) -> &MatchFinder {
        &self.finder
    }

    fn patient(&self, id: &str) -> Result<Arc<Patient>, Status> {
        self.patients
            .get(id)
            .ok_or_else(|| Status::not_found(format!("Patient not found: {}", id)))
    }

    /// Whether a viewer may see a stored match: at least view access to one local side.
    fn can_view(&self, viewer_id: &str, record: &MatchRecord) -> bool {
        let access = &self.finder.context().access;
        record
            .local_patient_ids()
            .into_iter()
            .any(|id| access.level_for(viewer_id, id) >= AccessLevel::View)
    }
}

#[tonic::async_trait]
impl MatchingService for MatchingServer {
    async fn score_pair(
        &self,
        request: Request<ScorePairRequest>,
    ) -> Result<Response<ScorePairResponse>, Status> {
        let req = request.into_inner();
        let view = self
            .finder
            .view_pair(&req.reference_id, &req.match_id, &req.viewer_id)
            .map_err(to_status)?;

        Ok(Response::new(ScorePairResponse {
            score: view.score(),
            access: view.tier().name().to_string(),
            view_json: view.to_json().to_string(),
        }))
    }

    async fn find_matches(
        &self,
        request: Request<FindMatchesRequest>,
    ) -> Result<Response<FindMatchesResponse>, Status> {
        let req = request.into_inner();

        let results = self
            .finder
            .find_similar(&req.patient_id, &req.viewer_id)
            .map_err(to_status)?;
        let page = results.to_json(req.offset, req.limit).map_err(to_status)?;

        Ok(Response::new(FindMatchesResponse {
            results_json: page.to_string(),
        }))
    }

    async fn refresh_matches(
        &self,
        request: Request<RefreshMatchesRequest>,
    ) -> Result<Response<RefreshMatchesResponse>, Status> {
        let mut patient_ids = request.into_inner().patient_ids;
        if patient_ids.is_empty() {
            patient_ids = self.patients.ids();
        }

        let stats = self.finder.find_matches(&patient_ids);

        Ok(Response::new(RefreshMatchesResponse {
            patients_checked: stats.patients_checked as u64,
            errors: stats.errors as u64,
            matches_found: stats.matches_found as u64,
            average_time_ms: stats.average_time().as_secs_f64() * 1000.0,
        }))
    }

    async fn list_matches(
        &self,
        request: Request<ListMatchesRequest>,
    ) -> Result<Response<ListMatchesResponse>, Status> {
        let req = request.into_inner();

        let filter = if req.patient_id.is_empty() {
            MatchFilter::default()
        } else {
            MatchFilter::for_patient(req.patient_id)
        }
        .with_min_score(req.min_score);

        // Empty viewer means an internal caller and sees everything
        let viewer = (!req.viewer_id.is_empty()).then_some(req.viewer_id.as_str());
        let matches: Vec<Value> = self
            .finder
            .store()
            .load_matches(&filter)
            .iter()
            .filter(|record| viewer.map_or(true, |v| self.can_view(v, record)))
            .map(|record| record.to_json(viewer))
            .collect();

        Ok(Response::new(ListMatchesResponse {
            count: matches.len() as u64,
            matches_json: Value::Array(matches).to_string(),
        }))
    }

    async fn set_match_status(
        &self,
        request: Request<SetMatchStatusRequest>,
    ) -> Result<Response<SetMatchStatusResponse>, Status> {
        let req = request.into_inner();
        let status = MatchStatus::parse(&req.status)
            .ok_or_else(|| Status::invalid_argument(format!("Unknown match status: {}", req.status)))?;

        let record = self
            .finder
            .store()
            .set_status(req.match_id, status)
            .map_err(to_status)?;
        tracing::info!("Match {} set to {}", req.match_id, status);

        Ok(Response::new(SetMatchStatusResponse {
            match_json: record.to_json(None).to_string(),
        }))
    }

    async fn submit_exome_job(
        &self,
        request: Request<SubmitExomeJobRequest>,
    ) -> Result<Response<SubmitExomeJobResponse>, Status> {
        let patient_id = request.into_inner().patient_id;
        self.patient(&patient_id)?;

        self.jobs.submit(&patient_id);
        self.finder.invalidate_patient(&patient_id);

        Ok(Response::new(SubmitExomeJobResponse {
            status: self.jobs.status(&patient_id).to_string(),
        }))
    }

    async fn get_exome_job_status(
        &self,
        request: Request<GetExomeJobStatusRequest>,
    ) -> Result<Response<GetExomeJobStatusResponse>, Status> {
        let patient_id = request.into_inner().patient_id;

        let status = self.jobs.status(&patient_id);
        let (gene_count, variant_count) = match (status, self.jobs.result(&patient_id)) {
            (JobStatus::Success, Some(exome)) => (exome.gene_count() as u64, exome.variant_count() as u64),
            _ => (0, 0),
        };

        Ok(Response::new(GetExomeJobStatusResponse {
            status: status.to_string(),
            gene_count,
            variant_count,
        }))
    }

    async fn invalidate_patient(
        &self,
        request: Request<InvalidatePatientRequest>,
    ) -> Result<Response<InvalidatePatientResponse>, Status> {
        let patient_id = request.into_inner().patient_id;
        let removed = self.finder.invalidate_patient(&patient_id);
        tracing::debug!("Invalidated {} cached views for {}", removed, patient_id);

        Ok(Response::new(InvalidatePatientResponse {
            removed: removed as u64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::mpsc::{self, Receiver};
    use std::sync::Mutex;

    use phenomatch_engine::{
        ExomeAnnotator, InMemoryMatchStore, MatchError, MatchResult, PatientAccessResolver,
        PatientGenotypeProvider, ScoringConfig, ScoringContext, SimilarityViewCache,
    };
    use phenomatch_loader::{Exome, InformationModel, OntologyStore};
    use phenomatch_types::{CandidateGene, Feature, OntologyTerm, Visibility};
    use tokio::runtime::Handle;
    use tonic::Code;

    struct NoExomes;

    impl ExomeAnnotator for NoExomes {
        fn annotate(&self, patient_id: &str) -> MatchResult<Exome> {
            Err(MatchError::Annotation {
                patient_id: patient_id.to_string(),
                message: "no exome file".to_string(),
            })
        }
    }

    /// Blocks each annotation until the test releases it.
    struct GatedExomes(Mutex<Receiver<()>>);

    impl ExomeAnnotator for GatedExomes {
        fn annotate(&self, _patient_id: &str) -> MatchResult<Exome> {
            let _ = self.0.lock().unwrap().recv();
            Ok(Exome::new())
        }
    }

    fn patient(id: &str, reporter: &str, term: &str, gene: &str) -> Patient {
        let mut patient = Patient::new(id);
        patient.reporter = Some(reporter.to_string());
        patient.visibility = Visibility::Matchable;
        patient.features = vec![Feature::present(term, "")];
        patient.genes = vec![CandidateGene::new(gene, "candidate")];
        patient
    }

    fn server() -> MatchingServer {
        server_with(Arc::new(NoExomes))
    }

    fn server_with(annotator: Arc<dyn ExomeAnnotator>) -> MatchingServer {
        let mut store = OntologyStore::new();
        store.insert_terms(vec![
            OntologyTerm::new("HP:0000001", "All", Vec::<String>::new()),
            OntologyTerm::new("HP:0000118", "Phenotypic abnormality", ["HP:0000001"]),
            OntologyTerm::new("HP:0000478", "Abnormality of the eye", ["HP:0000118"]),
            OntologyTerm::new("HP:0000518", "Cataract", ["HP:0000478"]),
            OntologyTerm::new("HP:0010696", "Polar cataract", ["HP:0000518"]),
        ]);
        let ic: HashMap<String, f64> = [("HP:0000478", 0.5), ("HP:0000518", 1.8), ("HP:0010696", 3.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let model = InformationModel::with_ic_values(Arc::new(store), ic);

        let patients = Arc::new(InMemoryPatients::new(vec![
            patient("P0000001", "alice", "HP:0010696", "SRCAP"),
            patient("P0000002", "bob", "HP:0000518", "SRCAP"),
        ]));
        let cache: Arc<SimilarityViewCache> = Arc::new(SimilarityViewCache::new());
        let hook_cache = cache.clone();
        let jobs = Arc::new(
            ExomeJobManager::new(Handle::current(), annotator).with_completion_hook(Arc::new(
                move |id: &str| {
                    hook_cache.invalidate(id);
                },
            )),
        );
        let context = ScoringContext::new(
            Arc::new(model),
            Arc::new(PatientGenotypeProvider::new(patients.clone(), Some(jobs.clone()))),
            Arc::new(PatientAccessResolver::new(patients.clone())),
        )
        .with_config(ScoringConfig::default());
        let finder = MatchFinder::new(
            context,
            patients.clone(),
            Arc::new(InMemoryMatchStore::new()),
            cache,
        );
        MatchingServer::new(patients, finder, jobs)
    }

    #[tokio::test]
    async fn test_score_pair_limited_for_other_reporter() {
        let server = server();
        let response = server
            .score_pair(Request::new(ScorePairRequest {
                reference_id: "P0000001".into(),
                match_id: "P0000002".into(),
                viewer_id: "alice".into(),
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.access, "limited");
        assert!(response.score > 0.0);
        let view: Value = serde_json::from_str(&response.view_json).unwrap();
        assert!(view.get("owner").is_none());

        let missing = server
            .score_pair(Request::new(ScorePairRequest {
                reference_id: "P0000001".into(),
                match_id: "P0000009".into(),
                viewer_id: "alice".into(),
            }))
            .await;
        assert_eq!(missing.unwrap_err().code(), Code::NotFound);
    }

    #[tokio::test]
    async fn test_refresh_list_and_set_status() {
        let server = server();
        let stats = server
            .refresh_matches(Request::new(RefreshMatchesRequest { patient_ids: vec![] }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(stats.patients_checked, 2);
        assert_eq!(stats.errors, 0);

        let listed = server
            .list_matches(Request::new(ListMatchesRequest {
                patient_id: "P0000001".into(),
                min_score: 0.0,
                viewer_id: "alice".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(listed.count, 1);
        let matches: Value = serde_json::from_str(&listed.matches_json).unwrap();
        let id = matches[0]["id"].as_u64().unwrap();

        let updated = server
            .set_match_status(Request::new(SetMatchStatusRequest {
                match_id: id,
                status: "saved".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        let record: Value = serde_json::from_str(&updated.match_json).unwrap();
        assert_eq!(record["status"], "saved");

        let bad = server
            .set_match_status(Request::new(SetMatchStatusRequest {
                match_id: id,
                status: "maybe".into(),
            }))
            .await;
        assert_eq!(bad.unwrap_err().code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_find_matches_page_bounds() {
        let server = server();
        let page = server
            .find_matches(Request::new(FindMatchesRequest {
                patient_id: "P0000001".into(),
                viewer_id: "alice".into(),
                offset: 0,
                limit: -1,
            }))
            .await
            .unwrap()
            .into_inner();
        let page: Value = serde_json::from_str(&page.results_json).unwrap();
        assert_eq!(page["resultsCount"], 1);

        let out_of_range = server
            .find_matches(Request::new(FindMatchesRequest {
                patient_id: "P0000001".into(),
                viewer_id: "alice".into(),
                offset: 5,
                limit: 10,
            }))
            .await;
        assert_eq!(out_of_range.unwrap_err().code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_unrelated_viewer_denied() {
        let server = server();
        let denied = server
            .score_pair(Request::new(ScorePairRequest {
                reference_id: "P0000001".into(),
                match_id: "P0000002".into(),
                viewer_id: "bob".into(),
            }))
            .await;
        assert_eq!(denied.unwrap_err().code(), Code::PermissionDenied);

        let denied = server
            .find_matches(Request::new(FindMatchesRequest {
                patient_id: "P0000001".into(),
                viewer_id: "bob".into(),
                offset: 0,
                limit: -1,
            }))
            .await;
        assert_eq!(denied.unwrap_err().code(), Code::PermissionDenied);
        assert!(server.finder().cache().is_empty());

        // Matchable access to the other side still yields a limited view
        let limited = server
            .score_pair(Request::new(ScorePairRequest {
                reference_id: "P0000002".into(),
                match_id: "P0000001".into(),
                viewer_id: "bob".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(limited.access, "limited");
    }

    #[tokio::test]
    async fn test_finished_exome_job_drops_cached_views() {
        let (release, gate) = mpsc::channel();
        let server = server_with(Arc::new(GatedExomes(Mutex::new(gate))));

        let submitted = server
            .submit_exome_job(Request::new(SubmitExomeJobRequest {
                patient_id: "P0000002".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(submitted.status, "pending");

        server
            .score_pair(Request::new(ScorePairRequest {
                reference_id: "P0000001".into(),
                match_id: "P0000002".into(),
                viewer_id: "alice".into(),
            }))
            .await
            .unwrap();
        assert_eq!(server.finder().cache().len(), 1);

        release.send(()).unwrap();
        let mut status = String::new();
        for _ in 0..200 {
            status = server
                .get_exome_job_status(Request::new(GetExomeJobStatusRequest {
                    patient_id: "P0000002".into(),
                }))
                .await
                .unwrap()
                .into_inner()
                .status;
            if status != "pending" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, "success");
        assert!(server.finder().cache().is_empty());
    }

    #[tokio::test]
    async fn test_exome_job_failure_reported() {
        let server = server();
        let submitted = server
            .submit_exome_job(Request::new(SubmitExomeJobRequest {
                patient_id: "P0000001".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_ne!(submitted.status, "not_submitted");

        let mut status = String::new();
        for _ in 0..200 {
            status = server
                .get_exome_job_status(Request::new(GetExomeJobStatusRequest {
                    patient_id: "P0000001".into(),
                }))
                .await
                .unwrap()
                .into_inner()
                .status;
            if status != "pending" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, "failed");
    }
}
