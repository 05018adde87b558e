//! Background exome annotation.
//!
//! One job per patient runs on the tokio blocking pool. Resubmitting a patient
//! aborts its previous job if that job has not started yet, and a job that
//! was superseded while running never publishes its result. An optional
//! completion hook runs after a job publishes, outside the manager's lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use phenomatch_loader::Exome;

use crate::context::ExomeProvider;
use crate::error::MatchResult;

/// External variant annotation tool.
pub trait ExomeAnnotator: Send + Sync {
    /// Runs annotation for a patient. May block for a long time.
    fn annotate(&self, patient_id: &str) -> MatchResult<Exome>;
}

/// State of a patient's annotation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// Nothing was ever submitted.
    NotSubmitted,
    /// Submitted and still running or queued.
    Pending,
    /// Finished with a result.
    Success,
    /// Finished without a result.
    Failed,
}

impl JobStatus {
    /// Returns the snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotSubmitted => "not_submitted",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Called with the patient id once a job has published its outcome.
pub type CompletionHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct JobsInner {
    handles: HashMap<String, JoinHandle<()>>,
    results: HashMap<String, Arc<Exome>>,
    generations: HashMap<String, u64>,
}

/// Runs annotation jobs and keeps their results.
pub struct ExomeJobManager {
    runtime: Handle,
    annotator: Arc<dyn ExomeAnnotator>,
    on_complete: Option<CompletionHook>,
    inner: Arc<Mutex<JobsInner>>,
}

impl fmt::Debug for ExomeJobManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ExomeJobManager")
            .field("jobs", &inner.handles.len())
            .field("results", &inner.results.len())
            .field("hook", &self.on_complete.is_some())
            .finish()
    }
}

impl ExomeJobManager {
    /// Creates a manager that spawns jobs on `runtime`.
    pub fn new(runtime: Handle, annotator: Arc<dyn ExomeAnnotator>) -> Self {
        Self {
            runtime,
            annotator,
            on_complete: None,
            inner: Arc::new(Mutex::new(JobsInner::default())),
        }
    }

    /// Runs `hook` whenever a job finishes, successfully or not.
    ///
    /// Typically used to drop views scored before the exome was available.
    pub fn with_completion_hook(mut self, hook: CompletionHook) -> Self {
        self.on_complete = Some(hook);
        self
    }

    /// Starts annotation for a patient, superseding any earlier job.
    pub fn submit(&self, patient_id: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = inner.handles.remove(patient_id) {
            if !previous.is_finished() {
                tracing::debug!("Aborting pending exome job for {}", patient_id);
                previous.abort();
            }
        }
        inner.results.remove(patient_id);

        let generation = inner.generations.get(patient_id).map_or(1, |g| g + 1);
        inner.generations.insert(patient_id.to_string(), generation);

        let annotator = Arc::clone(&self.annotator);
        let on_complete = self.on_complete.clone();
        let shared = Arc::clone(&self.inner);
        let id = patient_id.to_string();
        let handle = self.runtime.spawn_blocking(move || {
            let outcome = annotator.annotate(&id);
            {
                let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if inner.generations.get(&id) != Some(&generation) {
                    tracing::debug!("Dropping superseded exome job for {}", id);
                    return;
                }
                match outcome {
                    Ok(exome) => {
                        tracing::info!(
                            "Exome job for {} finished: {} genes, {} variants",
                            id,
                            exome.gene_count(),
                            exome.variant_count()
                        );
                        inner.results.insert(id.clone(), Arc::new(exome));
                    }
                    Err(e) => tracing::error!("Exome job for {} failed: {}", id, e),
                }
            }
            // Before the handle reports finished, so a Success status implies the hook ran
            if let Some(hook) = on_complete {
                hook(&id);
            }
        });

        inner.handles.insert(patient_id.to_string(), handle);
    }

    /// Current job state for a patient.
    pub fn status(&self, patient_id: &str) -> JobStatus {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match inner.handles.get(patient_id) {
            None => JobStatus::NotSubmitted,
            Some(handle) if !handle.is_finished() => JobStatus::Pending,
            Some(_) if inner.results.contains_key(patient_id) => JobStatus::Success,
            Some(_) => JobStatus::Failed,
        }
    }

    /// Result of a patient's last successful job.
    pub fn result(&self, patient_id: &str) -> Option<Arc<Exome>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .results
            .get(patient_id)
            .cloned()
    }

    /// Patients with a successful result, sorted.
    pub fn completed(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = inner.results.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl ExomeProvider for ExomeJobManager {
    fn get_exome(&self, patient_id: &str) -> Option<Arc<Exome>> {
        self.result(patient_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    use crate::error::MatchError;
    use phenomatch_types::{Variant, Zygosity};

    fn exome_with(gene: &str) -> Exome {
        let mut exome = Exome::new();
        exome.add_variant(
            gene,
            0.9,
            Variant::new("16", 30_748_691, "C", "T", Zygosity::Heterozygous, 0.95, "STOP_GAINED"),
        );
        exome
    }

    struct FixedAnnotator;

    impl ExomeAnnotator for FixedAnnotator {
        fn annotate(&self, patient_id: &str) -> MatchResult<Exome> {
            if patient_id == "P0000002" {
                return Err(MatchError::Annotation {
                    patient_id: patient_id.to_string(),
                    message: "no VCF on file".to_string(),
                });
            }
            Ok(exome_with("SRCAP"))
        }
    }

    /// First call blocks until released; later calls return at once.
    struct GatedAnnotator {
        calls: AtomicUsize,
        finished: AtomicUsize,
        gate: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl ExomeAnnotator for GatedAnnotator {
        fn annotate(&self, _patient_id: &str) -> MatchResult<Exome> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = if call == 0 {
                self.gate.lock().unwrap().take()
            } else {
                None
            };
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(exome_with(if call == 0 { "FIRST" } else { "SECOND" }))
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_job_success_and_failure() {
        let manager = ExomeJobManager::new(Handle::current(), Arc::new(FixedAnnotator));
        assert_eq!(manager.status("P0000001"), JobStatus::NotSubmitted);

        manager.submit("P0000001");
        manager.submit("P0000002");
        wait_until(|| manager.status("P0000001") == JobStatus::Success).await;
        wait_until(|| manager.status("P0000002") != JobStatus::Pending).await;

        assert_eq!(manager.status("P0000002"), JobStatus::Failed);
        assert!(manager.result("P0000002").is_none());
        assert_eq!(manager.completed(), vec!["P0000001"]);
        assert_eq!(
            manager.get_exome("P0000001").unwrap().gene_score("SRCAP"),
            Some(0.9)
        );
    }

    #[tokio::test]
    async fn test_resubmit_supersedes_running_job() {
        let (release, gate) = mpsc::channel();
        let annotator = Arc::new(GatedAnnotator {
            calls: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            gate: Mutex::new(Some(gate)),
        });
        let manager = ExomeJobManager::new(Handle::current(), annotator.clone());

        manager.submit("P0000001");
        wait_until(|| annotator.calls.load(Ordering::SeqCst) == 1).await;
        assert_eq!(manager.status("P0000001"), JobStatus::Pending);

        manager.submit("P0000001");
        wait_until(|| manager.status("P0000001") == JobStatus::Success).await;
        assert!(manager.result("P0000001").unwrap().gene("SECOND").is_some());

        // the first job finishes late and must not overwrite the newer result
        release.send(()).unwrap();
        wait_until(|| annotator.finished.load(Ordering::SeqCst) == 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let result = manager.result("P0000001").unwrap();
        assert!(result.gene("SECOND").is_some());
        assert!(result.gene("FIRST").is_none());
    }

    #[tokio::test]
    async fn test_completion_hook_runs_after_publish() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let manager = Arc::new_cyclic(|weak: &std::sync::Weak<ExomeJobManager>| {
            let seen = Arc::clone(&seen);
            let weak = weak.clone();
            ExomeJobManager::new(Handle::current(), Arc::new(FixedAnnotator)).with_completion_hook(
                Arc::new(move |id: &str| {
                    // the result must already be visible when the hook fires
                    let published = weak.upgrade().is_some_and(|m| m.result(id).is_some());
                    seen.lock().unwrap().push(format!("{}:{}", id, published));
                }),
            )
        });

        manager.submit("P0000001");
        manager.submit("P0000002");
        wait_until(|| manager.status("P0000001") == JobStatus::Success).await;
        wait_until(|| manager.status("P0000002") == JobStatus::Failed).await;

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["P0000001:true", "P0000002:false"]);
    }

    #[test]
    fn test_job_status_names() {
        assert_eq!(JobStatus::NotSubmitted.as_str(), "not_submitted");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }
}
