//! Patient matching gRPC server binary.

use std::sync::Arc;

use phenomatch_engine::{
    ExomeJobManager, InMemoryMatchStore, MatchFinder, PatientAccessResolver,
    PatientGenotypeProvider, PatientRepository, ScoringConfig, ScoringContext, SimilarityViewCache,
};
use phenomatch_loader::{
    discover_data_files, load_annotations, FileSystemExomeStore, InformationConfig,
    InformationModel, LoaderConfig, OntologyStore,
};
use phenomatch_service::proto::matching_service_server::MatchingServiceServer;
use phenomatch_service::{load_patients, ExomiserFileAnnotator, MatchingServer, ServiceConfig};
use tonic::transport::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ServiceConfig::from_env()?;

    // Exome annotation runs on the blocking pool, so its size bounds concurrent jobs
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.exome_workers)
        .build()?;

    runtime.block_on(serve(config))
}

async fn serve(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Loading phenotype data from: {}", config.data_path.display());

    let files = discover_data_files(&config.data_path)?;
    tracing::info!("Discovered data files, ontology release {:?}", files.data_version);

    // Ontology
    let mut store = OntologyStore::new();
    let term_count = store.load_from_files(&files, LoaderConfig::default())?;
    tracing::info!("Loaded {} ontology terms", term_count);
    let store = Arc::new(store);

    // Information content
    let model = match &files.annotations_file {
        Some(path) => {
            let (annotations, stats) = load_annotations(path, LoaderConfig::default())?;
            tracing::info!(
                "Loaded {} disease annotations ({} skipped, {} errors)",
                stats.filtered_records,
                stats.skipped_records,
                stats.error_count
            );
            InformationModel::build(store, &annotations, &InformationConfig::default())
        }
        None => {
            tracing::warn!("No annotation file found, information content will be zero");
            InformationModel::build(store, &[], &InformationConfig::default())
        }
    };
    tracing::info!(
        "Information content computed for {} terms in {}ms",
        model.stats().terms_with_ic,
        model.stats().build_time_ms
    );

    // Patients
    let patients = match &files.patients_file {
        Some(path) => load_patients(path)?,
        None => {
            tracing::warn!("No patients.json found, starting with an empty repository");
            Default::default()
        }
    };
    let patients = Arc::new(patients);

    // Exome jobs
    let exome_root = files.exome_dir.clone().unwrap_or_else(|| {
        tracing::warn!("No exome directory found, genotype scoring uses candidate genes only");
        config.data_path.clone()
    });
    let exomes = Arc::new(FileSystemExomeStore::new(&exome_root)?);

    // Views scored while a job is pending lack its exome, so drop them on completion
    let cache: Arc<SimilarityViewCache> = Arc::new(SimilarityViewCache::new());
    let hook_cache = cache.clone();
    let jobs = Arc::new(
        ExomeJobManager::new(
            tokio::runtime::Handle::current(),
            Arc::new(ExomiserFileAnnotator::new(exomes.clone())),
        )
        .with_completion_hook(Arc::new(move |patient_id: &str| {
            let removed = hook_cache.invalidate(patient_id);
            tracing::debug!("Exome job for {} done, dropped {} cached views", patient_id, removed);
        })),
    );

    let mut submitted = 0;
    for id in patients.ids() {
        if exomes.has_exome(&id) {
            jobs.submit(&id);
            submitted += 1;
        }
    }
    tracing::info!("Submitted {} exome annotation jobs", submitted);

    // Matching
    let context = ScoringContext::new(
        Arc::new(model),
        Arc::new(PatientGenotypeProvider::new(patients.clone(), Some(jobs.clone()))),
        Arc::new(PatientAccessResolver::new(patients.clone())),
    )
    .with_config(ScoringConfig::default().with_min_score(config.min_score));
    let match_store = Arc::new(InMemoryMatchStore::with_config(&context.config));
    let finder = MatchFinder::new(
        context,
        patients.clone(),
        match_store,
        cache,
    );

    // Create server
    let server = MatchingServer::new(patients, finder, jobs);

    let addr = format!("[::1]:{}", config.port).parse()?;
    tracing::info!("Starting phenomatch gRPC server on {}", addr);

    Server::builder()
        .add_service(MatchingServiceServer::new(server))
        .serve(addr)
        .await?;

    Ok(())
}
