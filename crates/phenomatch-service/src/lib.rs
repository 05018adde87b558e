//! # phenomatch-service
//!
//! gRPC service for patient similarity and match management.
//!
//! The server loads the phenotype ontology, disease annotations, patient
//! records and per-patient exome results from a data directory, and exposes
//! the `phenomatch-engine` operations over a single `MatchingService`.
//!
//! ## Configuration
//!
//! | Variable | Default |
//! |----------|---------|
//! | `PHENOMATCH_DATA_PATH` | `./data` |
//! | `PHENOMATCH_PORT` | `50051` |
//! | `PHENOMATCH_MIN_SCORE` | `0.1` |
//! | `PHENOMATCH_EXOME_WORKERS` | `4` |
//!
//! Logging follows `RUST_LOG` and defaults to `info`.

#![warn(missing_docs)]

#[allow(missing_docs)]
pub mod proto {
    //! Wire messages and the generated service stubs.

    /// Scores one pair as seen by a viewer.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ScorePairRequest {
        #[prost(string, tag = "1")]
        pub reference_id: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub match_id: ::prost::alloc::string::String,
        #[prost(string, tag = "3")]
        pub viewer_id: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ScorePairResponse {
        #[prost(double, tag = "1")]
        pub score: f64,
        #[prost(string, tag = "2")]
        pub access: ::prost::alloc::string::String,
        #[prost(string, tag = "3")]
        pub view_json: ::prost::alloc::string::String,
    }

    /// Pages through the patients similar to a reference.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FindMatchesRequest {
        #[prost(string, tag = "1")]
        pub patient_id: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub viewer_id: ::prost::alloc::string::String,
        #[prost(int64, tag = "3")]
        pub offset: i64,
        /// Negative returns every remaining result.
        #[prost(int64, tag = "4")]
        pub limit: i64,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FindMatchesResponse {
        #[prost(string, tag = "1")]
        pub results_json: ::prost::alloc::string::String,
    }

    /// Re-runs match discovery for local patients.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RefreshMatchesRequest {
        #[prost(string, repeated, tag = "1")]
        pub patient_ids: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct RefreshMatchesResponse {
        #[prost(uint64, tag = "1")]
        pub patients_checked: u64,
        #[prost(uint64, tag = "2")]
        pub errors: u64,
        #[prost(uint64, tag = "3")]
        pub matches_found: u64,
        #[prost(double, tag = "4")]
        pub average_time_ms: f64,
    }

    /// Lists stored matches.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListMatchesRequest {
        /// Empty lists every patient's matches.
        #[prost(string, tag = "1")]
        pub patient_id: ::prost::alloc::string::String,
        #[prost(double, tag = "2")]
        pub min_score: f64,
        #[prost(string, tag = "3")]
        pub viewer_id: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListMatchesResponse {
        #[prost(uint64, tag = "1")]
        pub count: u64,
        #[prost(string, tag = "2")]
        pub matches_json: ::prost::alloc::string::String,
    }

    /// Sets a stored match's review status.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SetMatchStatusRequest {
        #[prost(uint64, tag = "1")]
        pub match_id: u64,
        #[prost(string, tag = "2")]
        pub status: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SetMatchStatusResponse {
        #[prost(string, tag = "1")]
        pub match_json: ::prost::alloc::string::String,
    }

    /// Starts exome annotation for a patient.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SubmitExomeJobRequest {
        #[prost(string, tag = "1")]
        pub patient_id: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SubmitExomeJobResponse {
        #[prost(string, tag = "1")]
        pub status: ::prost::alloc::string::String,
    }

    /// Reports a patient's exome job.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetExomeJobStatusRequest {
        #[prost(string, tag = "1")]
        pub patient_id: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct GetExomeJobStatusResponse {
        #[prost(string, tag = "1")]
        pub status: ::prost::alloc::string::String,
        #[prost(uint64, tag = "2")]
        pub gene_count: u64,
        #[prost(uint64, tag = "3")]
        pub variant_count: u64,
    }

    /// Drops cached views for a patient whose record changed.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct InvalidatePatientRequest {
        #[prost(string, tag = "1")]
        pub patient_id: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct InvalidatePatientResponse {
        #[prost(uint64, tag = "1")]
        pub removed: u64,
    }

    include!(concat!(env!("OUT_DIR"), "/phenomatch.MatchingService.rs"));
}

mod annotator;
mod config;
mod error;
mod repository;
mod server;

pub use annotator::ExomiserFileAnnotator;
pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use repository::{load_patients, read_patients};
pub use server::MatchingServer;
