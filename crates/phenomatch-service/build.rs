//! Generates the `MatchingService` server and client from hand-written prost messages.

use tonic_build::manual::{Builder, Method, Service};

/// Rust method name and gRPC route; messages are `<Route>Request` / `<Route>Response`.
const METHODS: &[(&str, &str)] = &[
    ("score_pair", "ScorePair"),
    ("find_matches", "FindMatches"),
    ("refresh_matches", "RefreshMatches"),
    ("list_matches", "ListMatches"),
    ("set_match_status", "SetMatchStatus"),
    ("submit_exome_job", "SubmitExomeJob"),
    ("get_exome_job_status", "GetExomeJobStatus"),
    ("invalidate_patient", "InvalidatePatient"),
];

fn main() {
    let mut service = Service::builder()
        .name("MatchingService")
        .package("phenomatch");

    for (name, route) in METHODS {
        service = service.method(
            Method::builder()
                .name(name)
                .route_name(route)
                .input_type(format!("crate::proto::{}Request", route))
                .output_type(format!("crate::proto::{}Response", route))
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        );
    }

    Builder::new().compile(&[service.build()]);
    println!("cargo:rerun-if-changed=build.rs");
}
