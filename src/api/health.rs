use std::collections::BTreeMap;

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tracing::error;

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub(crate) struct HealthReport {
    status: &'static str,
    /// Failing dependency name to its error chain.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    failing: BTreeMap<&'static str, String>,
}

/// コンテンツストアと生成サービスを両方確認し、落ちている依存先をすべて返す。
pub(crate) async fn ready(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    state.telemetry().record_ready_probe();

    let readiness = state.pipeline().readiness().await;
    let mut failing = BTreeMap::new();
    for (dependency, outcome) in [
        ("content_store", readiness.store),
        ("generation", readiness.generation),
    ] {
        if let Err(error) = outcome {
            error!(dependency, error = %error, "readiness check failed");
            failing.insert(dependency, format!("{error:#}"));
        }
    }

    if failing.is_empty() {
        let report = HealthReport {
            status: "ready",
            failing,
        };
        (StatusCode::OK, Json(report))
    } else {
        let report = HealthReport {
            status: "degraded",
            failing,
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(report))
    }
}

pub(crate) async fn live(State(state): State<AppState>) -> Json<HealthReport> {
    state.telemetry().record_live_probe();
    Json(HealthReport {
        status: "live",
        failing: BTreeMap::new(),
    })
}
