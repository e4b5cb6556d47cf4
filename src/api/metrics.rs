use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::warn;

use crate::app::AppState;

/// プールゲージをストアの現在値に合わせてから描画する。
pub(crate) async fn exporter(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(error) = state.pipeline().pool_health().await {
        warn!(error = %error, "pool gauge refresh failed; rendering last known value");
    }
    (StatusCode::OK, state.telemetry().render_prometheus())
}
