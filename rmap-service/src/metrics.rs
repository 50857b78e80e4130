//! GET /metrics handler: serializes the core's counters for scraping.

use crate::state::SharedState;
use axum::extract::State;
use axum::Json;
use rmap_core::metrics::MetricsSnapshot;

pub async fn metrics(State(state): State<SharedState>) -> Json<MetricsSnapshot> {
    Json(rmap_core::metrics::snapshot(&state.map_entries))
}
