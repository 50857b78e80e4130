//! HTTP route handlers for the resource resolution service.

use crate::error::AppError;
use crate::state::SharedState;
use axum::extract::State;
use axum::Json;
use rmap_core::Resource;
use serde::{Deserialize, Serialize};
use std::time::Instant;

// ---------------------------------------------------------------------------
// POST /resolve
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ResolveRequest {
    pub path: String,
    #[serde(default)]
    pub authority: Option<String>,
}

#[derive(Serialize)]
#[serde(tag = "kind")]
pub enum ResolveResponse {
    Resource {
        resource: Resource,
    },
    Redirect {
        status: i32,
        location: String,
    },
    NotFound,
}

pub async fn resolve(
    State(state): State<SharedState>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, AppError> {
    let start = Instant::now();

    let entries = state.map_entries.resolve_entries(&req.path);
    let mut effective_path = req.path.clone();
    let mut response = None;

    if let Some(entry) = entries.first() {
        let target = entry
            .best_redirect(req.authority.as_deref())
            .unwrap_or(&req.path)
            .to_string();
        if entry.is_internal() {
            effective_path = target;
        } else {
            response = Some(ResolveResponse::Redirect {
                status: entry.status,
                location: target,
            });
        }
    }

    let response = match response {
        Some(r) => r,
        None => {
            let control = state.resolver();
            match control.get(&effective_path, true)? {
                Some(resource) => ResolveResponse::Resource { resource },
                None => ResolveResponse::NotFound,
            }
        }
    };

    let duration_ms = start.elapsed().as_millis();
    tracing::info!(path = %req.path, duration_ms, "resolve");

    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// POST /map
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct MapRequest {
    pub resource_path: String,
    #[serde(default)]
    pub context_path: Option<String>,
    #[serde(default)]
    pub all: bool,
}

#[derive(Serialize)]
pub struct MapResponse {
    pub mappings: Vec<String>,
}

pub async fn map(
    State(state): State<SharedState>,
    Json(req): Json<MapRequest>,
) -> Json<MapResponse> {
    let start = Instant::now();
    let mappings = if req.all {
        state
            .mapper
            .get_all_mappings(&req.resource_path, req.context_path.as_deref())
    } else {
        vec![state
            .mapper
            .get_mapping(&req.resource_path, req.context_path.as_deref())]
    };
    let duration_ms = start.elapsed().as_millis();
    tracing::info!(resource_path = %req.resource_path, duration_ms, "map");
    Json(MapResponse { mappings })
}

// ---------------------------------------------------------------------------
// POST /refresh
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub background: bool,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub state: String,
    pub change_generation: u64,
}

pub async fn refresh(
    State(state): State<SharedState>,
    Json(req): Json<RefreshRequest>,
) -> Json<RefreshResponse> {
    let registry = state.registry.read();
    let snapshot = registry.snapshot();
    drop(registry);

    let mut resources = Vec::new();
    if let Some(handle) = snapshot.handles.first() {
        if let Ok(children) = handle.backend.list_children("/") {
            resources.extend(children);
        }
    }

    if req.background {
        state.map_entries.initialize_in_background(resources, Vec::new());
    } else {
        state.map_entries.initialize(&resources, Vec::new());
    }

    tracing::info!(background = req.background, "refresh");

    Json(RefreshResponse {
        state: format!("{:?}", state.map_entries.state()),
        change_generation: state.map_entries.change_generation(),
    })
}

// ---------------------------------------------------------------------------
// GET /status
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub service: String,
    pub state: String,
    pub mounted_providers: usize,
    pub unclosed_resolvers: u64,
}

pub async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let mounted = state.registry.read().snapshot().handles.len();
    let lifecycle = state.map_entries.state();
    Json(StatusResponse {
        service: "rmap-service".to_string(),
        state: format!("{:?}", lifecycle),
        mounted_providers: mounted,
        unclosed_resolvers: state.map_entries.unclosed_resolvers(),
    })
}
