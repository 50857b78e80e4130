//! HTTP client for rmap-service.
//!
//! Thin `reqwest::blocking` wrapper so callers (the CLI, or any other
//! embedder) can talk to a remote resolution core the same way they'd use
//! `rmap_core` in-process.

pub mod service_client;

pub use service_client::{
    ClientError, MapResponse, RefreshResponse, ResolveResponse, ServiceClient, StatusResponse,
};
