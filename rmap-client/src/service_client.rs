//! HTTP client for rmap-service.

use rmap_core::Resource;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{code}: {message} ({hint})")]
    Service {
        code: String,
        message: String,
        hint: String,
    },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    code: String,
    message: String,
    hint: String,
}

#[derive(Serialize)]
struct ResolveRequest<'a> {
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    authority: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind")]
pub enum ResolveResponse {
    Resource { resource: Resource },
    Redirect { status: i32, location: String },
    NotFound,
}

#[derive(Serialize)]
struct MapRequest<'a> {
    resource_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_path: Option<&'a str>,
    all: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MapResponse {
    pub mappings: Vec<String>,
}

#[derive(Serialize)]
struct RefreshRequest {
    background: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RefreshResponse {
    pub state: String,
    pub change_generation: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusResponse {
    pub service: String,
    pub state: String,
    pub mounted_providers: usize,
    pub unclosed_resolvers: u64,
}

pub struct ServiceClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl ServiceClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn resolve(&self, path: &str, authority: Option<&str>) -> Result<ResolveResponse, ClientError> {
        let url = format!("{}/resolve", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&ResolveRequest { path, authority })
            .send()?;
        if !resp.status().is_success() {
            return self.handle_error(resp);
        }
        Ok(resp.json()?)
    }

    pub fn map(&self, resource_path: &str, context_path: Option<&str>, all: bool) -> Result<MapResponse, ClientError> {
        let url = format!("{}/map", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&MapRequest { resource_path, context_path, all })
            .send()?;
        if !resp.status().is_success() {
            return self.handle_error(resp);
        }
        Ok(resp.json()?)
    }

    pub fn refresh(&self, background: bool) -> Result<RefreshResponse, ClientError> {
        let url = format!("{}/refresh", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&RefreshRequest { background })
            .send()?;
        if !resp.status().is_success() {
            return self.handle_error(resp);
        }
        Ok(resp.json()?)
    }

    pub fn status(&self) -> Result<StatusResponse, ClientError> {
        let url = format!("{}/status", self.base_url);
        let resp = self.client.get(&url).send()?;
        if !resp.status().is_success() {
            return self.handle_error(resp);
        }
        Ok(resp.json()?)
    }

    fn handle_error<T>(&self, resp: reqwest::blocking::Response) -> Result<T, ClientError> {
        let status = resp.status();
        match resp.json::<ErrorEnvelope>() {
            Ok(envelope) => Err(ClientError::Service {
                code: envelope.code,
                message: envelope.message,
                hint: envelope.hint,
            }),
            Err(_) => Err(ClientError::Service {
                code: format!("http_{}", status.as_u16()),
                message: format!("HTTP {status} from service"),
                hint: "check service logs".to_string(),
            }),
        }
    }
}
