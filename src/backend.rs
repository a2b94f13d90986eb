//! The search backend seam.
//!
//! The pipeline only needs one capability from the backend: run a search
//! request body against an index path and hand back either a response or a
//! structured failure. [`SearchBackend`] captures that so tests and
//! alternative transports can stand in for [`HttpBackend`].

pub mod http;
pub mod response;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

pub use http::HttpBackend;
pub use response::{
    BackendFailure, ErrorCause, HitSource, RawHit, RawResponse, RedirectRef, SuggestEntry,
    SuggestOption, TotalHits,
};

/// A fully prepared search request.
#[derive(Debug, Clone, Serialize)]
pub struct BackendRequest {
    /// Comma separated index names.
    pub index: String,

    /// Request body.
    pub body: serde_json::Value,

    /// URL query parameters (`timeout`, `search_type`, ...).
    pub params: Vec<(String, String)>,

    /// How long the caller waits for an answer.
    #[serde(skip)]
    pub client_timeout: Duration,
}

impl BackendRequest {
    /// Path of the search endpoint relative to the cluster root.
    pub fn path(&self) -> String {
        format!("{}/_search", self.index)
    }
}

/// Something that can execute search requests.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run one search request.
    async fn search(
        &self,
        request: &BackendRequest,
    ) -> std::result::Result<RawResponse, BackendFailure>;
}
