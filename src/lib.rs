//! # Searchline
//!
//! Full-text query interpretation and execution against a document search
//! backend.
//!
//! ## Features
//!
//! - Clause extraction for `key:value` directives, phrases and wildcards
//! - Escaping of free text for the backend query-string syntax
//! - Weighted multi-field queries with phrase rescoring and boosts
//! - Admission pools and timeouts per operation class
//! - Heuristic error classification with a single degraded retry
//! - Highlighted results with "did you mean" suggestions
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use searchline::prelude::*;
//!
//! # async fn run() -> searchline::error::Result<()> {
//! let config = SearchConfig::default();
//! let backend = HttpBackend::from_config(&config.backend)?;
//! let searcher = Searcher::new(config, Arc::new(backend))?;
//!
//! let response = searcher.search(&RawQuery::new("incategory:Films noir")).await?;
//! println!("{} results", response.output.total_hits());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod namespace;
pub mod query;
pub mod results;
pub mod searcher;

pub mod prelude {
    pub use crate::backend::{HttpBackend, SearchBackend};
    pub use crate::config::SearchConfig;
    pub use crate::error::{Result, SearchFailure, SearchlineError};
    pub use crate::query::{RawQuery, SortMode};
    pub use crate::results::{ResultsType, SearchOutput};
    pub use crate::searcher::{SearchResponse, Searcher};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
