//! Command line argument parsing for the Searchline CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::query::parsed::SortMode;
use crate::results::ResultsType;

/// Searchline - query interpretation and execution against a search backend
#[derive(Parser, Debug, Clone)]
#[command(name = "searchline")]
#[command(about = "Interpret full-text queries and run them against a search backend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct SearchlineArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Configuration file (JSON)
    #[arg(short, long, value_name = "CONFIG_FILE", env = "SEARCHLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Backend base URL, overriding the configuration file
    #[arg(long, value_name = "URL", env = "SEARCHLINE_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl SearchlineArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }

    /// Default log filter for the effective verbosity.
    pub fn log_level(&self) -> &'static str {
        match self.verbosity() {
            0 => "error",
            1 => "warn",
            2 => "info",
            _ => "debug",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a query against the backend
    Search(QueryArgs),

    /// Print the request a query would send, without sending it
    Dump(QueryArgs),

    /// Show how a query is interpreted
    Parse(ParseArgs),

    /// Print the effective configuration
    Config,
}

/// Arguments shared by `search` and `dump`
#[derive(Parser, Debug, Clone)]
pub struct QueryArgs {
    /// Query string
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Namespaces to search (comma-separated ids, default: all)
    #[arg(short, long, value_delimiter = ',')]
    pub namespaces: Vec<i32>,

    /// Maximum number of results to return
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Offset for pagination
    #[arg(short, long, default_value = "0")]
    pub offset: usize,

    /// Result ordering
    #[arg(short, long, default_value = "relevance")]
    pub sort: SortMode,

    /// Shape of the results
    #[arg(short = 't', long = "results", default_value = "full-text")]
    pub results_type: ResultsKind,

    /// Language of the requester
    #[arg(long)]
    pub user_language: Option<String>,
}

/// Arguments for `parse`
#[derive(Parser, Debug, Clone)]
pub struct ParseArgs {
    /// Query string
    #[arg(value_name = "QUERY")]
    pub query: String,
}

/// Result shapes selectable on the command line
#[derive(ValueEnum, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultsKind {
    /// Titles with snippets
    FullText,
    /// Titles only
    Titles,
    /// Document ids only
    Ids,
}

impl From<ResultsKind> for ResultsType {
    fn from(kind: ResultsKind) -> Self {
        match kind {
            ResultsKind::FullText => ResultsType::FullText,
            ResultsKind::Titles => ResultsType::Titles,
            ResultsKind::Ids => ResultsType::Ids,
        }
    }
}

/// Output formats for CLI
#[derive(ValueEnum, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_basic_search_command() {
        let args = SearchlineArgs::try_parse_from([
            "searchline",
            "search",
            "incategory:Films noir",
            "--limit",
            "5",
            "--namespaces",
            "0,1",
            "--sort",
            "last_edit_desc",
        ])
        .unwrap();

        if let Command::Search(query_args) = args.command {
            assert_eq!(query_args.query, "incategory:Films noir");
            assert_eq!(query_args.limit, 5);
            assert_eq!(query_args.namespaces, vec![0, 1]);
            assert_eq!(query_args.sort, SortMode::LastEditDesc);
            assert!(matches!(query_args.results_type, ResultsKind::FullText));
        } else {
            panic!("Expected Search command");
        }
    }

    #[test]
    fn test_dump_command() {
        let args = SearchlineArgs::try_parse_from([
            "searchline",
            "--backend-url",
            "http://search:9200",
            "dump",
            "foo",
            "--results",
            "titles",
        ])
        .unwrap();

        assert_eq!(args.backend_url.as_deref(), Some("http://search:9200"));
        if let Command::Dump(query_args) = args.command {
            assert!(matches!(query_args.results_type, ResultsKind::Titles));
        } else {
            panic!("Expected Dump command");
        }
    }

    #[test]
    fn test_verbosity_levels() {
        // Default verbosity
        let args = SearchlineArgs::try_parse_from(["searchline", "config"]).unwrap();
        assert_eq!(args.verbosity(), 1);
        assert_eq!(args.log_level(), "warn");

        // Multiple verbose flags
        let args = SearchlineArgs::try_parse_from(["searchline", "-vv", "config"]).unwrap();
        assert_eq!(args.verbosity(), 2);
        assert_eq!(args.log_level(), "info");

        let args = SearchlineArgs::try_parse_from(["searchline", "-vvv", "config"]).unwrap();
        assert_eq!(args.log_level(), "debug");

        // Quiet flag
        let args = SearchlineArgs::try_parse_from(["searchline", "--quiet", "config"]).unwrap();
        assert_eq!(args.verbosity(), 0);
        assert_eq!(args.log_level(), "error");
    }

    #[test]
    fn test_output_format() {
        let args =
            SearchlineArgs::try_parse_from(["searchline", "--format", "json", "config"]).unwrap();
        assert!(matches!(args.output_format, OutputFormat::Json));
    }

    #[test]
    fn test_invalid_sort_rejected() {
        assert!(
            SearchlineArgs::try_parse_from(["searchline", "search", "foo", "--sort", "sideways"])
                .is_err()
        );
    }
}
