//! Command implementations for the Searchline CLI.

use std::sync::Arc;

use crate::backend::HttpBackend;
use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::SearchConfig;
use crate::error::{Result, SearchlineError};
use crate::query::parsed::RawQuery;
use crate::searcher::Searcher;

/// Execute a CLI command.
pub async fn execute_command(args: SearchlineArgs) -> Result<()> {
    let config = load_config(&args)?;
    match &args.command {
        Command::Search(query_args) => search(config, query_args, &args).await,
        Command::Dump(query_args) => dump(config, query_args, &args),
        Command::Parse(parse_args) => parse(config, parse_args, &args),
        Command::Config => output_result("Effective configuration", &config, &args),
    }
}

/// The configuration file, or defaults, with command line overrides applied.
pub fn load_config(args: &SearchlineArgs) -> Result<SearchConfig> {
    let mut config = match &args.config {
        Some(path) => SearchConfig::from_file(path)?,
        None => SearchConfig::default(),
    };
    if let Some(url) = &args.backend_url {
        config.backend.base_url = url.clone();
    }
    Ok(config)
}

/// Turn command line query arguments into a request.
pub fn raw_query(args: &QueryArgs) -> RawQuery {
    let mut raw = RawQuery::new(args.query.clone())
        .with_namespaces(args.namespaces.iter().copied())
        .with_offset(args.offset)
        .with_limit(args.limit)
        .with_sort(args.sort)
        .with_results_type(args.results_type.into());
    if let Some(language) = &args.user_language {
        raw = raw.with_user_language(language.clone());
    }
    raw
}

fn searcher(config: SearchConfig) -> Result<Searcher> {
    let backend = HttpBackend::from_config(&config.backend)?;
    Searcher::new(config, Arc::new(backend))
}

async fn search(config: SearchConfig, args: &QueryArgs, cli_args: &SearchlineArgs) -> Result<()> {
    let searcher = searcher(config)?;
    match searcher.search(&raw_query(args)).await {
        Ok(response) => output_search(&response, cli_args),
        Err(SearchlineError::Search(failure)) => {
            output_failure(&failure, cli_args)?;
            Err(SearchlineError::Search(failure))
        }
        Err(e) => Err(e),
    }
}

fn dump(config: SearchConfig, args: &QueryArgs, cli_args: &SearchlineArgs) -> Result<()> {
    let searcher = searcher(config)?;
    output_dump(&searcher.dump(&raw_query(args)), cli_args)
}

fn parse(config: SearchConfig, args: &ParseArgs, cli_args: &SearchlineArgs) -> Result<()> {
    let searcher = searcher(config)?;
    output_parsed(&searcher.parse(&RawQuery::new(args.query.clone())), cli_args)
}
