//! Output formatting for CLI commands.

use serde::Serialize;

use crate::cli::args::{OutputFormat, SearchlineArgs};
use crate::error::{Result, SearchFailure};
use crate::query::clause::Clause;
use crate::query::parsed::ParsedQuery;
use crate::results::{ResultEntity, SearchOutput};
use crate::searcher::{Dump, SearchResponse};

/// Output a serializable value in the requested format, with a generic
/// human rendering.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &SearchlineArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => {
            if args.verbosity() > 1 {
                println!("{message}");
                println!();
            }
            let value = serde_json::to_value(result)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in JSON format.
pub fn output_json<T: Serialize>(result: &T, args: &SearchlineArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}

/// Output a search response.
pub fn output_search(response: &SearchResponse, args: &SearchlineArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Json => output_json(response, args),
        OutputFormat::Human => {
            print!("{}", format_search_human(response, args.verbosity()));
            Ok(())
        }
    }
}

/// Output a failed search.
pub fn output_failure(failure: &SearchFailure, args: &SearchlineArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Json => output_json(failure, args),
        OutputFormat::Human => {
            eprintln!("Search failed: {}", failure.message_key);
            if args.verbosity() > 1 {
                eprintln!("  {}", failure.diagnostic);
            }
            Ok(())
        }
    }
}

/// Output a dumped request.
pub fn output_dump(dump: &Dump, args: &SearchlineArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Json => output_json(dump, args),
        OutputFormat::Human => {
            match &dump.path {
                Some(path) => {
                    let params = dump
                        .params
                        .iter()
                        .map(|(k, v)| format!("{k}={v}"))
                        .collect::<Vec<_>>()
                        .join("&");
                    println!("POST {path}?{params}");
                }
                None => println!("(empty query, nothing would be sent)"),
            }
            println!("{}", serde_json::to_string_pretty(&dump.body)?);
            Ok(())
        }
    }
}

/// Output a parsed query.
pub fn output_parsed(parsed: &ParsedQuery, args: &SearchlineArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Json => output_json(parsed, args),
        OutputFormat::Human => {
            print!("{}", format_parsed_human(parsed));
            Ok(())
        }
    }
}

fn format_parsed_human(parsed: &ParsedQuery) -> String {
    let mut out = String::new();
    out.push_str(&format!("Text:     {}\n", parsed.text));
    out.push_str(&format!("Escaped:  {}\n", parsed.residual));
    out.push_str(&format!("Pool:     {}\n", parsed.op_class().as_str()));
    if parsed.fuzzy {
        out.push_str("Fuzzy:    yes\n");
    }
    if !parsed.clauses.is_empty() {
        out.push_str("Clauses:\n");
        for clause in &parsed.clauses {
            out.push_str(&format!("  - {}\n", describe_clause(clause)));
        }
    }
    out
}

fn describe_clause(clause: &Clause) -> String {
    match clause {
        Clause::Phrase { text, slop, fuzzy } => {
            let mut s = format!("phrase \"{text}\"");
            if let Some(slop) = slop {
                s.push_str(&format!(" ~{slop}"));
            }
            if *fuzzy {
                s.push_str(" (stemmed)");
            }
            s
        }
        Clause::PrefixFilter { prefix, namespace } => match namespace {
            Some(ns) => format!("prefix '{prefix}' in namespace {ns}"),
            None => format!("prefix '{prefix}'"),
        },
        Clause::CategoryFilter { category } => format!("category '{category}'"),
        Clause::KeywordFilter { keyword, value } => format!("{} '{value}'", keyword.as_str()),
        Clause::NotFilter(inner) => format!("not {}", describe_clause(inner)),
        Clause::TemplateBoostDirective { templates } => {
            let list = templates
                .iter()
                .map(|(name, weight)| format!("{name}={weight}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("boost templates [{list}]")
        }
        Clause::RegexSourceFilter {
            pattern,
            case_sensitive,
        } => {
            let flag = if *case_sensitive { "" } else { "i" };
            format!("regex /{pattern}/{flag}")
        }
        Clause::RecencyDirective {
            decay_portion,
            half_life_days,
        } => format!("prefer recent (portion {decay_portion}, half life {half_life_days} days)"),
        Clause::LocalityDirective => "local only".to_string(),
        Clause::WildcardTerm { term } => format!("wildcard {term}"),
    }
}

fn format_search_human(response: &SearchResponse, verbosity: u8) -> String {
    let mut out = String::new();
    match &response.output {
        SearchOutput::FullText(full) => {
            out.push_str(&format!(
                "{} of {} results ({} ms)\n",
                full.results.len(),
                full.total_hits,
                full.took_ms
            ));
            if let Some(suggestion) = &full.suggestion {
                out.push_str(&format!("Did you mean: {}\n", suggestion.text));
            }
            for (i, entity) in full.results.iter().enumerate() {
                out.push('\n');
                out.push_str(&format_entity(i + 1, entity, verbosity));
            }
        }
        SearchOutput::Titles { titles, total_hits } => {
            out.push_str(&format!("{} of {} results\n", titles.len(), total_hits));
            for title in titles {
                out.push_str(&format!("{}\n", title.prefixed));
            }
        }
        SearchOutput::Ids { ids, total_hits } => {
            out.push_str(&format!("{} of {} results\n", ids.len(), total_hits));
            for id in ids {
                out.push_str(&format!("{id}\n"));
            }
        }
    }
    for warning in &response.warnings {
        out.push_str(&format!("warning: {warning}\n"));
    }
    out
}

fn format_entity(rank: usize, entity: &ResultEntity, verbosity: u8) -> String {
    let mut out = format!("{rank}. {}", entity.title.prefixed);
    if let Some(redirect) = &entity.redirect_title {
        out.push_str(&format!(" (redirect from {})", redirect.prefixed));
    }
    if let Some(section) = &entity.section_title {
        out.push_str(&format!(" § {section}"));
    }
    if let Some(interwiki) = &entity.interwiki {
        out.push_str(&format!(" [{interwiki}]"));
    }
    out.push('\n');
    if !entity.text_snippet.is_empty() {
        out.push_str(&format!("   {}\n", entity.text_snippet));
    }
    if verbosity > 1 {
        out.push_str(&format!(
            "   score {:.3}, {} words, {} bytes\n",
            entity.score, entity.word_count, entity.byte_size
        ));
    }
    out
}
