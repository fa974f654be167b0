mod format;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use provenance_graph::build_graph;
use provenance_schemas::{
    AssumptionId, FragmentId, GraphData, LinkType, NewFragment, SearchResults, SourceType,
};
use provenance_store::{FragmentFilter, Store, DEFAULT_RELATED_LIMIT};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use format::{
    format_assumption, format_decision, format_related, format_result, link_icon, validity_badge,
};

/// How many links the graph view considers before induced-subgraph pruning.
const GRAPH_LINK_SCAN_LIMIT: usize = 5000;

#[derive(Parser, Debug)]
#[command(name = "prov")]
#[command(about = "Capture the why behind your decisions")]
#[command(version)]
struct Cli {
    /// Path to the SQLite database file (defaults to $PROVENANCE_DB, then
    /// ~/.local/share/provenance/provenance.db)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture a context fragment
    Capture {
        /// The content to capture
        content: String,

        /// Project name for organization
        #[arg(short, long)]
        project: Option<String>,

        /// Topic tags (can be used multiple times)
        #[arg(short = 't', long = "topic")]
        topics: Vec<String>,

        /// Reference URL or identifier
        #[arg(long)]
        link: Option<String>,
    },

    /// Search for context fragments
    Search {
        /// Free-text search query
        query: String,

        /// Maximum number of results
        #[arg(short = 'l', long, default_value_t = 10)]
        limit: usize,

        /// Filter by project name
        #[arg(short, long)]
        project: Option<String>,

        /// Emit raw JSON instead of formatted output
        #[arg(long)]
        json: bool,
    },

    /// Show fragments related to a given fragment
    Related {
        /// Fragment ID to find related content for
        fragment_id: String,

        /// Maximum number of results
        #[arg(short = 'l', long, default_value_t = DEFAULT_RELATED_LIMIT)]
        limit: usize,

        /// Filter by link type (relates_to, references, follows,
        /// contradicts, invalidates)
        #[arg(short = 't', long = "type")]
        link_type: Option<String>,
    },

    /// Link two fragments
    Link {
        /// Source fragment ID
        source_id: String,

        /// Target fragment ID
        target_id: String,

        /// Link type (relates_to, references, follows, contradicts,
        /// invalidates)
        #[arg(short = 't', long = "type")]
        link_type: Option<String>,

        /// Link strength in [0.0, 1.0]
        #[arg(long)]
        strength: Option<f64>,
    },

    /// List decisions
    Decisions {
        /// Filter by project name
        #[arg(short, long)]
        project: Option<String>,

        /// Filter by time period (e.g. 7d, 30d, 2w, 1m)
        #[arg(long)]
        last: Option<String>,

        /// Maximum number of results
        #[arg(short = 'l', long, default_value_t = 20)]
        limit: usize,
    },

    /// List assumptions
    Assumptions {
        /// Filter by project name
        #[arg(short, long)]
        project: Option<String>,

        /// Filter by time period (e.g. 7d, 30d, 2w, 1m)
        #[arg(long)]
        last: Option<String>,

        /// Show only invalid assumptions
        #[arg(long)]
        invalid: bool,

        /// Maximum number of results
        #[arg(short = 'l', long, default_value_t = 20)]
        limit: usize,
    },

    /// Toggle an assumption's validity
    Mark {
        /// Assumption ID
        assumption_id: String,

        /// Mark the assumption valid (toggles back to unchecked when
        /// already set)
        #[arg(long, conflicts_with = "invalid")]
        valid: bool,

        /// Mark the assumption invalid (toggles back to unchecked when
        /// already set)
        #[arg(long)]
        invalid: bool,

        /// Fragment that invalidates this assumption (with --invalid)
        #[arg(long = "by")]
        invalidated_by: Option<String>,
    },

    /// Show the fragment graph
    Graph {
        /// Filter by project name
        #[arg(short, long)]
        project: Option<String>,

        /// Filter by source type (quick_capture, zoom, teams, notes)
        #[arg(long)]
        source_type: Option<String>,

        /// Only include fragments captured at or after this date/time
        #[arg(long)]
        since: Option<String>,

        /// Only include fragments captured at or before this date/time
        /// (a bare date covers the whole day)
        #[arg(long)]
        until: Option<String>,

        /// Maximum number of fragments
        #[arg(short = 'l', long, default_value_t = 500)]
        limit: usize,

        /// Emit raw JSON instead of formatted output
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("{}{err:#}", "✗ ".red().bold());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let db_path = resolve_db_path(cli.db_path)?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }

    let store = Store::new(&db_path)
        .with_context(|| format!("cannot open database at {}", db_path.display()))?;

    match cli.command {
        Command::Capture {
            content,
            project,
            topics,
            link,
        } => cmd_capture(&store, content, project, topics, link),
        Command::Search {
            query,
            limit,
            project,
            json,
        } => cmd_search(&store, &query, limit, project.as_deref(), json),
        Command::Related {
            fragment_id,
            limit,
            link_type,
        } => cmd_related(&store, &fragment_id, limit, link_type.as_deref()),
        Command::Link {
            source_id,
            target_id,
            link_type,
            strength,
        } => cmd_link(&store, &source_id, &target_id, link_type.as_deref(), strength),
        Command::Decisions {
            project,
            last,
            limit,
        } => cmd_decisions(&store, project.as_deref(), last.as_deref(), limit),
        Command::Assumptions {
            project,
            last,
            invalid,
            limit,
        } => cmd_assumptions(&store, project.as_deref(), last.as_deref(), invalid, limit),
        Command::Mark {
            assumption_id,
            valid,
            invalid,
            invalidated_by,
        } => cmd_mark(&store, &assumption_id, valid, invalid, invalidated_by),
        Command::Graph {
            project,
            source_type,
            since,
            until,
            limit,
            json,
        } => cmd_graph(&store, project, source_type, since, until, limit, json),
    }
}

fn resolve_db_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }
    if let Ok(env_path) = std::env::var("PROVENANCE_DB") {
        return Ok(PathBuf::from(env_path));
    }

    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(format!(
        "{home}/.local/share/provenance/provenance.db"
    )))
}

/// Parse a period like "7d", "2w", or "1m" (months approximated at 30
/// days) into a normalized since-bound.
fn parse_period(period: &str) -> Option<String> {
    let period = period.trim().to_lowercase();
    if period.len() < 2 || !period.is_ascii() {
        return None;
    }

    let (value, unit) = period.split_at(period.len() - 1);
    let value: u64 = value.parse().ok()?;

    let days = match unit {
        "d" => value as i64,
        "w" => value as i64 * 7,
        "m" => value as i64 * 30,
        _ => return None,
    };

    let since = Utc::now() - Duration::days(days);
    Some(since.format("%Y-%m-%dT%H:%M:%S%.3f+00:00").to_string())
}

fn parse_link_type(raw: &str) -> Result<LinkType> {
    LinkType::parse(raw).ok_or_else(|| {
        anyhow!("invalid link type: {raw} (expected relates_to, references, follows, contradicts, or invalidates)")
    })
}

fn since_from_last(last: Option<&str>) -> Result<Option<String>> {
    match last {
        None => Ok(None),
        Some(period) => parse_period(period)
            .map(Some)
            .ok_or_else(|| anyhow!("invalid period format: {period}. Use formats like 7d, 30d, 2w, 1m")),
    }
}

// ========== COMMANDS ==========

fn cmd_capture(
    store: &Store,
    content: String,
    project: Option<String>,
    topics: Vec<String>,
    link: Option<String>,
) -> Result<()> {
    let fragment = store.create_fragment(&NewFragment {
        content,
        project,
        topics,
        source_type: SourceType::QuickCapture,
        source_ref: link,
        participants: vec![],
        captured_at: None,
    })?;

    println!(
        "{}Captured! Fragment ID: {}",
        "✓ ".green().bold(),
        fragment.id
    );
    Ok(())
}

fn cmd_search(
    store: &Store,
    query: &str,
    limit: usize,
    project: Option<&str>,
    json: bool,
) -> Result<()> {
    let results = store.search_fragments(query, limit, project)?;

    if json {
        let payload = SearchResults {
            query: query.to_string(),
            results,
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("{} for \"{query}\"", "No results found".yellow());
        return Ok(());
    }

    let count = results.len();
    println!(
        "\nFound {} result{} for \"{query}\":\n",
        count.to_string().bold(),
        if count == 1 { "" } else { "s" },
    );

    for result in &results {
        println!("{}\n", format_result(result, query));
    }

    Ok(())
}

fn cmd_related(
    store: &Store,
    fragment_id: &str,
    limit: usize,
    link_type: Option<&str>,
) -> Result<()> {
    let link_type = link_type.map(parse_link_type).transpose()?;
    let fragment_id = FragmentId(fragment_id.to_string());

    let related = store.related_fragments(&fragment_id, link_type, limit)?;

    if related.is_empty() {
        println!(
            "{} for fragment {}",
            "No related fragments found".yellow(),
            fragment_id
        );
        return Ok(());
    }

    let count = related.len();
    println!(
        "\nFound {} related fragment{}:\n",
        count.to_string().bold(),
        if count == 1 { "" } else { "s" },
    );

    for entry in &related {
        println!("{}\n", format_related(entry));
    }

    Ok(())
}

fn cmd_link(
    store: &Store,
    source_id: &str,
    target_id: &str,
    link_type: Option<&str>,
    strength: Option<f64>,
) -> Result<()> {
    let link_type = link_type.map(parse_link_type).transpose()?;

    let link = store.add_link(
        &FragmentId(source_id.to_string()),
        &FragmentId(target_id.to_string()),
        link_type,
        strength,
    )?;

    println!(
        "{}Linked {} {} {} ({}, strength {:.2})",
        "✓ ".green().bold(),
        link.source_id,
        link_icon(link.link_type),
        link.target_id,
        link.link_type.as_str(),
        link.strength,
    );
    Ok(())
}

fn cmd_decisions(
    store: &Store,
    project: Option<&str>,
    last: Option<&str>,
    limit: usize,
) -> Result<()> {
    let since = since_from_last(last)?;
    let decisions = store.list_decisions(project, None, since.as_deref(), limit)?;

    if decisions.is_empty() {
        let mut message = String::from("No decisions found");
        if let Some(project) = project {
            message.push_str(&format!(" for project '{project}'"));
        }
        if let Some(last) = last {
            message.push_str(&format!(" in the last {last}"));
        }
        println!("{}", message.yellow());
        return Ok(());
    }

    let mut header = String::from("Decisions");
    if let Some(last) = last {
        header.push_str(&format!(" (last {last})"));
    }
    header.push(':');
    println!("\n{}\n", header.bold());

    for decision in &decisions {
        println!("{}\n", format_decision(decision));
    }

    Ok(())
}

fn cmd_assumptions(
    store: &Store,
    project: Option<&str>,
    last: Option<&str>,
    invalid: bool,
    limit: usize,
) -> Result<()> {
    let since = since_from_last(last)?;
    let still_valid = if invalid { Some(false) } else { None };

    let assumptions = store.list_assumptions(project, None, since.as_deref(), still_valid, limit)?;

    if assumptions.is_empty() {
        let mut message = String::from("No assumptions found");
        if let Some(project) = project {
            message.push_str(&format!(" for project '{project}'"));
        }
        if let Some(last) = last {
            message.push_str(&format!(" in the last {last}"));
        }
        if invalid {
            message.push_str(" (invalid only)");
        }
        println!("{}", message.yellow());
        return Ok(());
    }

    let mut header = String::from("Assumptions");
    if invalid {
        header.push_str(" (invalid only)");
    } else if let Some(last) = last {
        header.push_str(&format!(" (last {last})"));
    }
    header.push(':');
    println!("\n{}\n", header.bold());

    for assumption in &assumptions {
        println!("{}\n", format_assumption(assumption));
    }

    Ok(())
}

fn cmd_mark(
    store: &Store,
    assumption_id: &str,
    valid: bool,
    invalid: bool,
    invalidated_by: Option<String>,
) -> Result<()> {
    if valid == invalid {
        bail!("pass exactly one of --valid or --invalid");
    }
    if invalidated_by.is_some() && valid {
        bail!("--by only applies when marking an assumption invalid");
    }

    let assumption_id = AssumptionId(assumption_id.to_string());
    let invalidating = invalidated_by.map(FragmentId);

    let updated = store.toggle_assumption_validity(&assumption_id, valid, invalidating.as_ref())?;

    let (_, status) = validity_badge(updated.still_valid);
    println!(
        "{}Assumption {} is now {status}",
        "✓ ".green().bold(),
        updated.id
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_graph(
    store: &Store,
    project: Option<String>,
    source_type: Option<String>,
    since: Option<String>,
    until: Option<String>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let mut filter = FragmentFilter::new();
    if let Some(project) = project {
        filter = filter.project(project);
    }
    if let Some(raw) = source_type {
        let parsed = SourceType::parse(&raw.to_lowercase()).ok_or_else(|| {
            anyhow!("invalid source type: {raw} (expected quick_capture, zoom, teams, or notes)")
        })?;
        filter = filter.source_type(parsed);
    }
    if let Some(since) = since {
        filter = filter.since(&since)?;
    }
    if let Some(until) = until {
        filter = filter.until(&until)?;
    }

    let fragments = store.list_fragments(&filter, limit, 0)?;
    let links = store.list_links(GRAPH_LINK_SCAN_LIMIT)?;
    let graph = build_graph(&fragments, &links);

    if json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
        return Ok(());
    }

    print_graph(&graph);
    Ok(())
}

fn print_graph(graph: &GraphData) {
    println!(
        "\n{} {} node{}, {} edge{}\n",
        "Graph:".bold(),
        graph.nodes.len(),
        if graph.nodes.len() == 1 { "" } else { "s" },
        graph.edges.len(),
        if graph.edges.len() == 1 { "" } else { "s" },
    );

    // Busiest fragments first; ties keep the snapshot's newest-first order.
    let mut nodes: Vec<_> = graph.nodes.iter().collect();
    nodes.sort_by(|a, b| b.connections.cmp(&a.connections));

    for node in nodes {
        println!(
            "  {:>3} ⬡ {}  {}",
            node.connections,
            provenance_graph::truncate(&node.label, 60),
            node.id.to_string().dimmed(),
        );
    }

    if !graph.edges.is_empty() {
        println!();
        for edge in &graph.edges {
            println!(
                "  {} {} {} {}  ({:.2})",
                edge.source.to_string().dimmed(),
                link_icon(edge.link_type),
                edge.link_type.as_str(),
                edge.target.to_string().dimmed(),
                edge.strength,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_period() {
        assert!(parse_period("7d").is_some());
        assert!(parse_period("2w").is_some());
        assert!(parse_period("1m").is_some());
        assert!(parse_period("7x").is_none());
        assert!(parse_period("d").is_none());
        assert!(parse_period("").is_none());
        assert!(parse_period("-3d").is_none());
    }

    #[test]
    fn test_parse_period_is_a_normalized_bound() {
        let bound = parse_period("7d").unwrap();
        assert!(bound.ends_with("+00:00"));
        assert_eq!(bound.len(), "2024-01-01T00:00:00.000+00:00".len());
    }

    #[test]
    fn test_parse_link_type_rejects_unknown() {
        assert!(parse_link_type("relates_to").is_ok());
        assert!(parse_link_type("duplicates").is_err());
    }
}
