//! heapsnap - query a heap snapshot file for live objects
//!
//! Reads a `.heapsnapshot` file, finds every object that owns all the given
//! properties and prints the rebuilt objects as JSON.
//!
//! Usage:
//!   heapsnap query --file page.heapsnapshot --properties userId,email
//!                  [--ignore-properties session] [--max-depth 8]
//!                  [--timeout 30] [--graph] [--output result.json]
//!
//! Logging:
//!   HEAPSNAP_LOG=heapsnap=debug heapsnap query ...

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use heapsnap::graph::build_graph;
use heapsnap::query::{find_node_ids_with_properties, ObjectMatch};
use heapsnap::value::default_edge_filter;
use heapsnap::{BuiltValue, HeapSnapshot, ObjectQuery, SnapshotError};

const EXIT_QUERY_FAILED: i32 = 1;
const EXIT_BAD_SNAPSHOT: i32 = 2;
const EXIT_USAGE: i32 = 64;

/// Stack for runtime threads: JSON output of deeply nested values recurses
const THREAD_STACK_SIZE: usize = 64 * 1024 * 1024;

// ============================================================================
// Output Types
// ============================================================================

/// One entry of the JSON result array
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireMatch<'a> {
    Value {
        #[serde(rename = "nodeId")]
        node_id: u64,
        value: &'a BuiltValue,
    },
    Error {
        #[serde(rename = "nodeId")]
        node_id: u64,
        error: String,
    },
}

impl<'a> From<&'a ObjectMatch> for WireMatch<'a> {
    fn from(m: &'a ObjectMatch) -> Self {
        match &m.value {
            Ok(value) => WireMatch::Value {
                node_id: m.node_id,
                value,
            },
            Err(e) => WireMatch::Error {
                node_id: m.node_id,
                error: e.to_string(),
            },
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
struct QueryConfig {
    file: PathBuf,
    properties: Vec<String>,
    ignore_properties: Vec<String>,
    max_depth: Option<usize>,
    timeout: Option<Duration>,
    graph: bool,
    output: Option<PathBuf>,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_args(args: &[String]) -> Result<QueryConfig, String> {
    match args.first().map(String::as_str) {
        Some("query") => {}
        Some(other) => return Err(format!("Unknown command: {}", other)),
        None => return Err("Missing command".into()),
    }

    let mut file = None;
    let mut properties = Vec::new();
    let mut ignore_properties = Vec::new();
    let mut max_depth = None;
    let mut timeout = None;
    let mut graph = false;
    let mut output = None;

    let mut iter = args[1..].iter();
    while let Some(flag) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("Missing value for {}", flag))
        };

        match flag.as_str() {
            "--file" | "-f" => file = Some(PathBuf::from(value()?)),
            "--properties" | "-p" => properties = split_list(&value()?),
            "--ignore-properties" | "-i" => ignore_properties = split_list(&value()?),
            "--max-depth" => {
                let raw = value()?;
                max_depth = Some(
                    raw.parse::<usize>()
                        .map_err(|_| format!("Invalid --max-depth: {}", raw))?,
                );
            }
            "--timeout" => {
                let raw = value()?;
                let secs = raw
                    .parse::<u64>()
                    .map_err(|_| format!("Invalid --timeout: {}", raw))?;
                timeout = Some(Duration::from_secs(secs));
            }
            "--output" | "-o" => output = Some(PathBuf::from(value()?)),
            "--graph" => graph = true,
            other => return Err(format!("Unknown option: {}", other)),
        }
    }

    let file = file.ok_or("--file is required")?;
    if properties.is_empty() {
        return Err("--properties needs at least one property name".into());
    }

    Ok(QueryConfig {
        file,
        properties,
        ignore_properties,
        max_depth,
        timeout,
        graph,
        output,
    })
}

fn print_usage() {
    eprintln!("Usage: heapsnap query --file <snapshot> --properties <a,b,...> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -f, --file <path>                Heap snapshot file");
    eprintln!("  -p, --properties <list>          Comma separated properties to search for");
    eprintln!("  -i, --ignore-properties <list>   Comma separated properties to leave out of objects");
    eprintln!("      --max-depth <n>              Stop expanding objects below this depth");
    eprintln!("      --timeout <secs>             Give up on the query after this many seconds");
    eprintln!("      --graph                      Print the structured graphs instead of values");
    eprintln!("  -o, --output <path>              Write the result to a file instead of stdout");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  HEAPSNAP_LOG                     Log filter (default: heapsnap=info)");
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("HEAPSNAP_LOG")
        .unwrap_or_else(|_| EnvFilter::new("heapsnap=info"));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

// ============================================================================
// Query Execution
// ============================================================================

fn render_values(snapshot: &HeapSnapshot, config: &QueryConfig) -> anyhow::Result<String> {
    let mut query = ObjectQuery::new(config.properties.iter().cloned())
        .ignore_all(config.ignore_properties.iter().cloned());
    query.max_depth = config.max_depth;

    let matches = query.run(snapshot)?;
    let wire: Vec<WireMatch<'_>> = matches.iter().map(WireMatch::from).collect();
    Ok(serde_json::to_string_pretty(&wire)?)
}

fn render_graphs(snapshot: &HeapSnapshot, config: &QueryConfig) -> anyhow::Result<String> {
    let node_ids = find_node_ids_with_properties(snapshot, &config.properties)?;
    let filter = default_edge_filter(|p: &str| !config.ignore_properties.iter().any(|i| i == p));

    let mut out = String::new();
    for node_id in node_ids {
        let graph = build_graph(snapshot, node_id, config.max_depth, &filter)
            .with_context(|| format!("building graph for node {}", node_id))?;
        out.push_str(&graph.to_string());
        out.push('\n');
    }
    Ok(out)
}

async fn load_snapshot(path: PathBuf) -> anyhow::Result<HeapSnapshot> {
    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || HeapSnapshot::open(&path))
        .await
        .context("snapshot loader task failed")?
        .with_context(|| format!("Error loading heap snapshot {}", display))
}

async fn run_query(snapshot: Arc<HeapSnapshot>, config: QueryConfig) -> anyhow::Result<()> {
    let timeout = config.timeout;
    let output = config.output.clone();

    let task = tokio::task::spawn_blocking(move || {
        if config.graph {
            render_graphs(&snapshot, &config)
        } else {
            render_values(&snapshot, &config)
        }
    });

    // The traversal has no suspension points; a deadline abandons the whole task
    let rendered = match timeout {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| anyhow!("query timed out after {:?}", limit))?,
        None => task.await,
    }
    .context("query task failed")??;

    match output {
        Some(path) => {
            tokio::fs::write(&path, rendered)
                .await
                .with_context(|| format!("writing {:?}", path))?;
            tracing::info!("Result written to {:?}", path);
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Query-time errors that mean the snapshot itself is corrupt
fn is_malformed_snapshot(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<SnapshotError>()
            .map_or(false, SnapshotError::is_malformed_snapshot)
    })
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(THREAD_STACK_SIZE)
        .build();

    match runtime {
        Ok(runtime) => runtime.block_on(run()),
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(EXIT_QUERY_FAILED);
        }
    }
}

async fn run() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let config = match parse_args(&args) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("{}", msg);
            eprintln!();
            print_usage();
            std::process::exit(EXIT_USAGE);
        }
    };

    init_logging();

    // Bad snapshot and bad query are reported with different exit codes
    let snapshot = match load_snapshot(config.file.clone()).await {
        Ok(snapshot) => Arc::new(snapshot),
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(EXIT_BAD_SNAPSHOT);
        }
    };

    if let Err(e) = run_query(snapshot, config).await {
        if is_malformed_snapshot(&e) {
            tracing::error!("Snapshot is malformed: {:#}", e);
            std::process::exit(EXIT_BAD_SNAPSHOT);
        }
        tracing::error!("Query failed: {:#}", e);
        std::process::exit(EXIT_QUERY_FAILED);
    }
}
