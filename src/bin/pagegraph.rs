//! Binary entry point for the pagegraph CLI.
#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pagegraph::{
    algs::{
        compute_overlap, compute_wcc, run_topk_scan, OverlapShared, OverlapVertex, TopKConfig,
        TopKShared, TopKVertex, WccVertex,
    },
    cli::import::{run_import, CliError, ImportConfig},
    engine::config::default_config_path,
    graph::{self, GraphIndex},
    logging::init_logging,
    ComputeVertex, EngineConfig, GraphEngine, VertexId,
};
use serde::Serialize;
use serde_json::json;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "pagegraph",
    version,
    about = "Out-of-core vertex-centric graph processing",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "PAGEGRAPH_CONFIG",
        help = "Engine configuration file (TOML)"
    )]
    config: Option<PathBuf>,

    #[arg(
        short = 'c',
        long = "option",
        global = true,
        value_name = "KEY=VALUE,...",
        help = "Engine option overrides, applied after the config file"
    )]
    options: Vec<String>,

    #[arg(
        long,
        global = true,
        default_value = "warn",
        help = "Log filter directive; RUST_LOG wins when set"
    )]
    log_level: String,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for results"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args, Debug)]
struct GraphArgs {
    #[arg(
        long = "graph",
        value_name = "FILE",
        required = true,
        num_args = 1..,
        help = "Adjacency files, in stripe order"
    )]
    graph: Vec<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Vertex index file")]
    index: PathBuf,

    #[arg(short = 'p', long, help = "Load all adjacency pages before running")]
    preload: bool,
}

#[derive(Args, Debug)]
struct ImportCmd {
    #[arg(value_name = "EDGES", help = "Edge list, one 'src dst' pair per line")]
    input: PathBuf,

    #[arg(
        long = "graph",
        value_name = "FILE",
        required = true,
        num_args = 1..,
        help = "Adjacency files to write"
    )]
    graph: Vec<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Vertex index file to write")]
    index: PathBuf,

    #[arg(long, help = "Store every edge in both directions")]
    undirected: bool,

    #[arg(long, help = "Vertex count; defaults to the largest id + 1")]
    vertex_count: Option<u32>,

    #[arg(long, help = "Field separator; sniffed when omitted")]
    delimiter: Option<char>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a text edge list into graph and index files.
    Import(ImportCmd),
    /// Print the graph header and index statistics.
    Info {
        #[command(flatten)]
        graph: GraphArgs,
    },
    /// Weakly connected components.
    Wcc {
        #[command(flatten)]
        graph: GraphArgs,

        #[arg(long, value_name = "FILE", help = "Write 'vertex,label' rows to FILE")]
        output: Option<PathBuf>,
    },
    /// Vertices with the largest local scan.
    TopkScan {
        #[command(flatten)]
        graph: GraphArgs,

        #[arg(short = 'k', long, default_value_t = 1)]
        k: usize,

        #[arg(
            long,
            default_value_t = 1000,
            help = "Edge threshold of the first discovery pass"
        )]
        min_edges: u32,
    },
    /// Pairwise neighbourhood overlap of a vertex set.
    Overlap {
        #[command(flatten)]
        graph: GraphArgs,

        #[arg(
            long,
            value_name = "ID,ID,...",
            value_delimiter = ',',
            required = true,
            num_args = 1..
        )]
        vertices: Vec<u32>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;
    let config = load_config(&cli)?;

    match cli.command {
        Command::Import(cmd) => {
            let delimiter = match cmd.delimiter {
                Some(c) if c.is_ascii() => Some(c as u8),
                Some(c) => return Err(format!("delimiter '{c}' is not ASCII").into()),
                None => None,
            };
            let import_cfg = ImportConfig {
                input: cmd.input,
                graph_paths: cmd.graph,
                index_path: cmd.index,
                undirected: cmd.undirected,
                vertex_count: cmd.vertex_count,
                page_size: config.page_size,
                stripe_pages: config.stripe_pages,
                delimiter,
            };
            let summary = tokio::task::spawn_blocking(move || run_import(&import_cfg))
                .await
                .map_err(|err| CliError::Message(format!("import task failed: {err}")))??;
            let b = &summary.build;
            match cli.format {
                OutputFormat::Json => print_json(&json!({
                    "lines": summary.lines_read,
                    "vertices": b.vertices,
                    "edges": b.edges,
                    "data_pages": b.data_pages,
                    "files": b.files,
                    "self_loops_dropped": b.self_loops_dropped,
                    "duplicates_dropped": b.duplicates_dropped,
                }))?,
                OutputFormat::Text => println!(
                    "Imported {} vertices and {} edges into {} file(s) ({} pages); dropped {} self-loops and {} duplicates",
                    b.vertices, b.edges, b.files, b.data_pages, b.self_loops_dropped, b.duplicates_dropped
                ),
            }
        }
        Command::Info { graph: args } => {
            let first = args
                .graph
                .first()
                .ok_or_else(|| CliError::from("no graph file given"))?;
            let header = graph::read_header(first)?;
            let index = GraphIndex::open(&args.index)?;
            let max_degree = index
                .vertices()
                .map(|v| index.num_edges(v))
                .max()
                .unwrap_or(0);
            let report = InfoReport {
                vertices: index.vertex_count(),
                edges: index.edge_count(),
                page_size: header.page_size,
                files: header.file_count,
                stripe_pages: header.stripe_pages,
                data_pages: header.data_pages,
                max_degree,
            };
            match cli.format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => {
                    println!("vertices      {}", report.vertices);
                    println!("edges         {}", report.edges);
                    println!("page size     {}", report.page_size);
                    println!("files         {}", report.files);
                    println!("stripe pages  {}", report.stripe_pages);
                    println!("data pages    {}", report.data_pages);
                    println!("max degree    {}", report.max_degree);
                }
            }
        }
        Command::Wcc {
            graph: args,
            output,
        } => {
            let engine = open_engine::<WccVertex>(&args, &config, ())?;
            let out = drive(engine, compute_wcc).await?;
            if let Some(path) = &output {
                let mut writer = csv::Writer::from_path(path)?;
                for (id, label) in out.labels.iter().enumerate() {
                    let label = label.map(|l| l.0.to_string()).unwrap_or_default();
                    writer.write_record([id.to_string(), label])?;
                }
                writer.flush()?;
            }
            let isolated = out.labels.iter().filter(|l| l.is_none()).count();
            match cli.format {
                OutputFormat::Json => print_json(&json!({
                    "components": out.components,
                    "isolated": isolated,
                    "find": out.find,
                    "remove_empty": out.remove_empty,
                }))?,
                OutputFormat::Text => {
                    println!(
                        "{} components, {} vertices without edges",
                        out.components, isolated
                    );
                    println!(
                        "propagation took {} supersteps, {} messages, {:?}",
                        out.find.supersteps, out.find.messages, out.find.elapsed
                    );
                }
            }
        }
        Command::TopkScan {
            graph: args,
            k,
            min_edges,
        } => {
            let engine = open_engine::<TopKVertex>(&args, &config, TopKShared::default())?;
            let topk = TopKConfig { k, min_edges };
            let out = drive(engine, move |engine| run_topk_scan(engine, topk)).await?;
            match cli.format {
                OutputFormat::Json => {
                    let top: Vec<_> = out
                        .top
                        .iter()
                        .map(|(v, scan)| json!({ "vertex": v, "scan": scan }))
                        .collect();
                    print_json(&json!({ "top": top, "passes": out.passes }))?
                }
                OutputFormat::Text => {
                    for (rank, (v, scan)) in out.top.iter().enumerate() {
                        println!("{:>4}  {:>10}  {}", rank + 1, v.0, scan);
                    }
                    for (i, pass) in out.passes.iter().enumerate() {
                        println!(
                            "pass {i}: processed {} vertices, completed {} ({} supersteps)",
                            pass.vertices_activated, pass.vertices_run, pass.supersteps
                        );
                    }
                }
            }
        }
        Command::Overlap {
            graph: args,
            vertices,
        } => {
            let engine = open_engine::<OverlapVertex>(&args, &config, OverlapShared::default())?;
            let ids: Vec<VertexId> = vertices.into_iter().map(VertexId).collect();
            let report = drive(engine, move |engine| compute_overlap(engine, &ids)).await?;
            match cli.format {
                OutputFormat::Json => print_json(&json!({
                    "pairs": report.pairs,
                    "intersection": report.intersection,
                    "union": report.union_size,
                    "summary": report.summary,
                }))?,
                OutputFormat::Text => {
                    for pair in &report.pairs {
                        println!(
                            "{} {}  common={} union={} overlap={:.4}",
                            pair.a.0, pair.b.0, pair.common, pair.union, pair.overlap
                        );
                    }
                    println!(
                        "{} vertices shared by all, {} covered",
                        report.intersection.len(),
                        report.union_size
                    );
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct InfoReport {
    vertices: usize,
    edges: u64,
    page_size: u32,
    files: u32,
    stripe_pages: u32,
    data_pages: u64,
    max_degree: u32,
}

fn load_config(cli: &Cli) -> Result<EngineConfig, CliError> {
    let mut config = EngineConfig::load_or_default(cli.config.as_deref())?;
    for spec in &cli.options {
        config.apply_overrides(spec)?;
    }
    config.validate()?;
    info!(
        path = ?cli.config.clone().or_else(default_config_path),
        threads = config.threads,
        cache_pages = config.cache_pages,
        "cli.config"
    );
    Ok(config)
}

fn open_engine<V: ComputeVertex>(
    args: &GraphArgs,
    config: &EngineConfig,
    shared: V::Shared,
) -> Result<GraphEngine<V>, CliError> {
    let index = GraphIndex::open(&args.index)?;
    let engine = GraphEngine::create(&args.graph, index, config, shared)?;
    if args.preload {
        let pages = engine.preload()?;
        info!(pages, "cli.preload");
    }
    Ok(engine)
}

/// Runs `job` on a blocking thread. Ctrl-C cancels the engine and exits with 130.
async fn drive<V, T, F>(engine: GraphEngine<V>, job: F) -> Result<T, CliError>
where
    V: ComputeVertex,
    T: Send + 'static,
    F: FnOnce(&mut GraphEngine<V>) -> pagegraph::Result<T> + Send + 'static,
{
    let token = engine.cancel_token();
    let mut handle = tokio::task::spawn_blocking(move || {
        let mut engine = engine;
        job(&mut engine)
    });
    tokio::select! {
        joined = &mut handle => {
            let result = joined
                .map_err(|err| CliError::Message(format!("engine task failed: {err}")))?;
            Ok(result?)
        }
        _ = tokio::signal::ctrl_c() => {
            token.cancel();
            // Let the run stop and flush its profile before exiting.
            let _ = handle.await;
            eprintln!("interrupted");
            std::process::exit(130);
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::Message(format!("failed to encode output: {err}")))?;
    println!("{text}");
    Ok(())
}
