use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use csv::{ReaderBuilder, StringRecord, Trim};
use thiserror::Error;
use tracing::{debug, info};

use crate::graph::{BuildSummary, GraphBuilder};
use crate::types::GraphError;

/// Configuration for turning a text edge list into graph files.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Edge list with one `src dst` pair per line.
    pub input: PathBuf,
    /// Adjacency files to stripe the pages over. At least one.
    pub graph_paths: Vec<PathBuf>,
    /// Where the vertex index is written.
    pub index_path: PathBuf,
    /// Store every edge in both directions.
    pub undirected: bool,
    /// Fixed vertex count; inferred from the largest id when `None`.
    pub vertex_count: Option<u32>,
    pub page_size: u32,
    pub stripe_pages: u32,
    /// Field separator; sniffed from the first data line when `None`.
    pub delimiter: Option<u8>,
}

/// Summary statistics from an import.
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    /// Edge lines read from the input.
    pub lines_read: u64,
    pub build: BuildSummary,
}

/// Error type for CLI operations.
#[derive(Error, Debug)]
pub enum CliError {
    /// Generic error message.
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// CSV parsing error.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// Engine or graph file error.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl From<&str> for CliError {
    fn from(value: &str) -> Self {
        CliError::Message(value.to_string())
    }
}

impl From<String> for CliError {
    fn from(value: String) -> Self {
        CliError::Message(value)
    }
}

/// Reads the edge list named by `cfg` and writes the graph and index files.
pub fn run_import(cfg: &ImportConfig) -> Result<ImportSummary, CliError> {
    if cfg.graph_paths.is_empty() {
        return Err("at least one graph file is required".into());
    }
    let delimiter = match cfg.delimiter {
        Some(d) => d,
        None => sniff_delimiter(&cfg.input)?,
    };
    debug!(
        input = %cfg.input.display(),
        delimiter = %char::from(delimiter).escape_default(),
        "import.start"
    );

    let mut builder = GraphBuilder::new()
        .undirected(cfg.undirected)
        .page_size(cfg.page_size)
        .stripe_pages(cfg.stripe_pages);
    if let Some(n) = cfg.vertex_count {
        builder = builder.vertex_count(n);
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .delimiter(delimiter)
        .from_path(&cfg.input)?;
    let mut lines_read = 0u64;
    for result in reader.records() {
        let record = result?;
        let Some((src, dst)) = parse_edge(&record)? else {
            continue;
        };
        builder.add_edge(src, dst);
        lines_read += 1;
    }

    let build = builder.finish(&cfg.graph_paths, &cfg.index_path)?;
    info!(
        lines = lines_read,
        vertices = build.vertices,
        edges = build.edges,
        "import.done"
    );
    Ok(ImportSummary { lines_read, build })
}

/// Extracts the first two non-empty fields. Blank lines yield `None`.
fn parse_edge(record: &StringRecord) -> Result<Option<(u32, u32)>, CliError> {
    let mut fields = record.iter().filter(|f| !f.is_empty());
    let Some(src) = fields.next() else {
        return Ok(None);
    };
    let line = record.position().map(|p| p.line()).unwrap_or(0);
    let dst = fields
        .next()
        .ok_or_else(|| CliError::Message(format!("line {line}: expected 'src dst'")))?;
    Ok(Some((parse_id(src, line)?, parse_id(dst, line)?)))
}

fn parse_id(field: &str, line: u64) -> Result<u32, CliError> {
    field
        .parse()
        .map_err(|_| CliError::Message(format!("line {line}: invalid vertex id '{field}'")))
}

/// Picks `,`, tab or space from the first line that is not a comment.
fn sniff_delimiter(path: &std::path::Path) -> Result<u8, CliError> {
    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        return Ok(if trimmed.contains(',') {
            b','
        } else if trimmed.contains('\t') {
            b'\t'
        } else {
            b' '
        });
    }
    Ok(b' ')
}
