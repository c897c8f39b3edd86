use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::graph::format::{DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE};
use crate::types::{GraphError, Result};

/// Resolved engine settings.
///
/// `page_size` and `stripe_pages` describe the layout used when graph files
/// are written; an engine always takes the layout from the graph header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads in the compute pool.
    pub threads: usize,
    /// Number of vertex index partitions.
    pub numa_nodes: usize,
    pub page_size: u32,
    /// Page cache capacity in pages.
    pub cache_pages: usize,
    pub stripe_pages: u32,
    /// Where the profile JSON is written after every run, if anywhere.
    pub profile_path: Option<PathBuf>,
    /// Log page cache statistics after every run.
    pub print_io_stats: bool,
    /// Abort a run that has not quiesced after this many supersteps.
    pub max_supersteps: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            numa_nodes: 1,
            page_size: DEFAULT_PAGE_SIZE,
            cache_pages: 16 * 1024,
            stripe_pages: 16,
            profile_path: None,
            print_io_stats: false,
            max_supersteps: None,
        }
    }
}

impl EngineConfig {
    /// Loads a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|err| {
            GraphError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        toml::from_str(&contents).map_err(|err| {
            GraphError::Config(format!("failed to parse {}: {err}", path.display()))
        })
    }

    /// Loads `explicit`, or the default path when none is given.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match explicit.map(Path::to_path_buf).or_else(default_config_path) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Applies a comma separated list of `key=value` pairs.
    pub fn apply_overrides(&mut self, spec: &str) -> Result<()> {
        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| GraphError::Config(format!("expected key=value, got '{pair}'")))?;
            let (key, value) = (key.trim(), value.trim());
            match key {
                "threads" => self.threads = parse_value(key, value)?,
                "numa_nodes" => self.numa_nodes = parse_value(key, value)?,
                "page_size" => self.page_size = parse_value(key, value)?,
                "cache_pages" => self.cache_pages = parse_value(key, value)?,
                "stripe_pages" => self.stripe_pages = parse_value(key, value)?,
                "profile_path" => self.profile_path = Some(PathBuf::from(value)),
                "print_io_stats" => self.print_io_stats = parse_value(key, value)?,
                "max_supersteps" => self.max_supersteps = Some(parse_value(key, value)?),
                other => return Err(GraphError::Config(format!("unknown option '{other}'"))),
            }
        }
        Ok(())
    }

    /// Rejects settings no engine can start with.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(GraphError::Config("threads must be at least 1".into()));
        }
        if self.numa_nodes == 0 {
            return Err(GraphError::Config("numa_nodes must be at least 1".into()));
        }
        if self.numa_nodes > self.threads {
            return Err(GraphError::Config(format!(
                "numa_nodes ({}) exceeds threads ({})",
                self.numa_nodes, self.threads
            )));
        }
        if self.page_size < MIN_PAGE_SIZE || !self.page_size.is_power_of_two() {
            return Err(GraphError::Config(format!(
                "page_size {} is not a power of two >= {MIN_PAGE_SIZE}",
                self.page_size
            )));
        }
        if self.cache_pages == 0 {
            return Err(GraphError::Config("cache_pages must be at least 1".into()));
        }
        if self.stripe_pages == 0 {
            return Err(GraphError::Config("stripe_pages must be at least 1".into()));
        }
        if self.max_supersteps == Some(0) {
            return Err(GraphError::Config("max_supersteps must be at least 1".into()));
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| GraphError::Config(format!("invalid value '{value}' for {key}")))
}

/// `<config dir>/pagegraph/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("pagegraph").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn overrides_apply_on_top_of_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "threads = 6\nnuma_nodes = 2\nprint_io_stats = true\n").unwrap();
        let mut config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.threads, 6);
        assert!(config.print_io_stats);

        config
            .apply_overrides("threads=8, cache_pages=256,max_supersteps=40")
            .unwrap();
        assert_eq!(config.threads, 8);
        assert_eq!(config.numa_nodes, 2);
        assert_eq!(config.cache_pages, 256);
        assert_eq!(config.max_supersteps, Some(40));
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_counts() {
        let config = EngineConfig {
            threads: 2,
            numa_nodes: 4,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(GraphError::Config(_))));

        let config = EngineConfig {
            page_size: 1000,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_or_malformed_overrides_fail() {
        let mut config = EngineConfig::default();
        assert!(config.apply_overrides("bogus=1").is_err());
        assert!(config.apply_overrides("threads").is_err());
        assert!(config.apply_overrides("threads=many").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
