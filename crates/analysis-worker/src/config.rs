//! Configuration file loading for the analysis worker.
//!
//! The worker reads `worker.toml` (or the path given on the command line).
//! Every field has a default, so an absent file yields a working setup that
//! only consults the evaluation store before calling Stockfish.

use analysis_queue::filter::{MaxPliesFilter, PopularityFilter};
use analysis_queue::memory::EvaluationCache;
use analysis_queue::{EvaluationSource, InterestFilter};
use analysis_store::{DbPool, SqliteStore, StoredEvaluations};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur when loading or applying configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    ///
    /// Unknown source or filter kinds end up here.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// A seed source could not be loaded.
    #[error("Failed to load seed source {path}: {source:#}")]
    Seed {
        path: PathBuf,
        source: anyhow::Error,
    },
    /// The engine section is unusable.
    #[error("Invalid engine configuration: {0}")]
    InvalidEngine(String),
    /// The orchestrator rejected the assembled collaborators.
    #[error("Invalid orchestrator configuration: {0}")]
    Build(#[from] analysis_queue::ConfigError),
}

/// Stockfish settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    /// Path to the Stockfish executable.
    /// Defaults to "stockfish" (assumes it's in PATH).
    #[serde(default = "default_stockfish_path")]
    pub stockfish_path: String,
    /// Maximum number of concurrent analyses. Defaults to 2.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Depth searched even when a queued item asks for less. Defaults to 18.
    #[serde(default = "default_min_depth")]
    pub min_depth: u32,
}

fn default_stockfish_path() -> String {
    "stockfish".to_string()
}

fn default_pool_size() -> usize {
    2
}

fn default_min_depth() -> u32 {
    18
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stockfish_path: default_stockfish_path(),
            pool_size: default_pool_size(),
            min_depth: default_min_depth(),
        }
    }
}

/// Interest filter selection.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FilterConfig {
    /// Drop lines longer than `max_plies`.
    MaxPlies { max_plies: usize },
    /// Keep lines reached by at least `min_games` games; lines missing from
    /// `games` wait until they are known.
    Popularity {
        min_games: u64,
        #[serde(default)]
        games: HashMap<String, u64>,
    },
}

/// One entry of the ordered `[[sources]]` list.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceConfig {
    /// Evaluations previously committed to the database.
    Store,
    /// Evaluations loaded from a JSON file at startup.
    Seed {
        path: PathBuf,
        #[serde(default)]
        name: Option<String>,
    },
}

/// Main worker configuration structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkerConfig {
    /// Path to the SQLite database holding the queue and the evaluations.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Delay between two passes in milliseconds. Defaults to 5000.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Optional interest filter. Without one every position is analyzed.
    #[serde(default)]
    pub filter: Option<FilterConfig>,
    /// Evaluation sources, highest priority first.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

fn default_database() -> PathBuf {
    PathBuf::from("data/analysis.db")
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_sources() -> Vec<SourceConfig> {
    vec![SourceConfig::Store]
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            poll_interval_ms: default_poll_interval_ms(),
            engine: EngineConfig::default(),
            filter: None,
            sources: default_sources(),
        }
    }
}

impl WorkerConfig {
    /// Loads the configuration from `path`.
    ///
    /// Returns the default configuration if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
    /// or [`ConfigError::ParseError`] if the file contains invalid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.pool_size == 0 {
            return Err(ConfigError::InvalidEngine(
                "pool_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Instantiates the configured sources, in priority order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Seed`] if a seed file cannot be loaded.
    pub fn build_sources(&self, db: &DbPool) -> Result<Vec<Arc<dyn EvaluationSource>>, ConfigError> {
        self.sources
            .iter()
            .map(|source| -> Result<Arc<dyn EvaluationSource>, ConfigError> {
                match source {
                    SourceConfig::Store => Ok(Arc::new(StoredEvaluations::new(SqliteStore::new(
                        db.clone(),
                    )))),
                    SourceConfig::Seed { path, name } => {
                        let name = name.clone().unwrap_or_else(|| "seed".to_string());
                        let cache = EvaluationCache::from_json_file(name, path).map_err(|source| {
                            ConfigError::Seed {
                                path: path.clone(),
                                source,
                            }
                        })?;
                        Ok(Arc::new(cache))
                    }
                }
            })
            .collect()
    }

    /// Instantiates the configured interest filter, if any.
    pub fn build_filter(&self) -> Option<Arc<dyn InterestFilter>> {
        self.filter.as_ref().map(|filter| -> Arc<dyn InterestFilter> {
            match filter {
                FilterConfig::MaxPlies { max_plies } => Arc::new(MaxPliesFilter::new(*max_plies)),
                FilterConfig::Popularity { min_games, games } => {
                    Arc::new(PopularityFilter::with_counts(*min_games, games.clone()))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_queue::Interest;
    use std::io::Write;

    #[test]
    fn test_empty_config_defaults() {
        let config: WorkerConfig = toml::from_str("").unwrap();

        assert_eq!(config.database, PathBuf::from("data/analysis.db"));
        assert_eq!(config.poll_interval_ms, 5000);
        assert_eq!(config.engine.stockfish_path, "stockfish");
        assert_eq!(config.engine.pool_size, 2);
        assert_eq!(config.engine.min_depth, 18);
        assert!(config.filter.is_none());
        assert_eq!(config.sources, vec![SourceConfig::Store]);
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
database = "/var/lib/analysis.db"
poll_interval_ms = 250

[engine]
stockfish_path = "/opt/stockfish/stockfish"
pool_size = 4
min_depth = 24

[filter]
kind = "popularity"
min_games = 100

[filter.games]
"e4 e5" = 500
"h4 h5" = 2

[[sources]]
kind = "seed"
path = "data/seed.json"
name = "cloud"

[[sources]]
kind = "store"
"#;

        let config: WorkerConfig = toml::from_str(toml_content).unwrap();

        assert_eq!(config.database, PathBuf::from("/var/lib/analysis.db"));
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.engine.stockfish_path, "/opt/stockfish/stockfish");
        assert_eq!(config.engine.pool_size, 4);
        assert_eq!(config.engine.min_depth, 24);

        match config.filter {
            Some(FilterConfig::Popularity { min_games, ref games }) => {
                assert_eq!(min_games, 100);
                assert_eq!(games.get("e4 e5"), Some(&500));
            }
            ref other => panic!("Expected popularity filter, got {:?}", other),
        }

        assert_eq!(
            config.sources,
            vec![
                SourceConfig::Seed {
                    path: PathBuf::from("data/seed.json"),
                    name: Some("cloud".to_string()),
                },
                SourceConfig::Store,
            ]
        );
    }

    #[test]
    fn test_engine_section_partial_defaults() {
        let config: WorkerConfig = toml::from_str("[engine]\npool_size = 1\n").unwrap();
        assert_eq!(config.engine.pool_size, 1);
        assert_eq!(config.engine.stockfish_path, "stockfish");
        assert_eq!(config.engine.min_depth, 18);
    }

    #[test]
    fn test_unknown_source_kind_is_rejected() {
        let result: Result<WorkerConfig, _> = toml::from_str("[[sources]]\nkind = \"lichess\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_filter_kind_is_rejected() {
        let result: Result<WorkerConfig, _> = toml::from_str("[filter]\nkind = \"vibes\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let config = WorkerConfig::load(Path::new("/nonexistent/worker.toml")).unwrap();
        assert_eq!(config.poll_interval_ms, 5000);
    }

    #[test]
    fn test_load_rejects_empty_pool() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\npool_size = 0").unwrap();

        let result = WorkerConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::InvalidEngine(_))));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_ms = \"soon\"").unwrap();

        let result = WorkerConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_build_sources_in_order() {
        let mut seed = tempfile::NamedTempFile::new().unwrap();
        write!(seed, r#"[{{"fen": "a", "bestMove": "e4", "depth": 20, "score": 0.3}}]"#).unwrap();

        let config = WorkerConfig {
            sources: vec![
                SourceConfig::Seed {
                    path: seed.path().to_path_buf(),
                    name: None,
                },
                SourceConfig::Store,
            ],
            ..WorkerConfig::default()
        };
        let db = analysis_store::init_db(":memory:").unwrap();

        let sources = config.build_sources(&db).unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["seed", "store"]);
    }

    #[test]
    fn test_build_sources_missing_seed_file() {
        let config = WorkerConfig {
            sources: vec![SourceConfig::Seed {
                path: PathBuf::from("/nonexistent/seed.json"),
                name: None,
            }],
            ..WorkerConfig::default()
        };
        let db = analysis_store::init_db(":memory:").unwrap();

        let result = config.build_sources(&db);
        assert!(matches!(result, Err(ConfigError::Seed { .. })));
    }

    #[test]
    fn test_build_filter() {
        let config = WorkerConfig {
            filter: Some(FilterConfig::MaxPlies { max_plies: 1 }),
            ..WorkerConfig::default()
        };
        let filter = config.build_filter().unwrap();
        assert_eq!(filter.classify(&["e4".to_string()]), Interest::Interesting);
        assert_eq!(
            filter.classify(&["e4".to_string(), "e5".to_string()]),
            Interest::NotInteresting
        );

        assert!(WorkerConfig::default().build_filter().is_none());
    }
}
