// src/config.rs

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration for a single training run.
/// Created once before `train::run` is invoked and immutable afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainConfig {
    pub session: SessionConfig,
    pub db: DbConfig,
    pub data: DataConfig,
    pub kmeans: KMeansConfig,
    pub save_to: PathBuf,
}

/// Compute session sizing. The driver values size the async runtime,
/// the executor values are capacity hints checked against the host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionConfig {
    pub app_name: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_cores")]
    pub driver_cores: usize,
    #[serde(default = "default_cores")]
    pub executor_cores: usize,
    #[serde(default = "default_memory_mb")]
    pub driver_memory_mb: u64,
    #[serde(default = "default_memory_mb")]
    pub executor_memory_mb: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub dbname: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub input_table: String,
    pub output_table: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// Preprocessing options consumed by `preprocess::Preprocessor`.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    pub feature_columns: Vec<String>,
    #[serde(default = "default_true")]
    pub standardize: bool,
    #[serde(default = "default_true")]
    pub drop_incomplete: bool,
}

/// Enumerated KMeans hyperparameters, validated at load time.
#[derive(Debug, Clone, Deserialize)]
pub struct KMeansConfig {
    pub k: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_max_iter")]
    pub max_iter: u64,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_mode() -> String {
    "local".to_string()
}

fn default_cores() -> usize {
    num_cpus::get()
}

fn default_memory_mb() -> u64 {
    1024
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_pool_size() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_seed() -> u64 {
    42
}

fn default_max_iter() -> u64 {
    300
}

fn default_tolerance() -> f64 {
    1e-4
}

impl TrainConfig {
    /// Loads and validates the configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!(
            "Loaded training config: app={}, input={}, output={}, k={}",
            config.session.app_name, config.db.input_table, config.db.output_table, config.kmeans.k
        );
        Ok(config)
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let mut config: TrainConfig =
            serde_json::from_str(raw).context("Invalid training config JSON")?;
        config.db.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.db.validate()?;
        self.data.validate()?;
        self.kmeans.validate()?;
        if self.save_to.as_os_str().is_empty() {
            bail!("save_to must not be empty");
        }
        Ok(())
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            bail!("session.app_name must not be empty");
        }
        if self.driver_cores == 0 || self.executor_cores == 0 {
            bail!("session core counts must be at least 1");
        }
        if self.driver_memory_mb == 0 || self.executor_memory_mb == 0 {
            bail!("session memory sizing must be at least 1 MB");
        }
        Ok(())
    }
}

impl DbConfig {
    /// Environment variables win over the config file for credentials, so
    /// passwords can stay out of checked-in configs.
    fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var("POSTGRES_PASSWORD") {
            if !password.is_empty() {
                debug!("Using POSTGRES_PASSWORD from environment");
                self.password = password;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dbname.trim().is_empty() || self.user.trim().is_empty() {
            bail!("db.dbname and db.user must not be empty");
        }
        if self.pool_size == 0 {
            bail!("db.pool_size must be at least 1");
        }
        for table in [&self.input_table, &self.output_table] {
            if !is_sql_identifier(table) {
                bail!("'{}' is not a valid table identifier", table);
            }
        }
        Ok(())
    }
}

impl DataConfig {
    pub fn validate(&self) -> Result<()> {
        if self.feature_columns.is_empty() {
            bail!("data.feature_columns must name at least one column");
        }
        for column in &self.feature_columns {
            if !is_sql_identifier(column) {
                bail!("'{}' is not a valid column identifier", column);
            }
        }
        Ok(())
    }
}

impl KMeansConfig {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            bail!("kmeans.k must be at least 1");
        }
        if self.max_iter == 0 {
            bail!("kmeans.max_iter must be at least 1");
        }
        if !(self.tolerance > 0.0) {
            bail!("kmeans.tolerance must be positive");
        }
        Ok(())
    }
}

/// Table and column names are interpolated into SQL, so they are
/// restricted to plain identifiers (optionally schema-qualified).
pub fn is_sql_identifier(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    name.split('.').all(|part| {
        !part.is_empty()
            && part
                .chars()
                .next()
                .map(|c| c.is_ascii_alphabetic() || c == '_')
                .unwrap_or(false)
            && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Loads environment variables from a .env file. Missing files are not
/// an error; already-set variables are never overwritten.
pub fn load_env_from_file(file_path: &str) -> Result<()> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    match File::open(file_path) {
        Ok(file) => {
            let reader = BufReader::new(file);
            for line in reader.lines() {
                let line = line.context("Failed to read line from env file")?;
                if line.starts_with('#') || line.trim().is_empty() {
                    continue;
                }
                if let Some(idx) = line.find('=') {
                    let key = line[..idx].trim();
                    let value = line[idx + 1..].trim().trim_matches('"');
                    if std::env::var(key).is_err() {
                        std::env::set_var(key, value);
                        debug!(
                            "Set env var from file: {} = {}",
                            key,
                            if key == "POSTGRES_PASSWORD" {
                                "[hidden]"
                            } else {
                                value
                            }
                        );
                    }
                }
            }
            info!("Successfully processed env file: {}", file_path);
        }
        Err(e) => {
            warn!(
                "Could not open env file '{}': {}. Proceeding with system environment variables.",
                file_path, e
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> String {
        r#"{
            "session": { "app_name": "segmenter-test" },
            "db": {
                "dbname": "analytics",
                "user": "trainer",
                "input_table": "public.customer_metrics",
                "output_table": "public.customer_segments"
            },
            "data": { "feature_columns": ["recency", "frequency", "monetary"] },
            "kmeans": { "k": 4, "seed": 1 },
            "save_to": "models/kmeans"
        }"#
        .to_string()
    }

    #[test]
    fn test_parse_with_defaults() {
        let config = TrainConfig::from_json(&sample_json()).unwrap();
        assert_eq!(config.session.mode, "local");
        assert!(config.session.driver_cores >= 1);
        assert_eq!(config.db.host, "127.0.0.1");
        assert_eq!(config.db.port, 5432);
        assert_eq!(config.db.pool_size, 10);
        assert!(config.data.standardize);
        assert!(config.data.drop_incomplete);
        assert_eq!(config.kmeans.k, 4);
        assert_eq!(config.kmeans.seed, 1);
        assert_eq!(config.kmeans.max_iter, 300);
        assert_eq!(config.kmeans.tolerance, 1e-4);
    }

    #[test]
    fn test_rejects_zero_clusters() {
        let raw = sample_json().replace("\"k\": 4", "\"k\": 0");
        assert!(TrainConfig::from_json(&raw).is_err());
    }

    #[test]
    fn test_rejects_empty_feature_columns() {
        let raw = sample_json().replace(
            "[\"recency\", \"frequency\", \"monetary\"]",
            "[]",
        );
        assert!(TrainConfig::from_json(&raw).is_err());
    }

    #[test]
    fn test_rejects_suspicious_table_name() {
        let raw = sample_json().replace("public.customer_segments", "segments; DROP TABLE x");
        assert!(TrainConfig::from_json(&raw).is_err());
    }

    #[test]
    fn test_identifier_check() {
        assert!(is_sql_identifier("customer_metrics"));
        assert!(is_sql_identifier("public.customer_metrics"));
        assert!(is_sql_identifier("_private"));
        assert!(!is_sql_identifier("1table"));
        assert!(!is_sql_identifier("bad name"));
        assert!(!is_sql_identifier(""));
        assert!(!is_sql_identifier("a..b"));
    }
}
