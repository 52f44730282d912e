// ABOUTME: Configuration management for taskloom
// ABOUTME: Loads logging and executor settings from YAML files and environment variables

pub mod logging;

pub use logging::{init_logging, LoggingConfig};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::executors::{Executor, ServerlessConfig, KNOWN_EXECUTORS};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Executor bound to every node of a built graph, replacing the registered task's own
    #[serde(default = "default_executor")]
    pub default: String,

    #[serde(default)]
    pub serverless: ServerlessConfig,
}

fn default_executor() -> String {
    "in_process".to_string()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default: default_executor(),
            serverless: ServerlessConfig::default(),
        }
    }
}

impl ExecutorConfig {
    pub fn build_executor(&self) -> Result<Executor> {
        let executor = match self.default.as_str() {
            "serverless" => Executor::serverless(&self.serverless)?,
            other => Executor::from_name(other)?,
        };
        Ok(executor)
    }
}

impl Config {
    /// Load configuration from file path or default locations
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::find_config_file(),
        };

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file {:?}", config_path))?;
            Self::from_yaml(&contents)?
        } else {
            Config::default()
        };

        config.merge_env()?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> PathBuf {
        let possible_paths = [
            PathBuf::from("taskloom.yaml"),
            PathBuf::from("taskloom.yml"),
            PathBuf::from(".taskloom.yaml"),
        ];

        for path in possible_paths {
            if path.exists() {
                return path;
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".taskloom").join("config.yaml");
            if home_config.exists() {
                return home_config;
            }
        }

        // Default path (may not exist)
        PathBuf::from("taskloom.yaml")
    }

    /// Merge environment variables into configuration
    fn merge_env(&mut self) -> Result<()> {
        if let Ok(level) = std::env::var("TASKLOOM_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TASKLOOM_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Ok(executor) = std::env::var("TASKLOOM_EXECUTOR") {
            if !KNOWN_EXECUTORS.contains(&executor.as_str()) {
                anyhow::bail!(
                    "TASKLOOM_EXECUTOR must be one of {:?}, got '{}'",
                    KNOWN_EXECUTORS,
                    executor
                );
            }
            self.executor.default = executor;
        }
        if let Ok(backend) = std::env::var("TASKLOOM_SERVERLESS_BACKEND") {
            self.executor.serverless.backend = backend.parse()?;
        }
        if let Ok(workers) = std::env::var("TASKLOOM_SERVERLESS_WORKERS") {
            self.executor.serverless.workers = workers
                .parse()
                .with_context(|| format!("Invalid TASKLOOM_SERVERLESS_WORKERS '{}'", workers))?;
        }

        Ok(())
    }
}
