// ABOUTME: Configuration management for docpipe application
// ABOUTME: Handles loading and merging configuration from files and environment variables

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::ExecutionMode;
use crate::queue::{CloudTasksConfig, RateLimits, RetryPolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub queues: QueueConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub executors: ExecutorsConfig,

    #[serde(default)]
    pub callbacks: CallbacksConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Physical queue the `DEFAULT` pseudo-queue resolves to
    #[serde(default = "default_queue_name")]
    pub default_queue: String,
    #[serde(default)]
    pub business_unit: Option<String>,
    #[serde(default)]
    pub solution_code: Option<String>,
    #[serde(default)]
    pub rate_limits: RateLimits,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub cloud_tasks: Option<CloudTasksConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_pipelines_dir")]
    pub pipelines_dir: PathBuf,
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub cache_ttl: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_audit_dir")]
    pub root_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorsConfig {
    pub module_url: Option<String>,
    pub prompt_url: Option<String>,
    pub pipeline_url: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbacksConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

fn default_queue_name() -> String {
    "docpipe-default".to_string()
}

fn default_pipelines_dir() -> PathBuf {
    PathBuf::from("pipelines")
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(60)
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("audit")
}

fn default_true() -> bool {
    true
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_queue: default_queue_name(),
            business_unit: None,
            solution_code: None,
            rate_limits: RateLimits::default(),
            retry: RetryPolicy::default(),
            cloud_tasks: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pipelines_dir: default_pipelines_dir(),
            cache_ttl: default_cache_ttl(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root_dir: default_audit_dir(),
        }
    }
}

impl Default for CallbacksConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
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
            let contents = std::fs::read_to_string(&config_path)?;
            serde_yaml::from_str(&contents)?
        } else {
            Config::default()
        };

        config.merge_env()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> PathBuf {
        let possible_paths = vec![
            PathBuf::from("docpipe.yaml"),
            PathBuf::from("docpipe.yml"),
            PathBuf::from(".docpipe.yaml"),
            PathBuf::from(".docpipe.yml"),
        ];

        for path in possible_paths {
            if path.exists() {
                return path;
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".docpipe").join("config.yaml");
            if home_config.exists() {
                return home_config;
            }
        }

        // Return default path (may not exist)
        PathBuf::from("docpipe.yaml")
    }

    /// Merge environment variables into configuration
    pub fn merge_env(&mut self) -> Result<()> {
        self.merge_env_from(|name| std::env::var(name).ok())
    }

    pub fn merge_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("DOCPIPE_EXECUTION_MODE") {
            self.execution.mode = mode.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        }

        // Queue configuration
        if let Some(queue) = lookup("DOCPIPE_DEFAULT_QUEUE") {
            self.queues.default_queue = queue;
        }
        if let Some(unit) = lookup("DOCPIPE_BUSINESS_UNIT") {
            self.queues.business_unit = Some(unit);
        }
        if let Some(code) = lookup("DOCPIPE_SOLUTION_CODE") {
            self.queues.solution_code = Some(code);
        }

        // Store and audit
        if let Some(dir) = lookup("DOCPIPE_PIPELINES_DIR") {
            self.store.pipelines_dir = PathBuf::from(dir);
        }
        if let Some(ttl) = lookup("DOCPIPE_CACHE_TTL") {
            self.store.cache_ttl = humantime::parse_duration(&ttl)?;
        }
        if let Some(dir) = lookup("DOCPIPE_AUDIT_DIR") {
            self.audit.enabled = true;
            self.audit.root_dir = PathBuf::from(dir);
        }

        // Executors
        if let Some(url) = lookup("DOCPIPE_MODULE_URL") {
            self.executors.module_url = Some(url);
        }
        if let Some(url) = lookup("DOCPIPE_PROMPT_URL") {
            self.executors.prompt_url = Some(url);
        }
        if let Some(url) = lookup("DOCPIPE_PIPELINE_URL") {
            self.executors.pipeline_url = Some(url);
        }

        // Logging configuration
        if let Some(level) = lookup("DOCPIPE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("DOCPIPE_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }
}
