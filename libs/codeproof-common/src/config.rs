use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    pub execution_timeout_ms: u64,
    pub max_rounds: u32,
    pub sandbox_memory_mb: u64,
    pub sandbox_nano_cpus: i64,
    /// Parent directory for staging areas; system temp dir when unset
    pub staging_dir: Option<PathBuf>,
    pub generation_api_base: String,
    pub generation_api_key: String,
    pub generation_model: String,
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            execution_timeout_ms: parsed("EXECUTION_TIMEOUT_MS", 30_000),
            max_rounds: parsed("MAX_ROUNDS", 4u32).max(1),
            sandbox_memory_mb: parsed("SANDBOX_MEMORY_MB", 512),
            sandbox_nano_cpus: parsed("SANDBOX_NANO_CPUS", 1_000_000_000),
            staging_dir: env::var("STAGING_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            generation_api_base: env::var("GENERATION_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            generation_api_key: env::var("GENERATION_API_KEY").unwrap_or_default(),
            generation_model: env::var("GENERATION_MODEL")
                .unwrap_or_else(|_| "gpt-4o".to_string()),
        }
    }

    pub fn new() -> Self {
        Self::from_env()
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.execution_timeout_ms, 30_000);
        assert_eq!(config.max_rounds, 4);
        assert_eq!(config.execution_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_max_rounds_floor() {
        let config = Config::default().with_max_rounds(0);
        assert_eq!(config.max_rounds, 1);
    }
}
