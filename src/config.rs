//! Service configuration, read from the environment (and `.env` via dotenv).

use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DATABASE_PATH: &str = "credit_guardian.db";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_ANALYZE_PER_MINUTE: u32 = 30;
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub max_upload_bytes: usize,
    /// Contract analyses allowed per minute across all clients.
    pub analyze_per_minute: u32,
    /// Remote creditor registry feed used by `import_creditors` when no file is given.
    pub registry_url: Option<String>,
    /// Ollama instance used for AI contract review.
    pub ollama_url: String,
    pub ollama_model: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            analyze_per_minute: DEFAULT_ANALYZE_PER_MINUTE,
            registry_url: None,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: env::var("CG_HOST").unwrap_or(defaults.host),
            port: try_load("CG_PORT", defaults.port),
            database_path: env::var("CG_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            max_upload_bytes: try_load("CG_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            analyze_per_minute: try_load("CG_ANALYZE_PER_MINUTE", defaults.analyze_per_minute)
                .max(1),
            registry_url: env::var("CG_REGISTRY_URL").ok().filter(|s| !s.trim().is_empty()),
            ollama_url: env::var("CG_OLLAMA_URL").unwrap_or(defaults.ollama_url),
            ollama_model: env::var("CG_OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert!(config.registry_url.is_none());
        assert_eq!(config.ollama_url, "http://localhost:11434");
        assert_eq!(config.ollama_model, "llama3.2");
    }

    #[test]
    fn test_try_load_falls_back_on_garbage() {
        env::set_var("CG_TEST_GARBAGE_PORT", "not-a-port");
        assert_eq!(try_load("CG_TEST_GARBAGE_PORT", 1234u16), 1234);
        env::remove_var("CG_TEST_GARBAGE_PORT");
    }

    #[test]
    fn test_try_load_parses_value() {
        env::set_var("CG_TEST_LIMIT", " 42 ");
        assert_eq!(try_load("CG_TEST_LIMIT", 7u32), 42);
        env::remove_var("CG_TEST_LIMIT");
    }
}
