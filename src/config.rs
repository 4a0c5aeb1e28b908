use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::JobSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub metaserv: MetaservConfig,
    pub jobs: JobsConfig,
    pub engine: EngineConfig,
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaservConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Directory holding one subdirectory of artifacts per job.
    pub base_path: PathBuf,
    pub max_concurrent: usize,
    pub result_timeout_secs: u64,
    /// 0 keeps finished jobs forever.
    pub retention_secs: u64,
    /// Rows per engine fetch and per mirror commit.
    pub fetch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Scheme of connection URIs built from instance identifiers.
    pub scheme: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// JSON file with `[{server, port, username, password}]` entries.
    pub password_store: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let default_base_path = env::temp_dir().join(format!("dax-{}", uuid::Uuid::new_v4()));

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("metaserv.url", "mysql://localhost:3306/metaserv")?
            .set_default("jobs.base_path", default_base_path.to_string_lossy().to_string())?
            .set_default("jobs.max_concurrent", (num_cpus::get() * 2) as u64)?
            .set_default("jobs.result_timeout_secs", 600)?
            .set_default("jobs.retention_secs", 0)?
            .set_default("jobs.fetch_size", 50_000)?
            .set_default("engine.scheme", "mysql")?
            .set_default("credentials.password_store", None::<String>)?;

        for (var, key) in [
            ("HOST", "server.host"),
            ("METASERV_URL", "metaserv.url"),
            ("DAX_BASE_PATH", "jobs.base_path"),
            ("DAX_ENGINE_SCHEME", "engine.scheme"),
            ("DAX_PASSWORD_STORE", "credentials.password_store"),
        ] {
            if let Ok(value) = env::var(var) {
                builder = builder.set_override(key, value)?;
            }
        }

        for (var, key) in [
            ("PORT", "server.port"),
            ("DAX_MAX_CONCURRENT_JOBS", "jobs.max_concurrent"),
            ("DAX_RESULT_TIMEOUT_SECS", "jobs.result_timeout_secs"),
            ("DAX_JOB_RETENTION_SECS", "jobs.retention_secs"),
            ("DAX_FETCH_SIZE", "jobs.fetch_size"),
        ] {
            if let Ok(value) = env::var(var) {
                let parsed = value.parse::<u64>().map_err(|e| {
                    config::ConfigError::Message(format!("{} must be a number: {}", var, e))
                })?;
                builder = builder.set_override(key, parsed)?;
            }
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            max_concurrent: self.jobs.max_concurrent,
            result_timeout: Duration::from_secs(self.jobs.result_timeout_secs),
            retention: match self.jobs.retention_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        // Clear environment variables for this test
        for var in [
            "HOST",
            "PORT",
            "DAX_BASE_PATH",
            "DAX_JOB_RETENTION_SECS",
            "DAX_MAX_CONCURRENT_JOBS",
        ] {
            env::remove_var(var);
        }

        let config = Config::from_env();
        assert!(config.is_ok());

        let config = config.unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.jobs.fetch_size, 50_000);
        assert_eq!(config.jobs.max_concurrent, num_cpus::get() * 2);
        assert!(config.jobs.base_path.starts_with(env::temp_dir()));

        let settings = config.job_settings();
        assert_eq!(settings.result_timeout, Duration::from_secs(600));
        assert!(settings.retention.is_none());
    }

    #[test]
    fn test_retention_setting() {
        let mut config = Config::from_env().unwrap();
        config.jobs.retention_secs = 3600;
        assert_eq!(config.job_settings().retention, Some(Duration::from_secs(3600)));
    }
}
