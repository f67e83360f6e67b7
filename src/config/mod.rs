mod file_config;

pub use file_config::{FileConfig, JobQueueConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub media_workers: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub job_queue: JobQueueSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobQueueSettings {
    /// Size of the attachment download worker pool.
    pub media_workers: usize,
    pub retry_base_interval_ms: u64,
    pub max_backoff_factor: u64,
    /// How long shutdown waits for running job bodies.
    pub shutdown_timeout_secs: u64,
}

impl Default for JobQueueSettings {
    fn default() -> Self {
        Self {
            media_workers: 4,
            retry_base_interval_ms: 250,
            max_backoff_factor: 600,
            shutdown_timeout_secs: 30,
        }
    }
}

impl JobQueueSettings {
    pub fn validate(&self) -> Result<()> {
        if self.media_workers == 0 {
            bail!("job_queue.media_workers must be at least 1");
        }
        if self.max_backoff_factor == 0 {
            bail!("job_queue.max_backoff_factor must be at least 1");
        }
        Ok(())
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db or in config file")
            })?;
        if db_path.is_dir() {
            bail!("db_path points to a directory: {:?}", db_path);
        }

        let defaults = JobQueueSettings::default();
        let jq_file = file.job_queue.unwrap_or_default();
        let job_queue = JobQueueSettings {
            media_workers: jq_file
                .media_workers
                .or(cli.media_workers)
                .unwrap_or(defaults.media_workers),
            retry_base_interval_ms: jq_file
                .retry_base_interval_ms
                .unwrap_or(defaults.retry_base_interval_ms),
            max_backoff_factor: jq_file
                .max_backoff_factor
                .unwrap_or(defaults.max_backoff_factor),
            shutdown_timeout_secs: jq_file
                .shutdown_timeout_secs
                .unwrap_or(defaults.shutdown_timeout_secs),
        };
        job_queue.validate()?;

        Ok(Self { db_path, job_queue })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_cli_only() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/tmp/jobs.db")),
            media_workers: Some(6),
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/jobs.db"));
        assert_eq!(config.job_queue.media_workers, 6);
        assert_eq!(config.job_queue.retry_base_interval_ms, 250);
        assert_eq!(config.job_queue.max_backoff_factor, 600);
        assert_eq!(config.job_queue.shutdown_timeout_secs, 30);
    }

    #[test]
    fn test_toml_overrides_cli() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/tmp/cli.db")),
            media_workers: Some(6),
        };
        let file = FileConfig {
            db_path: Some("/tmp/file.db".to_string()),
            job_queue: Some(JobQueueConfig {
                media_workers: Some(2),
                retry_base_interval_ms: Some(10),
                ..Default::default()
            }),
        };

        let config = AppConfig::resolve(&cli, Some(file)).unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/file.db"));
        assert_eq!(config.job_queue.media_workers, 2);
        assert_eq!(config.job_queue.retry_base_interval_ms, 10);
        assert_eq!(config.job_queue.max_backoff_factor, 600);
    }

    #[test]
    fn test_missing_db_path_fails() {
        let err = AppConfig::resolve(&CliConfig::default(), None).unwrap_err();
        assert!(err.to_string().contains("db_path must be specified"));
    }

    #[test]
    fn test_db_path_must_not_be_a_directory() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: Some(temp_dir.path().to_path_buf()),
            media_workers: None,
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/tmp/jobs.db")),
            media_workers: Some(0),
        };
        let err = AppConfig::resolve(&cli, None).unwrap_err();
        assert!(err.to_string().contains("media_workers"));
    }
}
