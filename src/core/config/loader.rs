#![allow(clippy::result_large_err)]

use super::{ConverterConfig, StorageBackend, UnknownStepPolicy};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::Path;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "pipeline-convert.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from an explicit file, or from `pipeline-convert.toml` in
    /// `workdir` when present. Environment variables override file values.
    pub fn load(explicit: Option<&Path>, workdir: &Path) -> Result<ConverterConfig, AppError> {
        let config_file = match explicit {
            Some(path) => Some(Self::load_from_file(path)?.ok_or_else(|| {
                AppError::new(
                    ErrorCategory::IoError,
                    format!("Config file {} does not exist", path.display()),
                )
                .with_code("CONV-CFG-002")
            })?),
            None => Self::load_from_file(&workdir.join(DEFAULT_CONFIG_FILE))?,
        };

        let mut config = config_file.unwrap_or_default();
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<ConverterConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
            .with_code("CONV-CFG-002")
        })?;

        let config: ConverterConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("CONV-CFG-001")
        })?;

        tracing::debug!(path = %path.display(), "loaded converter config");
        Ok(Some(config))
    }

    /// Environment variables take precedence over config file values.
    /// Unparseable values are ignored.
    fn apply_env_overrides(config: &mut ConverterConfig) {
        if let Ok(backend) = env::var("PIPELINE_CONVERT_BACKEND") {
            match backend.parse::<StorageBackend>() {
                Ok(kind) => config.backend.kind = kind,
                Err(err) => tracing::warn!("ignoring PIPELINE_CONVERT_BACKEND: {}", err),
            }
        }

        if let Ok(bucket) = env::var("PIPELINE_CONVERT_BUCKET") {
            config.backend.bucket = Some(bucket);
        }

        if let Ok(region) = env::var("PIPELINE_CONVERT_REGION") {
            config.backend.region = Some(region);
        }

        if let Ok(access_key_ref) = env::var("PIPELINE_CONVERT_ACCESS_KEY_REF") {
            config.backend.access_key_ref = Some(access_key_ref);
        }

        if let Ok(secret_key_ref) = env::var("PIPELINE_CONVERT_SECRET_KEY_REF") {
            config.backend.secret_key_ref = Some(secret_key_ref);
        }

        if let Ok(policy) = env::var("PIPELINE_CONVERT_UNKNOWN_STEPS") {
            match policy.parse::<UnknownStepPolicy>() {
                Ok(policy) => config.unknown_steps = policy,
                Err(err) => tracing::warn!("ignoring PIPELINE_CONVERT_UNKNOWN_STEPS: {}", err),
            }
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "PIPELINE_CONVERT_BACKEND - Storage backend for cache and artifacts (s3/gcs, default: s3)",
            "PIPELINE_CONVERT_BUCKET - Bucket name (default: replace-bucket)",
            "PIPELINE_CONVERT_REGION - Bucket region, s3 only (default: replace-region)",
            "PIPELINE_CONVERT_ACCESS_KEY_REF - Secret holding the access key",
            "PIPELINE_CONVERT_SECRET_KEY_REF - Secret holding the secret key",
            "PIPELINE_CONVERT_UNKNOWN_STEPS - Unknown step handling (placeholder/drop, default: placeholder)",
        ]
    }
}
