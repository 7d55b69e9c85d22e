#![allow(clippy::result_large_err)]

use super::{ConverterConfig, StorageBackend};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules
    pub fn validate(config: &ConverterConfig) -> Result<(), AppError> {
        if config.max_identifier_attempts == 0 {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "max_identifier_attempts must be at least 1",
            )
            .with_code("CONV-CFG-003"));
        }

        if config.backend.kind != StorageBackend::S3 && config.backend.region.is_some() {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "backend.region is only supported with s3, not {}",
                    config.backend.kind
                ),
            )
            .with_code("CONV-CFG-004")
            .with_suggestion("Remove the region or switch the backend to s3"));
        }

        let blank = |value: &Option<String>| value.as_deref().is_some_and(|v| v.trim().is_empty());
        for (field, value) in [
            ("backend.bucket", &config.backend.bucket),
            ("backend.region", &config.backend.region),
            ("backend.access_key_ref", &config.backend.access_key_ref),
            ("backend.secret_key_ref", &config.backend.secret_key_ref),
        ] {
            if blank(value) {
                return Err(AppError::new(
                    ErrorCategory::ValidationError,
                    format!("{} cannot be empty", field),
                )
                .with_code("CONV-CFG-005"));
            }
        }

        Ok(())
    }
}
