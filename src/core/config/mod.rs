use crate::core::convert::identifier::DEFAULT_MAX_ATTEMPTS;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Converter configuration loaded from pipeline-convert.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Storage backend used by cache and artifact steps
    #[serde(default)]
    pub backend: BackendConfig,

    /// What to do with steps no converter handles
    #[serde(default)]
    pub unknown_steps: UnknownStepPolicy,

    /// Collision suffixes tried before an identifier allocation fails
    #[serde(default = "default_max_identifier_attempts")]
    pub max_identifier_attempts: usize,
}

/// Object storage behind cache and artifact plugins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Gcs,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::S3 => "s3",
            StorageBackend::Gcs => "gcs",
        }
    }

    /// Upload plugin image for artifacts on this backend.
    pub fn upload_image(&self) -> &'static str {
        match self {
            StorageBackend::S3 => "plugins/s3",
            StorageBackend::Gcs => "plugins/gcs",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "gcs" => Ok(StorageBackend::Gcs),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

/// Backend configuration; unset fields render as placeholder tokens
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: StorageBackend,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// Only meaningful for s3
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Secret identifier holding the access key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_ref: Option<String>,

    /// Secret identifier holding the secret key (or the gcs json key)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<String>,
}

pub const BUCKET_PLACEHOLDER: &str = "replace-bucket";
pub const REGION_PLACEHOLDER: &str = "replace-region";
pub const ACCESS_KEY_PLACEHOLDER: &str = "replace-access-key";
pub const SECRET_KEY_PLACEHOLDER: &str = "replace-secret-key";

impl BackendConfig {
    pub fn bucket(&self) -> String {
        self.bucket
            .clone()
            .unwrap_or_else(|| BUCKET_PLACEHOLDER.to_string())
    }

    pub fn region(&self) -> String {
        self.region
            .clone()
            .unwrap_or_else(|| REGION_PLACEHOLDER.to_string())
    }

    pub fn access_key(&self) -> String {
        secret_expression(self.access_key_ref.as_deref(), ACCESS_KEY_PLACEHOLDER)
    }

    pub fn secret_key(&self) -> String {
        secret_expression(self.secret_key_ref.as_deref(), SECRET_KEY_PLACEHOLDER)
    }
}

fn secret_expression(reference: Option<&str>, placeholder: &str) -> String {
    match reference {
        Some(reference) => format!("<+secrets.getValue(\"{}\")>", reference),
        None => placeholder.to_string(),
    }
}

/// Handling of steps whose kind has no registered converter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownStepPolicy {
    /// Emit a `template` placeholder node carrying the original payload
    #[default]
    Placeholder,
    /// Omit the node; the diagnostic is still recorded
    Drop,
}

impl std::str::FromStr for UnknownStepPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "placeholder" => Ok(UnknownStepPolicy::Placeholder),
            "drop" => Ok(UnknownStepPolicy::Drop),
            other => Err(format!("unknown step policy '{}'", other)),
        }
    }
}

fn default_max_identifier_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for ConverterConfig {
    fn default() -> Self {
        ConverterConfig {
            backend: BackendConfig::default(),
            unknown_steps: UnknownStepPolicy::default(),
            max_identifier_attempts: default_max_identifier_attempts(),
        }
    }
}


pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;
