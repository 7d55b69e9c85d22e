use crate::core::config::{ConverterConfig, StorageBackend, UnknownStepPolicy};
use clap::{ArgAction, Args};
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    /// Source pipeline file to convert
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Write the converted pipeline here instead of stdout
    #[arg(short, long, value_name = "FILE", help_heading = "Output Options")]
    pub output: Option<PathBuf>,

    /// Exit non-zero when any diagnostic is a warning or worse
    #[arg(long, help_heading = "Output Options")]
    pub strict: bool,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, help_heading = "Output Options")]
    pub verbose: u8,

    /// Path to config file (default: ./pipeline-convert.toml)
    #[arg(long, value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<PathBuf>,

    /// Omit steps no converter handles instead of emitting placeholders
    #[arg(long, help_heading = "Configuration")]
    pub drop_unknown: bool,

    /// Storage backend for cache and artifact steps (s3 or gcs)
    #[arg(long, value_name = "BACKEND", help_heading = "Storage Backend")]
    pub backend: Option<StorageBackend>,

    /// Bucket used by cache and artifact steps
    #[arg(long, value_name = "NAME", help_heading = "Storage Backend")]
    pub bucket: Option<String>,

    /// Bucket region (s3 only)
    #[arg(long, value_name = "REGION", help_heading = "Storage Backend")]
    pub region: Option<String>,

    /// Secret holding the storage access key
    #[arg(long, value_name = "SECRET", help_heading = "Storage Backend")]
    pub access_key_ref: Option<String>,

    /// Secret holding the storage secret key or gcs json key
    #[arg(long, value_name = "SECRET", help_heading = "Storage Backend")]
    pub secret_key_ref: Option<String>,
}

impl ConvertArgs {
    /// Flags take precedence over file and environment values.
    pub fn apply_overrides(&self, config: &mut ConverterConfig) {
        if let Some(backend) = self.backend {
            config.backend.kind = backend;
        }
        if let Some(bucket) = &self.bucket {
            config.backend.bucket = Some(bucket.clone());
        }
        if let Some(region) = &self.region {
            config.backend.region = Some(region.clone());
        }
        if let Some(access_key_ref) = &self.access_key_ref {
            config.backend.access_key_ref = Some(access_key_ref.clone());
        }
        if let Some(secret_key_ref) = &self.secret_key_ref {
            config.backend.secret_key_ref = Some(secret_key_ref.clone());
        }
        if self.drop_unknown {
            config.unknown_steps = UnknownStepPolicy::Drop;
        }
    }
}
