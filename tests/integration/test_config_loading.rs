use pipeline_convert::core::config::loader::DEFAULT_CONFIG_FILE;
use pipeline_convert::core::config::{ConfigLoader, ConverterConfig, StorageBackend, UnknownStepPolicy};
use pipeline_convert::core::convert::Converter;
use pipeline_convert::logging::config::LoggingConfig;
use pipeline_convert::logging::LogFormat;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

fn clear_convert_env() {
    for v in &[
        "PIPELINE_CONVERT_BACKEND",
        "PIPELINE_CONVERT_BUCKET",
        "PIPELINE_CONVERT_REGION",
        "PIPELINE_CONVERT_ACCESS_KEY_REF",
        "PIPELINE_CONVERT_SECRET_KEY_REF",
        "PIPELINE_CONVERT_UNKNOWN_STEPS",
        "PIPELINE_CONVERT_CONSOLE_OUTPUT",
        "PIPELINE_CONVERT_LOG_FORMAT",
    ] {
        env::remove_var(v);
    }
}

const SHARED_CONFIG: &str = r#"
unknown_steps = "drop"
max_identifier_attempts = 50

[backend]
kind = "gcs"
bucket = "team-ci"
secret_key_ref = "gcp_json"

[logging]
default_level = "info"
format = "json"
"#;

/// Converter and logging settings share one file
#[test]
#[serial]
fn test_shared_config_file() {
    clear_convert_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ci.toml");
    fs::write(&path, SHARED_CONFIG).unwrap();

    let config = ConfigLoader::load(Some(&path), temp_dir.path()).unwrap();
    assert_eq!(config.backend.kind, StorageBackend::Gcs);
    assert_eq!(config.backend.bucket.as_deref(), Some("team-ci"));
    assert_eq!(config.unknown_steps, UnknownStepPolicy::Drop);
    assert_eq!(config.max_identifier_attempts, 50);
    assert_eq!(
        config.backend.secret_key(),
        "<+secrets.getValue(\"gcp_json\")>"
    );

    let logging = LoggingConfig::load(Some(&path), 0).unwrap();
    assert_eq!(logging.default_level, "info");
    assert_eq!(logging.format, LogFormat::Json);
}

#[test]
#[serial]
fn test_workdir_file_is_picked_up() {
    clear_convert_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(DEFAULT_CONFIG_FILE),
        "[backend]\nbucket = \"from-workdir\"\n",
    )
    .unwrap();

    let config = ConfigLoader::load(None, temp_dir.path()).unwrap();
    assert_eq!(config.backend.bucket.as_deref(), Some("from-workdir"));
    assert_eq!(config.backend.kind, StorageBackend::S3);
}

#[test]
#[serial]
fn test_env_secret_refs_override_file() {
    clear_convert_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(DEFAULT_CONFIG_FILE),
        "[backend]\naccess_key_ref = \"file_key\"\n",
    )
    .unwrap();

    env::set_var("PIPELINE_CONVERT_ACCESS_KEY_REF", "aws_access");
    env::set_var("PIPELINE_CONVERT_SECRET_KEY_REF", "aws_secret");
    env::set_var("PIPELINE_CONVERT_REGION", "us-east-2");
    let config = ConfigLoader::load(None, temp_dir.path()).unwrap();
    clear_convert_env();

    assert_eq!(config.backend.access_key(), "<+secrets.getValue(\"aws_access\")>");
    assert_eq!(config.backend.secret_key(), "<+secrets.getValue(\"aws_secret\")>");
    assert_eq!(config.backend.region(), "us-east-2");
}

#[test]
#[serial]
fn test_unset_backend_values_render_placeholders() {
    clear_convert_env();
    let temp_dir = TempDir::new().unwrap();
    let config = ConfigLoader::load(None, temp_dir.path()).unwrap();
    assert_eq!(config.backend.bucket(), "replace-bucket");
    assert_eq!(config.backend.access_key(), "replace-access-key");
}

#[test]
#[serial]
fn test_invalid_combination_is_rejected_by_converter() {
    clear_convert_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(DEFAULT_CONFIG_FILE),
        "[backend]\nkind = \"gcs\"\nregion = \"eu-west-1\"\n",
    )
    .unwrap();

    let config = ConfigLoader::load(None, temp_dir.path()).unwrap();
    let err = Converter::new(config).err().unwrap();
    assert_eq!(err.code, "CONV-CFG-004");
    assert!(!err.recovery_suggestions.is_empty());
}

#[test]
fn test_zero_identifier_attempts_is_rejected() {
    let config = ConverterConfig {
        max_identifier_attempts: 0,
        ..ConverterConfig::default()
    };
    let err = Converter::new(config).err().unwrap();
    assert_eq!(err.code, "CONV-CFG-003");
}
