use crate::logging::layers::console::{ConsoleOutput, LogFormat};
use crate::Result;
use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing_subscriber::filter::Directive;

const DEFAULT_LEVEL: &str = "warn";

/// Resolved logging configuration after reading config files and env overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub default_level: String,
    pub console_output: ConsoleOutput,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: DEFAULT_LEVEL.to_string(),
            console_output: ConsoleOutput::default(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Load configuration with deterministic precedence: defaults, the
    /// `[logging]` table of the config file, env overrides, then `-v` flags.
    pub fn load(config_file: Option<&Path>, verbosity: u8) -> Result<Self> {
        let mut config = LoggingConfig::default();
        if let Some(path) = config_file {
            if let Some(section) = Self::load_from_file(path)? {
                config.apply(section);
            }
        }
        config.apply_env_overrides()?;
        config.apply_verbosity(verbosity);
        config.validate()?;
        Ok(config)
    }

    fn load_from_file(path: &Path) -> Result<Option<TomlLoggingSection>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read logging config {}", path.display()))?;
        let parsed: TomlLogging = toml::from_str(&content)
            .with_context(|| format!("failed to parse logging config {}", path.display()))?;
        Ok(parsed.logging)
    }

    fn apply(&mut self, logging: TomlLoggingSection) {
        if let Some(default_level) = logging.default_level {
            self.default_level = default_level;
        }
        if let Some(console_output) = logging.console_output {
            self.console_output = console_output;
        }
        if let Some(format) = logging.format {
            self.format = format;
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(output) = env::var("PIPELINE_CONVERT_CONSOLE_OUTPUT") {
            self.console_output = ConsoleOutput::from_str(&output).map_err(|err| anyhow!(err))?;
        }
        if let Ok(format) = env::var("PIPELINE_CONVERT_LOG_FORMAT") {
            self.format = LogFormat::from_str(&format).map_err(|err| anyhow!(err))?;
        }
        Ok(())
    }

    fn apply_verbosity(&mut self, verbosity: u8) {
        match verbosity {
            0 => {}
            1 => self.default_level = "debug".to_string(),
            _ => self.default_level = "trace".to_string(),
        }
    }

    fn validate(&self) -> Result<()> {
        Directive::from_str(&self.default_level)
            .map_err(|_| anyhow!("logging.default_level must be a valid tracing directive"))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TomlLogging {
    pub logging: Option<TomlLoggingSection>,
}

#[derive(Debug, Deserialize)]
struct TomlLoggingSection {
    pub default_level: Option<String>,
    #[serde(default)]
    pub console_output: Option<ConsoleOutput>,
    #[serde(default)]
    pub format: Option<LogFormat>,
}
