use crate::{
    cli::args::ConvertArgs,
    core::{
        config::{loader::DEFAULT_CONFIG_FILE, ConfigLoader},
        convert::{ConversionOutput, Converter},
        sources::convert_source,
        ErrorSeverity, SourceFormat,
    },
    logging::{self, config::LoggingConfig},
    Result,
};
use anyhow::{bail, Context};
use std::{
    env, fs,
    io::Write,
    path::{Path, PathBuf},
};

/// Config file consulted for both converter and logging settings.
fn resolve_config_path(args: &ConvertArgs, workdir: &Path) -> Option<PathBuf> {
    args.config.clone().or_else(|| {
        let candidate = workdir.join(DEFAULT_CONFIG_FILE);
        candidate.exists().then_some(candidate)
    })
}

fn log_diagnostics(output: &ConversionOutput) {
    for diagnostic in &output.diagnostics {
        let location = diagnostic.location.as_deref().unwrap_or("-");
        match diagnostic.severity {
            ErrorSeverity::Info => tracing::info!(
                code = %diagnostic.code,
                location,
                "{}",
                diagnostic.message
            ),
            _ => tracing::warn!(
                code = %diagnostic.code,
                location,
                suggestion = diagnostic.suggestion.as_deref().unwrap_or(""),
                "{}",
                diagnostic.message
            ),
        }
    }
}

fn write_document(yaml: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::write(path, yaml).with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote converted pipeline");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(yaml.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Convert one source file and write the resulting document.
pub fn convert(format: SourceFormat, args: ConvertArgs) -> Result<()> {
    let workdir = env::current_dir().context("failed to resolve working directory")?;
    let config_path = resolve_config_path(&args, &workdir);

    let logging_config = LoggingConfig::load(config_path.as_deref(), args.verbose)?;
    logging::init(&logging_config, args.verbose > 0, args.output.is_none())?;

    let mut config = ConfigLoader::load(args.config.as_deref(), &workdir)?;
    args.apply_overrides(&mut config);
    let converter = Converter::new(config)?;

    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    tracing::debug!(file = %args.file.display(), format = %format, "converting pipeline");

    let output = convert_source(&converter, format, &text)?;
    log_diagnostics(&output);
    let yaml = output.render_yaml()?;
    write_document(&yaml, args.output.as_deref())?;

    if args.strict && output.has_warnings() {
        let count = output
            .diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.severity >= ErrorSeverity::Warning)
            .count();
        bail!("conversion produced {} warning diagnostics (--strict)", count);
    }
    Ok(())
}
