#![allow(clippy::result_large_err)]

pub mod control;
pub mod deploy;
pub mod group;
pub mod plugin;
pub mod script;

use crate::core::config::UnknownStepPolicy;
use crate::core::convert::dispatcher::{ConverterRegistry, ConverterRegistryBuilder, StepDispatcher};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;

/// Register built-in converters into the supplied builder.
pub fn register_builtins(builder: &mut ConverterRegistryBuilder) -> Result<(), AppError> {
    builder
        .register(script::RunConverter)?
        .register(script::BackgroundConverter)?
        .register(script::TestReportConverter)?
        .register(plugin::PluginConverter)?
        .register(plugin::SaveCacheConverter)?
        .register(plugin::RestoreCacheConverter)?
        .register(plugin::ArtifactUploadConverter)?
        .register(control::ApprovalConverter)?
        .register(control::WaitConverter)?
        .register(control::BarrierConverter)?
        .register(control::QueueConverter)?
        .register(deploy::DeployConverter::rolling())?
        .register(deploy::DeployConverter::apply())?
        .register(deploy::DeployConverter::helm())?
        .register(group::GroupConverter)?
        .register(group::ParallelConverter)?;
    Ok(())
}

/// Registry holding every built-in converter.
pub fn builtin_registry() -> Result<ConverterRegistry, AppError> {
    let mut builder = ConverterRegistry::builder();
    register_builtins(&mut builder)?;
    Ok(builder.build())
}

pub fn builtin_dispatcher(unknown_steps: UnknownStepPolicy) -> Result<StepDispatcher, AppError> {
    Ok(StepDispatcher::new(builtin_registry()?, unknown_steps))
}

/// Error for a required field that is missing or blank.
pub(crate) fn missing_field(kind: &str, field: &str) -> AppError {
    AppError::new(
        ErrorCategory::UnsupportedShape,
        format!("{} step requires a non-empty '{}'", kind, field),
    )
    .with_code("CONV-SHAPE-002")
    .with_context("field", field)
}
