#![allow(clippy::result_large_err)]

use super::missing_field;
use crate::core::config::StorageBackend;
use crate::core::convert::context::ConversionContext;
use crate::core::convert::dispatcher::{kind_mismatch, StepConverter, StepDispatcher};
use crate::core::convert::flexible::Settings;
use crate::core::convert::source::{kinds, CacheStep, SourceStepNode};
use crate::core::convert::target::{
    CacheRole, PluginSpec, TargetStep, TargetStepNode, CACHE_PLUGIN_IMAGE,
};
use crate::core::error::AppError;
use serde_json::Value;

/// Bucket and credential settings shared by every storage plugin.
fn storage_settings(ctx: &ConversionContext<'_>) -> Settings {
    let backend = ctx.backend();
    let mut settings = Settings::new();
    settings.insert("bucket", backend.bucket());
    match backend.kind {
        StorageBackend::S3 => {
            settings
                .insert("region", backend.region())
                .insert("access_key", backend.access_key())
                .insert("secret_key", backend.secret_key());
        }
        StorageBackend::Gcs => {
            settings.insert("json_key", backend.secret_key());
        }
    }
    settings
}

fn cache_plugin(
    kind: &str,
    step: &CacheStep,
    role: CacheRole,
    ctx: &mut ConversionContext<'_>,
) -> Result<TargetStepNode, AppError> {
    if step.key.trim().is_empty() {
        return Err(missing_field(kind, "key"));
    }
    let mut settings = Settings::new();
    settings.insert("backend", ctx.backend().kind.as_str());
    for (key, value) in storage_settings(ctx).iter() {
        settings.insert(key.clone(), value.clone());
    }
    settings.insert("cache_key", ctx.rewrite(&step.key));
    if !step.paths.is_empty() {
        let mount = ctx.rewrite_all(&step.paths);
        settings.insert("mount", Value::from(mount));
    }
    match role {
        CacheRole::Save => settings.insert("rebuild", true),
        CacheRole::Restore => settings.insert("restore", true),
    };

    Ok(TargetStepNode::new(TargetStep::Plugin(PluginSpec {
        image: CACHE_PLUGIN_IMAGE.to_string(),
        settings,
        envs: ctx.rewrite_map(&step.common.environment),
    })))
}

/// `plugin`: container image plus free-form settings.
pub struct PluginConverter;

impl StepConverter for PluginConverter {
    fn kind(&self) -> &'static str {
        kinds::PLUGIN
    }

    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        _dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError> {
        let SourceStepNode::Plugin(step) = node else {
            return Err(kind_mismatch(self.kind(), node));
        };
        if step.image.trim().is_empty() {
            return Err(missing_field(self.kind(), "image"));
        }
        Ok(Some(TargetStepNode::new(TargetStep::Plugin(PluginSpec {
            image: ctx.rewrite(&step.image),
            settings: ctx.rewrite_settings(&step.settings),
            envs: ctx.rewrite_map(&step.common.environment),
        }))))
    }
}

pub struct SaveCacheConverter;

impl StepConverter for SaveCacheConverter {
    fn kind(&self) -> &'static str {
        kinds::SAVE_CACHE
    }

    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        _dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError> {
        let SourceStepNode::SaveCache(step) = node else {
            return Err(kind_mismatch(self.kind(), node));
        };
        if step.paths.is_empty() {
            return Err(missing_field(self.kind(), "paths"));
        }
        cache_plugin(self.kind(), step, CacheRole::Save, ctx).map(Some)
    }
}

pub struct RestoreCacheConverter;

impl StepConverter for RestoreCacheConverter {
    fn kind(&self) -> &'static str {
        kinds::RESTORE_CACHE
    }

    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        _dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError> {
        let SourceStepNode::RestoreCache(step) = node else {
            return Err(kind_mismatch(self.kind(), node));
        };
        cache_plugin(self.kind(), step, CacheRole::Restore, ctx).map(Some)
    }
}

/// `upload-artifact`: s3 or gcs upload plugin, depending on the backend.
pub struct ArtifactUploadConverter;

impl StepConverter for ArtifactUploadConverter {
    fn kind(&self) -> &'static str {
        kinds::UPLOAD_ARTIFACT
    }

    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        _dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError> {
        let SourceStepNode::UploadArtifact(step) = node else {
            return Err(kind_mismatch(self.kind(), node));
        };
        if step.source.trim().is_empty() {
            return Err(missing_field(self.kind(), "path"));
        }
        let mut settings = storage_settings(ctx);
        settings.insert("source", ctx.rewrite(&step.source));
        if let Some(destination) = ctx.rewrite_opt(step.destination.as_deref()) {
            settings.insert("target", destination);
        }

        Ok(Some(TargetStepNode::new(TargetStep::Plugin(PluginSpec {
            image: ctx.backend().kind.upload_image().to_string(),
            settings,
            envs: ctx.rewrite_map(&step.common.environment),
        }))))
    }
}
