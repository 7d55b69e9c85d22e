#![allow(clippy::result_large_err)] // Rendering returns AppError for structured diagnostics.

use crate::core::convert::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::core::convert::target::{
    CacheBlock, CacheRole, PluginSpec, TargetDocument, TargetStage, TargetStep, TargetStepNode,
};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;

/// Structural clean-up applied to one converted stage.
pub trait StagePass {
    fn name(&self) -> &'static str;
    fn apply(&self, stage: &mut TargetStage, diagnostics: &mut Diagnostics);
}

/// Replace an explicit save/restore cache pair with a stage `cache` block.
///
/// Folds only when the stage has exactly one save step, at most one restore
/// step, matching keys, and no per-step condition, timeout or environment on
/// either. Anything else is left as is.
pub struct CacheFoldPass;

fn cache_plugin(step: &TargetStep) -> Option<(&PluginSpec, CacheRole)> {
    match step {
        TargetStep::Plugin(plugin) => plugin.cache_role().map(|role| (plugin, role)),
        _ => None,
    }
}

/// Per-step settings a stage cache block cannot express.
fn unfoldable_settings(node: &TargetStepNode, plugin: &PluginSpec) -> Option<String> {
    let mut kept = Vec::new();
    if let Some(condition) = &node.when {
        kept.push(format!("if {:?}", condition));
    }
    if let Some(timeout) = &node.timeout {
        kept.push(format!("timeout {:?}", timeout));
    }
    if !plugin.envs.is_empty() {
        kept.push("envs".to_string());
    }
    (!kept.is_empty()).then(|| format!("step '{}' sets {}", node.id, kept.join(", ")))
}

impl StagePass for CacheFoldPass {
    fn name(&self) -> &'static str {
        "cache-fold"
    }

    fn apply(&self, stage: &mut TargetStage, diagnostics: &mut Diagnostics) {
        let mut saves = Vec::new();
        let mut restores = Vec::new();
        for (index, node) in stage.spec.steps.iter().enumerate() {
            match cache_plugin(&node.step) {
                Some((plugin, CacheRole::Save)) => saves.push((index, node, plugin)),
                Some((plugin, CacheRole::Restore)) => restores.push((index, node, plugin)),
                None => {}
            }
        }
        if saves.is_empty() && restores.is_empty() {
            return;
        }

        let not_folded = |reason: String| {
            Diagnostic::info(
                "CONV-CACHE-001",
                DiagnosticKind::CacheNotFolded,
                format!("cache steps kept explicit: {}", reason),
            )
            .at(stage.id.clone())
        };

        let reason = if stage.spec.cache.is_some() {
            Some("stage already declares a cache".to_string())
        } else if saves.len() != 1 || restores.len() > 1 {
            Some(format!(
                "{} save and {} restore steps",
                saves.len(),
                restores.len()
            ))
        } else if let Some(settings) = saves
            .iter()
            .chain(restores.iter())
            .find_map(|(_, node, plugin)| unfoldable_settings(node, plugin))
        {
            Some(settings)
        } else {
            let save_key = saves[0].2.cache_key();
            restores
                .first()
                .map(|(_, _, restore)| restore.cache_key())
                .filter(|restore_key| *restore_key != save_key)
                .map(|restore_key| {
                    format!(
                        "restore key {:?} differs from save key {:?}",
                        restore_key.unwrap_or_default(),
                        save_key.clone().unwrap_or_default()
                    )
                })
        };
        if let Some(reason) = reason {
            diagnostics.push(not_folded(reason));
            return;
        }

        let save = saves[0].2;
        let block = CacheBlock {
            enabled: true,
            key: save.cache_key(),
            paths: save.cache_paths(),
        };
        let mut remove: Vec<usize> = saves
            .iter()
            .chain(restores.iter())
            .map(|(index, _, _)| *index)
            .collect();
        remove.sort_unstable();

        tracing::debug!(stage = %stage.id, removed = remove.len(), "folded cache steps");
        for index in remove.into_iter().rev() {
            stage.spec.steps.remove(index);
        }
        stage.spec.cache = Some(block);
    }
}

/// Replace a step list made of one unconditioned group with its children.
pub struct GroupFlattenPass;

impl StagePass for GroupFlattenPass {
    fn name(&self) -> &'static str {
        "group-flatten"
    }

    fn apply(&self, stage: &mut TargetStage, _diagnostics: &mut Diagnostics) {
        let [only] = stage.spec.steps.as_slice() else {
            return;
        };
        if only.when.is_some() || !matches!(only.step, TargetStep::Group(_)) {
            return;
        }
        if let Some(TargetStep::Group(group)) = stage.spec.steps.pop().map(|node| node.step) {
            stage.spec.steps = group.steps;
        }
    }
}

/// Ordered stage passes; cache folding runs before group flattening.
pub struct PipelineAssembler {
    passes: Vec<Box<dyn StagePass>>,
}

impl Default for PipelineAssembler {
    fn default() -> Self {
        Self {
            passes: vec![Box::new(CacheFoldPass), Box::new(GroupFlattenPass)],
        }
    }
}

impl PipelineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Run every pass once over every stage, in place.
    pub fn assemble(&self, document: &mut TargetDocument, diagnostics: &mut Diagnostics) {
        for stage in &mut document.spec.stages {
            for pass in &self.passes {
                pass.apply(stage, diagnostics);
            }
        }
    }
}

/// Serialize a target document to YAML.
pub fn render_yaml(document: &TargetDocument) -> Result<String, AppError> {
    serde_yaml::to_string(document).map_err(|err| {
        AppError::new(
            ErrorCategory::SerializationError,
            format!("failed to render pipeline YAML: {}", err),
        )
        .with_code("CONV-RENDER-001")
    })
}
