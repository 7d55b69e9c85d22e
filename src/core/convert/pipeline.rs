#![allow(clippy::result_large_err)] // Conversion returns AppError for structured diagnostics.

use crate::core::config::{ConfigValidator, ConverterConfig};
use crate::core::convert::assembler::{render_yaml, PipelineAssembler};
use crate::core::convert::context::ConversionContext;
use crate::core::convert::converters::builtin_dispatcher;
use crate::core::convert::diagnostics::{Diagnostic, DiagnosticKind};
use crate::core::convert::dispatcher::{is_literal, StepDispatcher};
use crate::core::convert::expression::{Bindings, ExpressionRewriter};
use crate::core::convert::matrix::{combination_bindings, combination_label, expand};
use crate::core::convert::source::{
    RuntimeKind, SourceInput, SourcePipeline, SourceStage, StageKind,
};
use crate::core::convert::target::{
    CloneSpec, PlatformSpec, StageSpec, StageStrategy, TargetDocument, TargetInput,
    TargetPipeline, TargetStage,
};
use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, ErrorSeverity};

/// Converted document plus the diagnostics recorded while producing it.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    pub document: TargetDocument,
    pub diagnostics: Vec<Diagnostic>,
}

impl ConversionOutput {
    pub fn render_yaml(&self) -> Result<String, AppError> {
        render_yaml(&self.document)
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diagnostic| diagnostic.severity >= ErrorSeverity::Warning)
    }
}

/// One concrete stage to emit: the plain stage, or one matrix combination.
struct StageVariant {
    seed: String,
    display: String,
    bindings: Bindings,
    strategy: Option<StageStrategy>,
}

/// Runtime and platform of a converted stage, reused by later stages.
#[derive(Debug, Clone)]
struct StageInfrastructure {
    runtime: Option<String>,
    platform: Option<PlatformSpec>,
}

/// Converts typed source trees into target documents.
///
/// Holds only read-only tables, so one converter can serve many documents.
pub struct Converter {
    config: ConverterConfig,
    rewriter: ExpressionRewriter,
    dispatcher: StepDispatcher,
    assembler: PipelineAssembler,
}

impl Converter {
    pub fn new(config: ConverterConfig) -> Result<Self, AppError> {
        ConfigValidator::validate(&config)?;
        let dispatcher = builtin_dispatcher(config.unknown_steps)?;
        Ok(Self {
            rewriter: ExpressionRewriter::circle()?,
            dispatcher,
            assembler: PipelineAssembler::new(),
            config,
        })
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &StepDispatcher {
        &self.dispatcher
    }

    /// Run one conversion with a fresh context.
    pub fn convert(&self, source: &SourcePipeline) -> Result<ConversionOutput, AppError> {
        if source.stages.is_empty() {
            return Err(AppError::parse("source pipeline defines no stages"));
        }

        let mut ctx = ConversionContext::new(
            &self.rewriter,
            &self.config.backend,
            self.config.max_identifier_attempts,
        );

        let inputs = source
            .inputs
            .iter()
            .map(|(name, input)| (name.clone(), self.convert_input(input, &mut ctx)))
            .collect();

        let mut stages = Vec::new();
        let mut infrastructure: Vec<Option<StageInfrastructure>> = Vec::new();
        for stage in &source.stages {
            let inherited = self.inherited_infrastructure(stage, &infrastructure, &mut ctx);
            let mut first = None;
            for variant in self.expand_stage(stage, &mut ctx) {
                if let Some(converted) =
                    self.convert_stage(stage, variant, inherited.as_ref(), &mut ctx)
                {
                    first.get_or_insert_with(|| StageInfrastructure {
                        runtime: converted.spec.runtime.clone(),
                        platform: converted.spec.platform.clone(),
                    });
                    stages.push(converted);
                }
            }
            infrastructure.push(first);
        }
        if stages.is_empty() {
            return Err(AppError::new(
                ErrorCategory::ParseError,
                "conversion produced no stages",
            )
            .with_code("CONV-PARSE-003"));
        }

        let mut document = TargetDocument::pipeline(TargetPipeline {
            name: source.name.clone(),
            inputs,
            stages,
        });
        self.assembler.assemble(&mut document, ctx.diagnostics_mut());

        let diagnostics = ctx.into_diagnostics().into_vec();
        tracing::info!(
            stages = document.spec.stages.len(),
            diagnostics = diagnostics.len(),
            "converted pipeline"
        );
        Ok(ConversionOutput {
            document,
            diagnostics,
        })
    }

    fn convert_input(&self, input: &SourceInput, ctx: &mut ConversionContext<'_>) -> TargetInput {
        let mut default = input.default.clone();
        if let Some(value) = default.as_mut() {
            ctx.rewrite_value(value);
        }
        TargetInput {
            input_type: input.input_type.clone(),
            default,
            description: input.description.clone(),
            options: input.options.clone(),
        }
    }

    /// Infrastructure of the earlier stage `stage` inherits from, if it was converted.
    fn inherited_infrastructure(
        &self,
        stage: &SourceStage,
        converted: &[Option<StageInfrastructure>],
        ctx: &mut ConversionContext<'_>,
    ) -> Option<StageInfrastructure> {
        let index = stage.inherit_from?;
        let found = converted.get(index).cloned().flatten();
        if found.is_none() {
            ctx.report(
                Diagnostic::warning(
                    "CONV-PARSE-012",
                    DiagnosticKind::UnsupportedConstruct,
                    format!(
                        "stage '{}' reuses the infrastructure of stage #{}, which was not converted before it",
                        stage.name, index
                    ),
                )
                .at(stage.name.clone()),
            );
        }
        found
    }

    fn expand_stage(&self, stage: &SourceStage, ctx: &mut ConversionContext<'_>) -> Vec<StageVariant> {
        let Some(matrix) = stage.matrix.as_ref().filter(|matrix| !matrix.axes.is_empty()) else {
            return vec![StageVariant {
                seed: stage.name.clone(),
                display: stage.name.clone(),
                bindings: stage.bindings.clone(),
                strategy: None,
            }];
        };

        let combinations = expand(matrix);
        if combinations.is_empty() {
            ctx.report(
                Diagnostic::warning(
                    "CONV-MATRIX-001",
                    DiagnosticKind::UnsupportedConstruct,
                    format!("matrix of '{}' excludes every combination", stage.name),
                )
                .at(stage.name.clone()),
            );
        }

        combinations
            .iter()
            .enumerate()
            .map(|(index, combination)| {
                let mut bindings = stage.bindings.clone();
                bindings.extend(combination_bindings(combination));
                StageVariant {
                    seed: format!("{}_{}", stage.name, index),
                    display: format!("{}-{}", stage.name, combination_label(combination)),
                    bindings,
                    strategy: Some(StageStrategy {
                        matrix: combination.clone(),
                        max_parallel: matrix.max_concurrency,
                    }),
                }
            })
            .collect()
    }

    fn convert_stage(
        &self,
        stage: &SourceStage,
        variant: StageVariant,
        inherited: Option<&StageInfrastructure>,
        ctx: &mut ConversionContext<'_>,
    ) -> Option<TargetStage> {
        let id = match ctx.allocate(&variant.seed, "stage") {
            Ok(id) => id,
            Err(err) => {
                ctx.report(Diagnostic::from_error(&err).at(variant.display.clone()));
                return None;
            }
        };

        let previous = ctx.bind(variant.bindings);
        ctx.enter(id.clone());

        let name = ctx.rewrite(&variant.display);
        let when = ctx
            .rewrite_opt(stage.condition.as_deref())
            .filter(|condition| !is_literal(condition, true));
        let envs = ctx.rewrite_map(&stage.environment);
        let steps = self.dispatcher.dispatch_all(&stage.steps, ctx);

        ctx.leave();
        ctx.restore_bindings(previous);
        tracing::debug!(stage = %id, steps = steps.len(), "converted stage");

        Some(TargetStage {
            id,
            name,
            stage_type: stage_type(stage).to_string(),
            when,
            strategy: variant.strategy,
            spec: StageSpec {
                clone: (!stage.clone).then_some(CloneSpec { disabled: true }),
                cache: None,
                runtime: stage
                    .runtime
                    .map(runtime_name)
                    .map(str::to_string)
                    .or_else(|| inherited.and_then(|infra| infra.runtime.clone())),
                platform: stage
                    .platform
                    .as_ref()
                    .map(|platform| PlatformSpec {
                        os: platform.os.clone(),
                        arch: platform.arch.clone(),
                    })
                    .or_else(|| inherited.and_then(|infra| infra.platform.clone())),
                envs,
                steps,
            },
        })
    }
}

fn stage_type(stage: &SourceStage) -> &'static str {
    match stage.kind {
        StageKind::Ci => "ci",
        StageKind::Deployment => "deployment",
        StageKind::Custom => "custom",
    }
}

fn runtime_name(runtime: RuntimeKind) -> &'static str {
    match runtime {
        RuntimeKind::Cloud => "cloud",
        RuntimeKind::Machine => "machine",
        RuntimeKind::Kubernetes => "kubernetes",
    }
}
