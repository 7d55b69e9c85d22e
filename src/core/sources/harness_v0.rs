#![allow(clippy::result_large_err)]

//! Harness v0 front-end.
//!
//! v0 expressions already use the `<+...>` target syntax and pass through
//! conversion untouched.

use super::{load_yaml, ParsedSource, SourceParser};
use crate::core::convert::diagnostics::{Diagnostic, DiagnosticKind};
use crate::core::convert::flexible::{render_scalar, FlexibleValue, Settings};
use crate::core::convert::matrix::MatrixSpec;
use crate::core::convert::source::{
    ApprovalStep, ArtifactStep, BarrierStep, CacheStep, CommonFields, DeployStep, GroupStep,
    Platform, PluginStep, QueueStep, RunStep, RuntimeKind, SourceInput, SourcePipeline,
    SourceStage, SourceStepNode, StageKind, StepWhen, UnknownStep, WaitStep,
};
use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, SourceFormat};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Marker for values supplied when the pipeline runs.
const RUNTIME_INPUT: &str = "<+input>";

/// Matrix keys that configure the strategy instead of naming an axis.
const MATRIX_SETTINGS: &[&str] = &["exclude", "maxConcurrency", "nodeName"];

type StringOrList = FlexibleValue<Map<String, Value>>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V0Document {
    pipeline: Option<V0Pipeline>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V0Pipeline {
    name: Option<String>,
    identifier: Option<String>,
    variables: Vec<V0Variable>,
    stages: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V0Variable {
    name: String,
    #[serde(rename = "type")]
    variable_type: Option<String>,
    value: Option<Value>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V0Stage {
    name: Option<String>,
    identifier: Option<String>,
    #[serde(rename = "type")]
    stage_type: Option<String>,
    when: Option<V0When>,
    variables: Vec<V0Variable>,
    strategy: Option<V0Strategy>,
    spec: V0StageSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct V0StageSpec {
    clone_codebase: Option<bool>,
    platform: Option<V0Platform>,
    runtime: Option<V0TypeRef>,
    infrastructure: Option<V0TypeRef>,
    execution: V0Execution,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V0Execution {
    steps: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V0Platform {
    os: Option<String>,
    arch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct V0TypeRef {
    #[serde(rename = "type")]
    kind: Option<String>,
    /// Identifier of an earlier stage, as a string or `{stage: id}`.
    use_from_stage: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct V0When {
    stage_status: Option<String>,
    pipeline_status: Option<String>,
    condition: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V0Strategy {
    matrix: Option<Map<String, Value>>,
    parallelism: Option<Value>,
    repeat: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V0Step {
    name: Option<String>,
    identifier: Option<String>,
    #[serde(rename = "type")]
    step_type: String,
    timeout: Option<String>,
    when: Option<V0When>,
    spec: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V0StepGroup {
    name: Option<String>,
    identifier: Option<String>,
    when: Option<V0When>,
    steps: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct V0RunSpec {
    command: Option<String>,
    image: Option<String>,
    shell: Option<String>,
    env_variables: IndexMap<String, Value>,
    reports: Option<V0Reports>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V0Reports {
    spec: V0ReportPaths,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V0ReportPaths {
    paths: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct V0PluginSpec {
    image: String,
    settings: Settings,
    env_variables: IndexMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct V0ApprovalSpec {
    approval_message: Option<String>,
    approvers: V0Approvers,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct V0Approvers {
    user_groups: Option<StringOrList>,
    minimum_count: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct V0CacheSpec {
    key: String,
    source_paths: Option<StringOrList>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct V0UploadSpec {
    source_paths: Option<StringOrList>,
    source_path: Option<String>,
    target: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V0WaitSpec {
    duration: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct V0BarrierSpec {
    barrier_ref: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct V0QueueSpec {
    key: String,
    scope: Option<String>,
}

/// Parses Harness v0 pipeline documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct HarnessV0Parser;

impl HarnessV0Parser {
    pub fn new() -> Self {
        Self
    }
}

impl SourceParser for HarnessV0Parser {
    fn format(&self) -> SourceFormat {
        SourceFormat::HarnessV0
    }

    fn parse(&self, text: &str) -> Result<ParsedSource, AppError> {
        let raw = load_yaml(text)?;
        let document: V0Document = serde_json::from_value(raw).map_err(|err| {
            AppError::new(
                ErrorCategory::ParseError,
                format!("invalid Harness v0 document: {}", err),
            )
            .with_code("CONV-PARSE-002")
        })?;
        let Some(pipeline) = document.pipeline else {
            return Err(AppError::parse("document has no top-level 'pipeline'"));
        };

        let mut reader = Reader::default();
        let pipeline = reader.read_pipeline(pipeline);
        tracing::debug!(
            stages = pipeline.stages.len(),
            diagnostics = reader.diagnostics.len(),
            "parsed Harness v0 pipeline"
        );
        Ok(ParsedSource {
            pipeline,
            diagnostics: reader.diagnostics,
        })
    }
}

fn env_map(raw: &IndexMap<String, Value>) -> IndexMap<String, String> {
    raw.iter()
        .filter_map(|(key, value)| render_scalar(value).map(|text| (key.clone(), text)))
        .collect()
}

fn variable_value(variable: &V0Variable) -> Option<Value> {
    variable
        .value
        .clone()
        .filter(|value| value.as_str().map_or(true, |text| !text.starts_with(RUNTIME_INPUT)))
}

fn step_when(when: Option<&V0When>) -> Option<StepWhen> {
    let when = when?;
    if let Some(condition) = when.condition.as_ref().and_then(render_scalar) {
        return Some(StepWhen::Expression(condition));
    }
    match when.stage_status.as_deref()? {
        "Failure" => Some(StepWhen::OnFailure),
        "All" => Some(StepWhen::Always),
        _ => Some(StepWhen::OnSuccess),
    }
}

fn stage_kind(stage_type: Option<&str>) -> Option<StageKind> {
    match stage_type {
        Some("CI") | None => Some(StageKind::Ci),
        Some("Deployment") => Some(StageKind::Deployment),
        Some("Custom") | Some("Approval") => Some(StageKind::Custom),
        Some(_) => None,
    }
}

fn common(name: Option<String>, identifier: Option<String>, when: Option<&V0When>) -> CommonFields {
    CommonFields {
        name: name.or(identifier),
        when: step_when(when),
        ..CommonFields::default()
    }
}

#[derive(Default)]
struct Reader {
    diagnostics: Vec<Diagnostic>,
    location: String,
    /// Stage identifier to its position in the converted stage list.
    stage_indices: IndexMap<String, usize>,
}

impl Reader {
    fn warn(&mut self, code: &str, kind: DiagnosticKind, message: String) {
        let mut diagnostic = Diagnostic::warning(code, kind, message);
        if !self.location.is_empty() {
            diagnostic = diagnostic.at(self.location.clone());
        }
        self.diagnostics.push(diagnostic);
    }

    fn decode<T: DeserializeOwned>(&mut self, raw: &Value, what: &str) -> Option<T> {
        match serde_json::from_value(raw.clone()) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                self.warn(
                    "CONV-SHAPE-001",
                    DiagnosticKind::UnsupportedShape,
                    format!("{} has an unsupported shape: {}", what, err),
                );
                None
            }
        }
    }

    fn read_pipeline(&mut self, pipeline: V0Pipeline) -> SourcePipeline {
        let inputs = pipeline
            .variables
            .iter()
            .map(|variable| {
                let input_type = match variable.variable_type.as_deref() {
                    Some("Number") => "number",
                    Some("Secret") => "secret",
                    _ => "string",
                };
                (
                    variable.name.clone(),
                    SourceInput {
                        input_type: input_type.to_string(),
                        default: variable_value(variable),
                        description: variable.description.clone(),
                        options: Vec::new(),
                    },
                )
            })
            .collect();

        let mut stages = Vec::new();
        for entry in &pipeline.stages {
            if let Some(stage) = entry.get("stage") {
                self.push_stage(stage, &mut stages);
            } else if let Some(parallel) = entry.get("parallel").and_then(Value::as_array) {
                self.location.clear();
                self.warn(
                    "CONV-PARSE-010",
                    DiagnosticKind::UnsupportedConstruct,
                    format!("{} parallel stages converted sequentially", parallel.len()),
                );
                for nested in parallel {
                    if let Some(stage) = nested.get("stage") {
                        self.push_stage(stage, &mut stages);
                    }
                }
            } else {
                self.warn(
                    "CONV-SHAPE-001",
                    DiagnosticKind::UnsupportedShape,
                    "stage entry is neither 'stage' nor 'parallel'".to_string(),
                );
            }
        }

        SourcePipeline {
            name: pipeline.name.or(pipeline.identifier),
            inputs,
            stages,
        }
    }

    fn push_stage(&mut self, raw: &Value, stages: &mut Vec<SourceStage>) {
        let identifier = raw.get("identifier").and_then(render_scalar);
        if let Some(stage) = self.read_stage(raw) {
            if let Some(identifier) = identifier {
                self.stage_indices.entry(identifier).or_insert(stages.len());
            }
            stages.push(stage);
        }
    }

    /// Resolve `infrastructure.useFromStage` against stages read so far.
    fn inherited_stage(&mut self, infrastructure: Option<&V0TypeRef>) -> Option<usize> {
        let reference = infrastructure?.use_from_stage.as_ref()?;
        let identifier = reference
            .get("stage")
            .unwrap_or(reference)
            .as_str()
            .map(str::to_string);
        let index = identifier
            .as_deref()
            .and_then(|identifier| self.stage_indices.get(identifier).copied());
        if index.is_none() {
            self.warn(
                "CONV-PARSE-012",
                DiagnosticKind::UnsupportedConstruct,
                format!(
                    "useFromStage '{}' does not name an earlier stage",
                    identifier.unwrap_or_else(|| reference.to_string())
                ),
            );
        }
        index
    }

    fn read_stage(&mut self, raw: &Value) -> Option<SourceStage> {
        let stage: V0Stage = self.decode(raw, "stage")?;
        let name = stage
            .name
            .clone()
            .or_else(|| stage.identifier.clone())
            .unwrap_or_else(|| "stage".to_string());
        self.location = name.clone();

        let kind = stage_kind(stage.stage_type.as_deref()).unwrap_or_else(|| {
            self.warn(
                "CONV-PARSE-011",
                DiagnosticKind::UnsupportedConstruct,
                format!(
                    "stage type '{}' converted as a custom stage",
                    stage.stage_type.as_deref().unwrap_or_default()
                ),
            );
            StageKind::Custom
        });

        let runtime = match (
            stage.spec.infrastructure.as_ref().and_then(|i| i.kind.as_deref()),
            stage.spec.runtime.as_ref().and_then(|r| r.kind.as_deref()),
        ) {
            (Some("KubernetesDirect"), _) => Some(RuntimeKind::Kubernetes),
            (_, Some("Cloud")) => Some(RuntimeKind::Cloud),
            (_, Some("Docker")) => Some(RuntimeKind::Machine),
            _ => None,
        };
        let platform = stage.spec.platform.as_ref().map(|platform| Platform {
            os: platform.os.as_deref().map(str::to_lowercase),
            arch: platform.arch.as_deref().map(str::to_lowercase),
        });

        let matrix = stage.strategy.as_ref().and_then(|strategy| {
            if strategy.parallelism.is_some() || strategy.repeat.is_some() {
                self.warn(
                    "CONV-PARSE-009",
                    DiagnosticKind::UnsupportedConstruct,
                    "only matrix strategies are converted".to_string(),
                );
            }
            strategy.matrix.as_ref().map(read_matrix)
        });

        let environment = stage
            .variables
            .iter()
            .filter_map(|variable| {
                variable_value(variable)
                    .as_ref()
                    .and_then(render_scalar)
                    .map(|value| (variable.name.clone(), value))
            })
            .collect();

        let inherit_from = self.inherited_stage(stage.spec.infrastructure.as_ref());
        let steps = self.read_steps(&stage.spec.execution.steps);
        Some(SourceStage {
            name,
            kind,
            runtime,
            platform,
            clone: stage.spec.clone_codebase.unwrap_or(kind == StageKind::Ci),
            environment,
            bindings: Default::default(),
            matrix,
            condition: stage
                .when
                .as_ref()
                .and_then(|when| when.condition.as_ref())
                .and_then(render_scalar),
            inherit_from,
            steps,
        })
    }

    fn read_steps(&mut self, raw: &[Value]) -> Vec<SourceStepNode> {
        raw.iter().flat_map(|entry| self.read_element(entry)).collect()
    }

    fn read_element(&mut self, entry: &Value) -> Option<SourceStepNode> {
        if let Some(step) = entry.get("step") {
            let step: V0Step = self.decode(step, "step")?;
            return Some(self.read_step(step));
        }
        if let Some(group) = entry.get("stepGroup") {
            let group: V0StepGroup = self.decode(group, "step group")?;
            return Some(SourceStepNode::Group(GroupStep {
                common: common(group.name, group.identifier, group.when.as_ref()),
                steps: self.read_steps(&group.steps),
            }));
        }
        if let Some(parallel) = entry.get("parallel").and_then(Value::as_array) {
            return Some(SourceStepNode::Parallel(GroupStep {
                common: CommonFields::default(),
                steps: self.read_steps(parallel),
            }));
        }
        self.warn(
            "CONV-SHAPE-001",
            DiagnosticKind::UnsupportedShape,
            "step entry is neither 'step', 'stepGroup' nor 'parallel'".to_string(),
        );
        None
    }

    fn read_step(&mut self, step: V0Step) -> SourceStepNode {
        let mut common = common(step.name, step.identifier, step.when.as_ref());
        common.timeout = step.timeout;
        common.delegate_selectors = step
            .spec
            .get("delegateSelectors")
            .and_then(|raw| serde_json::from_value::<StringOrList>(raw.clone()).ok())
            .and_then(|selectors| selectors.string_list())
            .unwrap_or_default();

        let spec = &step.spec;
        let step_type = step.step_type.as_str();
        let converted = match step_type {
            "Run" | "Background" => self.decode::<V0RunSpec>(spec, step_type).map(|run| {
                common.environment = env_map(&run.env_variables);
                let node = RunStep {
                    common: common.clone(),
                    command: run.command,
                    image: run.image,
                    shell: run.shell.map(|shell| shell.to_lowercase()),
                    working_directory: None,
                    report_paths: run.reports.map(|reports| reports.spec.paths).unwrap_or_default(),
                };
                if step_type == "Run" {
                    SourceStepNode::Run(node)
                } else {
                    SourceStepNode::Background(node)
                }
            }),
            "Plugin" => self.decode::<V0PluginSpec>(spec, step_type).map(|plugin| {
                common.environment = env_map(&plugin.env_variables);
                SourceStepNode::Plugin(PluginStep {
                    common: common.clone(),
                    image: plugin.image,
                    settings: plugin.settings,
                })
            }),
            "HarnessApproval" => self.decode::<V0ApprovalSpec>(spec, step_type).map(|approval| {
                SourceStepNode::Approval(ApprovalStep {
                    common: common.clone(),
                    message: approval.approval_message,
                    approvers: approval
                        .approvers
                        .user_groups
                        .as_ref()
                        .and_then(StringOrList::string_list)
                        .unwrap_or_default(),
                    min_approvers: approval
                        .approvers
                        .minimum_count
                        .as_ref()
                        .and_then(render_scalar)
                        .and_then(|count| count.parse().ok()),
                })
            }),
            "SaveCacheS3" | "SaveCacheGCS" | "RestoreCacheS3" | "RestoreCacheGCS" => {
                self.decode::<V0CacheSpec>(spec, step_type).map(|cache| {
                    let node = CacheStep {
                        common: common.clone(),
                        key: cache.key,
                        paths: cache
                            .source_paths
                            .as_ref()
                            .and_then(StringOrList::string_list)
                            .unwrap_or_default(),
                    };
                    if step_type.starts_with("Save") {
                        SourceStepNode::SaveCache(node)
                    } else {
                        SourceStepNode::RestoreCache(node)
                    }
                })
            }
            "S3Upload" | "GCSUpload" => self
                .decode::<V0UploadSpec>(spec, step_type)
                .map(|upload| upload_steps(common.clone(), upload)),
            "K8sRollingDeploy" | "K8sApply" | "HelmDeploy" => {
                let mut settings = Settings::from_value(spec);
                let skip_dry_run = settings
                    .remove("skipDryRun")
                    .as_ref()
                    .and_then(render_scalar)
                    .is_some_and(|flag| flag == "true");
                let manifests = settings
                    .remove("filePaths")
                    .and_then(|raw| serde_json::from_value::<StringOrList>(raw).ok())
                    .and_then(|paths| paths.string_list())
                    .unwrap_or_default();
                settings.remove("delegateSelectors");
                let node = DeployStep {
                    common: common.clone(),
                    manifests,
                    skip_dry_run,
                    settings,
                };
                Some(match step_type {
                    "K8sRollingDeploy" => SourceStepNode::K8sRollingDeploy(node),
                    "K8sApply" => SourceStepNode::K8sApply(node),
                    _ => SourceStepNode::HelmDeploy(node),
                })
            }
            "Wait" => self.decode::<V0WaitSpec>(spec, step_type).map(|wait| {
                SourceStepNode::Wait(WaitStep {
                    common: common.clone(),
                    duration: wait.duration.as_ref().and_then(render_scalar).unwrap_or_default(),
                })
            }),
            "Barrier" => self.decode::<V0BarrierSpec>(spec, step_type).map(|barrier| {
                SourceStepNode::Barrier(BarrierStep {
                    common: common.clone(),
                    barrier: barrier.barrier_ref,
                })
            }),
            "Queue" => self.decode::<V0QueueSpec>(spec, step_type).map(|queue| {
                SourceStepNode::Queue(QueueStep {
                    common: common.clone(),
                    key: queue.key,
                    scope: queue.scope.map(|scope| scope.to_lowercase()).unwrap_or_default(),
                })
            }),
            _ => None,
        };

        converted.unwrap_or_else(|| {
            SourceStepNode::Unknown(UnknownStep {
                common,
                kind: step.step_type.clone(),
                payload: step.spec.clone(),
            })
        })
    }
}

/// One upload per source path; several paths become a group.
fn upload_steps(common: CommonFields, upload: V0UploadSpec) -> SourceStepNode {
    let mut paths = upload
        .source_paths
        .as_ref()
        .and_then(StringOrList::string_list)
        .unwrap_or_default();
    paths.extend(upload.source_path);

    let artifact = |common: CommonFields, source: String| {
        SourceStepNode::UploadArtifact(ArtifactStep {
            common,
            source,
            destination: upload.target.clone(),
        })
    };
    if paths.len() <= 1 {
        return artifact(common, paths.pop().unwrap_or_default());
    }
    let steps = paths
        .into_iter()
        .map(|source| artifact(CommonFields::default(), source))
        .collect();
    SourceStepNode::Group(GroupStep { common, steps })
}

fn read_matrix(raw: &Map<String, Value>) -> MatrixSpec {
    let mut spec = MatrixSpec::new();
    for (axis, options) in raw {
        if MATRIX_SETTINGS.contains(&axis.as_str()) {
            continue;
        }
        let options = match options {
            Value::Array(items) => items.clone(),
            single => vec![single.clone()],
        };
        spec = spec.axis(axis.clone(), options);
    }
    if let Some(exclusions) = raw.get("exclude").and_then(Value::as_array) {
        for exclusion in exclusions.iter().filter_map(Value::as_object) {
            spec = spec.exclusion(
                exclusion
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            );
        }
    }
    spec.max_concurrency = raw
        .get("maxConcurrency")
        .and_then(render_scalar)
        .and_then(|value| value.parse().ok());
    spec
}
