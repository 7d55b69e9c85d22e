#![allow(clippy::result_large_err)]

//! CircleCI 2.1 front-end.
//!
//! Converts the first workflow: every job invocation becomes a stage, in
//! declaration order. Reusable commands and executors are expanded here by
//! substituting their `<< parameters.x >>` tokens; job parameters stay as
//! tokens and are resolved through the stage bindings during conversion.

use super::{load_yaml, object, ParsedSource, SourceParser};
use crate::core::convert::diagnostics::{Diagnostic, DiagnosticKind};
use crate::core::convert::expression::Bindings;
use crate::core::convert::flexible::{render_scalar, FlexibleValue, ShapeHint};
use crate::core::convert::matrix::MatrixSpec;
use crate::core::convert::source::{
    ApprovalStep, ArtifactStep, CacheStep, CommonFields, GroupStep, Platform, RunStep,
    RuntimeKind, SourceInput, SourcePipeline, SourceStage, SourceStepNode, StageKind, StepWhen,
    TestReportStep, UnknownStep,
};
use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, SourceFormat};
use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

const PARAMETER_TOKEN: &str = r"<<\s*parameters\.([A-Za-z0-9_\-]+)\s*>>";

/// Job-invocation keys that configure the workflow rather than bind parameters.
const RESERVED_INVOCATION_KEYS: &[&str] = &[
    "requires",
    "name",
    "context",
    "filters",
    "matrix",
    "type",
    "pre-steps",
    "post-steps",
    "serial-group",
    "override-with",
];

/// Nested command expansion deeper than this is treated as recursion.
const MAX_COMMAND_DEPTH: usize = 16;

type StringOrList = FlexibleValue<Map<String, Value>>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CircleConfig {
    parameters: IndexMap<String, CircleParameter>,
    executors: IndexMap<String, Value>,
    commands: IndexMap<String, CircleCommand>,
    jobs: IndexMap<String, Value>,
    workflows: IndexMap<String, Value>,
    orbs: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CircleParameter {
    #[serde(rename = "type")]
    param_type: Option<String>,
    default: Option<Value>,
    description: Option<String>,
    #[serde(rename = "enum")]
    options: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CircleCommand {
    parameters: IndexMap<String, CircleParameter>,
    steps: Vec<Value>,
}

/// Execution environment fields shared by jobs and named executors.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ExecutorFields {
    docker: Vec<CircleImage>,
    machine: Option<Value>,
    macos: Option<Value>,
    resource_class: Option<String>,
    working_directory: Option<String>,
    environment: IndexMap<String, Value>,
    shell: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CircleImage {
    image: String,
    name: Option<String>,
    environment: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CircleJob {
    executor: Option<Value>,
    parameters: IndexMap<String, CircleParameter>,
    steps: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CircleWorkflow {
    jobs: Vec<Value>,
    when: Option<Value>,
    unless: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CircleMatrix {
    parameters: IndexMap<String, Value>,
    exclude: Vec<IndexMap<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CircleRun {
    command: Option<Value>,
    name: Option<String>,
    environment: IndexMap<String, Value>,
    shell: Option<String>,
    working_directory: Option<String>,
    background: Option<Value>,
    when: Option<String>,
    no_output_timeout: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CircleCache {
    name: Option<String>,
    key: Option<String>,
    keys: Option<StringOrList>,
    paths: Option<StringOrList>,
    when: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CircleStore {
    name: Option<String>,
    path: Option<String>,
    destination: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CircleConditional {
    condition: Value,
    steps: Vec<Value>,
}

/// One entry of a workflow's `jobs` list.
struct JobInvocation {
    job: String,
    body: Map<String, Value>,
}

impl JobInvocation {
    fn read(raw: &Value) -> Option<Self> {
        match raw {
            Value::String(job) => Some(Self {
                job: job.clone(),
                body: Map::new(),
            }),
            Value::Object(map) if map.len() == 1 => map.iter().next().map(|(job, body)| Self {
                job: job.clone(),
                body: body.as_object().cloned().unwrap_or_default(),
            }),
            _ => None,
        }
    }

    fn stage_name(&self) -> String {
        self.body
            .get("name")
            .and_then(render_scalar)
            .unwrap_or_else(|| self.job.clone())
    }

    fn is_approval(&self) -> bool {
        self.body.get("type").and_then(Value::as_str) == Some("approval")
    }

    fn arguments(&self) -> Bindings {
        self.body
            .iter()
            .filter(|(key, _)| !RESERVED_INVOCATION_KEYS.contains(&key.as_str()))
            .filter_map(|(key, value)| render_scalar(value).map(|text| (key.clone(), text)))
            .collect()
    }
}

/// Parses CircleCI configuration files.
#[derive(Debug, Clone, Copy, Default)]
pub struct CircleParser;

impl CircleParser {
    pub fn new() -> Self {
        Self
    }
}

impl SourceParser for CircleParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::Circle
    }

    fn parse(&self, text: &str) -> Result<ParsedSource, AppError> {
        let raw = load_yaml(text)?;
        if !raw.is_object() {
            return Err(AppError::parse("CircleCI configuration must be a mapping"));
        }
        let config: CircleConfig = decode(&raw, "configuration")?;
        let mut reader = Reader::new(&config)?;
        let pipeline = reader.read_pipeline()?;
        tracing::debug!(
            stages = pipeline.stages.len(),
            diagnostics = reader.diagnostics.len(),
            "parsed CircleCI configuration"
        );
        Ok(ParsedSource {
            pipeline,
            diagnostics: reader.diagnostics,
        })
    }
}

fn decode<T: DeserializeOwned>(raw: &Value, what: &str) -> Result<T, AppError> {
    serde_json::from_value(raw.clone()).map_err(|err| {
        AppError::new(
            ErrorCategory::ParseError,
            format!("invalid {}: {}", what, err),
        )
        .with_code("CONV-PARSE-002")
        .with_context("section", what)
    })
}

fn env_map(raw: &IndexMap<String, Value>) -> IndexMap<String, String> {
    raw.iter()
        .filter_map(|(key, value)| render_scalar(value).map(|text| (key.clone(), text)))
        .collect()
}

fn parameter_defaults(parameters: &IndexMap<String, CircleParameter>) -> Bindings {
    parameters
        .iter()
        .filter_map(|(name, parameter)| {
            parameter
                .default
                .as_ref()
                .and_then(render_scalar)
                .map(|text| (name.clone(), text))
        })
        .collect()
}

fn input_type(parameter: &CircleParameter) -> &'static str {
    match parameter.param_type.as_deref() {
        Some("boolean") => "boolean",
        Some("integer") => "number",
        _ => "string",
    }
}

/// Map a CircleCI shell command line to a target shell keyword.
fn shell_keyword(shell: &str) -> String {
    let program = shell
        .split_whitespace()
        .next()
        .and_then(|path| path.rsplit('/').next())
        .unwrap_or(shell);
    match program {
        "bash" | "sh" | "pwsh" | "powershell" | "python" => program.to_string(),
        "powershell.exe" => "powershell".to_string(),
        other => other.to_string(),
    }
}

fn step_when(when: Option<&str>) -> Option<StepWhen> {
    match when? {
        "always" => Some(StepWhen::Always),
        "on_fail" => Some(StepWhen::OnFailure),
        "on_success" => Some(StepWhen::OnSuccess),
        other => Some(StepWhen::Expression(other.to_string())),
    }
}

fn condition_literal(text: &str) -> String {
    if text.contains("<<") || text.contains("<+") {
        text.trim().to_string()
    } else {
        serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
    }
}

/// Render a CircleCI logic statement as a target condition expression.
fn render_condition(value: &Value) -> String {
    let join = |items: &[Value], operator: &str| {
        items
            .iter()
            .map(|item| format!("({})", render_condition(item)))
            .collect::<Vec<_>>()
            .join(operator)
    };
    match value {
        Value::Null => "false".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => condition_literal(text),
        Value::Array(items) => join(items, " && "),
        Value::Object(map) => {
            let Some((operator, operand)) = map.iter().next().filter(|_| map.len() == 1) else {
                return value.to_string();
            };
            let operands = operand.as_array().map(Vec::as_slice).unwrap_or_default();
            match operator.as_str() {
                "and" => join(operands, " && "),
                "or" => join(operands, " || "),
                "not" => format!("!({})", render_condition(operand)),
                "equal" => operands
                    .iter()
                    .map(render_condition)
                    .collect::<Vec<_>>()
                    .join(" == "),
                "matches" => {
                    let pattern = operand.get("pattern").and_then(Value::as_str).unwrap_or("");
                    let subject = operand.get("value").map(render_condition).unwrap_or_default();
                    format!("{} =~ {}", subject, condition_literal(pattern))
                }
                _ => value.to_string(),
            }
        }
    }
}

/// Resolved execution environment of one job.
#[derive(Debug, Default)]
struct Environment {
    runtime: Option<RuntimeKind>,
    platform: Option<Platform>,
    image: Option<String>,
    services: Vec<CircleImage>,
    shell: Option<String>,
    working_directory: Option<String>,
    variables: IndexMap<String, String>,
}

impl Environment {
    fn from_fields(fields: ExecutorFields) -> Self {
        let arch = if fields
            .resource_class
            .as_deref()
            .is_some_and(|class| class.contains("arm"))
        {
            "arm64"
        } else {
            "amd64"
        };
        let platform = |os: &str, arch: &str| {
            Some(Platform {
                os: Some(os.to_string()),
                arch: Some(arch.to_string()),
            })
        };

        let mut variables = env_map(&fields.environment);
        let mut images = fields.docker.into_iter();
        let primary = images.next();
        let (runtime, platform) = if let Some(primary) = primary.as_ref() {
            for (key, value) in env_map(&primary.environment) {
                variables.entry(key).or_insert(value);
            }
            (Some(RuntimeKind::Cloud), platform("linux", arch))
        } else if fields.machine.is_some() {
            (Some(RuntimeKind::Machine), platform("linux", arch))
        } else if fields.macos.is_some() {
            (Some(RuntimeKind::Cloud), platform("macos", "arm64"))
        } else {
            (None, None)
        };

        Self {
            runtime,
            platform,
            image: primary.map(|image| image.image),
            services: images.collect(),
            shell: fields.shell.as_deref().map(shell_keyword),
            working_directory: fields.working_directory,
            variables,
        }
    }

    /// Fill run steps that leave image, shell or directory unset.
    fn apply(&self, steps: &mut [SourceStepNode]) {
        for step in steps {
            match step {
                SourceStepNode::Run(run) => {
                    if run.image.is_none() {
                        run.image = self.image.clone();
                    }
                    if run.shell.is_none() {
                        run.shell = self.shell.clone();
                    }
                    if run.working_directory.is_none() {
                        run.working_directory = self.working_directory.clone();
                    }
                }
                SourceStepNode::Group(group) | SourceStepNode::Parallel(group) => {
                    self.apply(&mut group.steps)
                }
                _ => {}
            }
        }
    }

    fn service_steps(&self) -> Vec<SourceStepNode> {
        self.services
            .iter()
            .map(|service| {
                let name = service.name.clone().unwrap_or_else(|| {
                    let base = service.image.rsplit('/').next().unwrap_or(&service.image);
                    base.split(':').next().unwrap_or(base).to_string()
                });
                SourceStepNode::Background(RunStep {
                    common: CommonFields {
                        name: Some(name),
                        environment: env_map(&service.environment),
                        ..CommonFields::default()
                    },
                    image: Some(service.image.clone()),
                    ..RunStep::default()
                })
            })
            .collect()
    }
}

struct Reader<'c> {
    config: &'c CircleConfig,
    parameter_token: Regex,
    diagnostics: Vec<Diagnostic>,
    /// Set when the job being read contains a `checkout` step.
    clone: bool,
    depth: usize,
    location: String,
}

impl<'c> Reader<'c> {
    fn new(config: &'c CircleConfig) -> Result<Self, AppError> {
        let parameter_token = Regex::new(PARAMETER_TOKEN).map_err(|err| {
            AppError::new(
                ErrorCategory::InternalError,
                format!("invalid parameter pattern: {}", err),
            )
        })?;
        Ok(Self {
            config,
            parameter_token,
            diagnostics: Vec::new(),
            clone: false,
            depth: 0,
            location: String::new(),
        })
    }

    fn warn(&mut self, code: &str, kind: DiagnosticKind, message: String) {
        let mut diagnostic = Diagnostic::warning(code, kind, message);
        if !self.location.is_empty() {
            diagnostic = diagnostic.at(self.location.clone());
        }
        self.diagnostics.push(diagnostic);
    }

    fn read_pipeline(&mut self) -> Result<SourcePipeline, AppError> {
        let config = self.config;
        if !config.orbs.is_empty() {
            let names: Vec<&str> = config.orbs.keys().map(String::as_str).collect();
            self.warn(
                "CONV-PARSE-008",
                DiagnosticKind::UnsupportedConstruct,
                format!("orbs are not expanded: {}", names.join(", ")),
            );
        }

        let inputs = config
            .parameters
            .iter()
            .map(|(name, parameter)| {
                (
                    name.clone(),
                    SourceInput {
                        input_type: input_type(parameter).to_string(),
                        default: parameter.default.clone(),
                        description: parameter.description.clone(),
                        options: parameter.options.clone(),
                    },
                )
            })
            .collect();

        let workflows: Vec<(&String, &Value)> = config
            .workflows
            .iter()
            .filter(|(_, workflow)| workflow.is_object())
            .collect();

        let stages = match workflows.split_first() {
            Some(((name, workflow), rest)) => {
                for (skipped, _) in rest {
                    self.warn(
                        "CONV-PARSE-004",
                        DiagnosticKind::UnsupportedConstruct,
                        format!("workflow '{}' skipped; only '{}' is converted", skipped, name),
                    );
                }
                let workflow: CircleWorkflow = decode(workflow, "workflow")?;
                self.read_workflow(&workflow)?
            }
            None if config.jobs.contains_key("build") => {
                let invocation = JobInvocation {
                    job: "build".to_string(),
                    body: Map::new(),
                };
                self.read_stage(&invocation, None)?.into_iter().collect()
            }
            None => {
                return Err(AppError::parse(
                    "configuration defines no workflows and no 'build' job",
                ))
            }
        };

        Ok(SourcePipeline {
            name: None,
            inputs,
            stages,
        })
    }

    fn read_workflow(&mut self, workflow: &CircleWorkflow) -> Result<Vec<SourceStage>, AppError> {
        let condition = match (&workflow.when, &workflow.unless) {
            (Some(when), _) => Some(render_condition(when)),
            (None, Some(unless)) => Some(format!("!({})", render_condition(unless))),
            (None, None) => None,
        };

        let mut stages = Vec::new();
        for raw in &workflow.jobs {
            let Some(invocation) = JobInvocation::read(raw) else {
                self.warn(
                    "CONV-SHAPE-001",
                    DiagnosticKind::UnsupportedShape,
                    format!("workflow job entry is not a name or single-key map: {}", raw),
                );
                continue;
            };
            if let Some(stage) = self.read_stage(&invocation, condition.clone())? {
                stages.push(stage);
            }
        }
        Ok(stages)
    }

    fn read_stage(
        &mut self,
        invocation: &JobInvocation,
        condition: Option<String>,
    ) -> Result<Option<SourceStage>, AppError> {
        let name = invocation.stage_name();
        self.location = name.clone();

        if invocation.is_approval() {
            let approval = SourceStepNode::Approval(ApprovalStep {
                common: CommonFields::named(name.clone()),
                message: Some(format!("Approve {}", name)),
                ..ApprovalStep::default()
            });
            return Ok(Some(SourceStage {
                kind: StageKind::Custom,
                condition,
                ..SourceStage::new(name).with_step(approval)
            }));
        }

        let config = self.config;
        let Some(raw_job) = config.jobs.get(&invocation.job) else {
            self.warn(
                "CONV-PARSE-006",
                DiagnosticKind::UnsupportedConstruct,
                format!("job '{}' is not defined in this configuration", invocation.job),
            );
            return Ok(None);
        };
        let job: CircleJob = decode(raw_job, "job")?;
        let environment = self.resolve_environment(raw_job, &job)?;

        let mut bindings = parameter_defaults(&job.parameters);
        bindings.extend(invocation.arguments());

        self.clone = false;
        let mut steps = environment.service_steps();
        steps.extend(self.read_invocation_steps(invocation, "pre-steps"));
        steps.extend(self.read_steps(&job.steps));
        steps.extend(self.read_invocation_steps(invocation, "post-steps"));
        environment.apply(&mut steps);

        let matrix = match invocation.body.get("matrix") {
            Some(raw) => Some(self.read_matrix(raw)?),
            None => None,
        };

        Ok(Some(SourceStage {
            name,
            kind: StageKind::Ci,
            runtime: environment.runtime,
            platform: environment.platform,
            clone: self.clone,
            environment: environment.variables,
            bindings,
            matrix,
            condition,
            inherit_from: None,
            steps,
        }))
    }

    fn read_invocation_steps(&mut self, invocation: &JobInvocation, key: &str) -> Vec<SourceStepNode> {
        match invocation.body.get(key).and_then(Value::as_array) {
            Some(raw) => self.read_steps(raw),
            None => Vec::new(),
        }
    }

    fn read_matrix(&mut self, raw: &Value) -> Result<MatrixSpec, AppError> {
        let matrix: CircleMatrix = decode(raw, "matrix")?;
        let mut spec = MatrixSpec::new();
        for (axis, options) in matrix.parameters {
            let options = match options {
                Value::Array(items) => items,
                single => vec![single],
            };
            spec = spec.axis(axis, options);
        }
        for exclusion in matrix.exclude {
            spec = spec.exclusion(exclusion);
        }
        Ok(spec)
    }

    fn resolve_environment(&mut self, raw_job: &Value, job: &CircleJob) -> Result<Environment, AppError> {
        let own: ExecutorFields = decode(raw_job, "job executor")?;
        let Some(reference) = job.executor.as_ref() else {
            return Ok(Environment::from_fields(own));
        };

        let (name, arguments) = match reference {
            Value::String(name) => (name.clone(), Bindings::new()),
            Value::Object(map) => {
                let name = map.get("name").and_then(render_scalar).unwrap_or_default();
                let arguments = map
                    .iter()
                    .filter(|(key, _)| key.as_str() != "name")
                    .filter_map(|(key, value)| render_scalar(value).map(|text| (key.clone(), text)))
                    .collect();
                (name, arguments)
            }
            other => {
                self.warn(
                    "CONV-SHAPE-001",
                    DiagnosticKind::UnsupportedShape,
                    format!("executor reference has an unsupported shape: {}", other),
                );
                return Ok(Environment::from_fields(own));
            }
        };

        let config = self.config;
        let Some(definition) = config.executors.get(&name) else {
            self.warn(
                "CONV-PARSE-005",
                DiagnosticKind::UnsupportedConstruct,
                format!("executor '{}' is not defined in this configuration", name),
            );
            return Ok(Environment::from_fields(own));
        };

        let parameters: IndexMap<String, CircleParameter> = match object(definition, "parameters") {
            Some(_) => decode(&definition["parameters"], "executor parameters")?,
            None => IndexMap::new(),
        };
        let mut values = parameter_defaults(&parameters);
        values.extend(arguments);
        let mut definition = definition.clone();
        self.substitute(&mut definition, &values);

        let mut fields: ExecutorFields = decode(&definition, "executor")?;
        fields.environment.extend(own.environment);
        if own.resource_class.is_some() {
            fields.resource_class = own.resource_class;
        }
        if own.working_directory.is_some() {
            fields.working_directory = own.working_directory;
        }
        if own.shell.is_some() {
            fields.shell = own.shell;
        }
        Ok(Environment::from_fields(fields))
    }

    /// Replace `<< parameters.x >>` tokens bound in `values`; others stay.
    fn substitute(&self, value: &mut Value, values: &Bindings) {
        match value {
            Value::String(text) => {
                let replaced = self.parameter_token.replace_all(text, |caps: &Captures| {
                    let whole = caps.get(0).map_or("", |m| m.as_str());
                    caps.get(1)
                        .and_then(|name| values.get(name.as_str()))
                        .cloned()
                        .unwrap_or_else(|| whole.to_string())
                });
                *text = replaced.into_owned();
            }
            Value::Array(items) => {
                for item in items {
                    self.substitute(item, values);
                }
            }
            Value::Object(map) => {
                for item in map.values_mut() {
                    self.substitute(item, values);
                }
            }
            _ => {}
        }
    }

    fn read_steps(&mut self, raw: &[Value]) -> Vec<SourceStepNode> {
        raw.iter().filter_map(|step| self.read_step(step)).collect()
    }

    fn read_step(&mut self, raw: &Value) -> Option<SourceStepNode> {
        let null = Value::Null;
        let (kind, body) = match raw {
            Value::String(kind) => (kind.as_str(), &null),
            Value::Object(map) if map.len() == 1 => map.iter().next().map(|(k, v)| (k.as_str(), v))?,
            other => {
                self.warn(
                    "CONV-SHAPE-001",
                    DiagnosticKind::UnsupportedShape,
                    format!("step is not a name or single-key map: {}", other),
                );
                return None;
            }
        };

        let config = self.config;
        match kind {
            "checkout" => {
                self.clone = true;
                None
            }
            "run" => self.read_run(body),
            "save_cache" => self.read_cache(kind, body, true),
            "restore_cache" => self.read_cache(kind, body, false),
            "store_artifacts" => {
                let store: CircleStore = self.read_body(kind, body)?;
                Some(SourceStepNode::UploadArtifact(ArtifactStep {
                    common: CommonFields {
                        name: store.name,
                        ..CommonFields::default()
                    },
                    source: store.path.unwrap_or_default(),
                    destination: store.destination,
                }))
            }
            "store_test_results" => {
                let store: CircleStore = self.read_body(kind, body)?;
                Some(SourceStepNode::UploadTestReport(TestReportStep {
                    common: CommonFields {
                        name: store.name,
                        ..CommonFields::default()
                    },
                    paths: store.path.into_iter().collect(),
                }))
            }
            "when" | "unless" => {
                let conditional: CircleConditional = self.read_body(kind, body)?;
                let rendered = render_condition(&conditional.condition);
                let condition = if kind == "unless" {
                    format!("!({})", rendered)
                } else {
                    rendered
                };
                Some(SourceStepNode::Group(GroupStep {
                    common: CommonFields {
                        when: Some(StepWhen::Expression(condition)),
                        ..CommonFields::default()
                    },
                    steps: self.read_steps(&conditional.steps),
                }))
            }
            name if config.commands.contains_key(name) => self.inline_command(name, body),
            _ => Some(SourceStepNode::Unknown(UnknownStep {
                common: CommonFields {
                    name: body.get("name").and_then(render_scalar),
                    ..CommonFields::default()
                },
                kind: kind.to_string(),
                payload: body.clone(),
            })),
        }
    }

    fn read_body<T: DeserializeOwned + Default>(&mut self, kind: &str, body: &Value) -> Option<T> {
        if body.is_null() {
            return Some(T::default());
        }
        match serde_json::from_value(body.clone()) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                self.warn(
                    "CONV-SHAPE-001",
                    DiagnosticKind::UnsupportedShape,
                    format!("'{}' step has an unsupported shape: {}", kind, err),
                );
                None
            }
        }
    }

    fn read_run(&mut self, body: &Value) -> Option<SourceStepNode> {
        let run = match FlexibleValue::<CircleRun>::decode(body, ShapeHint::String) {
            Ok(FlexibleValue::Literal(command)) => CircleRun {
                command: Some(Value::String(command.render())),
                ..CircleRun::default()
            },
            Ok(FlexibleValue::Structured(run)) => run,
            Ok(FlexibleValue::Sequence(_)) | Err(_) => {
                self.warn(
                    "CONV-SHAPE-001",
                    DiagnosticKind::UnsupportedShape,
                    "'run' step must be a command string or a map".to_string(),
                );
                return None;
            }
        };

        let background = run
            .background
            .as_ref()
            .and_then(render_scalar)
            .is_some_and(|flag| flag == "true");
        let step = RunStep {
            common: CommonFields {
                name: run.name,
                when: step_when(run.when.as_deref()),
                timeout: run.no_output_timeout.as_ref().and_then(render_scalar),
                environment: env_map(&run.environment),
                delegate_selectors: Vec::new(),
            },
            command: run.command.as_ref().and_then(render_scalar),
            image: None,
            shell: run.shell.as_deref().map(shell_keyword),
            working_directory: run.working_directory,
            report_paths: Vec::new(),
        };
        Some(if background {
            SourceStepNode::Background(step)
        } else {
            SourceStepNode::Run(step)
        })
    }

    fn read_cache(&mut self, kind: &str, body: &Value, save: bool) -> Option<SourceStepNode> {
        let cache: CircleCache = self.read_body(kind, body)?;
        let key = cache
            .key
            .or_else(|| {
                cache
                    .keys
                    .as_ref()
                    .and_then(StringOrList::string_list)
                    .and_then(|keys| keys.into_iter().next())
            })
            .unwrap_or_default();
        let step = CacheStep {
            common: CommonFields {
                name: cache.name,
                when: step_when(cache.when.as_deref()),
                ..CommonFields::default()
            },
            key,
            paths: cache
                .paths
                .as_ref()
                .and_then(StringOrList::string_list)
                .unwrap_or_default(),
        };
        Some(if save {
            SourceStepNode::SaveCache(step)
        } else {
            SourceStepNode::RestoreCache(step)
        })
    }

    fn inline_command(&mut self, name: &str, body: &Value) -> Option<SourceStepNode> {
        let config = self.config;
        let command = config.commands.get(name)?;
        if self.depth >= MAX_COMMAND_DEPTH {
            self.warn(
                "CONV-PARSE-007",
                DiagnosticKind::UnsupportedConstruct,
                format!("command '{}' nests deeper than {} levels", name, MAX_COMMAND_DEPTH),
            );
            return None;
        }

        let mut values = parameter_defaults(&command.parameters);
        if let Some(arguments) = body.as_object() {
            values.extend(
                arguments
                    .iter()
                    .filter_map(|(key, value)| render_scalar(value).map(|text| (key.clone(), text))),
            );
        }
        let mut steps = Value::Array(command.steps.clone());
        self.substitute(&mut steps, &values);

        self.depth += 1;
        let steps = match &steps {
            Value::Array(items) => self.read_steps(items),
            _ => Vec::new(),
        };
        self.depth -= 1;

        Some(SourceStepNode::Group(GroupStep {
            common: CommonFields::named(name),
            steps,
        }))
    }
}
