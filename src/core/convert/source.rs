//! Typed source tree produced by the front-ends.
//!
//! Every step payload embeds [`CommonFields`] and exposes it through
//! [`CommonAccess`], so the dispatcher maps shared fields (name, condition,
//! timeout, delegates) without knowing the concrete payload type.

use crate::core::convert::expression::Bindings;
use crate::core::convert::flexible::Settings;
use crate::core::convert::matrix::MatrixSpec;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// Kind tags used by the converter registry.
pub mod kinds {
    pub const RUN: &str = "run";
    pub const BACKGROUND: &str = "background";
    pub const PLUGIN: &str = "plugin";
    pub const APPROVAL: &str = "approval";
    pub const SAVE_CACHE: &str = "save-cache";
    pub const RESTORE_CACHE: &str = "restore-cache";
    pub const UPLOAD_ARTIFACT: &str = "upload-artifact";
    pub const UPLOAD_TEST_REPORT: &str = "upload-test-report";
    pub const K8S_ROLLING_DEPLOY: &str = "k8s-rolling-deploy";
    pub const K8S_APPLY: &str = "k8s-apply";
    pub const HELM_DEPLOY: &str = "helm-deploy";
    pub const WAIT: &str = "wait";
    pub const BARRIER: &str = "barrier";
    pub const QUEUE: &str = "queue";
    pub const GROUP: &str = "group";
    pub const PARALLEL: &str = "parallel";
}

/// Root of a decoded source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourcePipeline {
    pub name: Option<String>,
    pub inputs: IndexMap<String, SourceInput>,
    pub stages: Vec<SourceStage>,
}

/// Pipeline-level parameter declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInput {
    pub input_type: String,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub options: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    #[default]
    Ci,
    Deployment,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Cloud,
    Machine,
    Kubernetes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub os: Option<String>,
    pub arch: Option<String>,
}

/// One job / stage of the source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceStage {
    pub name: String,
    pub kind: StageKind,
    pub runtime: Option<RuntimeKind>,
    pub platform: Option<Platform>,
    pub clone: bool,
    pub environment: IndexMap<String, String>,
    /// Parameter values supplied where the job is invoked.
    pub bindings: Bindings,
    pub matrix: Option<MatrixSpec>,
    pub condition: Option<String>,
    /// Index of an earlier stage whose runtime and platform this stage reuses.
    pub inherit_from: Option<usize>,
    pub steps: Vec<SourceStepNode>,
}

impl SourceStage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_step(mut self, step: SourceStepNode) -> Self {
        self.steps.push(step);
        self
    }
}

/// When a step runs relative to the outcome of earlier steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepWhen {
    Always,
    OnSuccess,
    OnFailure,
    /// Condition text, possibly holding source template tokens.
    Expression(String),
}

/// Fields every step payload carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommonFields {
    pub name: Option<String>,
    pub when: Option<StepWhen>,
    pub timeout: Option<String>,
    pub environment: IndexMap<String, String>,
    pub delegate_selectors: Vec<String>,
}

impl CommonFields {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Shared-capability accessor implemented by every payload type.
pub trait CommonAccess {
    fn common(&self) -> &CommonFields;
    fn common_mut(&mut self) -> &mut CommonFields;
}

macro_rules! impl_common_access {
    ($($payload:ty),+ $(,)?) => {
        $(
            impl CommonAccess for $payload {
                fn common(&self) -> &CommonFields {
                    &self.common
                }

                fn common_mut(&mut self) -> &mut CommonFields {
                    &mut self.common
                }
            }
        )+
    };
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStep {
    pub common: CommonFields,
    pub command: Option<String>,
    pub image: Option<String>,
    pub shell: Option<String>,
    pub working_directory: Option<String>,
    /// JUnit report globs published after the command.
    pub report_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PluginStep {
    pub common: CommonFields,
    pub image: String,
    pub settings: Settings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApprovalStep {
    pub common: CommonFields,
    pub message: Option<String>,
    pub approvers: Vec<String>,
    pub min_approvers: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStep {
    pub common: CommonFields,
    pub key: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArtifactStep {
    pub common: CommonFields,
    pub source: String,
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TestReportStep {
    pub common: CommonFields,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeployStep {
    pub common: CommonFields,
    pub manifests: Vec<String>,
    pub skip_dry_run: bool,
    pub settings: Settings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WaitStep {
    pub common: CommonFields,
    pub duration: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BarrierStep {
    pub common: CommonFields,
    pub barrier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStep {
    pub common: CommonFields,
    pub key: String,
    pub scope: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupStep {
    pub common: CommonFields,
    pub steps: Vec<SourceStepNode>,
}

/// A step whose kind no front-end mapping recognizes; kept opaque.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnknownStep {
    pub common: CommonFields,
    pub kind: String,
    pub payload: Value,
}

impl_common_access!(
    RunStep,
    PluginStep,
    ApprovalStep,
    CacheStep,
    ArtifactStep,
    TestReportStep,
    DeployStep,
    WaitStep,
    BarrierStep,
    QueueStep,
    GroupStep,
    UnknownStep,
);

/// Source step variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SourceStepNode {
    Run(RunStep),
    Background(RunStep),
    Plugin(PluginStep),
    Approval(ApprovalStep),
    SaveCache(CacheStep),
    RestoreCache(CacheStep),
    UploadArtifact(ArtifactStep),
    UploadTestReport(TestReportStep),
    K8sRollingDeploy(DeployStep),
    K8sApply(DeployStep),
    HelmDeploy(DeployStep),
    Wait(WaitStep),
    Barrier(BarrierStep),
    Queue(QueueStep),
    Group(GroupStep),
    Parallel(GroupStep),
    Unknown(UnknownStep),
}

impl SourceStepNode {
    /// Registry lookup tag.
    pub fn kind(&self) -> &str {
        match self {
            SourceStepNode::Run(_) => kinds::RUN,
            SourceStepNode::Background(_) => kinds::BACKGROUND,
            SourceStepNode::Plugin(_) => kinds::PLUGIN,
            SourceStepNode::Approval(_) => kinds::APPROVAL,
            SourceStepNode::SaveCache(_) => kinds::SAVE_CACHE,
            SourceStepNode::RestoreCache(_) => kinds::RESTORE_CACHE,
            SourceStepNode::UploadArtifact(_) => kinds::UPLOAD_ARTIFACT,
            SourceStepNode::UploadTestReport(_) => kinds::UPLOAD_TEST_REPORT,
            SourceStepNode::K8sRollingDeploy(_) => kinds::K8S_ROLLING_DEPLOY,
            SourceStepNode::K8sApply(_) => kinds::K8S_APPLY,
            SourceStepNode::HelmDeploy(_) => kinds::HELM_DEPLOY,
            SourceStepNode::Wait(_) => kinds::WAIT,
            SourceStepNode::Barrier(_) => kinds::BARRIER,
            SourceStepNode::Queue(_) => kinds::QUEUE,
            SourceStepNode::Group(_) => kinds::GROUP,
            SourceStepNode::Parallel(_) => kinds::PARALLEL,
            SourceStepNode::Unknown(step) => &step.kind,
        }
    }

    fn payload(&self) -> &dyn CommonAccess {
        match self {
            SourceStepNode::Run(step) | SourceStepNode::Background(step) => step,
            SourceStepNode::Plugin(step) => step,
            SourceStepNode::Approval(step) => step,
            SourceStepNode::SaveCache(step) | SourceStepNode::RestoreCache(step) => step,
            SourceStepNode::UploadArtifact(step) => step,
            SourceStepNode::UploadTestReport(step) => step,
            SourceStepNode::K8sRollingDeploy(step)
            | SourceStepNode::K8sApply(step)
            | SourceStepNode::HelmDeploy(step) => step,
            SourceStepNode::Wait(step) => step,
            SourceStepNode::Barrier(step) => step,
            SourceStepNode::Queue(step) => step,
            SourceStepNode::Group(step) | SourceStepNode::Parallel(step) => step,
            SourceStepNode::Unknown(step) => step,
        }
    }

    /// Opaque payload used for placeholders and diagnostics.
    pub fn raw_payload(&self) -> Value {
        match self {
            SourceStepNode::Unknown(step) => step.payload.clone(),
            other => serde_json::to_value(other).unwrap_or(Value::Null),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.common().name.as_deref()
    }
}

impl CommonAccess for SourceStepNode {
    fn common(&self) -> &CommonFields {
        self.payload().common()
    }

    fn common_mut(&mut self) -> &mut CommonFields {
        match self {
            SourceStepNode::Run(step) | SourceStepNode::Background(step) => step.common_mut(),
            SourceStepNode::Plugin(step) => step.common_mut(),
            SourceStepNode::Approval(step) => step.common_mut(),
            SourceStepNode::SaveCache(step) | SourceStepNode::RestoreCache(step) => {
                step.common_mut()
            }
            SourceStepNode::UploadArtifact(step) => step.common_mut(),
            SourceStepNode::UploadTestReport(step) => step.common_mut(),
            SourceStepNode::K8sRollingDeploy(step)
            | SourceStepNode::K8sApply(step)
            | SourceStepNode::HelmDeploy(step) => step.common_mut(),
            SourceStepNode::Wait(step) => step.common_mut(),
            SourceStepNode::Barrier(step) => step.common_mut(),
            SourceStepNode::Queue(step) => step.common_mut(),
            SourceStepNode::Group(step) | SourceStepNode::Parallel(step) => step.common_mut(),
            SourceStepNode::Unknown(step) => step.common_mut(),
        }
    }
}
