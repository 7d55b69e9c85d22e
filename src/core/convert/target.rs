//! Target pipeline schema (version 1) as emitted YAML.

use crate::core::convert::flexible::Settings;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// Image of the plugin used for cache save and restore steps.
pub const CACHE_PLUGIN_IMAGE: &str = "plugins/cache";

pub const TARGET_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetDocument {
    pub version: u32,
    pub kind: String,
    pub spec: TargetPipeline,
}

impl TargetDocument {
    pub fn pipeline(spec: TargetPipeline) -> Self {
        Self {
            version: TARGET_SCHEMA_VERSION,
            kind: "pipeline".to_string(),
            spec,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TargetPipeline {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, TargetInput>,
    pub stages: Vec<TargetStage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetInput {
    #[serde(rename = "type")]
    pub input_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStage {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub stage_type: String,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StageStrategy>,
    pub spec: StageSpec,
}

/// Records the matrix combination a stage was expanded from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageStrategy {
    pub matrix: IndexMap<String, Value>,
    #[serde(rename = "max-parallel", skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clone: Option<CloneSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformSpec>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub envs: IndexMap<String, String>,
    pub steps: Vec<TargetStepNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloneSpec {
    pub disabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlatformSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

/// Stage-level cache declaration replacing an explicit save/restore pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheBlock {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStepNode {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub delegate: Vec<String>,
    #[serde(flatten)]
    pub step: TargetStep,
}

impl TargetStepNode {
    /// Node without an identifier; the dispatcher allocates one.
    pub fn new(step: TargetStep) -> Self {
        Self {
            id: String::new(),
            name: None,
            when: None,
            timeout: None,
            delegate: Vec::new(),
            step,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "spec")]
pub enum TargetStep {
    #[serde(rename = "run")]
    Run(RunSpec),
    #[serde(rename = "background")]
    Background(RunSpec),
    #[serde(rename = "plugin")]
    Plugin(PluginSpec),
    #[serde(rename = "approval")]
    Approval(ApprovalSpec),
    #[serde(rename = "wait")]
    Wait(WaitSpec),
    #[serde(rename = "barrier")]
    Barrier(BarrierSpec),
    #[serde(rename = "queue")]
    Queue(QueueSpec),
    #[serde(rename = "k8s-rolling-deploy")]
    K8sRollingDeploy(DeploySpec),
    #[serde(rename = "k8s-apply")]
    K8sApply(DeploySpec),
    #[serde(rename = "helm-deploy")]
    HelmDeploy(DeploySpec),
    #[serde(rename = "group")]
    Group(GroupSpec),
    #[serde(rename = "parallel")]
    Parallel(GroupSpec),
    /// Placeholder for a construct with no conversion.
    #[serde(rename = "template")]
    Template(TemplateSpec),
}

impl TargetStep {
    pub fn kind(&self) -> &'static str {
        match self {
            TargetStep::Run(_) => "run",
            TargetStep::Background(_) => "background",
            TargetStep::Plugin(_) => "plugin",
            TargetStep::Approval(_) => "approval",
            TargetStep::Wait(_) => "wait",
            TargetStep::Barrier(_) => "barrier",
            TargetStep::Queue(_) => "queue",
            TargetStep::K8sRollingDeploy(_) => "k8s-rolling-deploy",
            TargetStep::K8sApply(_) => "k8s-apply",
            TargetStep::HelmDeploy(_) => "helm-deploy",
            TargetStep::Group(_) => "group",
            TargetStep::Parallel(_) => "parallel",
            TargetStep::Template(_) => "template",
        }
    }

    /// Child steps of a group or parallel node.
    pub fn children(&self) -> Option<&[TargetStepNode]> {
        match self {
            TargetStep::Group(group) | TargetStep::Parallel(group) => Some(&group.steps),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub envs: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reports: Option<ReportSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSpec {
    #[serde(rename = "type")]
    pub report_type: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheRole {
    Save,
    Restore,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PluginSpec {
    pub image: String,
    #[serde(rename = "with", skip_serializing_if = "Settings::is_empty")]
    pub settings: Settings,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub envs: IndexMap<String, String>,
}

impl PluginSpec {
    /// Whether this plugin step saves or restores the cache plugin state.
    pub fn cache_role(&self) -> Option<CacheRole> {
        if self.image != CACHE_PLUGIN_IMAGE {
            return None;
        }
        if self.settings.get_bool("rebuild") == Some(true) {
            Some(CacheRole::Save)
        } else if self.settings.get_bool("restore") == Some(true) {
            Some(CacheRole::Restore)
        } else {
            None
        }
    }

    pub fn cache_key(&self) -> Option<String> {
        self.settings.get_string("cache_key")
    }

    pub fn cache_paths(&self) -> Vec<String> {
        self.settings
            .get("mount")
            .map(|mount| match mount {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
                Value::String(path) => vec![path.clone()],
                _ => Vec::new(),
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApprovalSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub approvers: Vec<String>,
    #[serde(rename = "min-approvers", skip_serializing_if = "Option::is_none")]
    pub min_approvers: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitSpec {
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BarrierSpec {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSpec {
    pub key: String,
    pub scope: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeploySpec {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<String>,
    #[serde(rename = "skip-dry-run", skip_serializing_if = "std::ops::Not::not")]
    pub skip_dry_run: bool,
    #[serde(rename = "with", skip_serializing_if = "Settings::is_empty")]
    pub settings: Settings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupSpec {
    pub steps: Vec<TargetStepNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateSpec {
    pub uses: String,
    #[serde(rename = "with", skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}
