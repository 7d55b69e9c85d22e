#![allow(clippy::result_large_err)]

use crate::core::convert::context::ConversionContext;
use crate::core::convert::dispatcher::{kind_mismatch, StepConverter, StepDispatcher};
use crate::core::convert::source::{kinds, SourceStepNode};
use crate::core::convert::target::{DeploySpec, TargetStep, TargetStepNode};
use crate::core::error::AppError;

/// Kubernetes and Helm deployment steps share one payload shape.
pub struct DeployConverter {
    kind: &'static str,
}

impl DeployConverter {
    pub fn rolling() -> Self {
        Self {
            kind: kinds::K8S_ROLLING_DEPLOY,
        }
    }

    pub fn apply() -> Self {
        Self {
            kind: kinds::K8S_APPLY,
        }
    }

    pub fn helm() -> Self {
        Self {
            kind: kinds::HELM_DEPLOY,
        }
    }
}

impl StepConverter for DeployConverter {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        _dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError> {
        let step = match node {
            SourceStepNode::K8sRollingDeploy(step)
            | SourceStepNode::K8sApply(step)
            | SourceStepNode::HelmDeploy(step)
                if node.kind() == self.kind =>
            {
                step
            }
            _ => return Err(kind_mismatch(self.kind, node)),
        };

        let spec = DeploySpec {
            manifests: ctx.rewrite_all(&step.manifests),
            skip_dry_run: step.skip_dry_run,
            settings: ctx.rewrite_settings(&step.settings),
        };
        let target = match node {
            SourceStepNode::K8sRollingDeploy(_) => TargetStep::K8sRollingDeploy(spec),
            SourceStepNode::K8sApply(_) => TargetStep::K8sApply(spec),
            _ => TargetStep::HelmDeploy(spec),
        };
        Ok(Some(TargetStepNode::new(target)))
    }
}
