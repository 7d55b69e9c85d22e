#![allow(clippy::result_large_err)]

use crate::core::convert::context::ConversionContext;
use crate::core::convert::dispatcher::{is_literal, kind_mismatch, StepConverter, StepDispatcher};
use crate::core::convert::source::{kinds, GroupStep, SourceStepNode, StepWhen};
use crate::core::convert::target::{GroupSpec, TargetStep, TargetStepNode};
use crate::core::error::AppError;

/// Children of a group, or `None` when the group is statically empty.
fn convert_children(
    group: &GroupStep,
    ctx: &mut ConversionContext<'_>,
    dispatcher: &StepDispatcher,
) -> Option<GroupSpec> {
    if let Some(StepWhen::Expression(condition)) = &group.common.when {
        let resolved = ctx.rewriter().rewrite(condition, ctx.bindings());
        if is_literal(&resolved, false) {
            tracing::debug!(location = %ctx.location(), "skipping group with false condition");
            return None;
        }
    }

    let steps = dispatcher.dispatch_all(&group.steps, ctx);
    if steps.is_empty() {
        return None;
    }
    Some(GroupSpec { steps })
}

pub struct GroupConverter;

impl StepConverter for GroupConverter {
    fn kind(&self) -> &'static str {
        kinds::GROUP
    }

    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError> {
        let SourceStepNode::Group(group) = node else {
            return Err(kind_mismatch(self.kind(), node));
        };
        Ok(convert_children(group, ctx, dispatcher)
            .map(|spec| TargetStepNode::new(TargetStep::Group(spec))))
    }
}

pub struct ParallelConverter;

impl StepConverter for ParallelConverter {
    fn kind(&self) -> &'static str {
        kinds::PARALLEL
    }

    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError> {
        let SourceStepNode::Parallel(group) = node else {
            return Err(kind_mismatch(self.kind(), node));
        };
        Ok(convert_children(group, ctx, dispatcher)
            .map(|spec| TargetStepNode::new(TargetStep::Parallel(spec))))
    }
}
