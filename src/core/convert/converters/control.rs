#![allow(clippy::result_large_err)]

use super::missing_field;
use crate::core::convert::context::ConversionContext;
use crate::core::convert::dispatcher::{kind_mismatch, StepConverter, StepDispatcher};
use crate::core::convert::source::{kinds, SourceStepNode};
use crate::core::convert::target::{
    ApprovalSpec, BarrierSpec, QueueSpec, TargetStep, TargetStepNode, WaitSpec,
};
use crate::core::error::AppError;

pub struct ApprovalConverter;

impl StepConverter for ApprovalConverter {
    fn kind(&self) -> &'static str {
        kinds::APPROVAL
    }

    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        _dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError> {
        let SourceStepNode::Approval(step) = node else {
            return Err(kind_mismatch(self.kind(), node));
        };
        Ok(Some(TargetStepNode::new(TargetStep::Approval(ApprovalSpec {
            message: ctx.rewrite_opt(step.message.as_deref()),
            approvers: ctx.rewrite_all(&step.approvers),
            min_approvers: step.min_approvers,
        }))))
    }
}

pub struct WaitConverter;

impl StepConverter for WaitConverter {
    fn kind(&self) -> &'static str {
        kinds::WAIT
    }

    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        _dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError> {
        let SourceStepNode::Wait(step) = node else {
            return Err(kind_mismatch(self.kind(), node));
        };
        if step.duration.trim().is_empty() {
            return Err(missing_field(self.kind(), "duration"));
        }
        Ok(Some(TargetStepNode::new(TargetStep::Wait(WaitSpec {
            duration: ctx.rewrite(&step.duration),
        }))))
    }
}

pub struct BarrierConverter;

impl StepConverter for BarrierConverter {
    fn kind(&self) -> &'static str {
        kinds::BARRIER
    }

    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        _dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError> {
        let SourceStepNode::Barrier(step) = node else {
            return Err(kind_mismatch(self.kind(), node));
        };
        if step.barrier.trim().is_empty() {
            return Err(missing_field(self.kind(), "barrierRef"));
        }
        Ok(Some(TargetStepNode::new(TargetStep::Barrier(BarrierSpec {
            name: ctx.rewrite(&step.barrier),
        }))))
    }
}

/// `queue`: resource constraint serializing runs that share a key.
pub struct QueueConverter;

impl StepConverter for QueueConverter {
    fn kind(&self) -> &'static str {
        kinds::QUEUE
    }

    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        _dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError> {
        let SourceStepNode::Queue(step) = node else {
            return Err(kind_mismatch(self.kind(), node));
        };
        if step.key.trim().is_empty() {
            return Err(missing_field(self.kind(), "key"));
        }
        let scope = if step.scope.trim().is_empty() {
            "pipeline".to_string()
        } else {
            step.scope.to_ascii_lowercase()
        };
        Ok(Some(TargetStepNode::new(TargetStep::Queue(QueueSpec {
            key: ctx.rewrite(&step.key),
            scope,
        }))))
    }
}
