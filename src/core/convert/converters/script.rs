#![allow(clippy::result_large_err)]

use super::missing_field;
use crate::core::convert::context::ConversionContext;
use crate::core::convert::dispatcher::{kind_mismatch, StepConverter, StepDispatcher};
use crate::core::convert::source::{kinds, RunStep, SourceStepNode};
use crate::core::convert::target::{ReportSpec, RunSpec, TargetStep, TargetStepNode};
use crate::core::error::AppError;

fn junit(paths: &[String], ctx: &mut ConversionContext<'_>) -> ReportSpec {
    ReportSpec {
        report_type: "junit".to_string(),
        paths: ctx.rewrite_all(paths),
    }
}

fn run_spec(step: &RunStep, ctx: &mut ConversionContext<'_>) -> RunSpec {
    let script = step.command.as_deref().map(|command| {
        let command = ctx.rewrite(command);
        match step.working_directory.as_deref() {
            Some(dir) => format!("cd {}\n{}", ctx.rewrite(dir), command),
            None => command,
        }
    });
    RunSpec {
        script,
        image: ctx.rewrite_opt(step.image.as_deref()),
        shell: step.shell.clone(),
        envs: ctx.rewrite_map(&step.common.environment),
        reports: (!step.report_paths.is_empty()).then(|| junit(&step.report_paths, ctx)),
    }
}

/// `run`: shell command, optionally inside a container image.
pub struct RunConverter;

impl StepConverter for RunConverter {
    fn kind(&self) -> &'static str {
        kinds::RUN
    }

    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        _dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError> {
        let SourceStepNode::Run(step) = node else {
            return Err(kind_mismatch(self.kind(), node));
        };
        if step.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
            return Err(missing_field(self.kind(), "command"));
        }
        Ok(Some(TargetStepNode::new(TargetStep::Run(run_spec(step, ctx)))))
    }
}

/// `background`: long-lived service container; the command is optional.
pub struct BackgroundConverter;

impl StepConverter for BackgroundConverter {
    fn kind(&self) -> &'static str {
        kinds::BACKGROUND
    }

    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        _dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError> {
        let SourceStepNode::Background(step) = node else {
            return Err(kind_mismatch(self.kind(), node));
        };
        if step.command.is_none() && step.image.is_none() {
            return Err(missing_field(self.kind(), "image"));
        }
        Ok(Some(TargetStepNode::new(TargetStep::Background(run_spec(
            step, ctx,
        )))))
    }
}

/// `upload-test-report`: a `run` step publishing junit reports.
pub struct TestReportConverter;

impl StepConverter for TestReportConverter {
    fn kind(&self) -> &'static str {
        kinds::UPLOAD_TEST_REPORT
    }

    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        _dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError> {
        let SourceStepNode::UploadTestReport(step) = node else {
            return Err(kind_mismatch(self.kind(), node));
        };
        if step.paths.is_empty() {
            return Err(missing_field(self.kind(), "path"));
        }
        let spec = RunSpec {
            reports: Some(junit(&step.paths, ctx)),
            ..RunSpec::default()
        };
        Ok(Some(TargetStepNode::new(TargetStep::Run(spec))))
    }
}
