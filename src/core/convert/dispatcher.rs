#![allow(clippy::result_large_err)] // Converter trait and registry return AppError directly for structured diagnostics without boxing.

use crate::core::config::UnknownStepPolicy;
use crate::core::convert::context::ConversionContext;
use crate::core::convert::diagnostics::{Diagnostic, DiagnosticKind};
use crate::core::convert::source::{CommonAccess, SourceStepNode, StepWhen};
use crate::core::convert::target::{TargetStep, TargetStepNode, TemplateSpec};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait implemented by per-kind step converters.
pub trait StepConverter: Send + Sync + 'static {
    /// Source kind tag this converter handles.
    fn kind(&self) -> &'static str;

    /// Map one source node onto a target node. `Ok(None)` is reserved for
    /// constructs that are genuinely empty. The returned node carries no
    /// identifier; the dispatcher allocates it.
    fn convert(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
        dispatcher: &StepDispatcher,
    ) -> Result<Option<TargetStepNode>, AppError>;
}

/// Error for a converter that received a node of another kind.
pub fn kind_mismatch(expected: &str, node: &SourceStepNode) -> AppError {
    AppError::new(
        ErrorCategory::InternalError,
        format!(
            "converter for '{}' received a '{}' node",
            expected,
            node.kind()
        ),
    )
    .with_code("CONV-STEP-003")
}

/// Builder used to register converters before dispatch.
pub struct ConverterRegistryBuilder {
    converters: HashMap<&'static str, Arc<dyn StepConverter>>,
}

impl Default for ConverterRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConverterRegistryBuilder {
    pub fn new() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Register a converter; a second converter for the same kind is rejected.
    pub fn register<T: StepConverter>(&mut self, converter: T) -> Result<&mut Self, AppError> {
        let kind = converter.kind();
        if self.converters.contains_key(kind) {
            return Err(AppError::new(
                ErrorCategory::InternalError,
                format!("duplicate converter registered: {}", kind),
            )
            .with_code("CONV-STEP-002"));
        }
        self.converters.insert(kind, Arc::new(converter));
        Ok(self)
    }

    pub fn build(self) -> ConverterRegistry {
        ConverterRegistry {
            inner: Arc::new(self.converters),
        }
    }
}

/// Immutable kind-to-converter table; cheap to clone and share.
#[derive(Clone)]
pub struct ConverterRegistry {
    inner: Arc<HashMap<&'static str, Arc<dyn StepConverter>>>,
}

impl ConverterRegistry {
    pub fn builder() -> ConverterRegistryBuilder {
        ConverterRegistryBuilder::new()
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn StepConverter>> {
        self.inner.get(kind).cloned()
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.inner.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<&'static str> = self.inner.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

/// Routes source nodes to their converter and finishes the produced node.
#[derive(Clone)]
pub struct StepDispatcher {
    registry: ConverterRegistry,
    unknown_steps: UnknownStepPolicy,
}

impl StepDispatcher {
    pub fn new(registry: ConverterRegistry, unknown_steps: UnknownStepPolicy) -> Self {
        Self {
            registry,
            unknown_steps,
        }
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// Convert one node. Returns the node (if any) plus every diagnostic
    /// recorded while converting it, including those of nested children.
    pub fn dispatch(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
    ) -> (Option<TargetStepNode>, Vec<Diagnostic>) {
        let mark = ctx.diagnostics().len();
        let kind = node.kind().to_string();
        ctx.enter(node.name().unwrap_or(&kind).to_string());
        tracing::debug!(kind = %kind, location = %ctx.location(), "dispatching step");

        let converted = match self.registry.get(&kind) {
            None => self.unknown(node, ctx),
            Some(converter) => match converter.convert(node, ctx, self) {
                Ok(converted) => converted,
                Err(err) => {
                    ctx.report(Diagnostic::from_error(&err).suggest(format!(
                        "Convert the '{}' step by hand; a placeholder was emitted",
                        kind
                    )));
                    Some(placeholder(node))
                }
            },
        };
        let finished = converted.and_then(|target| self.finish(node, target, ctx));

        ctx.leave();
        (finished, ctx.diagnostics().since(mark).to_vec())
    }

    /// Convert a step list in order, dropping nodes that produce nothing.
    pub fn dispatch_all(
        &self,
        nodes: &[SourceStepNode],
        ctx: &mut ConversionContext<'_>,
    ) -> Vec<TargetStepNode> {
        nodes
            .iter()
            .filter_map(|node| self.dispatch(node, ctx).0)
            .collect()
    }

    fn unknown(
        &self,
        node: &SourceStepNode,
        ctx: &mut ConversionContext<'_>,
    ) -> Option<TargetStepNode> {
        let action = match self.unknown_steps {
            UnknownStepPolicy::Placeholder => "a placeholder was emitted",
            UnknownStepPolicy::Drop => "the step was dropped",
        };
        ctx.report(
            Diagnostic::warning(
                "CONV-STEP-001",
                DiagnosticKind::UnsupportedConstruct,
                format!("unsupported step kind '{}'; {}", node.kind(), action),
            )
            .suggest("Replace it with an equivalent step or template"),
        );
        match self.unknown_steps {
            UnknownStepPolicy::Placeholder => Some(placeholder(node)),
            UnknownStepPolicy::Drop => None,
        }
    }

    /// Apply the shared source fields and allocate the node identifier.
    fn finish(
        &self,
        node: &SourceStepNode,
        mut target: TargetStepNode,
        ctx: &mut ConversionContext<'_>,
    ) -> Option<TargetStepNode> {
        let common = node.common();
        if target.name.is_none() {
            target.name = common.name.as_deref().map(|name| ctx.rewrite(name));
        }
        if target.when.is_none() {
            target.when = match &common.when {
                None | Some(StepWhen::OnSuccess) => None,
                Some(StepWhen::Always) => Some("<+always()>".to_string()),
                Some(StepWhen::OnFailure) => Some("<+failure()>".to_string()),
                Some(StepWhen::Expression(text)) => {
                    Some(ctx.rewrite(text)).filter(|condition| !is_literal(condition, true))
                }
            };
        }
        if target.timeout.is_none() {
            target.timeout = common.timeout.clone();
        }
        if target.delegate.is_empty() {
            target.delegate = common.delegate_selectors.clone();
        }

        let seed = target.name.clone().unwrap_or_default();
        match ctx.allocate(&seed, node.kind()) {
            Ok(id) => {
                target.id = id;
                Some(target)
            }
            Err(err) => {
                ctx.report(Diagnostic::from_error(&err));
                None
            }
        }
    }
}

/// Whether a rewritten condition statically evaluates to `expected`.
///
/// Understands bare `true`/`false` under any number of `!` negations and
/// enclosing parentheses, e.g. `!(true)` is the literal `false`.
pub fn is_literal(condition: &str, expected: bool) -> bool {
    literal_value(condition) == Some(expected)
}

fn literal_value(condition: &str) -> Option<bool> {
    let text = condition.trim();
    if let Ok(flag) = text.parse::<bool>() {
        return Some(flag);
    }
    if let Some(negated) = text.strip_prefix('!') {
        return literal_value(negated).map(|flag| !flag);
    }
    enclosed(text).and_then(literal_value)
}

/// Inner text when one pair of parentheses wraps the whole of `text`.
fn enclosed(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('(')?.strip_suffix(')')?;
    let mut depth = 0usize;
    for ch in inner.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1)?,
            _ => {}
        }
    }
    (depth == 0).then_some(inner)
}

/// `template` node standing in for a step that could not be converted.
pub fn placeholder(node: &SourceStepNode) -> TargetStepNode {
    TargetStepNode::new(TargetStep::Template(TemplateSpec {
        uses: node.kind().to_string(),
        payload: node.raw_payload(),
    }))
}
