//! Structural conversion engine: source tree in, target document out.

pub mod assembler;
pub mod context;
pub mod converters;
pub mod diagnostics;
pub mod dispatcher;
pub mod expression;
pub mod flexible;
pub mod identifier;
pub mod matrix;
pub mod pipeline;
pub mod source;
pub mod target;

pub use assembler::{render_yaml, PipelineAssembler, StagePass};
pub use context::ConversionContext;
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use dispatcher::{ConverterRegistry, StepConverter, StepDispatcher};
pub use expression::{Bindings, ExpressionRewriter, ExpressionSyntax, ExpressionTable};
pub use flexible::{FlexibleValue, Scalar, Settings, ShapeHint, UnsupportedShape};
pub use identifier::IdentifierRegistry;
pub use matrix::{Combination, MatrixSpec};
pub use pipeline::{ConversionOutput, Converter};
pub use source::{CommonAccess, SourcePipeline, SourceStage, SourceStepNode};
pub use target::{TargetDocument, TargetStage, TargetStep, TargetStepNode};
