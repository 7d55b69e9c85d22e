#![allow(clippy::result_large_err)]

//! Front-ends turning source documents into the typed source tree.

pub mod circle;
pub mod harness_v0;

use crate::core::convert::diagnostics::Diagnostic;
use crate::core::convert::pipeline::{ConversionOutput, Converter};
use crate::core::convert::source::SourcePipeline;
use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, SourceFormat};
use serde_json::Value;

/// Source tree plus the diagnostics recorded while reading it.
#[derive(Debug, Clone, Default)]
pub struct ParsedSource {
    pub pipeline: SourcePipeline,
    pub diagnostics: Vec<Diagnostic>,
}

/// Trait implemented by source format front-ends.
pub trait SourceParser {
    fn format(&self) -> SourceFormat;

    fn parse(&self, text: &str) -> Result<ParsedSource, AppError>;
}

pub fn parser_for(format: SourceFormat) -> Box<dyn SourceParser> {
    match format {
        SourceFormat::Circle => Box::new(circle::CircleParser::new()),
        SourceFormat::HarnessV0 => Box::new(harness_v0::HarnessV0Parser::new()),
    }
}

/// Parse `text` as `format` and convert it; front-end diagnostics come first.
pub fn convert_source(
    converter: &Converter,
    format: SourceFormat,
    text: &str,
) -> Result<ConversionOutput, AppError> {
    let parsed = parser_for(format).parse(text)?;
    let mut output = converter.convert(&parsed.pipeline)?;
    let mut diagnostics = parsed.diagnostics;
    diagnostics.append(&mut output.diagnostics);
    output.diagnostics = diagnostics;
    Ok(output)
}

/// Read YAML with merge keys (`<<: *anchor`) applied, as a JSON value tree.
pub fn load_yaml(text: &str) -> Result<Value, AppError> {
    let mut document: serde_yaml::Value = serde_yaml::from_str(text)?;
    document.apply_merge()?;
    serde_json::to_value(&document).map_err(|err| {
        AppError::new(
            ErrorCategory::ParseError,
            format!("document cannot be represented as a value tree: {}", err),
        )
        .with_code("CONV-PARSE-002")
    })
}

/// Field of an object that must be a string-keyed map, if present.
pub(crate) fn object<'v>(value: &'v Value, key: &str) -> Option<&'v serde_json::Map<String, Value>> {
    value.get(key).and_then(Value::as_object)
}
