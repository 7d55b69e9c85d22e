#![allow(clippy::result_large_err)]

use crate::core::config::BackendConfig;
use crate::core::convert::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::core::convert::expression::{Bindings, ExpressionRewriter};
use crate::core::convert::flexible::Settings;
use crate::core::convert::identifier::IdentifierRegistry;
use crate::core::error::AppError;
use indexmap::IndexMap;
use serde_json::Value;

/// Per-run state handed to every step converter.
///
/// Owns the identifier registry and the diagnostics of one conversion; the
/// rewriter and backend settings are borrowed from the converter.
pub struct ConversionContext<'a> {
    rewriter: &'a ExpressionRewriter,
    backend: &'a BackendConfig,
    identifiers: IdentifierRegistry,
    bindings: Bindings,
    diagnostics: Diagnostics,
    location: Vec<String>,
}

impl<'a> ConversionContext<'a> {
    pub fn new(
        rewriter: &'a ExpressionRewriter,
        backend: &'a BackendConfig,
        max_identifier_attempts: usize,
    ) -> Self {
        Self {
            rewriter,
            backend,
            identifiers: IdentifierRegistry::with_max_attempts(max_identifier_attempts),
            bindings: Bindings::new(),
            diagnostics: Diagnostics::new(),
            location: Vec::new(),
        }
    }

    pub fn rewriter(&self) -> &'a ExpressionRewriter {
        self.rewriter
    }

    pub fn backend(&self) -> &'a BackendConfig {
        self.backend
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Install job-scoped bindings, returning the previous set.
    ///
    /// Values are rewritten once on the way in so a binding that forwards a
    /// pipeline value (`<< pipeline.git.tag >>`) lands as a target token.
    pub fn bind(&mut self, bindings: Bindings) -> Bindings {
        let outer = std::mem::take(&mut self.bindings);
        let mut installed = Bindings::with_capacity(bindings.len());
        for (name, value) in bindings {
            let rewritten = self.rewrite_with(&value, &outer);
            installed.insert(name, rewritten);
        }
        self.bindings = installed;
        outer
    }

    /// Put back bindings returned by [`ConversionContext::bind`].
    pub fn restore_bindings(&mut self, previous: Bindings) {
        self.bindings = previous;
    }

    /// Rewrite a string under the current bindings, recording unresolved tokens.
    pub fn rewrite(&mut self, text: &str) -> String {
        let bindings = std::mem::take(&mut self.bindings);
        let rewritten = self.rewrite_with(text, &bindings);
        self.bindings = bindings;
        rewritten
    }

    fn rewrite_with(&mut self, text: &str, bindings: &Bindings) -> String {
        let report = self.rewriter.rewrite_report(text, bindings);
        for path in report.unresolved {
            self.report_unresolved(&path);
        }
        report.text
    }

    pub fn rewrite_opt(&mut self, text: Option<&str>) -> Option<String> {
        text.map(|text| self.rewrite(text))
    }

    pub fn rewrite_all(&mut self, items: &[String]) -> Vec<String> {
        items.iter().map(|item| self.rewrite(item)).collect()
    }

    pub fn rewrite_map(&mut self, map: &IndexMap<String, String>) -> IndexMap<String, String> {
        map.iter()
            .map(|(key, value)| (key.clone(), self.rewrite(value)))
            .collect()
    }

    pub fn rewrite_value(&mut self, value: &mut Value) {
        for path in self.rewriter.rewrite_value(value, &self.bindings) {
            self.report_unresolved(&path);
        }
    }

    pub fn rewrite_settings(&mut self, settings: &Settings) -> Settings {
        let mut rewritten = settings.clone();
        for (_, value) in rewritten.iter_mut() {
            self.rewrite_value(value);
        }
        rewritten
    }

    fn report_unresolved(&mut self, path: &str) {
        self.report(
            Diagnostic::warning(
                "CONV-EXPR-001",
                DiagnosticKind::UnresolvedExpression,
                format!("expression '{}' has no target equivalent; left verbatim", path),
            )
            .suggest("Replace the expression by hand in the converted pipeline"),
        );
    }

    pub fn allocate(&mut self, seed: &str, fallback_kind: &str) -> Result<String, AppError> {
        self.identifiers.allocate(seed, fallback_kind)
    }

    pub fn identifiers(&self) -> &IdentifierRegistry {
        &self.identifiers
    }

    /// Record a diagnostic, stamping the current location when it has none.
    pub fn report(&mut self, mut diagnostic: Diagnostic) {
        if diagnostic.location.is_none() && !self.location.is_empty() {
            diagnostic.location = Some(self.location());
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn enter(&mut self, segment: impl Into<String>) {
        self.location.push(segment.into());
    }

    pub fn leave(&mut self) {
        self.location.pop();
    }

    /// Dotted path of the node being converted, e.g. `build.steps.test`.
    pub fn location(&self) -> String {
        self.location.join(".")
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }
}
