#![allow(clippy::result_large_err)] // Rewriter construction returns AppError for structured diagnostics.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

/// Job-scoped parameter values, keyed by parameter name.
pub type Bindings = IndexMap<String, String>;

const PATH_PATTERN: &str = r"[A-Za-z_][A-Za-z0-9_\-]*(?:\.[A-Za-z0-9_\-]+)+";

/// Delimiter pair of a template syntax plus the compiled token scanner.
#[derive(Debug, Clone)]
pub struct ExpressionSyntax {
    open: String,
    close: String,
    pattern: Regex,
}

impl ExpressionSyntax {
    pub fn new(open: &str, close: &str) -> Result<Self, AppError> {
        let pattern = format!(
            r"{}\s*({})\s*{}",
            regex::escape(open),
            PATH_PATTERN,
            regex::escape(close)
        );
        let pattern = Regex::new(&pattern).map_err(|err| {
            AppError::new(
                ErrorCategory::InternalError,
                format!("invalid expression delimiters '{}' '{}': {}", open, close, err),
            )
            .with_code("CONV-EXPR-002")
        })?;
        Ok(Self {
            open: open.to_string(),
            close: close.to_string(),
            pattern,
        })
    }

    /// CircleCI `<< pipeline.git.branch >>` syntax.
    pub fn circle() -> Result<Self, AppError> {
        Self::new("<<", ">>")
    }

    pub fn open(&self) -> &str {
        &self.open
    }

    pub fn close(&self) -> &str {
        &self.close
    }

    /// True when `text` holds at least one well-formed token. A heredoc
    /// (`cat <<EOF`) or a lone delimiter is not a token.
    pub fn contains_token(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Immutable source-path to target-path mapping.
#[derive(Debug, Clone, Default)]
pub struct ExpressionTable {
    exact: IndexMap<String, String>,
    prefixes: Vec<(String, String)>,
}

impl ExpressionTable {
    pub fn builder() -> ExpressionTableBuilder {
        ExpressionTableBuilder::default()
    }

    /// Mapping from CircleCI pipeline values to Harness expressions.
    pub fn circle() -> Self {
        Self::builder()
            .exact("pipeline.id", "pipeline.executionId")
            .exact("pipeline.number", "pipeline.sequenceId")
            .exact("pipeline.project.git_url", "codebase.repoUrl")
            .exact("pipeline.git.tag", "codebase.tag")
            .exact("pipeline.git.branch", "codebase.branch")
            .exact("pipeline.git.revision", "codebase.commitSha")
            .exact("pipeline.git.base_revision", "codebase.baseCommitSha")
            .exact("pipeline.trigger_source", "pipeline.triggerType")
            .exact("pipeline.schedule.name", "pipeline.triggeredBy.name")
            .prefix("pipeline.parameters.", "inputs.")
            .prefix("parameters.", "inputs.")
            .prefix("matrix.", "matrix.")
            .build()
    }

    pub fn exact(&self, path: &str) -> Option<&str> {
        self.exact.get(path).map(String::as_str)
    }

    /// Longest matching prefix rule, applied to a path with a non-empty remainder.
    pub fn prefixed(&self, path: &str) -> Option<String> {
        self.prefixes.iter().find_map(|(source, target)| {
            path.strip_prefix(source.as_str())
                .filter(|rest| !rest.is_empty())
                .map(|rest| format!("{}{}", target, rest))
        })
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collects table entries before the table is frozen.
#[derive(Debug, Default)]
pub struct ExpressionTableBuilder {
    exact: IndexMap<String, String>,
    prefixes: Vec<(String, String)>,
}

impl ExpressionTableBuilder {
    pub fn exact(mut self, source: &str, target: &str) -> Self {
        debug_assert!(!target.contains(['<', '>']));
        self.exact.insert(source.to_string(), target.to_string());
        self
    }

    pub fn prefix(mut self, source: &str, target: &str) -> Self {
        debug_assert!(!target.contains(['<', '>']));
        self.prefixes.push((source.to_string(), target.to_string()));
        self
    }

    pub fn build(mut self) -> ExpressionTable {
        // Longest prefix wins; the sort is stable so equal lengths keep declaration order.
        self.prefixes
            .sort_by(|left, right| right.0.len().cmp(&left.0.len()));
        ExpressionTable {
            exact: self.exact,
            prefixes: self.prefixes,
        }
    }
}

/// Result of rewriting one string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub text: String,
    /// Token paths left verbatim, in first-seen order without repeats.
    pub unresolved: Vec<String>,
}

/// Rewrites source template tokens into `<+path>` target tokens.
#[derive(Debug, Clone)]
pub struct ExpressionRewriter {
    syntax: ExpressionSyntax,
    table: ExpressionTable,
}

impl ExpressionRewriter {
    pub fn new(syntax: ExpressionSyntax, table: ExpressionTable) -> Self {
        Self { syntax, table }
    }

    pub fn circle() -> Result<Self, AppError> {
        Ok(Self::new(ExpressionSyntax::circle()?, ExpressionTable::circle()))
    }

    pub fn syntax(&self) -> &ExpressionSyntax {
        &self.syntax
    }

    pub fn table(&self) -> &ExpressionTable {
        &self.table
    }

    pub fn rewrite(&self, text: &str, bindings: &Bindings) -> String {
        self.rewrite_report(text, bindings).text
    }

    /// Rewrite every token in `text` until no further token resolves.
    ///
    /// Each resolving pass removes at least one `<` from the text (a token
    /// holds two, a replacement at most one), so the loop terminates and its
    /// output is a fixed point of the rewriter.
    pub fn rewrite_report(&self, text: &str, bindings: &Bindings) -> Rewrite {
        let mut current = text.to_string();
        loop {
            let (next, resolved, unresolved) = self.rewrite_pass(&current, bindings);
            if resolved == 0 {
                return Rewrite {
                    text: next,
                    unresolved,
                };
            }
            current = next;
        }
    }

    /// Rewrite every string inside a raw value tree, returning unresolved paths.
    pub fn rewrite_value(&self, value: &mut Value, bindings: &Bindings) -> Vec<String> {
        let mut unresolved = Vec::new();
        self.rewrite_value_into(value, bindings, &mut unresolved);
        unresolved
    }

    fn rewrite_value_into(&self, value: &mut Value, bindings: &Bindings, out: &mut Vec<String>) {
        match value {
            Value::String(text) => {
                let rewritten = self.rewrite_report(text, bindings);
                *text = rewritten.text;
                for path in rewritten.unresolved {
                    if !out.contains(&path) {
                        out.push(path);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.rewrite_value_into(item, bindings, out);
                }
            }
            Value::Object(map) => {
                for item in map.values_mut() {
                    self.rewrite_value_into(item, bindings, out);
                }
            }
            _ => {}
        }
    }

    fn rewrite_pass(&self, text: &str, bindings: &Bindings) -> (String, usize, Vec<String>) {
        let mut out = String::with_capacity(text.len());
        let mut resolved = 0;
        let mut unresolved: Vec<String> = Vec::new();
        let mut last = 0;
        for caps in self.syntax.pattern.captures_iter(text) {
            let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&text[last..whole.start()]);
            match self.resolve(path.as_str(), bindings) {
                Some(replacement) => {
                    out.push_str(&replacement);
                    resolved += 1;
                }
                None => {
                    out.push_str(whole.as_str());
                    if !unresolved.iter().any(|seen| seen == path.as_str()) {
                        unresolved.push(path.as_str().to_string());
                    }
                }
            }
            last = whole.end();
        }
        out.push_str(&text[last..]);
        (out, resolved, unresolved)
    }

    fn resolve(&self, path: &str, bindings: &Bindings) -> Option<String> {
        if let Some(name) = path.strip_prefix("parameters.") {
            // A bound value with two or more `<` could re-introduce a token.
            if let Some(bound) = bindings
                .get(name)
                .filter(|value| value.matches('<').count() < 2)
            {
                return Some(bound.clone());
            }
        }
        if let Some(target) = self.table.exact(path) {
            return Some(format!("<+{}>", target));
        }
        self.table
            .prefixed(path)
            .map(|target| format!("<+{}>", target))
    }
}
