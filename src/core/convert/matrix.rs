//! Execution-matrix expansion.
//!
//! A [`MatrixSpec`] names ordered axes of option values plus exclusions. It
//! expands into concrete combinations; the converter turns each combination
//! into a sibling stage whose identifier derives from the combination index,
//! so the expansion order must be stable.

use crate::core::convert::expression::Bindings;
use crate::core::convert::flexible::render_scalar;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One selected option per axis, in axis declaration order.
pub type Combination = IndexMap<String, Value>;

/// Declarative fan-out: axes, exclusions and an optional concurrency cap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixSpec {
    pub axes: IndexMap<String, Vec<Value>>,
    /// Partial assignments; a combination agreeing with every pair of one
    /// exclusion is removed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<IndexMap<String, Value>>,
    /// Carried through untouched; expansion ignores it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
}

impl MatrixSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis(mut self, name: impl Into<String>, options: Vec<Value>) -> Self {
        self.axes.insert(name.into(), options);
        self
    }

    pub fn exclusion(mut self, assignment: IndexMap<String, Value>) -> Self {
        self.exclude.push(assignment);
        self
    }

    /// Size of the cartesian product before exclusions.
    pub fn product_size(&self) -> usize {
        self.axes
            .values()
            .fold(1usize, |acc, options| acc.saturating_mul(options.len()))
    }

    pub fn expand(&self) -> Vec<Combination> {
        expand(self)
    }
}

/// Cartesian product over the axes (last axis varies fastest) minus every
/// combination matched by at least one exclusion.
pub fn expand(spec: &MatrixSpec) -> Vec<Combination> {
    let mut combinations: Vec<Combination> = vec![Combination::new()];
    for (axis, options) in &spec.axes {
        let mut next = Vec::with_capacity(combinations.len().saturating_mul(options.len()));
        for partial in &combinations {
            for option in options {
                let mut combination = partial.clone();
                combination.insert(axis.clone(), option.clone());
                next.push(combination);
            }
        }
        combinations = next;
    }

    combinations.retain(|combination| {
        !spec
            .exclude
            .iter()
            .any(|exclusion| matches_exclusion(combination, exclusion))
    });

    tracing::debug!(
        axes = spec.axes.len(),
        product = spec.product_size(),
        kept = combinations.len(),
        "expanded matrix"
    );
    combinations
}

/// Empty exclusions match nothing.
pub fn matches_exclusion(combination: &Combination, exclusion: &IndexMap<String, Value>) -> bool {
    !exclusion.is_empty()
        && exclusion.iter().all(|(axis, wanted)| {
            combination
                .get(axis)
                .is_some_and(|selected| options_equal(selected, wanted))
        })
}

fn options_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (render_scalar(left), render_scalar(right)) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

fn render_option(value: &Value) -> String {
    render_scalar(value).unwrap_or_else(|| value.to_string())
}

/// CircleCI-style display suffix, e.g. `linux-amd64`.
pub fn combination_label(combination: &Combination) -> String {
    combination
        .values()
        .map(render_option)
        .collect::<Vec<_>>()
        .join("-")
}

/// Parameter bindings contributed by one combination.
pub fn combination_bindings(combination: &Combination) -> Bindings {
    combination
        .iter()
        .map(|(axis, value)| (axis.clone(), render_option(value)))
        .collect()
}
