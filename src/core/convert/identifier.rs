#![allow(clippy::result_large_err)] // Allocation failure is reported as AppError so the dispatcher can record it.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::collections::HashSet;

/// Longest identifier accepted by the target schema.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Collision suffixes tried before an allocation gives up.
pub const DEFAULT_MAX_ATTEMPTS: usize = 1_000;

const LAST_RESORT_SEED: &str = "step";

/// Issued identifiers for one conversion run.
///
/// Allocation is deterministic for a given call sequence, so one registry
/// must never be shared between concurrent callers.
#[derive(Debug, Clone)]
pub struct IdentifierRegistry {
    issued: HashSet<String>,
    max_attempts: usize,
}

impl Default for IdentifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        Self::with_max_attempts(DEFAULT_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self {
            issued: HashSet::new(),
            max_attempts,
        }
    }

    /// Issue a unique identifier derived from `seed`, or from `fallback_kind`
    /// when the seed is blank. Collisions get `-1`, `-2`, ... appended.
    pub fn allocate(&mut self, seed: &str, fallback_kind: &str) -> Result<String, AppError> {
        let base = normalize_identifier(seed, fallback_kind);
        if self.issued.insert(base.clone()) {
            return Ok(base);
        }

        for attempt in 1..=self.max_attempts {
            let suffix = format!("-{}", attempt);
            let keep = MAX_IDENTIFIER_LEN - suffix.len();
            let candidate = format!("{}{}", &base[..base.len().min(keep)], suffix);
            if self.issued.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }

        Err(AppError::new(
            ErrorCategory::IdentifierCollisionExhaustion,
            format!(
                "no free identifier for '{}' after {} attempts",
                base, self.max_attempts
            ),
        )
        .with_code("CONV-ID-001")
        .with_context("seed", seed))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.issued.contains(id)
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

/// Map a free-form name onto the identifier charset: `[A-Za-z0-9_-]`,
/// leading letter or underscore, at most [`MAX_IDENTIFIER_LEN`] bytes.
pub fn normalize_identifier(seed: &str, fallback_kind: &str) -> String {
    let source = [seed.trim(), fallback_kind.trim(), LAST_RESORT_SEED]
        .into_iter()
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(LAST_RESORT_SEED);

    let mut normalized: String = source
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if normalized
        .chars()
        .next()
        .is_some_and(|first| !(first.is_ascii_alphabetic() || first == '_'))
    {
        normalized.insert(0, '_');
    }
    normalized.truncate(MAX_IDENTIFIER_LEN);
    normalized
}

/// Whether `id` satisfies the target schema identifier rule.
pub fn is_valid_identifier(id: &str) -> bool {
    let mut chars = id.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    id.len() <= MAX_IDENTIFIER_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
