//! Timing and comparison payloads carried in coordinator replies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Outcome;

/// Aggregate of every measurement recorded under one phase name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub count: usize,
    pub total_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub average_ms: f64,
}

/// Linear-versus-distributed comparison of one system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub matrix_size: usize,
    pub linear_ms: f64,
    pub distributed_ms: f64,
    /// `linear_ms / distributed_ms`; 0 when either timing is zero.
    pub speedup: f64,
    pub max_error: f64,
    pub max_error_index: Option<usize>,
    pub matching_elements: usize,
    pub solutions_match: bool,
    /// `(percentile, error)` pairs over the per-component absolute errors.
    pub percentiles: Vec<(u8, f64)>,
    pub linear_solution: Vec<f64>,
    pub distributed_solution: Vec<f64>,
    pub stats: BTreeMap<String, PhaseStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ComparisonReport>,
}

impl Comparison {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::failed(message),
            report: None,
        }
    }
}
