//! Linear-versus-distributed result comparison.

use std::collections::BTreeMap;

use gauss_types::{ComparisonReport, PhaseStats};

/// Largest per-component difference for two solutions to count as equal.
pub const MATCH_TOLERANCE: f64 = 1e-6;

pub const PERCENTILES: [u8; 4] = [50, 90, 95, 99];

pub struct Run {
    pub solution: Vec<f64>,
    pub elapsed_ms: f64,
}

/// Reported in place of an error that is not a finite number, so the
/// report always survives JSON.
pub const UNBOUNDED_ERROR: f64 = f64::MAX;

/// Builds the report for one system solved both ways.
///
/// Solutions of different lengths never match and report
/// [`UNBOUNDED_ERROR`].
pub fn report(
    matrix_size: usize,
    linear: Run,
    distributed: Run,
    stats: BTreeMap<String, PhaseStats>,
) -> ComparisonReport {
    let speedup = if linear.elapsed_ms > 0.0 && distributed.elapsed_ms > 0.0 {
        linear.elapsed_ms / distributed.elapsed_ms
    } else {
        0.0
    };

    let mut report = ComparisonReport {
        matrix_size,
        linear_ms: linear.elapsed_ms,
        distributed_ms: distributed.elapsed_ms,
        speedup,
        stats,
        ..ComparisonReport::default()
    };

    if linear.solution.len() != distributed.solution.len() {
        report.max_error = UNBOUNDED_ERROR;
        report.speedup = 0.0;
    } else {
        let errors: Vec<f64> = linear
            .solution
            .iter()
            .zip(&distributed.solution)
            .map(|(a, b)| (a - b).abs())
            .map(|e| if e.is_finite() { e } else { UNBOUNDED_ERROR })
            .collect();

        for (i, &e) in errors.iter().enumerate() {
            if e <= MATCH_TOLERANCE {
                report.matching_elements += 1;
            }
            if e > report.max_error {
                report.max_error = e;
                report.max_error_index = Some(i);
            }
        }
        report.solutions_match = report.max_error <= MATCH_TOLERANCE;
        report.percentiles = percentiles(errors);
    }

    report.linear_solution = linear.solution;
    report.distributed_solution = distributed.solution;
    report
}

/// Error at each of [`PERCENTILES`], taking index `⌊p/100 · (len − 1)⌋` of
/// the sorted errors.
fn percentiles(mut errors: Vec<f64>) -> Vec<(u8, f64)> {
    if errors.is_empty() {
        return Vec::new();
    }
    errors.sort_by(f64::total_cmp);
    let last = errors.len() - 1;
    PERCENTILES
        .iter()
        .map(|&p| {
            let index = (f64::from(p) / 100.0 * last as f64) as usize;
            (p, errors[index.min(last)])
        })
        .collect()
}
