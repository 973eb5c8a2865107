//! Per-period summary statistics over raw samples.
//!
//! Covers exactly the six statistics an archive period carries:
//! first, last, mean, mode, min, max.

use std::collections::HashMap;

use crate::samples::Sample;

/// Summary statistics for one entity over one period.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodStats {
    pub first: f64,
    pub last: f64,
    pub mean: f64,
    pub mode: f64,
    pub min: f64,
    pub max: f64,
}

/// Computes period statistics in a single pass.
///
/// Returns `None` for an empty period. Mode groups values by exact bit
/// pattern; on a tie, the value that reached the winning count first
/// wins, so the result is stable over input order.
pub fn period_stats(samples: &[Sample]) -> Option<PeriodStats> {
    let first = samples.first()?.value;
    let last = samples.last()?.value;

    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut counts: HashMap<u64, usize> = HashMap::new();
    let mut mode = first;
    let mut mode_count = 0;

    for sample in samples {
        let value = sample.value;
        sum += value;
        min = min.min(value);
        max = max.max(value);

        let count = counts.entry(value.to_bits()).or_insert(0);
        *count += 1;
        if *count > mode_count {
            mode_count = *count;
            mode = value;
        }
    }

    Some(PeriodStats {
        first,
        last,
        mean: sum / samples.len() as f64,
        mode,
        min,
        max,
    })
}
