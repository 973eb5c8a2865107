//! Temporal downsampling of irregular samples onto a regular grid.
//!
//! The engine is a single forward pass over the raw samples, O(samples
//! + targets). Every emitted point carries an accuracy tag so consumers
//! can distinguish measured values from synthesized ones.

use chrono::{DateTime, Duration, Utc};

use crate::samples::{Accuracy, ResampledPoint};

/// Tolerance around the exact midpoint below which interpolation is
/// reported as a plain arithmetic mean rather than a weighted one.
const MIDPOINT_EPSILON: f64 = 1e-9;

/// Generates the target grid `start + k*resolution` for `k = 0, 1, …`
/// while the point is `<= end`. The end instant itself is included only
/// when it lands exactly on the grid.
pub fn target_grid(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    resolution: Duration,
) -> Vec<DateTime<Utc>> {
    let mut targets = Vec::new();
    if resolution <= Duration::zero() {
        return targets;
    }
    let mut current = start;
    while current <= end {
        targets.push(current);
        current += resolution;
    }
    targets
}

/// Downsamples an ascending `(timestamp, value)` sequence onto the
/// given targets, one output point per target in target order.
///
/// Policy per target:
/// - exact timestamp match: the sample value, tagged `Raw`
/// - past the last sample: last value held, tagged `Raw`
/// - zero-width bracketing interval (duplicate timestamps): the anchor
///   value, tagged `Raw`
/// - exact midpoint between brackets: arithmetic mean, tagged `Mean`
/// - otherwise: linear interpolation, tagged `WeightedMean`
///
/// An empty sample sequence produces no output; callers omit the entity
/// from their result in that case.
pub fn downsample(
    samples: &[(DateTime<Utc>, f64)],
    targets: &[DateTime<Utc>],
) -> Vec<ResampledPoint> {
    if samples.is_empty() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(targets.len());
    let mut idx = 0;
    let n = samples.len();

    for &target in targets {
        // Advance so samples[idx] is the rightmost sample <= target.
        while idx + 1 < n && samples[idx + 1].0 <= target {
            idx += 1;
        }

        let (t1, v1) = samples[idx];

        if t1 == target {
            result.push(ResampledPoint {
                timestamp: target,
                value: v1,
                accuracy: Accuracy::Raw,
            });
            continue;
        }

        if idx + 1 >= n {
            // No later sample: hold the last value, not extrapolate.
            result.push(ResampledPoint {
                timestamp: target,
                value: v1,
                accuracy: Accuracy::Raw,
            });
            continue;
        }

        let (t2, v2) = samples[idx + 1];
        let total = (t2 - t1).num_microseconds().unwrap_or(i64::MAX);
        if total <= 0 {
            result.push(ResampledPoint {
                timestamp: target,
                value: v1,
                accuracy: Accuracy::Raw,
            });
            continue;
        }

        let offset = (target - t1).num_microseconds().unwrap_or(0);
        let ratio = offset as f64 / total as f64;

        let (value, accuracy) = if (ratio - 0.5).abs() < MIDPOINT_EPSILON {
            ((v1 + v2) / 2.0, Accuracy::Mean)
        } else {
            (v1 + (v2 - v1) * ratio, Accuracy::WeightedMean)
        };

        result.push(ResampledPoint {
            timestamp: target,
            value,
            accuracy,
        });
    }

    result
}
