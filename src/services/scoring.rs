//! Deterministic point computation for answered questions.

use serde::Deserialize;

/// Shape of the point decay between the round opening and its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayCurve {
    /// `1 - r` where `r` is the elapsed share of the time limit.
    Linear,
    /// `1 - r²`: slow start, steeper drop near the deadline.
    Quadratic,
    /// No decay; every correct answer earns the base points.
    Flat,
}

/// Tunable scoring parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    /// Lowest share of the base points a correct answer can earn.
    pub min_fraction: f64,
    /// Decay curve applied before the floor.
    pub curve: DecayCurve,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            min_fraction: 0.5,
            curve: DecayCurve::Linear,
        }
    }
}

/// Points awarded for a single answer.
///
/// Incorrect answers earn nothing. Correct answers earn
/// `base_points * max(min_fraction, decay(elapsed / limit))`, rounded to the
/// nearest integer. `elapsed_ms` is clamped to the limit so an answer stamped
/// exactly at the deadline earns the floor.
pub fn score(
    is_correct: bool,
    elapsed_ms: u64,
    time_limit_ms: u64,
    base_points: u32,
    policy: &ScoringPolicy,
) -> u32 {
    if !is_correct {
        return 0;
    }

    let ratio = if time_limit_ms == 0 {
        1.0
    } else {
        elapsed_ms.min(time_limit_ms) as f64 / time_limit_ms as f64
    };

    let decayed = match policy.curve {
        DecayCurve::Linear => 1.0 - ratio,
        DecayCurve::Quadratic => 1.0 - ratio * ratio,
        DecayCurve::Flat => 1.0,
    };

    let fraction = decayed.max(policy.min_fraction).clamp(0.0, 1.0);
    (f64::from(base_points) * fraction).round() as u32
}
