//! Gaussian decay encounter kernel on least-cost distance.

use anyhow::{Result, bail};
use ndarray::Array2;

/// Logistic CDF, mapping a log-odds baseline onto the probability scale.
pub fn plogis(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Detection/use probabilities `a0 * exp(-d^2 / (2 theta^2))`.
///
/// Monotonically decreasing in distance; infinite distances (disconnected
/// pairs) map to exactly zero. The movement scale `theta` must be strictly
/// positive.
pub fn encounter_prob(dist: &Array2<f64>, theta: f64, a0: f64) -> Result<Array2<f64>> {
    if !theta.is_finite() || theta <= 0.0 {
        bail!("movement scale must be strictly positive and finite, but is {theta}");
    }
    if !a0.is_finite() || a0 < 0.0 {
        bail!("baseline encounter rate must be non-negative and finite, but is {a0}");
    }

    let denom = 2.0 * theta * theta;
    Ok(dist.mapv(|d| {
        if d.is_infinite() {
            0.0
        } else {
            a0 * (-(d * d) / denom).exp()
        }
    }))
}
