//! Scenario data generation: activity centers and detection histories.

use crate::cost::CostSurface;
use crate::encounter::{encounter_prob, plogis};
use crate::landscape::{Grid, Point, TrapArray};
use anyhow::{Context, Result, bail};
use ndarray::Array2;
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::{Binomial, Uniform};

/// Attempt budget of the rejection sampler, per requested point.
const MAX_REJECTION_FACTOR: usize = 10_000;

/// Draw exactly `n` activity centers from the inhomogeneous point process
/// with intensity `exp(beta0 + beta1 * z(s))`, where `beta0 = ln(n / area)`
/// and `z` is the covariate.
///
/// Rejection sampling: uniform candidates in the extent, accepted with
/// probability `intensity / bound`, where the bound is the maximum of the
/// intensity over the observed covariate range. The sampler errors out
/// instead of hanging when the attempt budget is exhausted.
pub fn simulate_activity_centers(
    rng: &mut ChaCha12Rng,
    n: usize,
    grid: &Grid,
    beta1: f64,
) -> Result<Vec<Point>> {
    if n == 0 {
        bail!("expected population size must be positive");
    }
    if !beta1.is_finite() {
        bail!("thinning coefficient must be finite, but is {beta1}");
    }

    let (width, height) = grid.extent();
    let beta0 = (n as f64 / grid.area()).ln();
    let (z_min, z_max) = grid.value_range();
    // The intensity is monotone in the covariate, so its maximum over the
    // grid is attained at one of the observed extremes.
    let bound = (beta0 + beta1 * z_min).exp().max((beta0 + beta1 * z_max).exp());

    let x_dist = Uniform::new(0.0, width)?;
    let y_dist = Uniform::new(0.0, height)?;

    let mut centers = Vec::with_capacity(n);
    let max_attempts = MAX_REJECTION_FACTOR.saturating_mul(n);
    for _ in 0..max_attempts {
        if centers.len() == n {
            break;
        }

        let candidate = Point {
            x: x_dist.sample(rng),
            y: y_dist.sample(rng),
        };
        let z = grid
            .value_at(&candidate)
            .context("candidate fell outside the landscape extent")?;

        let ratio = (beta0 + beta1 * z).exp() / bound;
        if ratio > 1.0 {
            bail!("acceptance probability {ratio} exceeds 1; the intensity bound is not valid");
        }
        if rng.random::<f64>() < ratio {
            centers.push(candidate);
        }
    }

    if centers.len() < n {
        bail!(
            "rejection sampler accepted only {} of {n} activity centers within {max_attempts} attempts",
            centers.len()
        );
    }
    Ok(centers)
}

/// Simulate a detection-history matrix over `occasions` sampling occasions.
///
/// Per individual and trap, the count is `Binomial(occasions, p)` with `p`
/// from the encounter kernel on least-cost distance and baseline
/// `plogis(alpha0)`. Individuals never detected at any trap are dropped:
/// they are not observable data.
pub fn simulate_detections(
    rng: &mut ChaCha12Rng,
    centers: &[Point],
    traps: &TrapArray,
    surface: &CostSurface,
    theta: f64,
    alpha0: f64,
    occasions: u32,
) -> Result<Array2<u32>> {
    if occasions == 0 {
        bail!("number of occasions must be positive");
    }

    let dist = surface
        .distances(centers, traps.points())
        .context("failed to compute center-to-trap distances")?;
    let prob = encounter_prob(&dist, theta, plogis(alpha0))?;

    let n_traps = traps.len();
    let mut counts = Vec::new();
    let mut n_detected = 0;
    let mut row = Vec::with_capacity(n_traps);
    for i in 0..centers.len() {
        row.clear();
        let mut total = 0;
        for j in 0..n_traps {
            let count = Binomial::new(occasions as u64, prob[[i, j]])?.sample(rng) as u32;
            total += count;
            row.push(count);
        }
        if total > 0 {
            counts.extend_from_slice(&row);
            n_detected += 1;
        }
    }

    Array2::from_shape_vec((n_detected, n_traps), counts)
        .context("failed to shape detection history")
}
