//! Posterior activity-center, realized density and connectivity surfaces.

use crate::cost::{Adjacency, CostSurface};
use crate::encounter::encounter_prob;
use crate::landscape::Grid;
use crate::likelihood::{LikelihoodSurfaces, Params};
use anyhow::{Context, Result};
use ndarray::{Array1, Array2, Axis};

/// Surfaces derived from the fitted parameters.
#[derive(Debug, Clone)]
pub struct PredictionSurfaces {
    /// Posterior over candidate cells per detection row; the last row is
    /// the undetected pseudo-individual. Shape `(n_detected + 1, n_cells)`.
    pub posterior: Array2<f64>,
    /// Realized density per cell; sums to `n_detected + n0`.
    pub density: Array1<f64>,
    /// Connectivity kernel between all cell pairs under the fitted
    /// movement parameters.
    pub kernel: Array2<f64>,
    /// Potential connectivity: kernel row sums.
    pub potential: Array1<f64>,
    /// Density-weighted connectivity: kernel rows weighted by the realized
    /// density.
    pub weighted: Array1<f64>,
}

/// Derive posterior, density and connectivity surfaces from a fit.
///
/// `surfaces` must be the likelihood evaluation at the fitted parameters:
/// the posterior reuses its conditional and marginal values directly, so
/// prediction and estimation share one probability model.
pub fn predict(
    grid: &Grid,
    adjacency: Adjacency,
    surfaces: &LikelihoodSurfaces,
    params: &Params,
) -> Result<PredictionSurfaces> {
    let n_rows = surfaces.conditional.nrows();
    let n_cells = grid.n_cells();
    let ln_cells = (n_cells as f64).ln();

    // Bayes' rule over the uniform cell prior, normalized by the marginal
    // likelihood computed during fitting.
    let mut posterior = Array2::zeros((n_rows, n_cells));
    for i in 0..n_rows {
        for g in 0..n_cells {
            posterior[[i, g]] =
                (surfaces.conditional[[i, g]] - ln_cells - surfaces.marginal[i]).exp();
        }
    }

    // Detected individuals contribute with weight 1, the pseudo-individual
    // with the fitted number of undetected individuals.
    let mut density = Array1::zeros(n_cells);
    for i in 0..n_rows {
        let weight = if i + 1 == n_rows { params.n0 } else { 1.0 };
        for g in 0..n_cells {
            density[g] += weight * posterior[[i, g]];
        }
    }

    // Second cost-distance pass under the fitted, not true, parameters.
    let surface = CostSurface::build(grid, params.alpha2, adjacency)
        .context("failed to rebuild the cost surface at the fitted resistance exponent")?;
    let dist = surface.pairwise_cell_distances();
    let kernel = encounter_prob(&dist, params.theta, 1.0)?;
    let potential = kernel.sum_axis(Axis(1));
    let weighted = kernel.dot(&density);

    Ok(PredictionSurfaces {
        posterior,
        density,
        kernel,
        potential,
        weighted,
    })
}
