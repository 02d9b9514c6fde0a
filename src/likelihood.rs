//! Data-augmented marginal likelihood of the detection histories.

use crate::cost::{Adjacency, CostSurface};
use crate::encounter::{encounter_prob, plogis};
use crate::landscape::{Grid, TrapArray};
use anyhow::{Result, bail};
use argmin::core::{CostFunction, Gradient};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;
use std::cell::RefCell;

/// Finite stand-in for an infinitely bad objective value, so the line
/// search arithmetic stays free of infinities.
pub const REJECTED_COST: f64 = 1e12;

/// Free parameters of the estimator on the natural scale.
///
/// The optimizer works on the vector `[alpha0, ln theta, ln n0, ln alpha2]`:
/// the movement scale, the undetected count and the resistance exponent are
/// kept positive by optimizing their logarithms, while the baseline
/// intercept stays on the logit scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Params {
    /// Baseline detection intercept on the logit scale.
    pub alpha0: f64,
    /// Movement scale of the decay kernel.
    pub theta: f64,
    /// Number of undetected individuals.
    pub n0: f64,
    /// Resistance exponent of the cost surface.
    pub alpha2: f64,
}

impl Params {
    /// Decode an optimizer vector. All four entries must be finite.
    pub fn from_vector(vector: &Array1<f64>) -> Result<Self> {
        if vector.len() != 4 {
            bail!("parameter vector must have 4 entries, but has {}", vector.len());
        }
        if vector.iter().any(|ele| !ele.is_finite()) {
            bail!("parameter vector must be finite, but is {vector}");
        }
        Ok(Self {
            alpha0: vector[0],
            theta: vector[1].exp(),
            n0: vector[2].exp(),
            alpha2: vector[3].exp(),
        })
    }

    /// Encode to the optimizer vector `[alpha0, ln theta, ln n0, ln alpha2]`.
    pub fn to_vector(&self) -> Array1<f64> {
        ndarray::array![
            self.alpha0,
            self.theta.ln(),
            self.n0.ln(),
            self.alpha2.ln()
        ]
    }
}

/// Per-location conditional likelihoods and marginals, shared by the
/// estimator and the predictor so both use the exact same probability model.
#[derive(Debug, Clone)]
pub struct LikelihoodSurfaces {
    /// Log conditional likelihood of each detection row under every
    /// candidate cell; the last row is the all-zero pseudo-individual.
    /// Shape `(n_detected + 1, n_cells)`.
    pub conditional: Array2<f64>,
    /// Log marginal likelihood per row, averaged over candidate cells with
    /// the uniform `1 / n_cells` prior.
    pub marginal: Array1<f64>,
    /// Total data-augmented log-likelihood.
    pub log_lik: f64,
}

/// Marginal likelihood of a detection-history matrix, with every grid cell
/// as a candidate activity-center location.
#[derive(Debug, Clone)]
pub struct MarginalLikelihood<'a> {
    detections: &'a Array2<u32>,
    occasions: u32,
    traps: &'a TrapArray,
    grid: &'a Grid,
    adjacency: Adjacency,
    // Trap-to-cell distances for the last seen resistance exponent. The
    // optimizer perturbs one coordinate at a time between evaluations, so
    // alpha2 is unchanged in most of them.
    cache: RefCell<Option<(f64, Array2<f64>)>>,
}

impl<'a> MarginalLikelihood<'a> {
    pub fn new(
        detections: &'a Array2<u32>,
        occasions: u32,
        traps: &'a TrapArray,
        grid: &'a Grid,
        adjacency: Adjacency,
    ) -> Result<Self> {
        if occasions == 0 {
            bail!("number of occasions must be positive");
        }
        if detections.ncols() != traps.len() {
            bail!(
                "detection history has {} columns, but there are {} traps",
                detections.ncols(),
                traps.len()
            );
        }
        if detections.iter().any(|&count| count > occasions) {
            bail!("detection counts must not exceed the number of occasions");
        }
        if detections
            .outer_iter()
            .any(|row| row.iter().all(|&count| count == 0))
        {
            bail!("detection history must not contain all-zero rows");
        }

        Ok(Self {
            detections,
            occasions,
            traps,
            grid,
            adjacency,
            cache: RefCell::new(None),
        })
    }

    /// Number of detected individuals (rows of the detection history).
    pub fn n_detected(&self) -> usize {
        self.detections.nrows()
    }

    /// Trap-to-cell least-cost distances, memoized on the resistance
    /// exponent.
    fn trap_cell_distances(&self, alpha2: f64) -> Result<Array2<f64>> {
        if let Some((cached_alpha2, dist)) = self.cache.borrow().as_ref() {
            if *cached_alpha2 == alpha2 {
                return Ok(dist.clone());
            }
        }

        let surface = CostSurface::build(self.grid, alpha2, self.adjacency)?;
        let dist = surface.distances_to_cells(self.traps.points())?;
        self.cache.borrow_mut().replace((alpha2, dist.clone()));
        Ok(dist)
    }

    /// Evaluate the conditional, marginal and total log-likelihood.
    pub fn evaluate(&self, params: &Params) -> Result<LikelihoodSurfaces> {
        let dist = self.trap_cell_distances(params.alpha2)?;
        let prob = encounter_prob(&dist, params.theta, plogis(params.alpha0))?;
        let ln_p = prob.mapv(f64::ln);
        let ln_q = prob.mapv(|p| (1.0 - p).ln());

        let k = self.occasions as f64;
        let n = self.n_detected();
        let n_traps = self.traps.len();
        let n_cells = self.grid.n_cells();

        // Conditional log-likelihood of each row (plus the all-zero
        // pseudo-individual) under every candidate cell.
        let mut conditional = Array2::zeros((n + 1, n_cells));
        for i in 0..=n {
            let base: f64 = (0..n_traps)
                .map(|j| ln_choose(k, self.count(i, j)))
                .sum();
            for g in 0..n_cells {
                let mut acc = base;
                for j in 0..n_traps {
                    let y = self.count(i, j);
                    // Guard the 0 * ln(0) corners of the binomial terms.
                    if y > 0.0 {
                        acc += y * ln_p[[j, g]];
                    }
                    if y < k {
                        acc += (k - y) * ln_q[[j, g]];
                    }
                }
                conditional[[i, g]] = acc;
            }
        }

        let ln_cells = (n_cells as f64).ln();
        let marginal: Array1<f64> = conditional
            .outer_iter()
            .map(|row| log_sum_exp(row) - ln_cells)
            .collect();

        // Data augmentation: the pseudo-individual enters with weight n0,
        // plus the capture-history count combinatorial term.
        let n0 = params.n0;
        let mut log_lik = ln_choose(n as f64 + n0, n0);
        for i in 0..n {
            log_lik += marginal[i];
        }
        log_lik += n0 * marginal[n];

        if log_lik.is_nan() {
            bail!("log-likelihood is not a number at {params:?}");
        }

        Ok(LikelihoodSurfaces {
            conditional,
            marginal,
            log_lik,
        })
    }

    /// Negative log-likelihood of an optimizer vector.
    pub fn neg_log_lik(&self, vector: &Array1<f64>) -> Result<f64> {
        let params = Params::from_vector(vector)?;
        Ok(-self.evaluate(&params)?.log_lik)
    }

    /// Negative log-likelihood with out-of-domain vectors mapped to a large
    /// finite penalty, so the optimizer backtracks past them instead of
    /// aborting the whole fit.
    pub fn objective(&self, vector: &Array1<f64>) -> f64 {
        match self.neg_log_lik(vector) {
            Ok(cost) if cost.is_finite() => cost,
            Ok(_) => REJECTED_COST,
            Err(error) => {
                log::debug!("rejected trial parameters {vector}: {error:#}");
                REJECTED_COST
            }
        }
    }

    /// Detection count of row `i` at trap `j`; the pseudo-row is all zero.
    fn count(&self, i: usize, j: usize) -> f64 {
        if i < self.n_detected() {
            self.detections[[i, j]] as f64
        } else {
            0.0
        }
    }
}

impl CostFunction for MarginalLikelihood<'_> {
    type Param = Array1<f64>;
    type Output = f64;

    fn cost(&self, vector: &Array1<f64>) -> Result<f64, argmin::core::Error> {
        Ok(self.objective(vector))
    }
}

impl Gradient for MarginalLikelihood<'_> {
    type Param = Array1<f64>;
    type Gradient = Array1<f64>;

    fn gradient(&self, vector: &Array1<f64>) -> Result<Array1<f64>, argmin::core::Error> {
        crate::fit::central_gradient(&|x| Ok(self.objective(x)), vector)
    }
}

/// Log binomial coefficient with real-valued arguments.
fn ln_choose(n: f64, k: f64) -> f64 {
    ln_gamma(n + 1.0) - ln_gamma(k + 1.0) - ln_gamma(n - k + 1.0)
}

/// Numerically stable `ln(sum(exp(values)))`.
fn log_sum_exp(values: ArrayView1<f64>) -> f64 {
    let max = values.fold(f64::NEG_INFINITY, |acc, &val| acc.max(val));
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|&val| (val - max).exp()).sum::<f64>().ln()
}
