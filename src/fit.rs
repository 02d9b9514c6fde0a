//! Maximum-likelihood fitting of the encounter and density parameters.

use crate::likelihood::{MarginalLikelihood, Params, REJECTED_COST};
use anyhow::{Context, Result, bail};
use argmin::core::{Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Relative step of the finite-difference gradient stencil.
const GRAD_STEP: f64 = 1e-5;
/// Relative step of the finite-difference Hessian stencil.
const HESS_STEP: f64 = 1e-3;
/// LBFGS history size.
const LBFGS_MEMORY: usize = 7;
/// Simplex offset of the fallback solver.
const SIMPLEX_STEP: f64 = 0.5;

/// Maximum-likelihood estimates with optimizer diagnostics.
///
/// Non-convergence and a singular or indefinite Hessian are reported here
/// as fit-quality diagnostics rather than silently accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Estimates on the natural scale.
    pub estimates: Params,
    /// Optimized vector `[alpha0, ln theta, ln n0, ln alpha2]`.
    pub param_vector: Vec<f64>,
    /// Negative log-likelihood at the optimum.
    pub neg_log_lik: f64,
    /// Realized population estimate: detected individuals plus `n0`.
    pub population: f64,
    /// The optimizer reached its convergence criterion at an accepted
    /// likelihood value (not on the rejected-parameter plateau).
    pub converged: bool,
    /// Termination status reported by the optimizer.
    pub termination: String,
    /// Number of optimizer iterations.
    pub iterations: u64,
    /// Finite-difference Hessian of the negative log-likelihood at the
    /// optimum, row by row.
    pub hessian: Vec<Vec<f64>>,
    /// The Hessian is finite and positive definite.
    pub hessian_ok: bool,
}

struct SolverRun {
    best: Array1<f64>,
    cost: f64,
    converged: bool,
    termination: String,
    iterations: u64,
}

/// Fit the four free parameters by minimizing the negative marginal
/// log-likelihood from the supplied start vector.
///
/// Quasi-Newton (LBFGS with finite-difference gradients) first; if the
/// solver itself errors out, one retry with a Nelder-Mead simplex.
pub fn fit(lik: &MarginalLikelihood, start: &Array1<f64>, max_iters: u64) -> Result<FitResult> {
    if start.len() != 4 {
        bail!("start vector must have 4 entries, but has {}", start.len());
    }
    if start.iter().any(|ele| !ele.is_finite()) {
        bail!("start vector must be finite, but is {start}");
    }

    let run = match run_lbfgs(lik, start, max_iters) {
        Ok(run) => run,
        Err(error) => {
            log::warn!("quasi-Newton fit failed ({error:#}); retrying with Nelder-Mead");
            run_nelder_mead(lik, start, max_iters)?
        }
    };

    if run.best.iter().any(|ele| !ele.is_finite()) || !run.cost.is_finite() {
        bail!("optimizer terminated at a non-finite point: {}", run.termination);
    }
    // The rejected-parameter plateau has a zero finite-difference gradient,
    // so a solver can report convergence there without ever evaluating a
    // valid likelihood.
    let converged = run.converged && run.cost < REJECTED_COST;
    if !converged {
        log::warn!(
            "optimizer did not converge: {} (cost {})",
            run.termination,
            run.cost
        );
    }

    let estimates = Params::from_vector(&run.best)?;
    let hessian = fd_hessian(&|x| Ok(lik.objective(x)), &run.best)?;
    let hessian_ok = is_positive_definite(&hessian);
    if !hessian_ok {
        log::warn!("Hessian at the optimum is singular or not positive definite");
    }

    Ok(FitResult {
        population: lik.n_detected() as f64 + estimates.n0,
        estimates,
        param_vector: run.best.to_vec(),
        neg_log_lik: run.cost,
        converged,
        termination: run.termination,
        iterations: run.iterations,
        hessian: hessian.outer_iter().map(|row| row.to_vec()).collect(),
        hessian_ok,
    })
}

fn run_lbfgs(lik: &MarginalLikelihood, start: &Array1<f64>, max_iters: u64) -> Result<SolverRun> {
    let linesearch = MoreThuenteLineSearch::new();
    let solver: LBFGS<_, Array1<f64>, Array1<f64>, f64> = LBFGS::new(linesearch, LBFGS_MEMORY)
        .with_tolerance_grad(1e-4)?
        .with_tolerance_cost(1e-9)?;

    let result = Executor::new(lik.clone(), solver)
        .configure(|state| state.param(start.clone()).max_iters(max_iters))
        .run()
        .context("quasi-Newton optimizer failed")?;

    solver_run(result.state())
}

fn run_nelder_mead(
    lik: &MarginalLikelihood,
    start: &Array1<f64>,
    max_iters: u64,
) -> Result<SolverRun> {
    let mut simplex = vec![start.clone()];
    for i in 0..start.len() {
        let mut vertex = start.clone();
        vertex[i] += SIMPLEX_STEP;
        simplex.push(vertex);
    }
    let solver: NelderMead<Array1<f64>, f64> =
        NelderMead::new(simplex).with_sd_tolerance(1e-8)?;

    let result = Executor::new(lik.clone(), solver)
        .configure(|state| state.max_iters(max_iters))
        .run()
        .context("Nelder-Mead optimizer failed")?;

    solver_run(result.state())
}

fn solver_run<S>(state: &S) -> Result<SolverRun>
where
    S: State<Param = Array1<f64>, Float = f64>,
{
    let best = state
        .get_best_param()
        .context("optimizer returned no parameters")?
        .clone();
    let status = state.get_termination_status();
    Ok(SolverRun {
        best,
        cost: state.get_best_cost(),
        converged: matches!(
            status,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
        ),
        termination: format!("{status:?}"),
        iterations: state.get_iter(),
    })
}

/// Central finite-difference gradient of `f` at `x`.
pub fn central_gradient<F>(f: &F, x: &Array1<f64>) -> Result<Array1<f64>>
where
    F: Fn(&Array1<f64>) -> Result<f64>,
{
    let mut grad = Array1::zeros(x.len());
    for i in 0..x.len() {
        let h = GRAD_STEP * (1.0 + x[i].abs());
        let mut hi = x.clone();
        hi[i] += h;
        let mut lo = x.clone();
        lo[i] -= h;
        grad[i] = (f(&hi)? - f(&lo)?) / (2.0 * h);
    }
    Ok(grad)
}

/// Central finite-difference Hessian of `f` at `x`.
fn fd_hessian<F>(f: &F, x: &Array1<f64>) -> Result<Array2<f64>>
where
    F: Fn(&Array1<f64>) -> Result<f64>,
{
    let n = x.len();
    let steps: Vec<f64> = x.iter().map(|ele| HESS_STEP * (1.0 + ele.abs())).collect();

    let mut hessian = Array2::zeros((n, n));
    for i in 0..n {
        for j in i..n {
            let mut pp = x.clone();
            pp[i] += steps[i];
            pp[j] += steps[j];
            let mut pm = x.clone();
            pm[i] += steps[i];
            pm[j] -= steps[j];
            let mut mp = x.clone();
            mp[i] -= steps[i];
            mp[j] += steps[j];
            let mut mm = x.clone();
            mm[i] -= steps[i];
            mm[j] -= steps[j];

            let value =
                (f(&pp)? - f(&pm)? - f(&mp)? + f(&mm)?) / (4.0 * steps[i] * steps[j]);
            hessian[[i, j]] = value;
            hessian[[j, i]] = value;
        }
    }
    Ok(hessian)
}

/// Whether a symmetric matrix is finite and positive definite, by Cholesky
/// factorization.
fn is_positive_definite(matrix: &Array2<f64>) -> bool {
    if matrix.iter().any(|ele| !ele.is_finite()) {
        return false;
    }

    let n = matrix.nrows();
    let mut lower = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = matrix[[i, j]];
            for k in 0..j {
                sum -= lower[[i, k]] * lower[[j, k]];
            }
            if i == j {
                if sum <= 0.0 {
                    return false;
                }
                lower[[i, j]] = sum.sqrt();
            } else {
                lower[[i, j]] = sum / lower[[j, j]];
            }
        }
    }
    true
}
