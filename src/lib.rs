//! Monte Carlo simulation and maximum-likelihood estimation for
//! cost-distance spatial capture-recapture study designs.
//!
//! The pipeline generates activity centers over a covariate landscape,
//! simulates trap detection histories through a least-cost-distance
//! encounter model, fits the encounter and density parameters back to the
//! simulated data, and derives realized density and connectivity surfaces
//! from the fit.

pub mod config;
pub mod cost;
pub mod encounter;
pub mod export;
pub mod fit;
pub mod landscape;
pub mod likelihood;
pub mod predict;
pub mod registry;
pub mod simulate;
