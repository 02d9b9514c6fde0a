//! Scenario Registry: drives simulate-fit-predict runs over a simulation
//! directory and isolates scenario failures from each other.

use crate::config::{Config, Scenario};
use crate::cost::{Adjacency, CostSurface};
use crate::export::{self, ScenarioResult};
use crate::fit;
use crate::landscape::{Grid, TrapArray};
use crate::likelihood::MarginalLikelihood;
use crate::predict;
use crate::simulate;
use anyhow::{Context, Result, bail};
use glob::glob;
use ndarray::Array1;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::{
    fs,
    io::BufWriter,
    path::{Path, PathBuf},
};

/// Owns the simulation directory, the validated configuration and the
/// shared landscape inputs.
pub struct Registry {
    sim_dir: PathBuf,
    cfg: Config,
    grid: Grid,
    traps: TrapArray,
    adjacency: Adjacency,
}

impl Registry {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        let grid = Grid::from_file(
            sim_dir.join(&cfg.landscape.covariate),
            cfg.landscape.resolution,
        )
        .context("failed to load covariate grid")?;
        let traps = TrapArray::from_file(sim_dir.join(&cfg.design.traps))
            .context("failed to load trap array")?;
        for trap in traps.points() {
            if !grid.contains(trap) {
                bail!(
                    "trap ({}, {}) lies outside the landscape extent",
                    trap.x,
                    trap.y
                );
            }
        }
        let adjacency = Adjacency::from_degree(cfg.design.adjacency)?;

        Ok(Self {
            sim_dir,
            cfg,
            grid,
            traps,
            adjacency,
        })
    }

    /// Run every declared scenario and write a summary report.
    ///
    /// A failing scenario is logged and recorded in the summary, and the
    /// remaining scenarios still run.
    pub fn run_all(&self) -> Result<()> {
        let mut reports = Vec::with_capacity(self.cfg.scenarios.len());
        let mut n_failed = 0;
        for (idx, scenario) in self.cfg.scenarios.iter().enumerate() {
            match self.run_scenario(idx, scenario) {
                Ok(report) => reports.push(report),
                Err(error) => {
                    log::error!("scenario {idx} failed: {error:#}");
                    n_failed += 1;
                    reports.push(serde_json::json!({
                        "scenario": idx,
                        "error": format!("{error:#}"),
                    }));
                }
            }
        }

        let summary_file = self.sim_dir.join("summary.json");
        let file = fs::File::create(&summary_file)
            .with_context(|| format!("failed to create {summary_file:?}"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &reports)
            .context("failed to write summary")?;
        log::info!("wrote {summary_file:?}");

        if n_failed == self.cfg.scenarios.len() {
            bail!("all {n_failed} scenarios failed");
        }
        Ok(())
    }

    /// Run a single scenario by index.
    pub fn run_one(&self, idx: usize) -> Result<()> {
        let scenario = self
            .cfg
            .scenarios
            .get(idx)
            .with_context(|| format!("no scenario with index {idx}"))?;
        self.run_scenario(idx, scenario)?;
        Ok(())
    }

    /// Remove all scenario output directories and the summary report.
    pub fn clean(&self) -> Result<()> {
        let pattern = self.sim_dir.join("scenario-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        for entry in glob(pattern)
            .context("failed to glob scenario dirs")?
            .filter_map(Result::ok)
        {
            if entry.is_dir() {
                fs::remove_dir_all(&entry)
                    .with_context(|| format!("failed to remove {entry:?}"))?;
                log::info!("removed {entry:?}");
            }
        }

        let summary_file = self.sim_dir.join("summary.json");
        if summary_file.exists() {
            fs::remove_file(&summary_file)
                .with_context(|| format!("failed to remove {summary_file:?}"))?;
        }
        Ok(())
    }

    fn scenario_dir(&self, idx: usize) -> PathBuf {
        self.sim_dir.join(format!("scenario-{idx:04}"))
    }

    fn run_scenario(&self, idx: usize, scenario: &Scenario) -> Result<serde_json::Value> {
        log::info!(
            "scenario {idx}: theta={}, alpha2={}, n={}, seed={}",
            scenario.theta,
            scenario.alpha2,
            scenario.n,
            scenario.seed
        );
        let mut rng = ChaCha12Rng::seed_from_u64(scenario.seed);

        let surface = CostSurface::build(&self.grid, scenario.alpha2, self.adjacency)
            .context("failed to build cost surface")?;
        let centers =
            simulate::simulate_activity_centers(&mut rng, scenario.n, &self.grid, scenario.beta1)
                .context("failed to simulate activity centers")?;
        let detections = simulate::simulate_detections(
            &mut rng,
            &centers,
            &self.traps,
            &surface,
            scenario.theta,
            self.cfg.design.alpha0,
            self.cfg.design.occasions,
        )
        .context("failed to simulate detection histories")?;
        let n_detected = detections.nrows();
        log::info!("scenario {idx}: {n_detected} of {} individuals detected", scenario.n);

        let lik = MarginalLikelihood::new(
            &detections,
            self.cfg.design.occasions,
            &self.traps,
            &self.grid,
            self.adjacency,
        )?;
        let start = Array1::from_vec(self.cfg.fit.start.clone());
        let fit = fit::fit(&lik, &start, self.cfg.fit.max_iters)
            .context("failed to fit the detection model")?;
        log::info!(
            "scenario {idx}: fitted theta={:.4}, alpha2={:.4}, population={:.1} (converged: {})",
            fit.estimates.theta,
            fit.estimates.alpha2,
            fit.population,
            fit.converged
        );

        let surfaces = lik
            .evaluate(&fit.estimates)
            .context("failed to evaluate the fitted likelihood")?;
        let prediction = predict::predict(&self.grid, self.adjacency, &surfaces, &fit.estimates)
            .context("failed to derive prediction surfaces")?;

        let dir = self.scenario_dir(idx);
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {dir:?}"))?;

        export::write_points(dir.join("activity_centers.txt"), &centers)?;
        export::write_counts(dir.join("detections.txt"), &detections)?;
        export::write_vector(dir.join("density.txt"), &prediction.density)?;
        export::write_vector(dir.join("pc.txt"), &prediction.potential)?;
        export::write_vector(dir.join("dwc.txt"), &prediction.weighted)?;
        export::write_matrix(dir.join("connectivity.txt"), &prediction.kernel)?;

        let report = serde_json::json!({
            "scenario": idx,
            "theta_true": scenario.theta,
            "alpha2_true": scenario.alpha2,
            "n_true": scenario.n,
            "n_detected": n_detected,
            "estimates": fit.estimates,
            "population": fit.population,
            "neg_log_lik": fit.neg_log_lik,
            "converged": fit.converged,
            "hessian_ok": fit.hessian_ok,
            "iterations": fit.iterations,
        });

        let bundle = ScenarioResult {
            scenario: *scenario,
            activity_centers: centers,
            detections,
            fit,
            density: prediction.density,
            potential: prediction.potential,
            weighted: prediction.weighted,
        };
        export::write_bundle(dir.join("result.msgpack"), &bundle)?;
        log::info!("wrote {dir:?}");

        Ok(report)
    }
}
