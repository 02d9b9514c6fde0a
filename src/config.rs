//! Simulation configuration parameters.
//!
//! Loaded from a `config.toml` in the simulation directory and validated
//! before use. See [`Config::from_file`] for loading.

use crate::cost::Adjacency;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::{Path, PathBuf}};

/// Full configuration of a simulation directory.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub landscape: Landscape,
    pub design: Design,
    pub fit: Fit,
    /// Declared scenario list; scenarios run independently.
    #[serde(rename = "scenario")]
    pub scenarios: Vec<Scenario>,
}

/// Covariate raster source, produced by an external landscape generator.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Landscape {
    /// Whitespace-delimited raster file, relative to the simulation dir.
    pub covariate: PathBuf,
    /// Cell side length in landscape units.
    pub resolution: f64,
}

/// Sampling design shared across all scenarios.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Design {
    /// Trap coordinates file (`x y` per line), relative to the simulation
    /// dir.
    pub traps: PathBuf,
    /// Number of sampling occasions.
    pub occasions: u32,
    /// Cell adjacency degree of the movement graph (4 or 8).
    pub adjacency: u8,
    /// True baseline detection intercept on the logit scale.
    #[serde(default = "default_alpha0")]
    pub alpha0: f64,
}

/// Optimizer settings of the likelihood estimator.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Fit {
    /// Start vector `[alpha0, ln theta, ln n0, ln alpha2]`.
    pub start: Vec<f64>,
    /// Iteration budget of the optimizer.
    pub max_iters: u64,
}

/// One simulate-then-fit run, fully determined by its fields and the shared
/// landscape and design.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct Scenario {
    /// True movement scale.
    pub theta: f64,
    /// True resistance exponent.
    pub alpha2: f64,
    /// Expected population size.
    pub n: usize,
    /// RNG seed; each scenario is independently reproducible.
    pub seed: u64,
    /// Covariate thinning coefficient of the activity-center point process.
    #[serde(default = "default_beta1")]
    pub beta1: f64,
}

fn default_alpha0() -> f64 {
    -2.0
}

fn default_beta1() -> f64 {
    -2.0
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized, or if the
    /// configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let text =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&text).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        check_finite(self.landscape.resolution).context("invalid cell resolution")?;
        if self.landscape.resolution <= 0.0 {
            bail!("cell resolution must be positive");
        }

        check_num(self.design.occasions, 1..10_000).context("invalid number of occasions")?;
        Adjacency::from_degree(self.design.adjacency).context("invalid adjacency degree")?;
        check_finite(self.design.alpha0).context("invalid baseline intercept")?;

        if self.fit.start.len() != 4 {
            bail!(
                "start vector must have 4 entries, but has {}",
                self.fit.start.len()
            );
        }
        for &ele in &self.fit.start {
            check_finite(ele).context("invalid start vector")?;
        }
        check_num(self.fit.max_iters, 1..1_000_000).context("invalid iteration budget")?;

        if self.scenarios.is_empty() {
            bail!("config must declare at least one scenario");
        }
        for (idx, scenario) in self.scenarios.iter().enumerate() {
            scenario
                .validate()
                .with_context(|| format!("invalid scenario {idx}"))?;
        }

        Ok(())
    }
}

impl Scenario {
    fn validate(&self) -> Result<()> {
        check_finite(self.theta).context("invalid movement scale")?;
        if self.theta <= 0.0 {
            bail!("movement scale must be positive");
        }
        check_finite(self.alpha2).context("invalid resistance exponent")?;
        check_num(self.n, 1..1_000_000).context("invalid population size")?;
        check_finite(self.beta1).context("invalid thinning coefficient")?;
        if self.beta1 >= 0.0 {
            bail!("thinning coefficient must be negative");
        }
        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_finite(num: f64) -> Result<()> {
    if !num.is_finite() {
        bail!("number must be finite, but is {num}");
    }
    Ok(())
}
