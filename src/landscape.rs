//! Landscape primitives: covariate grid, points and trap arrays.

use anyhow::{Context, Result, bail};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Planar coordinate within the landscape extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Regular covariate raster with square cells.
///
/// `values` is row-major with shape `(ny, nx)`; the cell in row `r` and
/// column `c` has flat index `r * nx + c` and its center at
/// `((c + 0.5) * resolution, (r + 0.5) * resolution)`. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    values: Array2<f64>,
    resolution: f64,
}

impl Grid {
    /// Create a new grid from a covariate raster and a cell side length.
    pub fn new(values: Array2<f64>, resolution: f64) -> Result<Self> {
        if values.is_empty() {
            bail!("covariate grid must contain at least one cell");
        }
        if values.iter().any(|val| !val.is_finite()) {
            bail!("covariate grid must contain only finite values");
        }
        if !resolution.is_finite() || resolution <= 0.0 {
            bail!("cell resolution must be positive and finite, but is {resolution}");
        }
        Ok(Self { values, resolution })
    }

    /// Load a grid from a whitespace-delimited numeric text file.
    ///
    /// Each non-empty line is one raster row; all rows must have the same
    /// number of columns.
    pub fn from_file<P: AsRef<Path>>(file: P, resolution: f64) -> Result<Self> {
        let file = file.as_ref();
        let text =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let mut rows: Vec<Vec<f64>> = Vec::new();
        for (i_line, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row = line
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<f64>()
                        .with_context(|| format!("invalid number {tok:?} on line {}", i_line + 1))
                })
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }
        if rows.is_empty() {
            bail!("covariate file {file:?} is empty");
        }

        let nx = rows[0].len();
        if rows.iter().any(|row| row.len() != nx) {
            bail!("covariate file {file:?} has rows of unequal length");
        }
        let ny = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let values =
            Array2::from_shape_vec((ny, nx), flat).context("failed to shape covariate grid")?;

        Self::new(values, resolution)
    }

    pub fn nx(&self) -> usize {
        self.values.ncols()
    }

    pub fn ny(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cells(&self) -> usize {
        self.values.len()
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Spatial extent `(width, height)` of the grid.
    pub fn extent(&self) -> (f64, f64) {
        (
            self.nx() as f64 * self.resolution,
            self.ny() as f64 * self.resolution,
        )
    }

    pub fn area(&self) -> f64 {
        let (width, height) = self.extent();
        width * height
    }

    /// Whether a point lies within the spatial extent.
    pub fn contains(&self, point: &Point) -> bool {
        let (width, height) = self.extent();
        point.x >= 0.0 && point.x <= width && point.y >= 0.0 && point.y <= height
    }

    /// Covariate value of a cell by flat index.
    pub fn value(&self, cell: usize) -> f64 {
        self.values[[cell / self.nx(), cell % self.nx()]]
    }

    /// Covariate value at a point (nearest cell).
    pub fn value_at(&self, point: &Point) -> Result<f64> {
        Ok(self.value(self.cell_of(point)?))
    }

    /// Flat index of the cell containing a point.
    pub fn cell_of(&self, point: &Point) -> Result<usize> {
        if !self.contains(point) {
            bail!(
                "point ({}, {}) lies outside the landscape extent",
                point.x,
                point.y
            );
        }
        let col = ((point.x / self.resolution) as usize).min(self.nx() - 1);
        let row = ((point.y / self.resolution) as usize).min(self.ny() - 1);
        Ok(row * self.nx() + col)
    }

    /// Center coordinate of a cell by flat index.
    pub fn cell_center(&self, cell: usize) -> Point {
        let col = cell % self.nx();
        let row = cell / self.nx();
        Point {
            x: (col as f64 + 0.5) * self.resolution,
            y: (row as f64 + 0.5) * self.resolution,
        }
    }

    /// Observed `(min, max)` of the covariate.
    pub fn value_range(&self) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &val in self.values.iter() {
            min = min.min(val);
            max = max.max(val);
        }
        (min, max)
    }
}

/// Fixed ordered array of trap locations, shared across all scenarios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrapArray {
    points: Vec<Point>,
}

impl TrapArray {
    pub fn new(points: Vec<Point>) -> Result<Self> {
        if points.is_empty() {
            bail!("trap array must contain at least one trap");
        }
        if points
            .iter()
            .any(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            bail!("trap coordinates must be finite");
        }
        Ok(Self { points })
    }

    /// Load traps from a text file with one `x y` pair per line.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let text =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let mut points = Vec::new();
        for (i_line, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let coords = line
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<f64>()
                        .with_context(|| format!("invalid number {tok:?} on line {}", i_line + 1))
                })
                .collect::<Result<Vec<_>>>()?;
            if coords.len() != 2 {
                bail!(
                    "line {} of {file:?} must contain exactly two coordinates",
                    i_line + 1
                );
            }
            points.push(Point {
                x: coords[0],
                y: coords[1],
            });
        }

        Self::new(points)
    }

    /// Build a square trap grid with the given spacing, centered in the
    /// landscape extent.
    pub fn centered_grid(per_side: usize, spacing: f64, grid: &Grid) -> Result<Self> {
        if per_side == 0 {
            bail!("trap grid must have at least one trap per side");
        }
        if !spacing.is_finite() || spacing <= 0.0 {
            bail!("trap spacing must be positive and finite, but is {spacing}");
        }

        let (width, height) = grid.extent();
        let offset = (per_side as f64 - 1.0) / 2.0;
        let mut points = Vec::with_capacity(per_side * per_side);
        for i in 0..per_side {
            for j in 0..per_side {
                let point = Point {
                    x: width / 2.0 + (i as f64 - offset) * spacing,
                    y: height / 2.0 + (j as f64 - offset) * spacing,
                };
                if !grid.contains(&point) {
                    bail!("trap grid does not fit within the landscape extent");
                }
                points.push(point);
            }
        }

        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }
}
