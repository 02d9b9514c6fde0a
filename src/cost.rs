//! Cost surface construction and least-cost distance solving.

use crate::landscape::{Grid, Point};
use anyhow::{Result, bail};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BinaryHeap};

/// Cell adjacency degree of the movement graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Adjacency {
    Four,
    Eight,
}

impl Adjacency {
    pub fn from_degree(degree: u8) -> Result<Self> {
        match degree {
            4 => Ok(Self::Four),
            8 => Ok(Self::Eight),
            _ => bail!("adjacency degree must be 4 or 8, but is {degree}"),
        }
    }
}

/// Movement-cost graph over the grid cells for a fixed resistance exponent.
///
/// Each cell carries `cost = exp(alpha2 * covariate)`. Adjacent cells are
/// joined by an edge whose conductance is the inverse of their mean cost;
/// the geometric correction divides diagonal conductance by the longer step
/// length, so the path cost of one step is `mean(cost) * step`, with
/// `step = resolution` on orthogonal moves and `sqrt(2) * resolution` on
/// diagonal moves. Rebuilt whenever the resistance exponent changes.
pub struct CostSurface<'a> {
    grid: &'a Grid,
    cell_cost: Vec<f64>,
    adjacency: Adjacency,
}

impl<'a> CostSurface<'a> {
    /// Build the cost graph for a resistance exponent.
    ///
    /// Fails with a numeric-domain error if any cell cost is non-finite
    /// (e.g. the exponential overflows).
    pub fn build(grid: &'a Grid, alpha2: f64, adjacency: Adjacency) -> Result<Self> {
        if !alpha2.is_finite() {
            bail!("resistance exponent must be finite, but is {alpha2}");
        }

        let mut cell_cost = Vec::with_capacity(grid.n_cells());
        for cell in 0..grid.n_cells() {
            let cost = (alpha2 * grid.value(cell)).exp();
            if !cost.is_finite() || cost <= 0.0 {
                bail!(
                    "non-finite movement cost for covariate {} and resistance exponent {alpha2}",
                    grid.value(cell)
                );
            }
            cell_cost.push(cost);
        }

        Ok(Self {
            grid,
            cell_cost,
            adjacency,
        })
    }

    /// Least-cost distances from every point in `from` to every point in
    /// `to`, as a dense `(from.len(), to.len())` matrix.
    ///
    /// Points snap to the cell containing them. Disconnected pairs yield
    /// `f64::INFINITY`.
    pub fn distances(&self, from: &[Point], to: &[Point]) -> Result<Array2<f64>> {
        let to_cells = to
            .iter()
            .map(|point| self.grid.cell_of(point))
            .collect::<Result<Vec<_>>>()?;

        let mut out = Array2::zeros((from.len(), to.len()));
        for (i, point) in from.iter().enumerate() {
            let dist = self.dijkstra(self.grid.cell_of(point)?);
            for (j, &cell) in to_cells.iter().enumerate() {
                out[[i, j]] = dist[cell];
            }
        }
        Ok(out)
    }

    /// Least-cost distances from every point in `from` to every grid cell,
    /// as a dense `(from.len(), n_cells)` matrix in flat-index order.
    pub fn distances_to_cells(&self, from: &[Point]) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((from.len(), self.grid.n_cells()));
        for (i, point) in from.iter().enumerate() {
            let dist = self.dijkstra(self.grid.cell_of(point)?);
            for (cell, &d) in dist.iter().enumerate() {
                out[[i, cell]] = d;
            }
        }
        Ok(out)
    }

    /// Least-cost distances between all pairs of grid cells.
    pub fn pairwise_cell_distances(&self) -> Array2<f64> {
        let n = self.grid.n_cells();
        let mut out = Array2::zeros((n, n));
        for source in 0..n {
            let dist = self.dijkstra(source);
            for (cell, &d) in dist.iter().enumerate() {
                out[[source, cell]] = d;
            }
        }
        out
    }

    /// Single-source shortest paths over the corrected cost graph.
    fn dijkstra(&self, source: usize) -> Vec<f64> {
        let n = self.grid.n_cells();
        let mut dist = vec![f64::INFINITY; n];
        dist[source] = 0.0;

        let mut heap = BinaryHeap::new();
        heap.push(HeapEntry {
            dist: 0.0,
            cell: source,
        });

        let mut neighbors = Vec::with_capacity(8);
        while let Some(HeapEntry { dist: cost, cell }) = heap.pop() {
            // Skip stale heap entries.
            if cost > dist[cell] {
                continue;
            }

            self.neighbors_of(cell, &mut neighbors);
            for &(next, step) in &neighbors {
                // Reciprocal of the corrected conductance: mean cell cost
                // times step length.
                let edge = step * (self.cell_cost[cell] + self.cell_cost[next]) / 2.0;
                let next_cost = cost + edge;
                if next_cost < dist[next] {
                    dist[next] = next_cost;
                    heap.push(HeapEntry {
                        dist: next_cost,
                        cell: next,
                    });
                }
            }
        }

        dist
    }

    /// Adjacent cells of `cell` with their geometric step lengths.
    fn neighbors_of(&self, cell: usize, neighbors: &mut Vec<(usize, f64)>) {
        neighbors.clear();

        let nx = self.grid.nx();
        let ny = self.grid.ny();
        let row = cell / nx;
        let col = cell % nx;
        let step = self.grid.resolution();
        let diag_step = std::f64::consts::SQRT_2 * step;

        let offsets: &[(isize, isize, f64)] = match self.adjacency {
            Adjacency::Four => &[(-1, 0, step), (1, 0, step), (0, -1, step), (0, 1, step)],
            Adjacency::Eight => &[
                (-1, 0, step),
                (1, 0, step),
                (0, -1, step),
                (0, 1, step),
                (-1, -1, diag_step),
                (-1, 1, diag_step),
                (1, -1, diag_step),
                (1, 1, diag_step),
            ],
        };

        for &(dr, dc, length) in offsets {
            let n_row = row as isize + dr;
            let n_col = col as isize + dc;
            if n_row >= 0 && n_row < ny as isize && n_col >= 0 && n_col < nx as isize {
                neighbors.push((n_row as usize * nx + n_col as usize, length));
            }
        }
    }
}

#[derive(PartialEq)]
struct HeapEntry {
    dist: f64,
    cell: usize,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the smallest distance first; the
        // cell index breaks ties deterministically.
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
