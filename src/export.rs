//! Flat-text and MessagePack exports of scenario results.
//!
//! Vectors are written one value per line, matrices and coordinate lists as
//! whitespace-delimited rows; the full structured bundle goes to a
//! MessagePack file.

use crate::config::Scenario;
use crate::fit::FitResult;
use crate::landscape::Point;
use anyhow::{Context, Result};
use ndarray::{Array1, Array2};
use rmp_serde::encode;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Full structured result bundle of one scenario run.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario: Scenario,
    pub activity_centers: Vec<Point>,
    pub detections: Array2<u32>,
    pub fit: FitResult,
    pub density: Array1<f64>,
    pub potential: Array1<f64>,
    pub weighted: Array1<f64>,
}

/// Write a vector with one value per line.
pub fn write_vector<P: AsRef<Path>>(file: P, values: &Array1<f64>) -> Result<()> {
    let file = file.as_ref();
    let out = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(out);
    for value in values {
        writeln!(writer, "{value}")?;
    }
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}

/// Write a matrix with one whitespace-delimited row per line.
pub fn write_matrix<P: AsRef<Path>>(file: P, matrix: &Array2<f64>) -> Result<()> {
    let file = file.as_ref();
    let out = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(out);
    for row in matrix.outer_iter() {
        let line: Vec<String> = row.iter().map(|value| value.to_string()).collect();
        writeln!(writer, "{}", line.join(" "))?;
    }
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}

/// Write an integer count matrix with one whitespace-delimited row per line.
pub fn write_counts<P: AsRef<Path>>(file: P, matrix: &Array2<u32>) -> Result<()> {
    let file = file.as_ref();
    let out = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(out);
    for row in matrix.outer_iter() {
        let line: Vec<String> = row.iter().map(|count| count.to_string()).collect();
        writeln!(writer, "{}", line.join(" "))?;
    }
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}

/// Write a coordinate list with one `x y` pair per line.
pub fn write_points<P: AsRef<Path>>(file: P, points: &[Point]) -> Result<()> {
    let file = file.as_ref();
    let out = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(out);
    for point in points {
        writeln!(writer, "{} {}", point.x, point.y)?;
    }
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}

/// Write the structured result bundle as MessagePack.
pub fn write_bundle<P: AsRef<Path>>(file: P, result: &ScenarioResult) -> Result<()> {
    let file = file.as_ref();
    let out = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
    let mut writer = BufWriter::new(out);
    encode::write(&mut writer, result).context("failed to serialize scenario result")?;
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}
