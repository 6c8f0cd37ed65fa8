// src/transform/solver.rs
//! Fits affine transforms from calibration points.
//!
//! Strategy selection is deterministic: a locality fit around the query
//! position when one is supplied, an exact/least-squares fit for small
//! point sets, and RANSAC for larger sets where outliers are likely.

use super::affine::CoordinateTransform;
use crate::error::{MapError, Result};
use crate::model::layer::MIN_CALIBRATION_POINTS;
use crate::model::{CalibrationPoint, Position3D};
use rand::seq::index;
use rand::Rng;
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Tunables for the transform solver. Defaults mirror the shipped
/// behavior; the inlier threshold is in map pixels, distances in world
/// units.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Prefer a fit over the calibration points nearest the query position.
    pub use_locality: bool,
    /// How many nearby points a locality fit uses.
    pub locality_points: usize,
    /// Warn when the farthest locality point is beyond this distance.
    pub locality_warn_distance: f64,
    pub ransac_iterations: usize,
    pub ransac_inlier_threshold: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            use_locality: true,
            locality_points: 4,
            locality_warn_distance: 1000.0,
            ransac_iterations: 500,
            ransac_inlier_threshold: 10.0,
        }
    }
}

/// Fit an affine transform from the given calibration points.
///
/// The random generator is injected so RANSAC behaves reproducibly under a
/// fixed seed; it is untouched by the non-RANSAC paths.
pub fn fit_transform<R: Rng>(
    points: &[CalibrationPoint],
    query: Option<&Position3D>,
    options: &SolverOptions,
    rng: &mut R,
) -> Result<CoordinateTransform> {
    let n = points.len();
    if n < MIN_CALIBRATION_POINTS {
        return Err(MapError::DegenerateCalibration(format!(
            "need at least {} calibration points, got {}",
            MIN_CALIBRATION_POINTS, n
        )));
    }

    if let Some(query) = query {
        if options.use_locality {
            return local_fit(points, query, options);
        }
    }

    if n <= 6 {
        // Exact for 3 points, ordinary least squares above that.
        basic_fit(points)
    } else {
        ransac_fit(points, options, rng)
    }
}

/// Fit over the `min(locality_points, n)` points nearest the query in the
/// horizontal plane. A nearby subset tracks local map distortion better
/// than a global fit.
fn local_fit(
    points: &[CalibrationPoint],
    query: &Position3D,
    options: &SolverOptions,
) -> Result<CoordinateTransform> {
    let mut by_distance: Vec<(f64, &CalibrationPoint)> = points
        .iter()
        .map(|p| (query.planar_distance_to(&p.game_pos), p))
        .collect();
    by_distance.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let k = options.locality_points.min(points.len());
    let nearest: Vec<CalibrationPoint> =
        by_distance[..k].iter().map(|(_, p)| (*p).clone()).collect();

    let farthest = by_distance[k - 1].0;
    if farthest > options.locality_warn_distance {
        warn!(
            farthest_distance = farthest,
            threshold = options.locality_warn_distance,
            "locality fit is using distant calibration points"
        );
    }
    debug!(used = k, total = points.len(), "locality fit");

    basic_fit(&nearest)
}

/// Ordinary least squares over design rows `[game_x, game_z, 1]`, solved
/// independently for the map_x and map_y targets via normal equations.
fn basic_fit(points: &[CalibrationPoint]) -> Result<CoordinateTransform> {
    let weights = vec![1.0; points.len()];
    solve_weighted(points, &weights)
}

/// Weighted least squares with Gaussian decay by distance from the
/// centroid, so edge points pull the fit less.
fn weighted_fit(points: &[CalibrationPoint]) -> Result<CoordinateTransform> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.game_pos.x).sum::<f64>() / n;
    let cz = points.iter().map(|p| p.game_pos.z).sum::<f64>() / n;

    let distances: Vec<f64> = points
        .iter()
        .map(|p| {
            let dx = p.game_pos.x - cx;
            let dz = p.game_pos.z - cz;
            (dx * dx + dz * dz).sqrt()
        })
        .collect();
    let max_distance = distances.iter().cloned().fold(0.0, f64::max);
    let max_distance = if max_distance > 0.0 { max_distance } else { 1.0 };

    let weights: Vec<f64> = distances
        .iter()
        .map(|d| (-0.5 * (d / max_distance).powi(2)).exp())
        .collect();

    solve_weighted(points, &weights)
}

/// Solve the (weighted) normal equations for both pixel axes.
fn solve_weighted(points: &[CalibrationPoint], weights: &[f64]) -> Result<CoordinateTransform> {
    // A^T W A and A^T W b accumulated directly; rows are [x, z, 1].
    let mut ata = [[0.0f64; 3]; 3];
    let mut atb_x = [0.0f64; 3];
    let mut atb_y = [0.0f64; 3];

    for (p, &w) in points.iter().zip(weights) {
        let row = [p.game_pos.x, p.game_pos.z, 1.0];
        for i in 0..3 {
            for j in 0..3 {
                ata[i][j] += w * row[i] * row[j];
            }
            atb_x[i] += w * row[i] * p.map_x;
            atb_y[i] += w * row[i] * p.map_y;
        }
    }

    let coeffs_x = solve_3x3(ata, atb_x).ok_or_else(|| {
        MapError::DegenerateCalibration(
            "calibration points are collinear in the horizontal plane".to_string(),
        )
    })?;
    let coeffs_y = solve_3x3(ata, atb_y).ok_or_else(|| {
        MapError::DegenerateCalibration(
            "calibration points are collinear in the horizontal plane".to_string(),
        )
    })?;

    Ok(CoordinateTransform::from_coefficients(
        coeffs_x[0], coeffs_x[1], coeffs_x[2], coeffs_y[0], coeffs_y[1], coeffs_y[2],
    ))
}

/// Random sample consensus: sample minimal 3-point models, score by inlier
/// count under the reprojection threshold, refit the best consensus set.
fn ransac_fit<R: Rng>(
    points: &[CalibrationPoint],
    options: &SolverOptions,
    rng: &mut R,
) -> Result<CoordinateTransform> {
    let n = points.len();
    let mut best_inliers: Vec<usize> = Vec::new();

    for _ in 0..options.ransac_iterations {
        let sample: Vec<CalibrationPoint> = index::sample(rng, n, 3)
            .iter()
            .map(|i| points[i].clone())
            .collect();

        let candidate = match basic_fit(&sample) {
            Ok(t) => t,
            Err(_) => continue, // collinear sample, try another
        };

        let inliers: Vec<usize> = (0..n)
            .filter(|&i| {
                let p = &points[i];
                candidate.reprojection_error(&p.game_pos, p.map_x, p.map_y)
                    < options.ransac_inlier_threshold
            })
            .collect();

        if inliers.len() > best_inliers.len() {
            best_inliers = inliers;
        }
    }

    if best_inliers.len() >= MIN_CALIBRATION_POINTS {
        debug!(inliers = best_inliers.len(), total = n, "RANSAC consensus");
        let consensus: Vec<CalibrationPoint> =
            best_inliers.iter().map(|&i| points[i].clone()).collect();
        if consensus.len() <= 6 {
            basic_fit(&consensus)
        } else {
            weighted_fit(&consensus)
        }
    } else {
        warn!(total = n, "RANSAC found no consensus, using weighted fit over all points");
        weighted_fit(points)
    }
}

/// Gaussian elimination with partial pivoting on a 3x3 system. `None` when
/// the matrix is singular (collinear calibration points).
fn solve_3x3(mut a: [[f64; 3]; 3], mut b: [f64; 3]) -> Option<[f64; 3]> {
    const PIVOT_EPS: f64 = 1e-9;

    for col in 0..3 {
        let mut pivot_row = col;
        for row in (col + 1)..3 {
            if a[row][col].abs() > a[pivot_row][col].abs() {
                pivot_row = row;
            }
        }
        if a[pivot_row][col].abs() < PIVOT_EPS {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..3 {
            let factor = a[row][col] / a[col][col];
            for k in col..3 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0f64; 3];
    for row in (0..3).rev() {
        let mut sum = b[row];
        for k in (row + 1)..3 {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}
