// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Ground plane estimation from the polar grid.
//!
//! 1. **Candidates**: every non-empty cell whose vertical extent is below
//!    `min_height` is locally flat; its lowest point becomes a ground
//!    candidate.
//!
//! 2. **Plane fit**: the candidates are handed to a [`PlaneFitter`]
//!    (RANSAC by default, see [`crate::ransac`]) which returns the plane
//!    coefficients and the inlier indices.
//!
//! 3. **Plausibility**: the ground height under the sensor must be inside
//!    the configured band. A failed check is logged and the frame continues
//!    with the fitted plane.

use crate::{config::GridConfig, lidar::Points, polar::PolarGrid};
use tracing::{debug, warn};

/// Smallest |c| accepted before the plane is considered vertical.
const MIN_NORMAL_Z: f32 = 1e-6;

/// Plane `a·x + b·y + c·z + d = 0` with `c != 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundPlane {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
}

impl GroundPlane {
    pub fn from_coefficients([a, b, c, d]: [f32; 4]) -> Self {
        Self { a, b, c, d }
    }

    /// Horizontal plane at height `z`.
    pub fn horizontal(z: f32) -> Self {
        Self {
            a: 0.0,
            b: 0.0,
            c: 1.0,
            d: -z,
        }
    }

    pub fn coefficients(&self) -> [f32; 4] {
        [self.a, self.b, self.c, self.d]
    }

    /// Height of the plane above `(x, y)`.
    #[inline]
    pub fn height_at(&self, x: f32, y: f32) -> f32 {
        -(self.a * x + self.b * y + self.d) / self.c
    }

    /// Perpendicular distance of a point from the plane.
    #[inline]
    pub fn distance(&self, x: f32, y: f32, z: f32) -> f32 {
        let norm = (self.a * self.a + self.b * self.b + self.c * self.c).sqrt();
        (self.a * x + self.b * y + self.c * z + self.d).abs() / norm
    }

    fn is_usable(&self) -> bool {
        self.coefficients().iter().all(|v| v.is_finite()) && self.c.abs() > MIN_NORMAL_Z
    }
}

/// Result of one plane fit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaneFit {
    pub coefficients: [f32; 4],
    /// Indices into the candidate set of the points supporting the plane.
    pub inliers: Vec<usize>,
}

/// Plane fitting capability used by the ground estimator.
///
/// Implementations must return a plane whose normal has a non-zero z
/// component. An empty inlier set signals a degraded fit.
pub trait PlaneFitter {
    fn fit_plane(&mut self, points: &Points, tolerance: f32, max_iterations: usize) -> PlaneFit;
}

impl<F: PlaneFitter + ?Sized> PlaneFitter for Box<F> {
    fn fit_plane(&mut self, points: &Points, tolerance: f32, max_iterations: usize) -> PlaneFit {
        (**self).fit_plane(points, tolerance, max_iterations)
    }
}

/// Plane fitter that always returns the same plane.
///
/// Used when the ground is known from calibration and as a deterministic
/// stand-in for RANSAC. Inliers are the points within `tolerance`.
#[derive(Debug, Clone, Copy)]
pub struct FixedPlane {
    plane: GroundPlane,
}

impl FixedPlane {
    pub fn new(plane: GroundPlane) -> Self {
        Self { plane }
    }

    /// Flat ground `height` meters below the sensor.
    pub fn below_sensor(height: f32) -> Self {
        Self::new(GroundPlane::horizontal(-height))
    }
}

impl PlaneFitter for FixedPlane {
    fn fit_plane(&mut self, points: &Points, tolerance: f32, _max_iterations: usize) -> PlaneFit {
        let inliers = points
            .iter()
            .enumerate()
            .filter(|(_, (x, y, z))| self.plane.distance(*x, *y, *z) <= tolerance)
            .map(|(i, _)| i)
            .collect();
        PlaneFit {
            coefficients: self.plane.coefficients(),
            inliers,
        }
    }
}

/// Outcome of ground estimation for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundEstimate {
    pub plane: GroundPlane,
    pub inliers: usize,
    /// Ground height under the sensor, `plane.height_at(0, 0)`.
    pub origin_height: f32,
    /// False when the fit had no inliers or `origin_height` is outside the
    /// configured band.
    pub plausible: bool,
}

/// Collect the lowest point of every flat, non-empty cell.
///
/// Output order is segment-major, bin-minor. `out` is cleared first.
pub fn select_candidates(grid: &PolarGrid, min_height: f32, out: &mut Points) {
    out.clear();
    for cell in grid.cells() {
        if cell.count > 0 && (cell.z_max - cell.z_min) < min_height {
            out.push(cell.x_min, cell.y_min, cell.z_min);
        }
    }
}

/// Fit the ground plane to `candidates` and check it for plausibility.
pub fn estimate<F: PlaneFitter + ?Sized>(
    fitter: &mut F,
    config: &GridConfig,
    candidates: &Points,
) -> GroundEstimate {
    let fit = fitter.fit_plane(
        candidates,
        config.ransac_tolerance(),
        config.ransac_iterations(),
    );

    let mut plane = GroundPlane::from_coefficients(fit.coefficients);
    if !plane.is_usable() {
        warn!(
            "plane fitter returned unusable coefficients {:?}, assuming flat ground",
            fit.coefficients
        );
        plane = GroundPlane::horizontal(-config.lidar_height());
    }

    let origin_height = plane.height_at(0.0, 0.0);
    let (band_min, band_max) = config.ground_band();
    let plausible = !fit.inliers.is_empty() && origin_height >= band_min && origin_height <= band_max;
    if !plausible {
        warn!(
            "implausible ground plane: {} inliers of {} candidates, height {:.3} outside [{}, {}]",
            fit.inliers.len(),
            candidates.len(),
            origin_height,
            band_min,
            band_max
        );
    } else {
        debug!(
            "ground plane {:?} height {:.3} from {}/{} inliers",
            plane.coefficients(),
            origin_height,
            fit.inliers.len(),
            candidates.len()
        );
    }

    GroundEstimate {
        plane,
        inliers: fit.inliers.len(),
        origin_height,
        plausible,
    }
}

/// Least-squares plane through the selected points.
///
/// The normal is the eigenvector of the smallest covariance eigenvalue,
/// oriented so that `c >= 0`. Returns `None` for fewer than three points or
/// a degenerate (vertical) result.
pub(crate) fn fit_least_squares(points: &Points, indices: &[usize]) -> Option<[f32; 4]> {
    if indices.len() < 3 {
        return None;
    }

    let inv_n = 1.0 / indices.len() as f64;
    let (mut cx, mut cy, mut cz) = (0.0f64, 0.0f64, 0.0f64);
    for &i in indices {
        let (x, y, z) = points.get(i);
        cx += x as f64;
        cy += y as f64;
        cz += z as f64;
    }
    cx *= inv_n;
    cy *= inv_n;
    cz *= inv_n;

    let mut cov = [0.0f64; 6];
    for &i in indices {
        let (x, y, z) = points.get(i);
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let dz = z as f64 - cz;
        cov[0] += dx * dx;
        cov[1] += dx * dy;
        cov[2] += dx * dz;
        cov[3] += dy * dy;
        cov[4] += dy * dz;
        cov[5] += dz * dz;
    }
    let cov = cov.map(|c| (c * inv_n) as f32);

    let (eigenvalues, eigenvectors) = sym3x3_eigen(cov);
    let mut normal = eigenvectors[smallest_eigenvalue_index(eigenvalues)];
    if normal[2] < 0.0 {
        normal = normal.map(|v| -v);
    }
    if normal[2] <= MIN_NORMAL_Z {
        return None;
    }

    let d = -(normal[0] as f64 * cx + normal[1] as f64 * cy + normal[2] as f64 * cz) as f32;
    Some([normal[0], normal[1], normal[2], d])
}

fn smallest_eigenvalue_index(eigenvalues: [f32; 3]) -> usize {
    if eigenvalues[0] <= eigenvalues[1] && eigenvalues[0] <= eigenvalues[2] {
        0
    } else if eigenvalues[1] <= eigenvalues[2] {
        1
    } else {
        2
    }
}

/// Eigendecomposition of a 3×3 symmetric matrix given as
/// `[a11, a12, a13, a22, a23, a33]`.
///
/// Uses the analytical method described by Smith (1961) / Kopp (2008).
fn sym3x3_eigen(cov: [f32; 6]) -> ([f32; 3], [[f32; 3]; 3]) {
    let [a11, a12, a13, a22, a23, a33] = cov.map(|v| v as f64);

    let q = (a11 + a22 + a33) / 3.0;
    let p1 = a12 * a12 + a13 * a13 + a23 * a23;

    let eigenvalues = if p1 < 1e-30 {
        let mut evs = [a11 as f32, a22 as f32, a33 as f32];
        evs.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        evs
    } else {
        let p2 = (a11 - q) * (a11 - q) + (a22 - q) * (a22 - q) + (a33 - q) * (a33 - q) + 2.0 * p1;
        let p = (p2 / 6.0).sqrt();
        let inv_p = 1.0 / p;

        let b11 = (a11 - q) * inv_p;
        let b12 = a12 * inv_p;
        let b13 = a13 * inv_p;
        let b22 = (a22 - q) * inv_p;
        let b23 = a23 * inv_p;
        let b33 = (a33 - q) * inv_p;

        let half_det = (b11 * b22 * b33 + 2.0 * b12 * b13 * b23
            - b11 * b23 * b23
            - b22 * b13 * b13
            - b33 * b12 * b12)
            / 2.0;

        let phi = half_det.clamp(-1.0, 1.0).acos() / 3.0;

        let e1 = (q + 2.0 * p * phi.cos()) as f32;
        let e3 = (q + 2.0 * p * (phi + std::f64::consts::TAU / 3.0).cos()) as f32;
        let e2 = 3.0 * q as f32 - e1 - e3;
        [e1, e2, e3]
    };

    let mat = [a11, a12, a13, a22, a23, a33];
    let eigenvectors = eigenvalues.map(|lambda| eigenvector_for(mat, lambda as f64));

    (eigenvalues, eigenvectors)
}

/// Eigenvector of a 3×3 symmetric matrix for eigenvalue `lambda`.
///
/// Takes the largest cross product of the rows of `mat - lambda·I`.
fn eigenvector_for(mat: [f64; 6], lambda: f64) -> [f32; 3] {
    let m00 = mat[0] - lambda;
    let m01 = mat[1];
    let m02 = mat[2];
    let m11 = mat[3] - lambda;
    let m12 = mat[4];
    let m22 = mat[5] - lambda;

    let rows = [[m00, m01, m02], [m01, m11, m12], [m02, m12, m22]];
    let cross = |a: [f64; 3], b: [f64; 3]| {
        [
            a[1] * b[2] - a[2] * b[1],
            a[2] * b[0] - a[0] * b[2],
            a[0] * b[1] - a[1] * b[0],
        ]
    };
    let candidates = [
        cross(rows[0], rows[1]),
        cross(rows[0], rows[2]),
        cross(rows[1], rows[2]),
    ];

    let (v, mag) = candidates
        .iter()
        .map(|v| (*v, v[0] * v[0] + v[1] * v[1] + v[2] * v[2]))
        .fold(([0.0; 3], 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });

    if mag < 1e-30 {
        return [0.0, 0.0, 1.0];
    }

    let inv = 1.0 / mag.sqrt();
    [(v[0] * inv) as f32, (v[1] * inv) as f32, (v[2] * inv) as f32]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridParams;

    fn config() -> GridConfig {
        GridConfig::new(GridParams {
            lidar_height: 1.73,
            grid_min_range: 2.0,
            grid_max_range: 60.0,
            grid_cell_size: 1.0,
            grid_segments: 90,
            grid_min_height: 0.3,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_height_at_tilted_plane() {
        // z = 0.1 x - 1.7  ->  -0.1 x + z + 1.7 = 0
        let plane = GroundPlane::from_coefficients([-0.1, 0.0, 1.0, 1.7]);
        assert!((plane.height_at(0.0, 0.0) + 1.7).abs() < 1e-6);
        assert!((plane.height_at(10.0, 3.0) + 0.7).abs() < 1e-6);
        assert_eq!(GroundPlane::horizontal(-1.7).height_at(5.0, -5.0), -1.7);
    }

    #[test]
    fn test_select_candidates_skips_tall_and_empty_cells() {
        let config = config();
        let mut grid = PolarGrid::new(&config);
        let mut filtered = Points::empty();
        let input = Points::from_xyz([
            // Flat cell: two ground returns
            (10.2, 0.1, -1.70),
            (10.4, 0.1, -1.65),
            // Tall cell: a post
            (20.2, -2.0, -1.70),
            (20.3, -2.0, 0.50),
        ]);
        grid.accumulate(&config, &input, &mut filtered);

        let mut candidates = Points::empty();
        select_candidates(&grid, config.min_height(), &mut candidates);
        assert_eq!(candidates.len(), 1, "only the flat cell is a candidate");
        assert_eq!(candidates.get(0), (10.2, 0.1, -1.70));
    }

    #[test]
    fn test_fixed_plane_inliers() {
        let points = Points::from_xyz([(5.0, 0.0, -1.7), (6.0, 1.0, -1.6), (7.0, 0.0, -0.5)]);
        let mut fitter = FixedPlane::below_sensor(1.7);
        let fit = fitter.fit_plane(&points, 0.2, 50);
        assert_eq!(fit.coefficients, [0.0, 0.0, 1.0, 1.7]);
        assert_eq!(fit.inliers, vec![0, 1]);
    }

    #[test]
    fn test_estimate_plausible() {
        let config = config();
        let candidates = Points::from_xyz([(5.0, 0.0, -1.7), (6.0, 1.0, -1.72), (9.0, -1.0, -1.69)]);
        let estimate = estimate(&mut FixedPlane::below_sensor(1.7), &config, &candidates);
        assert!(estimate.plausible);
        assert_eq!(estimate.inliers, 3);
        assert!((estimate.origin_height + 1.7).abs() < 1e-6);
    }

    #[test]
    fn test_estimate_implausible_keeps_plane() {
        let config = config();
        let candidates = Points::from_xyz([(5.0, 0.0, -0.5), (6.0, 1.0, -0.5), (9.0, -1.0, -0.5)]);

        // Fit is good but the ground is far too high.
        let estimate = estimate(&mut FixedPlane::below_sensor(0.5), &config, &candidates);
        assert!(!estimate.plausible, "height -0.5 is outside [-2.0, -1.5]");
        assert_eq!(estimate.plane, GroundPlane::horizontal(-0.5));

        // No inliers at all.
        let estimate = super::estimate(&mut FixedPlane::below_sensor(1.7), &config, &candidates);
        assert!(!estimate.plausible, "empty inlier set must be flagged");
        assert_eq!(estimate.inliers, 0);
        assert_eq!(estimate.plane, GroundPlane::horizontal(-1.7));
    }

    #[test]
    fn test_estimate_replaces_vertical_plane() {
        struct Vertical;
        impl PlaneFitter for Vertical {
            fn fit_plane(&mut self, _: &Points, _: f32, _: usize) -> PlaneFit {
                PlaneFit {
                    coefficients: [1.0, 0.0, 0.0, -3.0],
                    inliers: vec![0],
                }
            }
        }

        let config = config();
        let estimate = estimate(&mut Vertical, &config, &Points::from_xyz([(3.0, 0.0, 0.0)]));
        assert_eq!(estimate.plane, GroundPlane::horizontal(-config.lidar_height()));
    }

    #[test]
    fn test_least_squares_tilted_plane() {
        // z = 0.05 x - 0.02 y - 1.6
        let mut points = Points::empty();
        for i in 0..10 {
            for j in 0..10 {
                let x = 3.0 + i as f32;
                let y = -5.0 + j as f32;
                points.push(x, y, 0.05 * x - 0.02 * y - 1.6);
            }
        }
        let indices: Vec<usize> = (0..points.len()).collect();
        let coefficients = fit_least_squares(&points, &indices).unwrap();
        let plane = GroundPlane::from_coefficients(coefficients);

        assert!(plane.c > 0.0, "normal must point up");
        assert!((plane.height_at(0.0, 0.0) + 1.6).abs() < 1e-3);
        assert!((plane.height_at(10.0, 2.0) - (0.5 - 0.04 - 1.6)).abs() < 1e-3);
    }

    #[test]
    fn test_least_squares_degenerate() {
        let points = Points::from_xyz([(1.0, 0.0, 0.0), (2.0, 0.0, 0.0)]);
        assert!(fit_least_squares(&points, &[0, 1]).is_none());

        // A vertical wall has no usable ground normal.
        let wall = Points::from_xyz([(5.0, 0.0, 0.0), (5.0, 1.0, 0.0), (5.0, 0.0, 1.0), (5.0, 1.0, 1.0)]);
        assert!(fit_least_squares(&wall, &[0, 1, 2, 3]).is_none());
    }

    #[test]
    fn test_sym3x3_eigen_diagonal() {
        let (eigenvalues, eigenvectors) = sym3x3_eigen([4.0, 0.0, 0.0, 2.0, 0.0, 0.5]);
        assert_eq!(eigenvalues, [4.0, 2.0, 0.5]);
        let n = eigenvectors[smallest_eigenvalue_index(eigenvalues)];
        assert!(n[2].abs() > 0.99, "smallest eigenvalue is along z: {n:?}");
    }
}
