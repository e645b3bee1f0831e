// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! RANSAC plane fitting for ground candidates.
//!
//! Minimal three-point samples are drawn at random and scored by the number
//! of candidates within `tolerance` of the sampled plane. The best consensus
//! is refined by a least-squares fit over its inliers. Samples whose normal
//! is close to horizontal are rejected so the returned plane always has a
//! usable height function.

use crate::{
    ground::{GroundPlane, PlaneFit, PlaneFitter, fit_least_squares},
    lidar::Points,
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, trace};

/// Minimum |normal.z| of an admissible sample (about 84° from vertical).
const MIN_NORMAL_Z: f32 = 0.1;
/// Stop sampling once this fraction of the candidates agrees.
const EARLY_EXIT_RATIO: f32 = 0.9;

/// Random sample consensus plane fitter.
#[derive(Debug, Clone)]
pub struct RansacPlaneFitter {
    rng: StdRng,
    fallback_height: f32,
}

impl RansacPlaneFitter {
    /// Fitter seeded from operating system entropy.
    ///
    /// `fallback_height` is the height of the horizontal plane returned
    /// when no admissible sample exists (typically `-lidar_height`).
    pub fn new(fallback_height: f32) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            fallback_height,
        }
    }

    /// Fitter with a fixed seed for reproducible runs.
    pub fn with_seed(fallback_height: f32, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            fallback_height,
        }
    }

    fn fallback(&self) -> PlaneFit {
        PlaneFit {
            coefficients: GroundPlane::horizontal(self.fallback_height).coefficients(),
            inliers: Vec::new(),
        }
    }

    /// Draw three distinct indices from `0..n`.
    fn sample(&mut self, n: usize) -> [usize; 3] {
        let i0 = self.rng.gen_range(0..n);
        let mut i1 = self.rng.gen_range(0..n);
        while i1 == i0 {
            i1 = self.rng.gen_range(0..n);
        }
        let mut i2 = self.rng.gen_range(0..n);
        while i2 == i0 || i2 == i1 {
            i2 = self.rng.gen_range(0..n);
        }
        [i0, i1, i2]
    }
}

impl PlaneFitter for RansacPlaneFitter {
    fn fit_plane(&mut self, points: &Points, tolerance: f32, max_iterations: usize) -> PlaneFit {
        let n = points.len();
        if n < 3 {
            debug!("ransac: {} candidates, need at least 3", n);
            return self.fallback();
        }

        let early_exit = (n as f32 * EARLY_EXIT_RATIO).ceil() as usize;
        let mut best: Option<GroundPlane> = None;
        let mut best_inliers: Vec<usize> = Vec::new();
        let mut inliers: Vec<usize> = Vec::with_capacity(n);

        for iteration in 0..max_iterations {
            let [i0, i1, i2] = self.sample(n);
            let Some(candidate) = plane_through(points.get(i0), points.get(i1), points.get(i2))
            else {
                continue;
            };

            inliers.clear();
            inliers.extend(
                points
                    .iter()
                    .enumerate()
                    .filter(|(_, (x, y, z))| candidate.distance(*x, *y, *z) <= tolerance)
                    .map(|(i, _)| i),
            );

            if inliers.len() > best_inliers.len() {
                best = Some(candidate);
                std::mem::swap(&mut best_inliers, &mut inliers);
                if best_inliers.len() >= early_exit {
                    trace!("ransac: early exit after {} iterations", iteration + 1);
                    break;
                }
            }
        }

        let Some(plane) = best else {
            debug!("ransac: no admissible sample in {} iterations", max_iterations);
            return self.fallback();
        };

        let coefficients = fit_least_squares(points, &best_inliers)
            .map(GroundPlane::from_coefficients)
            .filter(|refined| refined.c.abs() >= MIN_NORMAL_Z)
            .unwrap_or(plane)
            .coefficients();

        PlaneFit {
            coefficients,
            inliers: best_inliers,
        }
    }
}

/// Plane through three points with a unit normal pointing up.
///
/// Returns `None` for collinear samples and near-vertical planes.
fn plane_through(
    p0: (f32, f32, f32),
    p1: (f32, f32, f32),
    p2: (f32, f32, f32),
) -> Option<GroundPlane> {
    let u = (p1.0 - p0.0, p1.1 - p0.1, p1.2 - p0.2);
    let v = (p2.0 - p0.0, p2.1 - p0.1, p2.2 - p0.2);
    let mut n = (
        u.1 * v.2 - u.2 * v.1,
        u.2 * v.0 - u.0 * v.2,
        u.0 * v.1 - u.1 * v.0,
    );
    let mag = (n.0 * n.0 + n.1 * n.1 + n.2 * n.2).sqrt();
    if !(mag > 1e-9) {
        return None;
    }
    n = (n.0 / mag, n.1 / mag, n.2 / mag);
    if n.2 < 0.0 {
        n = (-n.0, -n.1, -n.2);
    }
    if n.2 < MIN_NORMAL_Z {
        return None;
    }
    let d = -(n.0 * p0.0 + n.1 * p0.1 + n.2 * p0.2);
    Some(GroundPlane {
        a: n.0,
        b: n.1,
        c: n.2,
        d,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ground patch at `z = 0.02 x - 1.7` with a little deterministic noise.
    fn ground_patch(out: &mut Points) {
        for i in 0..20 {
            for j in 0..10 {
                let x = 3.0 + i as f32 * 1.5;
                let y = -6.0 + j as f32 * 1.2;
                let noise = ((i * 7 + j * 3) % 5) as f32 * 0.01 - 0.02;
                out.push(x, y, 0.02 * x - 1.7 + noise);
            }
        }
    }

    #[test]
    fn test_ransac_recovers_plane_with_outliers() {
        let mut points = Points::empty();
        ground_patch(&mut points);
        let n_ground = points.len();
        // Flat-topped obstacles and a wall section.
        for i in 0..30 {
            points.push(8.0 + (i % 5) as f32 * 0.2, 2.0 + (i / 5) as f32 * 0.2, -0.4);
        }
        for i in 0..20 {
            points.push(15.0, -3.0 + (i % 4) as f32 * 0.3, -1.5 + (i / 4) as f32 * 0.4);
        }

        let mut fitter = RansacPlaneFitter::with_seed(-1.73, 7);
        let fit = fitter.fit_plane(&points, 0.1, 100);
        let plane = GroundPlane::from_coefficients(fit.coefficients);

        assert!(plane.c > 0.0, "normal must point up: {plane:?}");
        assert!(
            (plane.height_at(0.0, 0.0) + 1.7).abs() < 0.05,
            "origin height {} should be near -1.7",
            plane.height_at(0.0, 0.0)
        );
        assert!(
            (plane.height_at(30.0, 0.0) + 1.1).abs() < 0.1,
            "far height {} should follow the slope",
            plane.height_at(30.0, 0.0)
        );
        let ground_inliers = fit.inliers.iter().filter(|&&i| i < n_ground).count();
        assert!(
            ground_inliers > n_ground * 9 / 10,
            "most ground points are inliers: {ground_inliers}/{n_ground}"
        );
        assert!(
            fit.inliers.iter().all(|&i| i < n_ground || points.get(i).2 < -1.3),
            "obstacle tops must not be inliers"
        );
    }

    #[test]
    fn test_ransac_seed_is_reproducible() {
        let mut points = Points::empty();
        ground_patch(&mut points);
        points.push(10.0, 0.0, 1.0);
        points.push(11.0, 0.5, 1.2);

        let a = RansacPlaneFitter::with_seed(-1.73, 42).fit_plane(&points, 0.05, 20);
        let b = RansacPlaneFitter::with_seed(-1.73, 42).fit_plane(&points, 0.05, 20);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ransac_too_few_points() {
        let points = Points::from_xyz([(5.0, 0.0, -1.7), (6.0, 1.0, -1.7)]);
        let fit = RansacPlaneFitter::with_seed(-1.73, 1).fit_plane(&points, 0.2, 50);
        assert!(fit.inliers.is_empty());
        assert_eq!(fit.coefficients, GroundPlane::horizontal(-1.73).coefficients());
    }

    #[test]
    fn test_ransac_rejects_vertical_samples() {
        // Every triple lies on the wall x = 5.
        let mut wall = Points::empty();
        for i in 0..6 {
            for k in 0..4 {
                wall.push(5.0, i as f32 * 0.5, k as f32 * 0.5 - 1.0);
            }
        }
        let fit = RansacPlaneFitter::with_seed(-1.73, 3).fit_plane(&wall, 0.1, 30);
        assert!(fit.inliers.is_empty(), "no admissible sample on a wall");
        assert_eq!(fit.coefficients[2], 1.0);
    }

    #[test]
    fn test_plane_through_orientation() {
        let plane = plane_through((0.0, 0.0, -1.0), (0.0, 1.0, -1.0), (1.0, 0.0, -1.0)).unwrap();
        assert!((plane.c - 1.0).abs() < 1e-6);
        assert!((plane.height_at(3.0, 4.0) + 1.0).abs() < 1e-6);

        assert!(plane_through((0.0, 0.0, 0.0), (1.0, 1.0, 1.0), (2.0, 2.0, 2.0)).is_none());
    }
}
