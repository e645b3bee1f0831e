// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Grid geometry and processing parameters.
//!
//! [`GridParams`] holds the externally supplied parameters. [`GridConfig`] is
//! built from them exactly once at startup, validates them, computes every
//! derived quantity and is read-only afterwards. All per-frame stages take
//! it by reference.

use crate::lidar::Error;
use std::f32::consts::FRAC_PI_4;
use tracing::info;

/// Half-angle of the usable forward cone (radians). Not configurable.
pub const OPENING_ANGLE: f32 = FRAC_PI_4;

/// Primary parameters as supplied by the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct GridParams {
    /// Mounting height of the sensor above ground (meters).
    pub lidar_height: f32,
    /// Points at or below this z (sensor frame) are discarded.
    pub lidar_min_height: f32,
    /// Points at or closer than this horizontal range are discarded.
    pub grid_min_range: f32,
    /// Points at or beyond this horizontal range are discarded.
    pub grid_max_range: f32,
    /// Radial resolution of the polar grid and resolution of the
    /// occupancy grid (meters).
    pub grid_cell_size: f32,
    /// Vertical extent separating flat ground cells from obstacles (meters).
    pub grid_min_height: f32,
    /// Number of angular segments across the forward cone.
    pub grid_segments: usize,
    /// RANSAC inlier distance (meters).
    pub ransac_tolerance: f32,
    /// RANSAC iteration bound.
    pub ransac_iterations: usize,
    /// Lower edge of the plausible ground height at the sensor origin.
    pub ground_height_min: f32,
    /// Upper edge of the plausible ground height at the sensor origin.
    pub ground_height_max: f32,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            lidar_height: 1.73,
            lidar_min_height: -2.5,
            grid_min_range: 2.5,
            grid_max_range: 35.0,
            grid_cell_size: 0.25,
            grid_min_height: 0.3,
            grid_segments: 360,
            ransac_tolerance: 0.2,
            ransac_iterations: 50,
            ground_height_min: -2.0,
            ground_height_max: -1.5,
        }
    }
}

/// Immutable grid configuration with all derived geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    lidar_height: f32,
    lidar_min_height: f32,
    opening_angle: f32,
    min_range: f32,
    max_range: f32,
    cell_size: f32,
    min_height: f32,
    segments: usize,
    ransac_tolerance: f32,
    ransac_iterations: usize,
    ground_band: (f32, f32),

    bins: usize,
    grid_height: usize,
    grid_width: usize,
    inv_angular_res: f32,
    inv_radial_res: f32,
}

impl GridConfig {
    /// Validate `params` and compute the derived geometry.
    pub fn new(params: GridParams) -> Result<Self, Error> {
        let GridParams {
            lidar_height,
            lidar_min_height,
            grid_min_range,
            grid_max_range,
            grid_cell_size,
            grid_min_height,
            grid_segments,
            ransac_tolerance,
            ransac_iterations,
            ground_height_min,
            ground_height_max,
        } = params;

        let finite = [
            ("lidar_height", lidar_height),
            ("lidar_min_height", lidar_min_height),
            ("grid_min_range", grid_min_range),
            ("grid_max_range", grid_max_range),
            ("grid_cell_size", grid_cell_size),
            ("grid_min_height", grid_min_height),
            ("ransac_tolerance", ransac_tolerance),
            ("ground_height_min", ground_height_min),
            ("ground_height_max", ground_height_max),
        ];
        if let Some((name, _)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::Config(format!("{name} must be finite")));
        }
        if grid_cell_size <= 0.0 {
            return Err(Error::Config(format!(
                "grid_cell_size must be positive, got {grid_cell_size}"
            )));
        }
        if grid_min_range < 0.0 || grid_max_range <= grid_min_range {
            return Err(Error::Config(format!(
                "grid range must satisfy 0 <= min < max, got [{grid_min_range}, {grid_max_range}]"
            )));
        }
        if grid_segments == 0 {
            return Err(Error::Config("grid_segments must be at least 1".into()));
        }
        if ransac_iterations == 0 {
            return Err(Error::Config("ransac_iterations must be at least 1".into()));
        }
        if ransac_tolerance < 0.0 {
            return Err(Error::Config(format!(
                "ransac_tolerance must not be negative, got {ransac_tolerance}"
            )));
        }
        if ground_height_min > ground_height_max {
            return Err(Error::Config(format!(
                "ground height band is inverted: [{ground_height_min}, {ground_height_max}]"
            )));
        }

        // Integer geometry is derived in f64 so that e.g. 60 * sqrt(2) / 1
        // floors to 84 rather than drifting with f32 rounding.
        let max_range = grid_max_range as f64;
        let cell_size = grid_cell_size as f64;
        let grid_height = (max_range / cell_size).floor() as usize;
        let bins = (max_range * std::f64::consts::SQRT_2 / cell_size).floor() as usize + 1;
        if grid_height == 0 {
            return Err(Error::Config(format!(
                "grid_max_range {grid_max_range} is smaller than one cell of {grid_cell_size}"
            )));
        }

        Ok(Self {
            lidar_height,
            lidar_min_height,
            opening_angle: OPENING_ANGLE,
            min_range: grid_min_range,
            max_range: grid_max_range,
            cell_size: grid_cell_size,
            min_height: grid_min_height,
            segments: grid_segments,
            ransac_tolerance,
            ransac_iterations,
            ground_band: (ground_height_min, ground_height_max),
            bins,
            grid_height,
            grid_width: grid_height * 2,
            inv_angular_res: (2.0 * grid_segments as f64 / std::f64::consts::PI) as f32,
            inv_radial_res: (1.0 / cell_size) as f32,
        })
    }

    /// Log every parameter once at startup.
    pub fn log_summary(&self) {
        info!("grid_height {}", self.grid_height);
        info!("grid_width {}", self.grid_width);
        info!("grid_cell_size {}", self.cell_size);
        info!("grid_min_height {}", self.min_height);
        info!("grid_bins {}", self.bins);
        info!("grid_segments {}", self.segments);
        info!("ransac_tolerance {}", self.ransac_tolerance);
        info!("ransac_iterations {}", self.ransac_iterations);
        info!("inv_angular_res {}", self.inv_angular_res);
        info!("inv_radial_res {}", self.inv_radial_res);
    }

    #[inline]
    pub fn lidar_height(&self) -> f32 {
        self.lidar_height
    }

    #[inline]
    pub fn lidar_min_height(&self) -> f32 {
        self.lidar_min_height
    }

    #[inline]
    pub fn opening_angle(&self) -> f32 {
        self.opening_angle
    }

    #[inline]
    pub fn min_range(&self) -> f32 {
        self.min_range
    }

    #[inline]
    pub fn max_range(&self) -> f32 {
        self.max_range
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Flatness / obstacle threshold.
    #[inline]
    pub fn min_height(&self) -> f32 {
        self.min_height
    }

    #[inline]
    pub fn segments(&self) -> usize {
        self.segments
    }

    #[inline]
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Number of occupancy grid rows.
    #[inline]
    pub fn grid_height(&self) -> usize {
        self.grid_height
    }

    /// Number of occupancy grid columns.
    #[inline]
    pub fn grid_width(&self) -> usize {
        self.grid_width
    }

    #[inline]
    pub fn inv_angular_res(&self) -> f32 {
        self.inv_angular_res
    }

    #[inline]
    pub fn inv_radial_res(&self) -> f32 {
        self.inv_radial_res
    }

    #[inline]
    pub fn ransac_tolerance(&self) -> f32 {
        self.ransac_tolerance
    }

    #[inline]
    pub fn ransac_iterations(&self) -> usize {
        self.ransac_iterations
    }

    /// Plausible `(min, max)` ground height at the sensor origin.
    #[inline]
    pub fn ground_band(&self) -> (f32, f32) {
        self.ground_band
    }
}
