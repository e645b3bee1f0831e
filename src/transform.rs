// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Mapping between Cartesian sensor coordinates and polar grid cells.
//!
//! Segments run across the forward cone from the left edge
//! (`atan2(y, x) = +opening_angle`, segment 0) to the right edge (segment
//! `segments - 1`); bins run outward in steps of `cell_size`.

use crate::config::GridConfig;

/// Index of one polar grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolarIndex {
    pub segment: usize,
    pub bin: usize,
}

/// Bidirectional (x, y) <-> (segment, bin) mapping.
///
/// Copies the few values it needs out of [`GridConfig`] so it can be held
/// alongside mutable grid borrows.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateTransform {
    opening_angle: f32,
    inv_angular_res: f32,
    inv_radial_res: f32,
    segments: usize,
    bins: usize,
}

impl CoordinateTransform {
    pub fn new(config: &GridConfig) -> Self {
        Self {
            opening_angle: config.opening_angle(),
            inv_angular_res: config.inv_angular_res(),
            inv_radial_res: config.inv_radial_res(),
            segments: config.segments(),
            bins: config.bins(),
        }
    }

    /// Locate the polar cell owning `(x, y)`.
    ///
    /// The result is always a valid index: coordinates that round outside
    /// the grid are clamped onto its border.
    #[inline]
    pub fn to_polar(&self, x: f32, y: f32) -> PolarIndex {
        let range = (x * x + y * y).sqrt();
        let angle = -y.atan2(x);
        let segment = if x == -y {
            // Exactly on the right cone edge the formula yields `segments`.
            self.segments - 1
        } else {
            clamp_index((angle + self.opening_angle) * self.inv_angular_res, self.segments)
        };
        let bin = clamp_index(range * self.inv_radial_res, self.bins);
        PolarIndex { segment, bin }
    }

    /// Cartesian center of a polar cell.
    ///
    /// Offsets both indices by half a cell, so the point lies inside the
    /// cell rather than on its lower range and angle corner
    /// (`bin / inv_radial_res`, `segment / inv_angular_res - opening_angle`).
    /// Voxel and debug clouds therefore sit on cell centers.
    #[inline]
    pub fn to_cartesian(&self, index: PolarIndex) -> (f32, f32) {
        let range = (index.bin as f32 + 0.5) / self.inv_radial_res;
        let angle = (index.segment as f32 + 0.5) / self.inv_angular_res - self.opening_angle;
        (angle.cos() * range, -angle.sin() * range)
    }

    /// Flat buffer offset of a cell (`segment * bins + bin`).
    #[inline]
    pub fn flat_index(&self, index: PolarIndex) -> usize {
        index.segment * self.bins + index.bin
    }

    #[inline]
    pub fn segments(&self) -> usize {
        self.segments
    }

    #[inline]
    pub fn bins(&self) -> usize {
        self.bins
    }
}

/// Floor `value` and clamp into `[0, len)`. NaN maps to 0.
#[inline]
fn clamp_index(value: f32, len: usize) -> usize {
    let floored = value.floor();
    if !(floored >= 0.0) {
        0
    } else {
        (floored as usize).min(len - 1)
    }
}
