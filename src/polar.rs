// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Polar grid and per-cell statistics.
//!
//! The grid covers the forward cone with `segments × bins` cells stored in a
//! single flat buffer indexed by `segment * bins + bin`. The buffer is
//! allocated once and cleared at the start of every frame; nothing survives
//! from one frame to the next.

use crate::{
    config::GridConfig,
    lidar::Points,
    transform::{CoordinateTransform, PolarIndex},
};

/// Tri-state traversability of a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CellClass {
    Free,
    Occupied,
    /// Not observable: behind an obstacle along the same ray, or not yet
    /// classified this frame.
    #[default]
    Unknown,
}

/// Statistics of one polar cell for the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PolarCell {
    /// Number of points binned into the cell.
    pub count: u32,
    /// Position of the lowest point seen.
    pub x_min: f32,
    pub y_min: f32,
    pub z_min: f32,
    /// Highest z seen.
    pub z_max: f32,
    /// Ground plane height at the cell center.
    pub ground_height: f32,
    /// `z_max - ground_height` for non-empty cells, zero otherwise.
    pub cell_height: f32,
    pub class: CellClass,
}

impl PolarCell {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Fold one point into the cell's min/max statistics.
    #[inline]
    fn add_point(&mut self, x: f32, y: f32, z: f32) {
        self.count += 1;
        if self.count == 1 {
            self.x_min = x;
            self.y_min = y;
            self.z_min = z;
            self.z_max = z;
            return;
        }
        if z < self.z_min {
            self.x_min = x;
            self.y_min = y;
            self.z_min = z;
        }
        if z > self.z_max {
            self.z_max = z;
        }
    }
}

/// Fixed-size polar grid owned by the engine.
#[derive(Debug, Clone)]
pub struct PolarGrid {
    transform: CoordinateTransform,
    cells: Vec<PolarCell>,
}

impl PolarGrid {
    pub fn new(config: &GridConfig) -> Self {
        let transform = CoordinateTransform::new(config);
        Self {
            transform,
            cells: vec![PolarCell::default(); transform.segments() * transform.bins()],
        }
    }

    /// Reset every cell to its empty state without reallocating.
    pub fn reset(&mut self) {
        self.cells.fill(PolarCell::default());
    }

    #[inline]
    pub fn transform(&self) -> &CoordinateTransform {
        &self.transform
    }

    #[inline]
    pub fn segments(&self) -> usize {
        self.transform.segments()
    }

    #[inline]
    pub fn bins(&self) -> usize {
        self.transform.bins()
    }

    #[inline]
    pub fn cell(&self, index: PolarIndex) -> &PolarCell {
        &self.cells[self.transform.flat_index(index)]
    }

    #[inline]
    pub fn cell_mut(&mut self, index: PolarIndex) -> &mut PolarCell {
        let i = self.transform.flat_index(index);
        &mut self.cells[i]
    }

    /// Cell owning the Cartesian position `(x, y)`.
    #[inline]
    pub fn cell_at(&self, x: f32, y: f32) -> &PolarCell {
        self.cell(self.transform.to_polar(x, y))
    }

    /// All bins of one segment, nearest first.
    #[inline]
    pub fn segment(&self, segment: usize) -> &[PolarCell] {
        let bins = self.bins();
        &self.cells[segment * bins..(segment + 1) * bins]
    }

    #[inline]
    pub fn segment_mut(&mut self, segment: usize) -> &mut [PolarCell] {
        let bins = self.bins();
        &mut self.cells[segment * bins..(segment + 1) * bins]
    }

    /// Iterate over all cells in segment-major, bin-minor order.
    pub fn cells(&self) -> impl Iterator<Item = &PolarCell> {
        self.cells.iter()
    }

    /// Number of cells that received at least one point.
    pub fn occupied_cells(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_empty()).count()
    }

    /// Filter `input` and bin the surviving points.
    ///
    /// The grid is reset first. A point is kept when it lies inside the
    /// forward cone (`|atan2(y, x)| < opening_angle`), strictly between the
    /// minimum and maximum range, and strictly above `lidar_min_height`.
    /// Points with a non-finite coordinate are dropped. Kept points are appended to `filtered` (which is cleared first) in
    /// input order.
    pub fn accumulate(&mut self, config: &GridConfig, input: &Points, filtered: &mut Points) {
        self.reset();
        filtered.clear();

        let opening_angle = config.opening_angle();
        let min_range = config.min_range();
        let max_range = config.max_range();
        let min_z = config.lidar_min_height();

        for (x, y, z) in input.iter() {
            if !(x.is_finite() && y.is_finite() && z.is_finite()) {
                continue;
            }
            if !(y.atan2(x).abs() < opening_angle) {
                continue;
            }
            let range = (x * x + y * y).sqrt();
            if !(range > min_range && range < max_range) {
                continue;
            }
            if !(z > min_z) {
                continue;
            }

            filtered.push(x, y, z);
            let index = self.transform.to_polar(x, y);
            self.cell_mut(index).add_point(x, y, z);
        }
    }
}
