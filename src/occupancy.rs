// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Cartesian occupancy grid and the polar-to-Cartesian remap.
//!
//! The grid is `grid_width` columns by `grid_height` rows, row-major. Row 0
//! is the far edge (`x = max_range - cell_size / 2`) and column 0 the left
//! edge (`y = max_range - cell_size / 2`). Row `j` only covers columns
//! `j..grid_width - j`, the triangle inside the forward cone; everything
//! else holds [`MASKED`] from construction on and is never written.

use crate::{
    config::GridConfig,
    lidar::Points,
    polar::{CellClass, PolarGrid},
};

pub const MASKED: i8 = -1;
pub const FREE: i8 = 0;
pub const UNKNOWN: i8 = 50;
pub const OCCUPIED: i8 = 100;

impl CellClass {
    /// Occupancy value published for this class.
    #[inline]
    pub fn occupancy(self) -> i8 {
        match self {
            CellClass::Free => FREE,
            CellClass::Unknown => UNKNOWN,
            CellClass::Occupied => OCCUPIED,
        }
    }
}

/// Number of grid cells per occupancy value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellCounts {
    pub masked: usize,
    pub free: usize,
    pub unknown: usize,
    pub occupied: usize,
}

/// Row-major occupancy grid with fixed metadata.
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    width: usize,
    height: usize,
    resolution: f32,
    max_range: f32,
    lidar_height: f32,
    data: Vec<i8>,
}

impl OccupancyGrid {
    /// Allocate the grid with every cell masked.
    pub fn new(config: &GridConfig) -> Self {
        let width = config.grid_width();
        let height = config.grid_height();
        Self {
            width,
            height,
            resolution: config.cell_size(),
            max_range: config.max_range(),
            lidar_height: config.lidar_height(),
            data: vec![MASKED; width * height],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Cell edge length in meters.
    #[inline]
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// Grid origin `(max_range, max_range, lidar_height)` in the sensor frame.
    pub fn origin(&self) -> (f32, f32, f32) {
        (self.max_range, self.max_range, self.lidar_height)
    }

    #[inline]
    pub fn data(&self) -> &[i8] {
        &self.data
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> i8 {
        self.data[row * self.width + col]
    }

    /// True for cells outside the forward cone.
    #[inline]
    pub fn is_masked(&self, row: usize, col: usize) -> bool {
        col < row || col >= self.width.saturating_sub(row)
    }

    pub fn counts(&self) -> CellCounts {
        let mut counts = CellCounts::default();
        for &v in &self.data {
            match v {
                FREE => counts.free += 1,
                UNKNOWN => counts.unknown += 1,
                OCCUPIED => counts.occupied += 1,
                _ => counts.masked += 1,
            }
        }
        counts
    }

    /// Resample the classified polar grid onto the Cartesian grid.
    ///
    /// Every visited cell receives the occupancy of the polar cell under its
    /// center and one ground voxel at the cell's ground height. Occupied
    /// cells additionally get a column of elevated voxels from the ground up
    /// to (excluding) `z_max`, one per `cell_size`, at most `grid_height`
    /// voxels tall. Both voxel clouds are cleared first.
    pub fn remap(
        &mut self,
        grid: &PolarGrid,
        voxel_ground: &mut Points,
        voxel_elevated: &mut Points,
    ) {
        voxel_ground.clear();
        voxel_elevated.clear();

        let cell = self.resolution;
        let start = self.max_range - cell / 2.0;
        let transform = grid.transform();

        for j in 0..self.height {
            let x = start - j as f32 * cell;
            let row = j * self.width;
            for i in j..self.width - j {
                let y = start - i as f32 * cell;
                let polar = grid.cell(transform.to_polar(x, y));

                self.data[row + i] = polar.class.occupancy();
                voxel_ground.push(x, y, polar.ground_height);

                if polar.class == CellClass::Occupied {
                    for k in 0..column_voxels(polar.ground_height, polar.z_max, cell, self.height) {
                        voxel_elevated.push(x, y, polar.ground_height + k as f32 * cell);
                    }
                }
            }
        }
    }
}

/// Number of voxels `ground + k * cell` strictly below `top`, capped at `max`.
fn column_voxels(ground: f32, top: f32, cell: f32, max: usize) -> usize {
    let steps = ((top - ground) / cell).ceil();
    if steps > 0.0 {
        (steps as usize).min(max)
    } else {
        0
    }
}
