// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Cell classification and ground/elevated point partition.

use crate::{
    ground::GroundPlane,
    lidar::Points,
    polar::{CellClass, PolarGrid},
    transform::PolarIndex,
};

/// Classify every cell of `grid` against `plane`.
///
/// Each segment is walked outward from the sensor. A cell taller than
/// `min_height` above the ground is `Occupied` and shadows every farther
/// cell of the same segment that is not itself occupied, which becomes
/// `Unknown`. Cells before the first obstacle are `Free`.
pub fn classify_cells(grid: &mut PolarGrid, plane: &GroundPlane, min_height: f32) {
    let transform = *grid.transform();
    for segment in 0..grid.segments() {
        let mut occluded = false;
        for (bin, cell) in grid.segment_mut(segment).iter_mut().enumerate() {
            let (x, y) = transform.to_cartesian(PolarIndex { segment, bin });
            cell.ground_height = plane.height_at(x, y);

            if cell.is_empty() {
                cell.cell_height = 0.0;
            } else {
                cell.cell_height = cell.z_max - cell.ground_height;
                if cell.cell_height > min_height {
                    cell.class = CellClass::Occupied;
                    occluded = true;
                    continue;
                }
            }
            cell.class = if occluded {
                CellClass::Unknown
            } else {
                CellClass::Free
            };
        }
    }
}

/// Split `filtered` into ground and elevated points.
///
/// A point is elevated when it is above the ground height stored in its
/// cell and the cell itself is taller than `min_height`. Both outputs are
/// cleared first; every filtered point lands in exactly one of them.
pub fn partition_points(
    grid: &PolarGrid,
    filtered: &Points,
    min_height: f32,
    ground: &mut Points,
    elevated: &mut Points,
) {
    ground.clear();
    elevated.clear();
    for (x, y, z) in filtered.iter() {
        let cell = grid.cell_at(x, y);
        if z > cell.ground_height && cell.cell_height > min_height {
            elevated.push(x, y, z);
        } else {
            ground.push(x, y, z);
        }
    }
}
