// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-frame occupancy pipeline.
//!
//! [`OccupancyEngine`] owns every buffer the pipeline needs and runs the
//! stages strictly in order:
//!
//! 1. bin the cloud into the polar grid (filtering out-of-cone points),
//! 2. select ground candidates and fit the ground plane,
//! 3. classify cells and split the cloud into ground and elevated points,
//! 4. resample onto the Cartesian occupancy grid.
//!
//! Buffers are allocated once in [`OccupancyEngine::new`] and overwritten on
//! every frame, so the outputs of one frame never depend on the previous one.

use crate::{
    classify::{classify_cells, partition_points},
    config::GridConfig,
    ground::{self, GroundPlane, PlaneFitter, select_candidates},
    lidar::{Points, SensorFrame},
    occupancy::{CellCounts, OccupancyGrid},
    polar::PolarGrid,
    ransac::RansacPlaneFitter,
};
use tracing::{debug, info, info_span, instrument};

/// Per-frame counters.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Sequence number of the frame since the engine was created.
    pub frame: u64,
    pub input: usize,
    pub filtered: usize,
    pub candidates: usize,
    pub inliers: usize,
    pub plane: GroundPlane,
    /// Ground height under the sensor.
    pub origin_height: f32,
    pub plausible: bool,
    pub ground: usize,
    pub elevated: usize,
    pub cells: CellCounts,
    pub voxel_ground: usize,
    pub voxel_elevated: usize,
}

/// Borrowed view of the outputs of the last processed frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameOutputs<'a> {
    pub filtered: &'a Points,
    pub ground_candidates: &'a Points,
    pub ground: &'a Points,
    pub elevated: &'a Points,
    pub voxel_ground: &'a Points,
    pub voxel_elevated: &'a Points,
    pub occupancy: &'a OccupancyGrid,
}

/// Ground segmentation and occupancy classification engine.
pub struct OccupancyEngine<F: PlaneFitter = RansacPlaneFitter> {
    config: GridConfig,
    fitter: F,
    grid: PolarGrid,
    occupancy: OccupancyGrid,
    filtered: Points,
    candidates: Points,
    ground: Points,
    elevated: Points,
    voxel_ground: Points,
    voxel_elevated: Points,
    frame: u64,
}

impl OccupancyEngine<RansacPlaneFitter> {
    /// Engine with a RANSAC ground fitter, seeded when `seed` is given.
    pub fn with_ransac(config: GridConfig, seed: Option<u64>) -> Self {
        let fallback = -config.lidar_height();
        let fitter = match seed {
            Some(seed) => RansacPlaneFitter::with_seed(fallback, seed),
            None => RansacPlaneFitter::new(fallback),
        };
        Self::new(config, fitter)
    }
}

impl<F: PlaneFitter> OccupancyEngine<F> {
    pub fn new(config: GridConfig, fitter: F) -> Self {
        let grid = PolarGrid::new(&config);
        let occupancy = OccupancyGrid::new(&config);
        let cells = config.grid_width() * config.grid_height();
        Self {
            grid,
            occupancy,
            filtered: Points::empty(),
            candidates: Points::empty(),
            ground: Points::empty(),
            elevated: Points::empty(),
            voxel_ground: Points::with_capacity(cells),
            voxel_elevated: Points::empty(),
            frame: 0,
            config,
            fitter,
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// The polar grid as classified by the last frame.
    pub fn polar_grid(&self) -> &PolarGrid {
        &self.grid
    }

    /// Number of frames processed so far.
    pub fn frames(&self) -> u64 {
        self.frame
    }

    /// Process one synchronized frame.
    pub fn process(&mut self, frame: &SensorFrame) -> FrameReport {
        if let Some(image) = frame.image {
            debug!(
                "frame {} image {}x{}",
                self.frame, image.width, image.height
            );
        }
        let report = self.process_points(&frame.points);
        info!(
            "frame {} points {} filtered {} ground {} elevated {} occupied {} unknown {} ground_height {:.3}",
            report.frame,
            report.input,
            report.filtered,
            report.ground,
            report.elevated,
            report.cells.occupied,
            report.cells.unknown,
            report.origin_height
        );
        report
    }

    /// Run the pipeline on a bare point cloud.
    #[instrument(skip_all, fields(frame = self.frame, points = points.len()))]
    pub fn process_points(&mut self, points: &Points) -> FrameReport {
        let config = &self.config;

        info_span!("polar_grid")
            .in_scope(|| self.grid.accumulate(config, points, &mut self.filtered));

        let estimate = info_span!("ground_plane").in_scope(|| {
            select_candidates(&self.grid, config.min_height(), &mut self.candidates);
            ground::estimate(&mut self.fitter, config, &self.candidates)
        });

        info_span!("classify").in_scope(|| {
            classify_cells(&mut self.grid, &estimate.plane, config.min_height());
            partition_points(
                &self.grid,
                &self.filtered,
                config.min_height(),
                &mut self.ground,
                &mut self.elevated,
            );
        });

        info_span!("remap").in_scope(|| {
            self.occupancy
                .remap(&self.grid, &mut self.voxel_ground, &mut self.voxel_elevated)
        });

        let report = FrameReport {
            frame: self.frame,
            input: points.len(),
            filtered: self.filtered.len(),
            candidates: self.candidates.len(),
            inliers: estimate.inliers,
            plane: estimate.plane,
            origin_height: estimate.origin_height,
            plausible: estimate.plausible,
            ground: self.ground.len(),
            elevated: self.elevated.len(),
            cells: self.occupancy.counts(),
            voxel_ground: self.voxel_ground.len(),
            voxel_elevated: self.voxel_elevated.len(),
        };
        self.frame += 1;
        report
    }

    /// Outputs of the most recent frame.
    pub fn outputs(&self) -> FrameOutputs<'_> {
        FrameOutputs {
            filtered: &self.filtered,
            ground_candidates: &self.candidates,
            ground: &self.ground,
            elevated: &self.elevated,
            voxel_ground: &self.voxel_ground,
            voxel_elevated: &self.voxel_elevated,
            occupancy: &self.occupancy,
        }
    }
}
