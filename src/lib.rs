// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst Occupancy Library
//!
//! Ground segmentation and occupancy classification for a forward-looking
//! LiDAR, built on a polar grid.
//!
//! # Architecture
//!
//! The engine owns every per-frame buffer and overwrites them on each frame:
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │  FrameSource    │ ──► │  PolarGrid       │ ──► │  ground::estimate│
//! │  (zenoh/pcd)    │     │  (filter + bin)  │     │  (PlaneFitter)   │
//! └─────────────────┘     └──────────────────┘     └──────────────────┘
//!                                                           │
//!                                                           ▼
//!                         ┌──────────────────┐     ┌──────────────────┐
//!                         │  OccupancyGrid   │ ◄── │  classify        │
//!                         │  (remap, voxels) │     │  (occlusion)     │
//!                         └──────────────────┘     └──────────────────┘
//! ```
//!
//! 1. [`polar::PolarGrid::accumulate`] drops points outside the forward cone
//!    and records per-cell statistics.
//! 2. [`ground::estimate`] fits a plane through the lowest point of every
//!    flat cell using a [`PlaneFitter`].
//! 3. [`classify::classify_cells`] marks cells free, occupied or occluded
//!    and [`classify::partition_points`] splits the cloud.
//! 4. [`occupancy::OccupancyGrid::remap`] resamples onto the Cartesian grid.
//!
//! # Modules
//!
//! - [`config`]: Grid parameters and derived geometry
//! - [`transform`]: Cartesian to polar cell mapping
//! - [`polar`]: Polar grid accumulation
//! - [`ground`]: Ground plane estimation and the plane fitting trait
//! - [`ransac`]: RANSAC plane fitter
//! - [`classify`]: Cell classification and point partitioning
//! - [`occupancy`]: Cartesian occupancy grid
//! - [`engine`]: Per-frame pipeline
//! - [`formats`]: PointCloud2 and OccupancyGrid messages
//! - [`frame_source`]: Frame source abstraction for replay and testing
//! - [`pcd`]: PCD file reader and writer
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_occupancy::{GridConfig, GridParams, OccupancyEngine, pcd};
//!
//! let config = GridConfig::new(GridParams::default())?;
//! let mut engine = OccupancyEngine::with_ransac(config, None);
//!
//! let points = pcd::load("frame.pcd")?;
//! let report = engine.process_points(&points);
//! let grid = engine.outputs().occupancy;
//! ```

#![cfg_attr(feature = "portable_simd", feature(portable_simd))]

pub mod classify;
pub mod config;
pub mod engine;
pub mod formats;
pub mod frame_source;
pub mod ground;
pub mod lidar;
pub mod occupancy;
pub mod pcd;
pub mod polar;
pub mod ransac;
pub mod transform;

// Re-exports for convenience
pub use config::{GridConfig, GridParams};
pub use engine::{FrameOutputs, FrameReport, OccupancyEngine};
pub use frame_source::{FrameSource, PcdSource};
pub use ground::{FixedPlane, GroundPlane, PlaneFitter};
pub use lidar::{Error, Points, SensorFrame};
pub use occupancy::OccupancyGrid;
pub use ransac::RansacPlaneFitter;
