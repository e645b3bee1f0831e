// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_occupancy::GridParams;
use serde_json::json;
use tracing::level_filters::LevelFilter;
use zenoh::config::{Config, WhatAmI};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// PCD file, directory of PCD files or zenoh key expression.  If target
    /// is an existing path it is replayed, otherwise it is subscribed to as a
    /// sensor_msgs/PointCloud2 topic.
    #[arg(env)]
    pub target: String,

    /// Mounting height of the LiDAR above ground in meters
    #[arg(long, env, default_value = "1.73")]
    pub lidar_height: f32,

    /// Points at or below this height in the LiDAR frame are dropped
    #[arg(long, env, default_value = "-2.5", allow_hyphen_values = true)]
    pub lidar_min_height: f32,

    /// Minimum horizontal range in meters
    #[arg(long, env, default_value = "2.5")]
    pub grid_min_range: f32,

    /// Maximum horizontal range in meters
    #[arg(long, env, default_value = "35.0")]
    pub grid_max_range: f32,

    /// Grid cell size in meters
    #[arg(long, env, default_value = "0.25")]
    pub grid_cell_size: f32,

    /// Height spread above which a cell counts as an obstacle, in meters
    #[arg(long, env, default_value = "0.3")]
    pub grid_min_height: f32,

    /// Number of angular segments across the forward cone
    #[arg(long, env, default_value = "360")]
    pub grid_segments: usize,

    /// RANSAC inlier distance in meters
    #[arg(long, env, default_value = "0.2")]
    pub ransac_tolerance: f32,

    /// RANSAC iteration count
    #[arg(long, env, default_value = "50")]
    pub ransac_iterations: usize,

    /// Seed the RANSAC generator for reproducible runs
    #[arg(long, env)]
    pub ransac_seed: Option<u64>,

    /// Lowest plausible ground height below the LiDAR
    #[arg(long, env, default_value = "-2.0", allow_hyphen_values = true)]
    pub ground_height_min: f32,

    /// Highest plausible ground height below the LiDAR
    #[arg(long, env, default_value = "-1.5", allow_hyphen_values = true)]
    pub ground_height_max: f32,

    /// Skip plane fitting and assume flat ground at -lidar_height
    #[arg(long, env)]
    pub known_ground: bool,

    /// Replay rate for PCD targets in frames per second, 0 for unthrottled
    #[arg(long, env, default_value = "10.0")]
    pub replay_hz: f64,

    /// Base topic for all published outputs
    #[arg(long, env, default_value = "rt/sensor")]
    pub topic_prefix: String,

    /// Override the frame id of published messages
    #[arg(long, env)]
    pub frame_id: Option<String>,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// zenoh connection mode
    #[arg(long, env, default_value = "peer")]
    mode: WhatAmI,

    /// connect to zenoh endpoints
    #[arg(long, env)]
    connect: Vec<String>,

    /// listen to zenoh endpoints
    #[arg(long, env)]
    listen: Vec<String>,

    /// disable zenoh multicast scouting
    #[arg(long, env)]
    no_multicast_scouting: bool,
}

impl Args {
    pub fn grid_params(&self) -> GridParams {
        GridParams {
            lidar_height: self.lidar_height,
            lidar_min_height: self.lidar_min_height,
            grid_min_range: self.grid_min_range,
            grid_max_range: self.grid_max_range,
            grid_cell_size: self.grid_cell_size,
            grid_min_height: self.grid_min_height,
            grid_segments: self.grid_segments,
            ransac_tolerance: self.ransac_tolerance,
            ransac_iterations: self.ransac_iterations,
            ground_height_min: self.ground_height_min,
            ground_height_max: self.ground_height_max,
        }
    }

    /// Topic for one of the published outputs.
    pub fn topic(&self, name: &str) -> String {
        format!("{}/{}", self.topic_prefix.trim_end_matches('/'), name)
    }

    /// Frame id stamped on replayed PCD frames.
    pub fn source_frame_id(&self) -> &str {
        self.frame_id.as_deref().unwrap_or("lidar")
    }

    pub fn zenoh_config(&self) -> Result<Config, zenoh::Error> {
        let mut config = Config::default();

        config.insert_json5("mode", &json!(self.mode).to_string())?;

        if !self.connect.is_empty() {
            config.insert_json5("connect/endpoints", &json!(self.connect).to_string())?;
        }

        if !self.listen.is_empty() {
            config.insert_json5("listen/endpoints", &json!(self.listen).to_string())?;
        }

        if self.no_multicast_scouting {
            config.insert_json5("scouting/multicast/enabled", &json!(false).to_string())?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_grid_params() {
        let args = Args::parse_from(["edgefirst-occupancy", "frames/"]);
        assert_eq!(args.grid_params(), GridParams::default());
        assert_eq!(args.topic("grid_occupancy"), "rt/sensor/grid_occupancy");
        assert!(!args.known_ground);
        assert!(args.ransac_seed.is_none());
        assert_eq!(args.source_frame_id(), "lidar");
    }

    #[test]
    fn test_frame_id_override() {
        let args = Args::parse_from(["edgefirst-occupancy", "frames/", "--frame-id", "os1"]);
        assert_eq!(args.source_frame_id(), "os1");
    }

    #[test]
    fn test_negative_heights() {
        let args = Args::parse_from([
            "edgefirst-occupancy",
            "rt/lidar/points",
            "--lidar-min-height",
            "-3.0",
            "--ground-height-min",
            "-2.2",
            "--topic-prefix",
            "rt/occupancy/",
        ]);
        let params = args.grid_params();
        assert_eq!(params.lidar_min_height, -3.0);
        assert_eq!(params.ground_height_min, -2.2);
        assert_eq!(args.topic("cloud_ground"), "rt/occupancy/cloud_ground");
    }

    #[test]
    fn test_zenoh_config() {
        let args = Args::parse_from([
            "edgefirst-occupancy",
            "rt/lidar/points",
            "--mode",
            "client",
            "--connect",
            "tcp/127.0.0.1:7447",
            "--no-multicast-scouting",
        ]);
        let config: Result<Config, Box<dyn std::error::Error + Send + Sync>> = args.zenoh_config();
        let config = config.expect("zenoh config from arguments");
        let endpoints = config.get_json("connect/endpoints").expect("connect endpoints");
        assert!(endpoints.contains("tcp/127.0.0.1:7447"), "endpoints: {endpoints}");
    }
}
