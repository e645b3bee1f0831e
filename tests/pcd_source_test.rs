// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! PCD replay through `PcdSource` and the engine.

use edgefirst_occupancy::{
    Error, FixedPlane, GridConfig, GridParams, OccupancyEngine, PcdSource, Points,
    frame_source::FrameSource, pcd,
};
use std::{fs, path::PathBuf};

/// Fresh scratch directory for one test.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "edgefirst-occupancy-{}-{}",
        name,
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("Failed to create scratch directory");
    dir
}

fn frame(offset: f32) -> Points {
    Points::from_xyz([
        (5.5 + offset, 0.5, -1.7),
        (10.5 + offset, -0.5, -1.7),
        (10.5 + offset, -0.5, 0.3),
    ])
}

#[tokio::test]
async fn test_replay_directory_in_name_order() {
    let dir = scratch_dir("order");
    pcd::save(dir.join("0002.pcd"), &frame(2.0)).unwrap();
    pcd::save(dir.join("0000.pcd"), &frame(0.0)).unwrap();
    pcd::save(dir.join("0001.pcd"), &frame(1.0)).unwrap();
    fs::write(dir.join("notes.txt"), "not a point cloud").unwrap();

    let mut source = PcdSource::open(&dir, "lidar").expect("Failed to open PCD directory");
    assert_eq!(source.len(), 3, "only .pcd files are replayed");
    assert_eq!(
        source.current_file().and_then(|p| p.file_name()),
        Some("0000.pcd".as_ref())
    );

    let mut seen = Vec::new();
    while source.has_more() {
        let frame = source
            .next_frame()
            .await
            .expect("Failed to read frame")
            .expect("Source ended early");
        assert_eq!(frame.frame_id, "lidar");
        seen.push(frame.points.get(0).0);
    }
    assert_eq!(seen, vec![5.5, 6.5, 7.5]);
    assert!(source.next_frame().await.unwrap().is_none());

    source.reset();
    assert!(source.has_more());

    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_replay_single_file_through_engine() {
    let dir = scratch_dir("engine");
    let path = dir.join("frame.pcd");
    pcd::save(&path, &frame(0.0)).unwrap();

    let config = GridConfig::new(GridParams {
        grid_min_range: 2.0,
        grid_max_range: 60.0,
        grid_cell_size: 1.0,
        grid_segments: 90,
        ..Default::default()
    })
    .unwrap();
    let mut engine = OccupancyEngine::new(config, FixedPlane::below_sensor(1.7));

    let mut source = PcdSource::open(&path, "os1").unwrap();
    assert_eq!(source.len(), 1);
    let frame = source.next_frame().await.unwrap().unwrap();
    assert!(frame.stamp.sec > 0 || frame.stamp.nanosec > 0, "frame is stamped");

    let report = engine.process(&frame);
    assert_eq!(report.filtered, 3);
    assert_eq!(report.elevated, 1, "the point 2 m above ground is elevated");
    assert!(report.cells.occupied >= 1, "the post shows up in the grid");

    fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_malformed_file_is_reported_and_skipped() {
    let dir = scratch_dir("malformed");
    pcd::save(dir.join("a.pcd"), &frame(0.0)).unwrap();
    fs::write(dir.join("b.pcd"), "VERSION 0.7\nFIELDS x y z\nDATA binary\n").unwrap();
    pcd::save(dir.join("c.pcd"), &frame(1.0)).unwrap();

    let mut source = PcdSource::open(&dir, "lidar").unwrap();
    let mut frames = 0;
    let mut errors = 0;
    while source.has_more() {
        match source.next_frame().await {
            Ok(Some(_)) => frames += 1,
            Ok(None) => break,
            Err(Error::InvalidPcd(msg)) => {
                assert!(msg.contains("b.pcd"), "error names the file: {msg}");
                errors += 1;
            }
            Err(e) => panic!("unexpected error {e}"),
        }
    }
    assert_eq!(frames, 2, "good files around the bad one still load");
    assert_eq!(errors, 1);

    fs::remove_dir_all(&dir).ok();
}
