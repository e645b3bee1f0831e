// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;
mod processing_thread;

use args::Args;
use clap::Parser as _;
use edgefirst_occupancy::{
    FixedPlane, GridConfig, OccupancyEngine, PcdSource, PlaneFitter, RansacPlaneFitter,
    frame_source::{FrameSource, ZenohSource},
};
use processing_thread::{Publishers, processing_thread};
use std::{path::Path, thread, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(args.rust_log.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = GridConfig::new(args.grid_params())?;
    config.log_summary();

    let fitter: Box<dyn PlaneFitter + Send> = if args.known_ground {
        info!("known ground: fixed plane at {:.3}", -config.lidar_height());
        Box::new(FixedPlane::below_sensor(config.lidar_height()))
    } else {
        let fallback = -config.lidar_height();
        match args.ransac_seed {
            Some(seed) => Box::new(RansacPlaneFitter::with_seed(fallback, seed)),
            None => Box::new(RansacPlaneFitter::new(fallback)),
        }
    };
    let engine = OccupancyEngine::new(config, fitter);

    let session = zenoh::open(args.zenoh_config()?).await?;
    let publishers = Publishers::declare(&session, &args).await?;

    let replay = Path::new(&args.target).exists();
    let mut source: Box<dyn FrameSource> = if replay {
        let source = PcdSource::open(&args.target, args.source_frame_id())?;
        info!("replaying {} pcd files from {}", source.len(), args.target);
        Box::new(source)
    } else {
        info!("subscribing to {}", args.target);
        let subscriber = session.declare_subscriber(args.target.clone()).await?;
        Box::new(ZenohSource::new(subscriber))
    };

    let (tx, rx) = if replay {
        kanal::bounded_async(4)
    } else {
        kanal::unbounded_async()
    };

    let rx = rx.to_sync();
    let frame_id = args.frame_id.clone();
    let handle = thread::Builder::new()
        .name("occupancy".to_string())
        .spawn(move || processing_thread(rx, engine, publishers, frame_id, !replay))?;

    let mut pacing = (replay && args.replay_hz > 0.0)
        .then(|| tokio::time::interval(Duration::from_secs_f64(1.0 / args.replay_hz)));

    loop {
        if let Some(interval) = pacing.as_mut() {
            interval.tick().await;
        }

        match source.next_frame().await {
            Ok(Some(frame)) => {
                if tx.send(frame).await.is_err() {
                    warn!("processing thread stopped");
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("frame error: {}", e);
                if !source.has_more() {
                    break;
                }
            }
        }
    }

    drop(tx);
    handle
        .join()
        .map_err(|_| "occupancy processing thread panicked")?;
    info!("done");

    Ok(())
}
