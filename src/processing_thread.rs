// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::Args;
use edgefirst_occupancy::{
    FrameOutputs, OccupancyEngine, PlaneFitter, Points, SensorFrame,
    formats::{encode_cdr, occupancy_grid_msg, point_cloud},
};
use edgefirst_schemas::std_msgs::Header;
use kanal::Receiver;
use tracing::{error, instrument};
use zenoh::{
    Session, Wait,
    pubsub::Publisher,
    qos::{CongestionControl, Priority},
};

const POINT_CLOUD_SCHEMA: &str = "sensor_msgs/msg/PointCloud2";
const OCCUPANCY_GRID_SCHEMA: &str = "nav_msgs/msg/OccupancyGrid";

// If the receiver is empty, waits for the next message, otherwise returns the
// most recent message on this receiver. If the receiver is closed, returns None
fn drain_recv<T>(rx: &Receiver<T>) -> Option<T> {
    let mut msg = match rx.try_recv() {
        Err(_) => {
            return None;
        }
        Ok(Some(v)) => v,
        Ok(None) => return rx.recv().ok(),
    };
    while let Ok(Some(v)) = rx.try_recv() {
        msg = v;
    }
    Some(msg)
}

/// One publisher per engine output.
pub struct Publishers {
    filtered: Publisher<'static>,
    groundplane: Publisher<'static>,
    ground: Publisher<'static>,
    elevated: Publisher<'static>,
    voxel_ground: Publisher<'static>,
    voxel_elevated: Publisher<'static>,
    occupancy: Publisher<'static>,
}

async fn declare(session: &Session, topic: String) -> Result<Publisher<'static>, zenoh::Error> {
    session
        .declare_publisher(topic)
        .priority(Priority::DataHigh)
        .congestion_control(CongestionControl::Drop)
        .await
}

impl Publishers {
    pub async fn declare(session: &Session, args: &Args) -> Result<Self, zenoh::Error> {
        Ok(Self {
            filtered: declare(session, args.topic("cloud_filtered")).await?,
            groundplane: declare(session, args.topic("cloud_groundplane")).await?,
            ground: declare(session, args.topic("cloud_ground")).await?,
            elevated: declare(session, args.topic("cloud_elevated")).await?,
            voxel_ground: declare(session, args.topic("voxel_ground")).await?,
            voxel_elevated: declare(session, args.topic("voxel_elevated")).await?,
            occupancy: declare(session, args.topic("grid_occupancy")).await?,
        })
    }

    #[instrument(skip_all)]
    pub fn publish(&self, outputs: &FrameOutputs<'_>, header: &Header) -> Result<(), zenoh::Error> {
        let clouds: [(&Publisher<'static>, &Points); 6] = [
            (&self.filtered, outputs.filtered),
            (&self.groundplane, outputs.ground_candidates),
            (&self.ground, outputs.ground),
            (&self.elevated, outputs.elevated),
            (&self.voxel_ground, outputs.voxel_ground),
            (&self.voxel_elevated, outputs.voxel_elevated),
        ];
        for (publ, points) in clouds {
            let (msg, enc) = encode_cdr(&point_cloud(points, header.clone()), POINT_CLOUD_SCHEMA)?;
            publ.put(msg).encoding(enc).wait()?;
        }

        let grid = occupancy_grid_msg(outputs.occupancy, header.clone());
        let (msg, enc) = encode_cdr(&grid, OCCUPANCY_GRID_SCHEMA)?;
        self.occupancy.put(msg).encoding(enc).wait()?;
        Ok(())
    }
}

/// Runs the engine on every frame received until the channel closes.
///
/// In live mode only the most recent queued frame is processed so a slow
/// frame never builds up latency; replay processes every frame in order.
pub fn processing_thread<F: PlaneFitter>(
    rx: Receiver<SensorFrame>,
    mut engine: OccupancyEngine<F>,
    publishers: Publishers,
    frame_id: Option<String>,
    live: bool,
) {
    loop {
        let frame = match if live { drain_recv(&rx) } else { rx.recv().ok() } {
            Some(v) => v,
            None => return,
        };

        engine.process(&frame);

        let header = Header {
            stamp: frame.stamp,
            frame_id: frame_id.clone().unwrap_or(frame.frame_id),
        };
        let outputs = engine.outputs();
        if let Err(e) = publishers.publish(&outputs, &header) {
            error!("occupancy publish error: {:?}", e);
        }
    }
}
