// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame source abstraction for the occupancy engine.
//!
//! A [`FrameSource`] yields complete [`SensorFrame`]s, enabling:
//!
//! - **Live operation**: PointCloud2 messages from a zenoh subscriber
//! - **Replay**: PCD files from disk
//! - **Testing**: in-memory frames
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_occupancy::frame_source::{FrameSource, PcdSource};
//!
//! let mut source = PcdSource::open("recording/", "lidar")?;
//! while let Some(frame) = source.next_frame().await? {
//!     let report = engine.process(&frame);
//! }
//! ```

use crate::{
    formats::points_from_cloud,
    lidar::{Error, Points, SensorFrame, timestamp, to_time},
    pcd,
};
use edgefirst_schemas::{sensor_msgs::PointCloud2, serde_cdr};
use std::{
    future::Future,
    path::{Path, PathBuf},
    pin::Pin,
};
use tracing::{debug, trace};
use zenoh::{handlers::FifoChannelHandler, pubsub::Subscriber, sample::Sample};

/// Trait for frame sources.
pub trait FrameSource: Send {
    /// Receive the next frame.
    ///
    /// # Returns
    /// - `Ok(Some(frame))` - The next frame
    /// - `Ok(None)` - The source is exhausted or closed
    /// - `Err` - The next frame could not be read or decoded; the source
    ///   stays usable
    fn next_frame<'a>(
        &'a mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<SensorFrame>, Error>> + Send + 'a>>;

    /// Check if more frames are available.
    ///
    /// Live sources always return `true`.
    fn has_more(&self) -> bool;
}

/// Replays PCD files from disk.
///
/// Files are loaded lazily, one per [`FrameSource::next_frame`] call. Each
/// frame is stamped with the monotonic clock at load time.
pub struct PcdSource {
    files: Vec<PathBuf>,
    index: usize,
    frame_id: String,
}

impl PcdSource {
    /// Open a single `.pcd` file or every `.pcd` file of a directory, in
    /// name order.
    pub fn open<P: AsRef<Path>>(path: P, frame_id: impl Into<String>) -> Result<Self, Error> {
        let path = path.as_ref();
        let files = if path.is_dir() {
            let mut files = std::fs::read_dir(path)?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<Result<Vec<_>, _>>()?;
            files.retain(|p| p.is_file() && p.extension().is_some_and(|e| e == "pcd"));
            files.sort();
            files
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a file or directory", path.display()),
            )));
        };

        debug!("pcd source {} with {} files", path.display(), files.len());
        Ok(Self {
            files,
            index: 0,
            frame_id: frame_id.into(),
        })
    }

    /// Rewind to the first file.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// Number of files in the source.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The file the next frame will be read from.
    pub fn current_file(&self) -> Option<&Path> {
        self.files.get(self.index).map(PathBuf::as_path)
    }
}

impl FrameSource for PcdSource {
    fn next_frame<'a>(
        &'a mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<SensorFrame>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let Some(path) = self.files.get(self.index) else {
                return Ok(None);
            };
            self.index += 1;

            let data = tokio::fs::read(path).await?;
            let points = pcd::read_pcd(&data).map_err(|e| match e {
                Error::InvalidPcd(msg) => Error::InvalidPcd(format!("{}: {msg}", path.display())),
                other => other,
            })?;
            trace!("loaded {} points from {}", points.len(), path.display());

            let stamp = to_time(timestamp()?);
            Ok(Some(SensorFrame::new(points, stamp, self.frame_id.clone())))
        })
    }

    fn has_more(&self) -> bool {
        self.index < self.files.len()
    }
}

/// Test frame source for unit testing.
///
/// Provides a sequence of pre-defined frames.
pub struct TestSource {
    frames: Vec<SensorFrame>,
    index: usize,
}

impl TestSource {
    pub fn new(frames: Vec<SensorFrame>) -> Self {
        Self { frames, index: 0 }
    }

    /// Frames built from bare point sets with sequential one-second stamps.
    pub fn from_points(points: Vec<Points>, frame_id: &str) -> Self {
        Self::new(
            points
                .into_iter()
                .enumerate()
                .map(|(i, p)| SensorFrame::new(p, to_time(i as u64 * 1_000_000_000), frame_id))
                .collect(),
        )
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Reset the source to the beginning.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for TestSource {
    fn next_frame<'a>(
        &'a mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<SensorFrame>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let frame = self.frames.get(self.index).cloned();
            if frame.is_some() {
                self.index += 1;
            }
            Ok(frame)
        })
    }

    fn has_more(&self) -> bool {
        self.index < self.frames.len()
    }
}

/// Live `sensor_msgs/PointCloud2` frames from a zenoh subscriber.
pub struct ZenohSource {
    subscriber: Subscriber<FifoChannelHandler<Sample>>,
}

impl ZenohSource {
    pub fn new(subscriber: Subscriber<FifoChannelHandler<Sample>>) -> Self {
        Self { subscriber }
    }
}

/// Decode a CDR encoded `PointCloud2` into a frame carrying its header.
pub fn decode_frame(payload: &[u8]) -> Result<SensorFrame, Error> {
    let msg: PointCloud2 = serde_cdr::deserialize(payload)
        .map_err(|e| Error::InvalidCloud(format!("cdr decode: {e}")))?;
    let mut points = Points::empty();
    points_from_cloud(&msg, &mut points)?;
    Ok(SensorFrame::new(points, msg.header.stamp, msg.header.frame_id))
}

impl FrameSource for ZenohSource {
    fn next_frame<'a>(
        &'a mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<SensorFrame>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let sample = match self.subscriber.recv_async().await {
                Ok(sample) => sample,
                Err(e) => {
                    debug!("subscriber closed: {}", e);
                    return Ok(None);
                }
            };
            decode_frame(&sample.payload().to_bytes()).map(Some)
        })
    }

    fn has_more(&self) -> bool {
        true
    }
}
