// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common point cloud types, frame container and error handling.
//!
//! Every stage of the occupancy pipeline exchanges point sets through
//! [`Points`], a structure-of-arrays container matching the layout used by
//! the LiDAR drivers and the PointCloud2 formatters.

use edgefirst_schemas::builtin_interfaces::Time;
use std::fmt;

/// Point cloud in structure-of-arrays (SoA) layout.
///
/// Coordinates are in the sensor frame: x forward, y left, z up.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Points {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
}

impl Points {
    /// Create an empty point set with room for `capacity` points.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
        }
    }

    /// Create an empty Points structure
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a point set from `(x, y, z)` tuples.
    pub fn from_xyz<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (f32, f32, f32)>,
    {
        let mut out = Self::empty();
        for (x, y, z) in points {
            out.push(x, y, z);
        }
        out
    }

    #[inline]
    pub fn push(&mut self, x: f32, y: f32, z: f32) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    /// Point at index `i` as a tuple.
    #[inline]
    pub fn get(&self, i: usize) -> (f32, f32, f32) {
        (self.x[i], self.y[i], self.z[i])
    }

    /// Iterate over points as `(x, y, z)` tuples.
    pub fn iter(&self) -> impl Iterator<Item = (f32, f32, f32)> + '_ {
        self.x
            .iter()
            .zip(self.y.iter())
            .zip(self.z.iter())
            .map(|((&x, &y), &z)| (x, y, z))
    }

    /// Clear all points while retaining capacity
    pub fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
        self.z.clear();
    }

    /// Get the current number of points
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Pixel dimensions of the camera frame paired with a point cloud.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// One synchronized sensor frame as delivered to the engine.
#[derive(Clone, Debug)]
pub struct SensorFrame {
    /// Raw point cloud in the sensor frame.
    pub points: Points,
    /// Acquisition time of the cloud.
    pub stamp: Time,
    /// Coordinate frame name carried into every published output.
    pub frame_id: String,
    /// Camera frame dimensions, when a camera image was paired with the cloud.
    pub image: Option<ImageSize>,
}

impl SensorFrame {
    pub fn new(points: Points, stamp: Time, frame_id: impl Into<String>) -> Self {
        Self {
            points,
            stamp,
            frame_id: frame_id.into(),
            image: None,
        }
    }

    #[must_use]
    pub fn with_image(mut self, width: u32, height: u32) -> Self {
        self.image = Some(ImageSize { width, height });
        self
    }
}

/// Common error type for configuration, I/O and decoding.
///
/// The per-frame processing stages never fail; errors only arise at the
/// boundaries (building the configuration, reading frames, decoding
/// messages).
#[derive(Debug)]
pub enum Error {
    /// I/O error (file operations)
    Io(std::io::Error),
    /// System time error
    SystemTime(std::time::SystemTimeError),
    /// Configuration error
    Config(String),
    /// Malformed PCD header or body
    InvalidPcd(String),
    /// Unsupported data format
    UnsupportedFormat(String),
    /// Unexpected end of data at given byte position
    UnexpectedEnd(usize),
    /// PointCloud2 message that cannot be decoded into xyz points
    InvalidCloud(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::SystemTime(err) => write!(f, "system time error: {}", err),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::InvalidPcd(msg) => write!(f, "invalid pcd: {}", msg),
            Error::UnsupportedFormat(format) => write!(f, "unsupported format: {}", format),
            Error::UnexpectedEnd(len) => write!(f, "unexpected end of data at {} bytes", len),
            Error::InvalidCloud(msg) => write!(f, "invalid point cloud: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<std::time::SystemTimeError> for Error {
    fn from(err: std::time::SystemTimeError) -> Self {
        Error::SystemTime(err)
    }
}

/// Get current timestamp in nanoseconds.
///
/// On Linux, uses `CLOCK_MONOTONIC_RAW` for best accuracy.
/// On other platforms, falls back to `SystemTime`.
#[cfg(target_os = "linux")]
pub fn timestamp() -> Result<u64, Error> {
    let mut tp = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let err = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut tp) };
    if err != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    Ok(tp.tv_sec as u64 * 1_000_000_000 + tp.tv_nsec as u64)
}

#[cfg(not(target_os = "linux"))]
pub fn timestamp() -> Result<u64, Error> {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH)?;
    Ok(duration.as_nanos() as u64)
}

/// Convert a nanosecond timestamp into a ROS `Time`.
pub fn to_time(nanos: u64) -> Time {
    Time {
        sec: (nanos / 1_000_000_000) as i32,
        nanosec: (nanos % 1_000_000_000) as u32,
    }
}
