// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Message formatting for the published point clouds and occupancy grid.
//!
//! Point clouds are packed into the 12-byte xyz layout of a ROS
//! `sensor_msgs/PointCloud2`:
//!
//! ```text
//! ┌───────┬───────┬───────┐
//! │ x:f32 │ y:f32 │ z:f32 │
//! │ 4B    │ 4B    │ 4B    │
//! └───────┴───────┴───────┘
//! ```
//!
//! # Architectures
//!
//! - **aarch64**: Native NEON intrinsics (stable Rust)
//! - **x86_64 with `portable_simd`**: std::simd (nightly Rust)
//! - **Fallback**: Scalar implementation (stable Rust)
//!
//! The occupancy grid is published as a `nav_msgs/OccupancyGrid`, defined
//! here with serde since the schema crate does not carry it.

#[cfg(all(feature = "portable_simd", not(target_arch = "aarch64")))]
use std::simd::{Simd, ToBytes as _};

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

use crate::{
    lidar::{Error, Points},
    occupancy::OccupancyGrid,
};
use edgefirst_schemas::{
    builtin_interfaces::Time,
    geometry_msgs::{Point, Pose, Quaternion},
    sensor_msgs::{PointCloud2, PointField},
    serde_cdr,
    std_msgs::Header,
};
use serde::{Deserialize, Serialize};
use zenoh::bytes::{Encoding, ZBytes};

/// Point field data types for PointCloud2 messages.
///
/// These values correspond to the ROS sensor_msgs/PointField datatype field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(dead_code)]
pub enum PointFieldType {
    INT8 = 1,
    UINT8 = 2,
    INT16 = 3,
    UINT16 = 4,
    INT32 = 5,
    UINT32 = 6,
    FLOAT32 = 7,
    FLOAT64 = 8,
}

/// Bytes per point of the published clouds.
pub const XYZ_POINT_STEP: usize = 12;

/// Build the XYZ point fields (12-byte stride).
pub fn xyz_fields() -> Vec<PointField> {
    ["x", "y", "z"]
        .iter()
        .enumerate()
        .map(|(i, name)| PointField {
            name: String::from(*name),
            offset: (i * 4) as u32,
            datatype: PointFieldType::FLOAT32 as u8,
            count: 1,
        })
        .collect()
}

// ============================================================================
// 12-byte format: XYZ
// ============================================================================

/// Format point coordinates into the 12-byte packed xyz layout.
#[inline(never)]
pub fn format_points_12byte(x: &[f32], y: &[f32], z: &[f32], n_points: usize) -> Vec<u8> {
    let mut data = vec![0u8; XYZ_POINT_STEP * n_points];
    format_points_12byte_into(x, y, z, n_points, &mut data);
    data
}

/// Format point coordinates into a pre-allocated buffer (12-byte format).
///
/// # Panics
///
/// Panics if `out` is shorter than `12 * n_points` bytes.
#[cfg(target_arch = "aarch64")]
#[inline(never)]
pub fn format_points_12byte_into(x: &[f32], y: &[f32], z: &[f32], n_points: usize, out: &mut [u8]) {
    assert!(out.len() >= XYZ_POINT_STEP * n_points);
    assert!(x.len() >= n_points && y.len() >= n_points && z.len() >= n_points);
    let n_simd = n_points - n_points % 4;

    // SAFETY: NEON intrinsics are always available on aarch64.
    // All pointer accesses are bounds-checked by the loop conditions.
    unsafe {
        let out_ptr = out.as_mut_ptr();

        for index in (0..n_simd).step_by(4) {
            let x_u32 = vreinterpretq_u32_f32(vld1q_f32(x.as_ptr().add(index)));
            let y_u32 = vreinterpretq_u32_f32(vld1q_f32(y.as_ptr().add(index)));
            let z_u32 = vreinterpretq_u32_f32(vld1q_f32(z.as_ptr().add(index)));

            let base = out_ptr.add(index * XYZ_POINT_STEP);

            (base as *mut u32).write_unaligned(vgetq_lane_u32::<0>(x_u32));
            (base.add(4) as *mut u32).write_unaligned(vgetq_lane_u32::<0>(y_u32));
            (base.add(8) as *mut u32).write_unaligned(vgetq_lane_u32::<0>(z_u32));

            let p1 = base.add(12);
            (p1 as *mut u32).write_unaligned(vgetq_lane_u32::<1>(x_u32));
            (p1.add(4) as *mut u32).write_unaligned(vgetq_lane_u32::<1>(y_u32));
            (p1.add(8) as *mut u32).write_unaligned(vgetq_lane_u32::<1>(z_u32));

            let p2 = base.add(24);
            (p2 as *mut u32).write_unaligned(vgetq_lane_u32::<2>(x_u32));
            (p2.add(4) as *mut u32).write_unaligned(vgetq_lane_u32::<2>(y_u32));
            (p2.add(8) as *mut u32).write_unaligned(vgetq_lane_u32::<2>(z_u32));

            let p3 = base.add(36);
            (p3 as *mut u32).write_unaligned(vgetq_lane_u32::<3>(x_u32));
            (p3.add(4) as *mut u32).write_unaligned(vgetq_lane_u32::<3>(y_u32));
            (p3.add(8) as *mut u32).write_unaligned(vgetq_lane_u32::<3>(z_u32));
        }
    }

    // Handle remainder with scalar code
    for index in n_simd..n_points {
        let offset = index * XYZ_POINT_STEP;
        out[offset..offset + 4].copy_from_slice(&x[index].to_le_bytes());
        out[offset + 4..offset + 8].copy_from_slice(&y[index].to_le_bytes());
        out[offset + 8..offset + 12].copy_from_slice(&z[index].to_le_bytes());
    }
}

/// Portable SIMD implementation for non-aarch64 targets (requires nightly).
#[cfg(all(feature = "portable_simd", not(target_arch = "aarch64")))]
#[inline(never)]
pub fn format_points_12byte_into(x: &[f32], y: &[f32], z: &[f32], n_points: usize, out: &mut [u8]) {
    assert!(out.len() >= XYZ_POINT_STEP * n_points);
    const N: usize = 4;
    let n_simd = n_points - n_points % N;

    for index in (0..n_simd).step_by(N) {
        let xb = Simd::<f32, N>::from_slice(&x[index..index + N]).to_le_bytes();
        let yb = Simd::<f32, N>::from_slice(&y[index..index + N]).to_le_bytes();
        let zb = Simd::<f32, N>::from_slice(&z[index..index + N]).to_le_bytes();

        for lane in 0..N {
            let offset = (index + lane) * XYZ_POINT_STEP;
            let bytes = lane * 4..lane * 4 + 4;
            out[offset..offset + 4].copy_from_slice(&xb[bytes.clone()]);
            out[offset + 4..offset + 8].copy_from_slice(&yb[bytes.clone()]);
            out[offset + 8..offset + 12].copy_from_slice(&zb[bytes]);
        }
    }

    for index in n_simd..n_points {
        let offset = index * XYZ_POINT_STEP;
        out[offset..offset + 4].copy_from_slice(&x[index].to_le_bytes());
        out[offset + 4..offset + 8].copy_from_slice(&y[index].to_le_bytes());
        out[offset + 8..offset + 12].copy_from_slice(&z[index].to_le_bytes());
    }
}

/// Scalar fallback for non-aarch64 targets without portable_simd.
#[cfg(all(not(feature = "portable_simd"), not(target_arch = "aarch64")))]
#[inline(never)]
pub fn format_points_12byte_into(x: &[f32], y: &[f32], z: &[f32], n_points: usize, out: &mut [u8]) {
    assert!(out.len() >= XYZ_POINT_STEP * n_points);

    for (index, chunk) in out.chunks_exact_mut(XYZ_POINT_STEP).take(n_points).enumerate() {
        chunk[0..4].copy_from_slice(&x[index].to_le_bytes());
        chunk[4..8].copy_from_slice(&y[index].to_le_bytes());
        chunk[8..12].copy_from_slice(&z[index].to_le_bytes());
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Build an unorganized xyz `PointCloud2`.
pub fn point_cloud(points: &Points, header: Header) -> PointCloud2 {
    let n_points = points.len();
    PointCloud2 {
        header,
        height: 1,
        width: n_points as u32,
        fields: xyz_fields(),
        is_bigendian: false,
        point_step: XYZ_POINT_STEP as u32,
        row_step: (XYZ_POINT_STEP * n_points) as u32,
        data: format_points_12byte(&points.x, &points.y, &points.z, n_points),
        is_dense: true,
    }
}

/// Decode the `x`, `y` and `z` fields of a `PointCloud2` into `out`.
///
/// Fields may be `FLOAT32` or `FLOAT64` at any offset and stride; other
/// fields are ignored. `out` is cleared first.
pub fn points_from_cloud(msg: &PointCloud2, out: &mut Points) -> Result<(), Error> {
    out.clear();
    if msg.is_bigendian {
        return Err(Error::UnsupportedFormat("big-endian PointCloud2".to_string()));
    }

    let point_step = msg.point_step as usize;
    let field = |name: &str| -> Result<(usize, u8), Error> {
        let f = msg
            .fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| Error::InvalidCloud(format!("missing field {name}")))?;
        let size = match f.datatype {
            t if t == PointFieldType::FLOAT32 as u8 => 4,
            t if t == PointFieldType::FLOAT64 as u8 => 8,
            t => {
                return Err(Error::UnsupportedFormat(format!(
                    "field {name} has datatype {t}"
                )));
            }
        };
        if f.offset as usize + size > point_step {
            return Err(Error::InvalidCloud(format!(
                "field {name} at offset {} exceeds point_step {point_step}",
                f.offset
            )));
        }
        Ok((f.offset as usize, size as u8))
    };
    let layout = [field("x")?, field("y")?, field("z")?];

    let n_points = msg.width as usize * msg.height as usize;
    let needed = n_points * point_step;
    if msg.data.len() < needed {
        return Err(Error::UnexpectedEnd(msg.data.len()));
    }

    let read = |bytes: &[u8], (offset, size): (usize, u8)| -> f32 {
        if size == 8 {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[offset..offset + 8]);
            f64::from_le_bytes(b) as f32
        } else {
            let mut b = [0u8; 4];
            b.copy_from_slice(&bytes[offset..offset + 4]);
            f32::from_le_bytes(b)
        }
    };

    if point_step == 0 {
        return Ok(());
    }
    for chunk in msg.data[..needed].chunks_exact(point_step) {
        out.push(
            read(chunk, layout[0]),
            read(chunk, layout[1]),
            read(chunk, layout[2]),
        );
    }
    Ok(())
}

/// `nav_msgs/MapMetaData`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapMetaData {
    pub map_load_time: Time,
    pub resolution: f32,
    pub width: u32,
    pub height: u32,
    pub origin: Pose,
}

/// `nav_msgs/OccupancyGrid`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancyGridMsg {
    pub header: Header,
    pub info: MapMetaData,
    pub data: Vec<i8>,
}

/// Orientation of the occupancy grid in the sensor frame.
///
/// Rows run along -x and columns along -y, a 180° rotation about the
/// bisector of the x and -y axes.
pub const GRID_ORIENTATION: [f64; 4] = [
    std::f64::consts::FRAC_1_SQRT_2,
    -std::f64::consts::FRAC_1_SQRT_2,
    0.0,
    0.0,
];

/// Build the `nav_msgs/OccupancyGrid` message for `grid`.
pub fn occupancy_grid_msg(grid: &OccupancyGrid, header: Header) -> OccupancyGridMsg {
    let (ox, oy, oz) = grid.origin();
    let [qx, qy, qz, qw] = GRID_ORIENTATION;
    OccupancyGridMsg {
        info: MapMetaData {
            map_load_time: header.stamp.clone(),
            resolution: grid.resolution(),
            width: grid.width() as u32,
            height: grid.height() as u32,
            origin: Pose {
                position: Point {
                    x: ox as f64,
                    y: oy as f64,
                    z: oz as f64,
                },
                orientation: Quaternion {
                    x: qx,
                    y: qy,
                    z: qz,
                    w: qw,
                },
            },
        },
        data: grid.data().to_vec(),
        header,
    }
}

/// Serialize `msg` as CDR and tag it with its ROS schema name.
pub fn encode_cdr<T: Serialize>(
    msg: &T,
    schema: &str,
) -> Result<(ZBytes, Encoding), serde_cdr::Error> {
    let bytes = ZBytes::from(serde_cdr::serialize(msg)?);
    let enc = Encoding::APPLICATION_CDR.with_schema(schema);
    Ok((bytes, enc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GridConfig, GridParams};

    fn header() -> Header {
        Header {
            stamp: Time {
                sec: 12,
                nanosec: 500,
            },
            frame_id: String::from("lidar"),
        }
    }

    #[test]
    fn test_format_points_12byte() {
        let x = vec![1.0f32, 2.0, 3.0, 4.0, 5.0];
        let y = vec![10.0f32, 20.0, 30.0, 40.0, 50.0];
        let z = vec![100.0f32, 200.0, 300.0, 400.0, 500.0];

        let data = format_points_12byte(&x, &y, &z, 5);
        assert_eq!(data.len(), 12 * 5);

        for i in 0..5 {
            let o = i * 12;
            let xi = f32::from_le_bytes([data[o], data[o + 1], data[o + 2], data[o + 3]]);
            let yi = f32::from_le_bytes([data[o + 4], data[o + 5], data[o + 6], data[o + 7]]);
            let zi = f32::from_le_bytes([data[o + 8], data[o + 9], data[o + 10], data[o + 11]]);
            assert_eq!((xi, yi, zi), (x[i], y[i], z[i]), "point {i}");
        }
    }

    #[test]
    fn test_xyz_fields() {
        let fields = xyz_fields();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].name, "x");
        assert_eq!(fields[2].name, "z");
        assert_eq!(fields[2].offset, 8);
        assert!(fields.iter().all(|f| f.datatype == PointFieldType::FLOAT32 as u8));
    }

    #[test]
    fn test_point_cloud_decodes_back() {
        let points = Points::from_xyz((0..37).map(|i| (i as f32, -(i as f32) * 0.5, 1.5)));
        let msg = point_cloud(&points, header());
        assert_eq!(msg.width, 37);
        assert_eq!(msg.row_step, 37 * 12);

        let mut decoded = Points::empty();
        points_from_cloud(&msg, &mut decoded).unwrap();
        assert_eq!(decoded, points);
    }

    #[test]
    fn test_points_from_cloud_with_padding() {
        // x y z as FLOAT32 with an intensity byte and 3 bytes of padding.
        let mut fields = xyz_fields();
        fields.push(PointField {
            name: String::from("intensity"),
            offset: 12,
            datatype: PointFieldType::UINT8 as u8,
            count: 1,
        });
        let mut data = Vec::new();
        for (x, y, z) in [(1.0f32, 2.0f32, 3.0f32), (4.0, 5.0, 6.0)] {
            data.extend_from_slice(&x.to_le_bytes());
            data.extend_from_slice(&y.to_le_bytes());
            data.extend_from_slice(&z.to_le_bytes());
            data.extend_from_slice(&[9, 0, 0, 0]);
        }
        let make = |data: Vec<u8>, fields: Vec<PointField>| PointCloud2 {
            header: header(),
            height: 1,
            width: 2,
            fields,
            is_bigendian: false,
            point_step: 16,
            row_step: 32,
            data,
            is_dense: true,
        };
        let msg = make(data.clone(), fields.clone());

        let mut out = Points::empty();
        points_from_cloud(&msg, &mut out).unwrap();
        assert_eq!(out, Points::from_xyz([(1.0, 2.0, 3.0), (4.0, 5.0, 6.0)]));

        let truncated = make(data[..20].to_vec(), fields.clone());
        assert!(matches!(
            points_from_cloud(&truncated, &mut out),
            Err(Error::UnexpectedEnd(20))
        ));

        let no_z = make(data, fields.into_iter().filter(|f| f.name != "z").collect());
        assert!(matches!(
            points_from_cloud(&no_z, &mut out),
            Err(Error::InvalidCloud(_))
        ));
    }

    #[test]
    fn test_occupancy_grid_msg_metadata() {
        let config = GridConfig::new(GridParams {
            lidar_height: 1.73,
            grid_max_range: 60.0,
            grid_cell_size: 1.0,
            grid_segments: 90,
            ..Default::default()
        })
        .unwrap();
        let grid = OccupancyGrid::new(&config);
        let msg = occupancy_grid_msg(&grid, header());

        assert_eq!(msg.info.width, 120);
        assert_eq!(msg.info.height, 60);
        assert_eq!(msg.info.resolution, 1.0);
        assert_eq!(msg.info.map_load_time.sec, 12);
        assert_eq!(msg.info.origin.position.x, 60.0);
        assert_eq!(msg.info.origin.position.y, 60.0);
        assert!((msg.info.origin.position.z - 1.73).abs() < 1e-6);
        assert!((msg.info.origin.orientation.x - 0.7071).abs() < 1e-3);
        assert!((msg.info.origin.orientation.y + 0.7071).abs() < 1e-3);
        assert_eq!(msg.info.origin.orientation.w, 0.0);
        assert_eq!(msg.data.len(), 120 * 60);

        let decoded: OccupancyGridMsg =
            serde_cdr::deserialize(&serde_cdr::serialize(&msg).unwrap()).unwrap();
        assert_eq!(decoded.data, msg.data);
        assert_eq!(decoded.header.frame_id, "lidar");
        assert_eq!(decoded.info.origin, msg.info.origin, "geometry_msgs/Pose survives CDR");
    }
}
