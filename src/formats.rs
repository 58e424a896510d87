// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Point cloud formatting.
//!
//! This module converts decoded scans into the packed binary format required
//! by ROS PointCloud2 messages.
//!
//! # Format
//!
//! ## 19-byte format (xyz + intensity + ring + time offset)
//! ```text
//! ┌───────┬───────┬───────┬───────────┬─────────┬────────────────┐
//! │ x:f32 │ y:f32 │ z:f32 │ intensity │ ring:u16│ time_offset:u32│
//! │ 4B    │ 4B    │ 4B    │ 1B        │ 2B      │ 4B             │
//! └───────┴───────┴───────┴───────────┴─────────┴────────────────┘
//! ```
//!
//! The fields are unaligned. `ring` carries the laser channel id and
//! `time_offset` the nanoseconds since the first firing of the packet the
//! point came from.

use crate::{decoder::DecodedPoint, scan::PointCloud};
use edgefirst_schemas::{
    builtin_interfaces::Time,
    sensor_msgs::{PointCloud2, PointField},
    std_msgs::Header,
};

/// Bytes per point in the packed format.
pub const POINT_STEP: usize = 19;

/// Point field data types for PointCloud2 messages.
///
/// These values correspond to the ROS sensor_msgs/PointField datatype field.
/// All variants are defined for completeness, even if not all are currently
/// used.
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

fn field(name: &str, offset: u32, datatype: PointFieldType) -> PointField {
    PointField {
        name: String::from(name),
        offset,
        datatype: datatype as u8,
        count: 1,
    }
}

/// Build the Velodyne point fields (19-byte stride).
///
/// Returns a vector of PointField definitions for:
/// - x: FLOAT32 at offset 0
/// - y: FLOAT32 at offset 4
/// - z: FLOAT32 at offset 8
/// - intensity: UINT8 at offset 12
/// - ring: UINT16 at offset 13
/// - time_offset: UINT32 at offset 15
pub fn velodyne_point_fields() -> Vec<PointField> {
    vec![
        field("x", 0, PointFieldType::FLOAT32),
        field("y", 4, PointFieldType::FLOAT32),
        field("z", 8, PointFieldType::FLOAT32),
        field("intensity", 12, PointFieldType::UINT8),
        field("ring", 13, PointFieldType::UINT16),
        field("time_offset", 15, PointFieldType::UINT32),
    ]
}

/// Format decoded points into the 19-byte packed format.
#[inline(never)]
pub fn format_points_19byte(points: &[DecodedPoint]) -> Vec<u8> {
    let mut data = vec![0u8; POINT_STEP * points.len()];
    format_points_19byte_into(points, &mut data);
    data
}

/// Format decoded points into a pre-allocated buffer (19-byte format).
///
/// # Panics
///
/// Panics if `out` is shorter than `19 * points.len()` bytes.
#[inline(never)]
pub fn format_points_19byte_into(points: &[DecodedPoint], out: &mut [u8]) {
    assert!(out.len() >= POINT_STEP * points.len());

    for (point, chunk) in points.iter().zip(out.chunks_exact_mut(POINT_STEP)) {
        chunk[0..4].copy_from_slice(&point.x.to_le_bytes());
        chunk[4..8].copy_from_slice(&point.y.to_le_bytes());
        chunk[8..12].copy_from_slice(&point.z.to_le_bytes());
        chunk[12] = point.intensity;
        chunk[13..15].copy_from_slice(&point.channel.to_le_bytes());
        chunk[15..19].copy_from_slice(&point.time_offset_ns.to_le_bytes());
    }
}

/// Convert a nanosecond timestamp into a ROS time.
pub fn ros_time(timestamp: u64) -> Time {
    Time {
        sec: (timestamp / 1_000_000_000) as i32,
        nanosec: (timestamp % 1_000_000_000) as u32,
    }
}

/// Build a PointCloud2 message for a completed scan.
pub fn point_cloud2(cloud: &PointCloud, frame_id: &str) -> PointCloud2 {
    let n_points = cloud.len();

    PointCloud2 {
        header: Header {
            stamp: ros_time(cloud.timestamp),
            frame_id: frame_id.to_owned(),
        },
        height: cloud.height(),
        width: cloud.width(),
        fields: velodyne_point_fields(),
        is_bigendian: false,
        point_step: POINT_STEP as u32,
        row_step: (POINT_STEP * n_points) as u32,
        data: format_points_19byte(&cloud.points),
        is_dense: cloud.is_dense(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(index: u16) -> DecodedPoint {
        let f = index as f32;
        DecodedPoint {
            x: f,
            y: 10.0 * f,
            z: -100.0 * f,
            intensity: (index * 7) as u8,
            channel: index % 32,
            time_offset_ns: 1_152 * index as u32,
        }
    }

    fn read_point(data: &[u8], index: usize) -> DecodedPoint {
        let chunk = &data[index * POINT_STEP..(index + 1) * POINT_STEP];
        DecodedPoint {
            x: f32::from_le_bytes(chunk[0..4].try_into().unwrap()),
            y: f32::from_le_bytes(chunk[4..8].try_into().unwrap()),
            z: f32::from_le_bytes(chunk[8..12].try_into().unwrap()),
            intensity: chunk[12],
            channel: u16::from_le_bytes(chunk[13..15].try_into().unwrap()),
            time_offset_ns: u32::from_le_bytes(chunk[15..19].try_into().unwrap()),
        }
    }

    #[test]
    fn test_format_points_19byte() {
        let points: Vec<_> = (0..5).map(point).collect();
        let data = format_points_19byte(&points);
        assert_eq!(data.len(), 19 * 5);

        assert_eq!(read_point(&data, 0), points[0]);
        assert_eq!(read_point(&data, 4), points[4]);

        // ring 4, little-endian, immediately after the intensity byte
        let offset = 4 * 19;
        assert_eq!(data[offset + 12], 28);
        assert_eq!(&data[offset + 13..offset + 15], &[4, 0]);
    }

    #[test]
    fn test_format_empty() {
        assert!(format_points_19byte(&[]).is_empty());
    }

    #[test]
    fn test_point_fields_match_layout() {
        let fields = velodyne_point_fields();
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["x", "y", "z", "intensity", "ring", "time_offset"]);

        let offsets: Vec<_> = fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, [0, 4, 8, 12, 13, 15]);
        assert_eq!(fields[4].datatype, PointFieldType::UINT16 as u8);
        assert_eq!(fields[5].datatype, PointFieldType::UINT32 as u8);
        assert!(fields.iter().all(|f| f.count == 1));
    }

    #[test]
    fn test_format_into_preallocated() {
        let points: Vec<_> = (0..100).map(point).collect();
        let mut buffer = vec![0xffu8; 19 * 100];
        format_points_19byte_into(&points, &mut buffer);
        assert_eq!(read_point(&buffer, 99), points[99]);
    }

    #[test]
    fn test_point_cloud2() {
        let cloud = PointCloud {
            timestamp: 3_500_000_001,
            seq: 4,
            gps_timestamp_us: 0,
            points: (0..10).map(point).collect(),
        };

        let msg = point_cloud2(&cloud, "lidar");
        assert_eq!(msg.header.frame_id, "lidar");
        assert_eq!(msg.header.stamp.sec, 3);
        assert_eq!(msg.header.stamp.nanosec, 500_000_001);
        assert_eq!(msg.height, 1);
        assert_eq!(msg.width, 10);
        assert_eq!(msg.point_step, 19);
        assert_eq!(msg.row_step, 190);
        assert_eq!(msg.data.len(), 190);
        assert!(msg.is_dense);
        assert!(!msg.is_bigendian);
    }
}
