// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Velodyne packet decoder.
//!
//! [`decode`] turns one 1206 byte data packet into calibrated points and
//! appends them to a caller-owned buffer. It performs no I/O and keeps no
//! state between calls, so any number of threads may decode concurrently
//! against one shared [`Calibration`] as long as each uses its own buffer.
//!
//! # Point Computation
//!
//! For a return with corrected distance `d`, laser elevation `ω`, block
//! azimuth `α` and laser azimuth correction `δ`:
//!
//! ```text
//! xy = d·cos ω − v_off·sin ω
//! x' = xy·sin(α − δ) − h_off·cos(α − δ)
//! y' = xy·cos(α − δ) + h_off·sin(α − δ)
//! z  = d·sin ω + v_off·cos ω
//! ```
//!
//! The sensor frame is then rotated into the ROS convention (x forward,
//! y left, z up): `x = y'`, `y = −x'`.
//!
//! Points are silently dropped when the channel has no calibration entry,
//! the sensor reported no return, or the corrected distance falls outside
//! [`MIN_RANGE`]..=[`MAX_RANGE`].
//!
//! # Dual Return
//!
//! When the footer reports [`ReturnMode::Dual`], consecutive block pairs
//! hold the two returns of a single firing. Both blocks of a pair share
//! the same time offsets, and VLP-16 azimuths interpolate toward the next
//! pair rather than the partner block.

use crate::{
    calibration::{Calibration, LaserCorrection},
    lidar::{Error, SensorModel},
    packet::{
        BLOCKS_PER_PACKET, Bank, BlockSlice, POINTS_PER_PACKET, PacketSlice,
        ROTATION_MAX_UNITS, ROTATION_RESOLUTION, ReturnMode, SLOTS_PER_BLOCK,
    },
};

/// Minimum valid distance in meters
pub const MIN_RANGE: f32 = 0.9;

/// Maximum valid distance in meters
pub const MAX_RANGE: f32 = 130.0;

/// Two-point correction reference distances (meters)
const TWO_POINT_NEAR_X: f32 = 2.4;
const TWO_POINT_NEAR_Y: f32 = 1.93;
const TWO_POINT_FAR: f32 = 25.04;

/// A calibrated point in the sensor frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecodedPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Corrected intensity
    pub intensity: u8,
    /// Laser channel id
    pub channel: u16,
    /// Nanoseconds since the first firing in the packet
    pub time_offset_ns: u32,
}

/// Decode one data packet, appending its points to `out`.
///
/// Points are appended in block then slot order, which is the firing order
/// of the sensor. Existing contents of `out` are left untouched.
///
/// # Returns
/// - `Ok(n)` with the number of points appended
/// - `Err(Error::MalformedPacket)` if `packet` is not exactly
///   [`crate::packet::PACKET_SIZE`] bytes, with nothing appended
pub fn decode(
    packet: &[u8],
    calibration: &Calibration,
    out: &mut Vec<DecodedPoint>,
) -> Result<usize, Error> {
    let packet = PacketSlice::from_slice(packet)?;
    let start = out.len();
    out.reserve(POINTS_PER_PACKET);

    // Blocks per firing
    let stride = match packet.return_mode() {
        ReturnMode::Dual => 2,
        _ => 1,
    };

    match calibration.model() {
        SensorModel::Hdl32e => decode_single_firing(&packet, calibration, stride, out),
        SensorModel::Vlp16 => decode_dual_firing(&packet, calibration, stride, out),
    }

    Ok(out.len() - start)
}

/// HDL-32E: each block is one firing of 32 lasers at the block azimuth.
fn decode_single_firing(
    packet: &PacketSlice,
    calibration: &Calibration,
    stride: usize,
    out: &mut Vec<DecodedPoint>,
) {
    let model = calibration.model();
    let resolution = calibration.distance_resolution();

    for (index, block) in packet.blocks().enumerate() {
        let Some(bank) = block.bank() else {
            continue;
        };
        let rotation = block.rotation();
        if rotation >= ROTATION_MAX_UNITS {
            continue;
        }

        let (sin_azimuth, cos_azimuth) = (rotation as f32 * ROTATION_RESOLUTION).sin_cos();
        let firing_ns = (index / stride) as u32 * model.firing_interval_ns();

        for slot in 0..SLOTS_PER_BLOCK {
            let Some(laser) = calibration.lookup(bank.base() + slot) else {
                continue;
            };
            let time_offset_ns = firing_ns + slot as u32 * model.laser_interval_ns();
            if let Some(point) = project(
                laser,
                resolution,
                &block,
                slot,
                sin_azimuth,
                cos_azimuth,
                time_offset_ns,
            ) {
                out.push(point);
            }
        }
    }
}

/// VLP-16: each block holds two firings of 16 lasers. The block azimuth is
/// that of the first firing; later returns are interpolated toward the
/// next block's azimuth according to their firing time.
fn decode_dual_firing(
    packet: &PacketSlice,
    calibration: &Calibration,
    stride: usize,
    out: &mut Vec<DecodedPoint>,
) {
    let model = calibration.model();
    let resolution = calibration.distance_resolution();
    let lasers = model.num_lasers();
    let firing_ns = model.firing_interval_ns();
    let block_ns = firing_ns * model.firings_per_block() as u32;

    for index in 0..BLOCKS_PER_PACKET {
        let block = packet.block(index);
        if !is_vlp16_block(&block) {
            continue;
        }
        let rotation = block.rotation();
        let gap = azimuth_gap(packet, index, stride);

        for slot in 0..SLOTS_PER_BLOCK {
            let firing = slot / lasers;
            let channel = slot % lasers;
            let Some(laser) = calibration.lookup(channel) else {
                continue;
            };

            let time_in_block =
                firing as u32 * firing_ns + channel as u32 * model.laser_interval_ns();
            let azimuth = (rotation as f32 + gap * time_in_block as f32 / block_ns as f32)
                % ROTATION_MAX_UNITS as f32;
            let (sin_azimuth, cos_azimuth) = (azimuth * ROTATION_RESOLUTION).sin_cos();

            if let Some(point) = project(
                laser,
                resolution,
                &block,
                slot,
                sin_azimuth,
                cos_azimuth,
                (index / stride) as u32 * block_ns + time_in_block,
            ) {
                out.push(point);
            }
        }
    }
}

/// A VLP-16 block carries points only from the upper bank with a valid
/// rotation.
fn is_vlp16_block(block: &BlockSlice) -> bool {
    block.bank() == Some(Bank::Upper) && block.rotation() < ROTATION_MAX_UNITS
}

/// Azimuth advance in rotation units between the firing in block `index`
/// and the next firing, `stride` blocks later.
///
/// Only valid blocks are measured. When the next firing is missing or
/// invalid (always the case for the last firing), the gap of the nearest
/// valid pair is used instead, searching earlier pairs first. A packet
/// with no valid pair has a gap of zero.
fn azimuth_gap(packet: &PacketSlice, index: usize, stride: usize) -> f32 {
    let gap = |a: usize| {
        let b = a + stride;
        if b >= BLOCKS_PER_PACKET {
            return None;
        }
        let (a, b) = (packet.block(a), packet.block(b));
        if !is_vlp16_block(&a) || !is_vlp16_block(&b) {
            return None;
        }
        let diff = b.rotation() as i32 - a.rotation() as i32;
        Some(diff.rem_euclid(ROTATION_MAX_UNITS as i32) as f32)
    };

    gap(index)
        .or_else(|| {
            (0..index)
                .rev()
                .chain(index + 1..BLOCKS_PER_PACKET)
                .find_map(gap)
        })
        .unwrap_or(0.0)
}

/// Project one return through the laser's corrections.
#[inline]
fn project(
    laser: &LaserCorrection,
    resolution: f32,
    block: &BlockSlice,
    slot: usize,
    sin_azimuth: f32,
    cos_azimuth: f32,
    time_offset_ns: u32,
) -> Option<DecodedPoint> {
    let raw_distance = block.distance(slot);
    if raw_distance == 0 {
        return None;
    }

    let distance = raw_distance as f32 * resolution + laser.dist_correction;
    if !(MIN_RANGE..=MAX_RANGE).contains(&distance) {
        return None;
    }

    // cos/sin of (azimuth - rot_correction)
    let cos_rot = cos_azimuth * laser.cos_rot_correction + sin_azimuth * laser.sin_rot_correction;
    let sin_rot = sin_azimuth * laser.cos_rot_correction - cos_azimuth * laser.sin_rot_correction;
    let cos_vert = laser.cos_vert_correction;
    let sin_vert = laser.sin_vert_correction;
    let h_off = laser.horiz_offset_correction;
    let v_off = laser.vert_offset_correction;

    let (distance_x, distance_y) = match laser.two_point {
        Some(two_point) => {
            let xy = distance * cos_vert - v_off * sin_vert;
            let xx = (xy * sin_rot - h_off * cos_rot).abs();
            let yy = (xy * cos_rot + h_off * sin_rot).abs();

            let corr_x = (laser.dist_correction - two_point.dist_correction_x)
                * (xx - TWO_POINT_NEAR_X)
                / (TWO_POINT_FAR - TWO_POINT_NEAR_X)
                + two_point.dist_correction_x
                - laser.dist_correction;
            let corr_y = (laser.dist_correction - two_point.dist_correction_y)
                * (yy - TWO_POINT_NEAR_Y)
                / (TWO_POINT_FAR - TWO_POINT_NEAR_Y)
                + two_point.dist_correction_y
                - laser.dist_correction;
            (distance + corr_x, distance + corr_y)
        }
        None => (distance, distance),
    };

    let xy = distance_x * cos_vert - v_off * sin_vert;
    let x = xy * sin_rot - h_off * cos_rot;
    let xy = distance_y * cos_vert - v_off * sin_vert;
    let y = xy * cos_rot + h_off * sin_rot;
    let z = distance_y * sin_vert + v_off * cos_vert;

    let falloff = 1.0 - raw_distance as f32 / 65535.0;
    let intensity = block.intensity(slot) as f32
        + laser.focal_slope * (laser.focal_offset - 256.0 * falloff * falloff).abs();
    let intensity = intensity
        .clamp(laser.min_intensity, laser.max_intensity)
        .clamp(0.0, 255.0);

    Some(DecodedPoint {
        x: y,
        y: -x,
        z,
        intensity: intensity as u8,
        channel: laser.laser_id,
        time_offset_ns,
    })
}
