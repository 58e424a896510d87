// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common LiDAR types, sensor models and error handling.
//!
//! This module holds the sensor-agnostic pieces shared by the decoder, the
//! scan accumulator and the packet sources.

use crate::calibration::CalibrationError;
use std::fmt;

/// Common error type for LiDAR operations.
///
/// Per-point problems (unknown channel, out-of-range distance) are never
/// reported through this type; such points are simply not produced.
#[derive(Debug)]
pub enum Error {
    /// I/O error (socket, file operations)
    Io(std::io::Error),
    /// Packet length does not match the fixed data packet size
    MalformedPacket { len: usize, expected: usize },
    /// Calibration could not be loaded or validated
    Calibration(CalibrationError),
    /// Recorded capture could not be parsed
    InvalidCapture(String),
    /// System time error
    SystemTime(std::time::SystemTimeError),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Calibration(err) => Some(err),
            Error::SystemTime(err) => Some(err),
            Error::MalformedPacket { .. } | Error::InvalidCapture(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::MalformedPacket { len, expected } => write!(
                f,
                "malformed packet: {} bytes, expected {}",
                len, expected
            ),
            Error::Calibration(err) => write!(f, "calibration error: {}", err),
            Error::InvalidCapture(msg) => write!(f, "invalid capture: {}", msg),
            Error::SystemTime(err) => write!(f, "system time error: {}", err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<CalibrationError> for Error {
    fn from(err: CalibrationError) -> Self {
        Error::Calibration(err)
    }
}

impl From<std::time::SystemTimeError> for Error {
    fn from(err: std::time::SystemTimeError) -> Self {
        Error::SystemTime(err)
    }
}

/// Supported Velodyne sensor models.
///
/// The model fixes the laser count, the channel layout inside a block, the
/// firing timing and the nominal packet rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorModel {
    /// HDL-32E: 32 lasers, one firing sequence per block.
    Hdl32e,
    /// VLP-16: 16 lasers, two firing sequences per block.
    Vlp16,
}

impl SensorModel {
    /// Resolve the model from the number of lasers in a calibration.
    pub fn from_num_lasers(num_lasers: usize) -> Option<Self> {
        match num_lasers {
            32 => Some(SensorModel::Hdl32e),
            16 => Some(SensorModel::Vlp16),
            _ => None,
        }
    }

    /// Number of laser channels of this model.
    pub fn num_lasers(&self) -> usize {
        match self {
            SensorModel::Hdl32e => 32,
            SensorModel::Vlp16 => 16,
        }
    }

    /// Firing sequences carried by each 32-slot block.
    pub fn firings_per_block(&self) -> usize {
        match self {
            SensorModel::Hdl32e => 1,
            SensorModel::Vlp16 => 2,
        }
    }

    /// Interval between consecutive firing sequences in nanoseconds.
    pub fn firing_interval_ns(&self) -> u32 {
        match self {
            SensorModel::Hdl32e => 46_080,
            SensorModel::Vlp16 => 55_296,
        }
    }

    /// Interval between consecutive lasers of one firing sequence in
    /// nanoseconds.
    pub fn laser_interval_ns(&self) -> u32 {
        match self {
            SensorModel::Hdl32e => 1_152,
            SensorModel::Vlp16 => 2_304,
        }
    }

    /// Packets per revolution at the default 600 RPM.
    pub fn packets_per_rev(&self) -> usize {
        match self {
            SensorModel::Hdl32e => 181,
            SensorModel::Vlp16 => 76,
        }
    }
}

impl fmt::Display for SensorModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SensorModel::Hdl32e => write!(f, "HDL-32E"),
            SensorModel::Vlp16 => write!(f, "VLP-16"),
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_from_num_lasers() {
        assert_eq!(SensorModel::from_num_lasers(32), Some(SensorModel::Hdl32e));
        assert_eq!(SensorModel::from_num_lasers(16), Some(SensorModel::Vlp16));
        assert_eq!(SensorModel::from_num_lasers(64), None);
        assert_eq!(SensorModel::from_num_lasers(0), None);
    }

    #[test]
    fn test_model_timing_covers_block() {
        // Every firing of a block must fit inside one firing interval.
        for model in [SensorModel::Hdl32e, SensorModel::Vlp16] {
            let lasers = model.num_lasers() as u32;
            assert!(lasers * model.laser_interval_ns() <= model.firing_interval_ns());
            assert_eq!(model.num_lasers() * model.firings_per_block(), 32);
        }
    }

    #[test]
    fn test_error_display() {
        let err = Error::MalformedPacket {
            len: 1205,
            expected: 1206,
        };
        assert_eq!(err.to_string(), "malformed packet: 1205 bytes, expected 1206");
    }

    #[test]
    fn test_timestamp_monotonic() {
        let a = timestamp().unwrap();
        let b = timestamp().unwrap();
        assert!(b >= a);
    }
}
