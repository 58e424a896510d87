// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Scan accumulation.
//!
//! A [`ScanAccumulator`] feeds packets to the decoder one at a time and
//! gathers the points of a fixed number of packets into a single
//! [`PointCloud`]. The client owns the cloud and passes it in by mutable
//! reference, so two clouds can be alternated without reallocating:
//!
//! ```ignore
//! let mut accumulator = ScanAccumulator::new(calibration, None);
//! let mut cloud = PointCloud::with_capacity(accumulator.capacity());
//!
//! loop {
//!     let len = source.recv(&mut buf).await?;
//!     match accumulator.process(&mut cloud, &buf[..len]) {
//!         Ok(true) => publish(&cloud),
//!         Ok(false) => {}
//!         Err(err) => warn!("skipping packet: {}", err),
//!     }
//! }
//! ```
//!
//! Deciding whether a scan is worth assembling at all (for example, when
//! nobody subscribes to the output) is left to the caller, which can
//! simply stop feeding packets and call [`ScanAccumulator::reset`].

use crate::{
    calibration::Calibration,
    decoder::{DecodedPoint, decode},
    lidar::{Error, timestamp},
    packet::{POINTS_PER_PACKET, PacketSlice},
};
use std::sync::Arc;

/// Points of one completed scan.
///
/// Clouds are always a single row (`height == 1`) and dense: invalid
/// returns are never stored as placeholders.
#[derive(Clone, Debug, Default)]
pub struct PointCloud {
    /// Host timestamp of the first packet in nanoseconds
    pub timestamp: u64,
    /// Scan sequence number (wraps at u32::MAX)
    pub seq: u32,
    /// Sensor timestamp of the first packet, microseconds past the hour
    pub gps_timestamp_us: u32,
    /// Points in packet receipt order
    pub points: Vec<DecodedPoint>,
}

impl PointCloud {
    /// Create an empty cloud with room for `capacity` points.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            ..Default::default()
        }
    }

    /// Number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.points.len() as u32
    }

    #[inline]
    pub fn height(&self) -> u32 {
        1
    }

    #[inline]
    pub fn is_dense(&self) -> bool {
        true
    }

    /// Drop all points while retaining capacity.
    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// Accumulates decoded packets into fixed-size scans.
pub struct ScanAccumulator {
    calibration: Arc<Calibration>,
    /// Accepted packets per completed scan
    packets_per_scan: usize,
    /// Packets accepted into the current scan
    packets: usize,
    /// Sequence number for the next scan
    seq: u32,
}

impl ScanAccumulator {
    /// Create an accumulator.
    ///
    /// `packets_per_scan` defaults to one revolution of the calibrated
    /// sensor model when `None`; a value of zero is treated as one.
    pub fn new(calibration: Arc<Calibration>, packets_per_scan: Option<usize>) -> Self {
        let packets_per_scan = packets_per_scan
            .unwrap_or_else(|| calibration.model().packets_per_rev())
            .max(1);

        Self {
            calibration,
            packets_per_scan,
            packets: 0,
            seq: 0,
        }
    }

    /// Process one packet into `cloud`.
    ///
    /// The first packet of a scan clears and stamps the cloud.
    ///
    /// # Returns
    /// - `Ok(false)` if more packets are needed to complete the scan
    /// - `Ok(true)` when the scan is complete and `cloud` holds it
    /// - `Err` for a malformed packet, which is not counted toward the scan,
    ///   or if the host clock cannot be read when a scan starts
    pub fn process(&mut self, cloud: &mut PointCloud, data: &[u8]) -> Result<bool, Error> {
        let packet = PacketSlice::from_slice(data)?;

        if self.packets == 0 {
            let stamp = timestamp()?;
            cloud.clear();
            cloud.seq = self.seq;
            cloud.gps_timestamp_us = packet.gps_timestamp_us();
            cloud.timestamp = stamp;
        }

        decode(data, &self.calibration, &mut cloud.points)?;
        self.packets += 1;

        if self.packets < self.packets_per_scan {
            return Ok(false);
        }

        self.packets = 0;
        self.seq = self.seq.wrapping_add(1);
        Ok(true)
    }

    /// Abandon the scan in progress.
    ///
    /// The next packet starts a new scan; the sequence number is kept.
    pub fn reset(&mut self) {
        self.packets = 0;
    }

    /// Packets accepted into the current scan.
    pub fn packets(&self) -> usize {
        self.packets
    }

    pub fn packets_per_scan(&self) -> usize {
        self.packets_per_scan
    }

    /// Upper bound on the number of points in one scan.
    pub fn capacity(&self) -> usize {
        self.packets_per_scan * POINTS_PER_PACKET
    }

    pub fn calibration(&self) -> &Arc<Calibration> {
        &self.calibration
    }
}
