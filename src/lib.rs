// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst Velodyne Library
//!
//! This library decodes raw Velodyne HDL-32E and VLP-16 data packets into
//! calibrated 3D point clouds.
//!
//! # Architecture
//!
//! The library uses a **client-owned cloud** pattern for zero-allocation
//! operation:
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  PacketSource   │ ──► │ ScanAccumulator │ ──► │  PointCloud     │
//! │  (UDP/pcap/mem) │     │  (decoder loop) │     │  (client-owned) │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!                                  │                       │
//!                                  ▼                       ▼
//!                         ┌─────────────────┐     ┌─────────────────┐
//!                         │  Calibration    │     │ formats         │
//!                         │  (Arc, shared)  │     │ (PointCloud2)   │
//!                         └─────────────────┘     └─────────────────┘
//! ```
//!
//! The client owns the clouds and provides mutable references to the
//! accumulator:
//! 1. Client loads a calibration: `Calibration::load("32db.yaml")`
//! 2. Client creates a cloud: `PointCloud::with_capacity(accumulator.capacity())`
//! 3. Client provides a mutable reference: `accumulator.process(&mut cloud, data)`
//! 4. When complete (returns `Ok(true)`), client owns the filled cloud
//!
//! The lower-level [`decoder::decode`] appends the points of a single packet
//! to any `Vec<DecodedPoint>` and can be used without the accumulator.
//!
//! # Modules
//!
//! - [`calibration`]: Per-laser calibration loading and validation
//! - [`decoder`]: Packet to point decoding
//! - [`formats`]: PointCloud2 formatting
//! - [`lidar`]: Sensor models, timestamps and error handling
//! - [`packet`]: Zero-copy views over the data packet layout
//! - [`packet_source`]: Packet source abstraction (UDP, replay)
//! - [`scan`]: Accumulation of packets into scans
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_velodyne::{Calibration, PointCloud, ScanAccumulator};
//! use std::sync::Arc;
//!
//! let calibration = Arc::new(Calibration::load("32db.yaml")?);
//! let mut accumulator = ScanAccumulator::new(calibration, None);
//! let mut cloud = PointCloud::with_capacity(accumulator.capacity());
//!
//! loop {
//!     let len = socket.recv(&mut buf)?;
//!     if accumulator.process(&mut cloud, &buf[..len])? {
//!         for point in &cloud.points {
//!             println!("{} {} {} ring {}", point.x, point.y, point.z, point.channel);
//!         }
//!     }
//! }
//! ```

pub mod calibration;
pub mod decoder;
pub mod formats;
pub mod lidar;
pub mod packet;
pub mod packet_source;
#[cfg(feature = "pcap")]
pub mod pcap_source;
pub mod scan;

// Re-exports for convenience
pub use calibration::{Calibration, CalibrationError, LaserCorrection};
pub use decoder::{DecodedPoint, decode};
pub use formats::PointFieldType;
pub use lidar::{Error, SensorModel};
pub use packet::PacketSlice;
pub use packet_source::PacketSource;
#[cfg(feature = "pcap")]
pub use pcap_source::PcapSource;
pub use scan::{PointCloud, ScanAccumulator};
