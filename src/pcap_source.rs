// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! PCAP file packet source for offline replay of recorded sensor traffic.
//!
//! [`PcapSource`] reads UDP payloads from PCAP or PCAPNG captures and serves
//! them through the [`PacketSource`] trait, so recorded drives can be decoded
//! exactly like live traffic.
//!
//! Velodyne sensors send data packets to port 2368 and position (GPS/IMU)
//! packets to port 8308; filter on [`DATA_PORT`] to keep only the former.
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_velodyne::{packet_source::{DATA_PORT, PacketSource}, PcapSource};
//!
//! let mut source = PcapSource::from_file("drive.pcap", Some(DATA_PORT))?;
//!
//! let mut buf = [0u8; 2048];
//! while source.has_more() {
//!     let len = source.recv(&mut buf).await?;
//!     // Process buf[..len] with the scan accumulator
//! }
//! ```

#[cfg(doc)]
use crate::packet_source::DATA_PORT;
use crate::{lidar::Error, packet_source::PacketSource};
use etherparse::{SlicedPacket, TransportSlice};
use pcap_parser::{Block, PcapBlockOwned, PcapError, create_reader, traits::PcapReaderIterator};
use std::{future::Future, path::Path, pin::Pin};
use tracing::debug;

/// Smallest reader buffer; the whole capture is normally buffered at once.
const MIN_READER_CAPACITY: usize = 65536;

/// PCAP file packet source.
///
/// Loads the entire capture into memory. Both legacy PCAP and PCAPNG are
/// supported; only Ethernet link-layer captures yield packets.
pub struct PcapSource {
    /// Extracted UDP payloads in capture order
    payloads: Vec<Vec<u8>>,
    index: usize,
}

impl PcapSource {
    /// Load a capture from disk, optionally filtering by UDP port.
    ///
    /// The port filter matches either the source or destination port.
    pub fn from_file<P: AsRef<Path>>(path: P, port: Option<u16>) -> Result<Self, Error> {
        let data = std::fs::read(path.as_ref())?;
        let source = Self::from_bytes(&data, port)?;
        debug!(
            "loaded {} packets from {}",
            source.len(),
            path.as_ref().display()
        );
        Ok(source)
    }

    /// Load a capture from bytes, optionally filtering by UDP port.
    pub fn from_bytes(data: &[u8], port: Option<u16>) -> Result<Self, Error> {
        let capacity = data.len().max(MIN_READER_CAPACITY);
        let mut reader = create_reader(capacity, data)
            .map_err(|e| Error::InvalidCapture(format!("unrecognized capture: {:?}", e)))?;
        let mut payloads = Vec::new();

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    let frame = match block {
                        PcapBlockOwned::Legacy(packet) => Some(packet.data),
                        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => Some(epb.data),
                        PcapBlockOwned::NG(Block::SimplePacket(spb)) => Some(spb.data),
                        _ => None,
                    };
                    if let Some(payload) = frame.and_then(|frame| udp_payload(frame, port)) {
                        payloads.push(payload.to_vec());
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                // Everything is buffered, so a short read is a truncated capture.
                Err(PcapError::Incomplete(_)) => break,
                Err(e) => return Err(Error::InvalidCapture(format!("{:?}", e))),
            }
        }

        Ok(Self { payloads, index: 0 })
    }

    /// Rewind to the first packet.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Packets not yet delivered.
    pub fn remaining(&self) -> usize {
        self.payloads.len().saturating_sub(self.index)
    }
}

/// UDP payload of an Ethernet frame, if it passes the port filter.
fn udp_payload(frame: &[u8], port: Option<u16>) -> Option<&[u8]> {
    let packet = SlicedPacket::from_ethernet(frame).ok()?;
    let udp = match packet.transport {
        Some(TransportSlice::Udp(udp)) => udp,
        _ => return None,
    };

    if let Some(port) = port {
        if udp.source_port() != port && udp.destination_port() != port {
            return None;
        }
    }

    Some(udp.payload()).filter(|payload| !payload.is_empty())
}

impl PacketSource for PcapSource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, Error>> + Send + 'a>> {
        Box::pin(async move {
            let Some(payload) = self.payloads.get(self.index) else {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "no more packets in capture",
                )));
            };

            let len = payload.len().min(buf.len());
            buf[..len].copy_from_slice(&payload[..len]);
            self.index += 1;
            Ok(len)
        })
    }

    fn has_more(&self) -> bool {
        self.index < self.payloads.len()
    }
}
