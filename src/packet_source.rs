// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Packet sources for the Velodyne decoder.
//!
//! The [`PacketSource`] trait abstracts where raw data packets come from so
//! the packet loop is the same for:
//!
//! - **Live operation**: a UDP socket bound to the sensor data port
//! - **Replay**: packets held in memory, optionally looping
//! - **Pcap replay**: recorded captures (with the `pcap` feature)
//!
//! Every source delivers packets in receipt order, one datagram per call.
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_velodyne::packet_source::{PacketSource, ReplaySource};
//!
//! let mut source = ReplaySource::new(packets);
//! let mut buf = [0u8; 2048];
//! while source.has_more() {
//!     let len = source.recv(&mut buf).await?;
//!     accumulator.process(&mut cloud, &buf[..len])?;
//! }
//! ```

use crate::{lidar::Error, packet::PACKET_SIZE};
use std::{future::Future, pin::Pin};
use tracing::debug;

/// UDP port the sensor sends data packets to.
pub const DATA_PORT: u16 = 2368;

/// Trait for packet sources.
pub trait PacketSource: Send {
    /// Receive the next packet into the provided buffer.
    ///
    /// # Returns
    /// - `Ok(len)` - Number of bytes received
    /// - `Err` - I/O or source error
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, Error>> + Send + 'a>>;

    /// Check if more packets are available.
    ///
    /// Live sources always return `true`; finite sources return `false`
    /// once exhausted.
    fn has_more(&self) -> bool;
}

/// UDP socket packet source for live sensor operation.
pub struct UdpSource {
    socket: tokio::net::UdpSocket,
}

impl UdpSource {
    /// Create a new UDP source from an existing socket.
    pub fn new(socket: tokio::net::UdpSocket) -> Self {
        Self { socket }
    }

    /// Bind to an address and create a UDP source.
    ///
    /// An address without a port binds the sensor data port.
    pub async fn bind(addr: &str) -> Result<Self, Error> {
        let addr = with_default_port(addr);
        let socket = tokio::net::UdpSocket::bind(&addr).await?;
        debug!("listening for packets on {}", socket.local_addr()?);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }
}

impl PacketSource for UdpSource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, Error>> + Send + 'a>> {
        Box::pin(async move {
            let len = self.socket.recv(buf).await?;
            Ok(len)
        })
    }

    fn has_more(&self) -> bool {
        true
    }
}

fn with_default_port(addr: &str) -> String {
    if addr.parse::<std::net::SocketAddr>().is_ok() {
        return addr.to_owned();
    }

    // Bare IPv6 addresses contain colons, so try the plain IP parse first.
    match addr.parse::<std::net::IpAddr>() {
        Ok(std::net::IpAddr::V6(ip)) => format!("[{}]:{}", ip, DATA_PORT),
        Ok(std::net::IpAddr::V4(ip)) => format!("{}:{}", ip, DATA_PORT),
        Err(_) if addr.contains(':') => addr.to_owned(),
        Err(_) => format!("{}:{}", addr, DATA_PORT),
    }
}

/// In-memory packet source.
///
/// Replays a sequence of packets once, or indefinitely when looping, for
/// testing and benchmarking without hardware.
pub struct ReplaySource {
    packets: Vec<Vec<u8>>,
    index: usize,
    looping: bool,
}

impl ReplaySource {
    /// Create a source that replays `packets` once.
    pub fn new(packets: Vec<Vec<u8>>) -> Self {
        Self {
            packets,
            index: 0,
            looping: false,
        }
    }

    /// Create a source that repeats `packets` indefinitely.
    pub fn looping(packets: Vec<Vec<u8>>) -> Self {
        Self {
            looping: true,
            ..Self::new(packets)
        }
    }

    /// Split a raw dump of back-to-back data packets.
    ///
    /// A trailing partial packet is kept as-is so the decoder reports it as
    /// malformed.
    pub fn from_stream(data: &[u8]) -> Self {
        Self::new(data.chunks(PACKET_SIZE).map(<[u8]>::to_vec).collect())
    }

    /// Rewind to the first packet.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Packets delivered so far.
    pub fn delivered(&self) -> usize {
        self.index
    }
}

impl PacketSource for ReplaySource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, Error>> + Send + 'a>> {
        Box::pin(async move {
            if !self.has_more() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "no more packets",
                )));
            }

            let packet = &self.packets[self.index % self.packets.len()];
            let len = packet.len().min(buf.len());
            buf[..len].copy_from_slice(&packet[..len]);
            self.index += 1;
            Ok(len)
        })
    }

    fn has_more(&self) -> bool {
        match self.looping {
            true => !self.packets.is_empty(),
            false => self.index < self.packets.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_source() {
        let packets = vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8, 9, 10], vec![11, 12]];
        let mut source = ReplaySource::new(packets);

        assert!(source.has_more());
        assert_eq!(source.len(), 3);

        let mut buf = [0u8; 100];

        let len = source.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3, 4]);

        let len = source.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[5, 6, 7, 8, 9, 10]);

        assert!(source.has_more());
        let len = source.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[11, 12]);

        assert!(!source.has_more());
        assert!(source.recv(&mut buf).await.is_err());
        assert_eq!(source.delivered(), 3);
    }

    #[tokio::test]
    async fn test_replay_source_reset() {
        let mut source = ReplaySource::new(vec![vec![1, 2], vec![3, 4]]);
        let mut buf = [0u8; 100];

        source.recv(&mut buf).await.unwrap();
        source.recv(&mut buf).await.unwrap();
        assert!(!source.has_more());

        source.reset();
        assert!(source.has_more());
        let len = source.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[1, 2]);
    }

    #[tokio::test]
    async fn test_looping_source() {
        let mut source = ReplaySource::looping(vec![vec![1, 2], vec![3, 4]]);
        let mut buf = [0u8; 100];

        for i in 0..5 {
            assert!(source.has_more());
            let len = source.recv(&mut buf).await.unwrap();
            let expected: &[u8] = if i % 2 == 0 { &[1, 2] } else { &[3, 4] };
            assert_eq!(&buf[..len], expected);
        }
        assert!(source.has_more());

        let mut empty = ReplaySource::looping(Vec::new());
        assert!(!empty.has_more());
        assert!(empty.recv(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_from_stream() {
        let mut data = vec![1u8; PACKET_SIZE];
        data.extend(vec![2u8; PACKET_SIZE]);
        data.extend(vec![3u8; 10]);

        let mut source = ReplaySource::from_stream(&data);
        assert_eq!(source.len(), 3);

        let mut buf = [0u8; 2048];
        assert_eq!(source.recv(&mut buf).await.unwrap(), PACKET_SIZE);
        assert_eq!(buf[0], 1);
        assert_eq!(source.recv(&mut buf).await.unwrap(), PACKET_SIZE);
        assert_eq!(buf[PACKET_SIZE - 1], 2);
        assert_eq!(source.recv(&mut buf).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_buffer_truncation() {
        let mut source = ReplaySource::new(vec![vec![1, 2, 3, 4, 5, 6, 7, 8]]);
        let mut buf = [0u8; 4];
        let len = source.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_default_port() {
        assert_eq!(with_default_port("0.0.0.0"), "0.0.0.0:2368");
        assert_eq!(with_default_port("0.0.0.0:5000"), "0.0.0.0:5000");
        assert_eq!(with_default_port("::"), "[::]:2368");
        assert_eq!(with_default_port("[::1]:9000"), "[::1]:9000");
        assert_eq!(with_default_port("localhost"), "localhost:2368");
    }

    #[tokio::test]
    async fn test_udp_source() {
        let mut source = UdpSource::bind("127.0.0.1:0").await.unwrap();
        let addr = source.local_addr().unwrap();
        assert!(source.has_more());

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[7u8; PACKET_SIZE], addr).await.unwrap();

        let mut buf = [0u8; 2048];
        let len = source.recv(&mut buf).await.unwrap();
        assert_eq!(len, PACKET_SIZE);
        assert!(buf[..len].iter().all(|&b| b == 7));
    }
}
