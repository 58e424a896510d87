// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Velodyne data packet layout.
//!
//! Data packets are 1206 byte UDP payloads sent to port 2368. All
//! multi-byte fields are little-endian.
//!
//! ```text
//! ┌──────────────────────────── 12 × 100 byte blocks ────────────────────────────┐
//! │ block id:u16 │ rotation:u16 │ 32 × ( distance:u16 │ intensity:u8 )          │
//! │ 0xEEFF/DDFF  │ 0.01° units  │        2mm units                            │
//! └──────────────────────────────────────────────────────────────────────────────┘
//! ┌─────────────────────┬─────────────────┬────────────────┐
//! │ gps timestamp:u32   │ return mode:u8  │ product id:u8  │
//! │ µs past the hour    │ @1204           │ @1205          │
//! └─────────────────────┴─────────────────┴────────────────┘
//! ```
//!
//! The slice types in this module borrow the packet buffer and decode
//! fields on access; nothing is copied.

use crate::lidar::{Error, SensorModel};

/// Data packet size in bytes
pub const PACKET_SIZE: usize = 1206;

/// Number of data blocks per packet
pub const BLOCKS_PER_PACKET: usize = 12;

/// Size of each data block in bytes
pub const BLOCK_SIZE: usize = 100;

/// Number of channel returns per block
pub const SLOTS_PER_BLOCK: usize = 32;

/// Maximum number of points one packet can produce
pub const POINTS_PER_PACKET: usize = BLOCKS_PER_PACKET * SLOTS_PER_BLOCK;

/// Size of a single (distance, intensity) return
const RETURN_SIZE: usize = 3;

/// Block header size (block id + rotation)
const BLOCK_HEADER_SIZE: usize = 4;

/// Offset of the footer (GPS timestamp, return mode, product id)
const FOOTER_OFFSET: usize = BLOCKS_PER_PACKET * BLOCK_SIZE;

/// Block id of the upper laser bank
pub const UPPER_BANK: u16 = 0xeeff;

/// Block id of the lower laser bank
pub const LOWER_BANK: u16 = 0xddff;

/// Rotation values are in `[0, ROTATION_MAX_UNITS)`
pub const ROTATION_MAX_UNITS: u16 = 36000;

/// Rotation resolution in radians (0.01°)
pub const ROTATION_RESOLUTION: f32 = 0.01 * std::f32::consts::PI / 180.0;

/// Laser bank addressed by a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bank {
    /// Lasers 0-31
    Upper,
    /// Lasers 32-63
    Lower,
}

impl Bank {
    /// Channel id of the first laser in this bank.
    pub fn base(&self) -> usize {
        match self {
            Bank::Upper => 0,
            Bank::Lower => SLOTS_PER_BLOCK,
        }
    }

    /// Block id written on the wire for this bank.
    pub fn block_id(&self) -> u16 {
        match self {
            Bank::Upper => UPPER_BANK,
            Bank::Lower => LOWER_BANK,
        }
    }
}

/// Return mode reported in the packet footer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnMode {
    Strongest,
    Last,
    Dual,
    Unknown(u8),
}

impl From<u8> for ReturnMode {
    fn from(value: u8) -> Self {
        match value {
            0x37 => ReturnMode::Strongest,
            0x38 => ReturnMode::Last,
            0x39 => ReturnMode::Dual,
            val => ReturnMode::Unknown(val),
        }
    }
}

/// Product id reported in the packet footer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProductId {
    Hdl32e,
    Vlp16,
    Unknown(u8),
}

impl From<u8> for ProductId {
    fn from(value: u8) -> Self {
        match value {
            0x21 => ProductId::Hdl32e,
            0x22 => ProductId::Vlp16,
            val => ProductId::Unknown(val),
        }
    }
}

impl ProductId {
    /// Sensor model matching this product id, if supported.
    pub fn model(&self) -> Option<SensorModel> {
        match self {
            ProductId::Hdl32e => Some(SensorModel::Hdl32e),
            ProductId::Vlp16 => Some(SensorModel::Vlp16),
            ProductId::Unknown(_) => None,
        }
    }
}

/// Decoded packet footer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketFooter {
    /// Microseconds past the top of the hour
    pub gps_timestamp_us: u32,
    pub return_mode: ReturnMode,
    pub product_id: ProductId,
}

/// Borrowed view over a complete data packet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PacketSlice<'a> {
    slice: &'a [u8],
}

impl<'a> PacketSlice<'a> {
    /// Wrap a packet buffer, which must be exactly [`PACKET_SIZE`] bytes.
    pub fn from_slice(slice: &'a [u8]) -> Result<PacketSlice<'a>, Error> {
        if slice.len() != PACKET_SIZE {
            return Err(Error::MalformedPacket {
                len: slice.len(),
                expected: PACKET_SIZE,
            });
        }

        Ok(PacketSlice { slice })
    }

    /// Data block `index`, which must be below [`BLOCKS_PER_PACKET`].
    #[inline]
    pub fn block(&self, index: usize) -> BlockSlice<'a> {
        let start = index * BLOCK_SIZE;
        BlockSlice {
            slice: &self.slice[start..start + BLOCK_SIZE],
        }
    }

    /// All data blocks in stored (firing) order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockSlice<'a>> + 'a {
        let slice = self.slice;
        slice[..FOOTER_OFFSET]
            .chunks_exact(BLOCK_SIZE)
            .map(|slice| BlockSlice { slice })
    }

    pub fn gps_timestamp_us(&self) -> u32 {
        let s = &self.slice[FOOTER_OFFSET..];
        u32::from_le_bytes([s[0], s[1], s[2], s[3]])
    }

    pub fn return_mode(&self) -> ReturnMode {
        ReturnMode::from(self.slice[FOOTER_OFFSET + 4])
    }

    pub fn product_id(&self) -> ProductId {
        ProductId::from(self.slice[FOOTER_OFFSET + 5])
    }

    pub fn footer(&self) -> PacketFooter {
        PacketFooter {
            gps_timestamp_us: self.gps_timestamp_us(),
            return_mode: self.return_mode(),
            product_id: self.product_id(),
        }
    }
}

/// Borrowed view over one 100 byte data block.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BlockSlice<'a> {
    slice: &'a [u8],
}

impl BlockSlice<'_> {
    pub fn block_id(&self) -> u16 {
        u16::from_le_bytes([self.slice[0], self.slice[1]])
    }

    /// Laser bank, or `None` for an unrecognised block id.
    pub fn bank(&self) -> Option<Bank> {
        match self.block_id() {
            UPPER_BANK => Some(Bank::Upper),
            LOWER_BANK => Some(Bank::Lower),
            _ => None,
        }
    }

    /// Rotation in hundredths of a degree.
    pub fn rotation(&self) -> u16 {
        u16::from_le_bytes([self.slice[2], self.slice[3]])
    }

    /// Raw distance of `slot` in distance resolution units, 0 for no return.
    #[inline]
    pub fn distance(&self, slot: usize) -> u16 {
        let offset = BLOCK_HEADER_SIZE + slot * RETURN_SIZE;
        u16::from_le_bytes([self.slice[offset], self.slice[offset + 1]])
    }

    /// Raw intensity of `slot`.
    #[inline]
    pub fn intensity(&self, slot: usize) -> u8 {
        self.slice[BLOCK_HEADER_SIZE + slot * RETURN_SIZE + 2]
    }
}

/// Writer for synthetic data packets.
///
/// Produces packets in the wire layout above, for replay tooling, tests and
/// benchmarks. Blocks start as upper-bank blocks at rotation 0 with no
/// returns.
#[derive(Clone, Debug)]
pub struct PacketBuilder {
    data: Vec<u8>,
}

impl PacketBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            data: vec![0u8; PACKET_SIZE],
        };
        for index in 0..BLOCKS_PER_PACKET {
            builder.bank(index, Bank::Upper);
        }
        builder
    }

    /// Set the bank of block `index`.
    pub fn bank(&mut self, index: usize, bank: Bank) -> &mut Self {
        self.block_id(index, bank.block_id())
    }

    /// Write a raw block id, including invalid ones.
    pub fn block_id(&mut self, index: usize, id: u16) -> &mut Self {
        let start = index * BLOCK_SIZE;
        self.data[start..start + 2].copy_from_slice(&id.to_le_bytes());
        self
    }

    /// Set the rotation of block `index` in hundredths of a degree.
    pub fn rotation(&mut self, index: usize, rotation: u16) -> &mut Self {
        let start = index * BLOCK_SIZE + 2;
        self.data[start..start + 2].copy_from_slice(&rotation.to_le_bytes());
        self
    }

    /// Set the raw distance and intensity of one return.
    pub fn point(&mut self, index: usize, slot: usize, distance: u16, intensity: u8) -> &mut Self {
        let start = index * BLOCK_SIZE + BLOCK_HEADER_SIZE + slot * RETURN_SIZE;
        self.data[start..start + 2].copy_from_slice(&distance.to_le_bytes());
        self.data[start + 2] = intensity;
        self
    }

    /// Fill every slot of every block with the same return.
    pub fn fill(&mut self, distance: u16, intensity: u8) -> &mut Self {
        for index in 0..BLOCKS_PER_PACKET {
            for slot in 0..SLOTS_PER_BLOCK {
                self.point(index, slot, distance, intensity);
            }
        }
        self
    }

    pub fn footer(&mut self, gps_timestamp_us: u32, return_mode: u8, product_id: u8) -> &mut Self {
        self.data[FOOTER_OFFSET..FOOTER_OFFSET + 4]
            .copy_from_slice(&gps_timestamp_us.to_le_bytes());
        self.data[FOOTER_OFFSET + 4] = return_mode;
        self.data[FOOTER_OFFSET + 5] = product_id;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.data.clone()
    }
}

impl Default for PacketBuilder {
    fn default() -> Self {
        Self::new()
    }
}
