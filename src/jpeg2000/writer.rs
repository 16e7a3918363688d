//! Packet emission into a tile-part body.
//!
//! Each packet is laid out as an optional SOP marker segment, the header, an optional EPH
//! marker and the body (ISO/IEC 15444-1, A.8.1 and A.8.2).

use num_enum::IntoPrimitive;

use super::packet::EncodedPacket;
use crate::constants::START_OF_PACKET_SEGMENT_LENGTH;
use crate::error::Tier2Error;

/// In-bitstream markers that may surround packet headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive)]
#[repr(u16)]
pub enum PacketMarker {
    /// SOP: Start of packet, followed by Lsop and Nsop.
    StartOfPacket = 0xFF91,
    /// EPH: End of packet header.
    EndOfPacketHeader = 0xFF92,
}

/// Appends packets to a growable tile-part body.
#[derive(Debug, Clone, Default)]
pub struct PacketWriter {
    buffer: Vec<u8>,
    start_of_packet: bool,
    end_of_packet_header: bool,
    /// Sequence number of the next SOP marker segment.
    sequence: u32,
}

impl PacketWriter {
    pub fn new(start_of_packet: bool, end_of_packet_header: bool) -> Self {
        Self {
            start_of_packet,
            end_of_packet_header,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of packets written so far.
    pub fn packet_count(&self) -> u32 {
        self.sequence
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    fn write_marker(&mut self, marker: PacketMarker) {
        self.write_u16(marker.into());
    }

    /// Write one packet, returning the number of bytes appended.
    ///
    /// Unwritable packets are skipped and do not consume a sequence number.
    pub fn write_packet(&mut self, packet: &EncodedPacket) -> usize {
        if !packet.is_writable() {
            return 0;
        }
        let start = self.buffer.len();

        if self.start_of_packet {
            self.write_marker(PacketMarker::StartOfPacket);
            self.write_u16(START_OF_PACKET_SEGMENT_LENGTH);
            self.write_u16((self.sequence % 65536) as u16);
        }

        self.buffer.extend_from_slice(packet.header_bytes());

        if self.end_of_packet_header {
            self.write_marker(PacketMarker::EndOfPacketHeader);
        }

        self.buffer.extend_from_slice(packet.body());
        self.sequence = self.sequence.wrapping_add(1);

        self.buffer.len() - start
    }

    /// Copy the written bytes into `destination`, returning the number of bytes copied.
    pub fn copy_to(&self, destination: &mut [u8]) -> Result<usize, Tier2Error> {
        if destination.len() < self.buffer.len() {
            return Err(Tier2Error::DestinationTooSmall);
        }
        destination[..self.buffer.len()].copy_from_slice(&self.buffer);
        Ok(self.buffer.len())
    }
}
