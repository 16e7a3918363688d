//! Bit-level I/O for packet headers.
//!
//! Packet headers are written MSB-first. Whenever a completed byte equals 0xFF, the
//! next byte only carries 7 bits and its most significant bit is a stuffed zero, so that
//! no marker code (0xFF90 and above) can appear inside a header (ISO/IEC 15444-1, B.10.1).

use crate::constants::BIT_SINK_INCREMENT;
use crate::error::Tier2Error;

/// Auto-growing bit buffer implementing the packet header bit-stuffing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitSink {
    data: Vec<u8>,
    /// Index of the byte currently being filled.
    position: usize,
    /// Bits still available in the current byte (8, or 7 after a 0xFF byte).
    available: u8,
}

impl Default for BitSink {
    fn default() -> Self {
        Self::new()
    }
}

impl BitSink {
    pub fn new() -> Self {
        Self::with_capacity(BIT_SINK_INCREMENT)
    }

    /// Create a sink with an initial buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(1)],
            position: 0,
            available: 8,
        }
    }

    /// Write a single bit (only the lowest bit of `bit` is used).
    pub fn write_bit(&mut self, bit: u8) {
        self.available -= 1;
        self.data[self.position] |= (bit & 1) << self.available;
        if self.available == 0 {
            self.complete_byte();
        }
    }

    /// Write the `count` low bits of `value`, most significant first.
    ///
    /// The bits of `value` above `count` must be zero and `count` must not exceed 32.
    pub fn write_bits(&mut self, value: u32, count: u32) {
        debug_assert!(count <= 32);
        debug_assert!((value as u64) >> count == 0);

        let value = value as u64;
        let mut remaining = count;
        self.reserve(count);

        while remaining >= self.available as u32 {
            remaining -= self.available as u32;
            let mask = (1u64 << self.available) - 1;
            self.data[self.position] |= ((value >> remaining) & mask) as u8;
            self.complete_byte();
        }

        if remaining > 0 {
            self.available -= remaining as u8;
            let low = value & ((1u64 << remaining) - 1);
            self.data[self.position] |= (low << self.available) as u8;
        }
    }

    /// Bits still free in the byte being filled.
    pub fn available_bits(&self) -> u8 {
        self.available
    }

    /// Number of bytes containing written bits.
    ///
    /// A partially filled trailing byte counts, and so does the byte that must follow a
    /// trailing 0xFF.
    pub fn length(&self) -> usize {
        if self.available == 8 {
            self.position
        } else {
            self.position + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.length()]
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes().to_vec()
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        let length = self.length();
        self.data.truncate(length);
        self.data
    }

    /// Copy the written bytes into `destination`, returning the number of bytes copied.
    pub fn copy_to(&self, destination: &mut [u8]) -> Result<usize, Tier2Error> {
        let bytes = self.bytes();
        if destination.len() < bytes.len() {
            return Err(Tier2Error::DestinationTooSmall);
        }
        destination[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Rewind to an empty header, keeping the allocation.
    pub fn reset(&mut self) {
        self.position = 0;
        self.available = 8;
        self.data.fill(0);
    }

    fn complete_byte(&mut self) {
        self.available = if self.data[self.position] == 0xFF { 7 } else { 8 };
        self.position += 1;
        if self.position == self.data.len() {
            self.grow(BIT_SINK_INCREMENT);
        }
    }

    /// Make sure `count` bits plus two stuffed bits fit without growing mid-write.
    fn reserve(&mut self, count: u32) {
        let room = (self.data.len() - self.position) * 8 - 8 + self.available as usize;
        let needed = count as usize + 2;
        if room <= needed {
            let missing = (needed - room).div_ceil(7) + 1;
            self.grow(missing.max(BIT_SINK_INCREMENT));
        }
    }

    fn grow(&mut self, increment: usize) {
        let new_len = self.data.len() + increment;
        self.data.resize(new_len, 0);
    }
}

/// Reads packet header bits, skipping the stuffed bit after every 0xFF byte.
pub struct HeaderBitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buffer: u8,
    bits_left: u8,
}

impl<'a> HeaderBitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buffer: 0,
            bits_left: 0,
        }
    }

    pub fn read_bit(&mut self) -> Result<u8, Tier2Error> {
        if self.bits_left == 0 {
            if self.pos >= self.data.len() {
                return Err(Tier2Error::NeedMoreData);
            }
            let after_ff = self.pos > 0 && self.data[self.pos - 1] == 0xFF;
            self.bit_buffer = self.data[self.pos];
            self.pos += 1;
            self.bits_left = if after_ff { 7 } else { 8 };
        }

        let bit = (self.bit_buffer >> (self.bits_left - 1)) & 1;
        self.bits_left -= 1;
        Ok(bit)
    }

    pub fn read_bits(&mut self, mut count: u32) -> Result<u32, Tier2Error> {
        let mut bits = 0u32;
        while count > 0 {
            let bit = self.read_bit()?;
            bits = (bits << 1) | (bit as u32);
            count -= 1;
        }
        Ok(bits)
    }

    pub fn has_data(&self) -> bool {
        self.pos < self.data.len() || self.bits_left > 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}
