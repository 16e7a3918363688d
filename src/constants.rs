pub const INITIAL_LBLOCK: u32 = 3; // Initial Lblock value as defined in ISO/IEC 15444-1, B.10.7.1

// Largest coding pass increment representable in a packet header, ISO/IEC 15444-1, table B.4.
pub const MAX_TRUNCATION_INCREMENT: usize = 163;

// Growth step of the packet header buffer in bytes. Must be at least 6 so that a single
// write_bits call of the widest header code never needs more than one grow.
pub const BIT_SINK_INCREMENT: usize = 16;

// Precinct exponents used when none are signalled (maximal precincts), ISO/IEC 15444-1, A.6.1.
pub const DEFAULT_PRECINCT_EXPONENT: u8 = 15;

pub const MAX_DECOMPOSITION_LEVELS: u8 = 32;

// Tile indices are signalled in the 16-bit Isot field, ISO/IEC 15444-1, A.4.2.
pub const MAX_TILES: u32 = 65535;

// Code-block exponent limits, ISO/IEC 15444-1, A.6.1.
pub const MINIMUM_CODE_BLOCK_EXPONENT: u8 = 2;
pub const MAXIMUM_CODE_BLOCK_EXPONENT: u8 = 10;
pub const MAXIMUM_CODE_BLOCK_EXPONENT_SUM: u8 = 12;

// The size in bytes of the SOP marker segment length field value (Lsop).
pub const START_OF_PACKET_SEGMENT_LENGTH: u16 = 4;
