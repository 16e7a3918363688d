//! JPEG 2000 Tier-2 coding (Part 1, ISO/IEC 15444-1, Annex B)
//!
//! This module turns Tier-1 coded code-blocks into packets.
//! It is divided into several sub-modules:
//!
//! - `bit_io`: Bit-stuffed packet header writer and a matching reader.
//! - `tag_tree`: Tag trees used for inclusion and zero bit-plane information.
//! - `image`: Image geometry and coded code-block data.
//! - `precinct`: Tiles, resolutions, subbands, precincts and code-blocks.
//! - `packet`: Packet header and body encoding with inter-layer state.
//! - `writer`: Packet emission with optional SOP/EPH markers.
//! - `progression`: Packet sequences of the layer-driven progression orders.
//! - `tile_part`: Packet data of a whole tile.

pub mod bit_io;
pub mod image;
pub mod packet;
pub mod precinct;
pub mod progression;
pub mod tag_tree;
pub mod tile_part;
pub mod writer;
