//! Assembly of the packet data of a tile.
//!
//! A tile is always emitted as a single tile-part: the returned bytes are the complete
//! packet data following the SOD marker of that tile.

use std::collections::HashMap;

use log::debug;

use super::image::CodedCodeBlock;
use super::packet::{PacketEncoder, SubbandContribution};
use super::progression::packet_sequence;
use super::writer::PacketWriter;
use crate::coding_parameters::PacketCodingParameters;
use crate::error::Tier2Error;

/// Identifies one subband of a tile: `subband` is its position in the resolution
/// (0 for LL at resolution 0, 0 to 2 for HL, LH and HH otherwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubbandKey {
    pub component: usize,
    pub resolution: usize,
    pub subband: usize,
}

/// Coded code-blocks of every subband of a tile.
pub type TileBlocks = HashMap<SubbandKey, Vec<CodedCodeBlock>>;

/// Truncation index reached by every code-block of every subband at the end of one layer.
pub type LayerTruncation = HashMap<SubbandKey, Vec<Option<usize>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerStatistics {
    pub packets: usize,
    /// Packets of precincts without code-blocks.
    pub empty_packets: usize,
    pub header_bytes: usize,
    pub body_bytes: usize,
    /// Bytes appended to the tile-part, markers included.
    pub written_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePart {
    pub tile: usize,
    pub data: Vec<u8>,
    /// One entry per layer.
    pub layers: Vec<LayerStatistics>,
}

/// Encode and write every packet of `tile` in the configured progression order.
///
/// `layers` holds one truncation map per quality layer; its length must match
/// `params.layers`. Every subband that holds code-blocks must be present in `blocks` and in
/// each truncation map, otherwise the call fails with `InvalidArgument`. Subbands without
/// code-blocks may be left out.
pub fn assemble_tile_part(
    encoder: &mut PacketEncoder,
    params: &PacketCodingParameters,
    tile: usize,
    blocks: &TileBlocks,
    layers: &[LayerTruncation],
) -> Result<TilePart, Tier2Error> {
    params.validate()?;
    if layers.len() != params.layers as usize {
        return Err(Tier2Error::InvalidArgument);
    }

    let sequence = packet_sequence(encoder.geometry(), tile, params.layers, params.progression_order)?;
    let mut writer = PacketWriter::new(params.start_of_packet, params.end_of_packet_header);
    let mut statistics = vec![LayerStatistics::default(); layers.len()];

    for index in sequence {
        let subband_count = encoder
            .geometry()
            .resolution(tile, index.component, index.resolution)
            .map_or(0, |r| r.subbands.len());
        let truncation = &layers[index.layer as usize];

        let contributions: Vec<SubbandContribution<'_>> = (0..subband_count)
            .map(|subband| {
                let key = SubbandKey {
                    component: index.component,
                    resolution: index.resolution,
                    subband,
                };
                SubbandContribution {
                    code_blocks: blocks.get(&key).map(Vec::as_slice).unwrap_or_default(),
                    truncation: truncation.get(&key).map(Vec::as_slice).unwrap_or_default(),
                }
            })
            .collect();

        let packet = encoder.encode_packet(
            index.layer,
            index.component,
            index.resolution,
            tile,
            &contributions,
            index.precinct,
        )?;

        let stats = &mut statistics[index.layer as usize];
        stats.written_bytes += writer.write_packet(&packet);
        if packet.is_writable() {
            stats.packets += 1;
            stats.header_bytes += packet.header().length();
            stats.body_bytes += packet.body_length();
            if packet.is_empty() {
                stats.empty_packets += 1;
            }
        }
    }

    for (layer, stats) in statistics.iter().enumerate() {
        debug!(
            "tile {tile} layer {layer}: {} packets ({} empty), {} header bytes, {} body bytes",
            stats.packets, stats.empty_packets, stats.header_bytes, stats.body_bytes
        );
    }

    Ok(TilePart {
        tile,
        data: writer.into_bytes(),
        layers: statistics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg2000::image::{ComponentGeometry, ImageGeometry};
    use crate::jpeg2000::packet::ResolutionKey;
    use crate::jpeg2000::progression::ProgressionOrder;

    fn block(len: usize) -> CodedCodeBlock {
        CodedCodeBlock {
            data: vec![0x11; len],
            pass_lengths: (1..=len).collect(),
            truncation_points: (0..len).collect(),
            ..Default::default()
        }
    }

    fn setup() -> (PacketEncoder, TileBlocks) {
        let component = ComponentGeometry {
            decomposition_levels: 1,
            ..Default::default()
        };
        let image = ImageGeometry::single_tile(64, 64, vec![component]);
        let encoder = PacketEncoder::new(&image).unwrap();

        let mut blocks = TileBlocks::new();
        blocks.insert(
            SubbandKey {
                component: 0,
                resolution: 0,
                subband: 0,
            },
            vec![block(4)],
        );
        for subband in 0..3 {
            blocks.insert(
                SubbandKey {
                    component: 0,
                    resolution: 1,
                    subband,
                },
                vec![block(2)],
            );
        }
        (encoder, blocks)
    }

    fn truncation(blocks: &TileBlocks, index: Option<usize>) -> LayerTruncation {
        blocks.keys().map(|&key| (key, vec![index])).collect()
    }

    #[test]
    fn test_two_layers() {
        let (mut encoder, blocks) = setup();
        let params = PacketCodingParameters {
            layers: 2,
            ..Default::default()
        };
        let layers = vec![truncation(&blocks, Some(0)), truncation(&blocks, Some(1))];

        let tile_part = assemble_tile_part(&mut encoder, &params, 0, &blocks, &layers).unwrap();
        assert_eq!(tile_part.layers.len(), 2);
        assert_eq!(tile_part.layers[0].packets, 2);
        assert_eq!(tile_part.layers[0].body_bytes, 4);
        assert_eq!(tile_part.layers[1].body_bytes, 4);

        let total: usize = tile_part.layers.iter().map(|l| l.written_bytes).sum();
        assert_eq!(total, tile_part.data.len());
    }

    #[test]
    fn test_markers_and_orders_agree_on_size() {
        let (mut lrcp, blocks) = setup();
        let (mut rlcp, _) = setup();
        let layers = vec![truncation(&blocks, Some(1)), truncation(&blocks, Some(1))];

        let params = PacketCodingParameters {
            layers: 2,
            start_of_packet: true,
            end_of_packet_header: true,
            ..Default::default()
        };
        let a = assemble_tile_part(&mut lrcp, &params, 0, &blocks, &layers).unwrap();

        let params = PacketCodingParameters {
            progression_order: ProgressionOrder::Rlcp,
            ..params
        };
        let b = assemble_tile_part(&mut rlcp, &params, 0, &blocks, &layers).unwrap();

        assert_eq!(a.data.len(), b.data.len());
        // Nothing new in the second layer: one-byte headers.
        assert_eq!(a.layers[1].header_bytes, 2);
        assert_eq!(a.layers[1].body_bytes, 0);
        assert_eq!(a.layers[1].written_bytes, 2 * (6 + 1 + 2));
    }

    #[test]
    fn test_layer_count_mismatch() {
        let (mut encoder, blocks) = setup();
        let params = PacketCodingParameters {
            layers: 3,
            ..Default::default()
        };
        let layers = vec![truncation(&blocks, Some(0))];
        assert_eq!(
            assemble_tile_part(&mut encoder, &params, 0, &blocks, &layers),
            Err(Tier2Error::InvalidArgument)
        );
    }

    #[test]
    fn test_missing_subband() {
        let (mut encoder, mut blocks) = setup();
        let params = PacketCodingParameters::default();
        let key = SubbandKey {
            component: 0,
            resolution: 1,
            subband: 2,
        };
        blocks.remove(&key);
        let layers = vec![truncation(&blocks, Some(0))];

        let before = encoder.snapshot();
        assert_eq!(
            assemble_tile_part(&mut encoder, &params, 0, &blocks, &layers),
            Err(Tier2Error::InvalidArgument)
        );
        // The LL packet went out before the failure, the failing packet left no trace.
        assert_ne!(encoder.snapshot(), before);
        let res1 = ResolutionKey {
            tile: 0,
            component: 0,
            resolution: 1,
        };
        let state = encoder.code_block_state(res1, 0, 0).unwrap();
        assert_eq!(state.prev_truncation, None);
    }

    #[test]
    fn test_subbands_without_code_blocks_may_be_omitted() {
        // A 1x1 image leaves the high-pass subbands of resolution 1 empty.
        let component = ComponentGeometry {
            decomposition_levels: 1,
            ..Default::default()
        };
        let image = ImageGeometry::single_tile(1, 1, vec![component]);
        let mut encoder = PacketEncoder::new(&image).unwrap();

        let mut blocks = TileBlocks::new();
        blocks.insert(
            SubbandKey {
                component: 0,
                resolution: 0,
                subband: 0,
            },
            vec![block(1)],
        );
        let layers = vec![truncation(&blocks, Some(0))];

        let tile_part =
            assemble_tile_part(&mut encoder, &PacketCodingParameters::default(), 0, &blocks, &layers)
                .unwrap();
        assert_eq!(tile_part.layers[0].packets, 2);
        assert_eq!(tile_part.layers[0].empty_packets, 1);
        assert_eq!(tile_part.layers[0].body_bytes, 1);
    }
}
