use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::precinct::PrecinctGeometry;
use crate::error::Tier2Error;

/// Packet progression order, as signalled in the COD marker (ISO/IEC 15444-1, Table A.16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ProgressionOrder {
    /// Layer-resolution level-component-position
    #[default]
    Lrcp = 0,
    /// Resolution level-layer-component-position
    Rlcp = 1,
    /// Resolution level-position-component-layer
    Rpcl = 2,
    /// Position-component-resolution level-layer
    Pcrl = 3,
    /// Component-position-resolution level-layer
    Cprl = 4,
}

impl ProgressionOrder {
    pub fn name(self) -> &'static str {
        match self {
            Self::Lrcp => "LRCP",
            Self::Rlcp => "RLCP",
            Self::Rpcl => "RPCL",
            Self::Pcrl => "PCRL",
            Self::Cprl => "CPRL",
        }
    }

    /// Orders whose packet sequence does not depend on precinct positions.
    pub fn is_supported(self) -> bool {
        matches!(self, Self::Lrcp | Self::Rlcp)
    }
}

/// Position of one packet in the tile's packet sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketIndex {
    pub layer: u32,
    pub resolution: usize,
    pub component: usize,
    pub precinct: usize,
}

/// Every packet of `tile` in the order mandated by `order` (B.12.1.1 and B.12.1.2).
pub fn packet_sequence(
    geometry: &PrecinctGeometry,
    tile: usize,
    layers: u32,
    order: ProgressionOrder,
) -> Result<Vec<PacketIndex>, Tier2Error> {
    let tile = geometry.tile(tile).ok_or(Tier2Error::InvalidArgument)?;
    let max_resolutions = tile
        .components
        .iter()
        .map(|c| c.resolutions.len())
        .max()
        .unwrap_or(0);

    // Packets of one (layer, resolution) pair, components then precincts.
    let layer_resolution = |layer: u32, resolution: usize, out: &mut Vec<PacketIndex>| {
        for (component, tc) in tile.components.iter().enumerate() {
            let Some(res) = tc.resolutions.get(resolution) else {
                continue;
            };
            out.extend((0..res.num_precincts()).map(|precinct| PacketIndex {
                layer,
                resolution,
                component,
                precinct,
            }));
        }
    };

    let mut sequence = Vec::new();
    match order {
        ProgressionOrder::Lrcp => {
            for layer in 0..layers {
                for resolution in 0..max_resolutions {
                    layer_resolution(layer, resolution, &mut sequence);
                }
            }
        }
        ProgressionOrder::Rlcp => {
            for resolution in 0..max_resolutions {
                for layer in 0..layers {
                    layer_resolution(layer, resolution, &mut sequence);
                }
            }
        }
        _ => return Err(Tier2Error::UnsupportedProgressionOrder),
    }

    Ok(sequence)
}
