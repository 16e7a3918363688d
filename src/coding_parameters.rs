use crate::error::Tier2Error;
use crate::jpeg2000::progression::ProgressionOrder;

/// Packet-level coding options of a tile, as signalled in the COD marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketCodingParameters {
    /// Number of quality layers.
    pub layers: u32,
    pub progression_order: ProgressionOrder,
    /// Precede every packet with an SOP marker segment.
    pub start_of_packet: bool,
    /// Follow every packet header with an EPH marker.
    pub end_of_packet_header: bool,
}

impl Default for PacketCodingParameters {
    fn default() -> Self {
        Self {
            layers: 1,
            progression_order: ProgressionOrder::Lrcp,
            start_of_packet: false,
            end_of_packet_header: false,
        }
    }
}

impl PacketCodingParameters {
    pub fn validate(&self) -> Result<(), Tier2Error> {
        // SGcod carries the layer count on 16 bits.
        if self.layers == 0 || self.layers > u16::MAX as u32 {
            return Err(Tier2Error::InvalidArgument);
        }
        if !self.progression_order.is_supported() {
            return Err(Tier2Error::UnsupportedProgressionOrder);
        }
        Ok(())
    }
}
