use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::constants::DEFAULT_PRECINCT_EXPONENT;

/// Image and tiling parameters on the reference grid, as signalled in the SIZ and COD/COC
/// markers. This is the geometry source the packet encoder is built from.
#[derive(Debug, Clone, Default)]
pub struct ImageGeometry {
    /// Width of the image area in reference grid samples.
    pub width: u32,
    /// Height of the image area in reference grid samples.
    pub height: u32,
    /// Horizontal offset of the image area on the reference grid.
    pub x_origin: u32,
    /// Vertical offset of the image area on the reference grid.
    pub y_origin: u32,
    /// Width of an individual tile. If equal to `width`, the image has only one tile.
    pub tile_width: u32,
    /// Height of an individual tile.
    pub tile_height: u32,
    /// Horizontal offset of the first tile on the reference grid.
    pub tile_x_origin: u32,
    /// Vertical offset of the first tile on the reference grid.
    pub tile_y_origin: u32,
    /// Per-component sub-sampling and coding style.
    pub components: Vec<ComponentGeometry>,
}

impl ImageGeometry {
    /// A single-tile image where every component shares the same coding style.
    pub fn single_tile(width: u32, height: u32, components: Vec<ComponentGeometry>) -> Self {
        Self {
            width,
            height,
            tile_width: width,
            tile_height: height,
            components,
            ..Default::default()
        }
    }

    /// Right edge of the image area on the reference grid.
    pub fn x_end(&self) -> u32 {
        self.x_origin + self.width
    }

    /// Bottom edge of the image area on the reference grid.
    pub fn y_end(&self) -> u32 {
        self.y_origin + self.height
    }

    pub fn num_x_tiles(&self) -> u32 {
        (self.x_end() - self.tile_x_origin).div_ceil(self.tile_width)
    }

    pub fn num_y_tiles(&self) -> u32 {
        (self.y_end() - self.tile_y_origin).div_ceil(self.tile_height)
    }

    /// Number of tiles, `None` if it does not fit in a `u32`.
    pub fn num_tiles(&self) -> Option<u32> {
        self.num_x_tiles().checked_mul(self.num_y_tiles())
    }
}

/// Sub-sampling and coding style of one component.
#[derive(Debug, Clone)]
pub struct ComponentGeometry {
    /// Horizontal subsampling factor
    pub dx: u8,
    /// Vertical subsampling factor
    pub dy: u8,
    /// Number of wavelet decomposition levels (NL).
    pub decomposition_levels: u8,
    /// Code-block width exponent (xcb, e.g. 6 for 64-wide code-blocks).
    pub code_block_width_exp: u8,
    /// Code-block height exponent (ycb).
    pub code_block_height_exp: u8,
    /// Precinct exponents (PPx, PPy) per resolution level, lowest resolution first.
    /// Missing entries default to maximal precincts.
    pub precinct_exponents: Vec<(u8, u8)>,
}

impl Default for ComponentGeometry {
    fn default() -> Self {
        Self {
            dx: 1,
            dy: 1,
            decomposition_levels: 5,
            code_block_width_exp: 6,
            code_block_height_exp: 6,
            precinct_exponents: Vec::new(),
        }
    }
}

impl ComponentGeometry {
    pub fn num_resolutions(&self) -> usize {
        self.decomposition_levels as usize + 1
    }

    pub fn precinct_exponents(&self, resolution: usize) -> (u8, u8) {
        self.precinct_exponents
            .get(resolution)
            .copied()
            .unwrap_or((DEFAULT_PRECINCT_EXPONENT, DEFAULT_PRECINCT_EXPONENT))
    }
}

/// Orientation of a wavelet subband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SubbandOrientation {
    #[default]
    /// Low-Low (base image)
    LL = 0,
    /// High-Low (horizontal details)
    HL = 1,
    /// Low-High (vertical details)
    LH = 2,
    /// High-High (diagonal details)
    HH = 3,
}

impl SubbandOrientation {
    /// Subbands coded in the packets of a resolution level, in packet order.
    pub fn for_resolution(resolution: usize) -> &'static [SubbandOrientation] {
        if resolution == 0 {
            &[SubbandOrientation::LL]
        } else {
            &[
                SubbandOrientation::HL,
                SubbandOrientation::LH,
                SubbandOrientation::HH,
            ]
        }
    }

    /// Horizontal and vertical high-pass flags (xo_b, yo_b of equation B-15).
    pub fn offsets(self) -> (u32, u32) {
        match self {
            SubbandOrientation::LL => (0, 0),
            SubbandOrientation::HL => (1, 0),
            SubbandOrientation::LH => (0, 1),
            SubbandOrientation::HH => (1, 1),
        }
    }
}

/// Tier-1 coding result of one code-block, as consumed by the packet encoder.
#[derive(Debug, Clone, Default)]
pub struct CodedCodeBlock {
    /// Compressed bitstream for the code-block, all coding passes concatenated.
    pub data: Vec<u8>,
    /// Cumulative byte length of the bitstream at the end of each coding pass.
    pub pass_lengths: Vec<usize>,
    /// Passes that end a terminated codeword segment. May be empty when only the last
    /// pass included in a packet terminates.
    pub terminated: Vec<bool>,
    /// Pass indices of the candidate truncation points, strictly increasing.
    pub truncation_points: Vec<usize>,
    /// Number of all-zero most significant bit-planes.
    pub skip_msbp: u32,
    /// Number of coefficients belonging to the region of interest.
    pub roi_coefficients: u32,
    /// Number of leading coding passes that carry region of interest data.
    pub roi_passes: usize,
}

impl CodedCodeBlock {
    pub fn is_terminated(&self, pass: usize) -> bool {
        self.terminated.get(pass).copied().unwrap_or(false)
    }

    /// Number of candidate truncation points.
    pub fn truncation_count(&self) -> usize {
        self.truncation_points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_counts() {
        let geometry = ImageGeometry {
            width: 100,
            height: 50,
            x_origin: 10,
            y_origin: 0,
            tile_width: 64,
            tile_height: 64,
            tile_x_origin: 0,
            tile_y_origin: 0,
            components: vec![ComponentGeometry::default()],
        };
        assert_eq!(geometry.num_x_tiles(), 2);
        assert_eq!(geometry.num_y_tiles(), 1);
        assert_eq!(geometry.num_tiles(), Some(2));
    }

    #[test]
    fn test_subband_orientation() {
        assert_eq!(SubbandOrientation::for_resolution(0), &[SubbandOrientation::LL]);
        assert_eq!(SubbandOrientation::for_resolution(2).len(), 3);
        assert_eq!(u8::from(SubbandOrientation::HH), 3);
        assert_eq!(
            SubbandOrientation::try_from(2u8).ok(),
            Some(SubbandOrientation::LH)
        );
        assert!(SubbandOrientation::try_from(4u8).is_err());
    }

    #[test]
    fn test_default_precinct_exponents() {
        let component = ComponentGeometry {
            precinct_exponents: vec![(4, 5)],
            ..Default::default()
        };
        assert_eq!(component.precinct_exponents(0), (4, 5));
        assert_eq!(component.precinct_exponents(3), (15, 15));
        assert_eq!(component.num_resolutions(), 6);
    }
}
