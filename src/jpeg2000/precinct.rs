//! Tiles, resolutions, subbands, precincts and code-blocks of an image (ISO/IEC 15444-1, Annex B).
//!
//! The geometry is computed once from an [`ImageGeometry`] and never changes afterwards.
//! For every (tile, component, resolution, precinct) it lists, per subband, the code-blocks
//! that belong to the precinct in the order they appear in a packet header.

use log::trace;

use crate::constants::{
    MAX_DECOMPOSITION_LEVELS, MAX_TILES, MAXIMUM_CODE_BLOCK_EXPONENT, MAXIMUM_CODE_BLOCK_EXPONENT_SUM,
    MINIMUM_CODE_BLOCK_EXPONENT,
};
use crate::error::Tier2Error;
use crate::jpeg2000::image::{ComponentGeometry, ImageGeometry, SubbandOrientation};

/// Rectangle with exclusive right and bottom edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct IntRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl IntRect {
    pub fn from_ltrb(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> u32 {
        // See B-11.
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        // See B-11.
        self.y1.saturating_sub(self.y0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn intersect(&self, other: IntRect) -> IntRect {
        let x0 = u32::max(self.x0, other.x0);
        let y0 = u32::max(self.y0, other.y0);
        let x1 = u32::min(self.x1, other.x1);
        let y1 = u32::min(self.y1, other.y1);
        if x0 >= x1 || y0 >= y1 {
            IntRect::default()
        } else {
            IntRect::from_ltrb(x0, y0, x1, y1)
        }
    }
}

fn ceil_shift(value: u64, exp: u32) -> u64 {
    (value + (1u64 << exp) - 1) >> exp
}

fn clamp_u32(value: u64) -> u32 {
    value.min(u32::MAX as u64) as u32
}

/// Position of a code-block inside a subband and inside its precinct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodeBlockPosition {
    /// Index of the code-block in its subband, `y_idx * code_blocks_x + x_idx`.
    pub index: usize,
    /// Column of the code-block in the subband.
    pub x_idx: u32,
    /// Row of the code-block in the subband.
    pub y_idx: u32,
    /// Row inside the precinct's tag trees.
    pub row: usize,
    /// Column inside the precinct's tag trees.
    pub column: usize,
    /// Coefficients covered by the code-block, in subband coordinates.
    pub rect: IntRect,
}

/// Code-blocks of one subband that belong to one precinct.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrecinctSubband {
    pub rows: usize,
    pub columns: usize,
    /// Row-major, `rows * columns` entries.
    pub code_blocks: Vec<CodeBlockPosition>,
}

impl PrecinctSubband {
    pub fn is_empty(&self) -> bool {
        self.code_blocks.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Precinct {
    /// Index of the precinct in raster order within its resolution.
    pub index: usize,
    /// Area of the resolution level covered by the precinct.
    pub rect: IntRect,
    /// One entry per subband of the resolution, in packet order.
    pub subbands: Vec<PrecinctSubband>,
}

impl Precinct {
    /// A precinct without any code-block produces empty packets.
    pub fn is_empty(&self) -> bool {
        self.subbands.iter().all(PrecinctSubband::is_empty)
    }

    pub fn code_block_count(&self) -> usize {
        self.subbands.iter().map(|s| s.code_blocks.len()).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubbandGeometry {
    pub orientation: SubbandOrientation,
    /// Subband coefficients, in subband coordinates (B-15).
    pub rect: IntRect,
    pub code_block_width: u32,
    pub code_block_height: u32,
    /// Number of code-block columns covering the subband.
    pub code_blocks_x: u32,
    /// Number of code-block rows covering the subband.
    pub code_blocks_y: u32,
}

impl SubbandGeometry {
    pub fn code_block_count(&self) -> usize {
        self.code_blocks_x as usize * self.code_blocks_y as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolutionGeometry {
    /// Resolution level, 0 being the lowest resolution (LL only).
    pub level: usize,
    pub rect: IntRect,
    pub precinct_width_exp: u8,
    pub precinct_height_exp: u8,
    pub precincts_x: u32,
    pub precincts_y: u32,
    /// LL at level 0, HL, LH and HH otherwise.
    pub subbands: Vec<SubbandGeometry>,
    pub precincts: Vec<Precinct>,
}

impl ResolutionGeometry {
    pub fn num_precincts(&self) -> usize {
        self.precincts.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileComponentGeometry {
    pub rect: IntRect,
    pub resolutions: Vec<ResolutionGeometry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileGeometry {
    pub index: usize,
    /// Tile area on the reference grid.
    pub rect: IntRect,
    pub components: Vec<TileComponentGeometry>,
}

/// Code-block layout of every precinct of an image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrecinctGeometry {
    tiles: Vec<TileGeometry>,
}

impl PrecinctGeometry {
    pub fn new(image: &ImageGeometry) -> Result<Self, Tier2Error> {
        let num_tiles = validate(image)?;

        let tiles = (0..num_tiles as usize)
            .map(|t| build_tile(image, t))
            .collect();

        Ok(Self { tiles })
    }

    pub fn tiles(&self) -> &[TileGeometry] {
        &self.tiles
    }

    pub fn tile(&self, tile: usize) -> Option<&TileGeometry> {
        self.tiles.get(tile)
    }

    pub fn resolution(
        &self,
        tile: usize,
        component: usize,
        resolution: usize,
    ) -> Option<&ResolutionGeometry> {
        self.tiles
            .get(tile)?
            .components
            .get(component)?
            .resolutions
            .get(resolution)
    }

    pub fn num_precincts(&self, tile: usize, component: usize, resolution: usize) -> Option<usize> {
        self.resolution(tile, component, resolution)
            .map(ResolutionGeometry::num_precincts)
    }
}

/// Checks the image parameters and returns the number of tiles.
fn validate(image: &ImageGeometry) -> Result<u32, Tier2Error> {
    let x_end = image.x_origin.checked_add(image.width);
    let y_end = image.y_origin.checked_add(image.height);
    if image.width == 0
        || image.height == 0
        || image.tile_width == 0
        || image.tile_height == 0
        || x_end.is_none()
        || y_end.is_none()
        || image.components.is_empty()
    {
        return Err(Tier2Error::InvalidGeometry);
    }

    // The first tile must start at or before the image area and overlap it (B-3).
    let tile_x_end = image.tile_x_origin as u64 + image.tile_width as u64;
    let tile_y_end = image.tile_y_origin as u64 + image.tile_height as u64;
    if image.tile_x_origin > image.x_origin
        || image.tile_y_origin > image.y_origin
        || tile_x_end <= image.x_origin as u64
        || tile_y_end <= image.y_origin as u64
    {
        return Err(Tier2Error::InvalidGeometry);
    }

    let num_tiles = image
        .num_tiles()
        .filter(|&n| n <= MAX_TILES)
        .ok_or(Tier2Error::InvalidGeometry)?;

    for component in &image.components {
        validate_component(component)?;
    }
    Ok(num_tiles)
}

fn validate_component(component: &ComponentGeometry) -> Result<(), Tier2Error> {
    let xcb = component.code_block_width_exp;
    let ycb = component.code_block_height_exp;
    let exponent_range = MINIMUM_CODE_BLOCK_EXPONENT..=MAXIMUM_CODE_BLOCK_EXPONENT;

    if component.dx == 0
        || component.dy == 0
        || component.decomposition_levels > MAX_DECOMPOSITION_LEVELS
        || !exponent_range.contains(&xcb)
        || !exponent_range.contains(&ycb)
        || xcb + ycb > MAXIMUM_CODE_BLOCK_EXPONENT_SUM
    {
        return Err(Tier2Error::InvalidGeometry);
    }

    for r in 0..component.num_resolutions() {
        let (ppx, ppy) = component.precinct_exponents(r);
        if ppx > 15 || ppy > 15 || (r > 0 && (ppx == 0 || ppy == 0)) {
            return Err(Tier2Error::InvalidGeometry);
        }
    }
    Ok(())
}

fn build_tile(image: &ImageGeometry, index: usize) -> TileGeometry {
    let p = index as u64 % image.num_x_tiles() as u64;
    let q = index as u64 / image.num_x_tiles() as u64;

    // B-7.
    let tile_x = image.tile_x_origin as u64;
    let tile_y = image.tile_y_origin as u64;
    let tw = image.tile_width as u64;
    let th = image.tile_height as u64;
    let rect = IntRect::from_ltrb(
        clamp_u32((tile_x + p * tw).max(image.x_origin as u64)),
        clamp_u32((tile_y + q * th).max(image.y_origin as u64)),
        clamp_u32((tile_x + (p + 1) * tw).min(image.x_end() as u64)),
        clamp_u32((tile_y + (q + 1) * th).min(image.y_end() as u64)),
    );

    trace!(
        "tile {index}: [{},{} {}x{}]",
        rect.x0,
        rect.y0,
        rect.width(),
        rect.height()
    );

    let components = image
        .components
        .iter()
        .enumerate()
        .map(|(c, component)| build_tile_component(rect, c, component))
        .collect();

    TileGeometry {
        index,
        rect,
        components,
    }
}

fn build_tile_component(
    tile_rect: IntRect,
    component_idx: usize,
    component: &ComponentGeometry,
) -> TileComponentGeometry {
    // B-12.
    let dx = component.dx as u32;
    let dy = component.dy as u32;
    let rect = IntRect::from_ltrb(
        tile_rect.x0.div_ceil(dx),
        tile_rect.y0.div_ceil(dy),
        tile_rect.x1.div_ceil(dx),
        tile_rect.y1.div_ceil(dy),
    );

    let resolutions = (0..component.num_resolutions())
        .map(|r| build_resolution(rect, component_idx, component, r))
        .collect();

    TileComponentGeometry { rect, resolutions }
}

/// Subband rectangle according to equation B-15, `nb` being the decomposition level.
fn sub_band_rect(tile_component: IntRect, orientation: SubbandOrientation, nb: u32) -> IntRect {
    let (xo, yo) = orientation.offsets();
    let offset_x = if xo == 0 { 0 } else { 1u64 << (nb - 1) };
    let offset_y = if yo == 0 { 0 } else { 1u64 << (nb - 1) };

    let edge = |v: u32, offset: u64| clamp_u32(ceil_shift((v as u64).saturating_sub(offset), nb));

    IntRect::from_ltrb(
        edge(tile_component.x0, offset_x),
        edge(tile_component.y0, offset_y),
        edge(tile_component.x1, offset_x),
        edge(tile_component.y1, offset_y),
    )
}

fn build_resolution(
    tile_component: IntRect,
    component_idx: usize,
    component: &ComponentGeometry,
    resolution: usize,
) -> ResolutionGeometry {
    let levels = component.decomposition_levels as u32;
    let shift = levels - resolution as u32;
    // B-14.
    let rect = IntRect::from_ltrb(
        clamp_u32(ceil_shift(tile_component.x0 as u64, shift)),
        clamp_u32(ceil_shift(tile_component.y0 as u64, shift)),
        clamp_u32(ceil_shift(tile_component.x1 as u64, shift)),
        clamp_u32(ceil_shift(tile_component.y1 as u64, shift)),
    );

    let (ppx, ppy) = component.precinct_exponents(resolution);

    // B-16.
    let precincts_x = if rect.width() == 0 {
        0
    } else {
        clamp_u32(ceil_shift(rect.x1 as u64, ppx as u32) - ((rect.x0 as u64) >> ppx))
    };
    let precincts_y = if rect.height() == 0 {
        0
    } else {
        clamp_u32(ceil_shift(rect.y1 as u64, ppy as u32) - ((rect.y0 as u64) >> ppy))
    };

    // Precinct and code-block exponents in the subband domain (B-17, B-18).
    let (sub_ppx, sub_ppy) = if resolution == 0 {
        (ppx, ppy)
    } else {
        (ppx - 1, ppy - 1)
    };
    let xcb = component.code_block_width_exp.min(sub_ppx);
    let ycb = component.code_block_height_exp.min(sub_ppy);

    let nb = if resolution == 0 {
        levels
    } else {
        levels - resolution as u32 + 1
    };

    let subbands: Vec<SubbandGeometry> = SubbandOrientation::for_resolution(resolution)
        .iter()
        .map(|&orientation| {
            let sb_rect = sub_band_rect(tile_component, orientation, nb);
            let (code_blocks_x, code_blocks_y) = if sb_rect.is_empty() {
                (0, 0)
            } else {
                (
                    clamp_u32(ceil_shift(sb_rect.x1 as u64, xcb as u32) - ((sb_rect.x0 as u64) >> xcb)),
                    clamp_u32(ceil_shift(sb_rect.y1 as u64, ycb as u32) - ((sb_rect.y0 as u64) >> ycb)),
                )
            };

            trace!(
                "c {component_idx} r {resolution} sub-band {:?}: [{},{} {}x{}], {}x{} code-blocks",
                orientation,
                sb_rect.x0,
                sb_rect.y0,
                sb_rect.width(),
                sb_rect.height(),
                code_blocks_x,
                code_blocks_y
            );

            SubbandGeometry {
                orientation,
                rect: sb_rect,
                code_block_width: 1 << xcb,
                code_block_height: 1 << ycb,
                code_blocks_x,
                code_blocks_y,
            }
        })
        .collect();

    let first_px = (rect.x0 as u64) >> ppx;
    let first_py = (rect.y0 as u64) >> ppy;
    let mut precincts = Vec::with_capacity(precincts_x as usize * precincts_y as usize);

    for j in 0..precincts_y as u64 {
        for i in 0..precincts_x as u64 {
            let cell_x = first_px + i;
            let cell_y = first_py + j;

            let cell = IntRect::from_ltrb(
                clamp_u32(cell_x << ppx),
                clamp_u32(cell_y << ppy),
                clamp_u32((cell_x + 1) << ppx),
                clamp_u32((cell_y + 1) << ppy),
            );

            let sub_cell = IntRect::from_ltrb(
                clamp_u32(cell_x << sub_ppx),
                clamp_u32(cell_y << sub_ppy),
                clamp_u32((cell_x + 1) << sub_ppx),
                clamp_u32((cell_y + 1) << sub_ppy),
            );

            let precinct_subbands = subbands
                .iter()
                .map(|sb| precinct_code_blocks(sb, sub_cell, xcb, ycb))
                .collect();

            let precinct = Precinct {
                index: precincts.len(),
                rect: cell.intersect(rect),
                subbands: precinct_subbands,
            };

            trace!(
                "c {component_idx} r {resolution} precinct {}: {} code-blocks",
                precinct.index,
                precinct.code_block_count()
            );

            precincts.push(precinct);
        }
    }

    ResolutionGeometry {
        level: resolution,
        rect,
        precinct_width_exp: ppx,
        precinct_height_exp: ppy,
        precincts_x,
        precincts_y,
        subbands,
        precincts,
    }
}

/// Code-blocks of `subband` inside the precinct partition cell `cell`.
fn precinct_code_blocks(
    subband: &SubbandGeometry,
    cell: IntRect,
    xcb: u8,
    ycb: u8,
) -> PrecinctSubband {
    let area = cell.intersect(subband.rect);
    if area.is_empty() {
        return PrecinctSubband::default();
    }

    let first_cb_x = subband.rect.x0 >> xcb;
    let first_cb_y = subband.rect.y0 >> ycb;

    let cb_x0 = area.x0 >> xcb;
    let cb_y0 = area.y0 >> ycb;
    let cb_x1 = clamp_u32(ceil_shift(area.x1 as u64, xcb as u32));
    let cb_y1 = clamp_u32(ceil_shift(area.y1 as u64, ycb as u32));

    let rows = (cb_y1 - cb_y0) as usize;
    let columns = (cb_x1 - cb_x0) as usize;
    let mut code_blocks = Vec::with_capacity(rows * columns);

    for (row, cy) in (cb_y0..cb_y1).enumerate() {
        for (column, cx) in (cb_x0..cb_x1).enumerate() {
            let x_idx = cx - first_cb_x;
            let y_idx = cy - first_cb_y;
            let block_area = IntRect::from_ltrb(
                clamp_u32((cx as u64) << xcb),
                clamp_u32((cy as u64) << ycb),
                clamp_u32((cx as u64 + 1) << xcb),
                clamp_u32((cy as u64 + 1) << ycb),
            );

            code_blocks.push(CodeBlockPosition {
                index: y_idx as usize * subband.code_blocks_x as usize + x_idx as usize,
                x_idx,
                y_idx,
                row,
                column,
                rect: block_area.intersect(subband.rect),
            });
        }
    }

    PrecinctSubband {
        rows,
        columns,
        code_blocks,
    }
}
