//! Packet header and body construction (ISO/IEC 15444-1, B.9 and B.10).
//!
//! A [`PacketEncoder`] owns the inter-layer coding state of every code-block of an image:
//! the inclusion and zero bit-plane tag trees of each precinct, the `Lblock` length
//! indicator and the last truncation point sent. Packets of a given (tile, component,
//! resolution, precinct) must be encoded in increasing layer order; [`PacketEncoder::save`]
//! and [`PacketEncoder::restore`] allow a rate allocator to try a layer and take it back.

use std::ops::Range;
use std::sync::Arc;

use log::{debug, warn};

use super::bit_io::BitSink;
use super::image::{CodedCodeBlock, ImageGeometry};
use super::precinct::{CodeBlockPosition, Precinct, PrecinctGeometry};
use super::tag_tree::{TagTreeEncoder, UNSET};
use crate::constants::{INITIAL_LBLOCK, MAX_TRUNCATION_INCREMENT};
use crate::error::Tier2Error;

/// Identifies the packets of one resolution level of one tile-component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolutionKey {
    pub tile: usize,
    pub component: usize,
    pub resolution: usize,
}

/// Inter-layer state of one code-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeBlockState {
    /// Base number of bits of the code-block length indicator.
    pub lblock: u32,
    /// Truncation index included by the last packet, `None` if never included.
    pub prev_truncation: Option<usize>,
}

impl Default for CodeBlockState {
    fn default() -> Self {
        Self {
            lblock: INITIAL_LBLOCK,
            prev_truncation: None,
        }
    }
}

/// Tag trees of one subband of one precinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecinctTrees {
    /// First layer in which each code-block is included.
    pub inclusion: TagTreeEncoder,
    /// Number of missing most significant bit-planes of each code-block.
    pub max_bitplane: TagTreeEncoder,
}

impl PrecinctTrees {
    fn new(rows: usize, columns: usize) -> Self {
        Self {
            inclusion: TagTreeEncoder::new(rows, columns),
            max_bitplane: TagTreeEncoder::new(rows, columns),
        }
    }

    fn reset(&mut self) {
        self.inclusion.reset();
        self.max_bitplane.reset();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SubbandState {
    /// Indexed like the code-blocks of the subband.
    blocks: Vec<CodeBlockState>,
    /// One pair of trees per precinct of the resolution.
    precincts: Vec<PrecinctTrees>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolutionState {
    subbands: Vec<SubbandState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ComponentState {
    resolutions: Vec<ResolutionState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TileState {
    components: Vec<ComponentState>,
}

/// Everything `encode_packet` mutates.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CodingState {
    tiles: Vec<TileState>,
}

impl CodingState {
    fn new(geometry: &PrecinctGeometry) -> Self {
        let tiles = geometry
            .tiles()
            .iter()
            .map(|tile| TileState {
                components: tile
                    .components
                    .iter()
                    .map(|component| ComponentState {
                        resolutions: component
                            .resolutions
                            .iter()
                            .map(|resolution| ResolutionState {
                                subbands: resolution
                                    .subbands
                                    .iter()
                                    .enumerate()
                                    .map(|(s, subband)| SubbandState {
                                        blocks: vec![
                                            CodeBlockState::default();
                                            subband.code_block_count()
                                        ],
                                        precincts: resolution
                                            .precincts
                                            .iter()
                                            .map(|p| {
                                                let slice = &p.subbands[s];
                                                PrecinctTrees::new(slice.rows, slice.columns)
                                            })
                                            .collect(),
                                    })
                                    .collect(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        Self { tiles }
    }

    fn resolution(&self, key: ResolutionKey) -> Option<&ResolutionState> {
        self.tiles
            .get(key.tile)?
            .components
            .get(key.component)?
            .resolutions
            .get(key.resolution)
    }

    fn resolution_mut(&mut self, key: ResolutionKey) -> Option<&mut ResolutionState> {
        self.tiles
            .get_mut(key.tile)?
            .components
            .get_mut(key.component)?
            .resolutions
            .get_mut(key.resolution)
    }

    fn subbands_mut(&mut self) -> impl Iterator<Item = &mut SubbandState> {
        self.tiles
            .iter_mut()
            .flat_map(|t| t.components.iter_mut())
            .flat_map(|c| c.resolutions.iter_mut())
            .flat_map(|r| r.subbands.iter_mut())
    }

    fn reset(&mut self) {
        for subband in self.subbands_mut() {
            subband.blocks.fill(CodeBlockState::default());
            for trees in &mut subband.precincts {
                trees.reset();
            }
        }
    }
}

/// Deep copy of the coding state of a [`PacketEncoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSnapshot {
    state: CodingState,
}

/// Code-blocks of one subband and the truncation index each should reach in this packet.
///
/// Both slices are indexed like the code-blocks of the subband (`y * code_blocks_x + x`).
#[derive(Debug, Clone, Copy)]
pub struct SubbandContribution<'a> {
    pub code_blocks: &'a [CodedCodeBlock],
    /// Index into each code-block's `truncation_points`; `None` while not yet included.
    pub truncation: &'a [Option<usize>],
}

/// Header and body of an encoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    header: BitSink,
    body: Arc<Vec<u8>>,
    writable: bool,
    empty: bool,
    roi_in_packet: bool,
    roi_length: usize,
}

impl EncodedPacket {
    fn unwritable() -> Self {
        Self {
            header: BitSink::new(),
            body: Arc::default(),
            writable: false,
            empty: true,
            roi_in_packet: false,
            roi_length: 0,
        }
    }

    pub fn header(&self) -> &BitSink {
        &self.header
    }

    pub fn header_bytes(&self) -> &[u8] {
        self.header.bytes()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_length(&self) -> usize {
        self.body.len()
    }

    /// Header and body length in bytes, markers excluded.
    pub fn total_length(&self) -> usize {
        self.header.length() + self.body.len()
    }

    /// False when the requested precinct does not exist; such packets are not written.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// True for a precinct without code-blocks, coded as a single `0` bit.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn is_roi_in_packet(&self) -> bool {
        self.roi_in_packet
    }

    /// Body length up to the end of the last code-block carrying region of interest data.
    pub fn roi_length(&self) -> usize {
        self.roi_length
    }

    pub fn into_parts(self) -> (BitSink, Vec<u8>) {
        (self.header, Arc::unwrap_or_clone(self.body))
    }
}

/// Header and body sizes of a tentatively encoded packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSize {
    pub header: usize,
    pub body: usize,
}

impl PacketSize {
    pub fn total(&self) -> usize {
        self.header + self.body
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inclusion {
    /// Never included so far and not in this packet either.
    Never,
    /// Included earlier, nothing new in this packet.
    Idle,
    /// Included for the first time.
    First,
    /// Included earlier and again in this packet.
    Again,
}

/// A codeword segment: bytes up to a terminated pass or to the truncation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    length: usize,
    passes: usize,
}

struct BlockPlan<'a> {
    subband: usize,
    position: &'a CodeBlockPosition,
    block: &'a CodedCodeBlock,
    target: Option<usize>,
    inclusion: Inclusion,
    pass_increment: usize,
    segments: Vec<Segment>,
    body: Range<usize>,
    roi: bool,
}

impl BlockPlan<'_> {
    fn is_included(&self) -> bool {
        matches!(self.inclusion, Inclusion::First | Inclusion::Again)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Commit,
    /// Encode, then put the precinct state back.
    Tentative,
}

/// Precinct trees and code-block states a packet may modify.
struct PrecinctBackup {
    trees: Vec<Option<PrecinctTrees>>,
    blocks: Vec<Option<CodeBlockState>>,
}

impl PrecinctBackup {
    fn take(state: &ResolutionState, precinct: usize, plans: &[BlockPlan<'_>]) -> Self {
        let trees = state
            .subbands
            .iter()
            .map(|s| s.precincts.get(precinct).cloned())
            .collect();
        let blocks = plans
            .iter()
            .map(|p| {
                state
                    .subbands
                    .get(p.subband)
                    .and_then(|s| s.blocks.get(p.position.index))
                    .copied()
            })
            .collect();
        Self { trees, blocks }
    }

    fn restore(self, state: &mut ResolutionState, precinct: usize, plans: &[BlockPlan<'_>]) {
        for (subband, trees) in state.subbands.iter_mut().zip(self.trees) {
            if let (Some(slot), Some(trees)) = (subband.precincts.get_mut(precinct), trees) {
                *slot = trees;
            }
        }
        for (plan, saved) in plans.iter().zip(self.blocks) {
            if let (Ok(slot), Some(saved)) = (
                block_state_mut(state, plan.subband, plan.position.index),
                saved,
            ) {
                *slot = saved;
            }
        }
    }
}

/// Tier-2 packet encoder for all tiles, components and resolutions of an image.
#[derive(Debug, Clone)]
pub struct PacketEncoder {
    geometry: PrecinctGeometry,
    state: CodingState,
    saved: Option<EncoderSnapshot>,
    last_body: Option<Arc<Vec<u8>>>,
}

impl PacketEncoder {
    pub fn new(image: &ImageGeometry) -> Result<Self, Tier2Error> {
        Ok(Self::from_geometry(PrecinctGeometry::new(image)?))
    }

    pub fn from_geometry(geometry: PrecinctGeometry) -> Self {
        let state = CodingState::new(&geometry);
        Self {
            geometry,
            state,
            saved: None,
            last_body: None,
        }
    }

    pub fn geometry(&self) -> &PrecinctGeometry {
        &self.geometry
    }

    pub fn num_precincts(&self, tile: usize, component: usize, resolution: usize) -> Option<usize> {
        self.geometry.num_precincts(tile, component, resolution)
    }

    /// State of code-block `block` of subband `subband` (position within the resolution).
    pub fn code_block_state(
        &self,
        key: ResolutionKey,
        subband: usize,
        block: usize,
    ) -> Option<CodeBlockState> {
        self.state
            .resolution(key)?
            .subbands
            .get(subband)?
            .blocks
            .get(block)
            .copied()
    }

    pub fn precinct_trees(
        &self,
        key: ResolutionKey,
        subband: usize,
        precinct: usize,
    ) -> Option<&PrecinctTrees> {
        self.state
            .resolution(key)?
            .subbands
            .get(subband)?
            .precincts
            .get(precinct)
    }

    /// Encode the packet of `layer` (0-based) for one precinct.
    ///
    /// `subbands` holds one entry per subband of the resolution: LL at resolution 0,
    /// HL, LH and HH otherwise. A precinct index beyond the precincts of the resolution
    /// yields an unwritable packet; a precinct without code-blocks yields the empty packet.
    pub fn encode_packet(
        &mut self,
        layer: u32,
        component: usize,
        resolution: usize,
        tile: usize,
        subbands: &[SubbandContribution<'_>],
        precinct: usize,
    ) -> Result<EncodedPacket, Tier2Error> {
        let key = ResolutionKey {
            tile,
            component,
            resolution,
        };
        let packet = self.encode(layer, key, subbands, precinct, Mode::Commit)?;
        self.last_body = packet.writable.then(|| Arc::clone(&packet.body));
        Ok(packet)
    }

    /// Encode a packet and undo its effect on the coding state, returning its size.
    pub fn probe_packet(
        &mut self,
        layer: u32,
        component: usize,
        resolution: usize,
        tile: usize,
        subbands: &[SubbandContribution<'_>],
        precinct: usize,
    ) -> Result<PacketSize, Tier2Error> {
        let key = ResolutionKey {
            tile,
            component,
            resolution,
        };
        let packet = self.encode(layer, key, subbands, precinct, Mode::Tentative)?;
        Ok(PacketSize {
            header: packet.header.length(),
            body: packet.body.len(),
        })
    }

    fn encode(
        &mut self,
        layer: u32,
        key: ResolutionKey,
        subbands: &[SubbandContribution<'_>],
        precinct: usize,
        mode: Mode,
    ) -> Result<EncodedPacket, Tier2Error> {
        let ResolutionKey {
            tile,
            component,
            resolution,
        } = key;
        if layer == UNSET {
            return Err(Tier2Error::InvalidArgument);
        }
        let resolution_geometry = self
            .geometry
            .resolution(tile, component, resolution)
            .ok_or(Tier2Error::InvalidArgument)?;

        let Some(precinct_geometry) = resolution_geometry.precincts.get(precinct) else {
            warn!(
                "t {tile} c {component} r {resolution}: precinct {precinct} out of range ({} precincts)",
                resolution_geometry.num_precincts()
            );
            return Ok(EncodedPacket::unwritable());
        };

        let mut header = BitSink::new();

        if precinct_geometry.is_empty() {
            header.write_bit(0);
            debug!("l {layer} t {tile} c {component} r {resolution} p {precinct}: empty packet");
            return Ok(EncodedPacket {
                header,
                body: Arc::default(),
                writable: true,
                empty: true,
                roi_in_packet: false,
                roi_length: 0,
            });
        }

        let resolution_state = self
            .state
            .resolution_mut(key)
            .ok_or(Tier2Error::InvalidArgument)?;

        // Everything that can fail on the caller's data is checked here, before any state
        // is touched.
        let plans = plan_precinct(precinct_geometry, precinct, subbands, resolution_state)?;

        header.write_bit(1);

        // Tag tree updates can still be refused for packets encoded out of layer order.
        // Keep what the packet touches so that a failure or a tentative packet leaves the state as it was.
        let backup = PrecinctBackup::take(resolution_state, precinct, &plans);

        if let Err(err) = write_header(resolution_state, precinct, layer, &plans, &mut header) {
            backup.restore(resolution_state, precinct, &plans);
            return Err(err);
        }

        let body_length = plans.iter().map(|p| p.body.len()).sum();
        let mut body = Vec::with_capacity(body_length);
        let mut roi_in_packet = false;
        let mut roi_length = 0;

        for plan in plans.iter().filter(|p| p.is_included()) {
            body.extend_from_slice(&plan.block.data[plan.body.clone()]);
            if plan.roi {
                roi_in_packet = true;
                roi_length = body.len();
            }
            block_state_mut(resolution_state, plan.subband, plan.position.index)?
                .prev_truncation = plan.target;
        }

        if mode == Mode::Tentative {
            backup.restore(resolution_state, precinct, &plans);
        }

        if header.is_empty() {
            return Err(Tier2Error::InconsistentPacketHeader);
        }

        debug!(
            "l {layer} t {tile} c {component} r {resolution} p {precinct}: header {} bytes, body {} bytes{}",
            header.length(),
            body.len(),
            if mode == Mode::Tentative { " (tentative)" } else { "" }
        );

        Ok(EncodedPacket {
            header,
            body: Arc::new(body),
            writable: true,
            empty: false,
            roi_in_packet,
            roi_length,
        })
    }

    /// Body of the last packet encoded.
    pub fn last_body(&self) -> Result<&[u8], Tier2Error> {
        self.last_body
            .as_deref()
            .map(Vec::as_slice)
            .ok_or(Tier2Error::NoPacketBody)
    }

    pub fn last_body_length(&self) -> Result<usize, Tier2Error> {
        self.last_body().map(<[u8]>::len)
    }

    pub fn snapshot(&self) -> EncoderSnapshot {
        EncoderSnapshot {
            state: self.state.clone(),
        }
    }

    pub fn restore_snapshot(&mut self, snapshot: &EncoderSnapshot) {
        self.state.clone_from(&snapshot.state);
    }

    /// Remember the current coding state.
    pub fn save(&mut self) {
        self.saved = Some(self.snapshot());
    }

    /// Return to the coding state of the last `save()`. The saved state is kept.
    pub fn restore(&mut self) -> Result<(), Tier2Error> {
        let saved = self.saved.as_ref().ok_or(Tier2Error::RestoreWithoutSave)?;
        self.state.clone_from(&saved.state);
        Ok(())
    }

    /// Return to the state of a newly constructed encoder.
    pub fn reset(&mut self) {
        self.state.reset();
        self.saved = None;
        self.last_body = None;
    }
}

/// Inclusion, zero bit-planes, pass count and lengths of every code-block (B.10.2 to B.10.7).
fn write_header(
    state: &mut ResolutionState,
    precinct: usize,
    layer: u32,
    plans: &[BlockPlan<'_>],
    header: &mut BitSink,
) -> Result<(), Tier2Error> {
    let threshold = layer + 1;

    for plan in plans {
        let trees = precinct_trees_mut(state, plan.subband, precinct)?;
        let (m, n) = (plan.position.row, plan.position.column);
        if plan.inclusion == Inclusion::First {
            trees.inclusion.set_value(m, n, layer)?;
        }
        if layer == 0 {
            trees.max_bitplane.set_value(m, n, plan.block.skip_msbp)?;
        }
    }

    for plan in plans {
        let (m, n) = (plan.position.row, plan.position.column);
        let trees = precinct_trees_mut(state, plan.subband, precinct)?;

        match plan.inclusion {
            Inclusion::Never => {
                trees.inclusion.encode(m, n, threshold, header)?;
                continue;
            }
            Inclusion::Idle => {
                header.write_bit(0);
                continue;
            }
            Inclusion::First => {
                trees.inclusion.encode(m, n, threshold, header)?;
                for bitplane in 1..=plan.block.skip_msbp + 1 {
                    trees.max_bitplane.encode(m, n, bitplane, header)?;
                }
            }
            Inclusion::Again => header.write_bit(1),
        }

        write_pass_increment(header, plan.pass_increment)?;

        let block = block_state_mut(state, plan.subband, plan.position.index)?;
        write_segment_lengths(header, &mut block.lblock, &plan.segments);
    }

    Ok(())
}

fn precinct_trees_mut(
    state: &mut ResolutionState,
    subband: usize,
    precinct: usize,
) -> Result<&mut PrecinctTrees, Tier2Error> {
    state
        .subbands
        .get_mut(subband)
        .and_then(|s| s.precincts.get_mut(precinct))
        .ok_or(Tier2Error::InvalidArgument)
}

fn block_state_mut(
    state: &mut ResolutionState,
    subband: usize,
    block: usize,
) -> Result<&mut CodeBlockState, Tier2Error> {
    state
        .subbands
        .get_mut(subband)
        .and_then(|s| s.blocks.get_mut(block))
        .ok_or(Tier2Error::InvalidArgument)
}

/// Work out what every code-block of the precinct contributes to the packet.
fn plan_precinct<'a>(
    precinct: &'a Precinct,
    precinct_index: usize,
    subbands: &'a [SubbandContribution<'a>],
    state: &ResolutionState,
) -> Result<Vec<BlockPlan<'a>>, Tier2Error> {
    let mut plans = Vec::with_capacity(precinct.code_block_count());

    for (s, slice) in precinct.subbands.iter().enumerate() {
        if slice.is_empty() {
            continue;
        }
        let contribution = subbands.get(s).ok_or(Tier2Error::InvalidArgument)?;
        let subband_state = state.subbands.get(s).ok_or(Tier2Error::InvalidArgument)?;
        if subband_state.precincts.len() <= precinct_index {
            return Err(Tier2Error::InvalidArgument);
        }

        for position in &slice.code_blocks {
            let block = contribution
                .code_blocks
                .get(position.index)
                .ok_or(Tier2Error::InvalidArgument)?;
            let target = *contribution
                .truncation
                .get(position.index)
                .ok_or(Tier2Error::InvalidArgument)?;
            let block_state = subband_state
                .blocks
                .get(position.index)
                .ok_or(Tier2Error::InvalidArgument)?;

            plans.push(plan_block(s, position, block, target, block_state.prev_truncation)?);
        }
    }

    Ok(plans)
}

fn plan_block<'a>(
    subband: usize,
    position: &'a CodeBlockPosition,
    block: &'a CodedCodeBlock,
    target: Option<usize>,
    previous: Option<usize>,
) -> Result<BlockPlan<'a>, Tier2Error> {
    // The zero bit-plane count is a tag tree value and is coded up to one past itself.
    if block.skip_msbp >= UNSET - 1 {
        return Err(Tier2Error::InvalidArgument);
    }

    let mut plan = BlockPlan {
        subband,
        position,
        block,
        target,
        inclusion: if previous.is_some() {
            Inclusion::Idle
        } else {
            Inclusion::Never
        },
        pass_increment: 0,
        segments: Vec::new(),
        body: 0..0,
        roi: false,
    };

    let Some(target_index) = target.filter(|_| target > previous) else {
        return Ok(plan);
    };

    let truncation_pass = |index: usize| {
        block
            .truncation_points
            .get(index)
            .copied()
            .ok_or(Tier2Error::InvalidArgument)
    };
    let pass_length = |pass: usize| {
        block
            .pass_lengths
            .get(pass)
            .copied()
            .ok_or(Tier2Error::InvalidArgument)
    };

    let last_pass = truncation_pass(target_index)?;
    let (first_pass, start, previous_pass) = match previous {
        None => (0, 0, None),
        Some(index) => {
            let pass = truncation_pass(index)?;
            (pass + 1, pass_length(pass)?, Some(pass))
        }
    };

    let pass_increment = last_pass
        .checked_sub(first_pass)
        .ok_or(Tier2Error::InvalidArgument)?;
    if pass_increment > MAX_TRUNCATION_INCREMENT {
        return Err(Tier2Error::TruncationIncrementTooLarge {
            increment: pass_increment,
        });
    }

    let mut segments = Vec::new();
    let mut segment_start = start;
    let mut passes = 1;
    for pass in first_pass..last_pass {
        if block.is_terminated(pass) {
            let end = pass_length(pass)?;
            segments.push(segment(segment_start, end, passes)?);
            segment_start = end;
            passes = 0;
        }
        passes += 1;
    }
    let end = pass_length(last_pass)?;
    segments.push(segment(segment_start, end, passes)?);

    if end > block.data.len() {
        return Err(Tier2Error::InvalidArgument);
    }

    plan.inclusion = if previous.is_some() {
        Inclusion::Again
    } else {
        Inclusion::First
    };
    plan.pass_increment = pass_increment;
    plan.segments = segments;
    plan.body = start..end;
    // The new bytes start with the pass after the previous truncation point.
    plan.roi = block.roi_coefficients != 0
        && previous_pass.map_or(0, |pass| pass + 1) < block.roi_passes;

    Ok(plan)
}

fn segment(start: usize, end: usize, passes: usize) -> Result<Segment, Tier2Error> {
    let length = end.checked_sub(start).ok_or(Tier2Error::InvalidArgument)?;
    if length > u32::MAX as usize {
        return Err(Tier2Error::InvalidArgument);
    }
    Ok(Segment { length, passes })
}

/// Number of new coding passes, Table B.4.
fn write_pass_increment(header: &mut BitSink, increment: usize) -> Result<(), Tier2Error> {
    match increment {
        0 => header.write_bit(0),
        1 => header.write_bits(0b10, 2),
        2..=4 => header.write_bits((0b11 << 2) | (increment as u32 - 2), 4),
        5..=35 => header.write_bits((0b1111 << 5) | (increment as u32 - 5), 9),
        36..=MAX_TRUNCATION_INCREMENT => {
            header.write_bits((0x1FF << 7) | (increment as u32 - 36), 16)
        }
        _ => return Err(Tier2Error::TruncationIncrementTooLarge { increment }),
    }
    Ok(())
}

fn floor_log2(value: usize) -> u32 {
    value.max(1).ilog2()
}

fn bits_needed(length: usize) -> u32 {
    if length > 0 { length.ilog2() + 1 } else { 1 }
}

/// Lblock increment followed by the length of every segment (B.10.7).
fn write_segment_lengths(header: &mut BitSink, lblock: &mut u32, segments: &[Segment]) {
    for segment in segments {
        let predicted = *lblock + floor_log2(segment.passes);
        for _ in predicted..bits_needed(segment.length) {
            *lblock += 1;
            header.write_bit(1);
        }
    }
    header.write_bit(0);

    for segment in segments {
        let mut bits = *lblock + floor_log2(segment.passes);
        while bits > 32 {
            header.write_bit(0);
            bits -= 1;
        }
        header.write_bits(segment.length as u32, bits);
    }
}
