//! j2kpack CLI - JPEG 2000 Tier-2 packet tool.
//!
//! Prints precinct geometry, assembles tile packet data from synthetic code-blocks and
//! dumps packet header bits.

use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use std::fs;
use std::path::PathBuf;

use j2kpack_rs::jpeg2000::tile_part::{LayerTruncation, SubbandKey, TileBlocks, assemble_tile_part};
use j2kpack_rs::{
    CodedCodeBlock, ComponentGeometry, HeaderBitReader, ImageGeometry, PacketCodingParameters,
    PacketEncoder, PrecinctGeometry, ProgressionOrder, SubbandContribution,
};

/// JPEG 2000 Tier-2 packet encoder
#[derive(Parser)]
#[command(name = "j2kpack")]
#[command(author = "j2kpack-rs contributors")]
#[command(version)]
#[command(about = "Inspect JPEG 2000 precinct geometry and packet encoding", long_about = None)]
#[command(after_help = "EXAMPLES:
    j2kpack geometry -w 512 -H 512 --levels 5
    j2kpack synth -w 256 -H 256 --layers 4 --sop --eph -o packets.bin
    j2kpack inspect --length 300 --passes 7 --skip 2

Set RUST_LOG=debug to log every packet.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print tiles, resolutions, precincts and code-block counts
    #[command(visible_alias = "g")]
    Geometry {
        #[command(flatten)]
        geometry: GeometryArgs,

        /// List the code-blocks of every precinct
        #[arg(short, long)]
        verbose: bool,
    },

    /// Assemble the packet data of synthetic code-blocks
    ///
    /// Code-block lengths and pass counts are drawn from a seeded generator, so the
    /// output is reproducible. Truncation points are spread evenly over the layers.
    #[command(visible_alias = "s")]
    Synth {
        #[command(flatten)]
        geometry: GeometryArgs,

        /// Number of quality layers
        #[arg(short, long, default_value = "3")]
        layers: u32,

        /// Packet progression order
        #[arg(long, default_value = "lrcp", value_enum)]
        order: Order,

        /// Emit SOP marker segments
        #[arg(long)]
        sop: bool,

        /// Emit EPH markers
        #[arg(long)]
        eph: bool,

        /// Seed of the synthetic data generator
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Write the packet data of all tiles to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Encode a single code-block packet and dump its header bits
    #[command(visible_alias = "i")]
    Inspect {
        /// Code-block length in bytes
        #[arg(long, default_value = "20")]
        length: usize,

        /// Number of coding passes included
        #[arg(long, default_value = "1")]
        passes: usize,

        /// Number of missing most significant bit-planes
        #[arg(long, default_value = "0")]
        skip: u32,
    },
}

#[derive(Args)]
struct GeometryArgs {
    /// Image width in reference grid samples
    #[arg(short, long, default_value = "256")]
    width: u32,

    /// Image height in reference grid samples
    #[arg(short = 'H', long, default_value = "256")]
    height: u32,

    /// Tile width (defaults to the image width)
    #[arg(long)]
    tile_width: Option<u32>,

    /// Tile height (defaults to the image height)
    #[arg(long)]
    tile_height: Option<u32>,

    /// Number of components
    #[arg(short = 'n', long, default_value = "1")]
    components: usize,

    /// Number of decomposition levels
    #[arg(long, default_value = "5")]
    levels: u8,

    /// Code-block width and height exponent
    #[arg(long, default_value = "6")]
    code_block: u8,

    /// Precinct width and height exponent, used for every resolution
    #[arg(long, default_value = "15")]
    precinct: u8,
}

impl GeometryArgs {
    fn image(&self) -> ImageGeometry {
        let component = ComponentGeometry {
            decomposition_levels: self.levels,
            code_block_width_exp: self.code_block,
            code_block_height_exp: self.code_block,
            precinct_exponents: vec![(self.precinct, self.precinct); self.levels as usize + 1],
            ..Default::default()
        };
        ImageGeometry {
            tile_width: self.tile_width.unwrap_or(self.width),
            tile_height: self.tile_height.unwrap_or(self.height),
            ..ImageGeometry::single_tile(self.width, self.height, vec![component; self.components])
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Order {
    /// Layer-resolution-component-position
    Lrcp,
    /// Resolution-layer-component-position
    Rlcp,
    /// Resolution-position-component-layer
    Rpcl,
    /// Position-component-resolution-layer
    Pcrl,
    /// Component-position-resolution-layer
    Cprl,
}

impl From<Order> for ProgressionOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Lrcp => ProgressionOrder::Lrcp,
            Order::Rlcp => ProgressionOrder::Rlcp,
            Order::Rpcl => ProgressionOrder::Rpcl,
            Order::Pcrl => ProgressionOrder::Pcrl,
            Order::Cprl => ProgressionOrder::Cprl,
        }
    }
}

fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Geometry { geometry, verbose } => show_geometry(&geometry, verbose),
        Commands::Synth {
            geometry,
            layers,
            order,
            sop,
            eph,
            seed,
            output,
        } => {
            let params = PacketCodingParameters {
                layers,
                progression_order: order.into(),
                start_of_packet: sop,
                end_of_packet_header: eph,
            };
            synthesize(&geometry, &params, seed, output.as_ref())
        }
        Commands::Inspect {
            length,
            passes,
            skip,
        } => inspect(length, passes, skip),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn show_geometry(args: &GeometryArgs, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let geometry = PrecinctGeometry::new(&args.image())?;

    for tile in geometry.tiles() {
        println!(
            "Tile {}: [{}, {}] {}x{}",
            tile.index,
            tile.rect.x0,
            tile.rect.y0,
            tile.rect.width(),
            tile.rect.height()
        );
        for (c, component) in tile.components.iter().enumerate() {
            println!("  Component {c}: {}x{}", component.rect.width(), component.rect.height());
            for res in &component.resolutions {
                let code_blocks: usize = res.subbands.iter().map(|s| s.code_block_count()).sum();
                println!(
                    "    r{}: {}x{}, {}x{} precincts, {} code-blocks",
                    res.level,
                    res.rect.width(),
                    res.rect.height(),
                    res.precincts_x,
                    res.precincts_y,
                    code_blocks
                );
                if !verbose {
                    continue;
                }
                for sb in &res.subbands {
                    println!(
                        "      {:?}: {}x{}, {}x{} code-blocks of {}x{}",
                        sb.orientation,
                        sb.rect.width(),
                        sb.rect.height(),
                        sb.code_blocks_x,
                        sb.code_blocks_y,
                        sb.code_block_width,
                        sb.code_block_height
                    );
                }
                for precinct in &res.precincts {
                    let per_subband: Vec<String> = precinct
                        .subbands
                        .iter()
                        .map(|s| format!("{}x{}", s.columns, s.rows))
                        .collect();
                    println!(
                        "      p{}: [{}]{}",
                        precinct.index,
                        per_subband.join(", "),
                        if precinct.is_empty() { " (empty)" } else { "" }
                    );
                }
            }
        }
    }
    Ok(())
}

fn synthesize(
    args: &GeometryArgs,
    params: &PacketCodingParameters,
    seed: u64,
    output: Option<&PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    params.validate()?;
    let mut encoder = PacketEncoder::new(&args.image())?;
    let mut rng = XorShiftRng::seed_from_u64(seed);
    let mut data = Vec::new();

    for tile in 0..encoder.geometry().tiles().len() {
        let (blocks, layers) = synthetic_tile(&encoder, tile, params.layers, &mut rng);
        let tile_part = assemble_tile_part(&mut encoder, params, tile, &blocks, &layers)?;

        println!("Tile {tile}: {} bytes", tile_part.data.len());
        for (layer, stats) in tile_part.layers.iter().enumerate() {
            println!(
                "  Layer {layer}: {} packets ({} empty), header {} bytes, body {} bytes, written {} bytes",
                stats.packets,
                stats.empty_packets,
                stats.header_bytes,
                stats.body_bytes,
                stats.written_bytes
            );
        }
        data.extend_from_slice(&tile_part.data);
    }

    if let Some(output) = output {
        fs::write(output, &data)?;
        println!("✓ Wrote {} bytes to {:?}", data.len(), output);
    }
    Ok(())
}

fn synthetic_tile(
    encoder: &PacketEncoder,
    tile: usize,
    layer_count: u32,
    rng: &mut XorShiftRng,
) -> (TileBlocks, Vec<LayerTruncation>) {
    let mut blocks = TileBlocks::new();
    let mut layers = vec![LayerTruncation::new(); layer_count as usize];

    let Some(tile_geometry) = encoder.geometry().tile(tile) else {
        return (blocks, layers);
    };

    for (component, tc) in tile_geometry.components.iter().enumerate() {
        for res in &tc.resolutions {
            for (subband, sb) in res.subbands.iter().enumerate() {
                let key = SubbandKey {
                    component,
                    resolution: res.level,
                    subband,
                };
                let coded: Vec<CodedCodeBlock> = (0..sb.code_block_count())
                    .map(|_| synthetic_block(rng))
                    .collect();

                for (layer, truncation) in layers.iter_mut().enumerate() {
                    let reached = coded
                        .iter()
                        .map(|block| {
                            let points = block.truncation_count();
                            let count = points * (layer + 1) / layer_count as usize;
                            count.checked_sub(1)
                        })
                        .collect();
                    truncation.insert(key, reached);
                }
                blocks.insert(key, coded);
            }
        }
    }
    (blocks, layers)
}

fn synthetic_block(rng: &mut XorShiftRng) -> CodedCodeBlock {
    let passes = rng.random_range(1..=30);
    let mut pass_lengths = Vec::with_capacity(passes);
    let mut length = 0;
    for _ in 0..passes {
        length += rng.random_range(1..=40);
        pass_lengths.push(length);
    }

    CodedCodeBlock {
        data: (0..length).map(|_| rng.random::<u8>()).collect(),
        pass_lengths,
        truncation_points: (0..passes).collect(),
        skip_msbp: rng.random_range(0..4),
        ..Default::default()
    }
}

fn inspect(length: usize, passes: usize, skip: u32) -> Result<(), Box<dyn std::error::Error>> {
    if passes == 0 || length < passes {
        return Err("need at least one pass and one byte per pass".into());
    }

    let component = ComponentGeometry {
        decomposition_levels: 0,
        ..Default::default()
    };
    let mut encoder = PacketEncoder::new(&ImageGeometry::single_tile(64, 64, vec![component]))?;

    // Spread the bytes evenly over the passes.
    let pass_lengths: Vec<usize> = (1..=passes).map(|p| length * p / passes).collect();
    let blocks = vec![CodedCodeBlock {
        data: vec![0; length],
        pass_lengths,
        truncation_points: vec![passes - 1],
        skip_msbp: skip,
        ..Default::default()
    }];
    let truncation = vec![Some(0)];
    let contribution = SubbandContribution {
        code_blocks: &blocks,
        truncation: &truncation,
    };

    let packet = encoder.encode_packet(0, 0, 0, 0, &[contribution], 0)?;
    let header = packet.header_bytes();

    let hex: Vec<String> = header.iter().map(|b| format!("{b:02X}")).collect();
    println!("Header: {} bytes [{}]", header.len(), hex.join(" "));
    println!("Body:   {} bytes", packet.body_length());

    let mut reader = HeaderBitReader::new(header);
    let mut bits = String::new();
    while let Ok(bit) = reader.read_bit() {
        bits.push(if bit == 1 { '1' } else { '0' });
    }
    println!("Bits:   {bits}");
    Ok(())
}
