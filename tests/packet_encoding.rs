use j2kpack_rs::jpeg2000::packet::{CodeBlockState, ResolutionKey};
use j2kpack_rs::{
    BitSink, CodedCodeBlock, ComponentGeometry, HeaderBitReader, ImageGeometry, PacketEncoder,
    SubbandContribution, Tier2Error,
};

const RES0: ResolutionKey = ResolutionKey {
    tile: 0,
    component: 0,
    resolution: 0,
};

/// Single tile, single component, no decomposition: resolution 0 holds only LL.
fn ll_only_encoder(size: u32) -> PacketEncoder {
    let component = ComponentGeometry {
        decomposition_levels: 0,
        ..Default::default()
    };
    PacketEncoder::new(&ImageGeometry::single_tile(size, size, vec![component])).unwrap()
}

fn coded(pass_lengths: Vec<usize>) -> CodedCodeBlock {
    let size = pass_lengths.last().copied().unwrap_or(0);
    CodedCodeBlock {
        data: (0..size).map(|i| (i * 7 + 1) as u8).collect(),
        truncation_points: (0..pass_lengths.len()).collect(),
        pass_lengths,
        ..Default::default()
    }
}

fn header_bits(bytes: &[u8]) -> Vec<u8> {
    let mut reader = HeaderBitReader::new(bytes);
    let mut bits = Vec::new();
    while let Ok(bit) = reader.read_bit() {
        bits.push(bit);
    }
    bits
}

#[test]
fn test_first_inclusion_of_one_code_block() {
    // 2x2 code-blocks of 64x64 in a single precinct.
    let mut encoder = ll_only_encoder(128);
    let blocks = vec![
        coded(vec![3, 6]),
        coded(vec![4]),
        coded(vec![5]),
        coded(vec![6]),
    ];
    let truncation = vec![Some(0), None, None, None];
    let contribution = SubbandContribution {
        code_blocks: &blocks,
        truncation: &truncation,
    };

    let packet = encoder.encode_packet(0, 0, 0, 0, &[contribution], 0).unwrap();

    // 1 | inclusion 11 | zero bit-planes 11 | 1 pass 0 | Lblock 0 | 3 in 3 bits 011
    // then one inclusion bit 0 for each of the three other code-blocks.
    assert_eq!(packet.header_bytes(), &[0xF8, 0xC0]);
    assert_eq!(packet.body_length(), 3);
    assert_eq!(packet.body(), &blocks[0].data[..3]);
    assert!(packet.is_writable());
    assert!(!packet.is_roi_in_packet());
}

#[test]
fn test_empty_precinct() {
    // A 1x1 image leaves every high-pass subband of resolution 1 empty.
    let component = ComponentGeometry {
        decomposition_levels: 1,
        ..Default::default()
    };
    let mut encoder =
        PacketEncoder::new(&ImageGeometry::single_tile(1, 1, vec![component])).unwrap();

    let packet = encoder.encode_packet(0, 0, 1, 0, &[], 0).unwrap();
    assert_eq!(packet.header().length(), 1);
    assert_eq!(packet.header_bytes(), &[0x00]);
    assert_eq!(packet.body_length(), 0);
    assert!(packet.is_writable());
    assert!(packet.is_empty());
    assert_eq!(encoder.last_body_length(), Ok(0));
}

#[test]
fn test_stuffed_bit_after_ff() {
    let mut sink = BitSink::new();
    sink.write_bits(0xFF, 8);
    assert_eq!(sink.available_bits(), 7);
    sink.write_bit(1);
    assert_eq!(sink.bytes(), &[0xFF, 0x40]);
}

#[test]
fn test_code_block_skipping_a_layer() {
    let mut encoder = ll_only_encoder(64);
    let blocks = vec![coded(vec![2, 5, 9, 14])];

    let layer_truncation = [Some(0), Some(0), Some(2)];
    let mut packets = Vec::new();
    for (layer, &target) in layer_truncation.iter().enumerate() {
        let truncation = vec![target];
        let contribution = SubbandContribution {
            code_blocks: &blocks,
            truncation: &truncation,
        };
        packets.push(
            encoder
                .encode_packet(layer as u32, 0, 0, 0, &[contribution], 0)
                .unwrap(),
        );

        if layer == 1 {
            // Layer 1 sent nothing, so the previous truncation is still the first one.
            assert_eq!(
                encoder.code_block_state(RES0, 0, 0),
                Some(CodeBlockState {
                    lblock: 3,
                    prev_truncation: Some(0)
                })
            );
        }
    }

    // Already included, nothing new.
    assert_eq!(header_bits(packets[1].header_bytes())[..2], [1, 0]);
    assert_eq!(packets[1].body_length(), 0);

    // Included again: 1 | 2 passes 10 | Lblock 0 | 7 bytes in 3 + 1 bits 0111
    assert_eq!(
        header_bits(packets[2].header_bytes())[..9],
        [1, 1, 1, 0, 0, 0, 1, 1, 1]
    );
    assert_eq!(packets[2].body(), &blocks[0].data[2..9]);
    assert_eq!(
        encoder.code_block_state(RES0, 0, 0).map(|s| s.prev_truncation),
        Some(Some(2))
    );
}

#[test]
fn test_header_never_contains_marker() {
    // A 64 KiB code-block forces 14 Lblock increments: a run of ones crossing a byte.
    let mut encoder = ll_only_encoder(64);
    let blocks = vec![coded(vec![1 << 16])];
    let truncation = vec![Some(0)];
    let contribution = SubbandContribution {
        code_blocks: &blocks,
        truncation: &truncation,
    };

    let packet = encoder.encode_packet(0, 0, 0, 0, &[contribution], 0).unwrap();
    let header = packet.header_bytes();
    assert!(header.contains(&0xFF));
    for pair in header.windows(2) {
        if pair[0] == 0xFF {
            assert!(pair[1] < 0x80, "marker code in header: {:02X?}", header);
        }
    }

    let mut reader = HeaderBitReader::new(header);
    assert_eq!(reader.read_bits(4), Ok(0b1110));
    assert_eq!(reader.read_bits(14), Ok(0x3FFF));
    assert_eq!(reader.read_bit(), Ok(0));
    assert_eq!(reader.read_bits(17), Ok(1 << 16));
    assert_eq!(
        encoder.code_block_state(RES0, 0, 0).map(|s| s.lblock),
        Some(17)
    );
}

#[test]
fn test_roi_length() {
    let mut encoder = ll_only_encoder(128);
    let mut roi = coded(vec![2, 4]);
    roi.roi_coefficients = 10;
    roi.roi_passes = 1;
    let blocks = vec![roi, coded(vec![5]), coded(vec![1]), coded(vec![1])];
    let truncation = vec![Some(1), Some(0), None, None];
    let contribution = SubbandContribution {
        code_blocks: &blocks,
        truncation: &truncation,
    };

    let packet = encoder.encode_packet(0, 0, 0, 0, &[contribution], 0).unwrap();
    assert!(packet.is_roi_in_packet());
    assert_eq!(packet.roi_length(), 4);
    assert_eq!(packet.body_length(), 9);
}

#[test]
fn test_restore_then_reencode_is_identical() {
    let mut encoder = ll_only_encoder(128);
    let blocks = vec![
        coded(vec![3, 6, 20]),
        coded(vec![4, 40]),
        coded(vec![5]),
        coded(vec![6, 7, 8, 9]),
    ];
    let first = vec![Some(0), None, Some(0), Some(1)];
    let second = vec![Some(2), Some(1), Some(0), Some(3)];

    let contribution = SubbandContribution {
        code_blocks: &blocks,
        truncation: &first,
    };
    encoder.encode_packet(0, 0, 0, 0, &[contribution], 0).unwrap();

    encoder.save();
    let checkpoint = encoder.snapshot();

    let contribution = SubbandContribution {
        code_blocks: &blocks,
        truncation: &second,
    };
    let tentative = encoder.encode_packet(1, 0, 0, 0, &[contribution], 0).unwrap();
    assert_ne!(encoder.snapshot(), checkpoint);

    encoder.restore().unwrap();
    assert_eq!(encoder.snapshot(), checkpoint);

    let committed = encoder.encode_packet(1, 0, 0, 0, &[contribution], 0).unwrap();
    assert_eq!(tentative, committed);

    // The saved state survives a restore and can be used again.
    encoder.restore().unwrap();
    assert_eq!(encoder.snapshot(), checkpoint);
}

#[test]
fn test_encoders_are_deterministic() {
    let blocks = vec![
        coded(vec![10, 20, 30]),
        coded(vec![1, 2]),
        coded(vec![300, 301]),
        coded(vec![8]),
    ];
    let layers = [
        vec![Some(0), None, Some(0), None],
        vec![Some(1), Some(0), Some(0), None],
        vec![Some(2), Some(1), Some(1), Some(0)],
    ];

    let run = || {
        let mut encoder = ll_only_encoder(128);
        let mut out = Vec::new();
        for (layer, truncation) in layers.iter().enumerate() {
            let contribution = SubbandContribution {
                code_blocks: &blocks,
                truncation,
            };
            let packet = encoder
                .encode_packet(layer as u32, 0, 0, 0, &[contribution], 0)
                .unwrap();
            out.extend_from_slice(packet.header_bytes());
            out.extend_from_slice(packet.body());
        }
        out
    };

    assert_eq!(run(), run());
}

#[test]
fn test_failed_encode_keeps_state() {
    let mut encoder = ll_only_encoder(64);
    let lengths: Vec<usize> = (1..=170).collect();
    let blocks = vec![coded(lengths)];
    let before = encoder.snapshot();

    let truncation = vec![Some(165)];
    let contribution = SubbandContribution {
        code_blocks: &blocks,
        truncation: &truncation,
    };
    assert_eq!(
        encoder.encode_packet(0, 0, 0, 0, &[contribution], 0),
        Err(Tier2Error::TruncationIncrementTooLarge { increment: 165 })
    );
    assert_eq!(encoder.snapshot(), before);

    // The largest representable increment goes through.
    let truncation = vec![Some(163)];
    let contribution = SubbandContribution {
        code_blocks: &blocks,
        truncation: &truncation,
    };
    let packet = encoder.encode_packet(0, 0, 0, 0, &[contribution], 0).unwrap();
    assert_eq!(packet.body_length(), 164);
}
