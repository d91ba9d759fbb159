//! End-to-end container tests over synthetic bitstreams: a real VPS, a
//! real atlas substream and three minimal HEVC substreams, assembled
//! bit-exactly with the in-workspace writer.

use vpcc_bitio::BitWriter;

use crate::atlas::afps::tests::write_afps;
use crate::atlas::asps::tests::write_asps;
use crate::container::ContainerVersion;
use crate::patch::PatchOrientation;
use crate::vps::tests::write_vps;
use crate::{Error, parse_first_frame_group, parse_frame_groups};

const FRAME_WIDTH: u32 = 1280;
const FRAME_HEIGHT: u32 = 1344;

/// Builds an HEVC Annex-B stream with `frame_count` coded pictures behind
/// a VPS/SPS/PPS preamble.
fn build_hevc_stream(frame_count: usize) -> Vec<u8> {
    const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

    fn nal_header(writer: &mut BitWriter, nal_type: u32) {
        writer.write_bit(false);
        writer.write_bits(nal_type, 6);
        writer.write_bits(0, 6);
        writer.write_bits(1, 3);
    }

    fn general_ptl(writer: &mut BitWriter) {
        writer.write_bits(0, 2);
        writer.write_bit(false);
        writer.write_bits(1, 5);
        writer.write_bits(1 << 30, 32);
        writer.write_bits(0b1000, 4);
        writer.write_bits(0, 32);
        writer.write_bits(0, 12);
        writer.write_bits(120, 8);
    }

    let mut stream = Vec::new();

    // VPS.
    let mut writer = BitWriter::new();
    nal_header(&mut writer, 32);
    writer.write_bits(0, 4);
    writer.write_bits(0b11, 2);
    writer.write_bits(0, 6);
    writer.write_bits(0, 3);
    writer.write_bit(true);
    writer.write_bits(0xFFFF, 16);
    general_ptl(&mut writer);
    stream.extend_from_slice(&START_CODE);
    stream.extend_from_slice(&writer.finish());

    // SPS.
    let mut writer = BitWriter::new();
    nal_header(&mut writer, 33);
    writer.write_bits(0, 4);
    writer.write_bits(0, 3);
    writer.write_bit(true);
    general_ptl(&mut writer);
    writer.write_uvlc(0);
    writer.write_uvlc(1);
    writer.write_uvlc(FRAME_WIDTH);
    writer.write_uvlc(FRAME_HEIGHT);
    writer.write_bit(false);
    writer.write_uvlc(0);
    writer.write_uvlc(0);
    writer.write_uvlc(4); // log2_max_pic_order_cnt_lsb_minus4
    writer.write_bit(true);
    writer.write_uvlc(3);
    writer.write_uvlc(0);
    writer.write_uvlc(0);
    writer.write_uvlc(0);
    writer.write_uvlc(3);
    stream.extend_from_slice(&START_CODE);
    stream.extend_from_slice(&writer.finish());

    // PPS.
    let mut writer = BitWriter::new();
    nal_header(&mut writer, 34);
    writer.write_uvlc(0);
    writer.write_uvlc(0);
    writer.write_bit(false);
    writer.write_bit(false);
    writer.write_bits(0, 3);
    stream.extend_from_slice(&START_CODE);
    stream.extend_from_slice(&writer.finish());

    for poc in 0..frame_count {
        let mut writer = BitWriter::new();

        if poc == 0 {
            // IDR slice; POC is 0 by definition.
            nal_header(&mut writer, 19);
            writer.write_bit(true);
            writer.write_bit(false);
            writer.write_uvlc(0);
            writer.write_uvlc(2);
        } else {
            nal_header(&mut writer, 1);
            writer.write_bit(true);
            writer.write_uvlc(0);
            writer.write_uvlc(2);
            writer.write_bits(poc as u32, 8);
        }

        writer.write_bits(0xFF, 8);

        stream.extend_from_slice(&START_CODE);
        stream.extend_from_slice(&writer.finish());
    }

    stream
}

/// Builds an atlas substream with one ASPS, one AFPS and one tile group
/// layer per frame: an I frame with two intra patches, then P frames each
/// holding one inter patch predicted from patch 0.
fn build_atlas_substream(frame_count: usize) -> Vec<u8> {
    let mut payload = Vec::new();

    // Sample-stream NAL header: 2-byte unit sizes.
    payload.push(0b0010_0000);

    let mut push_nal = |nal_type: u32, body: &dyn Fn(&mut BitWriter)| {
        let mut writer = BitWriter::new();
        writer.write_bit(false);
        writer.write_bits(nal_type, 6);
        writer.write_bits(0, 6);
        writer.write_bits(1, 3);
        body(&mut writer);

        let bytes = writer.finish();
        payload.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        payload.extend_from_slice(&bytes);
    };

    push_nal(32, &|writer| write_asps(writer, FRAME_WIDTH, FRAME_HEIGHT, 4));
    push_nal(33, &|writer| write_afps(writer, 7, 9));

    // I tile group: two intra patches.
    push_nal(0, &|writer| {
        writer.write_uvlc(0); // afps_id
        writer.write_bits(0, 1); // address
        writer.write_uvlc(2); // type: I
        writer.write_bits(0, 8); // atlas_frm_order_cnt_lsb
        writer.write_bit(true); // ref list from ASPS
        writer.write_bits(0, 5); // pos_min_z_quantizer
        writer.write_bit(true); // alignment stop bit
        writer.align_to_byte();

        // Patch 0: 2x2 blocks at (2, 3), default orientation.
        writer.write_uvlc(0); // INTRA
        writer.write_bits(2, 8); // pos_2d_x
        writer.write_bits(3, 8); // pos_2d_y
        writer.write_svlc(2); // delta size x
        writer.write_svlc(2); // delta size y
        writer.write_bits(10, 10); // pos_3d_x
        writer.write_bits(20, 10); // pos_3d_y
        writer.write_bits(3, 10); // pos_3d_min_z
        writer.write_bits(0, 3); // projection id
        writer.write_bits(0, 3); // orientation: DEFAULT

        // Patch 1: 2x3 blocks at (8, 1), ROT90.
        writer.write_uvlc(0); // INTRA
        writer.write_bits(8, 8);
        writer.write_bits(1, 8);
        writer.write_svlc(0); // delta size x (inherits 2)
        writer.write_svlc(1); // delta size y (2 + 1)
        writer.write_bits(0, 10);
        writer.write_bits(0, 10);
        writer.write_bits(0, 10);
        writer.write_bits(4, 3); // projection id 4 (far plane, axis 1)
        writer.write_bits(7, 3); // orientation: ROT90

        writer.write_uvlc(14); // END
        writer.write_bit(true);
        writer.align_to_byte();
    });

    // P tile groups: one inter patch each, predicted from patch 0 of the
    // previous frame, shifted one block right.
    for _ in 1..frame_count {
        push_nal(0, &|writer| {
            writer.write_uvlc(0); // afps_id
            writer.write_bits(0, 1); // address
            writer.write_uvlc(0); // type: P
            writer.write_bits(1, 8); // atlas_frm_order_cnt_lsb
            writer.write_bit(true); // ref list from ASPS
            writer.write_bits(0, 5); // pos_min_z_quantizer
            writer.write_bit(true);
            writer.align_to_byte();

            writer.write_uvlc(2); // INTER
            writer.write_svlc(0); // ref_patch_index
            writer.write_svlc(1); // pos_2d_x delta
            writer.write_svlc(0); // pos_2d_y delta
            writer.write_svlc(0); // delta size x
            writer.write_svlc(0); // delta size y
            writer.write_svlc(0); // pos_3d_x delta
            writer.write_svlc(0); // pos_3d_y delta
            writer.write_svlc(0); // pos_3d_min_z delta

            writer.write_uvlc(14); // END
            writer.write_bit(true);
            writer.align_to_byte();
        });
    }

    payload
}

/// Assembles a complete container with one frame group.
fn build_container(frame_count: usize) -> Vec<u8> {
    let mut data = Vec::new();

    // Container header.
    data.extend_from_slice(&[0x85, 0x0E, 0x5F, 0x01]);
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(&0u64.to_be_bytes());

    // Sample-stream header: 3-byte unit sizes.
    data.push(0b0100_0000);

    let push_unit = |data: &mut Vec<u8>, header_bits: &dyn Fn(&mut BitWriter), payload: &[u8]| {
        let mut writer = BitWriter::new();
        header_bits(&mut writer);
        let header = writer.finish();
        assert_eq!(header.len(), 4, "unit headers are 32 bits");

        let unit_size = (header.len() + payload.len()) as u32;
        data.extend_from_slice(&unit_size.to_be_bytes()[1..4]);
        data.extend_from_slice(&header);
        data.extend_from_slice(payload);
    };

    // VPS unit.
    let mut vps_payload = BitWriter::new();
    write_vps(&mut vps_payload, 0, FRAME_WIDTH, FRAME_HEIGHT, 4);
    push_unit(
        &mut data,
        &|writer| {
            writer.write_bits(0, 5);
            writer.write_bits(0, 27);
        },
        &vps_payload.finish(),
    );

    // AD unit.
    let atlas = build_atlas_substream(frame_count);
    push_unit(
        &mut data,
        &|writer| {
            writer.write_bits(1, 5);
            writer.write_bits(0, 4);
            writer.write_bits(0, 6);
            writer.write_bits(0, 17);
        },
        &atlas,
    );

    // OVD/GVD/AVD units: a 32-bit size then the HEVC stream.
    let hevc = build_hevc_stream(frame_count);

    let mut video_payload = Vec::new();
    video_payload.extend_from_slice(&(hevc.len() as u32).to_be_bytes());
    video_payload.extend_from_slice(&hevc);

    push_unit(
        &mut data,
        &|writer| {
            writer.write_bits(2, 5); // OVD
            writer.write_bits(0, 4);
            writer.write_bits(0, 6);
            writer.write_bits(0, 17);
        },
        &video_payload,
    );

    push_unit(
        &mut data,
        &|writer| {
            writer.write_bits(3, 5); // GVD
            writer.write_bits(0, 4);
            writer.write_bits(0, 6);
            writer.write_bits(0, 4); // map index
            writer.write_bit(false); // raw video flag
            writer.write_bits(0, 12);
        },
        &video_payload,
    );

    push_unit(
        &mut data,
        &|writer| {
            writer.write_bits(4, 5); // AVD
            writer.write_bits(0, 4);
            writer.write_bits(0, 6);
            writer.write_bits(0, 7); // attribute index
            writer.write_bits(0, 5); // attribute dimension index
            writer.write_bits(0, 4); // map index
            writer.write_bit(false); // raw video flag
        },
        &video_payload,
    );

    data
}

#[test]
fn parses_a_complete_frame_group() {
    let data = build_container(2);
    let groups = parse_frame_groups(&data, ContainerVersion::Draft121).unwrap();

    assert_eq!(groups.len(), 1);

    let group = &groups[0];
    assert_eq!(group.frame_width as u32, FRAME_WIDTH);
    assert_eq!(group.frame_height as u32, FRAME_HEIGHT);
    assert_eq!(group.frames.len(), 2);

    let config = group.occupancy().decoder_config.as_ref().unwrap();
    assert_eq!(config.width, FRAME_WIDTH);
    assert_eq!(config.height, FRAME_HEIGHT);

    // Frame 0: two intra patches.
    let frame = &group.frames[0];
    assert_eq!(frame.patches.len(), 2);

    let patch = &frame.patches[0];
    assert_eq!((patch.u0, patch.v0), (2, 3));
    assert_eq!((patch.size_u0, patch.size_v0), (2, 2));
    assert_eq!(patch.occupancy_resolution, 16);
    assert_eq!(patch.patch_orientation, PatchOrientation::Default);
    assert_eq!(patch.normal_axis, 0);
    assert_eq!((patch.tangent_axis, patch.bitangent_axis), (2, 1));
    assert_eq!(patch.projection_mode, 0);
    assert_eq!((patch.u1, patch.v1), (10, 20));
    // d1 = pos_3d_min_z * min_level with projection mode 0.
    assert_eq!(patch.d1, 3 * 4);

    let rotated = &frame.patches[1];
    assert_eq!(rotated.patch_orientation, PatchOrientation::Rot90);
    assert_eq!((rotated.size_u0, rotated.size_v0), (2, 3));
    assert_eq!(rotated.normal_axis, 1);
    assert_eq!(rotated.projection_mode, 1);

    // Frame 1: the inter patch inherits patch 0 shifted right.
    let inter = &group.frames[1].patches[0];
    assert_eq!(inter.best_match_index, 0);
    assert_eq!((inter.u0, inter.v0), (3, 3));
    assert_eq!((inter.size_u0, inter.size_v0), (2, 2));
    assert_eq!(inter.normal_axis, 0);
    assert_eq!(group.frames[1].ref_afoc_list[0], vec![0]);

    // Block-to-patch of frame 0.
    let blocks = &frame.block_to_patch;
    let stride = (FRAME_WIDTH / 16) as usize;
    assert_eq!(blocks.len(), stride * (FRAME_HEIGHT / 16) as usize);
    assert_eq!(blocks[2 + stride * 3], 1);
    assert_eq!(blocks[3 + stride * 4], 1);
    // ROT90 of patch 1 writes (u0 + size_v0 - 1, v0) for block (0, 0).
    assert_eq!(blocks[10 + stride], 2);
}

#[test]
fn three_streams_carry_equal_timestamps() {
    let data = build_container(2);
    let groups = parse_frame_groups(&data, ContainerVersion::Draft121).unwrap();

    for (i, frame) in groups[0].frames.iter().enumerate() {
        assert_eq!(frame.presentation_time_us, i as i64);

        // The packets of the three substreams describe the same picture
        // index; the shared frame timestamp travels with all three.
        assert_eq!(frame.occupancy_packet.picture_order_count, i as u32);
        assert_eq!(frame.geometry_packet.picture_order_count, i as u32);
        assert_eq!(frame.texture_packet.picture_order_count, i as u32);
    }
}

#[test]
fn single_shot_mode_matches_full_parse() {
    let data = build_container(2);

    let groups = parse_frame_groups(&data, ContainerVersion::Draft121).unwrap();
    let first = parse_first_frame_group(&data, ContainerVersion::Draft121).unwrap();

    assert_eq!(first.frames.len(), groups[0].frames.len());
    assert_eq!(first.frames[0].patches, groups[0].frames[0].patches);
    assert_eq!(first.frames[0].block_to_patch, groups[0].frames[0].block_to_patch);
}

#[test]
fn truncated_container_is_rejected() {
    let mut data = build_container(2);
    data.truncate(data.len() - 40);

    assert!(parse_frame_groups(&data, ContainerVersion::Draft121).is_err());
}

#[test]
fn reserved_units_are_skipped_by_declared_size() {
    let mut data = Vec::new();
    data.extend_from_slice(&[0x85, 0x0E, 0x5F, 0x01]);
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(&0u64.to_be_bytes());
    data.push(0b0100_0000);

    // VPS unit.
    let mut vps_payload = BitWriter::new();
    write_vps(&mut vps_payload, 0, FRAME_WIDTH, FRAME_HEIGHT, 4);
    let vps_payload = vps_payload.finish();

    let mut header = BitWriter::new();
    header.write_bits(0, 5);
    header.write_bits(0, 27);
    let header = header.finish();

    data.extend_from_slice(&((header.len() + vps_payload.len()) as u32).to_be_bytes()[1..4]);
    data.extend_from_slice(&header);
    data.extend_from_slice(&vps_payload);

    // Reserved unit type 17 with an 8-byte body the parser must step over.
    let mut reserved_header = BitWriter::new();
    reserved_header.write_bits(17, 5);
    reserved_header.write_bits(0, 27);
    let reserved_header = reserved_header.finish();

    data.extend_from_slice(&12u32.to_be_bytes()[1..4]);
    data.extend_from_slice(&reserved_header);
    data.extend_from_slice(&[0xEE; 8]);

    let groups = parse_frame_groups(&data, ContainerVersion::Draft121).unwrap();
    assert_eq!(groups.len(), 1);
    assert!(groups[0].frames.is_empty());
}

#[test]
fn video_unit_before_vps_is_fatal() {
    let mut data = Vec::new();
    data.extend_from_slice(&[0x85, 0x0E, 0x5F, 0x01]);
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(&16u64.to_be_bytes());
    data.push(0b0100_0000);

    // An OVD unit with no preceding VPS.
    data.extend_from_slice(&[0x00, 0x00, 0x04]);
    data.extend_from_slice(&[0b0001_0000, 0x00, 0x00, 0x00]);

    assert!(matches!(
        parse_frame_groups(&data, ContainerVersion::Draft121),
        Err(Error::MissingUnit("VPS"))
    ));
}
