//! The TMC2 draft-6 bitstream syntax.
//!
//! Draft 6 predates the sample-stream framing and the atlas NAL layer:
//! V-PCC units are packed back to back, the side information travels in a
//! patch data group (PDG) instead of an atlas sub-bitstream, and the
//! parameter sets are named PSPS/PFPS/PTGLU rather than ASPS/AFPS/ATGL.
//! The semantics map one-to-one onto the primary data model, so this
//! module produces the same [`FrameGroup`] records as the current syntax.

use tracing::{debug, info, warn};
use vpcc_bitio::{BitReader, fixed_length_code_bits_count};
use vpcc_hevc::{DecoderConfig, scan_nal_units, split_into_packets};

use crate::container::{ContainerHeader, ContainerVersion};
use crate::frame::{FrameData, FrameGroup, VideoType};
use crate::patch::{Patch, PatchOrientation, RawPatch};
use crate::reconstruct::create_block_to_patch;
use crate::vps::byte_alignment;
use crate::{Error, Result};

mod unit_type {
    pub const SPS: u8 = 0;
    pub const PDG: u8 = 1;
    pub const OVD: u8 = 2;
    pub const GVD: u8 = 3;
    pub const AVD: u8 = 4;
}

mod pdg_unit_type {
    pub const PSPS: u32 = 0;
    pub const PFPS: u32 = 1;
    pub const PFGPS: u32 = 2;
    pub const PFAPS: u32 = 3;
    pub const GPPS: u32 = 4;
    pub const APPS: u32 = 5;
    pub const PTGLU: u32 = 6;
    pub const PREFIX_SEI: u32 = 7;
    pub const SUFFIX_SEI: u32 = 8;
}

mod patch_mode_i {
    pub const INTRA: u8 = 0;
    pub const PCM: u8 = 1;
    pub const END: u8 = 14;
}

mod patch_mode_p {
    pub const SKIP: u8 = 0;
    pub const INTRA: u8 = 1;
    pub const INTER: u8 = 2;
    pub const PCM: u8 = 3;
    pub const END: u8 = 14;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum PatchFrameType {
    #[default]
    I,
    P,
}

/// The draft-6 sequence parameter set, parsed to the depth the patch
/// data group and reconstruction reference.
#[derive(Debug, Clone, Default)]
struct SequenceParameterSet {
    frame_width: u16,
    frame_height: u16,
    layer_count_minus1: u8,
    multiple_layer_streams_present_flag: bool,
    layer_absolute_coding_enabled: Vec<bool>,
    pcm_patch_enabled_flag: bool,
    pcm_separate_video_present_flag: bool,
    geometry_nominal_2d_bitdepth_minus1: u8,
    geometry_3d_coordinates_bitdepth_minus1: u8,
    geometry_params_enabled_flag: bool,
    geometry_patch_params_enabled_flag: bool,
    attribute_count: usize,
    attribute_dimension_minus1: Vec<u8>,
    attribute_params_enabled_flag: bool,
    attribute_patch_params_enabled_flag: bool,
    point_local_reconstruction_enabled_flag: bool,
    plr_number_of_modes_minus1: u8,
    plr_block_threshold_per_patch_minus1: u32,
    projection_45degree_enabled_flag: bool,
    patch_precedence_order_flag: bool,
    min_level: u8,
}

#[derive(Debug, Clone, Default)]
struct PatchSequenceParameterSet {
    log2_patch_packing_block_size: u8,
    log2_max_patch_frame_order_cnt_lsb: u32,
    long_term_ref_patch_frames_flag: bool,
    num_ref_patch_frame_lists: usize,
    ref_list_entry_counts: Vec<usize>,
    use_eight_orientations_flag: bool,
    normal_axis_limits_quantization_enabled_flag: bool,
    normal_axis_max_delta_value_enabled_flag: bool,
}

#[derive(Debug, Clone, Default)]
struct PatchFrameParameterSet {
    psps_id: u32,
    local_override_geometry_patch_enabled_flag: bool,
    local_override_attribute_patch_enabled: Vec<bool>,
    additional_lt_pfoc_lsb_len: u32,
    projection_45degree_enabled_flag: bool,
    signalled_tile_group_id_length_minus1: u32,
}

#[derive(Debug, Clone, Default)]
struct PatchFrameGeometryParameterSet {
    patch_scale_enabled_flag: bool,
    patch_offset_enabled_flag: bool,
    patch_rotation_enabled_flag: bool,
    patch_point_size_enabled_flag: bool,
    patch_point_shape_enabled_flag: bool,
}

#[derive(Debug, Clone, Default)]
struct PatchFrameAttributeParameterSet {
    patch_scale_enabled_flag: bool,
    patch_offset_enabled_flag: bool,
}

/// The draft-6 patch tile group header. P-frames inherit unsignalled bit
/// counts from the previous header.
#[derive(Debug, Clone, Default)]
struct PatchTileGroupHeader {
    pfps_id: u32,
    frame_type: PatchFrameType,
    shift_u_bit_count_minus1: u8,
    shift_v_bit_count_minus1: u8,
    delta_size_d_bit_count_minus1: u8,
    shift_tangent_bit_count_minus1: u8,
    shift_bitangent_bit_count_minus1: u8,
    shift_normal_bit_count_minus1: u8,
    lod_bit_count: u8,
    pcm_3d_shift_bit_count_minus1: u8,
}

#[derive(Debug, Clone, Default)]
struct PatchDataUnit {
    shift_u: u32,
    shift_v: u32,
    delta_size_u: i32,
    delta_size_v: i32,
    shift_tangent_axis: u32,
    shift_bitangent_axis: u32,
    shift_min_normal_axis: u32,
    shift_delta_max_normal_axis: u32,
    projection_plane: u8,
    orientation_index: u8,
    projection_45degree_present_flag: bool,
    projection_45degree_rotation_axis: u8,
}

#[derive(Debug, Clone, Default)]
struct DeltaPatchDataUnit {
    delta_patch_index: i32,
    delta_shift_u: i32,
    delta_shift_v: i32,
    delta_size_u: i32,
    delta_size_v: i32,
    delta_shift_tangent_axis: i32,
    delta_shift_bitangent_axis: i32,
    delta_shift_min_normal_axis: i32,
    shift_delta_max_normal_axis: i32,
}

#[derive(Debug, Clone, Default)]
struct PcmPatchDataUnit {
    shift_u: u32,
    shift_v: u32,
    delta_size_u: i32,
    delta_size_v: i32,
    shift_tangent_axis: u32,
    shift_bitangent_axis: u32,
    shift_normal_axis: u32,
    pcm_points: u32,
}

#[derive(Debug, Clone)]
enum PatchInformationData {
    Intra(PatchDataUnit),
    Inter(DeltaPatchDataUnit),
    Pcm(PcmPatchDataUnit),
}

#[derive(Debug, Clone, Default)]
struct PatchTileGroupLayer {
    header: PatchTileGroupHeader,
    patches: Vec<PatchInformationData>,
}

#[derive(Debug, Default)]
struct PatchDataGroup {
    psps_set: Vec<Option<PatchSequenceParameterSet>>,
    pfps_set: Vec<Option<PatchFrameParameterSet>>,
    pfgps_set: Vec<Option<PatchFrameGeometryParameterSet>>,
    pfaps_set: Vec<Option<PatchFrameAttributeParameterSet>>,
    tile_group_layers: Vec<PatchTileGroupLayer>,
}

impl PatchDataGroup {
    fn new() -> Self {
        Self {
            psps_set: vec![None; 16],
            pfps_set: vec![None; 64],
            pfgps_set: vec![None; 64],
            pfaps_set: vec![None; 64],
            tile_group_layers: Vec::new(),
        }
    }

    fn psps(&self, id: usize) -> Result<&PatchSequenceParameterSet> {
        self.psps_set
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(Error::MissingAtlasParameterSet { kind: "PSPS", id })
    }

    fn pfps(&self, id: usize) -> Result<&PatchFrameParameterSet> {
        self.pfps_set
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(Error::MissingAtlasParameterSet { kind: "PFPS", id })
    }
}

#[derive(Debug, Default)]
struct ParserContext {
    sps: SequenceParameterSet,
    pdg: PatchDataGroup,
    layer_index: u8,
    previous_patch_size_u: i64,
    previous_patch_size_v: i64,
}

/// Parses a whole draft-6 container.
pub fn parse_frame_groups(data: &[u8]) -> Result<Vec<FrameGroup>> {
    let mut reader = BitReader::new(data);
    ContainerHeader::parse(&mut reader, ContainerVersion::Draft6)?;

    let mut frame_groups = Vec::new();

    while reader.bytes_available() > 0 {
        let group = parse_frame_group(&mut reader)?;
        frame_groups.push(group);
    }

    crate::parser::assign_presentation_timestamps(&mut frame_groups);
    crate::parser::verify_frame_dimensions(&frame_groups)?;

    info!(
        frame_groups = frame_groups.len(),
        "parsed draft-6 V-PCC container"
    );

    Ok(frame_groups)
}

/// Parses the container header and the first frame group only.
pub fn parse_first_frame_group(data: &[u8]) -> Result<FrameGroup> {
    let mut reader = BitReader::new(data);
    ContainerHeader::parse(&mut reader, ContainerVersion::Draft6)?;

    let mut frame_groups = vec![parse_frame_group(&mut reader)?];
    crate::parser::assign_presentation_timestamps(&mut frame_groups);

    Ok(frame_groups.pop().expect("one group was just pushed"))
}

/// One frame group is exactly five units: SPS, PDG, OVD, GVD, AVD.
fn parse_frame_group(reader: &mut BitReader<'_>) -> Result<FrameGroup> {
    let mut context = ParserContext::default();
    let mut group = FrameGroup::default();

    for expected in [
        unit_type::SPS,
        unit_type::PDG,
        unit_type::OVD,
        unit_type::GVD,
        unit_type::AVD,
    ] {
        let unit = parse_unit_header(reader, &mut context)?;

        if unit != expected {
            return Err(Error::MissingUnit(match expected {
                unit_type::SPS => "SPS",
                unit_type::PDG => "PDG",
                unit_type::OVD => "OVD",
                unit_type::GVD => "GVD",
                _ => "AVD",
            }));
        }

        parse_unit_payload(reader, &mut context, &mut group, unit)?;
    }

    group.frame_width = context.sps.frame_width;
    group.frame_height = context.sps.frame_height;

    finalize_frame_group(&mut group, &context)?;

    Ok(group)
}

fn parse_unit_header(reader: &mut BitReader<'_>, context: &mut ParserContext) -> Result<u8> {
    let unit = reader.read_bits(5)? as u8;

    if matches!(
        unit,
        unit_type::AVD | unit_type::GVD | unit_type::OVD | unit_type::PDG
    ) {
        reader.read_bits(4)?; // sequence_parameter_set_id
    }

    match unit {
        unit_type::AVD => {
            reader.read_bits(7)?; // attribute_index
            reader.read_bits(7)?; // attribute_dimension_index

            if context.sps.multiple_layer_streams_present_flag {
                context.layer_index = reader.read_bits(4)? as u8;
                parse_pcm_separate_video_data(reader, context, 4)?;
            } else {
                parse_pcm_separate_video_data(reader, context, 8)?;
            }
        }
        unit_type::GVD => {
            if context.sps.multiple_layer_streams_present_flag {
                context.layer_index = reader.read_bits(4)? as u8;
                parse_pcm_separate_video_data(reader, context, 18)?;
            } else {
                parse_pcm_separate_video_data(reader, context, 22)?;
            }
        }
        unit_type::OVD | unit_type::PDG => {
            reader.read_bits(23)?;
        }
        _ => {
            reader.read_bits(27)?;
        }
    }

    Ok(unit)
}

fn parse_pcm_separate_video_data(
    reader: &mut BitReader<'_>,
    context: &mut ParserContext,
    bit_count: usize,
) -> Result<()> {
    if context.sps.pcm_separate_video_present_flag && context.layer_index == 0 {
        reader.read_bit()?; // pcm_video_flag
        reader.read_bits(bit_count)?;
    } else {
        reader.read_bits(bit_count + 1)?;
    }

    Ok(())
}

fn parse_unit_payload(
    reader: &mut BitReader<'_>,
    context: &mut ParserContext,
    group: &mut FrameGroup,
    unit: u8,
) -> Result<()> {
    match unit {
        unit_type::SPS => parse_sequence_parameter_set(reader, context),
        unit_type::PDG => parse_patch_data_group(reader, context),
        unit_type::OVD => {
            parse_video_bitstream(reader, group, VideoType::Occupancy)
        }
        unit_type::GVD => {
            let index = if context.sps.layer_count_minus1 > 0 { 1 } else { 0 };

            let absolute = context
                .sps
                .layer_absolute_coding_enabled
                .get(index)
                .copied()
                .unwrap_or(true);

            if !absolute {
                parse_video_bitstream(reader, group, VideoType::GeometryD0)?;
                parse_video_bitstream(reader, group, VideoType::GeometryD1)?;
            } else {
                parse_video_bitstream(reader, group, VideoType::Geometry)?;
            }

            if context.sps.pcm_patch_enabled_flag && context.sps.pcm_separate_video_present_flag {
                parse_video_bitstream(reader, group, VideoType::GeometryRaw)?;
            }

            Ok(())
        }
        unit_type::AVD => {
            if context.sps.attribute_count > 0 {
                parse_video_bitstream(reader, group, VideoType::Texture)?;

                if context.sps.pcm_patch_enabled_flag
                    && context.sps.pcm_separate_video_present_flag
                {
                    parse_video_bitstream(reader, group, VideoType::TextureRaw)?;
                }
            }

            Ok(())
        }
        other => {
            warn!(unit_type = other, "skipping unknown draft-6 V-PCC unit");
            Ok(())
        }
    }
}

fn parse_video_bitstream(
    reader: &mut BitReader<'_>,
    group: &mut FrameGroup,
    video_type: VideoType,
) -> Result<()> {
    let size = reader.read_bits(32)? as usize;
    let payload = reader.read_slice(size)?;

    debug!(video_type = video_type.name(), bytes = size, "read video substream");

    group.stream_mut(video_type).buffer.extend_from_slice(payload);

    Ok(())
}

fn parse_sequence_parameter_set(
    reader: &mut BitReader<'_>,
    context: &mut ParserContext,
) -> Result<()> {
    let sps = &mut context.sps;

    // Profile/tier/level: tier, codec group, toolset, reconstruction,
    // reserved, level.
    reader.read_bits(1)?;
    reader.read_bits(7)?;
    reader.read_bits(8)?;
    reader.read_bits(8)?;
    reader.read_bits(32)?;
    reader.read_bits(8)?;

    reader.read_bits(4)?; // sequence_parameter_set_id
    sps.frame_width = reader.read_bits(16)? as u16;
    sps.frame_height = reader.read_bits(16)? as u16;

    if reader.read_bit()? {
        reader.read_bits(16)?; // avg_frame_rate
    }

    reader.read_bit()?; // enhanced_occupancy_map_for_depth_flag
    sps.layer_count_minus1 = reader.read_bits(4)? as u8;

    sps.layer_absolute_coding_enabled = vec![true; sps.layer_count_minus1 as usize + 1];

    if sps.layer_count_minus1 > 0 {
        sps.multiple_layer_streams_present_flag = reader.read_bit()?;
    } else {
        sps.layer_absolute_coding_enabled[0] = reader.read_bit()?;
    }

    for i in 0..sps.layer_count_minus1 as usize {
        let absolute = reader.read_bit()?;
        sps.layer_absolute_coding_enabled[i + 1] = absolute;

        if !absolute && i > 0 {
            reader.read_uvlc()?; // layer_predictor_index_diff
        }
    }

    sps.pcm_patch_enabled_flag = reader.read_bit()?;

    if sps.pcm_patch_enabled_flag {
        sps.pcm_separate_video_present_flag = reader.read_bit()?;
    }

    // Occupancy information.
    reader.read_bits(8)?;
    reader.read_bits(8)?;

    // Geometry information.
    reader.read_bits(8)?; // codec id
    sps.geometry_nominal_2d_bitdepth_minus1 = reader.read_bits(5)? as u8;
    sps.geometry_3d_coordinates_bitdepth_minus1 = reader.read_bits(5)? as u8;

    if sps.pcm_separate_video_present_flag {
        reader.read_bits(8)?; // pcm geometry codec id
    }

    sps.geometry_params_enabled_flag = reader.read_bit()?;
    sps.geometry_patch_params_enabled_flag = reader.read_bit()?;

    // Attribute information.
    sps.attribute_count = reader.read_bits(7)? as usize;

    for _ in 0..sps.attribute_count {
        reader.read_bits(4)?; // type id
        reader.read_bits(8)?; // codec id

        if sps.pcm_separate_video_present_flag {
            reader.read_bits(8)?; // pcm codec id
        }

        let dimension_minus1 = reader.read_bits(8)? as u8;
        sps.attribute_dimension_minus1.push(dimension_minus1);

        if dimension_minus1 > 0 {
            let partitions = reader.read_bits(7)? as usize;

            let mut remaining = i32::from(dimension_minus1);

            for j in 0..partitions {
                let channels = if (partitions - j) as i32 == remaining {
                    0
                } else {
                    reader.read_uvlc()?
                };

                remaining -= channels as i32 + 1;
            }
        }

        reader.read_bits(5)?; // nominal 2d bitdepth minus 1
    }

    if sps.attribute_count > 0 {
        sps.attribute_params_enabled_flag = reader.read_bit()?;
        sps.attribute_patch_params_enabled_flag = reader.read_bit()?;
        reader.read_bit()?; // msb align flag
    }

    reader.read_bit()?; // patch_inter_prediction_enabled_flag
    reader.read_bit()?; // pixel_deinterleaving_flag
    sps.point_local_reconstruction_enabled_flag = reader.read_bit()?;

    if sps.point_local_reconstruction_enabled_flag {
        sps.plr_number_of_modes_minus1 = reader.read_bits(4)? as u8;

        for _ in 0..=sps.plr_number_of_modes_minus1 {
            reader.read_bit()?; // interpolate flag
            reader.read_bit()?; // filling flag
            reader.read_bits(2)?; // minimum depth
            reader.read_bits(2)?; // neighbour minus 1
        }

        sps.plr_block_threshold_per_patch_minus1 = reader.read_uvlc()?;
    }

    reader.read_bit()?; // remove_duplicate_point_enabled_flag
    sps.projection_45degree_enabled_flag = reader.read_bit()?;
    sps.patch_precedence_order_flag = reader.read_bit()?;

    // Encoder trailer outside the draft syntax.
    reader.read_bit()?; // lossless_geo_444
    reader.read_bit()?; // lossless_geo
    reader.read_bit()?; // lossless_texture
    sps.min_level = reader.read_bits(8)? as u8;
    reader.read_bits(8)?; // surface_thickness

    byte_alignment(reader)?;

    Ok(())
}

fn parse_patch_data_group(reader: &mut BitReader<'_>, context: &mut ParserContext) -> Result<()> {
    loop {
        let unit = reader.read_uvlc()?;

        match unit {
            pdg_unit_type::PSPS => parse_patch_sequence_parameter_set(reader, context)?,
            pdg_unit_type::PFPS => parse_patch_frame_parameter_set(reader, context)?,
            pdg_unit_type::PFGPS => parse_patch_frame_geometry_parameter_set(reader, context)?,
            pdg_unit_type::PFAPS => parse_patch_frame_attribute_parameter_set(reader, context)?,
            pdg_unit_type::GPPS => parse_geometry_patch_parameter_set(reader, context)?,
            pdg_unit_type::APPS => parse_attribute_patch_parameter_set(reader, context)?,
            pdg_unit_type::PTGLU => parse_patch_tile_group_layer_unit(reader, context)?,
            pdg_unit_type::PREFIX_SEI | pdg_unit_type::SUFFIX_SEI => {
                // Draft 6 defines no SEI payload syntax.
            }
            other => {
                warn!(unit_type = other, "skipping reserved PDG unit");
            }
        }

        // One-bit continuation: 0 keeps reading units, 1 terminates.
        if reader.read_bit()? {
            break;
        }
    }

    byte_alignment(reader)?;

    Ok(())
}

fn parse_ref_list_struct(
    reader: &mut BitReader<'_>,
    psps_long_term: bool,
    log2_max_pfoc: u32,
) -> Result<usize> {
    let num_ref_entries = reader.read_uvlc()? as usize;

    for _ in 0..num_ref_entries {
        if psps_long_term {
            let st_ref = reader.read_bit()?;

            if st_ref {
                let abs_delta = reader.read_uvlc()?;

                if abs_delta > 0 {
                    reader.read_bit()?; // sign
                } else {
                    reader.read_bits(log2_max_pfoc as usize + 4)?;
                }
            }
        }
    }

    Ok(num_ref_entries)
}

fn parse_patch_sequence_parameter_set(
    reader: &mut BitReader<'_>,
    context: &mut ParserContext,
) -> Result<()> {
    let index = reader.read_uvlc()? as usize;

    let mut psps = PatchSequenceParameterSet::default();
    psps.log2_patch_packing_block_size = reader.read_bits(3)? as u8;
    psps.log2_max_patch_frame_order_cnt_lsb = reader.read_uvlc()?;
    reader.read_uvlc()?; // max_dec_patch_frame_buffering_minus1
    psps.long_term_ref_patch_frames_flag = reader.read_bit()?;
    psps.num_ref_patch_frame_lists = reader.read_uvlc()? as usize;

    for _ in 0..psps.num_ref_patch_frame_lists {
        let entries = parse_ref_list_struct(
            reader,
            psps.long_term_ref_patch_frames_flag,
            psps.log2_max_patch_frame_order_cnt_lsb,
        )?;
        psps.ref_list_entry_counts.push(entries);
    }

    psps.use_eight_orientations_flag = reader.read_bit()?;
    psps.normal_axis_limits_quantization_enabled_flag = reader.read_bit()?;
    psps.normal_axis_max_delta_value_enabled_flag = reader.read_bit()?;

    if index < context.pdg.psps_set.len() {
        context.pdg.psps_set[index] = Some(psps);
    }

    Ok(())
}

fn parse_patch_frame_parameter_set(
    reader: &mut BitReader<'_>,
    context: &mut ParserContext,
) -> Result<()> {
    let pfps_index = reader.read_uvlc()? as usize;
    let psps_index = reader.read_uvlc()?;
    reader.read_uvlc()?; // geometry patch frame parameter set id

    let mut pfps = PatchFrameParameterSet {
        psps_id: psps_index,
        ..Default::default()
    };

    for _ in 0..context.sps.attribute_count {
        reader.read_uvlc()?; // attribute patch frame parameter set id
    }

    parse_patch_frame_tile_information(reader, &mut pfps)?;

    pfps.local_override_geometry_patch_enabled_flag = reader.read_bit()?;

    for _ in 0..context.sps.attribute_count {
        pfps.local_override_attribute_patch_enabled.push(reader.read_bit()?);
    }

    pfps.additional_lt_pfoc_lsb_len = reader.read_uvlc()?;

    if context.sps.projection_45degree_enabled_flag {
        pfps.projection_45degree_enabled_flag = reader.read_bit()?;
    }

    byte_alignment(reader)?;

    if pfps_index < context.pdg.pfps_set.len() {
        context.pdg.pfps_set[pfps_index] = Some(pfps);
    }

    Ok(())
}

fn parse_patch_frame_tile_information(
    reader: &mut BitReader<'_>,
    pfps: &mut PatchFrameParameterSet,
) -> Result<()> {
    let single_tile = reader.read_bit()?;

    let mut num_tile_columns_minus1 = 0u32;
    let mut num_tile_rows_minus1 = 0u32;

    if !single_tile {
        let uniform = reader.read_bit()?;

        if uniform {
            reader.read_uvlc()?;
            reader.read_uvlc()?;
        } else {
            num_tile_columns_minus1 = reader.read_uvlc()?;
            num_tile_rows_minus1 = reader.read_uvlc()?;

            for _ in 0..num_tile_columns_minus1 {
                reader.read_uvlc()?;
            }

            for _ in 0..num_tile_rows_minus1 {
                reader.read_uvlc()?;
            }
        }
    }

    let single_tile_per_group = reader.read_bit()?;

    if !single_tile_per_group {
        let num_tiles = (num_tile_columns_minus1 + 1) * (num_tile_rows_minus1 + 1);
        let num_groups_minus1 = reader.read_uvlc()?;

        let mut top_left = 0u32;

        for i in 0..=num_groups_minus1 {
            if i > 0 {
                let bits = fixed_length_code_bits_count(num_tiles + 1) as usize;
                top_left = reader.read_bits(bits)?;
            }

            let bits = fixed_length_code_bits_count(num_tiles - top_left + 1) as usize;
            reader.read_bits(bits)?;
        }
    }

    if reader.read_bit()? {
        pfps.signalled_tile_group_id_length_minus1 = reader.read_uvlc()?;

        for _ in 0..=pfps.signalled_tile_group_id_length_minus1 {
            reader.read_bits(pfps.signalled_tile_group_id_length_minus1 as usize + 1)?;
        }
    }

    Ok(())
}

fn parse_geometry_frame_params(reader: &mut BitReader<'_>) -> Result<()> {
    let smoothing_present = reader.read_bit()?;
    let scale_present = reader.read_bit()?;
    let offset_present = reader.read_bit()?;
    let rotation_present = reader.read_bit()?;
    let point_size_present = reader.read_bit()?;
    let point_shape_present = reader.read_bit()?;

    if smoothing_present {
        let enabled = reader.read_bit()?;

        if enabled {
            reader.read_bits(7)?;
            reader.read_bits(8)?;
        }
    }

    if scale_present {
        for _ in 0..3 {
            reader.read_bits(32)?;
        }
    }

    if offset_present {
        for _ in 0..3 {
            reader.read_bits(32)?;
        }
    }

    if rotation_present {
        for _ in 0..4 {
            reader.read_bits(32)?;
        }
    }

    if point_size_present {
        reader.read_bits(16)?;
    }

    if point_shape_present {
        reader.read_bits(4)?;
    }

    Ok(())
}

fn parse_patch_frame_geometry_parameter_set(
    reader: &mut BitReader<'_>,
    context: &mut ParserContext,
) -> Result<()> {
    let pfgps_index = reader.read_uvlc()? as usize;
    reader.read_uvlc()?; // patch sequence parameter set id

    let mut pfgps = PatchFrameGeometryParameterSet::default();

    if context.sps.geometry_params_enabled_flag {
        parse_geometry_frame_params(reader)?;
    }

    if context.sps.geometry_patch_params_enabled_flag {
        pfgps.patch_scale_enabled_flag = reader.read_bit()?;
        pfgps.patch_offset_enabled_flag = reader.read_bit()?;
        pfgps.patch_rotation_enabled_flag = reader.read_bit()?;
        pfgps.patch_point_size_enabled_flag = reader.read_bit()?;
        pfgps.patch_point_shape_enabled_flag = reader.read_bit()?;
    }

    byte_alignment(reader)?;

    if pfgps_index < context.pdg.pfgps_set.len() {
        context.pdg.pfgps_set[pfgps_index] = Some(pfgps);
    }

    Ok(())
}

fn parse_attribute_frame_params(reader: &mut BitReader<'_>, dimension: usize) -> Result<()> {
    let mut smoothing_present = vec![false; dimension];

    for flag in smoothing_present.iter_mut() {
        *flag = reader.read_bit()?;
    }

    let scale_present = reader.read_bit()?;
    let offset_present = reader.read_bit()?;

    for &present in &smoothing_present {
        if present {
            reader.read_bits(8)?;
            reader.read_bits(8)?;
            reader.read_bits(3)?;
            reader.read_bits(8)?;
            reader.read_bits(8)?;
        }
    }

    if scale_present {
        for _ in 0..dimension {
            reader.read_bits(32)?;
        }
    }

    if offset_present {
        for _ in 0..dimension {
            reader.read_bits(32)?;
        }
    }

    Ok(())
}

fn parse_patch_frame_attribute_parameter_set(
    reader: &mut BitReader<'_>,
    context: &mut ParserContext,
) -> Result<()> {
    let pfaps_index = reader.read_uvlc()? as usize;
    reader.read_uvlc()?; // patch sequence parameter set id

    let dimension = context
        .sps
        .attribute_dimension_minus1
        .get(pfaps_index)
        .or(context.sps.attribute_dimension_minus1.first())
        .map(|d| usize::from(*d) + 1)
        .unwrap_or(4);

    let mut pfaps = PatchFrameAttributeParameterSet::default();

    if context.sps.attribute_params_enabled_flag {
        parse_attribute_frame_params(reader, dimension)?;
    }

    if context.sps.attribute_patch_params_enabled_flag {
        pfaps.patch_scale_enabled_flag = reader.read_bit()?;
        pfaps.patch_offset_enabled_flag = reader.read_bit()?;
    }

    byte_alignment(reader)?;

    if pfaps_index < context.pdg.pfaps_set.len() {
        context.pdg.pfaps_set[pfaps_index] = Some(pfaps);
    }

    Ok(())
}

fn parse_geometry_patch_parameter_set(
    reader: &mut BitReader<'_>,
    context: &mut ParserContext,
) -> Result<()> {
    reader.read_uvlc()?; // geometry patch parameter set id
    let pfgps_index = reader.read_uvlc()? as usize;

    let pfgps = context
        .pdg
        .pfgps_set
        .get(pfgps_index)
        .and_then(Option::as_ref)
        .cloned()
        .unwrap_or_default();

    if pfgps.patch_scale_enabled_flag
        || pfgps.patch_offset_enabled_flag
        || pfgps.patch_rotation_enabled_flag
        || pfgps.patch_point_size_enabled_flag
        || pfgps.patch_point_shape_enabled_flag
    {
        let params_present = reader.read_bit()?;

        if params_present {
            if pfgps.patch_scale_enabled_flag && reader.read_bit()? {
                for _ in 0..3 {
                    reader.read_bits(32)?;
                }
            }

            if pfgps.patch_offset_enabled_flag && reader.read_bit()? {
                for _ in 0..3 {
                    reader.read_bits(32)?;
                }
            }

            if pfgps.patch_rotation_enabled_flag && reader.read_bit()? {
                for _ in 0..4 {
                    reader.read_bits(32)?;
                }
            }

            if pfgps.patch_point_size_enabled_flag && reader.read_bit()? {
                reader.read_bits(16)?;
            }

            if pfgps.patch_point_shape_enabled_flag && reader.read_bit()? {
                reader.read_bits(4)?;
            }
        }
    }

    byte_alignment(reader)?;

    Ok(())
}

fn parse_attribute_patch_parameter_set(
    reader: &mut BitReader<'_>,
    context: &mut ParserContext,
) -> Result<()> {
    reader.read_uvlc()?; // attribute patch parameter set id
    let pfaps_index = reader.read_uvlc()? as usize;
    let dimension_minus1 = reader.read_bits(8)? as usize;

    let pfaps = context
        .pdg
        .pfaps_set
        .get(pfaps_index)
        .and_then(Option::as_ref)
        .cloned()
        .unwrap_or_default();

    if pfaps.patch_scale_enabled_flag || pfaps.patch_offset_enabled_flag {
        let params_present = reader.read_bit()?;

        if params_present {
            let dimension = dimension_minus1 + 1;

            if pfaps.patch_scale_enabled_flag && reader.read_bit()? {
                for _ in 0..dimension {
                    reader.read_bits(32)?;
                }
            }

            if pfaps.patch_offset_enabled_flag && reader.read_bit()? {
                for _ in 0..dimension {
                    reader.read_bits(32)?;
                }
            }
        }
    }

    byte_alignment(reader)?;

    Ok(())
}

fn parse_patch_tile_group_header(
    reader: &mut BitReader<'_>,
    context: &ParserContext,
    previous: &PatchTileGroupHeader,
) -> Result<PatchTileGroupHeader> {
    let mut ptgh = PatchTileGroupHeader::default();

    ptgh.pfps_id = reader.read_uvlc()?;

    let pfps = context.pdg.pfps(ptgh.pfps_id as usize)?;
    let psps = context.pdg.psps(pfps.psps_id as usize)?;

    reader.read_bits(pfps.signalled_tile_group_id_length_minus1 as usize + 1)?; // address

    ptgh.frame_type = match reader.read_uvlc()? {
        0 => PatchFrameType::I,
        _ => PatchFrameType::P,
    };

    reader.read_bits(psps.log2_max_patch_frame_order_cnt_lsb as usize + 4)?; // order count lsb

    let mut ref_list_entries = psps.ref_list_entry_counts.first().copied().unwrap_or(0);
    let mut ref_list_sps_flag = false;

    if psps.num_ref_patch_frame_lists > 0 {
        ref_list_sps_flag = reader.read_bit()?;
    }

    if ref_list_sps_flag {
        if psps.num_ref_patch_frame_lists > 1 {
            let bits = fixed_length_code_bits_count(psps.num_ref_patch_frame_lists as u32 + 1);
            let idx = reader.read_bits(bits as usize)? as usize;
            ref_list_entries = psps.ref_list_entry_counts.get(idx).copied().unwrap_or(0);
        }
    } else {
        ref_list_entries = parse_ref_list_struct(
            reader,
            psps.long_term_ref_patch_frames_flag,
            psps.log2_max_patch_frame_order_cnt_lsb,
        )?;
    }

    // Long-term entries would add per-entry AFOC LSBs here; the draft-6
    // encoder emits short-term entries only, which read nothing above.

    if psps.normal_axis_limits_quantization_enabled_flag {
        reader.read_bits(5)?; // normal_axis_min_value_quantizer

        if psps.normal_axis_max_delta_value_enabled_flag {
            reader.read_bits(5)?; // normal_axis_max_delta_value_quantizer
        }
    }

    let max_bit_count = context.sps.geometry_3d_coordinates_bitdepth_minus1;
    ptgh.shift_normal_bit_count_minus1 = max_bit_count;

    ptgh.delta_size_d_bit_count_minus1 = if pfps.projection_45degree_enabled_flag {
        max_bit_count + 1
    } else {
        max_bit_count
    };

    if ptgh.frame_type == PatchFrameType::P && ref_list_entries > 1 {
        let override_flag = reader.read_bit()?;

        if override_flag {
            reader.read_uvlc()?; // num_ref_idx_active_minus1
        }
    }

    if ptgh.frame_type == PatchFrameType::I {
        ptgh.shift_u_bit_count_minus1 = reader.read_bits(8)? as u8;
        ptgh.shift_v_bit_count_minus1 = reader.read_bits(8)? as u8;
        ptgh.shift_tangent_bit_count_minus1 = reader.read_bits(8)? as u8;
        ptgh.shift_bitangent_bit_count_minus1 = reader.read_bits(8)? as u8;
        ptgh.lod_bit_count = reader.read_bits(8)? as u8;
    } else {
        ptgh.shift_u_bit_count_minus1 = previous.shift_u_bit_count_minus1;
        ptgh.shift_v_bit_count_minus1 = previous.shift_v_bit_count_minus1;
        ptgh.shift_tangent_bit_count_minus1 = previous.shift_tangent_bit_count_minus1;
        ptgh.shift_bitangent_bit_count_minus1 = previous.shift_bitangent_bit_count_minus1;
        ptgh.lod_bit_count = previous.lod_bit_count;

        let bit_count_flag = reader.read_bit()?;

        if bit_count_flag {
            if reader.read_bit()? {
                ptgh.shift_u_bit_count_minus1 = reader.read_bits(8)? as u8;
            }

            if reader.read_bit()? {
                ptgh.shift_v_bit_count_minus1 = reader.read_bits(8)? as u8;
            }

            if reader.read_bit()? {
                ptgh.shift_tangent_bit_count_minus1 = reader.read_bits(8)? as u8;
            }

            if reader.read_bit()? {
                ptgh.shift_bitangent_bit_count_minus1 = reader.read_bits(8)? as u8;
            }

            if reader.read_bit()? {
                ptgh.lod_bit_count = reader.read_bits(8)? as u8 + 1;
            }
        }
    }

    if context.sps.pcm_patch_enabled_flag {
        let present = reader.read_bit()?;

        if present {
            let bits = context.sps.geometry_3d_coordinates_bitdepth_minus1 as usize + 1;
            ptgh.pcm_3d_shift_bit_count_minus1 = reader.read_bits(bits)? as u8;
        }
    } else {
        let bit_count = context.sps.geometry_3d_coordinates_bitdepth_minus1
            - context.sps.geometry_nominal_2d_bitdepth_minus1;
        ptgh.pcm_3d_shift_bit_count_minus1 = bit_count.saturating_sub(1);
    }

    byte_alignment(reader)?;

    Ok(ptgh)
}

fn parse_point_local_reconstruction_data(
    reader: &mut BitReader<'_>,
    context: &ParserContext,
    block_count: usize,
) -> Result<()> {
    let mode_bits =
        fixed_length_code_bits_count(u32::from(context.sps.plr_number_of_modes_minus1)) as usize;

    let level_flag = if block_count > context.sps.plr_block_threshold_per_patch_minus1 as usize + 1
    {
        reader.read_bit()?
    } else {
        true
    };

    if level_flag {
        let present = reader.read_bit()?;

        if present {
            reader.read_bits(mode_bits)?;
        }
    } else {
        for _ in 0..block_count {
            let present = reader.read_bit()?;

            if present {
                reader.read_bits(mode_bits)?;
            }
        }
    }

    Ok(())
}

/// Intra patches may locally override the geometry and attribute patch
/// parameter sets; the flags precede the patch data unit.
fn parse_local_override_flags(
    reader: &mut BitReader<'_>,
    context: &ParserContext,
    ptgh: &PatchTileGroupHeader,
) -> Result<()> {
    let pfps = context.pdg.pfps(ptgh.pfps_id as usize)?;

    if pfps.local_override_geometry_patch_enabled_flag {
        let override_geometry = reader.read_bit()?;

        if override_geometry {
            reader.read_uvlc()?; // geometry patch parameter set id
        }
    }

    for attribute in 0..context.sps.attribute_count {
        let enabled = pfps
            .local_override_attribute_patch_enabled
            .get(attribute)
            .copied()
            .unwrap_or(false);

        if enabled {
            let override_attribute = reader.read_bit()?;

            if override_attribute {
                reader.read_uvlc()?; // attribute patch parameter set id
            }
        }
    }

    Ok(())
}

fn parse_patch_data_unit(
    reader: &mut BitReader<'_>,
    context: &mut ParserContext,
    ptgh: &PatchTileGroupHeader,
) -> Result<PatchDataUnit> {
    let pfps = context.pdg.pfps(ptgh.pfps_id as usize)?;
    let psps = context.pdg.psps(pfps.psps_id as usize)?;

    let use_eight_orientations = psps.use_eight_orientations_flag;
    let normal_axis_max_delta = psps.normal_axis_max_delta_value_enabled_flag;
    let projection_45degree = pfps.projection_45degree_enabled_flag;

    let mut pdu = PatchDataUnit::default();

    pdu.shift_u = reader.read_bits(ptgh.shift_u_bit_count_minus1 as usize + 1)?;
    pdu.shift_v = reader.read_bits(ptgh.shift_v_bit_count_minus1 as usize + 1)?;

    pdu.delta_size_u = reader.read_svlc()?;
    pdu.delta_size_v = reader.read_svlc()?;

    pdu.shift_tangent_axis = reader.read_bits(ptgh.shift_tangent_bit_count_minus1 as usize + 1)?;
    pdu.shift_bitangent_axis =
        reader.read_bits(ptgh.shift_bitangent_bit_count_minus1 as usize + 1)?;
    pdu.shift_min_normal_axis =
        reader.read_bits(ptgh.shift_normal_bit_count_minus1 as usize + 1)?;

    if normal_axis_max_delta {
        pdu.shift_delta_max_normal_axis =
            reader.read_bits(ptgh.delta_size_d_bit_count_minus1 as usize + 1)?;
    }

    pdu.projection_plane = reader.read_bits(3)? as u8;

    pdu.orientation_index = reader.read_bits(if use_eight_orientations { 3 } else { 1 })? as u8;

    if ptgh.lod_bit_count > 0 {
        reader.read_bits(ptgh.lod_bit_count as usize)?; // level of detail
    }

    if projection_45degree {
        pdu.projection_45degree_present_flag = reader.read_bit()?;
    }

    if pdu.projection_45degree_present_flag {
        pdu.projection_45degree_rotation_axis = reader.read_bits(2)? as u8;
    }

    if context.sps.point_local_reconstruction_enabled_flag {
        let width = (context.previous_patch_size_u + i64::from(pdu.delta_size_u)).max(0) as usize;
        let height = (context.previous_patch_size_v + i64::from(pdu.delta_size_v)).max(0) as usize;

        parse_point_local_reconstruction_data(reader, context, width * height)?;

        context.previous_patch_size_u += i64::from(pdu.delta_size_u);
        context.previous_patch_size_v += i64::from(pdu.delta_size_v);
    }

    Ok(pdu)
}

fn parse_delta_patch_data_unit(
    reader: &mut BitReader<'_>,
    context: &mut ParserContext,
    ptgh: &PatchTileGroupHeader,
) -> Result<DeltaPatchDataUnit> {
    let pfps = context.pdg.pfps(ptgh.pfps_id as usize)?;
    let psps = context.pdg.psps(pfps.psps_id as usize)?;
    let normal_axis_max_delta = psps.normal_axis_max_delta_value_enabled_flag;

    let mut dpdu = DeltaPatchDataUnit::default();

    dpdu.delta_patch_index = reader.read_svlc()?;
    dpdu.delta_shift_u = reader.read_svlc()?;
    dpdu.delta_shift_v = reader.read_svlc()?;
    dpdu.delta_size_u = reader.read_svlc()?;
    dpdu.delta_size_v = reader.read_svlc()?;
    dpdu.delta_shift_tangent_axis = reader.read_svlc()?;
    dpdu.delta_shift_bitangent_axis = reader.read_svlc()?;
    dpdu.delta_shift_min_normal_axis = reader.read_svlc()?;

    if normal_axis_max_delta {
        dpdu.shift_delta_max_normal_axis = reader.read_svlc()?;
    }

    if context.sps.point_local_reconstruction_enabled_flag {
        let mut width = i64::from(dpdu.delta_size_u);
        let mut height = i64::from(dpdu.delta_size_v);

        // The referenced patch of the previous frame contributes its own
        // reconstruction map dimensions; this parser tracks them through
        // the running size registers.
        width += context.previous_patch_size_u;
        height += context.previous_patch_size_v;

        parse_point_local_reconstruction_data(
            reader,
            context,
            (width.max(0) * height.max(0)) as usize,
        )?;

        context.previous_patch_size_u = width;
        context.previous_patch_size_v = height;
    }

    Ok(dpdu)
}

fn parse_pcm_patch_data_unit(
    reader: &mut BitReader<'_>,
    context: &ParserContext,
    ptgh: &PatchTileGroupHeader,
) -> Result<PcmPatchDataUnit> {
    let mut ppdu = PcmPatchDataUnit::default();

    if context.sps.pcm_separate_video_present_flag {
        reader.read_bit()?; // patch_in_pcm_video_flag
    }

    ppdu.shift_u = reader.read_bits(ptgh.shift_u_bit_count_minus1 as usize + 1)?;
    ppdu.shift_v = reader.read_bits(ptgh.shift_v_bit_count_minus1 as usize + 1)?;

    ppdu.delta_size_u = reader.read_svlc()?;
    ppdu.delta_size_v = reader.read_svlc()?;

    let pcm_bits = ptgh.pcm_3d_shift_bit_count_minus1 as usize + 1;
    ppdu.shift_tangent_axis = reader.read_bits(pcm_bits)?;
    ppdu.shift_bitangent_axis = reader.read_bits(pcm_bits)?;
    ppdu.shift_normal_axis = reader.read_bits(pcm_bits)?;

    ppdu.pcm_points = reader.read_uvlc()?;

    Ok(ppdu)
}

fn parse_patch_tile_group_layer_unit(
    reader: &mut BitReader<'_>,
    context: &mut ParserContext,
) -> Result<()> {
    let previous = context
        .pdg
        .tile_group_layers
        .last()
        .map(|layer| layer.header.clone())
        .unwrap_or_default();

    let header = parse_patch_tile_group_header(reader, context, &previous)?;

    context.previous_patch_size_u = 0;
    context.previous_patch_size_v = 0;

    let mut patches = Vec::new();

    loop {
        let patch_mode = reader.read_uvlc()? as u8;

        let end = match header.frame_type {
            PatchFrameType::I => patch_mode == patch_mode_i::END,
            PatchFrameType::P => patch_mode == patch_mode_p::END,
        };

        if end {
            break;
        }

        let pid = match (header.frame_type, patch_mode) {
            (PatchFrameType::I, patch_mode_i::INTRA) | (PatchFrameType::P, patch_mode_p::INTRA) => {
                parse_local_override_flags(reader, context, &header)?;

                PatchInformationData::Intra(parse_patch_data_unit(reader, context, &header)?)
            }
            (PatchFrameType::P, patch_mode_p::INTER) => {
                PatchInformationData::Inter(parse_delta_patch_data_unit(reader, context, &header)?)
            }
            (PatchFrameType::I, patch_mode_i::PCM) | (PatchFrameType::P, patch_mode_p::PCM) => {
                PatchInformationData::Pcm(parse_pcm_patch_data_unit(reader, context, &header)?)
            }
            (PatchFrameType::P, patch_mode_p::SKIP) => {
                return Err(Error::InvalidPatchMode {
                    mode: patch_mode,
                    tile_group: "draft-6 P",
                });
            }
            _ => {
                return Err(Error::InvalidPatchMode {
                    mode: patch_mode,
                    tile_group: match header.frame_type {
                        PatchFrameType::I => "draft-6 I",
                        PatchFrameType::P => "draft-6 P",
                    },
                });
            }
        };

        patches.push(pid);
    }

    byte_alignment(reader)?;

    context
        .pdg
        .tile_group_layers
        .push(PatchTileGroupLayer { header, patches });

    Ok(())
}

/// Materializes patches for one frame against the previous frame and
/// rasterizes the block-to-patch map.
fn create_patches(
    context: &ParserContext,
    frame: &mut FrameData,
    previous_frame: &FrameData,
    frame_index: usize,
) -> Result<()> {
    let sps = &context.sps;
    let layer = &context.pdg.tile_group_layers[frame_index];

    let psps = context.pdg.psps(0)?;
    let pfps = context.pdg.pfps(0)?;

    let occupancy_packing_block_size = 1u32 << psps.log2_patch_packing_block_size;
    let min_level = u32::from(sps.min_level).max(1);
    let max_3d_coordinate = 1i64 << (sps.geometry_3d_coordinates_bitdepth_minus1 + 1);

    let absolute_index = if sps.layer_count_minus1 > 0 { 1 } else { 0 };
    let absolute_coding = sps
        .layer_absolute_coding_enabled
        .get(absolute_index)
        .copied()
        .unwrap_or(true);

    let mut previous_size_u0 = 0i64;
    let mut previous_size_v0 = 0i64;
    let mut prediction_index = 0i64;

    for pid in &layer.patches {
        match pid {
            PatchInformationData::Intra(pdu) => {
                let mut patch = Patch {
                    occupancy_resolution: occupancy_packing_block_size,
                    u0: pdu.shift_u,
                    v0: pdu.shift_v,
                    u1: pdu.shift_tangent_axis,
                    v1: pdu.shift_bitangent_axis,
                    best_match_index: -1,
                    lod_scale_x: 1,
                    lod_scale_y: 1,
                    ..Default::default()
                };

                patch.size_d = (u64::from(pdu.shift_delta_max_normal_axis)
                    * u64::from(min_level))
                .min(255) as u32;
                patch.size_u0 = (previous_size_u0 + i64::from(pdu.delta_size_u)).max(0) as u32;
                patch.size_v0 = (previous_size_v0 + i64::from(pdu.delta_size_v)).max(0) as u32;

                patch.set_axes(u32::from(pdu.projection_plane));
                patch.patch_orientation =
                    PatchOrientation::try_from(u32::from(pdu.orientation_index))?;
                patch.axis_of_additional_plane = if pdu.projection_45degree_present_flag {
                    u32::from(pdu.projection_45degree_rotation_axis)
                } else {
                    0
                };

                let min_z = i64::from(pdu.shift_min_normal_axis) * i64::from(min_level);

                patch.d1 = if patch.projection_mode == 0 || !absolute_coding {
                    min_z as i32
                } else {
                    (max_3d_coordinate - min_z) as i32
                };

                previous_size_u0 = i64::from(patch.size_u0);
                previous_size_v0 = i64::from(patch.size_v0);

                frame.patches.push(patch);
            }
            PatchInformationData::Inter(dpdu) => {
                let best_match_index =
                    (i64::from(dpdu.delta_patch_index) + prediction_index) as usize;
                prediction_index += i64::from(dpdu.delta_patch_index) + 1;

                let previous_patch = previous_frame.patches.get(best_match_index).ok_or(
                    Error::MissingReferencePatch {
                        afoc: previous_frame.index,
                        patch_index: best_match_index,
                        available: previous_frame.patches.len(),
                    },
                )?;

                let mut patch = Patch {
                    occupancy_resolution: occupancy_packing_block_size,
                    u0: (dpdu.delta_shift_u + previous_patch.u0 as i32) as u32,
                    v0: (dpdu.delta_shift_v + previous_patch.v0 as i32) as u32,
                    u1: (dpdu.delta_shift_tangent_axis + previous_patch.u1 as i32) as u32,
                    v1: (dpdu.delta_shift_bitangent_axis + previous_patch.v1 as i32) as u32,
                    size_u0: (dpdu.delta_size_u + previous_patch.size_u0 as i32) as u32,
                    size_v0: (dpdu.delta_size_v + previous_patch.size_v0 as i32) as u32,
                    normal_axis: previous_patch.normal_axis,
                    tangent_axis: previous_patch.tangent_axis,
                    bitangent_axis: previous_patch.bitangent_axis,
                    projection_mode: previous_patch.projection_mode,
                    patch_orientation: previous_patch.patch_orientation,
                    axis_of_additional_plane: previous_patch.axis_of_additional_plane,
                    best_match_index: best_match_index as i32,
                    lod_scale_x: previous_patch.lod_scale_x,
                    lod_scale_y: previous_patch.lod_scale_y,
                    ..Default::default()
                };

                let min_level_i = i64::from(min_level);
                let delta_min_z = i64::from(dpdu.delta_shift_min_normal_axis);
                let ref_d1 = i64::from(previous_patch.d1);

                patch.d1 = if patch.projection_mode == 0 || !absolute_coding {
                    ((delta_min_z + ref_d1 / min_level_i) * min_level_i) as i32
                } else if !pfps.projection_45degree_enabled_flag {
                    (max_3d_coordinate
                        - (delta_min_z + (max_3d_coordinate - ref_d1) / min_level_i)
                            * min_level_i) as i32
                } else {
                    let doubled = max_3d_coordinate << 1;
                    (doubled - (delta_min_z + (doubled - ref_d1) / min_level_i) * min_level_i)
                        as i32
                };

                let mut prev_dd = u64::from(previous_patch.size_d) / u64::from(min_level);
                if prev_dd * u64::from(min_level) != u64::from(previous_patch.size_d) {
                    prev_dd += 1;
                }

                patch.size_d = ((dpdu.shift_delta_max_normal_axis as i64 + prev_dd as i64).max(0)
                    as u64
                    * u64::from(min_level))
                .min(255) as u32;

                previous_size_u0 = i64::from(patch.size_u0);
                previous_size_v0 = i64::from(patch.size_v0);

                frame.patches.push(patch);
            }
            PatchInformationData::Pcm(ppdu) => {
                frame.raw_patches.push(RawPatch {
                    u0: ppdu.shift_u,
                    v0: ppdu.shift_v,
                    size_u0: ppdu.delta_size_u.max(0) as u32,
                    size_v0: ppdu.delta_size_v.max(0) as u32,
                    u1: ppdu.shift_tangent_axis,
                    v1: ppdu.shift_bitangent_axis,
                    d1: ppdu.shift_normal_axis,
                    occupancy_resolution: occupancy_packing_block_size,
                    point_count: ppdu.pcm_points,
                });
            }
        }
    }

    frame.block_to_patch = create_block_to_patch(
        frame,
        occupancy_packing_block_size,
        sps.patch_precedence_order_flag,
    );

    Ok(())
}

/// Splits the video streams, extracts decoder configurations and
/// materializes the frames of one group.
fn finalize_frame_group(group: &mut FrameGroup, context: &ParserContext) -> Result<()> {
    for video_type in [
        VideoType::Occupancy,
        VideoType::Geometry,
        VideoType::GeometryD0,
        VideoType::GeometryD1,
        VideoType::GeometryRaw,
        VideoType::Texture,
        VideoType::TextureRaw,
    ] {
        let stream = group.stream_mut(video_type);

        if stream.is_empty() {
            continue;
        }

        let nal_units = scan_nal_units(&stream.buffer);
        stream.packets = split_into_packets(&stream.buffer, &nal_units)?;
        stream.decoder_config = Some(DecoderConfig::parse(&stream.buffer)?);
    }

    let frame_count = context.pdg.tile_group_layers.len();

    let occupancy_packets = group.stream(VideoType::Occupancy).packets.clone();
    let geometry_packets = group.stream(VideoType::Geometry).packets.clone();
    let texture_packets = group.stream(VideoType::Texture).packets.clone();

    // A dual-layer stream interleaves two geometry/texture pictures per
    // point cloud frame; playback uses the first of each pair.
    let dual_layer_skipping = occupancy_packets.len() * 2 == geometry_packets.len();

    for (name, packets, needed) in [
        ("occupancy", &occupancy_packets, frame_count),
        (
            "geometry",
            &geometry_packets,
            if dual_layer_skipping { frame_count * 2 } else { frame_count },
        ),
        (
            "texture",
            &texture_packets,
            if dual_layer_skipping { frame_count * 2 } else { frame_count },
        ),
    ] {
        if packets.len() < needed {
            return Err(Error::PacketCountMismatch {
                video_type: name,
                packets: packets.len(),
                frames: needed,
            });
        }
    }

    group.frames = vec![FrameData::default(); frame_count];

    for index in 0..frame_count {
        let mut frame = std::mem::take(&mut group.frames[index]);
        frame.index = index;
        frame.atlas_frame_order_count = index;
        frame.width = u32::from(context.sps.frame_width);
        frame.height = u32::from(context.sps.frame_height);

        frame.occupancy_packet = occupancy_packets[index];

        let video_index = if dual_layer_skipping { index * 2 } else { index };
        frame.geometry_packet = geometry_packets[video_index];
        frame.texture_packet = texture_packets[video_index];

        let previous_index = index.saturating_sub(1);
        let previous_frame = std::mem::take(&mut group.frames[previous_index]);

        create_patches(context, &mut frame, &previous_frame, index)?;

        group.frames[previous_index] = previous_frame;
        group.frames[index] = frame;
    }

    Ok(())
}
