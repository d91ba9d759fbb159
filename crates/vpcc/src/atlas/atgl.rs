use vpcc_bitio::{BitReader, fixed_length_code_bits_count};

use crate::atlas::asps::{Asps, PointLocalReconstructionInformation, RefListStruct};
use crate::atlas::afps::Afps;
use crate::vps::{GeometryInformation, byte_alignment};
use crate::{Error, Result};

/// Atlas tile group type. Legal patch modes depend on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TileGroupType {
    /// Inter-predicted tile group.
    P = 0,
    /// Skipped tile group: every patch replicates its reference.
    Skip = 1,
    /// Intra tile group.
    #[default]
    I = 2,
}

impl TileGroupType {
    const fn name(&self) -> &'static str {
        match self {
            Self::P => "P",
            Self::Skip => "SKIP",
            Self::I => "I",
        }
    }
}

impl TryFrom<u32> for TileGroupType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            0 => Self::P,
            1 => Self::Skip,
            2 => Self::I,
            other => return Err(Error::InvalidTileGroupType(other)),
        })
    }
}

/// Patch modes of an I tile group.
pub mod patch_mode_i {
    pub const INTRA: u8 = 0;
    pub const RAW: u8 = 1;
    pub const EOM: u8 = 2;
    pub const END: u8 = 14;
}

/// Patch modes of a P tile group.
pub mod patch_mode_p {
    pub const SKIP: u8 = 0;
    pub const INTRA: u8 = 1;
    pub const INTER: u8 = 2;
    pub const MERGE: u8 = 3;
    pub const RAW: u8 = 4;
    pub const EOM: u8 = 5;
    pub const END: u8 = 14;
}

/// Point-local-reconstruction data of one patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointLocalReconstructionData {
    pub map_width: usize,
    pub map_height: usize,
    pub level_flag: bool,
    pub present_flag: bool,
    pub mode_minus1: u8,
    pub block_present_flag: Vec<bool>,
    pub block_mode_minus1: Vec<u8>,
}

impl PointLocalReconstructionData {
    pub fn parse(
        reader: &mut BitReader<'_>,
        plri: &PointLocalReconstructionInformation,
        map_width: usize,
        map_height: usize,
    ) -> Result<Self> {
        let mut plrd = Self {
            map_width,
            map_height,
            ..Default::default()
        };

        let block_count = map_width * map_height;
        let mode_bits = fixed_length_code_bits_count(u32::from(plri.number_of_modes_minus1)) as usize;

        plrd.level_flag = if block_count > plri.block_threshold_per_patch_minus1 as usize + 1 {
            reader.read_bit()?
        } else {
            true
        };

        if plrd.level_flag {
            plrd.present_flag = reader.read_bit()?;

            if plrd.present_flag {
                plrd.mode_minus1 = reader.read_bits(mode_bits)? as u8;
            }
        } else {
            plrd.block_present_flag = vec![false; block_count];
            plrd.block_mode_minus1 = vec![0; block_count];

            for i in 0..block_count {
                plrd.block_present_flag[i] = reader.read_bit()?;

                if plrd.block_present_flag[i] {
                    plrd.block_mode_minus1[i] = reader.read_bits(mode_bits)? as u8;
                }
            }
        }

        Ok(plrd)
    }
}

/// The atlas tile group header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtlasTileGroupHeader {
    pub afps_id: u32,
    pub address: u32,
    pub tile_group_type: TileGroupType,
    pub atlas_frm_order_cnt_lsb: u32,
    pub ref_atlas_frame_list_sps_flag: bool,
    pub ref_atlas_frame_list_idx: u32,
    /// The resolved reference list: either a copy of the ASPS entry named
    /// by `ref_atlas_frame_list_idx` or an inline list.
    pub ref_list: RefListStruct,
    pub pos_min_z_quantizer: u8,
    pub pos_delta_max_z_quantizer: u8,
    pub patch_size_x_info_quantizer: u8,
    pub patch_size_y_info_quantizer: u8,
    pub raw_3d_pos_axis_bit_count_minus1: u32,
    pub num_ref_idx_active_override_flag: bool,
    pub num_ref_idx_active_minus1: u32,
}

impl AtlasTileGroupHeader {
    pub fn parse(
        reader: &mut BitReader<'_>,
        asps_set: &[Option<Asps>],
        afps_set: &[Option<Afps>],
        geometry_information: &GeometryInformation,
    ) -> Result<Self> {
        let mut atgh = Self::default();

        atgh.afps_id = reader.read_uvlc()?;

        let afps = lookup(afps_set, atgh.afps_id as usize, "AFPS")?;
        let asps = lookup(asps_set, afps.asps_id as usize, "ASPS")?;

        let afti = &afps.tile_information;

        atgh.address =
            reader.read_bits(afti.signalled_tile_group_id_length_minus1 as usize + 1)?;
        atgh.tile_group_type = TileGroupType::try_from(reader.read_uvlc()?)?;
        atgh.atlas_frm_order_cnt_lsb = reader
            .read_bits(asps.log2_max_atlas_frame_order_cnt_lsb_minus4 as usize + 4)?;

        if !asps.ref_list_structs.is_empty() {
            atgh.ref_atlas_frame_list_sps_flag = reader.read_bit()?;
        }

        if !atgh.ref_atlas_frame_list_sps_flag {
            atgh.ref_list = RefListStruct::parse(
                reader,
                asps.long_term_ref_atlas_frames_flag,
                asps.log2_max_atlas_frame_order_cnt_lsb_minus4,
            )?;
        } else if asps.ref_list_structs.len() > 1 {
            atgh.ref_atlas_frame_list_idx = reader.read_uvlc()?;
        }

        if atgh.ref_atlas_frame_list_sps_flag {
            atgh.ref_list = asps
                .ref_list_structs
                .get(atgh.ref_atlas_frame_list_idx as usize)
                .cloned()
                .ok_or(Error::MissingAtlasParameterSet {
                    kind: "reference list",
                    id: atgh.ref_atlas_frame_list_idx as usize,
                })?;
        }

        let long_term_entries = atgh
            .ref_list
            .st_ref_atlas_frame_flag
            .iter()
            .filter(|&&st| !st)
            .count();

        for _ in 0..long_term_entries {
            let additional_afoc_lsb_present = reader.read_bit()?;

            if additional_afoc_lsb_present {
                reader.read_bits(afps.additional_lt_afoc_lsb_len as usize)?;
            }
        }

        if atgh.tile_group_type != TileGroupType::Skip {
            if asps.normal_axis_limits_quantization_enabled_flag {
                atgh.pos_min_z_quantizer = reader.read_bits(5)? as u8;

                if asps.normal_axis_max_delta_value_enabled_flag {
                    atgh.pos_delta_max_z_quantizer = reader.read_bits(5)? as u8;
                }
            }

            if asps.patch_size_quantizer_present_flag {
                atgh.patch_size_x_info_quantizer = reader.read_bits(3)? as u8;
                atgh.patch_size_y_info_quantizer = reader.read_bits(3)? as u8;
            }

            if afps.raw_3d_pos_bit_count_explicit_mode_flag {
                let bits = fixed_length_code_bits_count(
                    u32::from(geometry_information.coordinates_3d_bitdepth_minus1) + 1,
                ) as usize;
                atgh.raw_3d_pos_axis_bit_count_minus1 = reader.read_bits(bits)?;
            } else {
                atgh.raw_3d_pos_axis_bit_count_minus1 =
                    u32::from(geometry_information.coordinates_3d_bitdepth_minus1)
                        .saturating_sub(u32::from(
                            geometry_information.nominal_2d_bitdepth_minus1,
                        ))
                        .saturating_sub(1);
            }

            if atgh.tile_group_type == TileGroupType::P && atgh.ref_list.num_ref_entries > 1 {
                atgh.num_ref_idx_active_override_flag = reader.read_bit()?;

                if atgh.num_ref_idx_active_override_flag {
                    atgh.num_ref_idx_active_minus1 = reader.read_uvlc()?;
                }
            }
        }

        byte_alignment(reader)?;

        Ok(atgh)
    }

    /// Number of active reference indices for this tile group.
    pub fn num_ref_idx_active(&self, afps: &Afps) -> usize {
        match self.tile_group_type {
            TileGroupType::P | TileGroupType::Skip => {
                if self.num_ref_idx_active_override_flag {
                    self.num_ref_idx_active_minus1 as usize + 1
                } else {
                    self.ref_list
                        .num_ref_entries
                        .min(afps.num_ref_idx_default_active_minus1 as usize + 1)
                }
            }
            TileGroupType::I => 0,
        }
    }
}

/// An intra patch data unit: all fields absolute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchDataUnit {
    pub pos_2d_x: u32,
    pub pos_2d_y: u32,
    pub delta_size_2d_x: i32,
    pub delta_size_2d_y: i32,
    pub pos_3d_x: u32,
    pub pos_3d_y: u32,
    pub pos_3d_min_z: u32,
    pub pos_3d_delta_max_z: u32,
    pub projection_id: u8,
    pub orientation_index: u8,
    pub lod_enable_flag: bool,
    pub lod_scale_x_minus1: u8,
    pub lod_scale_y: u8,
    pub plr_data: Option<PointLocalReconstructionData>,
}

/// An inter patch data unit: deltas against a reference patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterPatchDataUnit {
    pub ref_index: u32,
    pub ref_patch_index: i32,
    pub pos_2d_x: i32,
    pub pos_2d_y: i32,
    pub delta_size_2d_x: i32,
    pub delta_size_2d_y: i32,
    pub pos_3d_x: i32,
    pub pos_3d_y: i32,
    pub pos_3d_min_z: i32,
    pub pos_3d_delta_max_z: i32,
    pub plr_data: Option<PointLocalReconstructionData>,
}

/// A merge patch data unit: inheritance with optional 2-D or 3-D
/// overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePatchDataUnit {
    pub ref_index: u32,
    pub override_2d_params_flag: bool,
    pub override_3d_params_flag: bool,
    pub pos_2d_x: i32,
    pub pos_2d_y: i32,
    pub delta_size_2d_x: i32,
    pub delta_size_2d_y: i32,
    pub pos_3d_x: i32,
    pub pos_3d_y: i32,
    pub pos_3d_min_z: i32,
    pub pos_3d_delta_max_z: i32,
    pub override_plr_flag: bool,
    pub plr_data: Option<PointLocalReconstructionData>,
}

/// A raw (missed-points) patch data unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPatchDataUnit {
    pub patch_in_raw_video_flag: bool,
    pub pos_2d_x: u32,
    pub pos_2d_y: u32,
    pub delta_size_2d_x: i32,
    pub delta_size_2d_y: i32,
    pub pos_3d_x: u32,
    pub pos_3d_y: u32,
    pub pos_3d_z: u32,
    pub raw_points: i32,
}

/// An enhanced-occupancy-mode patch data unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EomPatchDataUnit {
    pub pos_2d_x: u32,
    pub pos_2d_y: u32,
    pub delta_size_2d_x: i32,
    pub delta_size_2d_y: i32,
    pub associated_patches: Vec<usize>,
    pub points_per_patch: Vec<usize>,
}

/// One entry of an atlas tile group data unit, discriminated by patch
/// mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchInformationData {
    Intra(PatchDataUnit),
    Inter(InterPatchDataUnit),
    Merge(MergePatchDataUnit),
    Skip,
    Raw(RawPatchDataUnit),
    Eom(EomPatchDataUnit),
}

impl PatchInformationData {
    fn plr_map_size(&self) -> Option<(usize, usize)> {
        let plrd = match self {
            Self::Intra(pdu) => pdu.plr_data.as_ref(),
            Self::Inter(ipdu) => ipdu.plr_data.as_ref(),
            Self::Merge(mpdu) => mpdu.plr_data.as_ref(),
            _ => None,
        };

        plrd.map(|plrd| (plrd.map_width, plrd.map_height))
    }
}

/// One parsed atlas-tile-group-layer NAL: a header plus the patch list of
/// one atlas frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtlasTileGroupLayer {
    pub frame_index: usize,
    pub header: AtlasTileGroupHeader,
    pub patches: Vec<PatchInformationData>,
}

/// Running state of the patch data unit parser, carried across patches of
/// one tile group.
#[derive(Debug, Default)]
struct PatchParseState {
    prev_patch_size_u: i64,
    prev_patch_size_v: i64,
    pred_patch_index: i64,
}

pub(crate) fn lookup<'a, T>(set: &'a [Option<T>], id: usize, kind: &'static str) -> Result<&'a T> {
    set.get(id)
        .and_then(Option::as_ref)
        .ok_or(Error::MissingAtlasParameterSet { kind, id })
}

/// Parses one atlas tile group layer RBSP.
pub fn parse_atlas_tile_group_layer(
    reader: &mut BitReader<'_>,
    asps_set: &[Option<Asps>],
    afps_set: &[Option<Afps>],
    previous_layers: &[AtlasTileGroupLayer],
    geometry_information: &GeometryInformation,
    raw_separate_video: bool,
) -> Result<AtlasTileGroupLayer> {
    let header = AtlasTileGroupHeader::parse(reader, asps_set, afps_set, geometry_information)?;

    let mut layer = AtlasTileGroupLayer {
        frame_index: previous_layers.len(),
        header,
        patches: Vec::new(),
    };

    if layer.header.tile_group_type != TileGroupType::Skip {
        let afps = lookup(afps_set, layer.header.afps_id as usize, "AFPS")?;
        let asps = lookup(asps_set, afps.asps_id as usize, "ASPS")?;

        let mut state = PatchParseState::default();

        loop {
            let patch_mode = reader.read_uvlc()? as u8;

            let tile_group_type = layer.header.tile_group_type;
            let end = match tile_group_type {
                TileGroupType::I => patch_mode == patch_mode_i::END,
                TileGroupType::P => patch_mode == patch_mode_p::END,
                TileGroupType::Skip => true,
            };

            if end {
                break;
            }

            let pid = parse_patch_information_data(
                reader,
                patch_mode,
                &layer.header,
                asps,
                afps,
                previous_layers,
                geometry_information,
                raw_separate_video,
                &mut state,
            )?;

            layer.patches.push(pid);
        }

        byte_alignment(reader)?;
    }

    Ok(layer)
}

#[allow(clippy::too_many_arguments)]
fn parse_patch_information_data(
    reader: &mut BitReader<'_>,
    patch_mode: u8,
    atgh: &AtlasTileGroupHeader,
    asps: &Asps,
    afps: &Afps,
    previous_layers: &[AtlasTileGroupLayer],
    geometry_information: &GeometryInformation,
    raw_separate_video: bool,
    state: &mut PatchParseState,
) -> Result<PatchInformationData> {
    use TileGroupType::{I, P};

    let tile_group_type = atgh.tile_group_type;

    Ok(match (tile_group_type, patch_mode) {
        (P, patch_mode_p::SKIP) => PatchInformationData::Skip,
        (P, patch_mode_p::MERGE) => PatchInformationData::Merge(parse_merge_patch_data_unit(
            reader, atgh, asps, afps, state,
        )?),
        (P, patch_mode_p::INTER) => PatchInformationData::Inter(parse_inter_patch_data_unit(
            reader,
            atgh,
            asps,
            afps,
            previous_layers,
            state,
        )?),
        (I, patch_mode_i::INTRA) | (P, patch_mode_p::INTRA) => PatchInformationData::Intra(
            parse_patch_data_unit(reader, atgh, asps, afps, geometry_information, state)?,
        ),
        (I, patch_mode_i::RAW) | (P, patch_mode_p::RAW) => PatchInformationData::Raw(
            parse_raw_patch_data_unit(reader, atgh, afps, raw_separate_video)?,
        ),
        (I, patch_mode_i::EOM) | (P, patch_mode_p::EOM) => {
            PatchInformationData::Eom(parse_eom_patch_data_unit(reader, afps)?)
        }
        _ => {
            return Err(Error::InvalidPatchMode {
                mode: patch_mode,
                tile_group: tile_group_type.name(),
            });
        }
    })
}

fn parse_patch_data_unit(
    reader: &mut BitReader<'_>,
    atgh: &AtlasTileGroupHeader,
    asps: &Asps,
    afps: &Afps,
    geometry_information: &GeometryInformation,
    state: &mut PatchParseState,
) -> Result<PatchDataUnit> {
    let mut pdu = PatchDataUnit::default();

    pdu.pos_2d_x = reader.read_bits(afps.pos_2d_x_bit_count_minus1 as usize + 1)?;
    pdu.pos_2d_y = reader.read_bits(afps.pos_2d_y_bit_count_minus1 as usize + 1)?;

    pdu.delta_size_2d_x = reader.read_svlc()?;
    pdu.delta_size_2d_y = reader.read_svlc()?;

    pdu.pos_3d_x = reader.read_bits(afps.pos_3d_x_bit_count_minus1 as usize + 1)?;
    pdu.pos_3d_y = reader.read_bits(afps.pos_3d_y_bit_count_minus1 as usize + 1)?;

    let bit_count_min_z = (u32::from(geometry_information.coordinates_3d_bitdepth_minus1)
        - u32::from(atgh.pos_min_z_quantizer)
        + 1) as usize;
    pdu.pos_3d_min_z = reader.read_bits(bit_count_min_z)?;

    if asps.normal_axis_max_delta_value_enabled_flag {
        let mut bit_count_max_z = u32::from(geometry_information.coordinates_3d_bitdepth_minus1)
            - u32::from(atgh.pos_delta_max_z_quantizer)
            + 1;

        if asps.degree45_projection_patch_present_flag {
            bit_count_max_z += 1;
        }

        pdu.pos_3d_delta_max_z = reader.read_bits(bit_count_max_z as usize)?;
    }

    pdu.projection_id = reader.read_bits(if asps.degree45_projection_patch_present_flag {
        5
    } else {
        3
    })? as u8;

    pdu.orientation_index =
        reader.read_bits(if asps.use_eight_orientations_flag { 3 } else { 1 })? as u8;

    if afps.lod_mode_enable_flag {
        pdu.lod_enable_flag = reader.read_bit()?;

        if pdu.lod_enable_flag {
            pdu.lod_scale_x_minus1 = reader.read_uvlc()? as u8;
            pdu.lod_scale_y = reader.read_uvlc()? as u8;
        }
    }

    if asps.point_local_reconstruction_enabled_flag {
        let map_width = (state.prev_patch_size_u + i64::from(pdu.delta_size_2d_x)).max(0) as usize;
        let map_height = (state.prev_patch_size_v + i64::from(pdu.delta_size_2d_y)).max(0) as usize;

        let plri = &asps.point_local_reconstruction_information[0];
        pdu.plr_data = Some(PointLocalReconstructionData::parse(
            reader, plri, map_width, map_height,
        )?);

        state.prev_patch_size_u += i64::from(pdu.delta_size_2d_x);
        state.prev_patch_size_v += i64::from(pdu.delta_size_2d_y);
    }

    Ok(pdu)
}

fn parse_inter_patch_data_unit(
    reader: &mut BitReader<'_>,
    atgh: &AtlasTileGroupHeader,
    asps: &Asps,
    afps: &Afps,
    previous_layers: &[AtlasTileGroupLayer],
    state: &mut PatchParseState,
) -> Result<InterPatchDataUnit> {
    let mut ipdu = InterPatchDataUnit::default();

    if atgh.num_ref_idx_active(afps) > 1 {
        ipdu.ref_index = reader.read_uvlc()?;
    }

    ipdu.ref_patch_index = reader.read_svlc()?;
    ipdu.pos_2d_x = reader.read_svlc()?;
    ipdu.pos_2d_y = reader.read_svlc()?;
    ipdu.delta_size_2d_x = reader.read_svlc()?;
    ipdu.delta_size_2d_y = reader.read_svlc()?;
    ipdu.pos_3d_x = reader.read_svlc()?;
    ipdu.pos_3d_y = reader.read_svlc()?;
    ipdu.pos_3d_min_z = reader.read_svlc()?;

    if asps.normal_axis_max_delta_value_enabled_flag {
        ipdu.pos_3d_delta_max_z = reader.read_svlc()?;
    }

    if asps.point_local_reconstruction_enabled_flag {
        let mut map_width = i64::from(ipdu.delta_size_2d_x);
        let mut map_height = i64::from(ipdu.delta_size_2d_y);

        // The reference patch contributes its own map dimensions.
        if let Some(previous) = previous_layers.last() {
            let ref_index = (ipdu.ref_patch_index + state.pred_patch_index as i32) as usize;

            if let Some((ref_width, ref_height)) = previous
                .patches
                .get(ref_index)
                .and_then(PatchInformationData::plr_map_size)
            {
                map_width += ref_width as i64;
                map_height += ref_height as i64;
            }
        }

        let plri = &asps.point_local_reconstruction_information[0];
        ipdu.plr_data = Some(PointLocalReconstructionData::parse(
            reader,
            plri,
            map_width.max(0) as usize,
            map_height.max(0) as usize,
        )?);

        state.prev_patch_size_u = map_width;
        state.prev_patch_size_v = map_height;

        state.pred_patch_index += i64::from(ipdu.ref_patch_index) + 1;
    }

    Ok(ipdu)
}

fn parse_merge_patch_data_unit(
    reader: &mut BitReader<'_>,
    atgh: &AtlasTileGroupHeader,
    asps: &Asps,
    afps: &Afps,
    state: &mut PatchParseState,
) -> Result<MergePatchDataUnit> {
    let mut mpdu = MergePatchDataUnit::default();

    if atgh.num_ref_idx_active(afps) > 1 {
        mpdu.ref_index = reader.read_uvlc()?;
    }

    mpdu.override_2d_params_flag = reader.read_bit()?;

    let mut override_plr = false;

    if mpdu.override_2d_params_flag {
        mpdu.pos_2d_x = reader.read_svlc()?;
        mpdu.pos_2d_y = reader.read_svlc()?;
        mpdu.delta_size_2d_x = reader.read_svlc()?;
        mpdu.delta_size_2d_y = reader.read_svlc()?;

        if asps.point_local_reconstruction_enabled_flag {
            override_plr = true;
        }
    } else {
        mpdu.override_3d_params_flag = reader.read_bit()?;

        if mpdu.override_3d_params_flag {
            mpdu.pos_3d_x = reader.read_svlc()?;
            mpdu.pos_3d_y = reader.read_svlc()?;
            mpdu.pos_3d_min_z = reader.read_svlc()?;

            if asps.normal_axis_max_delta_value_enabled_flag {
                mpdu.pos_3d_delta_max_z = reader.read_svlc()?;
            }

            if asps.point_local_reconstruction_enabled_flag {
                override_plr = reader.read_bit()?;
                mpdu.override_plr_flag = override_plr;
            }
        }
    }

    if override_plr && asps.point_local_reconstruction_enabled_flag {
        let map_width = (state.prev_patch_size_u + i64::from(mpdu.delta_size_2d_x)).max(0) as usize;
        let map_height = (state.prev_patch_size_v + i64::from(mpdu.delta_size_2d_y)).max(0) as usize;

        let plri = &asps.point_local_reconstruction_information[0];
        mpdu.plr_data = Some(PointLocalReconstructionData::parse(
            reader, plri, map_width, map_height,
        )?);

        state.prev_patch_size_u += i64::from(mpdu.delta_size_2d_x);
        state.prev_patch_size_v += i64::from(mpdu.delta_size_2d_y);
    }

    Ok(mpdu)
}

fn parse_raw_patch_data_unit(
    reader: &mut BitReader<'_>,
    atgh: &AtlasTileGroupHeader,
    afps: &Afps,
    raw_separate_video: bool,
) -> Result<RawPatchDataUnit> {
    let mut rpdu = RawPatchDataUnit::default();

    if raw_separate_video {
        rpdu.patch_in_raw_video_flag = reader.read_bit()?;
    }

    rpdu.pos_2d_x = reader.read_bits(afps.pos_2d_x_bit_count_minus1 as usize + 1)?;
    rpdu.pos_2d_y = reader.read_bits(afps.pos_2d_y_bit_count_minus1 as usize + 1)?;
    rpdu.delta_size_2d_x = reader.read_svlc()?;
    rpdu.delta_size_2d_y = reader.read_svlc()?;

    let pos_bits = atgh.raw_3d_pos_axis_bit_count_minus1 as usize + 1;
    rpdu.pos_3d_x = reader.read_bits(pos_bits)?;
    rpdu.pos_3d_y = reader.read_bits(pos_bits)?;
    rpdu.pos_3d_z = reader.read_bits(pos_bits)?;

    rpdu.raw_points = reader.read_svlc()?;

    Ok(rpdu)
}

fn parse_eom_patch_data_unit(
    reader: &mut BitReader<'_>,
    afps: &Afps,
) -> Result<EomPatchDataUnit> {
    let mut epdu = EomPatchDataUnit::default();

    epdu.pos_2d_x = reader.read_bits(afps.pos_2d_x_bit_count_minus1 as usize + 1)?;
    epdu.pos_2d_y = reader.read_bits(afps.pos_2d_y_bit_count_minus1 as usize + 1)?;
    epdu.delta_size_2d_x = reader.read_svlc()?;
    epdu.delta_size_2d_y = reader.read_svlc()?;

    let associated_count = reader.read_bits(8)? as usize + 1;

    epdu.associated_patches = vec![0; associated_count];
    epdu.points_per_patch = vec![0; associated_count];

    for count in 0..associated_count {
        let patch_slot = reader.read_bits(8)? as usize;

        if let Some(entry) = epdu.associated_patches.get_mut(patch_slot) {
            *entry = count;
        }

        let point_slot = reader.read_uvlc()? as usize;

        if let Some(entry) = epdu.points_per_patch.get_mut(point_slot) {
            *entry = count;
        }
    }

    Ok(epdu)
}
