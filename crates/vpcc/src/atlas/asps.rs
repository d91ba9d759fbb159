use vpcc_bitio::BitReader;

use crate::Result;
use crate::vps::byte_alignment;

/// A reference list structure: signed AFOC deltas toward candidate
/// reference atlas frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefListStruct {
    pub num_ref_entries: usize,
    pub st_ref_atlas_frame_flag: Vec<bool>,
    pub abs_delta_afoc_st: Vec<u32>,
    pub strpf_entry_sign_flag: Vec<bool>,
    pub afoc_lsb_lt: Vec<u32>,
}

impl RefListStruct {
    pub fn parse(
        reader: &mut BitReader<'_>,
        long_term_ref_atlas_frames: bool,
        log2_max_atlas_frame_order_cnt_lsb_minus4: u32,
    ) -> Result<Self> {
        let num_ref_entries = reader.read_uvlc()? as usize;

        let mut rls = Self {
            num_ref_entries,
            st_ref_atlas_frame_flag: vec![true; num_ref_entries],
            abs_delta_afoc_st: vec![0; num_ref_entries],
            strpf_entry_sign_flag: vec![true; num_ref_entries],
            afoc_lsb_lt: vec![0; num_ref_entries],
        };

        for i in 0..num_ref_entries {
            if long_term_ref_atlas_frames {
                rls.st_ref_atlas_frame_flag[i] = reader.read_bit()?;
            }

            if rls.st_ref_atlas_frame_flag[i] {
                rls.abs_delta_afoc_st[i] = reader.read_uvlc()?;

                if rls.abs_delta_afoc_st[i] > 0 {
                    rls.strpf_entry_sign_flag[i] = reader.read_bit()?;
                }
            } else {
                let bits = (log2_max_atlas_frame_order_cnt_lsb_minus4 + 4) as usize;
                rls.afoc_lsb_lt[i] = reader.read_bits(bits)?;
            }
        }

        Ok(rls)
    }
}

/// One point-local-reconstruction mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlrMode {
    pub interpolate_flag: bool,
    pub filling_flag: bool,
    pub minimum_depth: u8,
    pub neighbour_minus1: u8,
}

/// Per-map point-local-reconstruction information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointLocalReconstructionInformation {
    pub map_enabled_flag: bool,
    pub number_of_modes_minus1: u8,
    pub modes: Vec<PlrMode>,
    pub block_threshold_per_patch_minus1: u8,
}

impl PointLocalReconstructionInformation {
    pub fn parse(reader: &mut BitReader<'_>) -> Result<Self> {
        let mut plri = Self::default();

        plri.map_enabled_flag = reader.read_bit()?;

        if plri.map_enabled_flag {
            plri.number_of_modes_minus1 = reader.read_bits(4)? as u8;

            for _ in 0..plri.number_of_modes_minus1 {
                plri.modes.push(PlrMode {
                    interpolate_flag: reader.read_bit()?,
                    filling_flag: reader.read_bit()?,
                    minimum_depth: reader.read_bits(2)? as u8,
                    neighbour_minus1: reader.read_bits(2)? as u8,
                });
            }

            plri.block_threshold_per_patch_minus1 = reader.read_bits(6)? as u8;
        }

        Ok(plri)
    }
}

/// Atlas VUI timing parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VuiParameters {
    pub timing_info_present_flag: bool,
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub poc_proportional_to_timing_flag: bool,
    pub num_ticks_poc_diff_one_minus1: u32,
    pub hrd_parameters_present_flag: bool,
    pub hrd_parameters: HrdParameters,
}

impl VuiParameters {
    pub fn parse(reader: &mut BitReader<'_>) -> Result<Self> {
        let mut vui = Self::default();

        vui.timing_info_present_flag = reader.read_bit()?;

        if vui.timing_info_present_flag {
            vui.num_units_in_tick = reader.read_bits(32)?;
            vui.time_scale = reader.read_bits(32)?;
            vui.poc_proportional_to_timing_flag = reader.read_bit()?;

            if vui.poc_proportional_to_timing_flag {
                vui.num_ticks_poc_diff_one_minus1 = reader.read_uvlc()?;
            }

            vui.hrd_parameters_present_flag = reader.read_bit()?;

            if vui.hrd_parameters_present_flag {
                vui.hrd_parameters = HrdParameters::parse(reader)?;
            }
        }

        Ok(vui)
    }
}

/// Atlas HRD parameters. The sub-layer count is fixed at one; the atlas
/// substreams this player decodes never carry temporal sub-layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HrdParameters {
    pub nal_parameters_present_flag: bool,
    pub acl_parameters_present_flag: bool,
    pub bit_rate_scale: u8,
    pub cab_size_scale: u8,
    pub initial_cab_removal_delay_length_minus1: u8,
    pub au_cab_removal_delay_length_minus1: u8,
    pub dab_output_delay_length_minus1: u8,
    pub fixed_atlas_rate_general_flag: bool,
    pub fixed_atlas_rate_within_cas_flag: bool,
    pub low_delay_flag: bool,
    pub nal_sub_layer_parameters: HrdSubLayerParameters,
    pub acl_sub_layer_parameters: HrdSubLayerParameters,
}

impl HrdParameters {
    pub fn parse(reader: &mut BitReader<'_>) -> Result<Self> {
        let mut hrd = Self::default();

        hrd.nal_parameters_present_flag = reader.read_bit()?;
        hrd.acl_parameters_present_flag = reader.read_bit()?;

        if hrd.nal_parameters_present_flag || hrd.acl_parameters_present_flag {
            hrd.bit_rate_scale = reader.read_bits(4)? as u8;
            hrd.cab_size_scale = reader.read_bits(4)? as u8;
            hrd.initial_cab_removal_delay_length_minus1 = reader.read_bits(5)? as u8;
            hrd.au_cab_removal_delay_length_minus1 = reader.read_bits(5)? as u8;
            hrd.dab_output_delay_length_minus1 = reader.read_bits(5)? as u8;
        }

        hrd.fixed_atlas_rate_general_flag = reader.read_bit()?;

        if !hrd.fixed_atlas_rate_general_flag {
            hrd.fixed_atlas_rate_within_cas_flag = reader.read_bit()?;
        }

        if hrd.fixed_atlas_rate_within_cas_flag {
            hrd.fixed_atlas_rate_within_cas_flag = reader.read_bit()?;
        } else {
            hrd.low_delay_flag = reader.read_bit()?;
        }

        if !hrd.low_delay_flag {
            hrd.low_delay_flag = reader.read_bit()?;
        }

        if hrd.nal_parameters_present_flag {
            hrd.nal_sub_layer_parameters =
                HrdSubLayerParameters::parse(reader, hrd.low_delay_flag as usize)?;
        }

        if hrd.acl_parameters_present_flag {
            hrd.acl_sub_layer_parameters =
                HrdSubLayerParameters::parse(reader, hrd.low_delay_flag as usize)?;
        }

        Ok(hrd)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HrdSubLayerParameters {
    pub bit_rate_value_minus1: Vec<u32>,
    pub cab_size_value_minus1: Vec<u32>,
    pub cbr_flag: Vec<bool>,
}

impl HrdSubLayerParameters {
    pub fn parse(reader: &mut BitReader<'_>, cab_count: usize) -> Result<Self> {
        let mut params = Self::default();

        for _ in 0..=cab_count {
            params.bit_rate_value_minus1.push(reader.read_uvlc()?);
            params.cab_size_value_minus1.push(reader.read_uvlc()?);
            params.cbr_flag.push(reader.read_bit()?);
        }

        Ok(params)
    }
}

/// The atlas sequence parameter set.
///
/// `log2_patch_packing_block_size` sets the occupancy resolution for all
/// patches of the sequence; the various enable flags gate which fields
/// the patch data units carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Asps {
    pub asps_id: u32,
    pub frame_width: u16,
    pub frame_height: u16,
    pub log2_patch_packing_block_size: u8,
    pub log2_max_atlas_frame_order_cnt_lsb_minus4: u32,
    pub max_dec_atlas_frame_buffering_minus1: u32,
    pub long_term_ref_atlas_frames_flag: bool,
    pub ref_list_structs: Vec<RefListStruct>,
    pub use_eight_orientations_flag: bool,
    pub degree45_projection_patch_present_flag: bool,
    pub normal_axis_limits_quantization_enabled_flag: bool,
    pub normal_axis_max_delta_value_enabled_flag: bool,
    pub remove_duplicate_point_enabled_flag: bool,
    pub pixel_deinterleaving_flag: bool,
    pub patch_precedence_order_flag: bool,
    pub patch_size_quantizer_present_flag: bool,
    pub enhanced_occupancy_map_for_depth_flag: bool,
    pub point_local_reconstruction_enabled_flag: bool,
    pub map_count_minus1: u8,
    pub enhanced_occupancy_map_fix_bit_count_minus1: u8,
    pub point_local_reconstruction_information: Vec<PointLocalReconstructionInformation>,
    pub surface_thickness_minus1: u8,
    pub vui_parameters: Option<VuiParameters>,
}

impl Asps {
    pub fn parse(reader: &mut BitReader<'_>) -> Result<Self> {
        let mut asps = Self::default();

        asps.asps_id = reader.read_uvlc()?;
        asps.frame_width = reader.read_bits(16)? as u16;
        asps.frame_height = reader.read_bits(16)? as u16;
        asps.log2_patch_packing_block_size = reader.read_bits(3)? as u8;
        asps.log2_max_atlas_frame_order_cnt_lsb_minus4 = reader.read_uvlc()?;
        asps.max_dec_atlas_frame_buffering_minus1 = reader.read_uvlc()?;
        asps.long_term_ref_atlas_frames_flag = reader.read_bit()?;

        let num_ref_lists = reader.read_uvlc()? as usize;

        for _ in 0..num_ref_lists {
            asps.ref_list_structs.push(RefListStruct::parse(
                reader,
                asps.long_term_ref_atlas_frames_flag,
                asps.log2_max_atlas_frame_order_cnt_lsb_minus4,
            )?);
        }

        asps.use_eight_orientations_flag = reader.read_bit()?;
        asps.degree45_projection_patch_present_flag = reader.read_bit()?;
        asps.normal_axis_limits_quantization_enabled_flag = reader.read_bit()?;
        asps.normal_axis_max_delta_value_enabled_flag = reader.read_bit()?;
        asps.remove_duplicate_point_enabled_flag = reader.read_bit()?;
        asps.pixel_deinterleaving_flag = reader.read_bit()?;
        asps.patch_precedence_order_flag = reader.read_bit()?;
        asps.patch_size_quantizer_present_flag = reader.read_bit()?;
        asps.enhanced_occupancy_map_for_depth_flag = reader.read_bit()?;
        asps.point_local_reconstruction_enabled_flag = reader.read_bit()?;
        asps.map_count_minus1 = reader.read_bits(4)? as u8;

        if asps.enhanced_occupancy_map_for_depth_flag && asps.map_count_minus1 == 0 {
            asps.enhanced_occupancy_map_fix_bit_count_minus1 = reader.read_bits(4)? as u8;
        }

        if asps.point_local_reconstruction_enabled_flag {
            for _ in 0..=asps.map_count_minus1 {
                asps.point_local_reconstruction_information
                    .push(PointLocalReconstructionInformation::parse(reader)?);
            }
        }

        if asps.pixel_deinterleaving_flag || asps.point_local_reconstruction_enabled_flag {
            asps.surface_thickness_minus1 = reader.read_bits(8)? as u8;
        }

        let vui_parameters_present_flag = reader.read_bit()?;

        if vui_parameters_present_flag {
            asps.vui_parameters = Some(VuiParameters::parse(reader)?);
        }

        // asps_extension_present_flag; no extensions are defined.
        reader.read_bit()?;

        byte_alignment(reader)?;

        Ok(asps)
    }

    /// The occupancy map block size in pixels.
    pub const fn packing_block_size(&self) -> u32 {
        1 << self.log2_patch_packing_block_size
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use vpcc_bitio::BitWriter;

    use super::*;

    /// Writes a minimal ASPS RBSP: one short-term reference list with one
    /// entry at delta -1, eight orientations enabled, no optional tools.
    pub(crate) fn write_asps(writer: &mut BitWriter, width: u32, height: u32, log2_block_size: u32) {
        writer.write_uvlc(0); // asps_id
        writer.write_bits(width, 16);
        writer.write_bits(height, 16);
        writer.write_bits(log2_block_size, 3);
        writer.write_uvlc(4); // log2_max_atlas_frame_order_cnt_lsb_minus4
        writer.write_uvlc(0); // max_dec_atlas_frame_buffering_minus1
        writer.write_bit(false); // long_term_ref_atlas_frames_flag
        writer.write_uvlc(1); // num_ref_atlas_frame_lists_in_asps

        // Reference list: one entry, abs delta 1, sign 0 (previous frame).
        writer.write_uvlc(1);
        writer.write_uvlc(1);
        writer.write_bit(false);

        writer.write_bit(true); // use_eight_orientations_flag
        writer.write_bit(false); // degree45_projection_patch_present_flag
        writer.write_bit(true); // normal_axis_limits_quantization_enabled_flag
        writer.write_bit(false); // normal_axis_max_delta_value_enabled_flag
        writer.write_bit(false); // remove_duplicate_point_enabled_flag
        writer.write_bit(false); // pixel_deinterleaving_flag
        writer.write_bit(false); // patch_precedence_order_flag
        writer.write_bit(false); // patch_size_quantizer_present_flag
        writer.write_bit(false); // enhanced_occupancy_map_for_depth_flag
        writer.write_bit(false); // point_local_reconstruction_enabled_flag
        writer.write_bits(0, 4); // map_count_minus1
        writer.write_bit(false); // vui_parameters_present_flag
        writer.write_bit(false); // asps_extension_present_flag

        writer.write_bit(true);
        writer.align_to_byte();
    }

    #[test]
    fn minimal_asps_round_trip() {
        let mut writer = BitWriter::new();
        write_asps(&mut writer, 1280, 1344, 4);
        let data = writer.finish();

        let mut reader = BitReader::new(&data);
        let asps = Asps::parse(&mut reader).unwrap();

        assert_eq!(asps.frame_width, 1280);
        assert_eq!(asps.frame_height, 1344);
        assert_eq!(asps.packing_block_size(), 16);
        assert!(asps.use_eight_orientations_flag);
        assert_eq!(asps.ref_list_structs.len(), 1);
        assert_eq!(asps.ref_list_structs[0].abs_delta_afoc_st, vec![1]);
        assert!(!asps.ref_list_structs[0].strpf_entry_sign_flag[0]);
        assert_eq!(reader.bytes_available(), 0);
    }
}
