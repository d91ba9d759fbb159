use vpcc_bitio::BitReader;

use crate::nal::read_nal_unit_header;
use crate::profile_tier_level::ProfileTierLevel;
use crate::{Error, NALUnitType, Result};

/// The HEVC sequence parameter set, parsed to decoder-configuration depth.
///
/// ISO/IEC 23008-2 - 7.3.2.2.1. Parsing stops after the luma coding block
/// size fields: everything a hardware decoder handoff or a slice-header
/// parse references comes before that point, and each NAL unit is
/// independently framed so the trailing fields never need to be consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    /// The id of the active VPS, 4 bits.
    pub sps_video_parameter_set_id: u8,
    pub sps_max_sub_layers_minus1: u8,
    pub sps_temporal_id_nesting_flag: bool,
    pub profile_tier_level: ProfileTierLevel,
    /// The id of this SPS, `[0, 15]`.
    pub sps_seq_parameter_set_id: u32,
    /// Chroma sampling relative to luma sampling, `[0, 3]`.
    pub chroma_format_idc: u8,
    pub separate_colour_plane_flag: bool,
    /// Width of each decoded picture in luma samples. Never 0.
    pub pic_width_in_luma_samples: u32,
    /// Height of each decoded picture in luma samples. Never 0.
    pub pic_height_in_luma_samples: u32,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    /// `MaxPicOrderCntLsb = 2^(log2_max_pic_order_cnt_lsb_minus4 + 4)`;
    /// the slice header reads its POC with this bit width.
    pub log2_max_pic_order_cnt_lsb_minus4: u32,
    pub log2_min_luma_coding_block_size_minus3: u32,
    pub log2_diff_max_min_luma_coding_block_size: u32,
}

impl Sps {
    /// Parses an SPS NAL unit (start code stripped, NAL header included).
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut reader = BitReader::with_emulation_prevention(payload);

        let nal_type = read_nal_unit_header(&mut reader)?;
        if nal_type != NALUnitType::SpsNut {
            return Err(Error::MissingParameterSet("SPS"));
        }

        let sps_video_parameter_set_id = reader.read_bits(4)? as u8;
        let sps_max_sub_layers_minus1 = reader.read_bits(3)? as u8;
        let sps_temporal_id_nesting_flag = reader.read_bit()?;

        let profile_tier_level = ProfileTierLevel::parse(&mut reader, sps_max_sub_layers_minus1)?;

        let sps_seq_parameter_set_id = reader.read_uvlc()?;
        if sps_seq_parameter_set_id > 15 {
            return Err(Error::ParameterSetIdOutOfRange {
                kind: "SPS",
                id: sps_seq_parameter_set_id,
            });
        }

        let chroma_format_idc = reader.read_uvlc()? as u8;

        let separate_colour_plane_flag = if chroma_format_idc == 3 {
            reader.read_bit()?
        } else {
            false
        };

        let pic_width_in_luma_samples = reader.read_uvlc()?;
        let pic_height_in_luma_samples = reader.read_uvlc()?;

        let conformance_window_flag = reader.read_bit()?;
        if conformance_window_flag {
            reader.read_uvlc()?;
            reader.read_uvlc()?;
            reader.read_uvlc()?;
            reader.read_uvlc()?;
        }

        let bit_depth_luma_minus8 = reader.read_uvlc()?;
        let bit_depth_chroma_minus8 = reader.read_uvlc()?;

        let log2_max_pic_order_cnt_lsb_minus4 = reader.read_uvlc()?;

        let sps_sub_layer_ordering_info_present_flag = reader.read_bit()?;

        let range = if sps_sub_layer_ordering_info_present_flag {
            0..=sps_max_sub_layers_minus1
        } else {
            sps_max_sub_layers_minus1..=sps_max_sub_layers_minus1
        };

        for _ in range {
            reader.read_uvlc()?; // sps_max_dec_pic_buffering_minus1
            reader.read_uvlc()?; // sps_max_num_reorder_pics
            reader.read_uvlc()?; // sps_max_latency_increase_plus1
        }

        let log2_min_luma_coding_block_size_minus3 = reader.read_uvlc()?;
        let log2_diff_max_min_luma_coding_block_size = reader.read_uvlc()?;

        Ok(Self {
            sps_video_parameter_set_id,
            sps_max_sub_layers_minus1,
            sps_temporal_id_nesting_flag,
            profile_tier_level,
            sps_seq_parameter_set_id,
            chroma_format_idc,
            separate_colour_plane_flag,
            pic_width_in_luma_samples,
            pic_height_in_luma_samples,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            log2_max_pic_order_cnt_lsb_minus4,
            log2_min_luma_coding_block_size_minus3,
            log2_diff_max_min_luma_coding_block_size,
        })
    }

    /// The number of bits of a slice segment address, derived from the
    /// picture size in coding tree blocks.
    pub fn slice_segment_address_bits(&self) -> usize {
        let min_cb_log2_size_y = self.log2_min_luma_coding_block_size_minus3 + 3;
        let ctb_log2_size_y = min_cb_log2_size_y + self.log2_diff_max_min_luma_coding_block_size;
        let ctb_size_y = 1u32 << ctb_log2_size_y;

        let pic_width_in_ctbs_y = self.pic_width_in_luma_samples.div_ceil(ctb_size_y);
        let pic_height_in_ctbs_y = self.pic_height_in_luma_samples.div_ceil(ctb_size_y);

        vpcc_bitio::bits_needed((pic_width_in_ctbs_y * pic_height_in_ctbs_y) as usize)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use vpcc_bitio::BitWriter;

    use super::*;

    /// Builds an SPS NAL payload (NAL header included, no start code) for
    /// the given dimensions. Shared with the packet and config tests.
    pub(crate) fn build_sps_payload(width: u32, height: u32, log2_max_poc_lsb_minus4: u32) -> Vec<u8> {
        let mut writer = BitWriter::new();

        // NAL unit header: SPS (33).
        writer.write_bit(false);
        writer.write_bits(33, 6);
        writer.write_bits(0, 6);
        writer.write_bits(1, 3);

        writer.write_bits(0, 4); // sps_video_parameter_set_id
        writer.write_bits(0, 3); // sps_max_sub_layers_minus1
        writer.write_bit(true); // sps_temporal_id_nesting_flag

        // General profile/tier/level: Main profile, level 4.0.
        writer.write_bits(0, 2);
        writer.write_bit(false);
        writer.write_bits(1, 5);
        writer.write_bits(1 << 30, 32);
        writer.write_bits(0b1000, 4);
        writer.write_bits(0, 32);
        writer.write_bits(0, 12);
        writer.write_bits(120, 8);

        writer.write_uvlc(0); // sps_seq_parameter_set_id
        writer.write_uvlc(1); // chroma_format_idc (4:2:0)
        writer.write_uvlc(width);
        writer.write_uvlc(height);
        writer.write_bit(false); // conformance_window_flag
        writer.write_uvlc(0); // bit_depth_luma_minus8
        writer.write_uvlc(0); // bit_depth_chroma_minus8
        writer.write_uvlc(log2_max_poc_lsb_minus4);
        writer.write_bit(true); // sps_sub_layer_ordering_info_present_flag
        writer.write_uvlc(3);
        writer.write_uvlc(0);
        writer.write_uvlc(0);
        writer.write_uvlc(0); // log2_min_luma_coding_block_size_minus3
        writer.write_uvlc(3); // log2_diff_max_min_luma_coding_block_size

        writer.finish()
    }

    #[test]
    fn parse_dimensions_and_poc_width() {
        let payload = build_sps_payload(1280, 1344, 4);
        let sps = Sps::parse(&payload).unwrap();

        assert_eq!(sps.pic_width_in_luma_samples, 1280);
        assert_eq!(sps.pic_height_in_luma_samples, 1344);
        assert_eq!(sps.log2_max_pic_order_cnt_lsb_minus4, 4);
        assert_eq!(sps.chroma_format_idc, 1);
        assert_eq!(sps.profile_tier_level.general_profile_idc, 1);
        assert_eq!(sps.profile_tier_level.level(), 4);
    }

    #[test]
    fn slice_address_width_follows_ctb_count() {
        let payload = build_sps_payload(1280, 1344, 4);
        let sps = Sps::parse(&payload).unwrap();

        // CTB size 64: 20 x 21 = 420 CTBs.
        assert_eq!(sps.slice_segment_address_bits(), vpcc_bitio::bits_needed(420));
    }

    #[test]
    fn rejects_non_sps_payload() {
        let payload = build_sps_payload(64, 64, 4);
        let mut wrong = payload.clone();
        wrong[0] = 0x40; // VPS NAL header

        assert!(Sps::parse(&wrong).is_err());
    }
}
