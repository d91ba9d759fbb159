use vpcc_bitio::BitReader;

use crate::nal::read_nal_unit_header;
use crate::profile_tier_level::ProfileTierLevel;
use crate::{Error, NALUnitType, Result};

/// The HEVC video parameter set, parsed through its profile/tier/level
/// block.
///
/// ISO/IEC 23008-2 - 7.3.2.1. The player reports codec capability from
/// this block when configuring hardware decoders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vps {
    /// The id of this VPS, 4 bits.
    pub vps_video_parameter_set_id: u8,
    pub vps_max_layers_minus1: u8,
    pub vps_max_sub_layers_minus1: u8,
    pub vps_temporal_id_nesting_flag: bool,
    pub profile_tier_level: ProfileTierLevel,
}

impl Vps {
    /// Parses a VPS NAL unit (start code stripped, NAL header included).
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut reader = BitReader::with_emulation_prevention(payload);

        let nal_type = read_nal_unit_header(&mut reader)?;
        if nal_type != NALUnitType::VpsNut {
            return Err(Error::MissingParameterSet("VPS"));
        }

        let vps_video_parameter_set_id = reader.read_bits(4)? as u8;

        // vps_base_layer_internal_flag + vps_base_layer_available_flag
        reader.skip_bits(2)?;

        let vps_max_layers_minus1 = reader.read_bits(6)? as u8;
        let vps_max_sub_layers_minus1 = reader.read_bits(3)? as u8;
        let vps_temporal_id_nesting_flag = reader.read_bit()?;

        // vps_reserved_0xffff_16bits
        reader.skip_bits(16)?;

        let profile_tier_level = ProfileTierLevel::parse(&mut reader, vps_max_sub_layers_minus1)?;

        Ok(Self {
            vps_video_parameter_set_id,
            vps_max_layers_minus1,
            vps_max_sub_layers_minus1,
            vps_temporal_id_nesting_flag,
            profile_tier_level,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use vpcc_bitio::BitWriter;

    use super::*;

    /// Builds a VPS NAL payload (NAL header included, no start code).
    pub(crate) fn build_vps_payload() -> Vec<u8> {
        let mut writer = BitWriter::new();

        // NAL unit header: VPS (32).
        writer.write_bit(false);
        writer.write_bits(32, 6);
        writer.write_bits(0, 6);
        writer.write_bits(1, 3);

        writer.write_bits(0, 4); // vps_video_parameter_set_id
        writer.write_bits(0b11, 2);
        writer.write_bits(0, 6); // vps_max_layers_minus1
        writer.write_bits(0, 3); // vps_max_sub_layers_minus1
        writer.write_bit(true); // vps_temporal_id_nesting_flag
        writer.write_bits(0xFFFF, 16);

        // General profile/tier/level: Main 10, level 5.0.
        writer.write_bits(0, 2);
        writer.write_bit(false);
        writer.write_bits(2, 5);
        writer.write_bits(1 << 29, 32);
        writer.write_bits(0b1000, 4);
        writer.write_bits(0, 32);
        writer.write_bits(0, 12);
        writer.write_bits(150, 8);

        writer.finish()
    }

    #[test]
    fn parse_through_profile_tier_level() {
        let vps = Vps::parse(&build_vps_payload()).unwrap();

        assert_eq!(vps.vps_video_parameter_set_id, 0);
        assert_eq!(vps.profile_tier_level.general_profile_idc, 2);
        assert_eq!(vps.profile_tier_level.profile_name(), "Main 10");
        assert_eq!(vps.profile_tier_level.level(), 5);
    }
}
