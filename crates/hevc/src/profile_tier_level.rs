use std::io;

use vpcc_bitio::BitReader;

/// The general profile/tier/level block shared by the HEVC VPS and SPS.
///
/// ISO/IEC 23008-2 - 7.3.3. Sub-layer entries are consumed to keep the
/// cursor correct but only their presence flags are retained; decoder
/// configuration never needs them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileTierLevel {
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    /// The 32 `general_profile_compatibility_flag[j]` bits, MSB-first.
    pub general_profile_compatibility_flags: u32,
    pub general_progressive_source_flag: bool,
    pub general_interlaced_source_flag: bool,
    pub general_non_packed_constraint_flag: bool,
    pub general_frame_only_constraint_flag: bool,
    pub general_level_idc: u8,
}

impl ProfileTierLevel {
    pub fn parse(reader: &mut BitReader<'_>, max_sub_layers_minus1: u8) -> io::Result<Self> {
        let general_profile_space = reader.read_bits(2)? as u8;
        let general_tier_flag = reader.read_bit()?;
        let general_profile_idc = reader.read_bits(5)? as u8;

        let general_profile_compatibility_flags = reader.read_bits(32)?;

        let general_progressive_source_flag = reader.read_bit()?;
        let general_interlaced_source_flag = reader.read_bit()?;
        let general_non_packed_constraint_flag = reader.read_bit()?;
        let general_frame_only_constraint_flag = reader.read_bit()?;

        // general_reserved_zero_43bits + general_inbld_flag
        reader.skip_bits(44)?;

        let general_level_idc = reader.read_bits(8)? as u8;

        let layers = max_sub_layers_minus1 as usize;
        let mut profile_present = vec![false; layers];
        let mut level_present = vec![false; layers];

        for i in 0..layers {
            profile_present[i] = reader.read_bit()?;
            level_present[i] = reader.read_bit()?;
        }

        if layers > 0 {
            for _ in layers..8 {
                reader.skip_bits(2)?;
            }
        }

        for i in 0..layers {
            if profile_present[i] {
                // Same shape as the general block, minus the level.
                reader.skip_bits(2 + 1 + 5)?;
                reader.skip_bits(32)?;
                reader.skip_bits(4)?;
                reader.skip_bits(44)?;
            }

            if level_present[i] {
                reader.skip_bits(8)?;
            }
        }

        Ok(Self {
            general_profile_space,
            general_tier_flag,
            general_profile_idc,
            general_profile_compatibility_flags,
            general_progressive_source_flag,
            general_interlaced_source_flag,
            general_non_packed_constraint_flag,
            general_frame_only_constraint_flag,
            general_level_idc,
        })
    }

    /// Human-readable profile name, for decoder configuration logging.
    pub const fn profile_name(&self) -> &'static str {
        match self.general_profile_idc {
            1 => "Main",
            2 => "Main 10",
            3 => "Main Still Picture",
            _ => "Unknown",
        }
    }

    /// Human-readable tier name, for decoder configuration logging.
    pub const fn tier_name(&self) -> &'static str {
        if self.general_tier_flag { "High" } else { "Main" }
    }

    /// The level as presented to users (`general_level_idc` is level * 30).
    pub const fn level(&self) -> u8 {
        self.general_level_idc / 30
    }
}

#[cfg(test)]
mod tests {
    use vpcc_bitio::BitWriter;

    use super::*;

    fn write_general_ptl(writer: &mut BitWriter, profile_idc: u32, tier: bool, level_idc: u32) {
        writer.write_bits(0, 2); // profile_space
        writer.write_bit(tier);
        writer.write_bits(profile_idc, 5);
        writer.write_bits(1 << (31 - profile_idc), 32); // compatibility flags
        writer.write_bits(0b1000, 4); // progressive source
        writer.write_bits(0, 32);
        writer.write_bits(0, 12); // 44 reserved bits total
        writer.write_bits(level_idc, 8);
    }

    #[test]
    fn general_block() {
        let mut writer = BitWriter::new();
        write_general_ptl(&mut writer, 1, false, 120);
        let data = writer.finish();

        let mut reader = BitReader::new(&data);
        let ptl = ProfileTierLevel::parse(&mut reader, 0).unwrap();

        assert_eq!(ptl.general_profile_idc, 1);
        assert!(!ptl.general_tier_flag);
        assert_eq!(ptl.general_level_idc, 120);
        assert!(ptl.general_progressive_source_flag);
        assert_eq!(ptl.profile_name(), "Main");
        assert_eq!(ptl.tier_name(), "Main");
        assert_eq!(ptl.level(), 4);
    }

    #[test]
    fn sub_layer_entries_are_consumed() {
        let mut writer = BitWriter::new();
        write_general_ptl(&mut writer, 2, true, 150);

        // Two sub-layers: first with profile + level, second with level only.
        writer.write_bit(true);
        writer.write_bit(true);
        writer.write_bit(false);
        writer.write_bit(true);
        writer.write_bits(0, 12); // alignment up to 8 * 2 bits

        writer.write_bits(0, 32);
        writer.write_bits(0, 32);
        writer.write_bits(0, 24); // 88-bit sub-layer profile block
        writer.write_bits(90, 8); // sub-layer level
        writer.write_bits(60, 8); // second sub-layer level

        writer.write_bits(0xA5, 8); // sentinel after the PTL

        let data = writer.finish();
        let mut reader = BitReader::new(&data);

        let ptl = ProfileTierLevel::parse(&mut reader, 2).unwrap();
        assert_eq!(ptl.general_profile_idc, 2);
        assert_eq!(ptl.tier_name(), "High");
        assert_eq!(reader.read_bits(8).unwrap(), 0xA5);
    }
}
