use vpcc_bitio::BitReader;

use crate::Result;

/// Profile/tier/level of a V3C parameter set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VpccProfileTierLevel {
    pub tier_flag: bool,
    pub profile_codec_group_idc: u8,
    pub profile_pcc_toolset_idc: u8,
    pub profile_reconstruction_idc: u8,
    pub level_idc: u8,
}

impl VpccProfileTierLevel {
    pub fn parse(reader: &mut BitReader<'_>) -> Result<Self> {
        let tier_flag = reader.read_bit()?;
        let profile_codec_group_idc = reader.read_bits(7)? as u8;
        let profile_pcc_toolset_idc = reader.read_bits(8)? as u8;
        let profile_reconstruction_idc = reader.read_bits(8)? as u8;

        reader.skip_bits(32)?;

        let level_idc = reader.read_bits(8)? as u8;

        Ok(Self {
            tier_flag,
            profile_codec_group_idc,
            profile_pcc_toolset_idc,
            profile_reconstruction_idc,
            level_idc,
        })
    }
}

/// Occupancy video coding parameters of one atlas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OccupancyInformation {
    pub codec_id: u8,
    pub lossy_compression_threshold: u8,
    pub nominal_2d_bitdepth_minus1: u8,
    pub msb_align_flag: bool,
}

impl OccupancyInformation {
    pub fn parse(reader: &mut BitReader<'_>) -> Result<Self> {
        Ok(Self {
            codec_id: reader.read_bits(8)? as u8,
            lossy_compression_threshold: reader.read_bits(8)? as u8,
            nominal_2d_bitdepth_minus1: reader.read_bits(5)? as u8,
            msb_align_flag: reader.read_bit()?,
        })
    }
}

/// Geometry video coding parameters of one atlas.
///
/// `coordinates_3d_bitdepth_minus1` bounds the reconstructed depth range
/// and feeds the `max_3d_coordinate` term of patch depth reconstruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryInformation {
    pub codec_id: u8,
    pub nominal_2d_bitdepth_minus1: u8,
    pub msb_align_flag: bool,
    pub coordinates_3d_bitdepth_minus1: u8,
    pub raw_codec_id: u8,
}

impl GeometryInformation {
    pub fn parse(reader: &mut BitReader<'_>, raw_separate_video: bool) -> Result<Self> {
        let codec_id = reader.read_bits(8)? as u8;
        let nominal_2d_bitdepth_minus1 = reader.read_bits(5)? as u8;
        let msb_align_flag = reader.read_bit()?;
        let coordinates_3d_bitdepth_minus1 = reader.read_bits(5)? as u8;

        let raw_codec_id = if raw_separate_video {
            reader.read_bits(8)? as u8
        } else {
            0
        };

        Ok(Self {
            codec_id,
            nominal_2d_bitdepth_minus1,
            msb_align_flag,
            coordinates_3d_bitdepth_minus1,
            raw_codec_id,
        })
    }
}

/// One attribute of an atlas (texture, in every stream this player sees).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeInfo {
    pub type_id: u8,
    pub codec_id: u8,
    pub raw_codec_id: u8,
    pub map_absolute_coding_enabled: Vec<bool>,
    pub dimension_minus1: u8,
    pub dimension_partitions_minus1: u8,
    pub partition_channels_minus1: Vec<u32>,
    pub nominal_2d_bitdepth_minus1: u8,
}

/// Per-atlas attribute list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeInformation {
    pub attributes: Vec<AttributeInfo>,
    pub msb_align_flag: bool,
}

impl AttributeInformation {
    pub fn parse(
        reader: &mut BitReader<'_>,
        raw_separate_video: bool,
        map_count_minus1: u8,
        map_absolute_coding_enable: &[bool],
    ) -> Result<Self> {
        let attribute_count = reader.read_bits(7)? as usize;

        let mut attributes = Vec::with_capacity(attribute_count);

        for _ in 0..attribute_count {
            let type_id = reader.read_bits(4)? as u8;
            let codec_id = reader.read_bits(8)? as u8;

            let raw_codec_id = if raw_separate_video {
                reader.read_bits(8)? as u8
            } else {
                0
            };

            let mut map_absolute_coding_enabled = vec![true];

            for map in 0..map_count_minus1 as usize {
                if map_absolute_coding_enable.get(map).copied().unwrap_or(true) {
                    map_absolute_coding_enabled.push(true);
                } else {
                    map_absolute_coding_enabled.push(reader.read_bit()?);
                }
            }

            let dimension_minus1 = reader.read_bits(6)? as u8;

            let mut dimension_partitions_minus1 = 0u8;
            let mut partition_channels_minus1 = Vec::new();

            if dimension_minus1 > 0 {
                dimension_partitions_minus1 = reader.read_bits(6)? as u8;

                let mut remaining = i32::from(dimension_minus1);
                let partitions = dimension_partitions_minus1 as usize;

                for j in 0..partitions {
                    let channels = if (partitions - j) as i32 == remaining {
                        0
                    } else {
                        reader.read_uvlc()?
                    };

                    partition_channels_minus1.push(channels);
                    remaining -= channels as i32 + 1;
                }

                partition_channels_minus1.push(remaining.max(0) as u32);
            }

            let nominal_2d_bitdepth_minus1 = reader.read_bits(5)? as u8;

            attributes.push(AttributeInfo {
                type_id,
                codec_id,
                raw_codec_id,
                map_absolute_coding_enabled,
                dimension_minus1,
                dimension_partitions_minus1,
                partition_channels_minus1,
                nominal_2d_bitdepth_minus1,
            });
        }

        let msb_align_flag = if attribute_count > 0 {
            reader.read_bit()?
        } else {
            false
        };

        Ok(Self {
            attributes,
            msb_align_flag,
        })
    }
}

/// Per-atlas parameters of the V3C parameter set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtlasInfo {
    pub frame_width: u16,
    pub frame_height: u16,
    pub map_count_minus1: u8,
    pub multiple_map_streams_present_flag: bool,
    pub map_absolute_coding_enable: Vec<bool>,
    pub map_predictor_index_diff: Vec<u32>,
    pub raw_patch_enabled_flag: bool,
    pub raw_separate_video_present_flag: bool,
    pub occupancy_information: OccupancyInformation,
    pub geometry_information: GeometryInformation,
    pub attribute_information: AttributeInformation,
}

/// The V3C parameter set (VPS).
///
/// Opens every frame group and configures everything downstream: frame
/// dimensions, map layout, and the three codec parameter blocks. The
/// trailing `lossless_geo*`/`min_level` fields sit outside the CD syntax
/// but are emitted by the encoder this format comes from; `min_level` in
/// particular scales every reconstructed patch depth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VpccParameterSet {
    pub profile_tier_level: VpccProfileTierLevel,
    pub vps_id: u8,
    pub atlases: Vec<AtlasInfo>,
    pub extension_data: Vec<u8>,
    pub lossless_geo_444: bool,
    pub lossless_geo: bool,
    pub min_level: u8,
}

impl VpccParameterSet {
    pub fn parse(reader: &mut BitReader<'_>) -> Result<Self> {
        let profile_tier_level = VpccProfileTierLevel::parse(reader)?;

        let vps_id = reader.read_bits(4)? as u8;
        let atlas_count_minus1 = reader.read_bits(6)? as usize;

        let mut atlases = Vec::with_capacity(atlas_count_minus1 + 1);

        for _ in 0..=atlas_count_minus1 {
            let frame_width = reader.read_bits(16)? as u16;
            let frame_height = reader.read_bits(16)? as u16;
            let map_count_minus1 = reader.read_bits(4)? as u8;

            let multiple_map_streams_present_flag = if map_count_minus1 > 0 {
                reader.read_bit()?
            } else {
                false
            };

            let mut map_absolute_coding_enable = vec![true];
            let mut map_predictor_index_diff = vec![0u32];

            for i in 1..=map_count_minus1 as usize {
                let absolute = if multiple_map_streams_present_flag {
                    reader.read_bit()?
                } else {
                    true
                };

                map_absolute_coding_enable.push(absolute);

                let predictor = if !absolute && i > 0 {
                    reader.read_uvlc()?
                } else {
                    0
                };

                map_predictor_index_diff.push(predictor);
            }

            let raw_patch_enabled_flag = reader.read_bit()?;

            let raw_separate_video_present_flag = if raw_patch_enabled_flag {
                reader.read_bit()?
            } else {
                false
            };

            let occupancy_information = OccupancyInformation::parse(reader)?;
            let geometry_information =
                GeometryInformation::parse(reader, raw_separate_video_present_flag)?;
            let attribute_information = AttributeInformation::parse(
                reader,
                raw_separate_video_present_flag,
                map_count_minus1,
                &map_absolute_coding_enable,
            )?;

            atlases.push(AtlasInfo {
                frame_width,
                frame_height,
                map_count_minus1,
                multiple_map_streams_present_flag,
                map_absolute_coding_enable,
                map_predictor_index_diff,
                raw_patch_enabled_flag,
                raw_separate_video_present_flag,
                occupancy_information,
                geometry_information,
                attribute_information,
            });
        }

        let extension_present_flag = reader.read_bit()?;

        let mut extension_data = Vec::new();

        if extension_present_flag {
            let extension_length = reader.read_uvlc()? as usize;
            extension_data.reserve(extension_length);

            for _ in 0..extension_length {
                extension_data.push(reader.read_bits(8)? as u8);
            }
        }

        let lossless_geo_444 = reader.read_bit()?;
        let lossless_geo = reader.read_bit()?;
        let min_level = reader.read_bits(8)? as u8;

        byte_alignment(reader)?;

        Ok(Self {
            profile_tier_level,
            vps_id,
            atlases,
            extension_data,
            lossless_geo_444,
            lossless_geo,
            min_level,
        })
    }
}

/// Consumes the stop bit and zero padding up to the next byte boundary.
pub(crate) fn byte_alignment(reader: &mut BitReader<'_>) -> Result<()> {
    reader.read_bit()?;

    while !reader.is_aligned() {
        reader.read_bit()?;
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use vpcc_bitio::BitWriter;

    use super::*;

    /// Writes a minimal single-atlas VPS payload. Shared with the parser
    /// tests.
    pub(crate) fn write_vps(writer: &mut BitWriter, vps_id: u32, width: u32, height: u32, min_level: u32) {
        // Profile/tier/level.
        writer.write_bit(false);
        writer.write_bits(0, 7);
        writer.write_bits(0, 8);
        writer.write_bits(0, 8);
        writer.write_bits(0, 32);
        writer.write_bits(30, 8);

        writer.write_bits(vps_id, 4);
        writer.write_bits(0, 6); // atlas_count_minus1

        writer.write_bits(width, 16);
        writer.write_bits(height, 16);
        writer.write_bits(0, 4); // map_count_minus1
        writer.write_bit(false); // raw_patch_enabled_flag

        // Occupancy information.
        writer.write_bits(0, 8);
        writer.write_bits(0, 8);
        writer.write_bits(7, 5);
        writer.write_bit(false);

        // Geometry information.
        writer.write_bits(0, 8);
        writer.write_bits(9, 5); // nominal 2d bitdepth minus 1
        writer.write_bit(false);
        writer.write_bits(9, 5); // 3d coordinates bitdepth minus 1

        // Attribute information: one texture attribute.
        writer.write_bits(1, 7);
        writer.write_bits(0, 4); // type_id
        writer.write_bits(0, 8); // codec_id
        writer.write_bits(2, 6); // dimension_minus1
        writer.write_bits(0, 6); // dimension_partitions_minus1
        writer.write_bits(7, 5); // nominal 2d bitdepth minus 1
        writer.write_bit(false); // msb_align_flag

        writer.write_bit(false); // extension_present_flag

        writer.write_bit(false); // lossless_geo_444
        writer.write_bit(false); // lossless_geo
        writer.write_bits(min_level, 8);

        // Byte alignment: stop bit plus padding.
        writer.write_bit(true);
        writer.align_to_byte();
    }

    #[test]
    fn single_atlas_round_trip() {
        let mut writer = BitWriter::new();
        write_vps(&mut writer, 3, 1280, 1344, 64);
        let data = writer.finish();

        let mut reader = BitReader::new(&data);
        let vps = VpccParameterSet::parse(&mut reader).unwrap();

        assert_eq!(vps.vps_id, 3);
        assert_eq!(vps.atlases.len(), 1);
        assert_eq!(vps.atlases[0].frame_width, 1280);
        assert_eq!(vps.atlases[0].frame_height, 1344);
        assert_eq!(vps.atlases[0].geometry_information.coordinates_3d_bitdepth_minus1, 9);
        assert_eq!(vps.atlases[0].attribute_information.attributes.len(), 1);
        assert_eq!(vps.atlases[0].attribute_information.attributes[0].dimension_minus1, 2);
        assert_eq!(vps.min_level, 64);
        assert_eq!(reader.bytes_available(), 0);
    }
}
