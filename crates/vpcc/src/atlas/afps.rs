use vpcc_bitio::{BitReader, fixed_length_code_bits_count};

use crate::Result;
use crate::vps::byte_alignment;

/// Tile layout of an atlas frame. Conformant single-tile streams carry
/// just the three flags; the multi-tile fields exist for completeness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlasFrameTileInformation {
    pub single_tile_in_atlas_frame_flag: bool,
    pub uniform_tile_spacing_flag: bool,
    pub num_tile_columns_minus1: u32,
    pub num_tile_rows_minus1: u32,
    pub tile_column_width_minus1: Vec<u32>,
    pub tile_row_height_minus1: Vec<u32>,
    pub single_tile_per_tile_group_flag: bool,
    pub num_tile_groups_in_atlas_frame_minus1: u32,
    pub top_left_tile_idx: Vec<u32>,
    pub bottom_right_tile_idx_delta: Vec<u32>,
    pub signalled_tile_group_id_flag: bool,
    pub signalled_tile_group_id_length_minus1: u32,
    pub tile_group_id: Vec<u32>,
}

impl Default for AtlasFrameTileInformation {
    fn default() -> Self {
        Self {
            single_tile_in_atlas_frame_flag: false,
            uniform_tile_spacing_flag: false,
            num_tile_columns_minus1: 0,
            num_tile_rows_minus1: 0,
            tile_column_width_minus1: vec![0],
            tile_row_height_minus1: vec![0],
            single_tile_per_tile_group_flag: false,
            num_tile_groups_in_atlas_frame_minus1: 0,
            top_left_tile_idx: vec![0],
            bottom_right_tile_idx_delta: vec![0],
            signalled_tile_group_id_flag: false,
            signalled_tile_group_id_length_minus1: 0,
            tile_group_id: vec![0],
        }
    }
}

impl AtlasFrameTileInformation {
    pub fn parse(reader: &mut BitReader<'_>) -> Result<Self> {
        let mut afti = Self::default();

        afti.single_tile_in_atlas_frame_flag = reader.read_bit()?;

        if !afti.single_tile_in_atlas_frame_flag {
            afti.uniform_tile_spacing_flag = reader.read_bit()?;

            if afti.uniform_tile_spacing_flag {
                afti.tile_column_width_minus1[0] = reader.read_uvlc()?;
                afti.tile_row_height_minus1[0] = reader.read_uvlc()?;
            } else {
                afti.num_tile_columns_minus1 = reader.read_uvlc()?;
                afti.num_tile_rows_minus1 = reader.read_uvlc()?;

                afti.tile_column_width_minus1
                    .resize(afti.num_tile_columns_minus1.max(1) as usize, 0);
                afti.tile_row_height_minus1
                    .resize(afti.num_tile_rows_minus1.max(1) as usize, 0);

                for i in 0..afti.num_tile_columns_minus1 as usize {
                    afti.tile_column_width_minus1[i] = reader.read_uvlc()?;
                }

                for i in 0..afti.num_tile_rows_minus1 as usize {
                    afti.tile_row_height_minus1[i] = reader.read_uvlc()?;
                }
            }
        }

        afti.single_tile_per_tile_group_flag = reader.read_bit()?;

        if !afti.single_tile_per_tile_group_flag {
            let num_tiles = (afti.num_tile_columns_minus1 + 1) * (afti.num_tile_rows_minus1 + 1);

            afti.num_tile_groups_in_atlas_frame_minus1 = reader.read_uvlc()?;

            let groups = afti.num_tile_groups_in_atlas_frame_minus1 as usize + 1;
            afti.top_left_tile_idx.resize(groups, 0);
            afti.bottom_right_tile_idx_delta.resize(groups, 0);

            for i in 0..groups {
                if i > 0 {
                    let bits = fixed_length_code_bits_count(num_tiles + 1) as usize;
                    afti.top_left_tile_idx[i] = reader.read_bits(bits)?;
                }

                let bits =
                    fixed_length_code_bits_count(num_tiles - afti.top_left_tile_idx[i] + 1) as usize;
                afti.bottom_right_tile_idx_delta[i] = reader.read_bits(bits)?;
            }
        }

        afti.signalled_tile_group_id_flag = reader.read_bit()?;

        if afti.signalled_tile_group_id_flag {
            afti.signalled_tile_group_id_length_minus1 = reader.read_uvlc()?;

            let entries = afti.signalled_tile_group_id_length_minus1 as usize + 1;
            afti.tile_group_id.resize(entries.max(1), 0);

            for i in 0..entries {
                let bits = afti.signalled_tile_group_id_length_minus1 as usize + 1;
                afti.tile_group_id[i] = reader.read_bits(bits)?;
            }
        }

        Ok(afti)
    }
}

/// The atlas frame parameter set. The bit-count fields govern the
/// fixed-width reads inside patch data units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Afps {
    pub afps_id: u32,
    pub asps_id: u32,
    pub tile_information: AtlasFrameTileInformation,
    pub num_ref_idx_default_active_minus1: u32,
    pub additional_lt_afoc_lsb_len: u32,
    pub pos_2d_x_bit_count_minus1: u8,
    pub pos_2d_y_bit_count_minus1: u8,
    pub pos_3d_x_bit_count_minus1: u8,
    pub pos_3d_y_bit_count_minus1: u8,
    pub override_eom_for_depth_flag: bool,
    pub eom_number_of_patch_bit_count_minus1: u8,
    pub eom_max_bit_count_minus1: u8,
    pub raw_3d_pos_bit_count_explicit_mode_flag: bool,
    pub lod_mode_enable_flag: bool,
}

impl Afps {
    pub fn parse(reader: &mut BitReader<'_>) -> Result<Self> {
        let mut afps = Self::default();

        afps.afps_id = reader.read_uvlc()?;
        afps.asps_id = reader.read_uvlc()?;

        afps.tile_information = AtlasFrameTileInformation::parse(reader)?;

        afps.num_ref_idx_default_active_minus1 = reader.read_uvlc()?;
        afps.additional_lt_afoc_lsb_len = reader.read_uvlc()?;
        afps.pos_2d_x_bit_count_minus1 = reader.read_bits(4)? as u8;
        afps.pos_2d_y_bit_count_minus1 = reader.read_bits(4)? as u8;
        afps.pos_3d_x_bit_count_minus1 = reader.read_bits(5)? as u8;
        afps.pos_3d_y_bit_count_minus1 = reader.read_bits(5)? as u8;
        afps.override_eom_for_depth_flag = reader.read_bit()?;

        if afps.override_eom_for_depth_flag {
            afps.eom_number_of_patch_bit_count_minus1 = reader.read_bits(4)? as u8;
            afps.eom_max_bit_count_minus1 = reader.read_bits(4)? as u8;
        }

        afps.raw_3d_pos_bit_count_explicit_mode_flag = reader.read_bit()?;

        // afps_extension_present_flag; no extensions are defined.
        reader.read_bit()?;

        byte_alignment(reader)?;

        Ok(afps)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use vpcc_bitio::BitWriter;

    use super::*;

    /// Writes a minimal single-tile AFPS RBSP.
    pub(crate) fn write_afps(
        writer: &mut BitWriter,
        pos_2d_bits_minus1: u32,
        pos_3d_bits_minus1: u32,
    ) {
        writer.write_uvlc(0); // afps_id
        writer.write_uvlc(0); // asps_id

        // Tile information: single tile, single tile per group, no ids.
        writer.write_bit(true);
        writer.write_bit(true);
        writer.write_bit(false);

        writer.write_uvlc(0); // num_ref_idx_default_active_minus1
        writer.write_uvlc(0); // additional_lt_afoc_lsb_len
        writer.write_bits(pos_2d_bits_minus1, 4);
        writer.write_bits(pos_2d_bits_minus1, 4);
        writer.write_bits(pos_3d_bits_minus1, 5);
        writer.write_bits(pos_3d_bits_minus1, 5);
        writer.write_bit(false); // override_eom_for_depth_flag
        writer.write_bit(false); // raw_3d_pos_bit_count_explicit_mode_flag
        writer.write_bit(false); // afps_extension_present_flag

        writer.write_bit(true);
        writer.align_to_byte();
    }

    #[test]
    fn minimal_afps_round_trip() {
        let mut writer = BitWriter::new();
        write_afps(&mut writer, 7, 9);
        let data = writer.finish();

        let mut reader = BitReader::new(&data);
        let afps = Afps::parse(&mut reader).unwrap();

        assert_eq!(afps.pos_2d_x_bit_count_minus1, 7);
        assert_eq!(afps.pos_3d_y_bit_count_minus1, 9);
        assert!(afps.tile_information.single_tile_in_atlas_frame_flag);
        assert!(!afps.raw_3d_pos_bit_count_explicit_mode_flag);
        assert_eq!(reader.bytes_available(), 0);
    }
}
