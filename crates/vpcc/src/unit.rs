use nutype_enum::nutype_enum;
use tracing::warn;
use vpcc_bitio::BitReader;

use crate::Result;
use crate::container::read_sized;

nutype_enum! {
    /// V-PCC unit types. Types 5 through 31 are reserved.
    pub enum V3cUnitType(u8) {
        /// V3C parameter set
        Vps = 0,
        /// Atlas data (a nested sample stream of atlas NAL units)
        Ad = 1,
        /// Occupancy video data
        Ovd = 2,
        /// Geometry video data
        Gvd = 3,
        /// Attribute video data
        Avd = 4,
    }
}

impl V3cUnitType {
    /// Units whose payload is a raw HEVC byte stream.
    pub const fn is_video(&self) -> bool {
        matches!(*self, Self::Ovd | Self::Gvd | Self::Avd)
    }
}

/// The type-dependent header in front of every V-PCC unit payload.
///
/// The header occupies exactly 32 bits after the sample-stream size
/// prefix: a 5-bit type, then per-type fields padded with reserved bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct V3cUnitHeader {
    pub unit_type: V3cUnitType,
    /// Payload size declared by the sample-stream prefix, header included.
    pub unit_size: usize,
    pub sps_id: u8,
    pub atlas_id: u8,
    pub attribute_index: u8,
    pub attribute_dimension_index: u8,
    pub map_index: u8,
    pub raw_video_flag: bool,
}

impl V3cUnitHeader {
    /// Parses the size prefix and the 32-bit unit header.
    pub fn parse(reader: &mut BitReader<'_>, precision_bytes: usize) -> Result<Self> {
        let unit_size = read_sized(reader, precision_bytes)? as usize;

        let unit_type = V3cUnitType::from(reader.read_bits(5)? as u8);

        let mut header = Self {
            unit_type,
            unit_size,
            sps_id: 0,
            atlas_id: 0,
            attribute_index: 0,
            attribute_dimension_index: 0,
            map_index: 0,
            raw_video_flag: false,
        };

        match unit_type {
            V3cUnitType::Avd => {
                header.sps_id = reader.read_bits(4)? as u8;
                header.atlas_id = reader.read_bits(6)? as u8;
                header.attribute_index = reader.read_bits(7)? as u8;
                header.attribute_dimension_index = reader.read_bits(5)? as u8;
                header.map_index = reader.read_bits(4)? as u8;
                header.raw_video_flag = reader.read_bit()?;
            }
            V3cUnitType::Gvd => {
                header.sps_id = reader.read_bits(4)? as u8;
                header.atlas_id = reader.read_bits(6)? as u8;
                header.map_index = reader.read_bits(4)? as u8;
                header.raw_video_flag = reader.read_bit()?;
                reserved(reader, 12)?;
            }
            V3cUnitType::Ovd | V3cUnitType::Ad => {
                header.sps_id = reader.read_bits(4)? as u8;
                header.atlas_id = reader.read_bits(6)? as u8;
                reserved(reader, 17)?;
            }
            _ => {
                reserved(reader, 27)?;
            }
        }

        Ok(header)
    }
}

fn reserved(reader: &mut BitReader<'_>, count: usize) -> Result<()> {
    let value = reader.read_bits(count)?;

    if value != 0 {
        warn!(count, value, "non-zero reserved bits in V-PCC unit header");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use vpcc_bitio::BitWriter;

    use super::*;

    #[test]
    fn avd_header_fields() {
        let mut writer = BitWriter::new();
        writer.write_bits(40, 24); // 3-byte size prefix
        writer.write_bits(4, 5); // AVD
        writer.write_bits(2, 4); // sps_id
        writer.write_bits(0, 6); // atlas_id
        writer.write_bits(1, 7); // attribute_index
        writer.write_bits(0, 5); // attribute_dimension_index
        writer.write_bits(1, 4); // map_index
        writer.write_bit(true); // raw_video_flag

        let data = writer.finish();
        let mut reader = BitReader::new(&data);

        let header = V3cUnitHeader::parse(&mut reader, 3).unwrap();
        assert_eq!(header.unit_type, V3cUnitType::Avd);
        assert_eq!(header.unit_size, 40);
        assert_eq!(header.sps_id, 2);
        assert_eq!(header.attribute_index, 1);
        assert_eq!(header.map_index, 1);
        assert!(header.raw_video_flag);

        // The header consumes exactly 32 bits after the size prefix.
        assert_eq!(reader.position(), 7);
    }

    #[test]
    fn vps_header_pads_to_32_bits() {
        let mut writer = BitWriter::new();
        writer.write_bits(12, 8); // 1-byte size prefix
        writer.write_bits(0, 5); // VPS
        writer.write_bits(0, 27);

        let data = writer.finish();
        let mut reader = BitReader::new(&data);

        let header = V3cUnitHeader::parse(&mut reader, 1).unwrap();
        assert_eq!(header.unit_type, V3cUnitType::Vps);
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn reserved_unit_type_is_representable() {
        let mut writer = BitWriter::new();
        writer.write_bits(0, 8);
        writer.write_bits(17, 5);
        writer.write_bits(0, 27);

        let data = writer.finish();
        let mut reader = BitReader::new(&data);

        let header = V3cUnitHeader::parse(&mut reader, 1).unwrap();
        assert_eq!(header.unit_type, V3cUnitType(17));
        assert!(!header.unit_type.is_video());
    }
}
