use vpcc_bitio::BitReader;

use crate::nal::read_nal_unit_header;
use crate::{Error, NALUnitType, Result};

/// The HEVC picture parameter set, parsed through the fields the slice
/// header references.
///
/// ISO/IEC 23008-2 - 7.3.2.3.1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pps {
    /// The id of this PPS, `[0, 63]`.
    pub pps_pic_parameter_set_id: u32,
    /// The id of the SPS this PPS activates, `[0, 15]`.
    pub pps_seq_parameter_set_id: u32,
    pub dependent_slice_segments_enabled_flag: bool,
    pub output_flag_present_flag: bool,
    pub num_extra_slice_header_bits: u8,
}

impl Pps {
    /// Parses a PPS NAL unit (start code stripped, NAL header included).
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut reader = BitReader::with_emulation_prevention(payload);

        let nal_type = read_nal_unit_header(&mut reader)?;
        if nal_type != NALUnitType::PpsNut {
            return Err(Error::MissingParameterSet("PPS"));
        }

        let pps_pic_parameter_set_id = reader.read_uvlc()?;
        if pps_pic_parameter_set_id > 63 {
            return Err(Error::ParameterSetIdOutOfRange {
                kind: "PPS",
                id: pps_pic_parameter_set_id,
            });
        }

        let pps_seq_parameter_set_id = reader.read_uvlc()?;
        if pps_seq_parameter_set_id > 15 {
            return Err(Error::ParameterSetIdOutOfRange {
                kind: "SPS",
                id: pps_seq_parameter_set_id,
            });
        }

        let dependent_slice_segments_enabled_flag = reader.read_bit()?;
        let output_flag_present_flag = reader.read_bit()?;
        let num_extra_slice_header_bits = reader.read_bits(3)? as u8;

        Ok(Self {
            pps_pic_parameter_set_id,
            pps_seq_parameter_set_id,
            dependent_slice_segments_enabled_flag,
            output_flag_present_flag,
            num_extra_slice_header_bits,
        })
    }
}
