use vpcc_bitio::BitReader;

use crate::nal::read_nal_unit_header;
use crate::pps::Pps;
use crate::sps::Sps;
use crate::{Error, NALUnitType, Result};

/// A slice segment header, parsed through `slice_pic_order_cnt_lsb`.
///
/// ISO/IEC 23008-2 - 7.3.6.1. The splitter only needs the POC to key
/// video packets; the remainder of the header and the slice payload are
/// never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceHeader {
    pub nal_type: NALUnitType,
    pub first_slice_segment_in_pic_flag: bool,
    pub dependent_slice_segment_flag: bool,
    pub slice_pic_parameter_set_id: u32,
    pub slice_type: u32,
    /// Display-order index of the coded picture. 0 for IDR slices, which
    /// carry no POC field.
    pub slice_pic_order_cnt_lsb: u32,
}

impl SliceHeader {
    /// Parses a slice NAL unit (start code stripped, NAL header included)
    /// against the parameter sets seen earlier in the stream.
    pub fn parse(payload: &[u8], sps_set: &[Option<Sps>], pps_set: &[Option<Pps>]) -> Result<Self> {
        let mut reader = BitReader::with_emulation_prevention(payload);

        let nal_type = read_nal_unit_header(&mut reader)?;

        let first_slice_segment_in_pic_flag = reader.read_bit()?;

        if nal_type.is_irap() {
            reader.read_bit()?; // no_output_of_prior_pics_flag
        }

        let slice_pic_parameter_set_id = reader.read_uvlc()?;

        let pps = pps_set
            .get(slice_pic_parameter_set_id as usize)
            .and_then(Option::as_ref)
            .ok_or(Error::UnknownParameterSet {
                kind: "PPS",
                id: slice_pic_parameter_set_id,
            })?;

        let sps = sps_set
            .get(pps.pps_seq_parameter_set_id as usize)
            .and_then(Option::as_ref)
            .ok_or(Error::UnknownParameterSet {
                kind: "SPS",
                id: pps.pps_seq_parameter_set_id,
            })?;

        let mut dependent_slice_segment_flag = false;

        if !first_slice_segment_in_pic_flag {
            if pps.dependent_slice_segments_enabled_flag {
                dependent_slice_segment_flag = reader.read_bit()?;
            }

            reader.read_bits(sps.slice_segment_address_bits())?;
        }

        let mut slice_type = 0;
        let mut slice_pic_order_cnt_lsb = 0;

        if !dependent_slice_segment_flag {
            if pps.num_extra_slice_header_bits > 0 {
                reader.read_bits(pps.num_extra_slice_header_bits as usize)?;
            }

            slice_type = reader.read_uvlc()?;

            // 0 = B, 1 = P, 2 = I.
            if slice_type > 2 {
                return Err(Error::InvalidSliceType(slice_type));
            }

            if pps.output_flag_present_flag {
                reader.read_bit()?; // pic_output_flag
            }

            if sps.separate_colour_plane_flag {
                reader.read_bits(2)?; // colour_plane_id
            }

            if !nal_type.is_idr() {
                slice_pic_order_cnt_lsb =
                    reader.read_bits((sps.log2_max_pic_order_cnt_lsb_minus4 + 4) as usize)?;
            }
        }

        Ok(Self {
            nal_type,
            first_slice_segment_in_pic_flag,
            dependent_slice_segment_flag,
            slice_pic_parameter_set_id,
            slice_type,
            slice_pic_order_cnt_lsb,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use vpcc_bitio::BitWriter;

    use super::*;
    use crate::pps::tests::build_pps_payload;
    use crate::sps::tests::build_sps_payload;

    /// Builds a slice NAL payload (NAL header included, no start code).
    /// `nal_type` 19/20 produce IDR slices without a POC field.
    pub(crate) fn build_slice_payload(nal_type: u8, poc: u32, poc_bits: usize) -> Vec<u8> {
        let mut writer = BitWriter::new();

        writer.write_bit(false);
        writer.write_bits(u32::from(nal_type), 6);
        writer.write_bits(0, 6);
        writer.write_bits(1, 3);

        writer.write_bit(true); // first_slice_segment_in_pic_flag

        let irap = (16..=23).contains(&nal_type);
        if irap {
            writer.write_bit(false); // no_output_of_prior_pics_flag
        }

        writer.write_uvlc(0); // slice_pic_parameter_set_id
        writer.write_uvlc(2); // slice_type: I

        let idr = nal_type == 19 || nal_type == 20;
        if !idr {
            writer.write_bits(poc, poc_bits);
        }

        // Trailing filler standing in for the rest of the header.
        writer.write_bits(0xFF, 8);

        writer.finish()
    }

    fn parameter_sets() -> (Vec<Option<Sps>>, Vec<Option<Pps>>) {
        let sps = Sps::parse(&build_sps_payload(1280, 1344, 4)).unwrap();
        let pps = Pps::parse(&build_pps_payload()).unwrap();

        let mut sps_set = vec![None; 16];
        sps_set[0] = Some(sps);
        let mut pps_set = vec![None; 64];
        pps_set[0] = Some(pps);

        (sps_set, pps_set)
    }

    #[test]
    fn trailing_slice_carries_poc() {
        let (sps_set, pps_set) = parameter_sets();

        let payload = build_slice_payload(1, 25, 8);
        let slice = SliceHeader::parse(&payload, &sps_set, &pps_set).unwrap();

        assert_eq!(slice.nal_type, NALUnitType::TrailR);
        assert_eq!(slice.slice_type, 2);
        assert_eq!(slice.slice_pic_order_cnt_lsb, 25);
    }

    #[test]
    fn idr_slice_resets_poc() {
        let (sps_set, pps_set) = parameter_sets();

        let payload = build_slice_payload(19, 99, 8);
        let slice = SliceHeader::parse(&payload, &sps_set, &pps_set).unwrap();

        assert_eq!(slice.nal_type, NALUnitType::IdrWRadl);
        assert_eq!(slice.slice_pic_order_cnt_lsb, 0);
    }

    #[test]
    fn unknown_pps_is_reported() {
        let sps_set = vec![None; 16];
        let pps_set = vec![None; 64];

        let payload = build_slice_payload(1, 0, 8);
        assert!(matches!(
            SliceHeader::parse(&payload, &sps_set, &pps_set),
            Err(Error::UnknownParameterSet { kind: "PPS", .. })
        ));
    }
}
