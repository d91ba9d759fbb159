use tracing::warn;
use vpcc_bitio::BitReader;

use crate::NALUnitType;

/// One NAL unit located inside an Annex-B byte stream.
///
/// `offset` points at the start-code prefix; `length` covers the prefix,
/// the NAL unit header and the payload, up to the next start code (or the
/// end of the buffer for the last unit). `header_length` is the start-code
/// prefix length, 3 or 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit {
    pub nal_type: NALUnitType,
    pub offset: usize,
    pub length: usize,
    pub header_length: usize,
}

impl NalUnit {
    /// The byte range of the unit without its start-code prefix.
    pub fn payload<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.offset + self.header_length..self.offset + self.length]
    }
}

/// Scans an Annex-B byte stream for `00 00 01` / `00 00 00 01` start codes
/// and classifies each NAL unit by its header byte.
pub fn scan_nal_units(buf: &[u8]) -> Vec<NalUnit> {
    let mut units: Vec<NalUnit> = Vec::new();

    let mut i = 0usize;

    while i + 3 < buf.len() {
        let mut header_length = 0usize;

        if buf[i] == 0 && buf[i + 1] == 0 && buf[i + 2] == 1 {
            header_length = 3;
        } else if buf.len() - i >= 4 && buf[i] == 0 && buf[i + 1] == 0 && buf[i + 2] == 0 && buf[i + 3] == 1 {
            header_length = 4;
        }

        if header_length == 0 {
            i += 1;
            continue;
        }

        let mut header = BitReader::new(&buf[i + header_length..]);

        let nal_type = match header.read_bit() {
            Ok(false) => match header.read_bits(6) {
                Ok(value) => NALUnitType::from(value as u8),
                Err(_) => break,
            },
            Ok(true) => {
                warn!(offset = i, "forbidden_zero_bit set in NAL unit header");
                NALUnitType::from(header.read_bits(6).unwrap_or(0) as u8)
            }
            Err(_) => break,
        };

        units.push(NalUnit {
            nal_type,
            offset: i,
            length: 0,
            header_length,
        });

        i += header_length + 1;
    }

    // Lengths run to the next start code; the last unit takes the rest of
    // the buffer.
    for index in 0..units.len() {
        units[index].length = if index + 1 < units.len() {
            units[index + 1].offset - units[index].offset
        } else {
            buf.len() - units[index].offset
        };
    }

    units
}

/// Consumes the two-byte NAL unit header, returning the unit type.
pub(crate) fn read_nal_unit_header(reader: &mut BitReader<'_>) -> crate::Result<NALUnitType> {
    if reader.read_bit()? {
        return Err(crate::Error::ForbiddenZeroBit);
    }

    let nal_type = NALUnitType::from(reader.read_bits(6)? as u8);

    // nuh_layer_id and nuh_temporal_id_plus1
    reader.skip_bits(6)?;
    reader.skip_bits(3)?;

    Ok(nal_type)
}

/// Finds the index of the NAL unit that ends the access unit starting at
/// `start_index`: the first slice NAL, extended by one position when a
/// suffix SEI directly follows it.
pub fn find_frame_end(start_index: usize, nal_units: &[NalUnit]) -> usize {
    for i in start_index..nal_units.len() {
        if nal_units[i].nal_type.is_slice() {
            if let Some(next) = nal_units.get(i + 1) {
                if next.nal_type == NALUnitType::SuffixSeiNut {
                    return i + 1;
                }
            }

            return i;
        }
    }

    start_index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_mixed_start_codes() {
        // VPS (type 32) with a 4-byte start code, SPS (33) and an IDR
        // slice (19) with 3-byte start codes.
        #[rustfmt::skip]
        let buf = [
            0x00, 0x00, 0x00, 0x01, 0x40, 0x01, 0xAA, 0xBB, 0xCC,
            0x00, 0x00, 0x01, 0x42, 0x01, 0xAA, 0xBB, 0xCC,
            0x00, 0x00, 0x01, 0x26, 0x01, 0xAA, 0xBB, 0xCC,
        ];

        let units = scan_nal_units(&buf);
        assert_eq!(units.len(), 3);

        assert_eq!(units[0].nal_type, NALUnitType::VpsNut);
        assert_eq!(units[0].offset, 0);
        assert_eq!(units[0].header_length, 4);
        assert_eq!(units[0].length, 9);

        assert_eq!(units[1].nal_type, NALUnitType::SpsNut);
        assert_eq!(units[1].offset, 9);
        assert_eq!(units[1].header_length, 3);
        assert_eq!(units[1].length, 8);

        assert_eq!(units[2].nal_type, NALUnitType::IdrWRadl);
        assert_eq!(units[2].offset, 17);
        assert_eq!(units[2].header_length, 3);
        assert_eq!(units[2].length, 8);
    }

    #[test]
    fn frame_end_extends_over_suffix_sei() {
        #[rustfmt::skip]
        let buf = [
            0x00, 0x00, 0x01, 0x26, 0x01, 0xAA, // IDR slice
            0x00, 0x00, 0x01, 0x50, 0x01, 0xAA, // suffix SEI (type 40)
            0x00, 0x00, 0x01, 0x02, 0x01, 0xAA, // TRAIL_R slice (type 1)
        ];

        let units = scan_nal_units(&buf);
        assert_eq!(units.len(), 3);
        assert_eq!(units[1].nal_type, NALUnitType::SuffixSeiNut);

        assert_eq!(find_frame_end(0, &units), 1);
        assert_eq!(find_frame_end(2, &units), 2);
    }

    #[test]
    fn payload_strips_start_code() {
        let buf = [0x00, 0x00, 0x01, 0x40, 0x01, 0xAA];
        let units = scan_nal_units(&buf);

        assert_eq!(units[0].payload(&buf), &[0x40, 0x01, 0xAA]);
    }
}
