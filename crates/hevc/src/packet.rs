use tracing::warn;

use crate::nal::{NalUnit, find_frame_end};
use crate::pps::Pps;
use crate::slice::SliceHeader;
use crate::sps::Sps;
use crate::{NALUnitType, Result};

/// A byte range inside an HEVC stream buffer covering exactly one coded
/// picture: everything from the first NAL unit of its access unit through
/// the slice NAL (plus a directly following suffix SEI).
///
/// The first packet of a stream also carries the leading parameter-set NAL
/// units, so feeding packets to a decoder in order replays the stream
/// byte-exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoPacket {
    pub offset: usize,
    pub length: usize,
    pub slice_index: usize,
    pub picture_order_count: u32,
}

/// Splits a scanned stream into per-picture packets, keyed by the POC read
/// from each slice header.
///
/// Conformant V-PCC video substreams carry one slice per picture. When an
/// input deviates, subsequent slices with the same POC are folded into the
/// packet of their first slice, and a warning is logged.
pub fn split_into_packets(buf: &[u8], nal_units: &[NalUnit]) -> Result<Vec<VideoPacket>> {
    let mut sps_set: Vec<Option<Sps>> = vec![None; 16];
    let mut pps_set: Vec<Option<Pps>> = vec![None; 64];

    // Slice headers in stream order, keyed by NAL index.
    let mut slices: Vec<(usize, SliceHeader)> = Vec::new();

    for (index, nal_unit) in nal_units.iter().enumerate() {
        let payload = nal_unit.payload(buf);

        match nal_unit.nal_type {
            NALUnitType::SpsNut => {
                let sps = Sps::parse(payload)?;
                let sps_id = sps.sps_seq_parameter_set_id as usize;
                sps_set[sps_id] = Some(sps);
            }
            NALUnitType::PpsNut => {
                let pps = Pps::parse(payload)?;
                let pps_id = pps.pps_pic_parameter_set_id as usize;
                pps_set[pps_id] = Some(pps);
            }
            nal_type if nal_type.is_slice() => {
                match SliceHeader::parse(payload, &sps_set, &pps_set) {
                    Ok(slice) => slices.push((index, slice)),
                    Err(error) => {
                        // Best effort: the packet boundary survives even
                        // when the header does not parse.
                        warn!(offset = nal_unit.offset, %error, "malformed slice header");
                        slices.push((
                            index,
                            SliceHeader {
                                nal_type,
                                first_slice_segment_in_pic_flag: true,
                                dependent_slice_segment_flag: false,
                                slice_pic_parameter_set_id: 0,
                                slice_type: 0,
                                slice_pic_order_cnt_lsb: 0,
                            },
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    let mut packets = Vec::new();
    let mut slice_cursor = 0usize;
    let mut start_index = 0usize;

    while start_index < nal_units.len() && slice_cursor < slices.len() {
        let mut end_index = find_frame_end(start_index, nal_units);

        let (_, slice) = &slices[slice_cursor];
        let poc = slice.slice_pic_order_cnt_lsb;
        let slice_index = slice_cursor;
        slice_cursor += 1;

        // Fold additional same-POC slices of a multi-slice picture.
        while let Some((next_nal_index, next_slice)) = slices.get(slice_cursor) {
            if *next_nal_index != end_index + 1 || next_slice.slice_pic_order_cnt_lsb != poc {
                break;
            }

            warn!(poc, "multiple slices per picture; folding into one packet");

            end_index = find_frame_end(*next_nal_index, nal_units);
            slice_cursor += 1;
        }

        let start = nal_units[start_index];
        let end = nal_units[end_index];

        packets.push(VideoPacket {
            offset: start.offset,
            length: (end.offset - start.offset) + end.length,
            slice_index,
            picture_order_count: poc,
        });

        start_index = end_index + 1;
    }

    Ok(packets)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::nal::scan_nal_units;
    use crate::pps::tests::build_pps_payload;
    use crate::slice::tests::build_slice_payload;
    use crate::sps::tests::build_sps_payload;
    use crate::vps::tests::build_vps_payload;

    const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

    fn append_nal(stream: &mut Vec<u8>, payload: &[u8]) {
        stream.extend_from_slice(&START_CODE);
        stream.extend_from_slice(payload);
    }

    pub(crate) fn build_stream(pocs: &[u32]) -> Vec<u8> {
        let mut stream = Vec::new();

        append_nal(&mut stream, &build_vps_payload());
        append_nal(&mut stream, &build_sps_payload(1280, 1344, 4));
        append_nal(&mut stream, &build_pps_payload());

        for (i, &poc) in pocs.iter().enumerate() {
            if i == 0 {
                append_nal(&mut stream, &build_slice_payload(19, 0, 8));
            } else {
                append_nal(&mut stream, &build_slice_payload(1, poc, 8));
            }
        }

        stream
    }

    #[test]
    fn one_packet_per_picture() {
        let stream = build_stream(&[0, 1, 2, 3]);
        let nal_units = scan_nal_units(&stream);
        let packets = split_into_packets(&stream, &nal_units).unwrap();

        assert_eq!(packets.len(), 4);

        // The first packet starts at the VPS and spans the parameter sets.
        assert_eq!(packets[0].offset, 0);
        assert_eq!(packets[0].picture_order_count, 0);

        for (i, packet) in packets.iter().enumerate() {
            assert_eq!(packet.slice_index, i);
        }

        assert_eq!(packets[1].picture_order_count, 1);
        assert_eq!(packets[2].picture_order_count, 2);
        assert_eq!(packets[3].picture_order_count, 3);

        // Packets tile the stream without gaps.
        for pair in packets.windows(2) {
            assert_eq!(pair[0].offset + pair[0].length, pair[1].offset);
        }

        let last = packets.last().unwrap();
        assert_eq!(last.offset + last.length, stream.len());
    }

    #[test]
    fn suffix_sei_is_folded_into_the_packet() {
        let mut stream = build_stream(&[0]);

        // Suffix SEI (type 40), then one more picture.
        append_nal(&mut stream, &[0x50, 0x01, 0xAA]);
        append_nal(&mut stream, &build_slice_payload(1, 1, 8));

        let nal_units = scan_nal_units(&stream);
        let packets = split_into_packets(&stream, &nal_units).unwrap();

        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].offset + packets[0].length, packets[1].offset);
        assert_eq!(packets[1].picture_order_count, 1);
    }
}
