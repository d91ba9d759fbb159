use bytes::Bytes;
use nutype_enum::nutype_enum;
use vpcc_bitio::BitReader;

use crate::Result;
use crate::atlas::AtlasNalUnitType;

nutype_enum! {
    /// SEI payload types of the atlas substream.
    pub enum SeiPayloadType(u8) {
        BufferingPeriod = 0,
        AtlasFrameTiming = 1,
        FillerPayload = 2,
        UserDataRegisteredItuT35 = 3,
        UserDataUnregistered = 4,
        RecoveryPoint = 5,
        NoDisplay = 6,
        TimeCode = 7,
        RegionalNesting = 8,
        SeiManifest = 9,
        SeiPrefixIndication = 10,
        GeometryTransformationParams = 11,
        AttributeTransformationParams = 12,
        ActiveSubstreams = 13,
        ComponentCodecMapping = 14,
        VolumetricTilingInfo = 15,
        PresentationInformation = 16,
        SmoothingParameters = 17,
        ReservedSeiMessage = 18,
    }
}

/// Decoded forms of the SEI payloads the player inspects; everything else
/// is kept as raw bytes for the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeiPayload {
    RecoveryPoint {
        recovery_afoc: i32,
        exact_match_flag: bool,
        broken_link_flag: bool,
    },
    NoDisplay,
    UserDataUnregistered {
        uuid: [u8; 16],
        data: Bytes,
    },
    Raw(Bytes),
}

/// One SEI message of the atlas substream, prefix or suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeiMessage {
    pub nal_type: AtlasNalUnitType,
    pub payload_type: SeiPayloadType,
    pub payload: SeiPayload,
}

impl SeiMessage {
    /// Parses one SEI message: ff-escaped type and size accumulators,
    /// then the size-bounded payload.
    pub fn parse(reader: &mut BitReader<'_>, nal_type: AtlasNalUnitType) -> Result<Self> {
        let mut payload_type = 0u32;

        loop {
            let byte = reader.read_bits(8)?;
            payload_type += byte;

            if byte != 0xFF {
                break;
            }
        }

        let mut payload_size = 0usize;

        loop {
            let byte = reader.read_bits(8)?;
            payload_size += byte as usize;

            if byte != 0xFF {
                break;
            }
        }

        let payload_bytes = reader.read_slice(payload_size)?;
        let payload_type = SeiPayloadType::from(payload_type.min(255) as u8);

        let payload = match payload_type {
            SeiPayloadType::RecoveryPoint => {
                let mut payload_reader = BitReader::new(payload_bytes);

                SeiPayload::RecoveryPoint {
                    recovery_afoc: payload_reader.read_svlc()?,
                    exact_match_flag: payload_reader.read_bit()?,
                    broken_link_flag: payload_reader.read_bit()?,
                }
            }
            SeiPayloadType::NoDisplay => SeiPayload::NoDisplay,
            SeiPayloadType::UserDataUnregistered if payload_size >= 16 => {
                let mut uuid = [0u8; 16];
                uuid.copy_from_slice(&payload_bytes[..16]);

                SeiPayload::UserDataUnregistered {
                    uuid,
                    data: Bytes::copy_from_slice(&payload_bytes[16..]),
                }
            }
            _ => SeiPayload::Raw(Bytes::copy_from_slice(payload_bytes)),
        };

        Ok(Self {
            nal_type,
            payload_type,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use vpcc_bitio::BitWriter;

    use super::*;

    #[test]
    fn recovery_point_is_decoded() {
        let mut writer = BitWriter::new();
        writer.write_bits(5, 8); // payload type
        writer.write_bits(1, 8); // payload size
        writer.write_svlc(1); // recovery_afoc: "010"
        writer.write_bit(true);
        writer.write_bit(false);
        writer.align_to_byte();

        let data = writer.finish();
        let mut reader = BitReader::new(&data);

        let sei = SeiMessage::parse(&mut reader, AtlasNalUnitType::PrefixSei).unwrap();
        assert_eq!(sei.payload_type, SeiPayloadType::RecoveryPoint);
        assert_eq!(
            sei.payload,
            SeiPayload::RecoveryPoint {
                recovery_afoc: 1,
                exact_match_flag: true,
                broken_link_flag: false,
            }
        );
    }

    #[test]
    fn ff_escaped_size_is_accumulated() {
        let mut writer = BitWriter::new();
        writer.write_bits(18, 8); // reserved payload type
        writer.write_bits(0xFF, 8);
        writer.write_bits(2, 8); // size 255 + 2
        for _ in 0..257 {
            writer.write_bits(0xAB, 8);
        }

        let data = writer.finish();
        let mut reader = BitReader::new(&data);

        let sei = SeiMessage::parse(&mut reader, AtlasNalUnitType::SuffixSei).unwrap();
        match sei.payload {
            SeiPayload::Raw(bytes) => assert_eq!(bytes.len(), 257),
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
