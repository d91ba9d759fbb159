use tracing::warn;
use vpcc_bitio::BitReader;

use crate::{Error, Result};

/// The container magic word, `23021981` decimal.
pub const CONTAINER_MAGIC: u32 = 0x015F_0E85;

/// The only container version ever produced.
pub const CONTAINER_VERSION: u32 = 1;

/// The TMC2 draft the bitstream was produced by.
///
/// Draft 8, 11 and 12.1 share one set of syntax tables; the data model is
/// identical across them and the atlas syntax did not change in ways this
/// player observes. Draft 6 predates the sample-stream framing and the
/// atlas NAL layer and is handled by the [`legacy`](crate::legacy) module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerVersion {
    Draft6,
    Draft8,
    Draft11,
    Draft121,
}

impl ContainerVersion {
    /// Draft 8 introduced the sample-stream unit framing; draft 6 packs
    /// V-PCC units back to back with sizes embedded in their payloads.
    pub const fn has_sample_stream_framing(&self) -> bool {
        !matches!(self, Self::Draft6)
    }
}

/// The fixed file header in front of the first V-PCC unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub magic: u32,
    pub version: u32,
    pub total_size: u64,
}

impl ContainerHeader {
    /// Parses the container header.
    ///
    /// The magic word is stored byte-swapped on the wire, so a big-endian
    /// read yields `0x850E5F01`; it is normalized to [`CONTAINER_MAGIC`]
    /// here. Version and total size are plain big-endian. Draft 6 wrote
    /// the 64-bit size field as 32 zero bits followed by a 32-bit size.
    pub fn parse(reader: &mut BitReader<'_>, version: ContainerVersion) -> Result<Self> {
        let raw_magic = reader.read_u32()?;

        if raw_magic.swap_bytes() != CONTAINER_MAGIC {
            return Err(Error::BadMagic(raw_magic));
        }

        let container_version = reader.read_u32()?;

        if container_version != CONTAINER_VERSION {
            return Err(Error::UnsupportedVersion(container_version));
        }

        let total_size = if version == ContainerVersion::Draft6 {
            reader.skip_bits(32)?;
            u64::from(reader.read_u32()?)
        } else {
            reader.read_u64()?
        };

        Ok(Self {
            magic: raw_magic.swap_bytes(),
            version: container_version,
            total_size,
        })
    }
}

/// The sample-stream header in front of the V-PCC units (draft 8+):
/// 3 bits of unit-size precision and 5 reserved bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleStreamHeader {
    pub unit_size_precision_bytes_minus1: u8,
}

impl SampleStreamHeader {
    pub fn parse(reader: &mut BitReader<'_>) -> Result<Self> {
        let unit_size_precision_bytes_minus1 = reader.read_bits(3)? as u8;

        let reserved = reader.read_bits(5)?;
        if reserved != 0 {
            warn!(reserved, "non-zero reserved bits in sample stream header");
        }

        Ok(Self {
            unit_size_precision_bytes_minus1,
        })
    }

    /// Number of bytes in front of every unit carrying its payload size.
    pub const fn precision_bytes(&self) -> usize {
        self.unit_size_precision_bytes_minus1 as usize + 1
    }
}

/// Reads a `bytes`-wide big-endian size prefix. Sample-stream precision
/// allows up to 8 bytes, which exceeds a single 32-bit bit-field read.
pub(crate) fn read_sized(reader: &mut BitReader<'_>, bytes: usize) -> Result<u64> {
    let mut value = 0u64;

    for _ in 0..bytes {
        value = (value << 8) | u64::from(reader.read_bits(8)?);
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_with_swapped_magic() {
        // magic (byte-swapped), version 1, total size 64.
        let data = [
            0x85, 0x0E, 0x5F, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x40,
        ];

        let mut reader = BitReader::new(&data);
        let header = ContainerHeader::parse(&mut reader, ContainerVersion::Draft8).unwrap();

        assert_eq!(header.magic, 0x015F_0E85);
        assert_eq!(header.version, 1);
        assert_eq!(header.total_size, 64);
    }

    #[test]
    fn draft6_size_is_32_bits() {
        let data = [
            0x85, 0x0E, 0x5F, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00,
        ];

        let mut reader = BitReader::new(&data);
        let header = ContainerHeader::parse(&mut reader, ContainerVersion::Draft6).unwrap();

        assert_eq!(header.total_size, 256);
    }

    #[test]
    fn wrong_magic_is_fatal() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut reader = BitReader::new(&data);

        assert!(matches!(
            ContainerHeader::parse(&mut reader, ContainerVersion::Draft8),
            Err(Error::BadMagic(0xDEADBEEF))
        ));
    }

    #[test]
    fn wrong_version_is_fatal() {
        let data = [0x85, 0x0E, 0x5F, 0x01, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut reader = BitReader::new(&data);

        assert!(matches!(
            ContainerHeader::parse(&mut reader, ContainerVersion::Draft8),
            Err(Error::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn sample_stream_precision() {
        let data = [0b0100_0000];
        let mut reader = BitReader::new(&data);

        let header = SampleStreamHeader::parse(&mut reader).unwrap();
        assert_eq!(header.unit_size_precision_bytes_minus1, 2);
        assert_eq!(header.precision_bytes(), 3);
    }

    #[test]
    fn wide_size_prefix() {
        let data = [0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        let mut reader = BitReader::new(&data);

        assert_eq!(read_sized(&mut reader, 8).unwrap(), 1 << 24);
    }
}
