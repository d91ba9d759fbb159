use bytes::Bytes;
use tracing::info;

use crate::nal::scan_nal_units;
use crate::profile_tier_level::ProfileTierLevel;
use crate::sps::Sps;
use crate::vps::Vps;
use crate::{Error, NALUnitType, Result};

const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Everything a hardware decoder needs to initialize for one HEVC stream.
///
/// The parameter-set blobs are Annex-B form, each prefixed with a 4-byte
/// start code; decoders that want length-prefixed input run the whole
/// stream through [`convert_to_length_prefixed`] instead. Created on first
/// sight of a stream and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    pub vps: Bytes,
    pub sps: Bytes,
    pub pps: Bytes,
    /// `pic_width_in_luma_samples` of the active SPS.
    pub width: u32,
    /// `pic_height_in_luma_samples` of the active SPS.
    pub height: u32,
    pub profile_tier_level: ProfileTierLevel,
}

impl DecoderConfig {
    /// Extracts the decoder configuration from the first VPS, SPS and PPS
    /// NAL units of an Annex-B stream.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let nal_units = scan_nal_units(buf);

        let mut vps_blob = None;
        let mut sps_blob = None;
        let mut pps_blob = None;
        let mut parsed_sps = None;
        let mut parsed_vps = None;

        for nal_unit in &nal_units {
            let slot = match nal_unit.nal_type {
                NALUnitType::VpsNut if vps_blob.is_none() => &mut vps_blob,
                NALUnitType::SpsNut if sps_blob.is_none() => &mut sps_blob,
                NALUnitType::PpsNut if pps_blob.is_none() => &mut pps_blob,
                _ => continue,
            };

            let payload = nal_unit.payload(buf);

            let mut blob = Vec::with_capacity(START_CODE.len() + payload.len());
            blob.extend_from_slice(&START_CODE);
            blob.extend_from_slice(payload);
            *slot = Some(Bytes::from(blob));

            match nal_unit.nal_type {
                NALUnitType::VpsNut => parsed_vps = Some(Vps::parse(payload)?),
                NALUnitType::SpsNut => parsed_sps = Some(Sps::parse(payload)?),
                _ => {}
            }

            if vps_blob.is_some() && sps_blob.is_some() && pps_blob.is_some() {
                break;
            }
        }

        let vps = vps_blob.ok_or(Error::MissingParameterSet("VPS"))?;
        let sps = sps_blob.ok_or(Error::MissingParameterSet("SPS"))?;
        let pps = pps_blob.ok_or(Error::MissingParameterSet("PPS"))?;

        let parsed_sps = parsed_sps.expect("blob and parse are set together");
        let parsed_vps = parsed_vps.expect("blob and parse are set together");

        let config = Self {
            vps,
            sps,
            pps,
            width: parsed_sps.pic_width_in_luma_samples,
            height: parsed_sps.pic_height_in_luma_samples,
            profile_tier_level: parsed_vps.profile_tier_level,
        };

        info!(
            width = config.width,
            height = config.height,
            profile = config.profile_tier_level.profile_name(),
            tier = config.profile_tier_level.tier_name(),
            level = config.profile_tier_level.level(),
            "extracted decoder configuration"
        );

        Ok(config)
    }
}

/// Rewrites an Annex-B stream into 4-byte length-prefixed form, for
/// decoder backends that consume HVCC-style input.
pub fn convert_to_length_prefixed(buf: &[u8]) -> Vec<u8> {
    let nal_units = scan_nal_units(buf);

    let mut output = Vec::with_capacity(buf.len());

    for nal_unit in &nal_units {
        let payload = nal_unit.payload(buf);

        output.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        output.extend_from_slice(payload);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::tests::build_stream;

    #[test]
    fn config_from_leading_parameter_sets() {
        let stream = build_stream(&[0, 1]);
        let config = DecoderConfig::parse(&stream).unwrap();

        assert_eq!(config.width, 1280);
        assert_eq!(config.height, 1344);
        assert_eq!(&config.vps[..4], &START_CODE);
        assert_eq!(&config.sps[..4], &START_CODE);
        assert_eq!(&config.pps[..4], &START_CODE);
        assert_eq!(config.vps[4] >> 1, 32);
        assert_eq!(config.sps[4] >> 1, 33);
        assert_eq!(config.pps[4] >> 1, 34);
        assert_eq!(config.profile_tier_level.profile_name(), "Main 10");
    }

    #[test]
    fn missing_parameter_set_is_an_error() {
        let stream = [0x00, 0x00, 0x01, 0x02, 0x01, 0xAA];
        assert!(matches!(
            DecoderConfig::parse(&stream),
            Err(Error::MissingParameterSet(_))
        ));
    }

    #[test]
    fn length_prefixed_conversion() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&[0x00, 0x00, 0x01, 0x40, 0x01, 0xAA]);
        stream.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x42, 0x01]);

        let converted = convert_to_length_prefixed(&stream);

        assert_eq!(
            converted,
            vec![0, 0, 0, 3, 0x40, 0x01, 0xAA, 0, 0, 0, 2, 0x42, 0x01]
        );
    }
}
