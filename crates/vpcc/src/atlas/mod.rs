//! The atlas sub-bitstream: a nested sample stream of atlas NAL units
//! carrying parameter sets, tile group layers and SEI messages.

pub(crate) mod afps;
pub(crate) mod asps;
mod atgl;
mod sei;

pub use self::afps::{Afps, AtlasFrameTileInformation};
pub use self::asps::{
    Asps, PlrMode, PointLocalReconstructionInformation, RefListStruct, VuiParameters,
};
pub use self::atgl::{
    AtlasTileGroupHeader, AtlasTileGroupLayer, EomPatchDataUnit, InterPatchDataUnit,
    MergePatchDataUnit, PatchDataUnit, PatchInformationData, PointLocalReconstructionData,
    RawPatchDataUnit, TileGroupType, parse_atlas_tile_group_layer, patch_mode_i, patch_mode_p,
};
pub use self::sei::{SeiMessage, SeiPayload, SeiPayloadType};

use nutype_enum::nutype_enum;
use tracing::{debug, warn};
use vpcc_bitio::BitReader;

use crate::container::read_sized;
use crate::vps::{GeometryInformation, VpccParameterSet};
use crate::{Error, Result};

nutype_enum! {
    /// Atlas NAL unit types. 0-31 are ACL (tile group) types, the rest
    /// non-ACL.
    pub enum AtlasNalUnitType(u8) {
        /// Coded tile group of a trailing atlas frame
        Trail = 0,
        /// Coded tile group of a TSA atlas frame
        Tsa = 1,
        /// Coded tile group of an STSA atlas frame
        Stsa = 2,
        /// Coded tile group of a RADL atlas frame
        Radl = 3,
        /// Coded tile group of a RASL atlas frame
        Rasl = 4,
        /// Coded tile group of a skipped atlas frame
        SkipLayer = 5,
        /// Coded tile group of a BLA atlas frame
        BlaWLp = 10,
        /// Coded tile group of a BLA atlas frame
        BlaWRadl = 11,
        /// Coded tile group of a BLA atlas frame
        BlaNLp = 12,
        /// Coded tile group of an IDR atlas frame
        IdrWRadl = 16,
        /// Coded tile group of an IDR atlas frame
        IdrNLp = 17,
        /// Coded tile group of a CRA atlas frame
        Cra = 20,
        /// Atlas sequence parameter set
        Asps = 32,
        /// Atlas frame parameter set
        Afps = 33,
        /// Access unit delimiter
        Aud = 34,
        /// V-PCC access unit delimiter
        VpccAud = 35,
        /// End of sequence
        Eos = 36,
        /// End of bitstream
        Eob = 37,
        /// Filler data
        Fd = 38,
        /// Supplemental enhancement information
        PrefixSei = 39,
        /// Supplemental enhancement information
        SuffixSei = 40,
    }
}

impl AtlasNalUnitType {
    /// Tile-group NAL types carried by the streams this player decodes.
    pub const fn is_tile_group(&self) -> bool {
        self.0 <= 5
    }
}

/// Accumulated atlas substream state of one frame group.
#[derive(Debug, Default)]
pub struct AtlasContext {
    pub asps_set: Vec<Option<Asps>>,
    pub afps_set: Vec<Option<Afps>>,
    pub tile_group_layers: Vec<AtlasTileGroupLayer>,
    pub sei_prefix: Vec<SeiMessage>,
    pub sei_suffix: Vec<SeiMessage>,
}

impl AtlasContext {
    pub fn new() -> Self {
        Self {
            // ASPS ids are 4 bits on the wire, AFPS ids 6 bits.
            asps_set: vec![None; 16],
            afps_set: vec![None; 64],
            tile_group_layers: Vec::new(),
            sei_prefix: Vec::new(),
            sei_suffix: Vec::new(),
        }
    }

    pub fn asps(&self, id: usize) -> Result<&Asps> {
        atgl::lookup(&self.asps_set, id, "ASPS")
    }

    pub fn afps(&self, id: usize) -> Result<&Afps> {
        atgl::lookup(&self.afps_set, id, "AFPS")
    }

    /// The ASPS active for a tile group layer, through its AFPS.
    pub fn active_asps(&self, layer: &AtlasTileGroupLayer) -> Result<&Asps> {
        let afps = self.afps(layer.header.afps_id as usize)?;
        self.asps(afps.asps_id as usize)
    }
}

/// Parses an AD unit payload: a sample-stream NAL header followed by
/// size-prefixed atlas NAL units.
pub fn parse_atlas_substream(
    payload: &[u8],
    context: &mut AtlasContext,
    vps: &VpccParameterSet,
) -> Result<()> {
    let mut reader = BitReader::new(payload);

    let precision_bytes = reader.read_bits(3)? as usize + 1;
    reader.skip_bits(5)?;

    let atlas = vps.atlases.first().ok_or(Error::MissingUnit("VPS"))?;

    while reader.bytes_available() > 0 {
        let nal_size = read_sized(&mut reader, precision_bytes)? as usize;
        let start = reader.position();

        if nal_size > payload.len() - start {
            return Err(Error::SizeOverrun {
                declared: nal_size,
                consumed: payload.len() - start,
            });
        }

        parse_atlas_nal_unit(
            &mut reader,
            context,
            &atlas.geometry_information,
            atlas.raw_separate_video_present_flag,
        )?;

        let consumed = reader.position() - start;

        if consumed > nal_size {
            return Err(Error::SizeOverrun {
                declared: nal_size,
                consumed,
            });
        }

        if consumed < nal_size {
            reader.skip_bytes(nal_size - consumed)?;
        }
    }

    Ok(())
}

fn parse_atlas_nal_unit(
    reader: &mut BitReader<'_>,
    context: &mut AtlasContext,
    geometry_information: &GeometryInformation,
    raw_separate_video: bool,
) -> Result<()> {
    // NAL unit header: forbidden bit, type, layer id, temporal id.
    reader.read_bit()?;
    let nal_type = AtlasNalUnitType::from(reader.read_bits(6)? as u8);
    reader.skip_bits(6)?;
    reader.skip_bits(3)?;

    match nal_type {
        AtlasNalUnitType::Asps => {
            let asps = Asps::parse(reader)?;
            debug!(asps_id = asps.asps_id, "parsed atlas sequence parameter set");

            let id = asps.asps_id as usize;
            if id < context.asps_set.len() {
                context.asps_set[id] = Some(asps);
            } else {
                return Err(Error::MissingAtlasParameterSet { kind: "ASPS", id });
            }
        }
        AtlasNalUnitType::Afps => {
            let afps = Afps::parse(reader)?;
            debug!(afps_id = afps.afps_id, "parsed atlas frame parameter set");

            let id = afps.afps_id as usize;
            if id < context.afps_set.len() {
                context.afps_set[id] = Some(afps);
            } else {
                return Err(Error::MissingAtlasParameterSet { kind: "AFPS", id });
            }
        }
        nal_type if nal_type.is_tile_group() => {
            let layer = parse_atlas_tile_group_layer(
                reader,
                &context.asps_set,
                &context.afps_set,
                &context.tile_group_layers,
                geometry_information,
                raw_separate_video,
            )?;

            debug!(
                frame_index = layer.frame_index,
                patches = layer.patches.len(),
                "parsed atlas tile group layer"
            );

            context.tile_group_layers.push(layer);
        }
        AtlasNalUnitType::PrefixSei => {
            let sei = SeiMessage::parse(reader, nal_type)?;
            context.sei_prefix.push(sei);
        }
        AtlasNalUnitType::SuffixSei => {
            let sei = SeiMessage::parse(reader, nal_type)?;
            context.sei_suffix.push(sei);
        }
        other => {
            // AUD/EOS/EOB/FD and reserved types carry nothing the player
            // needs; the caller skips to the declared NAL boundary.
            warn!(nal_type = other.0, "skipping atlas NAL unit");
        }
    }

    Ok(())
}
