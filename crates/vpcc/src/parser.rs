//! Top-level V-PCC container parsing: unit iteration, frame-group
//! assembly, video substream splitting and presentation timestamp
//! synthesis.

use tracing::{debug, info, warn};
use vpcc_bitio::BitReader;
use vpcc_hevc::{DecoderConfig, scan_nal_units, split_into_packets};

use crate::atlas::{AtlasContext, parse_atlas_substream};
use crate::container::{ContainerHeader, ContainerVersion, SampleStreamHeader};
use crate::frame::{FrameGroup, VideoType};
use crate::reconstruct::create_patch_frame_data_structures;
use crate::unit::{V3cUnitHeader, V3cUnitType};
use crate::vps::VpccParameterSet;
use crate::{Error, Result};

/// Per-stream parser state shared across the frame groups of one
/// container.
struct ParserContext {
    precision_bytes: usize,
    /// VPS register keyed by the 4-bit parameter set id.
    vps_registry: Vec<Option<VpccParameterSet>>,
    active_vps_id: u8,
}

impl ParserContext {
    fn new(precision_bytes: usize) -> Self {
        Self {
            precision_bytes,
            vps_registry: (0..16).map(|_| None).collect(),
            active_vps_id: 0,
        }
    }

    fn active_vps(&self) -> Result<&VpccParameterSet> {
        self.vps_registry[self.active_vps_id as usize]
            .as_ref()
            .ok_or(Error::NoActiveVps(self.active_vps_id))
    }
}

/// Parses a whole container into frame groups, assigning presentation
/// timestamps across group boundaries.
///
/// Frame dimensions must not change between groups; hardware decoders are
/// configured once from the first group and re-creating them mid-stream
/// is not supported.
pub fn parse_frame_groups(data: &[u8], version: ContainerVersion) -> Result<Vec<FrameGroup>> {
    if version == ContainerVersion::Draft6 {
        return crate::legacy::parse_frame_groups(data);
    }

    let mut reader = BitReader::new(data);

    ContainerHeader::parse(&mut reader, version)?;
    let sample_stream = SampleStreamHeader::parse(&mut reader)?;

    let mut offset = reader.position();
    let mut context = ParserContext::new(sample_stream.precision_bytes());

    // Pre-size the output by counting VPS units.
    let frame_group_count = count_vps_units(data, offset, context.precision_bytes);
    let mut frame_groups = Vec::with_capacity(frame_group_count);

    let mut pending: Option<(FrameGroup, AtlasContext)> = None;

    while offset < data.len() {
        let mut unit_reader = BitReader::new(&data[offset..]);
        let header = V3cUnitHeader::parse(&mut unit_reader, context.precision_bytes)?;

        let available = data.len() - offset - context.precision_bytes;
        if header.unit_size > available {
            return Err(Error::SizeOverrun {
                declared: header.unit_size,
                consumed: available,
            });
        }

        if header.unit_type == V3cUnitType::Vps {
            // A VPS opens the next frame group; finish the current one.
            if let Some((mut group, atlas)) = pending.take() {
                finalize_frame_group(&mut group, &atlas, context.active_vps()?)?;
                frame_groups.push(group);
            }

            pending = Some((FrameGroup::default(), AtlasContext::new()));
        }

        let (group, atlas) = pending.as_mut().ok_or(Error::MissingUnit("VPS"))?;

        parse_unit_payload(&mut unit_reader, &header, &mut context, group, atlas)?;

        offset += context.precision_bytes + header.unit_size;
    }

    if let Some((mut group, atlas)) = pending.take() {
        finalize_frame_group(&mut group, &atlas, context.active_vps()?)?;
        frame_groups.push(group);
    }

    assign_presentation_timestamps(&mut frame_groups);
    verify_frame_dimensions(&frame_groups)?;

    info!(
        frame_groups = frame_groups.len(),
        frames = frame_groups.iter().map(|g| g.frames.len()).sum::<usize>(),
        "parsed V-PCC container"
    );

    Ok(frame_groups)
}

/// Parses the container header and the first frame group only; used to
/// build decoder configurations before playback starts.
pub fn parse_first_frame_group(data: &[u8], version: ContainerVersion) -> Result<FrameGroup> {
    if version == ContainerVersion::Draft6 {
        return crate::legacy::parse_first_frame_group(data);
    }

    let mut reader = BitReader::new(data);

    ContainerHeader::parse(&mut reader, version)?;
    let sample_stream = SampleStreamHeader::parse(&mut reader)?;

    let mut offset = reader.position();
    let mut context = ParserContext::new(sample_stream.precision_bytes());

    let mut pending: Option<(FrameGroup, AtlasContext)> = None;

    while offset < data.len() {
        let mut unit_reader = BitReader::new(&data[offset..]);
        let header = V3cUnitHeader::parse(&mut unit_reader, context.precision_bytes)?;

        let available = data.len() - offset - context.precision_bytes;
        if header.unit_size > available {
            return Err(Error::SizeOverrun {
                declared: header.unit_size,
                consumed: available,
            });
        }

        if header.unit_type == V3cUnitType::Vps && pending.is_some() {
            break;
        }

        if header.unit_type == V3cUnitType::Vps {
            pending = Some((FrameGroup::default(), AtlasContext::new()));
        }

        let (group, atlas) = pending.as_mut().ok_or(Error::MissingUnit("VPS"))?;

        parse_unit_payload(&mut unit_reader, &header, &mut context, group, atlas)?;

        offset += context.precision_bytes + header.unit_size;
    }

    let (mut group, atlas) = pending.ok_or(Error::MissingUnit("VPS"))?;
    finalize_frame_group(&mut group, &atlas, context.active_vps()?)?;

    let mut frame_groups = vec![group];
    assign_presentation_timestamps(&mut frame_groups);

    Ok(frame_groups.pop().expect("one group was just pushed"))
}

fn count_vps_units(data: &[u8], mut offset: usize, precision_bytes: usize) -> usize {
    let mut count = 0;

    while offset < data.len() {
        let mut reader = BitReader::new(&data[offset..]);

        let Ok(header) = V3cUnitHeader::parse(&mut reader, precision_bytes) else {
            break;
        };

        if header.unit_type == V3cUnitType::Vps {
            count += 1;
        }

        if header.unit_size == 0 {
            break;
        }

        offset += precision_bytes + header.unit_size;
    }

    count
}

fn parse_unit_payload(
    reader: &mut BitReader<'_>,
    header: &V3cUnitHeader,
    context: &mut ParserContext,
    group: &mut FrameGroup,
    atlas: &mut AtlasContext,
) -> Result<()> {
    match header.unit_type {
        V3cUnitType::Vps => {
            let vps = VpccParameterSet::parse(reader)?;

            debug!(vps_id = vps.vps_id, "parsed V3C parameter set");

            let atlas_info = vps.atlases.first().ok_or(Error::MissingUnit("VPS"))?;
            group.frame_width = atlas_info.frame_width;
            group.frame_height = atlas_info.frame_height;

            context.active_vps_id = vps.vps_id;
            let vps_id = vps.vps_id as usize;
            context.vps_registry[vps_id] = Some(vps);
        }
        V3cUnitType::Ad => {
            context.active_vps_id = header.sps_id;
            let vps = context.active_vps()?;

            // The AD payload follows the 32-bit unit header inside the
            // declared unit size.
            let payload_len = header.unit_size.saturating_sub(4);
            let payload = reader.read_slice(payload_len)?;

            parse_atlas_substream(payload, atlas, vps)?;
        }
        V3cUnitType::Ovd | V3cUnitType::Gvd | V3cUnitType::Avd => {
            context.active_vps_id = header.sps_id;

            let video_type = select_video_type(header, context)?;
            let size = reader.read_u32()? as usize;
            let payload = reader.read_slice(size)?;

            debug!(
                video_type = video_type.name(),
                bytes = size,
                "appending video substream"
            );

            group.stream_mut(video_type).buffer.extend_from_slice(payload);
        }
        other => {
            // Reserved unit type: skip it by its declared size.
            warn!(unit_type = other.0, size = header.unit_size, "skipping unknown V-PCC unit");
        }
    }

    Ok(())
}

/// Maps a video unit onto the substream it feeds, honoring the raw-video
/// flag and the map index of multi-map streams.
fn select_video_type(header: &V3cUnitHeader, context: &ParserContext) -> Result<VideoType> {
    let vps = context.active_vps()?;
    let atlas = vps.atlases.first().ok_or(Error::MissingUnit("VPS"))?;

    let multiple_maps = atlas.map_count_minus1 > 0 && atlas.multiple_map_streams_present_flag;

    Ok(match header.unit_type {
        V3cUnitType::Ovd => VideoType::Occupancy,
        V3cUnitType::Gvd => {
            if header.raw_video_flag {
                VideoType::GeometryRaw
            } else if multiple_maps {
                if header.map_index == 0 {
                    VideoType::GeometryD0
                } else {
                    VideoType::GeometryD1
                }
            } else {
                VideoType::Geometry
            }
        }
        V3cUnitType::Avd => {
            if header.raw_video_flag {
                VideoType::TextureRaw
            } else if multiple_maps {
                if header.map_index == 0 {
                    VideoType::TextureT0
                } else {
                    VideoType::TextureT1
                }
            } else {
                VideoType::Texture
            }
        }
        _ => unreachable!("only video units are dispatched here"),
    })
}

/// Completes a frame group after its last unit: splits the video streams
/// into packets, extracts decoder configurations, materializes patches
/// and attaches per-frame packets.
fn finalize_frame_group(
    group: &mut FrameGroup,
    atlas: &AtlasContext,
    vps: &VpccParameterSet,
) -> Result<()> {
    create_patch_frame_data_structures(atlas, vps, group)?;

    for video_type in [
        VideoType::Occupancy,
        VideoType::Geometry,
        VideoType::GeometryD0,
        VideoType::GeometryD1,
        VideoType::GeometryRaw,
        VideoType::Texture,
        VideoType::TextureT0,
        VideoType::TextureT1,
        VideoType::TextureRaw,
    ] {
        let stream = group.stream_mut(video_type);

        if stream.is_empty() {
            continue;
        }

        let nal_units = scan_nal_units(&stream.buffer);
        stream.packets = split_into_packets(&stream.buffer, &nal_units)?;
        stream.decoder_config = Some(DecoderConfig::parse(&stream.buffer)?);

        debug!(
            video_type = video_type.name(),
            packets = stream.packets.len(),
            "split video substream"
        );
    }

    attach_frame_packets(group)?;

    Ok(())
}

/// Copies each frame's three packet byte ranges out of the substream
/// packet lists.
fn attach_frame_packets(group: &mut FrameGroup) -> Result<()> {
    let frame_count = group.frames.len();

    for (video_type, name) in [
        (VideoType::Occupancy, "occupancy"),
        (VideoType::Geometry, "geometry"),
        (VideoType::Texture, "texture"),
    ] {
        let packets = &group.stream(video_type).packets;

        if packets.len() < frame_count {
            return Err(Error::PacketCountMismatch {
                video_type: name,
                packets: packets.len(),
                frames: frame_count,
            });
        }
    }

    for index in 0..frame_count {
        let occupancy = group.stream(VideoType::Occupancy).packets[index];
        let geometry = group.stream(VideoType::Geometry).packets[index];
        let texture = group.stream(VideoType::Texture).packets[index];

        let frame = &mut group.frames[index];
        frame.occupancy_packet = occupancy;
        frame.geometry_packet = geometry;
        frame.texture_packet = texture;
    }

    Ok(())
}

/// Synthesizes presentation timestamps across frame groups.
///
/// The container carries none; the decoders only require that the three
/// substreams agree per frame and that values increase within a 32-frame
/// window, which this scheme provides.
pub(crate) fn assign_presentation_timestamps(frame_groups: &mut [FrameGroup]) {
    let mut total_frame_count = 0u64;

    for group in frame_groups {
        for (i, frame) in group.frames.iter_mut().enumerate() {
            frame.presentation_time_us = ((total_frame_count / 32) * 100 + (i as u64 % 32)) as i64;

            total_frame_count += 1;
        }
    }
}

pub(crate) fn verify_frame_dimensions(frame_groups: &[FrameGroup]) -> Result<()> {
    for pair in frame_groups.windows(2) {
        let previous = &pair[0];
        let current = &pair[1];

        let changed = (previous.frame_width != 0 && previous.frame_width != current.frame_width)
            || (previous.frame_height != 0 && previous.frame_height != current.frame_height);

        if changed {
            return Err(Error::InconsistentFrameSize {
                previous_width: previous.frame_width,
                previous_height: previous.frame_height,
                width: current.frame_width,
                height: current.frame_height,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pts_sequence_within_and_across_windows() {
        let mut groups = vec![FrameGroup::default()];
        groups[0].frames = vec![Default::default(); 40];

        assign_presentation_timestamps(&mut groups);

        let pts: Vec<i64> = groups[0]
            .frames
            .iter()
            .map(|f| f.presentation_time_us)
            .collect();

        let mut expected: Vec<i64> = (0..32).collect();
        expected.extend(100..108);

        assert_eq!(pts, expected);
    }

    #[test]
    fn pts_counter_runs_across_groups() {
        let mut groups = vec![FrameGroup::default(), FrameGroup::default()];
        groups[0].frames = vec![Default::default(); 32];
        groups[1].frames = vec![Default::default(); 2];

        assign_presentation_timestamps(&mut groups);

        assert_eq!(groups[0].frames[31].presentation_time_us, 31);
        assert_eq!(groups[1].frames[0].presentation_time_us, 100);
        assert_eq!(groups[1].frames[1].presentation_time_us, 101);
    }

    #[test]
    fn inconsistent_dimensions_are_fatal() {
        let mut a = FrameGroup::default();
        a.frame_width = 1280;
        a.frame_height = 1344;

        let mut b = FrameGroup::default();
        b.frame_width = 1280;
        b.frame_height = 1280;

        assert!(matches!(
            verify_frame_dimensions(&[a, b]),
            Err(Error::InconsistentFrameSize { .. })
        ));
    }
}
