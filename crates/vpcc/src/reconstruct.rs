//! Materialization of per-frame patch lists from the parsed atlas tile
//! group layers, including inter/merge/skip prediction against reference
//! frames, and the dense block-to-patch maps the renderer indexes.

use tracing::trace;

use crate::atlas::{AtlasContext, AtlasTileGroupLayer, PatchInformationData};
use crate::frame::{FrameData, FrameGroup};
use crate::patch::{EomPatch, Patch, PatchOrientation, RawPatch};
use crate::vps::VpccParameterSet;
use crate::{Error, Result};

/// Builds the signed AFOC delta lists from the ASPS reference list
/// structures.
pub fn construct_ref_lists(context: &AtlasContext) -> Result<Vec<Vec<i32>>> {
    let Some(first_layer) = context.tile_group_layers.first() else {
        return Ok(Vec::new());
    };

    let asps = context.active_asps(first_layer)?;

    let mut lists = Vec::with_capacity(asps.ref_list_structs.len());

    for rls in &asps.ref_list_structs {
        let mut deltas = Vec::with_capacity(rls.num_ref_entries);

        for i in 0..rls.num_ref_entries {
            let abs_delta = rls.abs_delta_afoc_st[i] as i32;
            let sign = rls.strpf_entry_sign_flag[i];

            deltas.push(if sign { abs_delta } else { -abs_delta });
        }

        lists.push(deltas);
    }

    Ok(lists)
}

/// Resolves the delta lists into absolute reference AFOC values for one
/// frame. Entries that would precede the first frame are dropped; an
/// empty list is pinned to the out-of-range marker 255.
pub fn set_ref_afoc_list(ref_lists: &[Vec<i32>], frame: &mut FrameData) {
    let mut afoc_lists = Vec::with_capacity(ref_lists.len());

    for deltas in ref_lists {
        let mut afocs = Vec::with_capacity(deltas.len());

        for &delta in deltas {
            let afoc = frame.index as i32 + delta;

            if afoc >= 0 {
                afocs.push(afoc as usize);
            }
        }

        if afocs.is_empty() {
            afocs.push(255);
        }

        afoc_lists.push(afocs);
    }

    frame.ref_afoc_list = afoc_lists;
}

/// Materializes the patch lists and block-to-patch maps of every frame in
/// the group.
pub fn create_patch_frame_data_structures(
    context: &AtlasContext,
    vps: &VpccParameterSet,
    frame_group: &mut FrameGroup,
) -> Result<()> {
    let atlas = vps.atlases.first().ok_or(Error::MissingUnit("VPS"))?;

    let frame_count = context.tile_group_layers.len();
    frame_group.frames = vec![FrameData::default(); frame_count];

    let ref_lists = construct_ref_lists(context)?;

    for i in 0..frame_count {
        let layer = &context.tile_group_layers[i];
        let asps = context.active_asps(layer)?;

        let mut frame = std::mem::take(&mut frame_group.frames[i]);
        frame.index = i;
        frame.atlas_frame_order_count = i;
        frame.width = u32::from(atlas.frame_width);
        frame.height = u32::from(atlas.frame_height);

        if i > 0 {
            set_ref_afoc_list(&ref_lists, &mut frame);
        }

        create_patch_frame_data_structure(context, vps, &frame_group.frames, layer, &mut frame)?;

        frame.block_to_patch = create_block_to_patch(
            &frame,
            asps.packing_block_size(),
            asps.patch_precedence_order_flag,
        );

        frame_group.frames[i] = frame;
    }

    Ok(())
}

/// Running prediction state across the patches of one frame.
struct PredictionState {
    prev_size_u0: i64,
    prev_size_v0: i64,
    prev_size_2d_x_in_pixel: i64,
    prev_size_2d_y_in_pixel: i64,
    pred_index: i64,
}

fn create_patch_frame_data_structure(
    context: &AtlasContext,
    vps: &VpccParameterSet,
    frames: &[FrameData],
    layer: &AtlasTileGroupLayer,
    frame: &mut FrameData,
) -> Result<()> {
    let atlas = vps.atlases.first().ok_or(Error::MissingUnit("VPS"))?;
    let gi = &atlas.geometry_information;

    let afps = context.afps(layer.header.afps_id as usize)?;
    let asps = context.asps(afps.asps_id as usize)?;

    let min_level = u32::from(vps.min_level).max(1);
    let max_3d_coordinate = 1i64 << (gi.coordinates_3d_bitdepth_minus1 + 1);
    let packing_block_size = asps.packing_block_size();

    let quantizer_size_x = 1u32 << layer.header.patch_size_x_info_quantizer;
    let quantizer_size_y = 1u32 << layer.header.patch_size_y_info_quantizer;

    let mut state = PredictionState {
        prev_size_u0: 0,
        prev_size_v0: 0,
        prev_size_2d_x_in_pixel: 0,
        prev_size_2d_y_in_pixel: 0,
        pred_index: 0,
    };

    let non_raw_eom = layer
        .patches
        .iter()
        .filter(|pid| {
            !matches!(
                pid,
                PatchInformationData::Raw(_) | PatchInformationData::Eom(_)
            )
        })
        .count();

    frame.patches = Vec::with_capacity(non_raw_eom);

    for (patch_index, pid) in layer.patches.iter().enumerate() {
        match pid {
            PatchInformationData::Intra(pdu) => {
                let mut patch = Patch {
                    occupancy_resolution: packing_block_size,
                    u0: pdu.pos_2d_x,
                    v0: pdu.pos_2d_y,
                    u1: pdu.pos_3d_x,
                    v1: pdu.pos_3d_y,
                    best_match_index: -1,
                    ..Default::default()
                };

                if pdu.lod_enable_flag {
                    patch.lod_scale_x = u32::from(pdu.lod_scale_x_minus1) + 1;
                    patch.lod_scale_y =
                        u32::from(pdu.lod_scale_y) + if patch.lod_scale_x > 1 { 1 } else { 2 };
                } else {
                    patch.lod_scale_x = 1;
                    patch.lod_scale_y = 1;
                }

                patch.size_d =
                    (u64::from(pdu.pos_3d_delta_max_z) * u64::from(min_level)).min(255) as u32;

                if asps.patch_size_quantizer_present_flag {
                    let size_x = state.prev_size_2d_x_in_pixel
                        + i64::from(pdu.delta_size_2d_x) * i64::from(quantizer_size_x);
                    let size_y = state.prev_size_2d_y_in_pixel
                        + i64::from(pdu.delta_size_2d_y) * i64::from(quantizer_size_y);

                    patch.size_2d_x_in_pixel = size_x.max(0) as u32;
                    patch.size_2d_y_in_pixel = size_y.max(0) as u32;

                    patch.size_u0 = patch.size_2d_x_in_pixel.div_ceil(packing_block_size);
                    patch.size_v0 = patch.size_2d_y_in_pixel.div_ceil(packing_block_size);
                } else {
                    patch.size_u0 =
                        (state.prev_size_u0 + i64::from(pdu.delta_size_2d_x)).max(0) as u32;
                    patch.size_v0 =
                        (state.prev_size_v0 + i64::from(pdu.delta_size_2d_y)).max(0) as u32;
                }

                let projection_plane = if asps.degree45_projection_patch_present_flag {
                    u32::from(pdu.projection_id) >> 2
                } else {
                    u32::from(pdu.projection_id)
                };

                patch.set_axes(projection_plane);
                patch.patch_orientation =
                    PatchOrientation::try_from(u32::from(pdu.orientation_index))?;
                patch.axis_of_additional_plane = if asps.degree45_projection_patch_present_flag {
                    u32::from(pdu.projection_id) & 0x03
                } else {
                    0
                };

                let min_z = i64::from(pdu.pos_3d_min_z) * i64::from(min_level);

                patch.d1 = if patch.projection_mode == 0 {
                    min_z as i32
                } else if !asps.degree45_projection_patch_present_flag {
                    (max_3d_coordinate - min_z) as i32
                } else {
                    ((max_3d_coordinate << 1) - min_z) as i32
                };

                state.prev_size_u0 = i64::from(patch.size_u0);
                state.prev_size_v0 = i64::from(patch.size_v0);
                state.prev_size_2d_x_in_pixel = i64::from(patch.size_2d_x_in_pixel);
                state.prev_size_2d_y_in_pixel = i64::from(patch.size_2d_y_in_pixel);

                trace!(
                    patch_index,
                    u0 = patch.u0,
                    v0 = patch.v0,
                    size_u0 = patch.size_u0,
                    size_v0 = patch.size_v0,
                    "intra patch"
                );

                frame.patches.push(patch);
            }
            PatchInformationData::Inter(ipdu) => {
                let best_match_index = (i64::from(ipdu.ref_patch_index) + state.pred_index) as i32;
                state.pred_index += i64::from(ipdu.ref_patch_index) + 1;

                let ref_patch = reference_patch(
                    frames,
                    frame,
                    ipdu.ref_index as usize,
                    best_match_index as usize,
                )?
                .clone();

                let mut patch = Patch {
                    occupancy_resolution: packing_block_size,
                    best_match_index,
                    ref_atlas_frame_index: ipdu.ref_index as usize,
                    projection_mode: ref_patch.projection_mode,
                    u0: (ipdu.pos_2d_x + ref_patch.u0 as i32) as u32,
                    v0: (ipdu.pos_2d_y + ref_patch.v0 as i32) as u32,
                    patch_orientation: ref_patch.patch_orientation,
                    u1: (ipdu.pos_3d_x + ref_patch.u1 as i32) as u32,
                    v1: (ipdu.pos_3d_y + ref_patch.v1 as i32) as u32,
                    normal_axis: ref_patch.normal_axis,
                    tangent_axis: ref_patch.tangent_axis,
                    bitangent_axis: ref_patch.bitangent_axis,
                    axis_of_additional_plane: ref_patch.axis_of_additional_plane,
                    lod_scale_x: ref_patch.lod_scale_x,
                    lod_scale_y: ref_patch.lod_scale_y,
                    ..Default::default()
                };

                if asps.patch_size_quantizer_present_flag {
                    let size_x = i64::from(ref_patch.size_2d_x_in_pixel)
                        + i64::from(ipdu.delta_size_2d_x) * i64::from(quantizer_size_x);
                    let size_y = i64::from(ref_patch.size_2d_y_in_pixel)
                        + i64::from(ipdu.delta_size_2d_y) * i64::from(quantizer_size_y);

                    patch.size_2d_x_in_pixel = size_x.max(0) as u32;
                    patch.size_2d_y_in_pixel = size_y.max(0) as u32;

                    patch.size_u0 = patch.size_2d_x_in_pixel.div_ceil(packing_block_size);
                    patch.size_v0 = patch.size_2d_y_in_pixel.div_ceil(packing_block_size);
                } else {
                    patch.size_u0 =
                        (ipdu.delta_size_2d_x + ref_patch.size_u0 as i32).max(0) as u32;
                    patch.size_v0 =
                        (ipdu.delta_size_2d_y + ref_patch.size_v0 as i32).max(0) as u32;
                }

                patch.d1 = predicted_depth(
                    i64::from(ipdu.pos_3d_min_z),
                    i64::from(ref_patch.d1),
                    patch.projection_mode,
                    min_level,
                    max_3d_coordinate,
                    asps.degree45_projection_patch_present_flag,
                );

                patch.size_d = predicted_size_d(
                    i64::from(ipdu.pos_3d_delta_max_z),
                    ref_patch.size_d,
                    min_level,
                );

                state.prev_size_u0 = i64::from(patch.size_u0);
                state.prev_size_v0 = i64::from(patch.size_v0);
                state.prev_size_2d_x_in_pixel = i64::from(patch.size_2d_x_in_pixel);
                state.prev_size_2d_y_in_pixel = i64::from(patch.size_2d_y_in_pixel);

                frame.patches.push(patch);
            }
            PatchInformationData::Merge(mpdu) => {
                let best_match_index = patch_index as i32;

                let ref_patch = reference_patch(
                    frames,
                    frame,
                    mpdu.ref_index as usize,
                    patch_index,
                )?
                .clone();

                let mut patch = ref_patch.clone();
                patch.occupancy_resolution = packing_block_size;
                patch.best_match_index = best_match_index;
                patch.ref_atlas_frame_index = mpdu.ref_index as usize;

                if mpdu.override_2d_params_flag {
                    patch.u0 = (mpdu.pos_2d_x + ref_patch.u0 as i32) as u32;
                    patch.v0 = (mpdu.pos_2d_y + ref_patch.v0 as i32) as u32;

                    if asps.patch_size_quantizer_present_flag {
                        let size_x = i64::from(ref_patch.size_2d_x_in_pixel)
                            + i64::from(mpdu.delta_size_2d_x) * i64::from(quantizer_size_x);
                        let size_y = i64::from(ref_patch.size_2d_y_in_pixel)
                            + i64::from(mpdu.delta_size_2d_y) * i64::from(quantizer_size_y);

                        patch.size_2d_x_in_pixel = size_x.max(0) as u32;
                        patch.size_2d_y_in_pixel = size_y.max(0) as u32;

                        patch.size_u0 = patch.size_2d_x_in_pixel.div_ceil(packing_block_size);
                        patch.size_v0 = patch.size_2d_y_in_pixel.div_ceil(packing_block_size);
                    } else {
                        patch.size_u0 =
                            (mpdu.delta_size_2d_x + ref_patch.size_u0 as i32).max(0) as u32;
                        patch.size_v0 =
                            (mpdu.delta_size_2d_y + ref_patch.size_v0 as i32).max(0) as u32;
                    }
                } else if mpdu.override_3d_params_flag {
                    patch.u1 = (mpdu.pos_3d_x + ref_patch.u1 as i32) as u32;
                    patch.v1 = (mpdu.pos_3d_y + ref_patch.v1 as i32) as u32;

                    patch.d1 = predicted_depth(
                        i64::from(mpdu.pos_3d_min_z),
                        i64::from(ref_patch.d1),
                        ref_patch.projection_mode,
                        min_level,
                        max_3d_coordinate,
                        asps.degree45_projection_patch_present_flag,
                    );

                    patch.size_d = predicted_size_d(
                        i64::from(mpdu.pos_3d_delta_max_z),
                        ref_patch.size_d,
                        min_level,
                    );
                }

                state.prev_size_u0 = i64::from(patch.size_u0);
                state.prev_size_v0 = i64::from(patch.size_v0);
                state.prev_size_2d_x_in_pixel = i64::from(patch.size_2d_x_in_pixel);
                state.prev_size_2d_y_in_pixel = i64::from(patch.size_2d_y_in_pixel);

                frame.patches.push(patch);
            }
            PatchInformationData::Skip => {
                let best_match_index = patch_index as i32;

                let ref_patch = reference_patch(frames, frame, 0, patch_index)?.clone();

                let mut patch = ref_patch.clone();
                patch.occupancy_resolution = packing_block_size;
                patch.best_match_index = best_match_index;
                patch.ref_atlas_frame_index = 0;

                if asps.patch_size_quantizer_present_flag {
                    patch.size_u0 = patch.size_2d_x_in_pixel.div_ceil(packing_block_size);
                    patch.size_v0 = patch.size_2d_y_in_pixel.div_ceil(packing_block_size);
                }

                patch.d1 = predicted_depth(
                    0,
                    i64::from(ref_patch.d1),
                    ref_patch.projection_mode,
                    min_level,
                    max_3d_coordinate,
                    asps.degree45_projection_patch_present_flag,
                );

                patch.size_d = predicted_size_d(0, ref_patch.size_d, min_level);

                state.prev_size_u0 = i64::from(patch.size_u0);
                state.prev_size_v0 = i64::from(patch.size_v0);
                state.prev_size_2d_x_in_pixel = i64::from(patch.size_2d_x_in_pixel);
                state.prev_size_2d_y_in_pixel = i64::from(patch.size_2d_y_in_pixel);

                frame.patches.push(patch);
            }
            PatchInformationData::Raw(rpdu) => {
                let raw_patch = if afps.raw_3d_pos_bit_count_explicit_mode_flag {
                    RawPatch {
                        u1: rpdu.pos_3d_x,
                        v1: rpdu.pos_3d_y,
                        d1: rpdu.pos_3d_z,
                        ..Default::default()
                    }
                } else {
                    let level = 1u32 << (gi.nominal_2d_bitdepth_minus1 + 1);

                    RawPatch {
                        u1: rpdu.pos_3d_x * level,
                        v1: rpdu.pos_3d_y * level,
                        d1: rpdu.pos_3d_z * level,
                        ..Default::default()
                    }
                };

                frame.raw_patches.push(RawPatch {
                    u0: rpdu.pos_2d_x,
                    v0: rpdu.pos_2d_y,
                    size_u0: rpdu.delta_size_2d_x.max(0) as u32,
                    size_v0: rpdu.delta_size_2d_y.max(0) as u32,
                    occupancy_resolution: packing_block_size,
                    point_count: rpdu.raw_points.max(0) as u32,
                    ..raw_patch
                });
            }
            PatchInformationData::Eom(epdu) => {
                let point_count = epdu.points_per_patch.iter().sum::<usize>() as u32;

                frame.eom_patches.push(EomPatch {
                    u0: epdu.pos_2d_x,
                    v0: epdu.pos_2d_y,
                    size_u: epdu.delta_size_2d_x.max(0) as u32,
                    size_v: epdu.delta_size_2d_y.max(0) as u32,
                    point_count,
                    member_patches: epdu.associated_patches.clone(),
                    points_per_patch: epdu.points_per_patch.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Looks up the reference patch named by an inter-coded patch: the
/// reference AFOC list entry selects the frame, the match index the patch.
fn reference_patch<'a>(
    frames: &'a [FrameData],
    frame: &FrameData,
    ref_index: usize,
    patch_index: usize,
) -> Result<&'a Patch> {
    let afoc = frame
        .ref_afoc_list
        .first()
        .and_then(|list| list.get(ref_index))
        .copied()
        .ok_or(Error::MissingReferenceFrame { afoc: ref_index })?;

    let ref_frame = frames
        .get(afoc)
        .ok_or(Error::MissingReferenceFrame { afoc })?;

    ref_frame
        .patches
        .get(patch_index)
        .ok_or(Error::MissingReferencePatch {
            afoc,
            patch_index,
            available: ref_frame.patches.len(),
        })
}

/// Reconstructs a minimum depth from its delta against the reference
/// patch, in `min_level` steps.
fn predicted_depth(
    delta_min_z: i64,
    ref_d1: i64,
    projection_mode: u32,
    min_level: u32,
    max_3d_coordinate: i64,
    degree45: bool,
) -> i32 {
    let min_level = i64::from(min_level);

    if projection_mode == 0 {
        ((delta_min_z + ref_d1 / min_level) * min_level) as i32
    } else if !degree45 {
        (max_3d_coordinate - (delta_min_z + (max_3d_coordinate - ref_d1) / min_level) * min_level)
            as i32
    } else {
        let doubled = max_3d_coordinate << 1;
        (doubled - (delta_min_z + (doubled - ref_d1) / min_level) * min_level) as i32
    }
}

/// Reconstructs a depth range from its delta against the reference patch.
fn predicted_size_d(delta_max_z: i64, ref_size_d: u32, min_level: u32) -> u32 {
    let min_level = u64::from(min_level);

    let mut prev = u64::from(ref_size_d) / min_level;
    if prev * min_level != u64::from(ref_size_d) {
        prev += 1;
    }

    ((delta_max_z as u64 + prev) * min_level).min(255) as u32
}

/// Rasterizes the patch bounding boxes into a dense canvas-block map.
///
/// Overlaps resolve to the first writer when the patch precedence flag is
/// set and to the last writer otherwise.
pub fn create_block_to_patch(
    frame: &FrameData,
    occupancy_resolution: u32,
    patch_precedence_order: bool,
) -> Vec<usize> {
    let stride = frame.width / occupancy_resolution;
    let height = frame.height / occupancy_resolution;

    let mut block_to_patch = vec![0usize; (stride * height) as usize];

    for (patch_index, patch) in frame.patches.iter().enumerate() {
        for block_v in 0..patch.size_v0 {
            for block_u in 0..patch.size_u0 {
                let Some(block) = patch.block_to_canvas_block(block_u, block_v, stride, height)
                else {
                    continue;
                };

                if patch_precedence_order {
                    if block_to_patch[block] == 0 {
                        block_to_patch[block] = patch_index + 1;
                    }
                } else {
                    block_to_patch[block] = patch_index + 1;
                }
            }
        }
    }

    block_to_patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchOrientation;

    fn frame_with_patches(patches: Vec<Patch>) -> FrameData {
        FrameData {
            width: 256,
            height: 256,
            patches,
            ..Default::default()
        }
    }

    fn patch(orientation: PatchOrientation, u0: u32, v0: u32, size_u0: u32, size_v0: u32) -> Patch {
        Patch {
            u0,
            v0,
            size_u0,
            size_v0,
            patch_orientation: orientation,
            occupancy_resolution: 16,
            ..Default::default()
        }
    }

    #[test]
    fn single_patch_default_orientation() {
        let frame = frame_with_patches(vec![patch(PatchOrientation::Default, 2, 3, 2, 2)]);
        let map = create_block_to_patch(&frame, 16, false);

        let expected: Vec<usize> = vec![2 + 16 * 3, 3 + 16 * 3, 2 + 16 * 4, 3 + 16 * 4];

        for (index, value) in map.iter().enumerate() {
            if expected.contains(&index) {
                assert_eq!(*value, 1, "block {index}");
            } else {
                assert_eq!(*value, 0, "block {index}");
            }
        }
    }

    #[test]
    fn precedence_order_keeps_first_writer() {
        let overlapping = vec![
            patch(PatchOrientation::Default, 0, 0, 2, 2),
            patch(PatchOrientation::Default, 1, 1, 2, 2),
        ];

        let frame = frame_with_patches(overlapping);

        let last_writer = create_block_to_patch(&frame, 16, false);
        assert_eq!(last_writer[1 + 16], 2);

        let first_writer = create_block_to_patch(&frame, 16, true);
        assert_eq!(first_writer[1 + 16], 1);
        assert_eq!(first_writer[2 + 2 * 16], 2);
    }

    #[test]
    fn reconstruction_is_deterministic() {
        let patches = vec![
            patch(PatchOrientation::Rot90, 4, 5, 2, 3),
            patch(PatchOrientation::MRot180, 1, 1, 3, 2),
            patch(PatchOrientation::Swap, 9, 0, 2, 2),
        ];

        let frame = frame_with_patches(patches);

        let first = create_block_to_patch(&frame, 16, true);
        let second = create_block_to_patch(&frame, 16, true);

        assert_eq!(first, second);
    }

    #[test]
    fn ref_afoc_lists_drop_negative_entries() {
        let ref_lists = vec![vec![-1, -4]];

        let mut frame = FrameData {
            index: 2,
            ..Default::default()
        };

        set_ref_afoc_list(&ref_lists, &mut frame);
        assert_eq!(frame.ref_afoc_list, vec![vec![1]]);

        let mut first = FrameData {
            index: 0,
            ..Default::default()
        };

        // A frame with no usable references gets the out-of-range marker.
        set_ref_afoc_list(&ref_lists, &mut first);
        assert_eq!(first.ref_afoc_list, vec![vec![255]]);
    }
}
