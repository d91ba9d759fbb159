use crate::{Error, Result};

/// Placement of a patch inside the atlas canvas.
///
/// The discriminants are the wire values of `pdu_orientation_index`.
/// MROT270 and SWAP apply the same coordinate transform; both exist on
/// the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PatchOrientation {
    #[default]
    Default = 0,
    Swap = 1,
    Rot180 = 2,
    Rot270 = 3,
    Mirror = 4,
    MRot90 = 5,
    MRot180 = 6,
    Rot90 = 7,
    MRot270 = 8,
}

impl TryFrom<u32> for PatchOrientation {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            0 => Self::Default,
            1 => Self::Swap,
            2 => Self::Rot180,
            3 => Self::Rot270,
            4 => Self::Mirror,
            5 => Self::MRot90,
            6 => Self::MRot180,
            7 => Self::Rot90,
            8 => Self::MRot270,
            other => return Err(Error::InvalidOrientation(other)),
        })
    }
}

/// One surface patch: a region of the point cloud projected onto an
/// axis-aligned plane and packed into the 2-D atlas.
///
/// `u0`/`v0` and `size_u0`/`size_v0` are in occupancy-map blocks of
/// `occupancy_resolution` pixels; `u1`/`v1`/`d1` are the 3-D offsets along
/// the tangent, bitangent and normal axes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    pub u0: u32,
    pub v0: u32,
    pub size_u0: u32,
    pub size_v0: u32,
    pub u1: u32,
    pub v1: u32,
    pub d1: i32,
    pub size_d: u32,
    pub size_2d_x_in_pixel: u32,
    pub size_2d_y_in_pixel: u32,
    /// The patch packing block size; a power of two, constant within a
    /// frame group.
    pub occupancy_resolution: u32,
    pub normal_axis: u32,
    pub tangent_axis: u32,
    pub bitangent_axis: u32,
    /// 0 projects from the near plane, 1 from the far plane.
    pub projection_mode: u32,
    pub patch_orientation: PatchOrientation,
    pub axis_of_additional_plane: u32,
    pub lod_scale_x: u32,
    pub lod_scale_y: u32,
    /// Index of the matched patch in the reference atlas frame; -1 for
    /// intra patches.
    pub best_match_index: i32,
    pub ref_atlas_frame_index: usize,
}

impl Patch {
    /// Derives the tangent and bitangent axes from the normal axis so the
    /// three always form a permutation of the coordinate axes.
    pub fn set_axes(&mut self, projection_plane: u32) {
        self.normal_axis = projection_plane % 3;
        self.projection_mode = if projection_plane < 3 { 0 } else { 1 };

        match self.normal_axis {
            0 => {
                self.tangent_axis = 2;
                self.bitangent_axis = 1;
            }
            1 => {
                self.tangent_axis = 2;
                self.bitangent_axis = 0;
            }
            _ => {
                self.tangent_axis = 0;
                self.bitangent_axis = 1;
            }
        }
    }

    /// Maps a block position inside the patch to its canvas block index,
    /// applying the patch orientation. Returns `None` when the block
    /// falls outside the canvas.
    pub fn block_to_canvas_block(
        &self,
        block_u: u32,
        block_v: u32,
        canvas_stride_blocks: u32,
        canvas_height_blocks: u32,
    ) -> Option<usize> {
        let (x, y) = match self.patch_orientation {
            PatchOrientation::Default => (block_u + self.u0, block_v + self.v0),
            PatchOrientation::Rot90 => {
                ((self.size_v0 - 1 - block_v) + self.u0, block_u + self.v0)
            }
            PatchOrientation::Rot180 => (
                (self.size_u0 - 1 - block_u) + self.u0,
                (self.size_v0 - 1 - block_v) + self.v0,
            ),
            PatchOrientation::Rot270 => {
                (block_v + self.u0, (self.size_u0 - 1 - block_u) + self.v0)
            }
            PatchOrientation::Mirror => {
                ((self.size_u0 - 1 - block_u) + self.u0, block_v + self.v0)
            }
            PatchOrientation::MRot90 => (
                (self.size_v0 - 1 - block_v) + self.u0,
                (self.size_u0 - 1 - block_u) + self.v0,
            ),
            PatchOrientation::MRot180 => (
                block_u + self.u0,
                (self.size_v0 - 1 - block_v) + self.v0,
            ),
            PatchOrientation::MRot270 | PatchOrientation::Swap => {
                (block_v + self.u0, block_u + self.v0)
            }
        };

        if x >= canvas_stride_blocks || y >= canvas_height_blocks {
            return None;
        }

        Some((x + canvas_stride_blocks * y) as usize)
    }
}

/// A raw (missed-points) patch: points that survived no projection and
/// are coded verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPatch {
    pub u0: u32,
    pub v0: u32,
    pub size_u0: u32,
    pub size_v0: u32,
    pub u1: u32,
    pub v1: u32,
    pub d1: u32,
    pub occupancy_resolution: u32,
    pub point_count: u32,
}

/// An enhanced-occupancy-mode patch grouping EOM points of its member
/// patches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EomPatch {
    pub u0: u32,
    pub v0: u32,
    pub size_u: u32,
    pub size_v: u32,
    pub point_count: u32,
    pub member_patches: Vec<usize>,
    pub points_per_patch: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn axes_are_a_permutation_for_all_projection_planes() {
        for plane in 0..6 {
            let mut p = Patch::default();
            p.set_axes(plane);

            let mut axes = [p.normal_axis, p.tangent_axis, p.bitangent_axis];
            axes.sort_unstable();
            assert_eq!(axes, [0, 1, 2], "projection plane {plane}");

            assert_eq!(p.projection_mode, u32::from(plane >= 3));
        }
    }

    #[test]
    fn default_orientation_block_placement() {
        let p = patch(PatchOrientation::Default, 2, 3, 2, 2);

        let mut cells = Vec::new();
        for bv in 0..2 {
            for bu in 0..2 {
                cells.push(p.block_to_canvas_block(bu, bv, 16, 16).unwrap());
            }
        }

        assert_eq!(cells, vec![2 + 16 * 3, 3 + 16 * 3, 2 + 16 * 4, 3 + 16 * 4]);
    }

    #[test]
    fn rot90_block_placement() {
        let p = patch(PatchOrientation::Rot90, 4, 5, 2, 3);

        let mut cells = Vec::new();
        for bv in 0..3 {
            for bu in 0..2 {
                let index = p.block_to_canvas_block(bu, bv, 16, 16).unwrap();
                cells.push((index as u32 % 16, index as u32 / 16));
            }
        }

        // (u0 + (size_v0 - 1 - bv), v0 + bu)
        assert_eq!(
            cells,
            vec![(6, 5), (6, 6), (5, 5), (5, 6), (4, 5), (4, 6)]
        );
    }

    #[test]
    fn mrot270_and_swap_agree() {
        let a = patch(PatchOrientation::MRot270, 1, 2, 3, 2);
        let b = patch(PatchOrientation::Swap, 1, 2, 3, 2);

        for bv in 0..2 {
            for bu in 0..3 {
                assert_eq!(
                    a.block_to_canvas_block(bu, bv, 16, 16),
                    b.block_to_canvas_block(bu, bv, 16, 16)
                );
            }
        }
    }

    #[test]
    fn out_of_canvas_blocks_are_rejected() {
        let p = patch(PatchOrientation::Default, 15, 15, 2, 2);

        assert!(p.block_to_canvas_block(0, 0, 16, 16).is_some());
        assert!(p.block_to_canvas_block(1, 0, 16, 16).is_none());
        assert!(p.block_to_canvas_block(0, 1, 16, 16).is_none());
    }
}
