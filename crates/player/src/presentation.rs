use std::sync::Arc;

use vpcc_bitstream::Patch;

use crate::decoder::CachedFrame;

/// Everything the renderer needs to draw one point cloud frame: the three
/// decoded video frames (five in dual-layer mode) plus the patch metadata
/// that projects their pixels back into 3-D.
#[derive(Debug, Clone, Default)]
pub struct PresentationFrame {
    pub depth0: Option<Arc<CachedFrame>>,
    pub color0: Option<Arc<CachedFrame>>,
    pub occupancy: Option<Arc<CachedFrame>>,
    pub depth1: Option<Arc<CachedFrame>>,
    pub color1: Option<Arc<CachedFrame>>,
    pub patches: Vec<Patch>,
    pub block_to_patch: Vec<usize>,
}

impl PresentationFrame {
    /// A frame is presentable when all three primary components are
    /// retained.
    pub fn is_valid(&self) -> bool {
        self.depth0.is_some() && self.color0.is_some() && self.occupancy.is_some()
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Outcome of a presentation fetch. Neither miss case is an error: the
/// renderer keeps showing the previous frame and retries next draw call.
#[derive(Debug)]
pub enum FetchResult {
    /// A frame with matching timestamps across all three streams.
    Frame(PresentationFrame),
    /// Nothing new to present yet.
    NoFrameAvailable,
    /// The three decoders disagree on the next timestamp; the
    /// coordinator's flush-and-loop cycle recovers.
    OutOfSyncFrameAvailable,
}
