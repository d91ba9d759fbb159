use vpcc_hevc::{DecoderConfig, VideoPacket};

use crate::patch::{EomPatch, Patch, RawPatch};

/// The video substreams a frame group can carry. Conformant single-map
/// streams use only `Occupancy`, `Geometry` and `Texture`; the D0/D1
/// (T0/T1) pairs appear when multiple map streams are present, and the
/// raw variants when raw patches travel in separate video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoType {
    Occupancy,
    Geometry,
    GeometryD0,
    GeometryD1,
    GeometryRaw,
    Texture,
    TextureT0,
    TextureT1,
    TextureRaw,
}

impl VideoType {
    pub const COUNT: usize = 9;

    pub const fn index(&self) -> usize {
        *self as usize
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Occupancy => "occupancy",
            Self::Geometry => "geometry",
            Self::GeometryD0 => "geometry-d0",
            Self::GeometryD1 => "geometry-d1",
            Self::GeometryRaw => "geometry-raw",
            Self::Texture => "texture",
            Self::TextureT0 => "texture-t0",
            Self::TextureT1 => "texture-t1",
            Self::TextureRaw => "texture-raw",
        }
    }
}

/// One HEVC substream of a frame group: the concatenated access units,
/// their per-picture packets, and the extracted decoder configuration.
#[derive(Debug, Clone, Default)]
pub struct VideoStream {
    pub buffer: Vec<u8>,
    pub packets: Vec<VideoPacket>,
    pub decoder_config: Option<DecoderConfig>,
}

impl VideoStream {
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Everything the renderer needs about one atlas frame, plus the byte
/// ranges of its three coded pictures inside the owning group's buffers.
#[derive(Debug, Clone, Default)]
pub struct FrameData {
    pub index: usize,
    pub atlas_frame_order_count: usize,
    pub width: u32,
    pub height: u32,
    /// Synthesized at parse time; all three substream packets of this
    /// frame are queued with this timestamp.
    pub presentation_time_us: i64,
    pub patches: Vec<Patch>,
    pub raw_patches: Vec<RawPatch>,
    pub eom_patches: Vec<EomPatch>,
    /// Dense row-major canvas-block -> `1 + patch_index` map, 0 where no
    /// patch covers the block.
    pub block_to_patch: Vec<usize>,
    /// Reference atlas-frame-order-count lists for inter prediction.
    pub ref_afoc_list: Vec<Vec<usize>>,
    pub occupancy_packet: VideoPacket,
    pub geometry_packet: VideoPacket,
    pub texture_packet: VideoPacket,
}

/// One group of frames: the decoded side information plus the three HEVC
/// byte buffers the packets point into. Frame dimensions are constant
/// within a group.
#[derive(Debug, Clone)]
pub struct FrameGroup {
    pub frame_width: u16,
    pub frame_height: u16,
    pub frames: Vec<FrameData>,
    streams: [VideoStream; VideoType::COUNT],
}

impl Default for FrameGroup {
    fn default() -> Self {
        Self {
            frame_width: 0,
            frame_height: 0,
            frames: Vec::new(),
            streams: std::array::from_fn(|_| VideoStream::default()),
        }
    }
}

impl FrameGroup {
    pub fn stream(&self, video_type: VideoType) -> &VideoStream {
        &self.streams[video_type.index()]
    }

    pub fn stream_mut(&mut self, video_type: VideoType) -> &mut VideoStream {
        &mut self.streams[video_type.index()]
    }

    pub fn occupancy(&self) -> &VideoStream {
        self.stream(VideoType::Occupancy)
    }

    pub fn geometry(&self) -> &VideoStream {
        self.stream(VideoType::Geometry)
    }

    pub fn texture(&self) -> &VideoStream {
        self.stream(VideoType::Texture)
    }
}
