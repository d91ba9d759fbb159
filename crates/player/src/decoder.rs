use std::sync::{Arc, Mutex};

use vpcc_hevc::DecoderConfig;

use crate::stats::StatsCollection;

/// The pixel payload of a decoded frame: texture handles when the
/// platform uploads for us, a CPU buffer when manual upload is
/// configured.
#[derive(Debug, Clone)]
pub enum FramePayload {
    GpuTextures { luma: u64, chroma: u64 },
    CpuBuffer(Arc<Vec<u8>>),
}

/// One decoded frame handed out by a hardware decoder.
///
/// Reference counted: the player retains at most one frame per decoder
/// for presentation and pairs every retain with a release on all exit
/// paths, including shutdown and loop restart.
#[derive(Debug, Clone)]
pub struct CachedFrame {
    pub pts: i64,
    pub width: u32,
    pub height: u32,
    pub payload: FramePayload,
}

/// The capability contract of a platform hardware HEVC decoder.
///
/// Implementations own bounded input and output queues guarded by their
/// own locks; platform callback threads fill the output queue. The
/// coordinator respects `input_queue_full`/`output_queue_full` as
/// backpressure and never blocks on a decoder.
pub trait HwVideoDecoder: Send {
    /// Prepares the decoder for a stream. The configuration carries
    /// VPS/SPS/PPS in Annex-B form; implementations convert to
    /// length-prefixed form if their platform requires it.
    fn initialize(&mut self, config: &DecoderConfig) -> Result<(), String>;

    fn start(&mut self);
    fn stop(&mut self);

    /// Drops all queued input and output. Playback restarts cleanly
    /// afterwards without re-initialization.
    fn flush(&mut self);

    fn shutdown(&mut self);

    /// Hands one coded picture to the decoder. Returns `false` when the
    /// input queue is full; the caller retries on a later tick.
    fn queue_input(&mut self, data: &[u8], pts: i64, eos: bool) -> bool;

    fn input_queue_full(&self) -> bool;
    fn output_queue_full(&self) -> bool;
    fn output_queue_len(&self) -> usize;

    /// Pumps decoded pictures into the output queue. A no-op on
    /// platforms where output arrives from an internal thread.
    fn dequeue_output(&mut self);

    /// Retains the oldest decoded frame without removing it from the
    /// reference pool. `None` when the output queue is empty.
    fn retain_cached_frame(&mut self) -> Option<Arc<CachedFrame>>;

    /// Releases a frame previously handed out by
    /// [`retain_cached_frame`](HwVideoDecoder::retain_cached_frame).
    fn release_cached_frame(&mut self, frame: Arc<CachedFrame>);

    /// Frames decoded since the last flush; drives the loop statistics.
    fn total_frames_decoded(&self) -> u64;
}

/// The three per-component decoders plus the statistics they feed.
pub struct VideoDecoderContext {
    pub geometry: Mutex<Box<dyn HwVideoDecoder>>,
    pub texture: Mutex<Box<dyn HwVideoDecoder>>,
    pub occupancy: Mutex<Box<dyn HwVideoDecoder>>,
    pub stats: Mutex<StatsCollection>,
}

impl VideoDecoderContext {
    pub fn new(
        geometry: Box<dyn HwVideoDecoder>,
        texture: Box<dyn HwVideoDecoder>,
        occupancy: Box<dyn HwVideoDecoder>,
    ) -> Self {
        Self {
            geometry: Mutex::new(geometry),
            texture: Mutex::new(texture),
            occupancy: Mutex::new(occupancy),
            stats: Mutex::new(StatsCollection::default()),
        }
    }
}
