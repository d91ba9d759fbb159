/// Playback configuration.
///
/// The queue bounds default to platform-tuned values: some Android
/// decoders need up to 10 input samples pre-buffered before the first
/// output appears, Apple decoders start producing output without
/// pre-buffering, and the Windows HEVC decoder needs deep queues on both
/// sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Present in the container header; single-layer playback carries it
    /// but does not drive the second layer.
    pub dual_layer_mode: bool,
    /// When set, decoded frames carry a CPU pixel buffer instead of GPU
    /// texture handles and the renderer uploads manually.
    pub manual_video_texture_upload: bool,
    pub input_queue_size: usize,
    pub output_queue_size: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        #[cfg(target_os = "android")]
        let (input_queue_size, output_queue_size) = (10, 5);

        #[cfg(any(target_os = "ios", target_os = "macos"))]
        let (input_queue_size, output_queue_size) = (5, 5);

        #[cfg(target_os = "windows")]
        let (input_queue_size, output_queue_size) = (10, 10);

        #[cfg(not(any(
            target_os = "android",
            target_os = "ios",
            target_os = "macos",
            target_os = "windows"
        )))]
        let (input_queue_size, output_queue_size) = (5, 5);

        Self {
            dual_layer_mode: false,
            manual_video_texture_upload: false,
            input_queue_size,
            output_queue_size,
        }
    }
}
