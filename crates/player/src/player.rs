use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use tracing::{info, warn};
use vpcc_bitstream::{ContainerVersion, FrameGroup, parse_frame_groups};

use crate::config::PlayerConfig;
use crate::context::PlaybackContext;
use crate::decoder::{HwVideoDecoder, VideoDecoderContext};
use crate::presentation::{FetchResult, PresentationFrame};
use crate::stats::{Stats, StatsCollection};
use crate::{Error, Result};

const MIN_OUTPUT_QUEUE_SIZE: usize = 1;

/// Number of renderer draw calls one decoded frame stays current for.
/// A clock-driven frame index would replace this; every platform runs at
/// duration 1 today.
const FRAME_DURATION: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum State {
    Initialized = 0,
    Playing = 1,
    Stopped = 2,
    Paused = 3,
    Shutdown = 4,
}

impl From<u8> for State {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Playing,
            2 => Self::Stopped,
            3 => Self::Paused,
            4 => Self::Shutdown,
            _ => Self::Initialized,
        }
    }
}

/// The playback coordinator.
///
/// Owns the parsed bitstream, the three hardware decoders and the single
/// background worker that drives them in lock-step. The renderer thread
/// calls [`fetch_presentation_frame`](Player::fetch_presentation_frame)
/// every draw call; everything else is control surface.
pub struct Player {
    config: PlayerConfig,
    state: Arc<AtomicU8>,
    context: Option<Arc<PlaybackContext>>,
    decoders: Arc<VideoDecoderContext>,
    worker: Option<JoinHandle<()>>,
    presentation_frame: PresentationFrame,
    frame_duration_counter: u64,
}

impl Player {
    /// Creates a player around three platform decoders (geometry,
    /// texture, occupancy).
    pub fn new(
        config: PlayerConfig,
        geometry: Box<dyn HwVideoDecoder>,
        texture: Box<dyn HwVideoDecoder>,
        occupancy: Box<dyn HwVideoDecoder>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(AtomicU8::new(State::Initialized as u8)),
            context: None,
            decoders: Arc::new(VideoDecoderContext::new(geometry, texture, occupancy)),
            worker: None,
            presentation_frame: PresentationFrame::default(),
            frame_duration_counter: 0,
        }
    }

    /// Parses a whole container and prepares playback: decoder
    /// initialization from the first frame group's parameter sets, then
    /// the coordinator worker. All parse errors surface here, before any
    /// frame is queued.
    pub fn open(&mut self, data: &[u8], version: ContainerVersion) -> Result<()> {
        let frame_groups = parse_frame_groups(data, version)?;

        self.open_frame_groups(frame_groups)
    }

    /// Starts playback over already-parsed frame groups.
    pub fn open_frame_groups(&mut self, frame_groups: Vec<FrameGroup>) -> Result<()> {
        {
            let first = frame_groups.first().ok_or(Error::NotOpened)?;

            initialize_decoder(
                &mut **self.decoders.geometry.lock().expect("decoder lock"),
                "geometry",
                first.geometry().decoder_config.as_ref(),
            )?;
            initialize_decoder(
                &mut **self.decoders.texture.lock().expect("decoder lock"),
                "texture",
                first.texture().decoder_config.as_ref(),
            )?;
            initialize_decoder(
                &mut **self.decoders.occupancy.lock().expect("decoder lock"),
                "occupancy",
                first.occupancy().decoder_config.as_ref(),
            )?;
        }

        let context = Arc::new(PlaybackContext::new(frame_groups));
        self.context = Some(Arc::clone(&context));

        let state = Arc::clone(&self.state);
        let decoders = Arc::clone(&self.decoders);

        self.worker = Some(std::thread::spawn(move || {
            coordinator_loop(state, context, decoders);
        }));

        self.state
            .store(State::Initialized as u8, Ordering::Release);

        Ok(())
    }

    pub fn play(&mut self) {
        self.state.store(State::Playing as u8, Ordering::Release);
    }

    pub fn pause(&mut self) {
        self.state.store(State::Paused as u8, Ordering::Release);
    }

    pub fn resume(&mut self) {
        self.state.store(State::Playing as u8, Ordering::Release);
    }

    pub fn stop(&mut self) {
        for decoder in [
            &self.decoders.geometry,
            &self.decoders.texture,
            &self.decoders.occupancy,
        ] {
            decoder.lock().expect("decoder lock").stop();
        }

        self.state.store(State::Stopped as u8, Ordering::Release);
    }

    /// Stops the worker, shuts the decoders down and releases the
    /// retained presentation frame.
    pub fn shutdown(&mut self) {
        self.state.store(State::Shutdown as u8, Ordering::Release);

        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        for decoder in [
            &self.decoders.geometry,
            &self.decoders.texture,
            &self.decoders.occupancy,
        ] {
            decoder.lock().expect("decoder lock").shutdown();
        }

        self.release_presentation_frame();
    }

    pub fn stats_collection(&self) -> StatsCollection {
        *self.decoders.stats.lock().expect("stats lock")
    }

    /// The presentation gate, called from the renderer at draw cadence.
    /// Never blocks: a miss returns the previously retained frame when
    /// one exists.
    pub fn fetch_presentation_frame(&mut self) -> FetchResult {
        let state = State::from(self.state.load(Ordering::Acquire));

        if state == State::Paused {
            return if self.presentation_frame.is_valid() {
                FetchResult::Frame(self.presentation_frame.clone())
            } else {
                FetchResult::NoFrameAvailable
            };
        }

        // The retained frame stays current until its duration elapses.
        if self.presentation_frame.is_valid() && !self.presentation_frame_completed() {
            return FetchResult::Frame(self.presentation_frame.clone());
        }

        let Some(context) = self.context.clone() else {
            return FetchResult::NoFrameAvailable;
        };

        if !self.next_presentation_frame_available() {
            return if self.presentation_frame.is_valid() {
                FetchResult::Frame(self.presentation_frame.clone())
            } else {
                FetchResult::NoFrameAvailable
            };
        }

        self.release_presentation_frame();

        let depth0 = self
            .decoders
            .geometry
            .lock()
            .expect("decoder lock")
            .retain_cached_frame();
        let color0 = self
            .decoders
            .texture
            .lock()
            .expect("decoder lock")
            .retain_cached_frame();
        let occupancy = self
            .decoders
            .occupancy
            .lock()
            .expect("decoder lock")
            .retain_cached_frame();

        if depth0.is_none() || color0.is_none() || occupancy.is_none() {
            // A queue drained between the availability check and the
            // retain; put everything back and try again next draw call.
            self.presentation_frame = PresentationFrame {
                depth0,
                color0,
                occupancy,
                ..Default::default()
            };
            self.release_presentation_frame();

            return FetchResult::NoFrameAvailable;
        }
        let (Some(depth0), Some(color0), Some(occupancy)) = (depth0, color0, occupancy) else {
            unreachable!()
        };

        let in_sync = depth0.pts == color0.pts && depth0.pts == occupancy.pts;

        if !in_sync {
            warn!(
                geometry_pts = depth0.pts,
                texture_pts = color0.pts,
                occupancy_pts = occupancy.pts,
                "presentation streams out of sync"
            );

            self.presentation_frame = PresentationFrame {
                depth0: Some(depth0),
                color0: Some(color0),
                occupancy: Some(occupancy),
                ..Default::default()
            };
            self.release_presentation_frame();

            return FetchResult::OutOfSyncFrameAvailable;
        }

        let metadata = context
            .take_render_frame(|frame| (frame.patches.clone(), frame.block_to_patch.clone()));

        let Some((patches, block_to_patch)) = metadata else {
            self.presentation_frame = PresentationFrame {
                depth0: Some(depth0),
                color0: Some(color0),
                occupancy: Some(occupancy),
                ..Default::default()
            };
            self.release_presentation_frame();

            return FetchResult::NoFrameAvailable;
        };

        self.presentation_frame = PresentationFrame {
            depth0: Some(depth0),
            color0: Some(color0),
            occupancy: Some(occupancy),
            depth1: None,
            color1: None,
            patches,
            block_to_patch,
        };

        FetchResult::Frame(self.presentation_frame.clone())
    }

    fn presentation_frame_completed(&mut self) -> bool {
        if self.frame_duration_counter >= FRAME_DURATION {
            self.frame_duration_counter = 0;

            return true;
        }

        self.frame_duration_counter += 1;

        false
    }

    fn next_presentation_frame_available(&self) -> bool {
        let mut available = true;

        for decoder in [
            &self.decoders.geometry,
            &self.decoders.texture,
            &self.decoders.occupancy,
        ] {
            available &= decoder.lock().expect("decoder lock").output_queue_len()
                >= MIN_OUTPUT_QUEUE_SIZE;
        }

        available
    }

    fn release_presentation_frame(&mut self) {
        if let Some(frame) = self.presentation_frame.depth0.take() {
            self.decoders
                .geometry
                .lock()
                .expect("decoder lock")
                .release_cached_frame(frame);
        }

        if let Some(frame) = self.presentation_frame.color0.take() {
            self.decoders
                .texture
                .lock()
                .expect("decoder lock")
                .release_cached_frame(frame);
        }

        if let Some(frame) = self.presentation_frame.occupancy.take() {
            self.decoders
                .occupancy
                .lock()
                .expect("decoder lock")
                .release_cached_frame(frame);
        }

        self.presentation_frame.clear();
    }

    /// The effective queue bounds, for embedders sizing their decoder
    /// wrappers.
    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shutdown();
        }
    }
}

fn initialize_decoder(
    decoder: &mut dyn HwVideoDecoder,
    stream: &'static str,
    config: Option<&vpcc_hevc::DecoderConfig>,
) -> Result<()> {
    let config = config.ok_or(Error::MissingDecoderConfig(stream))?;

    info!(
        stream,
        width = config.width,
        height = config.height,
        profile = config.profile_tier_level.profile_name(),
        tier = config.profile_tier_level.tier_name(),
        level = config.profile_tier_level.level(),
        "initializing decoder"
    );

    decoder
        .initialize(config)
        .map_err(|reason| Error::DecoderInit { stream, reason })?;

    decoder.start();

    Ok(())
}

/// The coordinator worker: one cooperative loop that feeds all three
/// decoders in lock-step, pumps their outputs, and loops playback at end
/// of stream.
fn coordinator_loop(
    state: Arc<AtomicU8>,
    context: Arc<PlaybackContext>,
    decoders: Arc<VideoDecoderContext>,
) {
    let mut input_eos = false;
    let mut output_eos = false;
    let mut pass_start = Instant::now();

    loop {
        match State::from(state.load(Ordering::Acquire)) {
            State::Playing => {
                if !context.input_eos() {
                    queue_input_buffers(&context, &decoders);
                } else {
                    input_eos = true;
                }

                if input_eos && context.output_eos() {
                    output_eos = true;
                }

                if !output_eos {
                    pump_outputs(&decoders);
                } else {
                    loop_restart(&context, &decoders, pass_start);

                    input_eos = false;
                    output_eos = false;
                    pass_start = Instant::now();
                }
            }
            State::Shutdown => break,
            _ => {}
        }

        std::thread::yield_now();
    }
}

/// True only when all three decoders can accept input; the slowest
/// decoder throttles the other two so the streams never drift apart.
fn should_queue_input(decoders: &VideoDecoderContext) -> bool {
    let mut result = true;

    for decoder in [&decoders.geometry, &decoders.texture, &decoders.occupancy] {
        let decoder = decoder.lock().expect("decoder lock");
        result &= !decoder.input_queue_full() && !decoder.output_queue_full();
    }

    result
}

/// Queues the current frame's three packets with one shared timestamp.
/// The input cursor advances only when all three decoders accepted their
/// packet; a partial queue retries on the next tick.
fn queue_input_buffers(context: &PlaybackContext, decoders: &VideoDecoderContext) {
    if !should_queue_input(decoders) {
        return;
    }

    let Some((group, frame)) = context.current_decoder_frame() else {
        return;
    };

    let pts = frame.presentation_time_us;
    let eos = context.input_eos();

    let mut succeeded = true;

    {
        let packet = frame.geometry_packet;
        let buffer = &group.geometry().buffer[packet.offset..packet.offset + packet.length];

        succeeded &= decoders
            .geometry
            .lock()
            .expect("decoder lock")
            .queue_input(buffer, pts, eos);
    }

    {
        let packet = frame.texture_packet;
        let buffer = &group.texture().buffer[packet.offset..packet.offset + packet.length];

        succeeded &= decoders
            .texture
            .lock()
            .expect("decoder lock")
            .queue_input(buffer, pts, eos);
    }

    {
        let packet = frame.occupancy_packet;
        let buffer = &group.occupancy().buffer[packet.offset..packet.offset + packet.length];

        succeeded &= decoders
            .occupancy
            .lock()
            .expect("decoder lock")
            .queue_input(buffer, pts, eos);
    }

    if succeeded {
        context.advance_decoder_frame();
    }
}

fn pump_outputs(decoders: &VideoDecoderContext) {
    for decoder in [&decoders.geometry, &decoders.texture, &decoders.occupancy] {
        let mut decoder = decoder.lock().expect("decoder lock");

        if !decoder.output_queue_full() {
            decoder.dequeue_output();
        }
    }
}

/// End of stream: record the pass statistics, flush the decoders and
/// rewind both cursors.
fn loop_restart(context: &PlaybackContext, decoders: &VideoDecoderContext, pass_start: Instant) {
    let elapsed_ms = pass_start.elapsed().as_millis() as u64;

    let mut stats = decoders.stats.lock().expect("stats lock");

    {
        let (decoder, slot) = (&decoders.geometry, &mut stats.geometry);
        let mut decoder = decoder.lock().expect("decoder lock");

        *slot = Stats::from_pass(elapsed_ms, decoder.total_frames_decoded());
        decoder.flush();
    }
    {
        let (decoder, slot) = (&decoders.texture, &mut stats.texture);
        let mut decoder = decoder.lock().expect("decoder lock");

        *slot = Stats::from_pass(elapsed_ms, decoder.total_frames_decoded());
        decoder.flush();
    }
    {
        let (decoder, slot) = (&decoders.occupancy, &mut stats.occupancy);
        let mut decoder = decoder.lock().expect("decoder lock");

        *slot = Stats::from_pass(elapsed_ms, decoder.total_frames_decoded());
        decoder.flush();
    }

    info!(
        elapsed_ms,
        geometry_fps = stats.geometry.average_fps,
        texture_fps = stats.texture.average_fps,
        occupancy_fps = stats.occupancy.average_fps,
        "playback pass complete, looping"
    );

    drop(stats);

    context.reset();
}
