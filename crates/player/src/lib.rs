//! The V-PCC playback pipeline: three hardware HEVC decoders driven in
//! lock-step so every rendered point cloud frame combines an occupancy,
//! geometry and texture picture with identical presentation timestamps.
//!
//! The crate is embedded, not an application: the platform supplies
//! [`HwVideoDecoder`] implementations and a renderer that consumes
//! [`PresentationFrame`]s; this crate supplies the parsing, the bounded
//! queue discipline, end-of-stream looping and the non-blocking
//! presentation gate.
#![deny(unsafe_code)]

mod config;
mod context;
mod decoder;
mod error;
mod player;
mod presentation;
mod stats;

pub use self::config::PlayerConfig;
pub use self::context::PlaybackContext;
pub use self::decoder::{CachedFrame, FramePayload, HwVideoDecoder, VideoDecoderContext};
pub use self::error::Error;
pub use self::player::Player;
pub use self::presentation::{FetchResult, PresentationFrame};
pub use self::stats::{Stats, StatsCollection};

pub use vpcc_bitstream::ContainerVersion;

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, Error>;
