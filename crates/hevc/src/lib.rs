//! HEVC Annex-B byte stream handling at access-unit granularity.
//!
//! This crate does not decode video. It scans a raw HEVC byte stream for
//! NAL units, extracts the parameter sets a hardware decoder needs for
//! initialization, and splits the stream into per-picture
//! [`VideoPacket`]s keyed by picture order count, which is exactly the
//! granularity a multi-stream playback pipeline schedules on.
//!
//! Parameter sets are parsed only as deep as decoder configuration
//! requires: picture dimensions, profile/tier/level, and the handful of
//! fields the slice header references.
#![deny(unsafe_code)]

mod config;
mod enums;
mod error;
mod nal;
mod packet;
mod pps;
mod profile_tier_level;
mod slice;
mod sps;
mod vps;

pub use self::config::{DecoderConfig, convert_to_length_prefixed};
pub use self::enums::NALUnitType;
pub use self::error::Error;
pub use self::nal::{NalUnit, find_frame_end, scan_nal_units};
pub use self::packet::{VideoPacket, split_into_packets};
pub use self::pps::Pps;
pub use self::profile_tier_level::ProfileTierLevel;
pub use self::slice::SliceHeader;
pub use self::sps::Sps;
pub use self::vps::Vps;

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, Error>;
