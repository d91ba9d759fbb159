//! A parser for V-PCC (Video-based Point Cloud Compression) bitstreams.
//!
//! A V-PCC container packs a volumetric point cloud sequence into three
//! synchronized HEVC video substreams (occupancy, geometry, texture) plus
//! the atlas side information a renderer needs to re-project the decoded
//! 2-D samples into 3-D points. This crate ingests the container byte
//! stream and produces frame-indexed [`FrameGroup`] records: materialized
//! patches, dense block-to-patch maps, per-component decoder
//! configurations and per-frame packet byte ranges with synthesized
//! presentation timestamps.
//!
//! The primary syntax tables cover the TMC2 draft 8/11/12.1 bitstreams
//! (sample-stream framing, atlas NAL layer); draft 6 is handled by the
//! [`legacy`] module behind the same entry points.
#![deny(unsafe_code)]

mod container;
mod error;
mod frame;
mod parser;
mod patch;
mod reconstruct;
mod unit;
mod vps;

pub mod atlas;
pub mod legacy;

#[cfg(test)]
mod tests;

pub use self::container::{
    CONTAINER_MAGIC, CONTAINER_VERSION, ContainerHeader, ContainerVersion, SampleStreamHeader,
};
pub use self::error::Error;
pub use self::frame::{FrameData, FrameGroup, VideoStream, VideoType};
pub use self::parser::{parse_first_frame_group, parse_frame_groups};
pub use self::patch::{EomPatch, Patch, PatchOrientation, RawPatch};
pub use self::reconstruct::create_block_to_patch;
pub use self::unit::{V3cUnitHeader, V3cUnitType};
pub use self::vps::{
    AtlasInfo, AttributeInfo, AttributeInformation, GeometryInformation, OccupancyInformation,
    VpccParameterSet, VpccProfileTierLevel,
};

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, Error>;
