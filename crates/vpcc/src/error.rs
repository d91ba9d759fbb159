#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad container magic: 0x{0:08X}")]
    BadMagic(u32),
    #[error("unsupported container version: {0}")]
    UnsupportedVersion(u32),
    #[error("unit payload overruns its declared size: declared {declared}, consumed {consumed}")]
    SizeOverrun { declared: usize, consumed: usize },
    #[error("expected {0} unit before this point in the stream")]
    MissingUnit(&'static str),
    #[error("no V3C parameter set with id {0} has been seen")]
    NoActiveVps(u8),
    #[error("{kind} id {id} has not been seen")]
    MissingAtlasParameterSet { kind: &'static str, id: usize },
    #[error("invalid tile group type: {0}")]
    InvalidTileGroupType(u32),
    #[error("invalid patch mode {mode} for {tile_group} tile group")]
    InvalidPatchMode { mode: u8, tile_group: &'static str },
    #[error("invalid patch orientation index: {0}")]
    InvalidOrientation(u32),
    #[error("patch references missing atlas frame {afoc}")]
    MissingReferenceFrame { afoc: usize },
    #[error("patch references patch {patch_index} of atlas frame {afoc}, which has {available}")]
    MissingReferencePatch {
        afoc: usize,
        patch_index: usize,
        available: usize,
    },
    #[error("{video_type} stream carries {packets} coded pictures for {frames} atlas frames")]
    PacketCountMismatch {
        video_type: &'static str,
        packets: usize,
        frames: usize,
    },
    #[error("frame size changed between frame groups: {previous_width}x{previous_height} -> {width}x{height}")]
    InconsistentFrameSize {
        previous_width: u16,
        previous_height: u16,
        width: u16,
        height: u16,
    },
    #[error("hevc: {0}")]
    Hevc(#[from] vpcc_hevc::Error),
}
