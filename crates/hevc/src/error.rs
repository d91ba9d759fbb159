#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("forbidden_zero_bit is not zero")]
    ForbiddenZeroBit,
    #[error("missing {0} before first slice")]
    MissingParameterSet(&'static str),
    #[error("{kind} id {id} out of range")]
    ParameterSetIdOutOfRange { kind: &'static str, id: u32 },
    #[error("slice references unknown {kind} id {id}")]
    UnknownParameterSet { kind: &'static str, id: u32 },
    #[error("invalid slice_type: {0}")]
    InvalidSliceType(u32),
}
