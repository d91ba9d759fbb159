#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parse: {0}")]
    Parse(#[from] vpcc_bitstream::Error),
    #[error("{stream} decoder failed to initialize: {reason}")]
    DecoderInit {
        stream: &'static str,
        reason: String,
    },
    #[error("the {0} substream carries no decoder configuration")]
    MissingDecoderConfig(&'static str),
    #[error("no bitstream has been opened")]
    NotOpened,
}
