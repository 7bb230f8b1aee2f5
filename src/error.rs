use thiserror::Error;

/// Everything that can fail outside the numerical core.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("invalid influencer pair ({0}, {1}) for a network of {2} nodes")]
    InvalidInfluencerPair(usize, usize, usize),

    #[error("snapshot references unknown node {0}")]
    UnknownNode(usize),

    #[error("snapshot writer thread is no longer running")]
    SnapshotWriterClosed,
}

pub type Result<T> = std::result::Result<T, SimError>;
