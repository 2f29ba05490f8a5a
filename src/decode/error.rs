use thiserror::Error;

/// Failures while decoding a single export datagram.
///
/// All variants are fatal for the datagram they occurred in and for nothing
/// else; the caller is expected to log, bump a counter and keep receiving.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated datagram: needed {needed} bytes at offset {offset}, {remaining} remain")]
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("unsupported export version {0}")]
    UnsupportedVersion(u16),

    #[error("malformed packet: {0}")]
    Malformed(String),
}

impl DecodeError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// Failures while restoring a persisted template-registry snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot truncated")]
    Truncated,

    #[error("bad snapshot magic")]
    BadMagic,

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u16),

    #[error("malformed snapshot: {0}")]
    Malformed(String),
}
