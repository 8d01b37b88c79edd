use thiserror::Error;

/// Error taxonomy for the fusion pipeline. Component-level failures with a
/// safe default (a skipped tile, a zero-element chunk) are downgraded to
/// log warnings at the pipeline boundary; only [`FuseError::LimitExceeded`]
/// and [`FuseError::Fatal`] surface to the caller of a generation.
#[derive(Debug, Error)]
pub enum FuseError {
    /// External fetch failed: network error or non-OK status.
    #[error("transport: {0}")]
    Transport(String),

    /// Malformed provider response.
    #[error("parse: {0}")]
    Parse(String),

    /// A binary cell failed its bounds check on decode.
    #[error("validation: {0}")]
    Validation(String),

    /// CRC32 mismatch on a stored patch.
    #[error("integrity: stored crc32 {stored:#010x} != computed {computed:#010x}")]
    Integrity { stored: u32, computed: u32 },

    /// Requested grid exceeds the configured maximum; rejected before any
    /// work is done.
    #[error("grid too large: {cols}×{rows} exceeds the {limit}-cell limit")]
    LimitExceeded { cols: usize, rows: usize, limit: usize },

    /// Unexpected invariant violation; aborts the generation.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl FuseError {
    #[inline]
    pub fn transport(msg: impl Into<String>) -> Self {
        FuseError::Transport(msg.into())
    }

    #[inline]
    pub fn parse(msg: impl Into<String>) -> Self {
        FuseError::Parse(msg.into())
    }

    /// True for the errors that must abort a generation instead of being
    /// downgraded to a warning.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FuseError::LimitExceeded { .. } | FuseError::Fatal(_))
    }
}

pub type FuseResult<T> = Result<T, FuseError>;
