use thiserror::Error;

/// Misuse of the row store by a caller. These indicate a logic bug in the
/// calling component and are never swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowStoreError {
    #[error("index {index} out of range for {len} rows")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("range {index}..{index}+{count} out of bounds for {len} rows")]
    RangeOutOfBounds {
        index: usize,
        count: usize,
        len: usize,
    },

    #[error("row store is empty")]
    Empty,

    #[error("row at {index} has id {found}, expected {expected}")]
    IdMismatch {
        index: usize,
        expected: String,
        found: String,
    },
}

/// Failure reported by the mail provider for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{id}: rejected by provider: {reason}")]
    Rejected { id: String, reason: String },
}

/// Failure reading or writing persisted thread expansion state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("expansion state I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("expansion state parse: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("expansion state serialize: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("expansion state lock poisoned")]
    Poisoned,
}
