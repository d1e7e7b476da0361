use thiserror::Error;

/// Errors produced while parsing, merging, rendering or encoding presets.
#[derive(Debug, Error)]
pub enum KickError {
    /// The input could not be read as a preset document at all.
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// The document parsed but its structure does not fit the preset schema.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Fewer than two nodes, endpoints not at 0/1, or positions out of order.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// An index outside its defined domain.
    #[error("{what} index {index} out of range {min}..={max}")]
    Range {
        what: &'static str,
        index: usize,
        min: usize,
        max: usize,
    },

    /// The template does not have the fixed slot/chain/macro topology.
    #[error("Template mismatch: {0}")]
    TemplateMismatch(String),

    /// A requested output format this crate cannot produce.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("WAV encoding failed: {0}")]
    Encode(#[from] hound::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KickError>;

impl KickError {
    pub(crate) fn range(what: &'static str, index: usize, min: usize, max: usize) -> Self {
        KickError::Range {
            what,
            index,
            min,
            max,
        }
    }
}
