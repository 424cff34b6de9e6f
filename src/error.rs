use thiserror::Error;

/// Errors surfaced to the host. Audio processing itself never fails; these
/// only come out of lookup, parsing and loading.
#[derive(Debug, Error)]
pub enum DspError {
    #[error("unknown unit id '{0}'")]
    UnknownUnit(String),

    #[error("unit '{id}' is not an {expected}")]
    WrongUnitKind { id: String, expected: &'static str },

    #[error("invalid parameters: {0}")]
    InvalidParams(#[from] serde_json::Error),

    #[error("invalid note event at index {index}: {reason}")]
    InvalidNote { index: usize, reason: String },

    #[error("sample load failed: {0}")]
    Sample(String),
}

#[cfg(feature = "wav")]
impl From<hound::Error> for DspError {
    fn from(e: hound::Error) -> Self {
        DspError::Sample(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DspError>;
