/// Result alias that carries the custom [`SpectrumError`] type.
pub type Result<T> = std::result::Result<T, SpectrumError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SpectrumError {
    /// Configuration that cannot produce a working pipeline, such as an
    /// analysis window with no samples. Raised at construction time only.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The external media framework refused an operation.
    #[error("media error: {0}")]
    Media(String),
    /// Free-form failure surfaced to the caller as a readable message.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed JSON configuration.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl SpectrumError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn media<T: Into<String>>(msg: T) -> Self {
        Self::Media(msg.into())
    }
}

impl From<&str> for SpectrumError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SpectrumError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<realfft::FftError> for SpectrumError {
    fn from(value: realfft::FftError) -> Self {
        Self::msg(format!("fft failed: {value}"))
    }
}
