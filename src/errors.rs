/// All error types that can occur when driving a Hue bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to deserialize JSON data.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// An HTTP request to the bridge failed at the transport level.
    #[error("http {action} error: {err}")]
    Http {
        action: String,
        err: reqwest::Error,
    },

    /// The bridge answered with a non-success status code.
    #[error("bridge returned http status {0}")]
    HttpStatus(reqwest::StatusCode),

    /// The bridge rejected the username (it answers with a JSON array).
    #[error("authorization failed, username invalid")]
    Unauthorized,

    /// Host, username or client key is empty.
    #[error("bridge host, username or client key is empty")]
    MissingCredentials,

    /// The streaming client key is not valid hex.
    #[error("client key {0:?} is not a hex string")]
    InvalidClientKey(String),

    /// No lights are available yet; the device is not ready.
    #[error("device not ready; no lights available")]
    NotReady,

    /// Fewer colors were supplied than there are configured lights.
    #[error("{lights} lights configured but only {colors} colors supplied")]
    ColorCountMismatch { lights: usize, colors: usize },

    /// The configured group does not exist on the bridge.
    #[error("group {0} isn't used on this bridge")]
    GroupNotFound(u16),

    /// The configured group exists but cannot be used for streaming.
    #[error("group {0} is not an entertainment group")]
    NotEntertainmentGroup(u16),

    /// The secure streaming transport failed.
    #[error("stream {action} error: {reason}")]
    Stream { action: String, reason: String },
}

impl Error {
    /// Create a new HTTP transport error
    pub fn http(action: &str, err: reqwest::Error) -> Self {
        Error::Http {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new streaming error
    pub fn stream(action: &str, reason: impl ToString) -> Self {
        Error::Stream {
            action: action.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
