use thiserror::Error;

/// Transport failure on the push channel, an event stream or a poll.
///
/// None of these escape the engine: they are logged and turned into
/// `PollFailed`, `StreamClosed` or `ConnectionChanged` messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("timeout")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed payload: {0}")]
    Decode(String),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("{0} subjects have no event stream")]
    Unsupported(String),
}

impl From<reqwest::Error> for ChannelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ChannelError::Timeout;
        }
        if err.is_decode() {
            return ChannelError::Decode(err.to_string());
        }
        ChannelError::Network(err.to_string())
    }
}

impl From<url::ParseError> for ChannelError {
    fn from(err: url::ParseError) -> Self {
        ChannelError::InvalidUrl(err.to_string())
    }
}
