use pairsync_common::protocol::events::ServerEvent;
use thiserror::Error;

/// Codes reported to clients in `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidMessage,
    FrameTooLarge,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::FrameTooLarge => "FRAME_TOO_LARGE",
        }
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::InvalidMessage => "frame is not a valid relay event",
            Self::FrameTooLarge => "frame exceeds the maximum allowed size",
        }
    }

    pub fn to_event(self) -> ServerEvent {
        self.to_event_with_message(self.default_message())
    }

    pub fn to_event_with_message(self, message: impl Into<String>) -> ServerEvent {
        ServerEvent::Error { code: self.as_str().to_string(), message: message.into() }
    }
}

/// Failure of the outbound submission call.
///
/// Never surfaced to clients; the submission path logs it and moves on.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("invalid persistence origin `{origin}`: {source}")]
    InvalidOrigin {
        origin: String,
        #[source]
        source: url::ParseError,
    },

    #[error("submission request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("submission rejected with status {0}")]
    Rejected(reqwest::StatusCode),
}
