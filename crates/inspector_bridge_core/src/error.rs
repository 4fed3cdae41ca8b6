use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum CdpError {
    #[error("Connection error: no debugger targets found at {0}")]
    NoTarget(String),

    #[error("Connection error: discovery request failed: {0}")]
    Discovery(#[from] reqwest::Error),

    #[error("Connection error: transport failure: {0}")]
    Transport(Box<tungstenite::Error>),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {code} - {message}")]
    Protocol {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Session closed")]
    SessionClosed,

    #[error("Command timeout after {0:?}")]
    Timeout(Duration),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<tungstenite::Error> for CdpError {
    fn from(err: tungstenite::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}

impl CdpError {
    pub fn protocol(code: i64, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// True for failures that happen while reaching the target at all:
    /// discovery, socket setup, or a transport that went away.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::NoTarget(_) | Self::Discovery(_) | Self::Transport(_) | Self::Connection(_)
        )
    }
}
