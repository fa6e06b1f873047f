use super::job::JobState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IpsnipeError {
    #[error("illegal job transition for {tool}: {from:?} -> {to:?}")]
    Transition {
        tool: String,
        from: JobState,
        to: JobState,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {tool} output: {message}")]
    Parse { tool: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IpsnipeError {
    pub fn parse(tool: &str, message: impl Into<String>) -> Self {
        IpsnipeError::Parse {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}
