//! Error types for regulator
//!
//! Catalogue merges and CLI input problems surface as `InvalidInput`; anything
//! that goes wrong while talking to a process or a remote host has its own
//! variant so callers can tell "the command said no" apart from "the command
//! never ran".

/// Main error type for regulator operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegulatorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Shell error: {0}")]
    Shell(String),

    #[error("Remote execution error: {0}")]
    RemoteExec(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Command '{command}' exited with non-zero exit status {exit_code}\n\nStdout:\n{stdout}\nStderr:\n{stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
}

impl RegulatorError {
    /// User-correctable errors, worth printing usage next to
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::NotFound(_))
    }

    /// Exit status reported by the failed command, if it ran at all
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RegulatorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for RegulatorError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(format!("Failed to parse yaml:\n{}", err))
    }
}

impl From<toml::de::Error> for RegulatorError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(format!("Failed to parse config:\n{}", err))
    }
}

/// Result type alias for regulator operations
pub type Result<T> = std::result::Result<T, RegulatorError>;
