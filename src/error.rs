use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Driver error: {0}")]
    Driver(#[from] mysql::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("no log entry containing '{keyword}' within the last {window} rows of thread {thread_id}")]
    NotFound {
        keyword: &'static str,
        thread_id: u32,
        window: usize,
    },

    #[error("expected '{expected}' in logged statement '{actual}'")]
    AssertionMismatch { expected: String, actual: String },

    #[error("Unparseable server version: {0}")]
    VersionParse(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid: {0}")]
    Invalid(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Unknown system variable '{0}'")]
    UnknownSystemVariable(String),
}
