use thiserror::Error;

/// Top-level error type for the flowtrace tracer.
#[derive(Error, Debug)]
pub enum FlowtraceError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),
}

pub type Result<T> = std::result::Result<T, FlowtraceError>;
