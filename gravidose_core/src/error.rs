use thiserror::Error;

/// Construction-time failures. The running core never returns errors: every
/// runtime anomaly degrades to a queryable flag or fallback value instead.
#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing actuator")]
    MissingActuator,
    #[error("missing persistent store")]
    MissingStore,
    #[error("missing user input")]
    MissingInput,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
