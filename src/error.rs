use thiserror::Error;

/// Error taxonomy for the redistribution and transform kernels.
///
/// All variants are terminal for the operation that raised them: a
/// precondition violation means the caller handed in inconsistent shapes, a
/// communication failure cannot be retried (collectives are all-or-nothing),
/// and a configuration error is raised at construction time, before any
/// collective is entered.
#[derive(Debug, Error)]
pub enum BandwagonError {
    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("communication failed: {0}")]
    Communication(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BandwagonError>;
