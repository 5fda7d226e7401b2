use thiserror::Error;

/// Errors raised by the geometry core (`dims`, `split`, `polygonize`,
/// `buffer`). The application layer wraps these in `anyhow` with context.
#[derive(Error, Debug)]
pub enum GeomError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("geometry operation failed: {0}")]
    OpFailure(String),
}

pub type Result<T> = std::result::Result<T, GeomError>;
