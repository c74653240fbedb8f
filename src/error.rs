use thiserror::Error;

/// Library error type for asset discovery and loading.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured asset directory is missing or not a directory.
    #[error("invalid asset directory: {0}")]
    BadDir(String),

    /// The scan completed but found no images.
    #[error("no images found in {0}")]
    EmptyLibrary(String),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The asset exists but could not be decoded.
    #[error(transparent)]
    Decode(#[from] image::ImageError),

    /// Directory traversal failed.
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
