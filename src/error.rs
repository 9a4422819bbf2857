use thiserror::Error;

/// Errors that can occur while extracting regions from a raster.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExtractError {
    #[error("failed to load image: {0}")]
    ImageLoad(String),

    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("tile at ({x}, {y}) unavailable: {reason}")]
    TileSource { x: u32, y: u32, reason: String },

    #[error("failed to render comparison: {0}")]
    Render(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
