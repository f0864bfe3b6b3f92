use std::path::PathBuf;

use thiserror::Error;

/// Library error type for clip discovery.
#[derive(Debug, Error)]
pub enum Error {
    /// The configured clip path is missing or not a directory.
    #[error("invalid clip directory: {}", .0.display())]
    BadClipDir(PathBuf),

    /// The clip directory holds no decodable frames.
    #[error("no frames found in {}", .0.display())]
    EmptyClip(PathBuf),
}
