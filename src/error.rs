use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("format unsupported: {}", .0.display())]
    FormatUnsupported(PathBuf),
    #[error("file is not a track: {}", .0.display())]
    NotATrack(PathBuf),
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },
    #[error("failed to seek {}: {message}", path.display())]
    Seek { path: PathBuf, message: String },
}

impl LoadError {
    /// Selection errors the controller ignores without touching the queue.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::FormatUnsupported(_) | Self::NotATrack(_))
    }
}
