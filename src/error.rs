use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio segmentation failed: {0}")]
    Segmentation(String),

    #[error("transcription failed: {0}")]
    Transcribe(String),

    #[error("translation failed: {0}")]
    Translate(String),

    #[error("translation output rejected for chunk {chunk} after {attempts} attempts")]
    Validation { chunk: usize, attempts: usize },

    #[error("merge failed: {0}")]
    Merge(String),

    #[error("pipeline worker panicked: {0}")]
    Panic(String),

    #[error("task cancelled")]
    Cancelled,
}

impl Error {
    /// True for the cancellation signal itself, as opposed to the failure
    /// that caused it. The task result is the first error for which this
    /// returns false.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
