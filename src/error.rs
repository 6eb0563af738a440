use std::path::PathBuf;

use thiserror::Error;

/// Startup failures. The pipeline never runs half-initialized, so each of
/// these aborts construction and is surfaced to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("can't load model at {path}: {reason}")]
    ModelLoadFailed { path: PathBuf, reason: String },
    #[error("failed to build vocabulary: {0}")]
    VocabularyBuild(String),
    #[error("audio device unavailable: {0}")]
    AudioDeviceUnavailable(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Per-chunk failures. These are logged and the chunk is skipped; the
/// session stays usable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("zero-length audio chunk")]
    Empty,
    #[error("audio chunk of {0} bytes is not a whole number of s16 samples")]
    Malformed(usize),
    #[error("utterance endpointed, reset() must run before more audio is accepted")]
    ResetRequired,
    #[error("final result requested before the utterance endpointed")]
    NotEndpointed,
    #[error("endpoint sensitivity can't change mid-utterance")]
    MidUtterance,
    #[error("recognizer failed to decode chunk: {0}")]
    DecodeFailed(String),
}
