//! Speech-to-letter recognition for a spoken-alphabet toy.
//!
//! Audio flows from a [`ports::PushSource`] or [`ports::PullSource`] into a
//! grammar-constrained [`app::session::RecognizerSession`]. Each result is
//! resolved to a single [`app::letters::Letter`] and published through
//! [`app::state::StatePublisher`] for a render loop to poll.

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod ports;

pub use app::letters::{AliasTable, Letter, LetterResolver};
pub use app::session::RecognizerSession;
pub use app::state::{recognition_state, ChangeTracker, Snapshot, StatePublisher, StateReader};
pub use app::transcriber::{PullPipeline, PushPipeline, Recognition, RecognitionResult};
pub use app::vocabulary::Vocabulary;
pub use error::{ChunkError, PipelineError};
