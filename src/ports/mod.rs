pub mod audio_src;
pub mod recognizer;

pub use audio_src::{AudioCallback, PullSource, PushSource};
pub use recognizer::{BoxedRecognizer, DecodingState, EndpointMode, Recognizer};
