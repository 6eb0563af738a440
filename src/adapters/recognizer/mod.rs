pub mod scripted;
#[cfg(feature = "vosk")]
pub mod vosk;
