pub mod file;
#[cfg(feature = "gstreamer")]
pub mod pulse;
