pub mod audio_src;
pub mod models_repo;
pub mod recognizer;
