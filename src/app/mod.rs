pub mod extract;
pub mod letters;
pub mod session;
pub mod state;
pub mod transcriber;
pub mod vocabulary;
