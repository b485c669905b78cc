pub mod config;
pub mod error;
pub mod playback_state;
pub mod session;
pub mod stream;
