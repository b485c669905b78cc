pub mod gst_media;
pub mod manifest_engine;
pub mod media;
#[cfg(test)]
pub mod mock;
pub mod poster;
