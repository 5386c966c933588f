pub mod config;
pub mod ocr;
pub mod session;
pub mod stability;
pub mod video_source;

#[cfg(test)]
pub(crate) mod testing;
