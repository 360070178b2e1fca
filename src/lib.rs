//! Byte-compatible reimplementation of the Whisper round-robin
//! time-series file format. See `whisper::file` for the public
//! `create`/`info`/`fetch`/`update`/`update_many` operations.

pub mod config;
pub mod error;
pub mod whisper;

pub use error::{Result, WhisperError};
