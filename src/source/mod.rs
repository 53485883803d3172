//! Transcode source
//!
//! This module provides:
//! - Transcoder command-line configuration
//! - Spawning and supervising the transcoder process
//! - The chunked read loop feeding the frame extractor

pub mod config;
pub mod pump;
pub mod transcode;

pub use config::TranscodeConfig;
pub use pump::{pump, PumpEnd, PumpSummary};
pub use transcode::{TranscodeProcess, TranscodeSource};
