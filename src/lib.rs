//! flac2mp3 - Batch FLAC to MP3 Conversion
//!
//! Converts every FLAC file in a folder to MP3 by orchestrating ffprobe
//! (tags), ffmpeg (decode to WAV) and lame (encode), naming each output
//! from a user template filled with the track's tags.

pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod metadata;
pub mod naming;
pub mod progress;
pub mod transcode;
pub mod workflow;
