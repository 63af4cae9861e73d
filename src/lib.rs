//! Playrec - play an excitation signal while capturing the response.
//!
//! The library exposes the audio engine (sample codec, interface directory,
//! capture and playback), the dual-stream coordinator and the sweep
//! generator; `main.rs` wires them into a measurement CLI.

pub mod audio;
pub mod config;
pub mod coordinator;
pub mod report;
pub mod signal;
