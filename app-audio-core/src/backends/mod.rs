//! Backends that run entirely in-process.
//!
//! Native adapters live in their own crates (`app-audio-macos`).

pub mod manual;
