pub mod config;
pub mod error;
pub mod sample;
pub mod sources;
pub mod state;
pub mod target;
