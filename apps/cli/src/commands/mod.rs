//! Command implementations for the Tuner CLI.

pub mod config;
pub mod dataset;
pub mod estimate;
pub mod logs;
pub mod models;
pub mod train;
pub mod types;

pub use types::{ConfigCommand, TrainArgs};
