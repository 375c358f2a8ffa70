//! Command-line interface.

mod commands;
pub mod icons;
pub mod progress;

pub use commands::run;
