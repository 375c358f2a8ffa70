//! Service layer for ambientmix business logic.
//!
//! This module contains domain logic separated from UI concerns.

pub mod dataset;
pub mod download;

pub use download::{DownloadConfig, DownloadEvent, DownloadResult, DownloadService};
