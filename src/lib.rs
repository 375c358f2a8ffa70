//! ambientmix - ambient mix dataset acquisition pipeline.
//!
//! Crawls ambient-mixer.com listings, detail pages and channel manifests into
//! a JSON array of mixes, downloads the referenced tracks, and turns scraped
//! mixes into chat-style training data.

pub mod cli;
pub mod config;
pub mod crawler;
pub mod logging;
pub mod models;
pub mod scrapers;
pub mod services;
pub mod sink;
