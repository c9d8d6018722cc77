//! Clipforged - dataset curation server for media clips
//!
//! This library crate exposes the core functionality for integration testing.

pub mod assist;
pub mod config;
pub mod dataset;
pub mod download;
pub mod server;
pub mod streaming;
pub mod trim;
