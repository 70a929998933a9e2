//! update-center library crate.
//!
//! Control plane acquiring and installing firmware updates: download
//! lifecycle, failure classification, installation dispatch, network-aware
//! resume and status presentation, hosted by a single serializing actor.

pub mod config;
pub mod domain;
pub mod downloader;
pub mod error;
pub mod host;
pub mod installer;
pub mod logging;
pub mod network;
pub mod notification;

pub use error::{Error, Result};
