//! cachecheck CLI
//!
//! Offline inspection and verification of exported browser token caches.

pub mod commands;
pub mod output;
