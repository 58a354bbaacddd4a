//! Shared utilities for the Comlink chat client packages.

pub mod logger;
pub mod time;
