//! Newline-delimited JSON bridge so a non-Rust UI can drive the updater.

pub mod contract;
pub mod handler;
pub mod stdio;
