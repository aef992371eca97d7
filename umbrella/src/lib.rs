//! Umbrella bot service

#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    dead_code
)]

/// Statically registered commands
pub mod commands;

/// Configuration populated once at startup
pub mod config;

/// Environment types
pub mod types;
