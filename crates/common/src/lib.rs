//! Common utilities and types shared across the intercom crates.

#![warn(clippy::pedantic)]

/// Module for identifier newtypes (productions, lines, sessions)
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
