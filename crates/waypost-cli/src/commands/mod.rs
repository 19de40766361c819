//! CLI command implementations for Waypost.

pub mod processes;
pub mod serve;
pub mod simulate;
