//! Core types: errors, configuration, identity, runtime environment.

pub mod config;
pub mod env;
pub mod errors;
pub mod identity;
pub mod paths;
