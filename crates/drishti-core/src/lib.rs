//! Core types and capability traits shared across Drishti crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{DrishtiError, Result};
