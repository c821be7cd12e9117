//! Shared domain types for the Strand platform: errors, caller identity,
//! LLM parameters and messages, stream aliases, and the TOML config.

pub mod config;
pub mod error;
pub mod identity;
pub mod llm;
pub mod stream;

pub use error::{Error, Result};
