//! Strand gateway: the HTTP surface and run orchestration for the agent
//! graph execution platform.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
