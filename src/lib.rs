//! densa: chain-of-density contribution analysis (library crate).
//!
//! Re-exports public modules for integration tests and external use.

pub mod cache;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod env;
pub mod models;
pub mod normalize;
pub mod output;
pub mod parse;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod providers;
