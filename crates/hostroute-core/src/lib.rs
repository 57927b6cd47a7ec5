//! Core building blocks shared by every hostroute crate.
//!
//! - Data model for a routing attempt (queries, candidates, outcomes, results)
//! - Error taxonomy for registry, configuration, connection and dispatch failures
//! - Typed diagnostic trail returned to callers next to the merged answer
//! - Wire types for the worker message contract
//! - Layered configuration (`.env`, TOML file, environment overrides)

pub mod config_manager;
pub mod diagnostics;
pub mod error;
pub mod types;
pub mod wire;

pub use config_manager::*;
pub use diagnostics::*;
pub use error::*;
pub use types::*;
pub use wire::*;
