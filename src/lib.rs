//! Configuration sync layer between a central catalog and polling engines.
//!
//! The catalog publishes deployment stamps, chain runtime properties,
//! libraries and common variables into a KV store with blocking-query
//! semantics; engines long-poll it and report their state back. Secured
//! variables live in a separate secret store, arbitrated with the plain ones
//! by [`VariableCoordinator`].

mod action_log;
mod config;
mod errors;
mod kv;
mod model;
mod secrets;
mod sync;
mod variables;
mod watch;

pub(crate) mod constants;
pub(crate) mod utils;

pub use action_log::*;
pub use config::*;
pub use errors::*;
pub use kv::*;
pub use model::*;
pub use secrets::*;
pub use sync::ConfigSyncService;
pub use variables::*;
pub use watch::*;

pub use constants::NAMESPACE_VARIABLE_NAME;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
