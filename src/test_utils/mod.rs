//! Shared fixtures for unit tests across modules
mod common;

pub use common::*;
