//! # Fleet Sync Testing Utils
//!
//! Shared testing utilities for the fleet sync engine.
//!
//! - **Mock Repositories**: In-memory implementations of all repository traits
//! - **Mock Node API**: Scripted node agent responses with call recording
//! - **Test Data Builders**: Utilities for creating nodes and container payloads
//!
//! ```toml
//! [dev-dependencies]
//! fleet-sync-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
