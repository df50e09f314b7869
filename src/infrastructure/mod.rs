//! Infrastructure layer - Backends, memoization and process setup

pub mod cache;
pub mod logging;
pub mod memo;
