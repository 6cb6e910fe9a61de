//! Command implementations for the CLI
//!
//! - check: open and ping every configured database
//! - config: configuration display and validation

pub mod check;
pub mod config;
