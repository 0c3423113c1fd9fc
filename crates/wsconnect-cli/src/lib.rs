//! Command-line driver for the Workspace activity feeds
//!
//! This crate provides the `wsconnect` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod signals;

pub use cli::Cli;
pub use error::{CliError, CliResult};
