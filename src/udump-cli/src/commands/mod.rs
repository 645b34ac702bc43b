//! Command handlers for the udump CLI
//!
//! Each subcommand has its own module with handler functions.

pub mod generate;
pub mod info;
pub mod layout;
pub mod names;
