//! CLI command handlers

pub mod commands;

pub use commands::{deps, extract, migrate, translate, MigrateArgs};
