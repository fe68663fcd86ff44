/// Database configuration and connection management
pub mod database;

/// Challenge and badge catalog loading from config.toml
pub mod catalog;

/// Profile sync settings from environment variables
pub mod sync;
