//! Configuration module for Kumo-Loom
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, plus the per-job scrape settings and their preset profiles.
//!
//! # Example
//!
//! ```no_run
//! use kumo_loom::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Bulk concurrency default: {}", config.scraper.max_concurrent);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, ScrapeMode, ScrapeSettings, ServiceConfig};

// Re-export parser and validation functions
pub use parser::load_config;
pub use validation::{validate, validate_bulk_size, validate_settings, MAX_BULK_URLS};
