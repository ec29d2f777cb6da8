//! Configuration module for Sumi-Mirror
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_mirror::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("mirror.toml")).unwrap();
//! println!("Mirroring {} into {}", config.url, config.output.directory);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CookieEntry, CrawlerConfig, HttpConfig, OutputConfig, ThrottleConfig};

// Re-export parser and validation functions
pub use parser::{load_config, parse_config};
pub use validation::{make_headers, validate};
