//! # Multirank Common Library
//!
//! Shared code for the multirank ranking service:
//! - Database schema, models and pool initialization
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod hash;

pub use error::{Error, Result};
