//! # Music Library Common Library
//!
//! Shared code for the music library services:
//! - Error type shared by every crate
//! - Bootstrap configuration loading and root folder resolution
//! - Database initialization and catalog schema

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
