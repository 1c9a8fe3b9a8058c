//! CellarDB - the storage and execution core of a small relational database
//!
//! This library provides:
//! - Tables with a primary-key index, row validation and session locks
//! - Databases and the manager that owns them
//! - Write-ahead logging and crash recovery
//! - Query tables with filtering, cross joins and natural joins

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
