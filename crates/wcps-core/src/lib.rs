//! # wcps-core
//!
//! Core types and utilities for building queries against WCPS (Web Coverage
//! Processing Service) endpoints such as rasdaman.
//!
//! This crate provides the shared error type, client configuration, and the
//! closed domain enums used by the query builder.
//!
//! ## Modules
//!
//! - [`error`] - Error types shared by every WCPS crate
//! - [`config`] - Configuration structures for WCPS clients
//! - [`types`] - Output formats and aggregation kinds

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::{Aggregation, AggregationKind, OutputFormat};
