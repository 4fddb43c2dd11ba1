//! Seqgate Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the seqgate workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all seqgate workspace
//! members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Types**: Stream-type and admitted-item domain types
//! - **Logging**: Tracing setup shared by all binaries
//!
//! # Example
//!
//! ```no_run
//! use seqgate_common::{AdmittedItem, Result, StreamType};
//!
//! fn stream_of(filename: &str) -> Result<StreamType> {
//!     let item = AdmittedItem::parse(filename)?;
//!     Ok(item.stream)
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, SeqgateError};
pub use types::{AdmittedItem, StreamType};
