//! ManaQL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the ManaQL project.
//!
//! # Overview
//!
//! This crate provides common functionality used across all ManaQL workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Centralised `tracing` subscriber setup
//! - **Types**: The card vocabulary (colors, games, finishes), primary type
//!   classification and the packed format-legality bitmap
//!
//! # Example
//!
//! ```
//! use manaql_common::types::{classify, LegalityBitmap, PrimaryType};
//!
//! assert_eq!(classify(Some("Sorcery // Land")), PrimaryType::Sorcery);
//!
//! let bitmap = LegalityBitmap::encode([("modern", "legal"), ("vintage", "restricted")]);
//! assert_eq!(bitmap.get("vintage").as_str(), "restricted");
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{ManaqlError, Result};
