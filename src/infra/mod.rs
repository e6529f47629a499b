//! Infrastructure layer for cross-cutting concerns.
//!
//! Provides foundational infrastructure including:
//! - Configuration loading and validation
//! - Error handling and result types

pub mod config;
pub mod error;
