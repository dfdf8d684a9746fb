//! # ScoreShare Common Library
//!
//! Shared code for the ScoreShare ingest service and its upload client:
//! - Error types
//! - Configuration loading and root folder resolution
//! - Upload API request/response types
//! - Session id generation and validation

pub mod api;
pub mod config;
pub mod error;
pub mod session_id;

pub use error::{Error, Result};
