//! # ScoreShare upload client
//!
//! Splits a local file into chunks and uploads it to a scoreshare-ingest
//! server, cancelling the session if the upload fails.

pub mod client;
pub mod plan;

pub use client::{ClientError, ClientResult, UploadClient, UploadOptions};
pub use plan::{plan_chunks, ChunkSpan};
