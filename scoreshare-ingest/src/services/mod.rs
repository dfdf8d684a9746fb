//! Chunked upload pipeline
//!
//! Components, leaves first: chunk store, completion detector, assembler,
//! content validator, publisher, session cleaner. The upload coordinator
//! ties them together per request; the stale sweeper removes abandoned
//! sessions in the background.

pub mod assembler;
pub mod chunk_store;
pub mod completion_detector;
pub mod content_validator;
pub mod publisher;
pub mod session_cleaner;
pub mod stale_sweeper;
pub mod upload_coordinator;

pub use assembler::{AssembledFile, Assembler};
pub use chunk_store::{ChunkStore, SessionManifest};
pub use completion_detector::CompletionDetector;
pub use content_validator::ContentValidator;
pub use publisher::{sanitize_file_name, PublishedArtifact, Publisher};
pub use session_cleaner::SessionCleaner;
pub use stale_sweeper::StaleSessionSweeper;
pub use upload_coordinator::{ChunkOutcome, ChunkUpload, SessionState, UploadCoordinator};
