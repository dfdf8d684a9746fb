//! ScoreShare upload client
//!
//! Speaks the chunked upload protocol: one multipart request per chunk, in
//! any order and optionally in parallel, then a cancel request if anything
//! fails so the server does not keep a half-finished session.

use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use scoreshare_common::api::{
    CancelRequest, ChunkResponse, ErrorResponse, PublishedResponse, FIELD_CHUNK_INDEX, FIELD_FILE,
    FIELD_FILE_NAME, FIELD_TOTAL_CHUNKS, FIELD_UNIQUE_ID, UPLOAD_CANCEL_PATH, UPLOAD_CHUNK_PATH,
};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::plan::{plan_chunks, ChunkSpan, DEFAULT_CHUNK_SIZE};

const USER_AGENT: &str = concat!("scoreshare-upload/", env!("CARGO_PKG_VERSION"));

/// Upload client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server rejected request ({status} {code}): {message}")]
    Server {
        status: u16,
        code: String,
        message: String,
        retryable: bool,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Every chunk was accepted but the server never published the file")]
    NotPublished,

    #[error("Published file does not match local file: {0}")]
    Mismatch(String),
}

impl ClientError {
    /// Whether resending the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) => true,
            ClientError::Server { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Tunables for one upload
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Bytes per chunk
    pub chunk_size: usize,
    /// Chunk requests in flight at once
    pub parallel: usize,
    /// Extra attempts per chunk after a retryable failure
    pub retries: u32,
    /// Session id; generated when absent
    pub session_id: Option<String>,
    /// Display file name; the local file name when absent
    pub file_name: Option<String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: 1,
            retries: 2,
            session_id: None,
            file_name: None,
        }
    }
}

/// HTTP client for a scoreshare-ingest server
pub struct UploadClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl UploadClient {
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Upload a local file and verify what the server published
    pub async fn upload_file(&self, path: &Path, options: &UploadOptions) -> ClientResult<PublishedResponse> {
        let data = tokio::fs::read(path).await?;
        let file_name = match &options.file_name {
            Some(name) => name.clone(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| ClientError::InvalidInput(format!("{} has no file name", path.display())))?,
        };
        let session_id = options
            .session_id
            .clone()
            .unwrap_or_else(scoreshare_common::session_id::generate);

        self.upload_bytes(&session_id, &file_name, &data, options).await
    }

    /// Upload an in-memory file under `session_id`
    ///
    /// On any failure the session is cancelled before the error is returned.
    pub async fn upload_bytes(
        &self,
        session_id: &str,
        file_name: &str,
        data: &[u8],
        options: &UploadOptions,
    ) -> ClientResult<PublishedResponse> {
        scoreshare_common::session_id::validate(session_id)
            .map_err(|e| ClientError::InvalidInput(e.to_string()))?;
        let spans = plan_chunks(data.len(), options.chunk_size)?;
        let total = spans.len() as u32;

        tracing::info!(
            session_id,
            file_name,
            bytes = data.len(),
            chunks = total,
            parallel = options.parallel,
            "Starting upload"
        );

        let result = self
            .send_all(session_id, file_name, data, &spans, options)
            .await
            .and_then(|published| verify(&published, data).map(|_| published));

        match result {
            Ok(published) => {
                tracing::info!(session_id, path = %published.path, "Upload complete");
                Ok(published)
            }
            Err(e) => {
                tracing::warn!(session_id, "Upload failed, cancelling session: {}", e);
                if let Err(cancel_err) = self.cancel(session_id).await {
                    tracing::warn!(session_id, "Cancel failed: {}", cancel_err);
                }
                Err(e)
            }
        }
    }

    async fn send_all(
        &self,
        session_id: &str,
        file_name: &str,
        data: &[u8],
        spans: &[ChunkSpan],
        options: &UploadOptions,
    ) -> ClientResult<PublishedResponse> {
        let total = spans.len() as u32;
        let responses: Vec<ChunkResponse> = stream::iter(spans.iter().copied())
            .map(|span| self.send_with_retries(session_id, file_name, span, total, data, options.retries))
            .buffer_unordered(options.parallel.max(1))
            .try_collect()
            .await?;

        responses
            .into_iter()
            .find_map(|response| match response {
                ChunkResponse::Published(published) => Some(published),
                ChunkResponse::Stored(_) => None,
            })
            .ok_or(ClientError::NotPublished)
    }

    async fn send_with_retries(
        &self,
        session_id: &str,
        file_name: &str,
        span: ChunkSpan,
        total: u32,
        data: &[u8],
        retries: u32,
    ) -> ClientResult<ChunkResponse> {
        let mut attempt = 0;
        loop {
            match self
                .send_chunk(session_id, file_name, span.index, total, &data[span.range()])
                .await
            {
                Err(e) if e.is_retryable() && attempt < retries => {
                    attempt += 1;
                    tracing::debug!(
                        session_id,
                        chunk_index = span.index,
                        attempt,
                        "Retrying chunk: {}",
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                }
                other => return other,
            }
        }
    }

    /// POST one chunk
    pub async fn send_chunk(
        &self,
        session_id: &str,
        file_name: &str,
        index: u32,
        total: u32,
        bytes: &[u8],
    ) -> ClientResult<ChunkResponse> {
        let form = Form::new()
            .text(FIELD_CHUNK_INDEX, index.to_string())
            .text(FIELD_TOTAL_CHUNKS, total.to_string())
            .text(FIELD_FILE_NAME, file_name.to_string())
            .text(FIELD_UNIQUE_ID, session_id.to_string())
            .part(
                FIELD_FILE,
                Part::bytes(bytes.to_vec()).file_name("blob"),
            );

        let response = self
            .http_client
            .post(self.url(UPLOAD_CHUNK_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let parsed: ChunkResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;

        tracing::debug!(session_id, chunk_index = index, "Chunk accepted");
        Ok(parsed)
    }

    /// Ask the server to drop a session
    pub async fn cancel(&self, session_id: &str) -> ClientResult<()> {
        let response = self
            .http_client
            .post(self.url(UPLOAD_CANCEL_PATH))
            .json(&CancelRequest {
                unique_id: session_id.to_string(),
            })
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => ClientError::Server {
            status: status.as_u16(),
            code: body.error.code,
            message: body.error.message,
            retryable: body.error.retryable,
        },
        Err(_) => ClientError::Server {
            status: status.as_u16(),
            code: "UNKNOWN".to_string(),
            message: text,
            retryable: status.is_server_error(),
        },
    })
}

/// Compare the server's report against the local bytes
fn verify(published: &PublishedResponse, data: &[u8]) -> ClientResult<()> {
    if published.size != data.len() as u64 {
        return Err(ClientError::Mismatch(format!(
            "size {} != local size {}",
            published.size,
            data.len()
        )));
    }

    let local = format!("{:x}", Sha256::digest(data));
    if !published.sha256.eq_ignore_ascii_case(&local) {
        return Err(ClientError::Mismatch(format!(
            "sha256 {} != local {}",
            published.sha256, local
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn published(size: u64, sha256: String) -> PublishedResponse {
        PublishedResponse {
            path: "sheet-music/x_song.pdf".to_string(),
            file_name: "song.pdf".to_string(),
            size,
            sha256,
        }
    }

    #[test]
    fn test_verify() {
        let data = b"%PDF-1.4 score";
        let digest = format!("{:x}", Sha256::digest(data));

        assert!(verify(&published(14, digest.clone()), data).is_ok());
        assert!(verify(&published(14, digest.to_uppercase()), data).is_ok());
        assert!(matches!(
            verify(&published(13, digest), data),
            Err(ClientError::Mismatch(_))
        ));
        assert!(matches!(
            verify(&published(14, "0".repeat(64)), data),
            Err(ClientError::Mismatch(_))
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::Network("reset".to_string()).is_retryable());
        assert!(!ClientError::NotPublished.is_retryable());

        let server = |retryable| ClientError::Server {
            status: 500,
            code: "STORAGE_FAILURE".to_string(),
            message: "disk full".to_string(),
            retryable,
        };
        assert!(server(true).is_retryable());
        assert!(!server(false).is_retryable());
    }

    #[test]
    fn test_base_url_is_normalised() {
        let client = UploadClient::new("http://localhost:5780/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url(UPLOAD_CHUNK_PATH), "http://localhost:5780/api/upload/chunk");
    }
}
