//! Chunked upload API handlers
//!
//! POST /api/upload/chunk, POST /api/upload/cancel

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use scoreshare_common::api::{
    CancelRequest, CancelResponse, ChunkAckResponse, ChunkResponse, PublishedResponse,
    CHUNK_STORED_MESSAGE, FIELD_CHUNK_INDEX, FIELD_FILE, FIELD_FILE_NAME, FIELD_TOTAL_CHUNKS,
    FIELD_UNIQUE_ID, UPLOAD_CANCEL_PATH, UPLOAD_CHUNK_PATH,
};

use crate::{
    error::{ApiError, ApiResult, UploadError},
    services::{ChunkOutcome, ChunkUpload, PublishedArtifact},
    AppState,
};

/// Multipart fields of one chunk request, before validation
#[derive(Debug, Default)]
struct ChunkForm {
    data: Option<Bytes>,
    chunk_index: Option<String>,
    total_chunks: Option<String>,
    file_name: Option<String>,
    unique_id: Option<String>,
}

impl ChunkForm {
    async fn read(multipart: &mut Multipart, max_chunk_bytes: usize) -> ApiResult<Self> {
        let mut form = ChunkForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, max_chunk_bytes))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                FIELD_FILE => {
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| multipart_error(e, max_chunk_bytes))?;
                    form.data = Some(data);
                }
                FIELD_CHUNK_INDEX | FIELD_TOTAL_CHUNKS | FIELD_FILE_NAME | FIELD_UNIQUE_ID => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| multipart_error(e, max_chunk_bytes))?;
                    match name.as_str() {
                        FIELD_CHUNK_INDEX => form.chunk_index = Some(text),
                        FIELD_TOTAL_CHUNKS => form.total_chunks = Some(text),
                        FIELD_FILE_NAME => form.file_name = Some(text),
                        _ => form.unique_id = Some(text),
                    }
                }
                other => {
                    tracing::debug!(field = other, "Ignoring unknown multipart field");
                }
            }
        }

        Ok(form)
    }

    fn into_upload(self) -> ApiResult<ChunkUpload> {
        Ok(ChunkUpload {
            session_id: required(self.unique_id, FIELD_UNIQUE_ID)?,
            chunk_index: parse_count(required(self.chunk_index, FIELD_CHUNK_INDEX)?, FIELD_CHUNK_INDEX)?,
            total_chunks: parse_count(
                required(self.total_chunks, FIELD_TOTAL_CHUNKS)?,
                FIELD_TOTAL_CHUNKS,
            )?,
            file_name: required(self.file_name, FIELD_FILE_NAME)?,
            data: self
                .data
                .ok_or_else(|| ApiError::BadRequest(format!("Missing field: {}", FIELD_FILE)))?,
        })
    }
}

fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    value.ok_or_else(|| ApiError::BadRequest(format!("Missing field: {}", field)))
}

fn parse_count(value: String, field: &str) -> ApiResult<u32> {
    value.trim().parse::<u32>().map_err(|_| {
        ApiError::BadRequest(format!(
            "Field {} must be a non-negative integer, got {:?}",
            field, value
        ))
    })
}

fn multipart_error(err: MultipartError, max_chunk_bytes: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge {
            what: "chunk",
            limit: max_chunk_bytes as u64,
        }
        .into()
    } else {
        ApiError::BadRequest(format!("Malformed multipart body: {}", err.body_text()))
    }
}

fn published_response(artifact: PublishedArtifact) -> PublishedResponse {
    PublishedResponse {
        path: artifact.path,
        file_name: artifact.file_name,
        size: artifact.size,
        sha256: artifact.sha256,
    }
}

/// POST /api/upload/chunk
///
/// Stores one chunk. The chunk that completes its session is answered with
/// the published file's location instead of an acknowledgement.
pub async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ChunkResponse>> {
    let max_chunk_bytes = state.coordinator.config().max_chunk_bytes;
    let upload = ChunkForm::read(&mut multipart, max_chunk_bytes)
        .await?
        .into_upload()?;

    tracing::debug!(
        session_id = %upload.session_id,
        chunk_index = upload.chunk_index,
        total_chunks = upload.total_chunks,
        bytes = upload.data.len(),
        "Received chunk"
    );

    // Detached from the request so a client disconnect cannot abort assembly
    let coordinator = state.coordinator.clone();
    let outcome = tokio::spawn(async move { coordinator.handle_chunk(upload).await })
        .await
        .map_err(|e| ApiError::Internal(format!("Chunk task failed: {}", e)))??;

    let response = match outcome {
        ChunkOutcome::Stored { received, total } => ChunkResponse::Stored(ChunkAckResponse {
            message: CHUNK_STORED_MESSAGE.to_string(),
            received,
            total,
        }),
        ChunkOutcome::Published(artifact) => ChunkResponse::Published(published_response(artifact)),
    };

    Ok(Json(response))
}

/// POST /api/upload/cancel
///
/// Always acknowledged, whether or not the session exists.
pub async fn cancel_upload(
    State(state): State<AppState>,
    Json(request): Json<CancelRequest>,
) -> ApiResult<Json<CancelResponse>> {
    state.coordinator.cancel(&request.unique_id).await?;
    Ok(Json(CancelResponse::default()))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route(UPLOAD_CHUNK_PATH, post(upload_chunk))
        .route(UPLOAD_CANCEL_PATH, post(cancel_upload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_upload_requires_every_field() {
        let complete = || ChunkForm {
            data: Some(Bytes::from_static(b"%PDF")),
            chunk_index: Some("0".to_string()),
            total_chunks: Some("2".to_string()),
            file_name: Some("song.pdf".to_string()),
            unique_id: Some("abc123".to_string()),
        };

        let upload = complete().into_upload().unwrap();
        assert_eq!(upload.session_id, "abc123");
        assert_eq!(upload.total_chunks, 2);

        let mut missing_file = complete();
        missing_file.data = None;
        assert!(matches!(missing_file.into_upload(), Err(ApiError::BadRequest(_))));

        let mut missing_id = complete();
        missing_id.unique_id = None;
        assert!(matches!(missing_id.into_upload(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(" 7 ".to_string(), FIELD_CHUNK_INDEX).unwrap(), 7);
        assert!(parse_count("-1".to_string(), FIELD_CHUNK_INDEX).is_err());
        assert!(parse_count("two".to_string(), FIELD_TOTAL_CHUNKS).is_err());
    }
}
