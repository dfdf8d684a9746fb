//! Splitting a file into upload chunks

use crate::client::{ClientError, ClientResult};

/// Default chunk size (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Byte range of one chunk within the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: u32,
    pub offset: usize,
    pub len: usize,
}

impl ChunkSpan {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Cover `total_len` bytes with chunks of at most `chunk_size` bytes
///
/// Every chunk is non-empty; only the last may be shorter than `chunk_size`.
pub fn plan_chunks(total_len: usize, chunk_size: usize) -> ClientResult<Vec<ChunkSpan>> {
    if chunk_size == 0 {
        return Err(ClientError::InvalidInput("chunk size must be positive".to_string()));
    }
    if total_len == 0 {
        return Err(ClientError::InvalidInput("cannot upload an empty file".to_string()));
    }

    let count = total_len.div_ceil(chunk_size);
    if u32::try_from(count).is_err() {
        return Err(ClientError::InvalidInput(format!(
            "{} chunks exceed the protocol limit",
            count
        )));
    }

    Ok((0..count)
        .map(|i| {
            let offset = i * chunk_size;
            ChunkSpan {
                index: i as u32,
                offset,
                len: chunk_size.min(total_len - offset),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_multiple() {
        let spans = plan_chunks(30, 10).unwrap();
        assert_eq!(spans.len(), 3);
        assert!(spans.iter().all(|s| s.len == 10));
        assert_eq!(spans[2].range(), 20..30);
    }

    #[test]
    fn test_short_last_chunk() {
        let spans = plan_chunks(25, 10).unwrap();
        assert_eq!(
            spans.iter().map(|s| s.len).collect::<Vec<_>>(),
            vec![10, 10, 5]
        );
        assert_eq!(spans.iter().map(|s| s.len).sum::<usize>(), 25);
        assert_eq!(spans.last().unwrap().index, 2);
    }

    #[test]
    fn test_file_smaller_than_chunk() {
        let spans = plan_chunks(3, DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(spans, vec![ChunkSpan { index: 0, offset: 0, len: 3 }]);
    }

    #[test]
    fn test_rejects_empty_input_and_zero_chunk_size() {
        assert!(matches!(plan_chunks(0, 10), Err(ClientError::InvalidInput(_))));
        assert!(matches!(plan_chunks(10, 0), Err(ClientError::InvalidInput(_))));
    }
}
