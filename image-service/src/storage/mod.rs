//! Chunked blob storage for image content.
//!
//! Files are kept GridFS style: a files record plus numbered fixed-size
//! chunks. Chunks are written in a single transaction and read back lazily,
//! one at a time, as the response body is consumed.

pub mod gridfs;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;
use uuid::Uuid;

use crate::models::StoredFile;

pub use gridfs::PgBucket;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File {0} not found")]
    FileNotFound(Uuid),

    #[error("Chunk {n} of file {file_id} is missing")]
    MissingChunk { file_id: Uuid, n: i64 },

    #[error("Chunk {n} of file {file_id} has {actual} bytes, expected {expected}")]
    CorruptChunk {
        file_id: Uuid,
        n: i64,
        expected: usize,
        actual: usize,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Ordered chunks of one stored file
pub type ChunkStream = BoxStream<'static, StorageResult<Bytes>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` as a new file and return its files record
    async fn upload(
        &self,
        filename: String,
        content_type: String,
        data: Bytes,
        metadata: serde_json::Value,
    ) -> StorageResult<StoredFile>;

    async fn find(&self, file_id: Uuid) -> StorageResult<Option<StoredFile>>;

    /// Files record plus a lazy stream over the file's chunks
    async fn open_download_stream(&self, file_id: Uuid)
        -> StorageResult<(StoredFile, ChunkStream)>;

    /// Remove the file and its chunks. `false` when nothing was stored.
    async fn delete(&self, file_id: Uuid) -> StorageResult<bool>;

    async fn ping(&self) -> bool;
}

/// Check chunk `n` against the geometry recorded in the files record.
pub fn verify_chunk(file: &StoredFile, n: i64, data: Option<Vec<u8>>) -> StorageResult<Vec<u8>> {
    let data = data.ok_or(StorageError::MissingChunk { file_id: file.id, n })?;

    let expected = file.expected_chunk_len(n);
    if data.len() != expected {
        return Err(StorageError::CorruptChunk {
            file_id: file.id,
            n,
            expected,
            actual: data.len(),
        });
    }

    Ok(data)
}
