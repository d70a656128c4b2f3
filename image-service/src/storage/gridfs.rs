use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use sqlx::PgPool;
use uuid::Uuid;

use super::{verify_chunk, BlobStore, ChunkStream, StorageError, StorageResult};
use crate::config::StorageConfig;
use crate::models::StoredFile;

/// Chunked bucket on top of the `blob_files` / `blob_chunks` tables
#[derive(Debug, Clone)]
pub struct PgBucket {
    pool: PgPool,
    bucket: String,
    chunk_size: usize,
}

impl PgBucket {
    pub fn new(pool: PgPool, config: &StorageConfig) -> Self {
        Self {
            pool,
            bucket: config.bucket.clone(),
            chunk_size: config.chunk_size_bytes,
        }
    }
}

#[async_trait]
impl BlobStore for PgBucket {
    async fn upload(
        &self,
        filename: String,
        content_type: String,
        data: Bytes,
        metadata: serde_json::Value,
    ) -> StorageResult<StoredFile> {
        let id = Uuid::now_v7();
        let sha256 = shared::crypto::sha256(&data);

        let mut tx = self.pool.begin().await?;

        let file = sqlx::query_as::<_, StoredFile>(
            r#"
            INSERT INTO blob_files (
                id,
                bucket,
                filename,
                content_type,
                length,
                chunk_size,
                sha256,
                metadata,
                upload_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&self.bucket)
        .bind(&filename)
        .bind(&content_type)
        .bind(data.len() as i64)
        .bind(self.chunk_size as i32)
        .bind(&sha256)
        .bind(&metadata)
        .fetch_one(&mut *tx)
        .await?;

        for (n, chunk) in data.chunks(self.chunk_size).enumerate() {
            sqlx::query(
                r#"
                INSERT INTO blob_chunks (file_id, n, data)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(id)
            .bind(n as i32)
            .bind(chunk)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            file_id = %id,
            bucket = %self.bucket,
            length = data.len(),
            chunks = file.chunk_count(),
            "Stored file in bucket"
        );

        Ok(file)
    }

    async fn find(&self, file_id: Uuid) -> StorageResult<Option<StoredFile>> {
        let file = sqlx::query_as::<_, StoredFile>(
            r#"
            SELECT * FROM blob_files WHERE id = $1 AND bucket = $2
            "#,
        )
        .bind(file_id)
        .bind(&self.bucket)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    async fn open_download_stream(
        &self,
        file_id: Uuid,
    ) -> StorageResult<(StoredFile, ChunkStream)> {
        let file = self
            .find(file_id)
            .await?
            .ok_or(StorageError::FileNotFound(file_id))?;

        let total = file.chunk_count();
        let pool = self.pool.clone();
        let stream_file = file.clone();

        let chunks = stream::try_unfold(0i64, move |n| {
            let pool = pool.clone();
            let file = stream_file.clone();
            async move {
                if n >= total {
                    return Ok::<_, StorageError>(None);
                }

                let row: Option<(Vec<u8>,)> = sqlx::query_as(
                    r#"
                    SELECT data FROM blob_chunks WHERE file_id = $1 AND n = $2
                    "#,
                )
                .bind(file.id)
                .bind(n as i32)
                .fetch_optional(&pool)
                .await?;

                let data = verify_chunk(&file, n, row.map(|(data,)| data))?;
                Ok::<_, StorageError>(Some((Bytes::from(data), n + 1)))
            }
        });

        Ok((file, Box::pin(chunks)))
    }

    async fn delete(&self, file_id: Uuid) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM blob_chunks
            WHERE file_id = (SELECT id FROM blob_files WHERE id = $1 AND bucket = $2)
            "#,
        )
        .bind(file_id)
        .bind(&self.bucket)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM blob_files WHERE id = $1 AND bucket = $2
            "#,
        )
        .bind(file_id)
        .bind(&self.bucket)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if deleted > 0 {
            tracing::info!(file_id = %file_id, bucket = %self.bucket, "Deleted file from bucket");
        }
        Ok(deleted > 0)
    }

    async fn ping(&self) -> bool {
        shared::database::health_check(&self.pool).await
    }
}
