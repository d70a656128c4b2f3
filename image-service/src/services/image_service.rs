use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{is_invalid_pattern, ImageRepository};
use crate::error::{ApiError, ApiResult};
use crate::models::{Image, ImagePage, ListImagesParams, NewImage, StoredFile, UploadImage};
use crate::services::format_sniffer::sniff_image;
use crate::storage::{BlobStore, ChunkStream};

/// Coordinates the metadata store and the blob bucket
pub struct ImageService {
    repository: Arc<dyn ImageRepository>,
    blobs: Arc<dyn BlobStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub metadata_store: bool,
    pub blob_store: bool,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.metadata_store && self.blob_store
    }
}

impl ImageService {
    pub fn new(repository: Arc<dyn ImageRepository>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { repository, blobs }
    }

    pub async fn list_images(&self, params: ListImagesParams) -> ApiResult<ImagePage> {
        let rows = self
            .repository
            .list(params.cursor, params.search, i64::from(params.limit) + 1)
            .await
            .map_err(|e| {
                if is_invalid_pattern(&e) {
                    ApiError::invalid_search()
                } else {
                    ApiError::Database(e)
                }
            })?;

        Ok(ImagePage::from_rows(rows, params.limit))
    }

    pub async fn upload_image(&self, upload: UploadImage) -> ApiResult<Image> {
        let sniffed = sniff_image(&upload.data).ok_or(ApiError::InvalidImage)?;

        if sniffed.kind.mime() != upload.declared_content_type {
            warn!(
                declared = %upload.declared_content_type,
                detected = sniffed.kind.mime(),
                filename = %upload.filename,
                "Declared content type does not match image content"
            );
        }

        let width = upload.width.unwrap_or(sniffed.width);
        let height = upload.height.unwrap_or(sniffed.height);
        let width = i32::try_from(width)
            .map_err(|_| ApiError::Validation("\"width\" is too large".to_string()))?;
        let height = i32::try_from(height)
            .map_err(|_| ApiError::Validation("\"height\" is too large".to_string()))?;

        let metadata = json!({
            "title": upload.title,
            "description": upload.description,
            "width": width,
            "height": height,
        });

        let file = self
            .blobs
            .upload(
                upload.filename.clone(),
                sniffed.kind.mime().to_string(),
                upload.data,
                metadata,
            )
            .await?;

        let new_image = NewImage {
            title: upload.title,
            description: upload.description,
            filename: upload.filename,
            size: file.length,
            content_type: file.content_type.clone(),
            file_id: file.id,
            width: Some(width),
            height: Some(height),
        };

        match self.repository.insert(new_image).await {
            Ok(image) => {
                info!(
                    image_id = %image.id,
                    file_id = %image.file_id,
                    size = image.size,
                    "Image uploaded"
                );
                Ok(image)
            }
            Err(e) => {
                error!(file_id = %file.id, error = %e, "Failed to create image record");

                // Rollback: the blob has no metadata pointing at it
                if let Err(delete_err) = self.blobs.delete(file.id).await {
                    error!(file_id = %file.id, error = %delete_err, "Failed to rollback blob upload");
                }

                Err(e.into())
            }
        }
    }

    pub async fn get_image(&self, file_id: Uuid) -> ApiResult<Option<Image>> {
        Ok(self.repository.find_by_file_id(file_id).await?)
    }

    pub async fn open_image_stream(
        &self,
        file_id: Uuid,
    ) -> ApiResult<(Image, StoredFile, ChunkStream)> {
        let image = self
            .repository
            .find_by_file_id(file_id)
            .await?
            .ok_or_else(ApiError::image_not_found)?;

        let (file, chunks) = self.blobs.open_download_stream(file_id).await?;

        Ok((image, file, chunks))
    }

    pub async fn delete_image(&self, file_id: Uuid) -> ApiResult<()> {
        if !self.repository.delete_by_file_id(file_id).await? {
            return Err(ApiError::image_not_found());
        }

        match self.blobs.delete(file_id).await {
            Ok(true) => {}
            Ok(false) => warn!(file_id = %file_id, "Image record deleted but blob was already gone"),
            Err(e) => {
                // Metadata is gone already; the orphaned blob is unreachable but harmless
                error!(file_id = %file_id, error = %e, "Failed to delete blob");
            }
        }

        info!(file_id = %file_id, "Image deleted");
        Ok(())
    }

    pub async fn health(&self) -> HealthReport {
        let (metadata_store, blob_store) =
            tokio::join!(self.repository.ping(), self.blobs.ping());

        HealthReport {
            metadata_store,
            blob_store,
        }
    }
}
