use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata record of an uploaded image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub filename: String,
    pub upload_date: DateTime<Utc>,
    pub size: i64,
    pub content_type: String,
    pub file_id: Uuid,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

impl Image {
    /// Attach the public download URL for JSON output
    pub fn into_view(self, api_prefix: &str) -> ImageView {
        let url = format!("{}/images/{}", api_prefix, self.file_id);
        ImageView { image: self, url }
    }
}

/// `Image` as served to clients, with its access URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageView {
    #[serde(flatten)]
    pub image: Image,
    pub url: String,
}

/// Insert payload for the metadata store
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub title: String,
    pub description: String,
    pub filename: String,
    pub size: i64,
    pub content_type: String,
    pub file_id: Uuid,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

/// Files record of the chunked blob bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StoredFile {
    pub id: Uuid,
    pub bucket: String,
    pub filename: String,
    pub content_type: String,
    pub length: i64,
    pub chunk_size: i32,
    pub sha256: String,
    pub metadata: Option<serde_json::Value>,
    pub upload_date: DateTime<Utc>,
}

impl StoredFile {
    /// Number of chunks the file was split into
    pub fn chunk_count(&self) -> i64 {
        if self.length <= 0 {
            return 0;
        }
        let chunk_size = i64::from(self.chunk_size);
        (self.length + chunk_size - 1) / chunk_size
    }

    /// Size chunk `n` must have for the file to be intact
    pub fn expected_chunk_len(&self, n: i64) -> usize {
        let chunk_size = i64::from(self.chunk_size);
        let last = self.chunk_count() - 1;
        if n < last {
            chunk_size as usize
        } else {
            (self.length - last * chunk_size) as usize
        }
    }
}

/// Validated upload handed to the image service
#[derive(Debug, Clone)]
pub struct UploadImage {
    pub data: Bytes,
    pub filename: String,
    pub declared_content_type: String,
    pub title: String,
    pub description: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Validated list query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListImagesParams {
    pub cursor: Option<Uuid>,
    pub limit: u32,
    pub search: Option<String>,
}

/// One page of the image listing
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePage {
    pub images: Vec<Image>,
    pub next_cursor: Option<Uuid>,
    pub has_more: bool,
}

impl ImagePage {
    /// Build a page from up to `limit + 1` rows fetched newest first.
    pub fn from_rows(mut rows: Vec<Image>, limit: u32) -> Self {
        let limit = limit as usize;
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let next_cursor = rows.last().map(|image| image.id);

        Self {
            images: rows,
            next_cursor,
            has_more,
        }
    }
}

/// Response envelope used by every JSON endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub returncode: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            returncode: "200".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            returncode: "200".to_string(),
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageListData {
    pub images: Vec<ImageView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub next_cursor: Option<Uuid>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub returncode: String,
    pub message: String,
    pub image: ImageView,
}
