//! In-memory stores and router helpers for handler tests

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::stream;
use regex::RegexBuilder;
use uuid::Uuid;

use crate::config::{Config, ServerConfig, StorageConfig};
use crate::db::ImageRepository;
use crate::models::{Image, NewImage, StoredFile};
use crate::services::ImageService;
use crate::storage::{verify_chunk, BlobStore, ChunkStream, StorageError, StorageResult};
use crate::AppState;

#[derive(Default)]
pub struct MemoryImageRepository {
    images: Mutex<BTreeMap<Uuid, Image>>,
}

#[async_trait]
impl ImageRepository for MemoryImageRepository {
    async fn insert(&self, image: NewImage) -> Result<Image, sqlx::Error> {
        let created = Image {
            id: Uuid::now_v7(),
            title: image.title,
            description: image.description,
            filename: image.filename,
            upload_date: Utc::now(),
            size: image.size,
            content_type: image.content_type,
            file_id: image.file_id,
            width: image.width,
            height: image.height,
        };
        self.images
            .lock()
            .unwrap()
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_file_id(&self, file_id: Uuid) -> Result<Option<Image>, sqlx::Error> {
        Ok(self
            .images
            .lock()
            .unwrap()
            .values()
            .find(|image| image.file_id == file_id)
            .cloned())
    }

    async fn list(
        &self,
        cursor: Option<Uuid>,
        search: Option<String>,
        fetch_limit: i64,
    ) -> Result<Vec<Image>, sqlx::Error> {
        let pattern = search
            .map(|s| RegexBuilder::new(&s).case_insensitive(true).build())
            .transpose()
            .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

        Ok(self
            .images
            .lock()
            .unwrap()
            .values()
            .rev()
            .filter(|image| cursor.map_or(true, |c| image.id < c))
            .filter(|image| {
                pattern.as_ref().map_or(true, |re| {
                    re.is_match(&image.title) || re.is_match(&image.description)
                })
            })
            .take(fetch_limit as usize)
            .cloned()
            .collect())
    }

    async fn delete_by_file_id(&self, file_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut images = self.images.lock().unwrap();
        let before = images.len();
        images.retain(|_, image| image.file_id != file_id);
        Ok(images.len() < before)
    }

    async fn ping(&self) -> bool {
        true
    }
}

pub struct MemoryBlobStore {
    chunk_size: usize,
    files: Mutex<BTreeMap<Uuid, (StoredFile, Vec<Vec<u8>>)>>,
}

impl MemoryBlobStore {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            files: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    /// Drop the tail of chunk `n` to simulate a damaged store
    pub fn truncate_chunk(&self, file_id: Uuid, n: usize) {
        if let Some((_, chunks)) = self.files.lock().unwrap().get_mut(&file_id) {
            chunks[n].pop();
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        filename: String,
        content_type: String,
        data: Bytes,
        metadata: serde_json::Value,
    ) -> StorageResult<StoredFile> {
        let file = StoredFile {
            id: Uuid::now_v7(),
            bucket: "images".to_string(),
            filename,
            content_type,
            length: data.len() as i64,
            chunk_size: self.chunk_size as i32,
            sha256: shared::crypto::sha256(&data),
            metadata: Some(metadata),
            upload_date: Utc::now(),
        };
        let chunks = data.chunks(self.chunk_size).map(<[u8]>::to_vec).collect();

        self.files
            .lock()
            .unwrap()
            .insert(file.id, (file.clone(), chunks));
        Ok(file)
    }

    async fn find(&self, file_id: Uuid) -> StorageResult<Option<StoredFile>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(&file_id)
            .map(|(file, _)| file.clone()))
    }

    async fn open_download_stream(
        &self,
        file_id: Uuid,
    ) -> StorageResult<(StoredFile, ChunkStream)> {
        let (file, chunks) = self
            .files
            .lock()
            .unwrap()
            .get(&file_id)
            .cloned()
            .ok_or(StorageError::FileNotFound(file_id))?;

        let total = file.chunk_count();
        let items: Vec<StorageResult<Bytes>> = (0..total)
            .map(|n| verify_chunk(&file, n, chunks.get(n as usize).cloned()).map(Bytes::from))
            .collect();

        Ok((file, Box::pin(stream::iter(items))))
    }

    async fn delete(&self, file_id: Uuid) -> StorageResult<bool> {
        Ok(self.files.lock().unwrap().remove(&file_id).is_some())
    }

    async fn ping(&self) -> bool {
        true
    }
}

pub struct TestApp {
    pub state: AppState,
    pub blobs: Arc<MemoryBlobStore>,
}

/// App state over in-memory stores, small chunks and a 64 KiB upload limit
pub fn test_app() -> TestApp {
    let config = Config {
        server: ServerConfig::default(),
        database: shared::database::DatabaseConfig::default(),
        storage: StorageConfig {
            chunk_size_bytes: 64,
            max_upload_bytes: 64 * 1024,
            ..StorageConfig::default()
        },
        logging: shared::observability::LogConfig::default(),
    };

    let repository = Arc::new(MemoryImageRepository::default());
    let blobs = Arc::new(MemoryBlobStore::new(config.storage.chunk_size_bytes));

    let state = AppState {
        config: Arc::new(config),
        image_service: Arc::new(ImageService::new(repository, blobs.clone())),
    };

    TestApp { state, blobs }
}

/// Hand-built multipart body
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: "----image-service-test-boundary".to_string(),
            body: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.boundary, name, filename, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn finish(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (self.content_type(), self.body)
    }
}
