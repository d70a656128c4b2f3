use anyhow::{bail, Context, Result};
use shared::database::DatabaseConfig;
use shared::observability::{LogConfig, LogFormat, LogLevel};

/// Chunk size used by the blob bucket unless overridden (255 KiB).
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 255 * 1024;
/// Largest accepted upload unless overridden (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Mount point of the image routes, `""` or `/something` without a trailing slash.
    pub api_prefix: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    pub chunk_size_bytes: usize,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3030,
            api_prefix: "/api".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "images".to_string(),
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3030".to_string())
                .parse()
                .context("PORT must be a valid port number")?,
            api_prefix: normalize_prefix(
                &std::env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            ),
        };

        let database = DatabaseConfig::from_env().context("Invalid database configuration")?;

        let storage = StorageConfig {
            bucket: std::env::var("STORAGE_BUCKET").unwrap_or_else(|_| "images".to_string()),
            chunk_size_bytes: std::env::var("STORAGE_CHUNK_SIZE_BYTES")
                .unwrap_or_else(|_| DEFAULT_CHUNK_SIZE_BYTES.to_string())
                .parse()
                .context("STORAGE_CHUNK_SIZE_BYTES must be a positive integer")?,
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| DEFAULT_MAX_UPLOAD_BYTES.to_string())
                .parse()
                .context("MAX_UPLOAD_BYTES must be a positive integer")?,
        };
        storage.validate()?;

        let logging = LogConfig {
            level: std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string())
                .parse::<LogLevel>()?,
            format: std::env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .parse::<LogFormat>()?,
            service_name: "image-service".to_string(),
            ..LogConfig::default()
        };

        Ok(Self {
            server,
            database,
            storage,
            logging,
        })
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_bytes == 0 {
            bail!("STORAGE_CHUNK_SIZE_BYTES must be greater than zero");
        }
        if self.chunk_size_bytes > i32::MAX as usize {
            bail!("STORAGE_CHUNK_SIZE_BYTES is too large");
        }
        if self.max_upload_bytes == 0 {
            bail!("MAX_UPLOAD_BYTES must be greater than zero");
        }
        if self.bucket.is_empty()
            || !self
                .bucket
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            bail!(
                "STORAGE_BUCKET '{}' must be non-empty and use only [a-z0-9_]",
                self.bucket
            );
        }
        Ok(())
    }

    /// Human readable upload limit, e.g. `10MB`.
    pub fn max_upload_label(&self) -> String {
        let mib = 1024 * 1024;
        if self.max_upload_bytes % mib == 0 {
            format!("{}MB", self.max_upload_bytes / mib)
        } else {
            format!("{} bytes", self.max_upload_bytes)
        }
    }
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/api"), "/api");
        assert_eq!(normalize_prefix("api/"), "/api");
        assert_eq!(normalize_prefix("/v1/api//"), "/v1/api");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix(""), "");
    }

    #[test]
    fn test_storage_validation() {
        assert!(StorageConfig::default().validate().is_ok());

        let zero_chunk = StorageConfig {
            chunk_size_bytes: 0,
            ..Default::default()
        };
        assert!(zero_chunk.validate().is_err());

        let bad_bucket = StorageConfig {
            bucket: "Images-Bucket".to_string(),
            ..Default::default()
        };
        assert!(bad_bucket.validate().is_err());
    }

    #[test]
    fn test_max_upload_label() {
        assert_eq!(StorageConfig::default().max_upload_label(), "10MB");

        let odd = StorageConfig {
            max_upload_bytes: 1500,
            ..Default::default()
        };
        assert_eq!(odd.max_upload_label(), "1500 bytes");
    }
}
