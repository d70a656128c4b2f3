//! Request validation for image uploads and listings

use bytes::Bytes;
use regex::RegexBuilder;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::config::StorageConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::{ListImagesParams, UploadImage};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;
pub const MAX_SEARCH_LENGTH: usize = 100;

// Declared MIME types accepted for the `image` part
pub const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];

/// Reject parts whose declared type is not an accepted image type
pub fn check_declared_mime(content_type: &str) -> ApiResult<String> {
    let essence = content_type
        .parse::<mime::Mime>()
        .map(|m| m.essence_str().to_ascii_lowercase())
        .unwrap_or_default();

    if ALLOWED_MIME_TYPES.contains(&essence.as_str()) {
        Ok(essence)
    } else {
        Err(ApiError::UnsupportedFileType {
            content_type: content_type.to_string(),
        })
    }
}

pub fn check_upload_size(len: usize, storage: &StorageConfig) -> ApiResult<()> {
    if len > storage.max_upload_bytes {
        return Err(ApiError::FileTooLarge(storage.max_upload_label()));
    }
    Ok(())
}

/// Keep only the last path component of a client supplied file name
pub fn sanitize_filename(raw: &str) -> String {
    let name = raw
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() {
        "upload".to_string()
    } else {
        name.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Multipart fields as received, before validation
#[derive(Debug, Default)]
pub struct RawUploadForm {
    pub file: Option<UploadedFile>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
}

#[derive(Debug, Validate)]
struct UploadFields {
    #[validate(length(
        min = 1,
        max = 100,
        message = "\"title\" length must be between 1 and 100 characters"
    ))]
    title: String,

    #[validate(length(
        min = 1,
        max = 500,
        message = "\"description\" length must be between 1 and 500 characters"
    ))]
    description: String,

    #[validate(range(min = 1, max = 2147483647, message = "\"width\" must be a positive integer"))]
    width: Option<i64>,

    #[validate(range(min = 1, max = 2147483647, message = "\"height\" must be a positive integer"))]
    height: Option<i64>,
}

impl RawUploadForm {
    pub fn into_upload(self) -> ApiResult<UploadImage> {
        let file = match self.file {
            Some(file) if !file.data.is_empty() => file,
            _ => return Err(ApiError::BadRequest("Image file is required".to_string())),
        };

        let fields = UploadFields {
            title: required_text("title", self.title)?,
            description: required_text("description", self.description)?,
            width: optional_integer("width", self.width)?,
            height: optional_integer("height", self.height)?,
        };
        fields
            .validate()
            .map_err(|errors| ApiError::Validation(describe_errors(&errors)))?;

        Ok(UploadImage {
            data: file.data,
            filename: file.filename,
            declared_content_type: file.content_type,
            title: fields.title,
            description: fields.description,
            width: fields.width.map(|w| w as u32),
            height: fields.height.map(|h| h as u32),
        })
    }
}

fn required_text(field: &str, value: Option<String>) -> ApiResult<String> {
    match value {
        Some(value) => Ok(value.trim().to_string()),
        None => Err(ApiError::Validation(format!("\"{}\" is required", field))),
    }
}

fn optional_integer(field: &str, value: Option<String>) -> ApiResult<Option<i64>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::Validation(format!("\"{}\" must be a number", field))),
    }
}

fn describe_errors(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("\"{}\" is invalid", field))
            })
        })
        .collect();

    messages.sort();
    messages.join("; ")
}

/// Query string of the listing endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ListImagesQuery {
    pub cursor: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
}

impl ListImagesQuery {
    pub fn into_params(self) -> ApiResult<ListImagesParams> {
        let cursor = match self.cursor.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
                ApiError::Validation("\"cursor\" must be a valid image id".to_string())
            })?),
        };

        // Unparsable or non-positive limits fall back to the default
        let limit = self
            .limit
            .as_deref()
            .and_then(parse_leading_integer)
            .filter(|limit| *limit > 0)
            .map(|limit| limit.min(i64::from(MAX_PAGE_LIMIT)) as u32)
            .unwrap_or(DEFAULT_PAGE_LIMIT);

        let search = match self.search {
            Some(pattern) if !pattern.is_empty() => Some(validate_search(pattern)?),
            _ => None,
        };

        Ok(ListImagesParams {
            cursor,
            limit,
            search,
        })
    }
}

/// Integer prefix of `raw` after leading whitespace: `"5abc"` is 5, `"2.5"` is 2
fn parse_leading_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim_start();
    let sign_len = usize::from(raw.starts_with(['+', '-']));
    let digits_len = raw[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len() - sign_len);

    if digits_len == 0 {
        return None;
    }

    // Overflowing values are treated as "very large" and get capped later
    raw[..sign_len + digits_len]
        .parse::<i64>()
        .ok()
        .or_else(|| (!raw.starts_with('-')).then_some(i64::MAX))
}

fn validate_search(pattern: String) -> ApiResult<String> {
    if pattern.chars().count() > MAX_SEARCH_LENGTH {
        return Err(ApiError::Validation(format!(
            "\"search\" must be at most {} characters",
            MAX_SEARCH_LENGTH
        )));
    }

    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|_| ApiError::invalid_search())?;

    Ok(pattern)
}
