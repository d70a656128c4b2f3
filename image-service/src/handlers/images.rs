use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
        Multipart, Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::TryStreamExt;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::handlers::validation::{self, ListImagesQuery, RawUploadForm, UploadedFile};
use crate::models::{ApiResponse, ImageListData, ImageView, Pagination, UploadResponse};
use crate::AppState;

const IMAGE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// List images, newest first, with cursor pagination and optional search
pub async fn list_images(
    State(state): State<AppState>,
    query: Result<Query<ListImagesQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<ImageListData>>> {
    let Query(query) = query?;
    let params = query.into_params()?;
    tracing::debug!(
        cursor = ?params.cursor,
        limit = params.limit,
        search = ?params.search,
        "Listing images"
    );

    let page = state.image_service.list_images(params).await?;
    let prefix = &state.config.server.api_prefix;

    let data = ImageListData {
        images: page
            .images
            .into_iter()
            .map(|image| image.into_view(prefix))
            .collect(),
        pagination: Pagination {
            next_cursor: page.next_cursor,
            has_more: page.has_more,
        },
    };

    Ok(Json(ApiResponse::success("Images retrieved successfully", data)))
}

/// Handle multipart image upload
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    tracing::info!("Received image upload request");

    let mut multipart = multipart?;

    let storage = &state.config.storage;
    let mut form = RawUploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, storage))?
    {
        let field_name = field.name().unwrap_or_default().to_string();

        match field_name.as_str() {
            "image" => {
                if form.file.is_some() {
                    return Err(ApiError::BadRequest(
                        "Only one image file may be uploaded".to_string(),
                    ));
                }

                let declared = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let content_type = validation::check_declared_mime(&declared)?;
                let filename = validation::sanitize_filename(field.file_name().unwrap_or_default());

                let data = field.bytes().await.map_err(|e| multipart_error(e, storage))?;
                validation::check_upload_size(data.len(), storage)?;

                tracing::debug!(
                    filename = %filename,
                    content_type = %content_type,
                    size = data.len(),
                    "Received image part"
                );

                form.file = Some(UploadedFile {
                    filename,
                    content_type,
                    data,
                });
            }
            "title" => form.title = Some(read_text(field, storage).await?),
            "description" => form.description = Some(read_text(field, storage).await?),
            "width" => form.width = Some(read_text(field, storage).await?),
            "height" => form.height = Some(read_text(field, storage).await?),
            other => tracing::debug!(field = %other, "Ignoring unexpected multipart field"),
        }
    }

    let upload = form.into_upload()?;
    let image = state.image_service.upload_image(upload).await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            returncode: "200".to_string(),
            message: "Upload successful".to_string(),
            image: image.into_view(&state.config.server.api_prefix),
        }),
    ))
}

/// Stream the stored image content
pub async fn stream_image(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let file_id = parse_file_id(&file_id)?;
    let (image, file, chunks) = state.image_service.open_image_stream(file_id).await?;

    let etag = format!("\"{}\"", file.sha256);

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|tag| tag.trim() == etag || tag.trim() == "*"))
        .unwrap_or(false);

    if not_modified {
        return Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::ETAG, &etag)
            .header(header::CACHE_CONTROL, IMAGE_CACHE_CONTROL)
            .body(Body::empty())
            .map_err(|e| ApiError::Internal(e.to_string()));
    }

    let body = chunks.inspect_err(move |e| {
        tracing::error!(file_id = %file_id, error = %e, "Error streaming image");
    });

    tracing::debug!(file_id = %file_id, length = file.length, "Streaming image");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &image.content_type)
        .header(header::CONTENT_LENGTH, file.length)
        .header(header::ETAG, &etag)
        .header(header::CACHE_CONTROL, IMAGE_CACHE_CONTROL)
        .body(Body::from_stream(body))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Metadata of a single image
pub async fn get_image_metadata(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<Json<ApiResponse<ImageView>>> {
    let file_id = parse_file_id(&file_id)?;
    let image = state
        .image_service
        .get_image(file_id)
        .await?
        .ok_or_else(ApiError::image_not_found)?;

    Ok(Json(ApiResponse::success(
        "Image retrieved successfully",
        image.into_view(&state.config.server.api_prefix),
    )))
}

pub async fn delete_image(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let file_id = parse_file_id(&file_id)?;
    state.image_service.delete_image(file_id).await?;

    Ok(Json(ApiResponse::message("Image deleted successfully")))
}

// Ids that cannot exist are reported as missing images
fn parse_file_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::image_not_found())
}

async fn read_text(
    field: axum::extract::multipart::Field<'_>,
    storage: &crate::config::StorageConfig,
) -> ApiResult<String> {
    field.text().await.map_err(|e| multipart_error(e, storage))
}

fn multipart_error(err: MultipartError, storage: &crate::config::StorageConfig) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::FileTooLarge(storage.max_upload_label())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}
