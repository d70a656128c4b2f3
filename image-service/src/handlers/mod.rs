pub mod health;
pub mod images;
pub mod validation;

use crate::error::ApiError;

/// Fallback for unmatched routes
pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not Found".to_string())
}
