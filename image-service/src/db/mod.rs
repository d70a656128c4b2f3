pub mod repository;

pub use repository::{is_invalid_pattern, ImageRepository, PgImageRepository};
