use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{Image, NewImage};

const IMAGE_COLUMNS: &str =
    "id, title, description, filename, upload_date, size, content_type, file_id, width, height";

/// SQLSTATE `invalid_regular_expression`, raised for a search pattern `~*` cannot compile
const INVALID_REGULAR_EXPRESSION: &str = "2201B";

/// Whether `err` is Postgres rejecting the search pattern of a listing
pub fn is_invalid_pattern(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(INVALID_REGULAR_EXPRESSION),
        _ => false,
    }
}

/// Metadata store for uploaded images
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageRepository: Send + Sync {
    async fn insert(&self, image: NewImage) -> Result<Image, sqlx::Error>;

    async fn find_by_file_id(&self, file_id: Uuid) -> Result<Option<Image>, sqlx::Error>;

    /// Newest first, strictly older than `cursor`, filtered by a
    /// case-insensitive regex on title or description. A pattern the store
    /// cannot compile fails with an error for which [`is_invalid_pattern`] holds.
    async fn list(
        &self,
        cursor: Option<Uuid>,
        search: Option<String>,
        fetch_limit: i64,
    ) -> Result<Vec<Image>, sqlx::Error>;

    async fn delete_by_file_id(&self, file_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn ping(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct PgImageRepository {
    pool: PgPool,
}

impl PgImageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImageRepository for PgImageRepository {
    async fn insert(&self, image: NewImage) -> Result<Image, sqlx::Error> {
        let id = Uuid::now_v7();

        let created = sqlx::query_as::<_, Image>(&format!(
            r#"
            INSERT INTO images (
                id,
                title,
                description,
                filename,
                upload_date,
                size,
                content_type,
                file_id,
                width,
                height,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, $4, NOW(), $5, $6, $7, $8, $9, NOW(), NOW())
            RETURNING {}
            "#,
            IMAGE_COLUMNS
        ))
        .bind(id)
        .bind(&image.title)
        .bind(&image.description)
        .bind(&image.filename)
        .bind(image.size)
        .bind(&image.content_type)
        .bind(image.file_id)
        .bind(image.width)
        .bind(image.height)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(image_id = %created.id, file_id = %created.file_id, "Created image record");
        Ok(created)
    }

    async fn find_by_file_id(&self, file_id: Uuid) -> Result<Option<Image>, sqlx::Error> {
        let image = sqlx::query_as::<_, Image>(&format!(
            "SELECT {} FROM images WHERE file_id = $1",
            IMAGE_COLUMNS
        ))
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(image)
    }

    async fn list(
        &self,
        cursor: Option<Uuid>,
        search: Option<String>,
        fetch_limit: i64,
    ) -> Result<Vec<Image>, sqlx::Error> {
        let mut query = build_list_query(cursor, search, fetch_limit);
        let images = query.build_query_as::<Image>().fetch_all(&self.pool).await?;

        Ok(images)
    }

    async fn delete_by_file_id(&self, file_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM images WHERE file_id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> bool {
        shared::database::health_check(&self.pool).await
    }
}

fn build_list_query(
    cursor: Option<Uuid>,
    search: Option<String>,
    fetch_limit: i64,
) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("SELECT {} FROM images WHERE TRUE", IMAGE_COLUMNS));

    if let Some(cursor) = cursor {
        query.push(" AND id < ").push_bind(cursor);
    }

    if let Some(pattern) = search {
        query
            .push(" AND (title ~* ")
            .push_bind(pattern.clone())
            .push(" OR description ~* ")
            .push_bind(pattern)
            .push(")");
    }

    query.push(" ORDER BY id DESC LIMIT ").push_bind(fetch_limit);
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Execute;

    fn new_image(title: &str, description: &str) -> NewImage {
        NewImage {
            title: title.to_string(),
            description: description.to_string(),
            filename: format!("{}.png", title),
            size: 128,
            content_type: "image/png".to_string(),
            file_id: Uuid::now_v7(),
            width: Some(32),
            height: None,
        }
    }

    fn titles(images: &[Image]) -> Vec<&str> {
        images.iter().map(|image| image.title.as_str()).collect()
    }

    #[test]
    fn test_list_query_without_filters() {
        let mut query = build_list_query(None, None, 11);
        let sql = query.build().sql().to_string();

        assert!(sql.ends_with("WHERE TRUE ORDER BY id DESC LIMIT $1"));
    }

    #[test]
    fn test_list_query_with_cursor_and_search() {
        let mut query = build_list_query(Some(Uuid::now_v7()), Some("cat".to_string()), 6);
        let sql = query.build().sql().to_string();

        assert!(sql.contains("AND id < $1"));
        assert!(sql.contains("AND (title ~* $2 OR description ~* $3)"));
        assert!(sql.ends_with("ORDER BY id DESC LIMIT $4"));
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    #[ignore = "requires DATABASE_URL"]
    async fn insert_and_find_round_trip(pool: PgPool) {
        let repo = PgImageRepository::new(pool);
        let created = repo.insert(new_image("harbour", "Boats")).await.unwrap();

        let found = repo.find_by_file_id(created.file_id).await.unwrap();
        assert_eq!(found, Some(created.clone()));
        assert_eq!(created.width, Some(32));
        assert_eq!(created.height, None);

        assert!(repo.delete_by_file_id(created.file_id).await.unwrap());
        assert!(!repo.delete_by_file_id(created.file_id).await.unwrap());
        assert_eq!(repo.find_by_file_id(created.file_id).await.unwrap(), None);
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    #[ignore = "requires DATABASE_URL"]
    async fn list_pages_newest_first_with_cursor(pool: PgPool) {
        let repo = PgImageRepository::new(pool);
        for title in ["one", "Two cats", "three"] {
            repo.insert(new_image(title, "seen from the pier")).await.unwrap();
        }

        let first = repo.list(None, None, 2).await.unwrap();
        assert_eq!(titles(&first), vec!["three", "Two cats"]);

        let rest = repo.list(Some(first[1].id), None, 2).await.unwrap();
        assert_eq!(titles(&rest), vec!["one"]);
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    #[ignore = "requires DATABASE_URL"]
    async fn list_search_is_case_insensitive_on_title_or_description(pool: PgPool) {
        let repo = PgImageRepository::new(pool);
        repo.insert(new_image("Two cats", "sleeping")).await.unwrap();
        repo.insert(new_image("harbour", "a CAT on a boat")).await.unwrap();
        repo.insert(new_image("mountain", "snow")).await.unwrap();

        let found = repo.list(None, Some("cat".to_string()), 10).await.unwrap();
        assert_eq!(titles(&found), vec!["harbour", "Two cats"]);
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    #[ignore = "requires DATABASE_URL"]
    async fn pattern_outside_postgres_dialect_is_flagged(pool: PgPool) {
        let repo = PgImageRepository::new(pool);
        repo.insert(new_image("one", "first")).await.unwrap();

        // Valid for the regex crate, rejected by Postgres
        let err = repo
            .list(None, Some(r"\p{L}".to_string()), 10)
            .await
            .unwrap_err();
        assert!(is_invalid_pattern(&err), "unexpected error: {}", err);
    }

    #[test]
    fn test_only_regex_sqlstate_counts_as_invalid_pattern() {
        assert!(!is_invalid_pattern(&sqlx::Error::RowNotFound));
        assert!(!is_invalid_pattern(&sqlx::Error::PoolTimedOut));
    }
}
