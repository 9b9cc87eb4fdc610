//! The persisted course catalog and the two operations the crawler needs on it.
//!
//! The crawler only ever reads by identifier and appends; it never updates or
//! deletes. Consistency between concurrent writers is left to the store.

use crate::error::StoreError;
use crate::models::{CourseId, CourseRecord};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info, instrument};

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Title of a stored course, `None` when the identifier is unknown.
    async fn course_title(&self, id: &CourseId) -> Result<Option<String>, StoreError>;

    async fn insert_course(&self, record: &CourseRecord) -> Result<(), StoreError>;
}

/// SQL-backed catalog. Expects a `courses(course_number, course_name)` table.
#[derive(Debug, Clone)]
pub struct SqlCatalogStore {
    pool: SqlitePool,
}

impl SqlCatalogStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        info!(database_url, "Connected to course catalog");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `courses` table when missing. Real deployments migrate the
    /// schema separately; this is for local databases and tests.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS courses (
                course_number TEXT PRIMARY KEY NOT NULL,
                course_name TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for SqlCatalogStore {
    async fn course_title(&self, id: &CourseId) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT course_name FROM courses WHERE course_number = ?")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(name,)| name))
    }

    async fn insert_course(&self, record: &CourseRecord) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO courses (course_number, course_name) VALUES (?, ?)")
            .bind(record.identifier.as_str())
            .bind(&record.title)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Splits candidates into known and new by a point lookup.
///
/// A failed lookup is an error, never "unknown": treating an outage as "new"
/// would try to insert the whole listing again.
pub struct DedupFilter<'a> {
    store: &'a dyn CatalogStore,
}

impl<'a> DedupFilter<'a> {
    pub fn new(store: &'a dyn CatalogStore) -> Self {
        Self { store }
    }

    #[instrument(level = "debug", skip(self), fields(course = %id))]
    pub async fn is_known(&self, id: &CourseId) -> Result<bool, StoreError> {
        let known = self.store.course_title(id).await?.is_some();
        debug!(known, "Checked catalog");
        Ok(known)
    }
}

/// Inserts new courses one at a time. Each insert commits on its own.
pub struct Persister<'a> {
    store: &'a dyn CatalogStore,
}

impl<'a> Persister<'a> {
    pub fn new(store: &'a dyn CatalogStore) -> Self {
        Self { store }
    }

    #[instrument(level = "debug", skip_all, fields(course = %record.identifier))]
    pub async fn insert(&self, record: &CourseRecord) -> Result<(), StoreError> {
        self.store.insert_course(record).await?;
        info!(course = %record.identifier, title = %record.title, "Inserted new course");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingStore, MemoryStore};

    async fn memory_sql_store() -> SqlCatalogStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqlCatalogStore::from_pool(pool);
        store.ensure_schema().await.unwrap();
        store
    }

    fn record(id: &str, title: &str) -> CourseRecord {
        CourseRecord {
            identifier: CourseId::parse(id).unwrap(),
            title: title.to_string(),
        }
    }

    #[tokio::test]
    async fn test_sql_store_lookup_and_insert() {
        let store = memory_sql_store().await;
        let id = CourseId::parse("252-0002-00L").unwrap();

        assert_eq!(store.course_title(&id).await.unwrap(), None);
        store.insert_course(&record("252-0002-00L", "Databases")).await.unwrap();
        assert_eq!(store.course_title(&id).await.unwrap().as_deref(), Some("Databases"));
    }

    #[tokio::test]
    async fn test_sql_store_rejects_duplicate_insert() {
        let store = memory_sql_store().await;
        store.insert_course(&record("252-0002-00L", "Databases")).await.unwrap();
        let err = store
            .insert_course(&record("252-0002-00L", "Databases"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[tokio::test]
    async fn test_dedup_filter_classifies() {
        let store = MemoryStore::with(&[("252-0001-00L", "Systems Design")]);
        let filter = DedupFilter::new(&store);
        assert!(filter.is_known(&CourseId::parse("252-0001-00L").unwrap()).await.unwrap());
        assert!(!filter.is_known(&CourseId::parse("252-0002-00L").unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn test_dedup_filter_propagates_store_errors() {
        let store = FailingStore;
        let filter = DedupFilter::new(&store);
        let result = filter.is_known(&CourseId::parse("252-0001-00L").unwrap()).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_persister_inserts_single_record() {
        let store = MemoryStore::default();
        Persister::new(&store)
            .insert(&record("252-0002-00L", "Databases"))
            .await
            .unwrap();
        assert_eq!(store.inserted(), vec![record("252-0002-00L", "Databases")]);
    }
}
