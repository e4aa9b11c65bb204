//! Postgres-backed template store.
//!
//! DESIGN
//! ======
//! One row per template in `templates`, one row per category reassignment in
//! `template_category_audit`. A category update reads the previous value and
//! writes the new one in a single statement so concurrent sessions resolve
//! last-write-wins without a read/modify/write gap.
//!
//! ERROR HANDLING
//! ==============
//! Chunked updates run in one transaction. A missing id is reported for that
//! item and the chunk continues; any SQL error rolls the chunk back and every
//! item in it is reported failed, since none of them were committed.

use sqlx::{PgConnection, PgPool};
use tracing::warn;
use uuid::Uuid;

use super::{CategoryChange, CategoryUpdate, StoreError, TemplateStore, prepare_new};
use crate::template::{NewTemplate, TemplateRecord, now_ms};

const SELECT_COLUMNS: &str = "id, title, category, description, preview_url, video_source, tags, \
                              platform, quality, usage_score, created_at, last_modified";

type TemplateRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Vec<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
    i64,
    i64,
);

fn record_from_row(row: TemplateRow) -> TemplateRecord {
    let (
        id,
        title,
        category,
        description,
        preview_url,
        video_source,
        tags,
        platform,
        quality,
        usage_score,
        created_at,
        last_modified,
    ) = row;
    TemplateRecord {
        id,
        title,
        category,
        description,
        preview_url,
        video_source,
        tags,
        platform,
        quality,
        usage_score,
        created_at,
        last_modified,
    }
}

#[derive(Clone)]
pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Swap the category of one row and append the audit entry.
/// Returns `None` when the id does not exist.
async fn apply_category_update(
    conn: &mut PgConnection,
    update: &CategoryUpdate,
    now: i64,
) -> Result<Option<CategoryChange>, sqlx::Error> {
    let previous: Option<String> = sqlx::query_scalar(
        "UPDATE templates AS t SET category = $2, last_modified = $3 \
         FROM (SELECT id, category FROM templates WHERE id = $1 FOR UPDATE) AS prev \
         WHERE t.id = prev.id \
         RETURNING prev.category",
    )
    .bind(&update.id)
    .bind(&update.category)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(previous) = previous else {
        return Ok(None);
    };

    sqlx::query(
        "INSERT INTO template_category_audit (template_id, previous, current, actor, at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&update.id)
    .bind(&previous)
    .bind(&update.category)
    .bind(&update.actor)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Some(CategoryChange {
        template_id: update.id.clone(),
        previous,
        current: update.category.clone(),
        actor: update.actor.clone(),
        at: now,
    }))
}

fn chunk_failed(chunk: &[CategoryUpdate], error: &sqlx::Error) -> Vec<Result<CategoryChange, StoreError>> {
    let message = error.to_string();
    chunk
        .iter()
        .map(|_| Err(StoreError::Unavailable(message.clone())))
        .collect()
}

#[async_trait::async_trait]
impl TemplateStore for PgTemplateStore {
    async fn list(&self) -> Result<Vec<TemplateRecord>, StoreError> {
        let rows = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM templates ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(record_from_row).collect())
    }

    async fn list_by_category(&self, category: &str) -> Result<Vec<TemplateRecord>, StoreError> {
        let rows = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM templates WHERE category = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(record_from_row).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<TemplateRecord>, StoreError> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!("SELECT {SELECT_COLUMNS} FROM templates WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(record_from_row))
    }

    async fn find_by_title_category(
        &self,
        title: &str,
        category: &str,
    ) -> Result<Option<TemplateRecord>, StoreError> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM templates \
             WHERE lower(btrim(title)) = lower($1) AND lower(btrim(category)) = lower($2) \
             ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .bind(title.trim())
        .bind(category.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(record_from_row))
    }

    async fn create(&self, new: NewTemplate) -> Result<TemplateRecord, StoreError> {
        let new = prepare_new(new)?;
        let record = new.into_record(Uuid::new_v4().to_string(), now_ms());

        sqlx::query(
            "INSERT INTO templates (id, title, category, description, preview_url, video_source, tags, \
                                    platform, quality, usage_score, created_at, last_modified) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.category)
        .bind(&record.description)
        .bind(&record.preview_url)
        .bind(&record.video_source)
        .bind(&record.tags)
        .bind(&record.platform)
        .bind(&record.quality)
        .bind(record.usage_score)
        .bind(record.created_at)
        .bind(record.last_modified)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_category(&self, id: &str, category: &str, actor: &str) -> Result<CategoryChange, StoreError> {
        let update = CategoryUpdate { id: id.to_owned(), category: category.to_owned(), actor: actor.to_owned() };
        let mut tx = self.pool.begin().await?;
        let change = apply_category_update(&mut tx, &update, now_ms()).await?;
        let Some(change) = change else {
            tx.rollback().await?;
            return Err(StoreError::NotFound(id.to_owned()));
        };
        tx.commit().await?;
        Ok(change)
    }

    async fn update_categories(&self, chunk: &[CategoryUpdate]) -> Vec<Result<CategoryChange, StoreError>> {
        if chunk.is_empty() {
            return Vec::new();
        }

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => return chunk_failed(chunk, &e),
        };

        let now = now_ms();
        let mut results = Vec::with_capacity(chunk.len());
        for update in chunk {
            match apply_category_update(&mut tx, update, now).await {
                Ok(Some(change)) => results.push(Ok(change)),
                Ok(None) => results.push(Err(StoreError::NotFound(update.id.clone()))),
                Err(e) => {
                    warn!(error = %e, id = %update.id, count = chunk.len(), "category chunk failed; rolling back");
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "category chunk rollback failed");
                    }
                    return chunk_failed(chunk, &e);
                }
            }
        }

        if let Err(e) = tx.commit().await {
            warn!(error = %e, count = chunk.len(), "category chunk commit failed");
            return chunk_failed(chunk, &e);
        }
        results
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM templates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }

    async fn audit_log(&self, id: &str) -> Result<Vec<CategoryChange>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String, String, i64)>(
            "SELECT template_id, previous, current, actor, at FROM template_category_audit \
             WHERE template_id = $1 ORDER BY at ASC, seq ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(template_id, previous, current, actor, at)| CategoryChange {
                template_id,
                previous,
                current,
                actor,
                at,
            })
            .collect())
    }
}

#[cfg(all(test, feature = "live-db-tests"))]
mod live_tests {
    use super::*;

    async fn live_store() -> PgTemplateStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required for live-db-tests");
        let pool = crate::db::init_pool(&url, 2).await.expect("database init failed");
        PgTemplateStore::new(pool)
    }

    #[tokio::test]
    async fn create_update_delete_round_trip() {
        let store = live_store().await;
        let created = store.create(NewTemplate::new("Live Intro", "Reels")).await.unwrap();

        let change = store.update_category(&created.id, "Shorts", "live-test").await.unwrap();
        assert_eq!(change.previous, "Reels");
        assert_eq!(store.audit_log(&created.id).await.unwrap().len(), 1);

        store.delete(&created.id).await.unwrap();
        assert!(store.delete(&created.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn update_categories_reports_missing_per_item() {
        let store = live_store().await;
        let created = store.create(NewTemplate::new("Live Chunk", "Reels")).await.unwrap();
        let chunk = vec![
            CategoryUpdate { id: created.id.clone(), category: "Shorts".into(), actor: "live".into() },
            CategoryUpdate { id: Uuid::new_v4().to_string(), category: "Shorts".into(), actor: "live".into() },
        ];
        let results = store.update_categories(&chunk).await;
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(StoreError::NotFound(_))));
        store.delete(&created.id).await.unwrap();
    }
}
