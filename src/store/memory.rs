//! In-process template store.
//!
//! Holds records in insertion order behind a `tokio::sync::RwLock`. Used by
//! tests and by the CLI when it runs against a JSON snapshot instead of
//! Postgres. Chunked updates are applied item by item; there is no transport
//! that can fail mid-chunk.

use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CategoryChange, CategoryUpdate, StoreError, TemplateStore, prepare_new};
use crate::template::{NewTemplate, TemplateRecord, now_ms};

#[derive(Default)]
struct Inner {
    records: Vec<TemplateRecord>,
    audit: Vec<CategoryChange>,
}

#[derive(Default)]
pub struct MemoryTemplateStore {
    inner: RwLock<Inner>,
}

impl MemoryTemplateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records (ids and timestamps kept as-is).
    #[must_use]
    pub fn with_records(records: Vec<TemplateRecord>) -> Self {
        Self { inner: RwLock::new(Inner { records, audit: Vec::new() }) }
    }

    /// Current records in insertion order.
    pub async fn snapshot(&self) -> Vec<TemplateRecord> {
        self.inner.read().await.records.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }
}

fn apply_update(inner: &mut Inner, id: &str, category: &str, actor: &str, now: i64) -> Result<CategoryChange, StoreError> {
    let record = inner
        .records
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;

    let previous = std::mem::replace(&mut record.category, category.to_owned());
    record.last_modified = now;

    let change = CategoryChange {
        template_id: id.to_owned(),
        previous,
        current: category.to_owned(),
        actor: actor.to_owned(),
        at: now,
    };
    inner.audit.push(change.clone());
    Ok(change)
}

#[async_trait::async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn list(&self) -> Result<Vec<TemplateRecord>, StoreError> {
        let mut records = self.inner.read().await.records.clone();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn list_by_category(&self, category: &str) -> Result<Vec<TemplateRecord>, StoreError> {
        let all = self.list().await?;
        Ok(all.into_iter().filter(|r| r.category == category).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<TemplateRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.records.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_title_category(
        &self,
        title: &str,
        category: &str,
    ) -> Result<Option<TemplateRecord>, StoreError> {
        let title = title.trim().to_lowercase();
        let category = category.trim().to_lowercase();
        let all = self.list().await?;
        Ok(all
            .into_iter()
            .find(|r| r.title.trim().to_lowercase() == title && r.category.trim().to_lowercase() == category))
    }

    async fn create(&self, new: NewTemplate) -> Result<TemplateRecord, StoreError> {
        let new = prepare_new(new)?;
        let record = new.into_record(Uuid::new_v4().to_string(), now_ms());
        self.inner.write().await.records.push(record.clone());
        Ok(record)
    }

    async fn update_category(&self, id: &str, category: &str, actor: &str) -> Result<CategoryChange, StoreError> {
        let mut inner = self.inner.write().await;
        apply_update(&mut inner, id, category, actor, now_ms())
    }

    async fn update_categories(&self, chunk: &[CategoryUpdate]) -> Vec<Result<CategoryChange, StoreError>> {
        let mut inner = self.inner.write().await;
        let now = now_ms();
        chunk
            .iter()
            .map(|u| apply_update(&mut inner, &u.id, &u.category, &u.actor, now))
            .collect()
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.records.len();
        inner.records.retain(|r| r.id != id);
        if inner.records.len() == before {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }

    async fn audit_log(&self, id: &str) -> Result<Vec<CategoryChange>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.audit.iter().filter(|c| c.template_id == id).cloned().collect())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
