// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::{
    async_find_impl, insert_impl, select_impl, take_impl, take_matching_impl, update_impl,
};
use crate::modules::error::{code::ErrorCode, MailSpoolResult};
use crate::modules::queue::entity::QueueEntry;
use crate::raise_error;
use native_db::Database;
use std::sync::{Arc, LazyLock};

pub static QUEUE_STORE: LazyLock<QueueStore> =
    LazyLock::new(|| QueueStore::new(DB_MANAGER.queue_db().clone()));

/// Durable id → entry mapping. All operations run as single native_db
/// transactions, so concurrent workers and the supervisor never observe a
/// half-applied mutation.
pub struct QueueStore {
    db: Arc<Database<'static>>,
}

impl QueueStore {
    pub fn new(db: Arc<Database<'static>>) -> Self {
        Self { db }
    }

    pub async fn put(&self, entry: QueueEntry) -> MailSpoolResult<()> {
        insert_impl(&self.db, entry).await
    }

    pub async fn get(&self, id: &str) -> MailSpoolResult<Option<QueueEntry>> {
        async_find_impl(&self.db, id.to_string()).await
    }

    /// Remove an entry and return it, if present.
    pub async fn take(&self, id: &str) -> MailSpoolResult<Option<QueueEntry>> {
        take_impl(&self.db, id.to_string()).await
    }

    /// Atomic read-modify-write of a single entry.
    pub async fn update(
        &self,
        id: &str,
        apply: impl FnOnce(&QueueEntry) -> QueueEntry + Send + 'static,
    ) -> MailSpoolResult<QueueEntry> {
        let key = id.to_string();
        update_impl(
            &self.db,
            move |rw| {
                let found: Option<QueueEntry> = rw
                    .get()
                    .primary(key.clone())
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
                found.ok_or_else(|| {
                    raise_error!(
                        format!("queue entry '{}' not found", key),
                        ErrorCode::ResourceNotFound
                    )
                })
            },
            move |current| Ok(apply(current)),
        )
        .await
    }

    pub async fn select(
        &self,
        filter: impl Fn(&QueueEntry) -> bool + Send + 'static,
    ) -> MailSpoolResult<Vec<QueueEntry>> {
        select_impl(&self.db, filter).await
    }

    /// Remove all entries matching the filter and return them.
    pub async fn take_matching(
        &self,
        filter: impl Fn(&QueueEntry) -> bool + Send + 'static,
    ) -> MailSpoolResult<Vec<QueueEntry>> {
        take_matching_impl(&self.db, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::database::QUEUE_MODELS;
    use crate::modules::dispatch::request::EmailRequest;
    use native_db::Builder;

    pub(crate) fn memory_store() -> QueueStore {
        let db = Builder::new().create_in_memory(&QUEUE_MODELS).unwrap();
        QueueStore::new(Arc::new(db))
    }

    fn entry(id: &str) -> QueueEntry {
        QueueEntry::new(
            id.to_string(),
            format!("{id}@x.example"),
            &EmailRequest::default(),
            b"{}".to_vec(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn put_get_take_round_trip() {
        let store = memory_store();
        store.put(entry("abc")).await.unwrap();

        let loaded = store.get("abc").await.unwrap().unwrap();
        assert_eq!(loaded.recipient, "abc@x.example");

        let taken = store.take("abc").await.unwrap().unwrap();
        assert_eq!(taken.id, "abc");
        assert!(store.get("abc").await.unwrap().is_none());
        assert!(store.take("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = memory_store();
        store.put(entry("abc")).await.unwrap();
        assert!(store.put(entry("abc")).await.is_err());
        // companion suffixes are distinct keys
        store.put(entry("abc+cc")).await.unwrap();
        store.put(entry("abc+bcc")).await.unwrap();
    }

    #[tokio::test]
    async fn update_applies_atomically() {
        let store = memory_store();
        store.put(entry("abc")).await.unwrap();
        let updated = store
            .update("abc", |current| {
                let mut next = current.clone();
                next.retry += 1;
                next
            })
            .await
            .unwrap();
        assert_eq!(updated.retry, 1);
        assert_eq!(store.get("abc").await.unwrap().unwrap().retry, 1);
        assert!(store.update("missing", |c| c.clone()).await.is_err());
    }

    #[tokio::test]
    async fn select_and_take_matching_filter() {
        let store = memory_store();
        for id in ["a", "b", "c"] {
            store.put(entry(id)).await.unwrap();
        }
        let picked = store.select(|e| e.id != "b").await.unwrap();
        assert_eq!(picked.len(), 2);

        let removed = store.take_matching(|e| e.id == "b").await.unwrap();
        assert_eq!(removed.len(), 1);
        assert!(store.get("b").await.unwrap().is_none());
        assert_eq!(store.select(|_| true).await.unwrap().len(), 2);
    }
}
