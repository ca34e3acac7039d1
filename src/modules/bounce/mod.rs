// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

//! Inbound bounce correlation. The VERP envelope sender of every outbound
//! message carries its queue id, so a bounce addressed to it maps straight
//! back to the entry without any sender lookup.

use crate::modules::address::message_id_from_bounce;
use crate::modules::error::MailSpoolResult;
use crate::modules::queue::entity::QueueEntry;
use crate::modules::queue::store::QueueStore;
use tracing::debug;

/// Resolve a bounce address to its queue entry and remove the entry. Orphan
/// bounces (no matching id, or not a bounce address at all) are dropped
/// silently: custom bounce domains may deliver bounces this instance never
/// issued.
pub async fn correlate(store: &QueueStore, address: &str) -> MailSpoolResult<Option<QueueEntry>> {
    let Some(message_id) = message_id_from_bounce(address) else {
        debug!(%address, "not a bounce address, ignoring");
        return Ok(None);
    };
    let entry = store.take(&message_id).await?;
    if entry.is_none() {
        debug!(%address, %message_id, "bounce for unknown message id, ignoring");
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::database::QUEUE_MODELS;
    use crate::modules::dispatch::request::EmailRequest;
    use native_db::Builder;
    use std::sync::Arc;

    fn memory_store() -> QueueStore {
        let db = Builder::new().create_in_memory(&QUEUE_MODELS).unwrap();
        QueueStore::new(Arc::new(db))
    }

    #[tokio::test]
    async fn matching_bounce_removes_and_returns_the_entry() {
        let store = memory_store();
        let entry = QueueEntry::new(
            "abcdefghij0123456789".to_string(),
            "a@x.example".to_string(),
            &EmailRequest::default(),
            Vec::new(),
        )
        .unwrap();
        store.put(entry).await.unwrap();

        let resolved = correlate(&store, "noreply+abcdefghij0123456789@bounce.example")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.id, "abcdefghij0123456789");
        assert_eq!(resolved.recipient, "a@x.example");
        assert!(store.get("abcdefghij0123456789").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn orphan_bounces_are_ignored() {
        let store = memory_store();
        assert!(correlate(&store, "noreply+unknownid@bounce.example")
            .await
            .unwrap()
            .is_none());
        assert!(correlate(&store, "someone@example.com")
            .await
            .unwrap()
            .is_none());
        assert!(correlate(&store, "noreply+@example.com")
            .await
            .unwrap()
            .is_none());
    }
}
