use crate::modules::database::{
    async_find_impl, insert_impl, list_all_impl, take_impl, upsert_impl, QUEUE_MODELS,
};
use crate::modules::dispatch::request::EmailRequest;
use crate::modules::queue::entity::QueueEntry;
use native_db::Builder;
use std::sync::Arc;

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
async fn helpers_compose_over_one_database() {
    let db = Arc::new(Builder::new().create_in_memory(&QUEUE_MODELS).unwrap());

    insert_impl(&db, entry("one")).await.unwrap();
    upsert_impl(&db, entry("two")).await.unwrap();

    let found: Option<QueueEntry> = async_find_impl(&db, "one".to_string()).await.unwrap();
    assert_eq!(found.unwrap().recipient, "one@x.example");

    let all: Vec<QueueEntry> = list_all_impl(&db).await.unwrap();
    assert_eq!(all.len(), 2);

    let taken: Option<QueueEntry> = take_impl(&db, "one".to_string()).await.unwrap();
    assert!(taken.is_some());
    let gone: Option<QueueEntry> = async_find_impl(&db, "one".to_string()).await.unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn entries_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    {
        let db = Arc::new(Builder::new().create(&QUEUE_MODELS, &path).unwrap());
        insert_impl(&db, entry("durable")).await.unwrap();
    }

    let db = Arc::new(Builder::new().create(&QUEUE_MODELS, &path).unwrap());
    let found: Option<QueueEntry> = async_find_impl(&db, "durable".to_string()).await.unwrap();
    assert_eq!(found.unwrap().id, "durable");
}
