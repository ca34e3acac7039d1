// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use crate::modules::error::MailSpoolResult;
use crate::modules::queue::entity::QueueEntry;
use crate::modules::queue::store::QueueStore;
use crate::utc_now;

/// An entry is active while `retry` has not passed this bound.
pub const MAX_RETRY: u32 = 7;

/// Delivered entries are kept this long so late bounces still correlate.
pub const DELETE_AFTER_MINUTES: i64 = 240;

const MINUTE_MILLIS: i64 = 60_000;

/// Delay until the next attempt, keyed on the attempt count before the
/// attempt being scheduled.
const BACKOFF_MINUTES: [i64; 7] = [10, 60, 720, 1440, 2880, 4320, 10080];

pub fn period_millis(retry: u32) -> i64 {
    let index = (retry as usize).min(BACKOFF_MINUTES.len() - 1);
    BACKOFF_MINUTES[index] * MINUTE_MILLIS
}

/// Consume one attempt: bump `retry`, push `retry_on` out by the period of
/// the old count. `retry_on` never moves backwards.
pub async fn update_retry(store: &QueueStore, id: &str) -> MailSpoolResult<QueueEntry> {
    let now = utc_now!();
    store
        .update(id, move |entry| {
            let mut next = entry.clone();
            next.retry_on = (now + period_millis(entry.retry)).max(entry.retry_on);
            next.retry += 1;
            next
        })
        .await
}

pub async fn mark_sent(store: &QueueStore, id: &str) -> MailSpoolResult<QueueEntry> {
    let now = utc_now!();
    store
        .update(id, move |entry| {
            let mut next = entry.clone();
            next.sent = Some(now);
            next
        })
        .await
}

/// Remove delivered entries past the retention window; returns them so the
/// caller emits one sent event per entry.
pub async fn purge_sent(store: &QueueStore, now: i64) -> MailSpoolResult<Vec<QueueEntry>> {
    store
        .take_matching(move |entry| {
            entry
                .sent
                .map(|sent| now - sent > DELETE_AFTER_MINUTES * MINUTE_MILLIS)
                .unwrap_or(false)
        })
        .await
}

/// Remove entries whose retries ran out; returns them for failure events.
pub async fn purge_exhausted(store: &QueueStore, _now: i64) -> MailSpoolResult<Vec<QueueEntry>> {
    store.take_matching(|entry| entry.is_exhausted()).await
}

pub async fn due_entries(store: &QueueStore, now: i64) -> MailSpoolResult<Vec<QueueEntry>> {
    store
        .select(move |entry| entry.is_active() && entry.retry_on < now)
        .await
}
