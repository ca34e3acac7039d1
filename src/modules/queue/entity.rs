// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use crate::modules::dispatch::request::EmailRequest;
use crate::modules::error::{code::ErrorCode, MailSpoolResult};
use crate::modules::queue::retry::{period_millis, MAX_RETRY};
use crate::{raise_error, utc_now};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// A persisted outbound message. cc/bcc companions share the base id with a
/// literal `+cc` / `+bcc` suffix, so they coexist with the base entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct QueueEntry {
    #[primary_key]
    pub id: String,
    /// Recipient resolved for this entry (to, cc or bcc of the request).
    pub recipient: String,
    /// The original request, serialized as JSON.
    pub email: String,
    /// Opaque caller-context snapshot, restored for event emission.
    pub context: Vec<u8>,
    pub created: i64,
    /// Next eligible attempt; monotonically non-decreasing while active.
    pub retry_on: i64,
    pub retry: u32,
    pub sent: Option<i64>,
}

impl QueueEntry {
    pub fn new(
        id: String,
        recipient: String,
        request: &EmailRequest,
        context: Vec<u8>,
    ) -> MailSpoolResult<Self> {
        let email = serde_json::to_string(request)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        let now = utc_now!();
        Ok(Self {
            id,
            recipient,
            email,
            context,
            created: now,
            retry_on: now + period_millis(0),
            retry: 0,
            sent: None,
        })
    }

    pub fn request(&self) -> MailSpoolResult<EmailRequest> {
        serde_json::from_str(&self.email)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
    }

    pub fn is_active(&self) -> bool {
        self.sent.is_none() && self.retry <= MAX_RETRY
    }

    pub fn is_exhausted(&self) -> bool {
        self.sent.is_none() && self.retry > MAX_RETRY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(retry: u32, sent: Option<i64>) -> QueueEntry {
        QueueEntry {
            retry,
            sent,
            ..QueueEntry::new(
                "abc".to_string(),
                "a@x.example".to_string(),
                &EmailRequest::default(),
                Vec::new(),
            )
            .unwrap()
        }
    }

    #[test]
    fn new_entries_wait_ten_minutes() {
        let e = entry(0, None);
        assert_eq!(e.retry_on - e.created, 10 * 60_000);
        assert!(e.is_active());
    }

    #[test]
    fn the_request_round_trips_through_the_entry() {
        let request = EmailRequest {
            to: "a@x.example".to_string(),
            subject: Some("Hi".to_string()),
            vars: Some(serde_json::json!({"name": "Jane"})),
            ..Default::default()
        };
        let entry = QueueEntry::new(
            "abc".to_string(),
            "a@x.example".to_string(),
            &request,
            Vec::new(),
        )
        .unwrap();
        assert_eq!(entry.request().unwrap(), request);
    }

    #[test]
    fn classification_follows_retry_and_sent() {
        assert!(entry(MAX_RETRY, None).is_active());
        assert!(entry(MAX_RETRY + 1, None).is_exhausted());
        let delivered = entry(3, Some(1));
        assert!(!delivered.is_active());
        assert!(!delivered.is_exhausted());
    }
}
