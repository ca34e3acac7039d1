// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use crate::modules::address::generate_message_id;
use crate::modules::spamd::SpamVerdict;
use crate::utc_now;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A delivery-outcome notification published to the surrounding application.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub event_id: String,
    pub event_type: EventType,
    /// Timestamp (in milliseconds) when the event occurred.
    pub timestamp: i64,
    pub payload: EventPayload,
}

impl DispatchEvent {
    pub fn new(event_type: EventType, payload: EventPayload) -> Self {
        Self {
            event_id: generate_message_id(),
            event_type,
            timestamp: utc_now!(),
            payload,
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventType {
    /// A delivered entry aged out of the queue.
    EmailSent,
    /// Permanent failure or exhausted retries.
    EmailFailed,
    /// An inbound bounce correlated back to its queue entry.
    EmailBounced,
    /// SpamAssassin verdict for a delivered message.
    EmailSpamStatus,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::EmailSent => write!(f, "EmailSent"),
            EventType::EmailFailed => write!(f, "EmailFailed"),
            EventType::EmailBounced => write!(f, "EmailBounced"),
            EventType::EmailSpamStatus => write!(f, "EmailSpamStatus"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    Delivery(DeliveryOutcome),
    SpamStatus(SpamStatus),
}

/// Shared payload of sent/failed/bounced events: which message, who it was
/// for, and the caller context restored from the queue snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub message_id: String,
    pub recipient: String,
    pub context: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpamStatus {
    pub message_id: String,
    pub verdict: SpamVerdict,
    pub context: Value,
}
