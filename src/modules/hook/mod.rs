// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use crate::modules::hook::events::{
    DeliveryOutcome, DispatchEvent, EventPayload, EventType, SpamStatus,
};
use crate::modules::queue::entity::QueueEntry;
use crate::modules::snapshot::depickle;
use crate::modules::spamd::SpamVerdict;
use serde_json::Value;
use std::sync::LazyLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub mod events;

pub static EVENT_CHANNEL: LazyLock<EventChannel> = LazyLock::new(EventChannel::new);

/// Fire-and-forget notifier bus. The application subscribes; publishing with
/// no subscribers simply drops the event.
pub struct EventChannel {
    sender: broadcast::Sender<DispatchEvent>,
}

impl EventChannel {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        EventChannel { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: DispatchEvent) {
        debug!(
            event_type = %event.event_type,
            event_id = %event.event_id,
            "dispatch event"
        );
        let _ = self.sender.send(event);
    }
}

/// Emit a sent/failed/bounced event for a queue entry, restoring the
/// caller's context snapshot.
pub fn emit(event_type: EventType, entry: &QueueEntry) {
    let payload = EventPayload::Delivery(DeliveryOutcome {
        message_id: entry.id.clone(),
        recipient: entry.recipient.clone(),
        context: restore_context(entry),
    });
    EVENT_CHANNEL.publish(DispatchEvent::new(event_type, payload));
}

pub fn emit_spam_status(entry: &QueueEntry, verdict: SpamVerdict) {
    let payload = EventPayload::SpamStatus(SpamStatus {
        message_id: entry.id.clone(),
        verdict,
        context: restore_context(entry),
    });
    EVENT_CHANNEL.publish(DispatchEvent::new(EventType::EmailSpamStatus, payload));
}

fn restore_context(entry: &QueueEntry) -> Value {
    depickle(&entry.context).unwrap_or_else(|err| {
        warn!(message_id = %entry.id, "context snapshot did not restore: {err}");
        Value::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::dispatch::request::EmailRequest;
    use crate::modules::snapshot::pickle;
    use serde_json::json;

    fn entry_with_context(context: Value) -> QueueEntry {
        QueueEntry::new(
            "abc".to_string(),
            "a@x.example".to_string(),
            &EmailRequest::default(),
            pickle(&context).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let mut receiver = EVENT_CHANNEL.subscribe();
        let context = json!({"tenant": "acme"});
        emit(EventType::EmailBounced, &entry_with_context(context.clone()));

        // other tests publish on the same global bus; wait for ours
        let event = loop {
            let event = receiver.recv().await.unwrap();
            if event.event_type == EventType::EmailBounced {
                break event;
            }
        };
        match event.payload {
            EventPayload::Delivery(outcome) => {
                assert_eq!(outcome.message_id, "abc");
                assert_eq!(outcome.recipient, "a@x.example");
                assert_eq!(outcome.context, context);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        emit(EventType::EmailSent, &entry_with_context(Value::Null));
    }
}
