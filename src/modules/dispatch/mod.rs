// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

//! The long-lived dispatcher. One supervisor task owns the command loop and
//! the poll timer; every outbound send runs on a short-lived worker task it
//! spawns. Requests are processed serially so the config snapshot stays
//! consistent and send/bounce handling is strictly ordered per caller.

use crate::modules::address::generate_message_id;
use crate::modules::bounce;
use crate::modules::dispatch::request::EmailRequest;
use crate::modules::error::{code::ErrorCode, MailSpoolResult};
use crate::modules::hook::{self, events::EventType};
use crate::modules::queue::entity::QueueEntry;
use crate::modules::queue::retry;
use crate::modules::queue::store::{QueueStore, QUEUE_STORE};
use crate::modules::settings::cli::SETTINGS;
use crate::modules::settings::relay::DispatchConfig;
use crate::modules::snapshot::pickle;
use crate::modules::Initialize;
use crate::{raise_error, utc_now};
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub mod request;
pub mod worker;

pub static MAILER: LazyLock<Mailer> = LazyLock::new(Mailer::start);

/// Process-wide dispatcher handle. Callers address the singleton; the
/// supervisor behind it owns all queue mutation ordering.
pub struct Mailer {
    sender: mpsc::Sender<Command>,
}

enum Command {
    Send {
        id: Option<String>,
        request: EmailRequest,
        context: Value,
        reply: oneshot::Sender<MailSpoolResult<String>>,
    },
    Bounced {
        address: String,
    },
}

impl Mailer {
    fn start() -> Self {
        let (sender, receiver) = mpsc::channel(1024);
        tokio::spawn(supervise(receiver));
        Mailer { sender }
    }

    /// Queue a request for delivery. The returned id identifies the base
    /// entry; cc/bcc companions derive from it. The reply is sent only
    /// after the queue commit, so a bounce arriving right after always
    /// finds its entry.
    pub async fn send(&self, request: EmailRequest, context: Value) -> MailSpoolResult<String> {
        self.send_with_id(None, request, context).await
    }

    pub async fn send_with_id(
        &self,
        id: Option<String>,
        request: EmailRequest,
        context: Value,
    ) -> MailSpoolResult<String> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Command::Send {
                id,
                request,
                context,
                reply,
            })
            .await
            .map_err(|_| {
                raise_error!(
                    "mailer supervisor is not running".into(),
                    ErrorCode::InternalError
                )
            })?;
        response.await.map_err(|_| {
            raise_error!(
                "mailer supervisor dropped the request".into(),
                ErrorCode::InternalError
            )
        })?
    }

    /// Report an asynchronous bounce notification.
    pub async fn bounced(&self, address: impl Into<String>) -> MailSpoolResult<()> {
        self.sender
            .send(Command::Bounced {
                address: address.into(),
            })
            .await
            .map_err(|_| {
                raise_error!(
                    "mailer supervisor is not running".into(),
                    ErrorCode::InternalError
                )
            })
    }
}

impl Initialize for Mailer {
    async fn initialize() -> MailSpoolResult<()> {
        LazyLock::force(&MAILER);
        Ok(())
    }
}

async fn supervise(mut receiver: mpsc::Receiver<Command>) {
    let mut tick = tokio::time::interval(Duration::from_secs(
        SETTINGS.mailspool_poll_interval.max(1),
    ));
    // a poll still in progress swallows the ticks it missed
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("mailer supervisor started");
    loop {
        tokio::select! {
            command = receiver.recv() => {
                match command {
                    Some(Command::Send { id, request, context, reply }) => {
                        let result = handle_send(&QUEUE_STORE, id, request, context).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Bounced { address }) => {
                        if let Err(err) = handle_bounced(&QUEUE_STORE, &address).await {
                            warn!(%address, "bounce handling failed: {err}");
                        }
                    }
                    None => {
                        // all handles dropped; let the environment restart us
                        error!("mailer command channel closed, supervisor exiting");
                        break;
                    }
                }
            }
            _ = tick.tick() => {
                if let Err(err) = poll(&QUEUE_STORE).await {
                    warn!("queue poll failed: {err}");
                }
            }
        }
    }
}

/// Persist one entry per non-empty recipient field, then (for immediate
/// requests) launch a worker per entry.
async fn handle_send(
    store: &QueueStore,
    id: Option<String>,
    request: EmailRequest,
    context: Value,
) -> MailSpoolResult<String> {
    request.validate()?;
    let base_id = match id {
        Some(id) if !id.trim().is_empty() => id,
        _ => generate_message_id(),
    };
    let context_bytes = pickle(&context)?;

    let enqueued = enqueue(store, &base_id, &request, &context_bytes).await?;
    info!(
        message_id = %base_id,
        entries = enqueued.len(),
        queued = request.queue,
        "send request accepted"
    );

    if !request.queue {
        let cfg = DispatchConfig::snapshot()?;
        for entry_id in &enqueued {
            worker::spawn(entry_id.clone(), cfg.clone());
        }
    }
    Ok(base_id)
}

/// The base recipient, cc companion and bcc companion, in that order.
fn fanout(base_id: &str, request: &EmailRequest) -> Vec<(String, String)> {
    let mut targets = vec![(base_id.to_string(), request.to.clone())];
    if let Some(cc) = request.cc.as_deref().filter(|v| !v.trim().is_empty()) {
        targets.push((format!("{base_id}+cc"), cc.to_string()));
    }
    if let Some(bcc) = request.bcc.as_deref().filter(|v| !v.trim().is_empty()) {
        targets.push((format!("{base_id}+bcc"), bcc.to_string()));
    }
    targets
}

async fn enqueue(
    store: &QueueStore,
    base_id: &str,
    request: &EmailRequest,
    context_bytes: &[u8],
) -> MailSpoolResult<Vec<String>> {
    let mut enqueued = Vec::new();
    for (entry_id, recipient) in fanout(base_id, request) {
        let entry = QueueEntry::new(entry_id.clone(), recipient, request, context_bytes.to_vec())?;
        store.put(entry).await?;
        enqueued.push(entry_id);
    }
    Ok(enqueued)
}

async fn handle_bounced(store: &QueueStore, address: &str) -> MailSpoolResult<()> {
    if let Some(entry) = bounce::correlate(store, address).await? {
        info!(
            message_id = %entry.id,
            recipient = %entry.recipient,
            "bounce correlated, entry removed"
        );
        hook::emit(EventType::EmailBounced, &entry);
    }
    Ok(())
}

/// One poll pass: fresh config, purge delivered and exhausted entries with
/// their events, then consume every due entry. `update_retry` runs before
/// the worker spawn so no second worker can pick the same entry up.
async fn poll(store: &QueueStore) -> MailSpoolResult<()> {
    let cfg = DispatchConfig::snapshot()?;
    let now = utc_now!();

    for entry in retry::purge_sent(store, now).await? {
        info!(
            message_id = %entry.id,
            recipient = %entry.recipient,
            "delivered entry aged out"
        );
        hook::emit(EventType::EmailSent, &entry);
    }

    for entry in retry::purge_exhausted(store, now).await? {
        warn!(
            message_id = %entry.id,
            recipient = %entry.recipient,
            attempts = entry.retry,
            "retries exhausted, dropping"
        );
        hook::emit(EventType::EmailFailed, &entry);
    }

    for entry in retry::due_entries(store, now).await? {
        retry::update_retry(store, &entry.id).await?;
        worker::spawn(entry.id.clone(), cfg.clone());
    }
    Ok(())
}
