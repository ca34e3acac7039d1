// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use crate::modules::address::{
    bounce_email, escape_email, extract_email, parse_address, single_line, split_address,
};
use crate::modules::compose::embed::PassthroughEmbedder;
use crate::modules::compose::encode_message;
use crate::modules::dispatch::request::EmailRequest;
use crate::modules::error::MailSpoolResult;
use crate::modules::hook::{self, events::EventType};
use crate::modules::queue::entity::QueueEntry;
use crate::modules::queue::retry;
use crate::modules::queue::store::{QueueStore, QUEUE_STORE};
use crate::modules::settings::relay::DispatchConfig;
use crate::modules::smtp::route::{resolve_route, submit, SendError, SmtpRoute};
use crate::modules::spamd;
use tracing::{debug, error, info, warn};

/// Launch a worker task for one queue entry. Workers translate every
/// outcome into queue state and events; nothing propagates back to the
/// supervisor.
pub fn spawn(entry_id: String, cfg: DispatchConfig) {
    tokio::spawn(async move {
        if let Err(err) = dispatch(&QUEUE_STORE, &entry_id, &cfg).await {
            error!(message_id = %entry_id, "dispatch aborted on a store failure: {err}");
        }
    });
}

pub(crate) async fn dispatch(
    store: &QueueStore,
    entry_id: &str,
    cfg: &DispatchConfig,
) -> MailSpoolResult<()> {
    let Some(entry) = store.get(entry_id).await? else {
        debug!(message_id = %entry_id, "queue entry vanished before dispatch");
        return Ok(());
    };
    if entry.sent.is_some() {
        return Ok(());
    }

    let request = match entry.request() {
        Ok(request) => request,
        Err(err) => {
            error!(message_id = %entry.id, "stored request failed to parse: {err}");
            if let Some(removed) = store.take(&entry.id).await? {
                hook::emit(EventType::EmailFailed, &removed);
            }
            return Ok(());
        }
    };
    let verp = bounce_email(&entry.id, cfg);

    match send_entry(&entry, &request, &verp, cfg).await {
        Ok(delivered) => {
            retry::mark_sent(store, &entry.id).await?;
            info!(
                message_id = %entry.id,
                recipient = %entry.recipient,
                attempt = entry.retry,
                "message accepted by remote server"
            );
            if let Some(bcc) = cfg.bcc() {
                spawn_bcc_copy(bcc, &verp, &delivered);
            }
            if let Some((host, port)) = cfg.spamd() {
                match spamd::check(&host, port, &delivered.bytes).await {
                    Ok(verdict) => hook::emit_spam_status(&entry, verdict),
                    Err(err) => warn!(message_id = %entry.id, "spamd probe failed: {err}"),
                }
            }
        }
        Err(SendError::Temporary(reason)) => {
            // untouched; the next poll re-evaluates against retry_on
            info!(
                message_id = %entry.id,
                attempt = entry.retry,
                "temporary delivery failure, scheduled for retry: {reason}"
            );
        }
        Err(SendError::NoMoreHosts) => {
            warn!(
                message_id = %entry.id,
                recipient = %entry.recipient,
                "host list exhausted, dropping"
            );
            if let Some(removed) = store.take(&entry.id).await? {
                hook::emit(EventType::EmailFailed, &removed);
            }
        }
        Err(SendError::Permanent(reason)) => {
            error!(
                message_id = %entry.id,
                recipient = %entry.recipient,
                "permanent delivery failure: {reason}"
            );
            if let Some(removed) = store.take(&entry.id).await? {
                hook::emit(EventType::EmailFailed, &removed);
            }
        }
    }
    Ok(())
}

struct Delivered {
    bytes: Vec<u8>,
    route: SmtpRoute,
}

async fn send_entry(
    entry: &QueueEntry,
    request: &EmailRequest,
    verp: &str,
    cfg: &DispatchConfig,
) -> Result<Delivered, SendError> {
    let from_header = resolve_from(request.from.as_deref(), verp, cfg);
    let (recipient_display, recipient_email) = resolve_recipient(&entry.recipient, cfg)?;
    let (_, recipient_domain) = split_address(&recipient_email).ok_or_else(|| {
        SendError::Permanent(format!("recipient has no domain: {recipient_email:?}"))
    })?;

    let route = resolve_route(cfg, &recipient_domain).await?;

    let bytes = encode_message(
        &entry.id,
        request,
        &from_header,
        &recipient_display,
        cfg,
        &PassthroughEmbedder,
    )
    .map_err(|err| SendError::Permanent(format!("message encoding failed: {err}")))?;

    submit(&route, verp, &recipient_email, &bytes).await?;
    Ok(Delivered { bytes, route })
}

/// The header From for this dispatch. An absent sender defaults to the
/// site's address; with `smtp_verp_as_from` the address part is replaced by
/// the VERP envelope while the display name survives.
fn resolve_from(raw_from: Option<&str>, verp: &str, cfg: &DispatchConfig) -> String {
    let raw = raw_from.unwrap_or("").trim();
    let base = if raw.is_empty() {
        cfg.default_from()
    } else {
        raw.to_string()
    };
    let (name, email) = parse_address(&base);
    if cfg.relay.smtp_verp_as_from {
        match name {
            Some(name) => format!("{name} <{verp}>"),
            None => format!("<{verp}>"),
        }
    } else if email.is_none() {
        match name {
            Some(name) => format!("{name} <{}>", cfg.default_from()),
            None => cfg.default_from(),
        }
    } else {
        base
    }
}

/// The To display string and the bare RCPT address. With an override every
/// recipient is rewritten to the operator address, keeping the intended
/// recipient visible in the display name.
fn resolve_recipient(recipient: &str, cfg: &DispatchConfig) -> Result<(String, String), SendError> {
    let normalized = single_line(recipient);
    if let Some(override_address) = cfg.email_override() {
        let display = format!(
            "{} (override) <{}>",
            escape_email(&normalized),
            override_address
        );
        let email =
            extract_email(override_address).unwrap_or_else(|| override_address.to_string());
        return Ok((display, email));
    }
    let email = extract_email(&normalized).ok_or_else(|| {
        SendError::Permanent(format!("recipient carries no address: {normalized:?}"))
    })?;
    Ok((normalized, email))
}

fn spawn_bcc_copy(bcc: &str, verp: &str, delivered: &Delivered) {
    let Some(bcc_email) = extract_email(bcc) else {
        warn!(%bcc, "smtp_bcc carries no address, skipping copy");
        return;
    };
    let route = delivered.route.clone();
    let bytes = delivered.bytes.clone();
    let verp = verp.to_string();
    tokio::spawn(async move {
        if let Err(err) = submit(&route, &verp, &bcc_email, &bytes).await {
            warn!(%bcc_email, "bcc copy delivery failed: {err}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_defaults_when_the_request_has_none() {
        let cfg = DispatchConfig::for_test();
        let verp = "noreply+abc@example.com";
        assert_eq!(resolve_from(None, verp, &cfg), "noreply@example.com");
        assert_eq!(resolve_from(Some(""), verp, &cfg), "noreply@example.com");
        assert_eq!(
            resolve_from(Some("sender@other.org"), verp, &cfg),
            "sender@other.org"
        );
    }

    #[test]
    fn verp_as_from_keeps_the_display_name() {
        let mut cfg = DispatchConfig::for_test();
        cfg.relay.smtp_verp_as_from = true;
        let verp = "noreply+abc@example.com";
        assert_eq!(
            resolve_from(Some("Jane <jane@example.com>"), verp, &cfg),
            "Jane <noreply+abc@example.com>"
        );
        assert_eq!(
            resolve_from(Some("jane@example.com"), verp, &cfg),
            "<noreply+abc@example.com>"
        );
    }

    #[test]
    fn bare_display_names_get_the_default_address() {
        let cfg = DispatchConfig::for_test();
        let verp = "noreply+abc@example.com";
        assert_eq!(
            resolve_from(Some("Notifications"), verp, &cfg),
            "Notifications <noreply@example.com>"
        );
    }

    #[test]
    fn override_rewrites_the_recipient_but_keeps_it_visible() {
        let mut cfg = DispatchConfig::for_test();
        cfg.relay.email_override = Some("ops@z.example".to_string());
        let (display, email) = resolve_recipient("user@customer.com", &cfg).unwrap();
        assert_eq!(display, "user-at-customer.com (override) <ops@z.example>");
        assert_eq!(email, "ops@z.example");
    }

    #[test]
    fn without_override_the_recipient_passes_through() {
        let cfg = DispatchConfig::for_test();
        let (display, email) = resolve_recipient("Jane\n <jane@customer.com>", &cfg).unwrap();
        assert_eq!(display, "Jane <jane@customer.com>");
        assert_eq!(email, "jane@customer.com");

        assert!(matches!(
            resolve_recipient("nothing here", &cfg),
            Err(SendError::Permanent(_))
        ));
    }
}
