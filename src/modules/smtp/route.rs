// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use crate::modules::settings::relay::DispatchConfig;
use crate::modules::smtp::client::MailSpoolSmtpClient;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use mail_send::smtp::message::Message;
use mail_send::{Credentials, SmtpClientBuilder};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivery outcome classification the dispatcher translates into queue
/// state transitions.
#[derive(Debug)]
pub enum SendError {
    /// Retriable; the entry is left untouched for the next poll.
    Temporary(String),
    /// The host list was exhausted without any server accepting a session.
    NoMoreHosts,
    /// Rejected outright; the entry is dropped and a failure event emitted.
    Permanent(String),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Temporary(reason) => write!(f, "temporary failure: {reason}"),
            SendError::NoMoreHosts => write!(f, "no more hosts"),
            SendError::Permanent(reason) => write!(f, "permanent failure: {reason}"),
        }
    }
}

/// Where and how to hand the message off.
#[derive(Clone, Debug)]
pub struct SmtpRoute {
    pub hosts: Vec<(String, u16)>,
    pub implicit_tls: bool,
    pub credentials: Option<(String, String)>,
}

/// Relay mode uses the configured next-hop for every recipient. Direct mode
/// resolves the recipient domain's MX records in priority order, unless MX
/// lookups are disabled, in which case the bare domain is the host.
pub async fn resolve_route(
    cfg: &DispatchConfig,
    recipient_domain: &str,
) -> Result<SmtpRoute, SendError> {
    if cfg.relay.smtp_relay {
        let host = cfg.relay.smtp_host.trim();
        if host.is_empty() {
            return Err(SendError::Permanent(
                "smtp_relay is enabled but smtp_host is not configured".to_string(),
            ));
        }
        let port = match cfg.relay.smtp_port {
            0 if cfg.relay.smtp_ssl => 465,
            0 => 25,
            port => port,
        };
        return Ok(SmtpRoute {
            hosts: vec![(host.to_string(), port)],
            implicit_tls: cfg.relay.smtp_ssl,
            credentials: cfg.credentials(),
        });
    }

    let hosts = if cfg.relay.smtp_no_mx_lookups {
        vec![(recipient_domain.to_string(), 25)]
    } else {
        resolve_mx(recipient_domain).await?
    };
    Ok(SmtpRoute {
        hosts,
        implicit_tls: false,
        credentials: None,
    })
}

async fn resolve_mx(domain: &str) -> Result<Vec<(String, u16)>, SendError> {
    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
    match resolver.mx_lookup(domain).await {
        Ok(lookup) => {
            let mut records: Vec<(u16, String)> = lookup
                .iter()
                .map(|mx| (mx.preference(), mx.exchange().to_utf8()))
                .collect();
            records.sort_by_key(|(preference, _)| *preference);
            let hosts: Vec<(String, u16)> = records
                .into_iter()
                .map(|(_, exchange)| (exchange.trim_end_matches('.').to_string(), 25))
                .collect();
            if hosts.is_empty() {
                Ok(vec![(domain.to_string(), 25)])
            } else {
                Ok(hosts)
            }
        }
        Err(err) => match err.kind() {
            // no MX published: fall back to the domain's address records
            ResolveErrorKind::NoRecordsFound { .. } => Ok(vec![(domain.to_string(), 25)]),
            _ => Err(SendError::Temporary(format!(
                "MX resolution failed for {domain}: {err}"
            ))),
        },
    }
}

/// Hand the encoded bytes to the first host that accepts a session. Hosts
/// that refuse the connection are skipped; once a session is up, the
/// server's verdict on this message is final for this attempt.
pub async fn submit(
    route: &SmtpRoute,
    envelope_from: &str,
    recipient: &str,
    bytes: &[u8],
) -> Result<(), SendError> {
    for (host, port) in &route.hosts {
        let mut client = match connect(route, host, *port).await {
            Ok(client) => client,
            Err(err) if is_transport_error(&err) => {
                debug!(%host, port, "smtp connection failed, trying next host: {err}");
                continue;
            }
            Err(err) => return Err(classify(err)),
        };
        let message = Message::empty()
            .from(envelope_from.to_string())
            .to(recipient.to_string())
            .body(bytes.to_vec());
        return client.send_message(message).await.map_err(classify);
    }
    warn!(
        hosts = route.hosts.len(),
        "every delivery host refused the connection"
    );
    Err(SendError::NoMoreHosts)
}

async fn connect(
    route: &SmtpRoute,
    host: &str,
    port: u16,
) -> Result<MailSpoolSmtpClient, mail_send::Error> {
    let mut builder = SmtpClientBuilder::new(host.to_string(), port)
        .implicit_tls(route.implicit_tls)
        .timeout(CONNECT_TIMEOUT);
    if let Some((username, password)) = &route.credentials {
        builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
    }
    if route.implicit_tls {
        builder.connect().await.map(MailSpoolSmtpClient::Tls)
    } else {
        builder
            .connect_plain()
            .await
            .map(MailSpoolSmtpClient::Plain)
    }
}

fn is_transport_error(err: &mail_send::Error) -> bool {
    matches!(err, mail_send::Error::Io(_) | mail_send::Error::Timeout)
}

/// 4xx replies are transient, 5xx and protocol-level failures permanent;
/// connection-level errors surface as transient so the schedule retries.
fn classify(err: mail_send::Error) -> SendError {
    match err {
        mail_send::Error::UnexpectedReply(reply) => {
            let reason = format!("unexpected reply: {} {}", reply.code, reply.message);
            if reply.code / 100 == 4 {
                SendError::Temporary(reason)
            } else {
                SendError::Permanent(reason)
            }
        }
        mail_send::Error::AuthenticationFailed(reply) => SendError::Permanent(format!(
            "authentication failed: {} {}",
            reply.code, reply.message
        )),
        mail_send::Error::Io(err) => SendError::Temporary(format!("io error: {err}")),
        mail_send::Error::Timeout => SendError::Temporary("smtp timeout".to_string()),
        other => SendError::Permanent(format!("{other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn relay_mode_uses_the_configured_next_hop() {
        let mut cfg = DispatchConfig::for_test();
        cfg.relay.smtp_relay = true;
        cfg.relay.smtp_host = "relay.example.net".to_string();
        cfg.relay.smtp_port = 587;
        cfg.relay.smtp_username = Some("mailer".to_string());
        cfg.relay.smtp_password = Some("hunter2".to_string());

        let route = resolve_route(&cfg, "customer.com").await.unwrap();
        assert_eq!(route.hosts, vec![("relay.example.net".to_string(), 587)]);
        assert!(!route.implicit_tls);
        assert_eq!(
            route.credentials,
            Some(("mailer".to_string(), "hunter2".to_string()))
        );
    }

    #[tokio::test]
    async fn relay_mode_without_a_host_is_a_permanent_failure() {
        let mut cfg = DispatchConfig::for_test();
        cfg.relay.smtp_relay = true;
        let err = resolve_route(&cfg, "customer.com").await.unwrap_err();
        assert!(matches!(err, SendError::Permanent(_)));
    }

    #[tokio::test]
    async fn direct_mode_without_mx_lookups_targets_the_domain() {
        let mut cfg = DispatchConfig::for_test();
        cfg.relay.smtp_no_mx_lookups = true;
        let route = resolve_route(&cfg, "customer.com").await.unwrap();
        assert_eq!(route.hosts, vec![("customer.com".to_string(), 25)]);
        assert!(route.credentials.is_none());
    }

    #[tokio::test]
    async fn ssl_relay_defaults_to_the_submission_port() {
        let mut cfg = DispatchConfig::for_test();
        cfg.relay.smtp_relay = true;
        cfg.relay.smtp_host = "relay.example.net".to_string();
        cfg.relay.smtp_port = 0;
        cfg.relay.smtp_ssl = true;
        let route = resolve_route(&cfg, "customer.com").await.unwrap();
        assert_eq!(route.hosts, vec![("relay.example.net".to_string(), 465)]);
        assert!(route.implicit_tls);
    }
}
