// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use crate::modules::settings::relay::DispatchConfig;
use rand::Rng;

pub const MESSAGE_ID_LEN: usize = 20;
const MESSAGE_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const BOUNCE_PREFIX: &str = "noreply+";

/// Random lowercase-alphanumeric token used as the queue id and the VERP
/// local-part payload. Uniqueness is probabilistic; callers may supply their
/// own id instead.
pub fn generate_message_id() -> String {
    let mut rng = rand::rng();
    (0..MESSAGE_ID_LEN)
        .map(|_| MESSAGE_ID_ALPHABET[rng.random_range(0..MESSAGE_ID_ALPHABET.len())] as char)
        .collect()
}

/// Envelope sender for outbound mail; bounces addressed to it carry the
/// message id back for correlation.
pub fn bounce_email(msg_id: &str, cfg: &DispatchConfig) -> String {
    format!("{}{}@{}", BOUNCE_PREFIX, msg_id, cfg.bounce_domain())
}

pub fn reply_email(msg_id: &str, cfg: &DispatchConfig) -> String {
    format!("reply+{}@{}", msg_id, cfg.email_domain)
}

/// Detection is prefix-only on the local-part.
pub fn is_bounce_email(address: &str) -> bool {
    local_part(address).starts_with(BOUNCE_PREFIX)
}

/// Message id carried in a VERP bounce address, if the address is one.
pub fn message_id_from_bounce(address: &str) -> Option<String> {
    let local = local_part(address);
    local
        .strip_prefix(BOUNCE_PREFIX)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

pub fn ensure_domain(address: &str, cfg: &DispatchConfig) -> String {
    if address.contains('@') {
        address.to_string()
    } else {
        format!("{}@{}", address, cfg.email_domain)
    }
}

/// Used only in override display strings.
pub fn escape_email(address: &str) -> String {
    address.replace('@', "-at-")
}

/// Split `"Display Name <user@host>"` forms into display and address parts.
/// A bare address yields no display part; a bare name yields no address.
pub fn parse_address(input: &str) -> (Option<String>, Option<String>) {
    let input = input.trim();
    if let (Some(start), Some(end)) = (input.rfind('<'), input.rfind('>')) {
        if start < end {
            let email = input[start + 1..end].trim();
            let name = input[..start].trim().trim_matches('"').trim();
            return (
                (!name.is_empty()).then(|| name.to_string()),
                (!email.is_empty()).then(|| email.to_string()),
            );
        }
    }
    if input.is_empty() {
        (None, None)
    } else if input.contains('@') {
        (None, Some(input.to_string()))
    } else {
        (Some(input.to_string()), None)
    }
}

pub fn extract_email(input: &str) -> Option<String> {
    parse_address(input).1
}

pub fn split_address(email: &str) -> Option<(String, String)> {
    let (local, domain) = email.rsplit_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some((local.to_string(), domain.to_string()))
}

/// Collapse a recipient field onto a single line.
pub fn single_line(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn local_part(address: &str) -> &str {
    let address = address.trim().trim_start_matches('<').trim_end_matches('>');
    address.split('@').next().unwrap_or(address)
}
