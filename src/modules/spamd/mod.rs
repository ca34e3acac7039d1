// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

//! Post-acceptance SpamAssassin probe. The encoded message is submitted to a
//! `spamd` daemon over the SPAMC protocol for scoring only; the delivery
//! outcome never depends on the verdict.

use crate::modules::error::{code::ErrorCode, MailSpoolResult};
use crate::{raise_error, run_with_timeout};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const SPAMD_TIMEOUT: Duration = Duration::from_secs(10);

const SPAMD_BANNER: &str = "SPAMD/1.1 0 EX_OK\r\n";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpamVerdict {
    /// None when the daemon returned no recognizable X-Spam-Status verdict.
    pub is_spam: Option<bool>,
    /// Lowercased key=value tokens following the verdict, e.g. score, required.
    pub tags: HashMap<String, String>,
}

pub async fn check(host: &str, port: u16, message: &[u8]) -> MailSpoolResult<SpamVerdict> {
    let response = probe(host, port, message).await?;
    Ok(parse_response(&response))
}

async fn probe(host: &str, port: u16, message: &[u8]) -> MailSpoolResult<Vec<u8>> {
    let mut stream = run_with_timeout!(
        SPAMD_TIMEOUT,
        TcpStream::connect((host, port)),
        raise_error!(
            format!("spamd connection to {host}:{port} timed out"),
            ErrorCode::ConnectionTimeout
        )
    )?
    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SpamdProbeFailed))?;

    // Content-length covers the message plus its trailing CRLF.
    let mut request = Vec::with_capacity(message.len() + 96);
    request.extend_from_slice(b"HEADERS SPAMC/1.2\r\n");
    request.extend_from_slice(format!("Content-length: {}\r\n", message.len() + 2).as_bytes());
    request.extend_from_slice(b"User: spamd\r\n");
    request.extend_from_slice(b"\r\n");
    request.extend_from_slice(message);
    request.extend_from_slice(b"\r\n");
    stream
        .write_all(&request)
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::SpamdProbeFailed))?;

    // Read until the daemon closes; on timeout, whatever arrived is the answer.
    let mut response = Vec::new();
    let mut buffer = [0u8; 4096];
    let deadline = tokio::time::Instant::now() + SPAMD_TIMEOUT;
    loop {
        match tokio::time::timeout_at(deadline, stream.read(&mut buffer)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => response.extend_from_slice(&buffer[..n]),
            Ok(Err(e)) => {
                return Err(raise_error!(
                    format!("{:#?}", e),
                    ErrorCode::SpamdProbeFailed
                ))
            }
            Err(_) => break,
        }
    }
    Ok(response)
}

fn parse_response(raw: &[u8]) -> SpamVerdict {
    let text = String::from_utf8_lossy(raw);
    let body = text.strip_prefix(SPAMD_BANNER).unwrap_or(&text);
    for (name, value) in parse_headers(body) {
        if name.eq_ignore_ascii_case("X-Spam-Status") {
            return parse_status(&value);
        }
    }
    SpamVerdict::default()
}

/// RFC-822-style header fields with folded continuation lines. A line
/// starting with a tab or space continues the previous field; tabs are
/// dropped and CR-only line endings normalized.
fn parse_headers(text: &str) -> Vec<(String, String)> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in normalized.lines() {
        if line.starts_with('\t') || line.starts_with(' ') {
            if let Some((_, value)) = headers.last_mut() {
                let continuation = line.replace('\t', "");
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(continuation.trim_start());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    headers
}

/// The verdict value starts with `Yes, ` or `No, `; anything else yields an
/// unknown verdict instead of failing.
fn parse_status(value: &str) -> SpamVerdict {
    let (is_spam, rest) = if let Some(rest) = value.strip_prefix("Yes, ") {
        (Some(true), rest)
    } else if let Some(rest) = value.strip_prefix("No, ") {
        (Some(false), rest)
    } else {
        return SpamVerdict::default();
    };

    let mut tags = HashMap::new();
    for token in rest.split_whitespace() {
        if let Some((key, val)) = token.split_once('=') {
            tags.insert(key.to_ascii_lowercase(), val.to_string());
        }
    }
    SpamVerdict { is_spam, tags }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_spam_verdict_with_tags() {
        let response = b"SPAMD/1.1 0 EX_OK\r\n\
            X-Spam-Checker-Version: SpamAssassin 3.4.6\r\n\
            X-Spam-Status: Yes, score=7.2 required=5.0 tests=BAYES_99\r\n";
        let verdict = parse_response(response);
        assert_eq!(verdict.is_spam, Some(true));
        assert_eq!(verdict.tags.get("score").map(String::as_str), Some("7.2"));
        assert_eq!(
            verdict.tags.get("required").map(String::as_str),
            Some("5.0")
        );
        assert_eq!(
            verdict.tags.get("tests").map(String::as_str),
            Some("BAYES_99")
        );
    }

    #[test]
    fn parses_a_ham_verdict_without_the_banner() {
        let response = b"X-Spam-Status: No, score=-0.1 required=5.0\r\n";
        let verdict = parse_response(response);
        assert_eq!(verdict.is_spam, Some(false));
        assert_eq!(verdict.tags.get("score").map(String::as_str), Some("-0.1"));
    }

    #[test]
    fn folded_status_lines_are_unfolded() {
        let response = b"X-Spam-Status: Yes, score=9.9\r\n\
            \trequired=5.0 tests=BAYES_99,\r\n\
            \tHTML_MESSAGE\r\n";
        let verdict = parse_response(response);
        assert_eq!(verdict.is_spam, Some(true));
        assert_eq!(
            verdict.tags.get("required").map(String::as_str),
            Some("5.0")
        );
    }

    #[test]
    fn unknown_verdicts_are_not_an_error() {
        let response = b"X-Spam-Status: Perhaps, score=3.0\r\n";
        let verdict = parse_response(response);
        assert_eq!(verdict.is_spam, None);
        assert!(verdict.tags.is_empty());

        assert_eq!(parse_response(b""), SpamVerdict::default());
        assert_eq!(parse_response(b"garbage with no headers"), SpamVerdict::default());
    }

    #[test]
    fn cr_only_line_endings_are_normalized() {
        let response = b"X-Spam-Status: No, score=0.0\rX-Other: x\r";
        let verdict = parse_response(response);
        assert_eq!(verdict.is_spam, Some(false));
    }
}
