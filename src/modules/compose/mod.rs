// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use crate::modules::address::{bounce_email, ensure_domain, parse_address, reply_email, single_line};
use crate::modules::compose::embed::ImageEmbedder;
use crate::modules::dispatch::request::{
    BodySource, EmailRequest, MessagePart, MultipartBody, PartContent, ReplyTo,
};
use crate::modules::error::{code::ErrorCode, MailSpoolResult};
use crate::modules::settings::relay::DispatchConfig;
use crate::modules::template;
use crate::{mailspool_version, raise_error};
use mail_send::mail_builder::headers::content_type::ContentType;
use mail_send::mail_builder::headers::raw::Raw;
use mail_send::mail_builder::headers::text::Text;
use mail_send::mail_builder::mime::MimePart;
use mail_send::mail_builder::MessageBuilder;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

pub mod embed;

/// Address-like and structural headers are emitted as printable ASCII and
/// never RFC-2047 encoded; everything else goes through the encoder.
const STRUCTURAL_HEADERS: [&str; 9] = [
    "to",
    "from",
    "reply-to",
    "cc",
    "bcc",
    "date",
    "content-type",
    "mime-version",
    "content-transfer-encoding",
];

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

/// Produce the final wire bytes for a queue entry. `from_header` and
/// `recipient` arrive already resolved by the dispatcher (VERP-as-from and
/// override rewrites applied).
pub fn encode_message(
    msg_id: &str,
    request: &EmailRequest,
    from_header: &str,
    recipient: &str,
    cfg: &DispatchConfig,
    embedder: &dyn ImageEmbedder,
) -> MailSpoolResult<Vec<u8>> {
    match &request.body {
        Some(BodySource::Raw(bytes)) => Ok(encode_raw(bytes, cfg)),
        Some(BodySource::Structured(multipart)) => {
            encode_structured(msg_id, request, multipart, from_header, recipient, cfg)
        }
        None => encode_rendered(msg_id, request, from_header, recipient, cfg, embedder),
    }
}

fn x_mailer(cfg: &DispatchConfig) -> String {
    format!("mailspool {} ({})", mailspool_version!(), cfg.public_url)
}

/// Pre-built wire bytes pass through untouched apart from the X-Mailer line.
fn encode_raw(bytes: &[u8], cfg: &DispatchConfig) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 80);
    out.extend_from_slice(format!("X-Mailer: {}\r\n", x_mailer(cfg)).as_bytes());
    out.extend_from_slice(bytes);
    out
}

fn encode_structured(
    msg_id: &str,
    request: &EmailRequest,
    multipart: &MultipartBody,
    from_header: &str,
    recipient: &str,
    cfg: &DispatchConfig,
) -> MailSpoolResult<Vec<u8>> {
    let mut builder = MessageBuilder::new();
    builder = apply_canonical_headers(builder, msg_id, from_header, recipient, cfg);

    let mut extra = request.headers.clone();
    extra.extend(multipart.headers.iter().cloned());
    builder = apply_extra_headers(builder, extra);

    let mut ctype = ContentType::new(format!("{}/{}", multipart.content_type, multipart.subtype));
    for (key, value) in &multipart.params {
        ctype = ctype.attribute(key.clone(), value.clone());
    }
    let children: Vec<MimePart<'static>> = multipart.parts.iter().map(part_to_mime).collect();
    builder = builder.body(MimePart::new(ctype, children));
    write_message(builder)
}

fn part_to_mime(part: &MessagePart) -> MimePart<'static> {
    let mut ctype = ContentType::new(part.content_type.clone());
    for (key, value) in &part.params {
        ctype = ctype.attribute(key.clone(), value.clone());
    }
    match &part.content {
        PartContent::Text(text) => MimePart::new(ctype, expand_cr(text)),
        PartContent::Binary(bytes) => MimePart::new(ctype, bytes.clone()),
    }
}

fn encode_rendered(
    msg_id: &str,
    request: &EmailRequest,
    from_header: &str,
    recipient: &str,
    cfg: &DispatchConfig,
    embedder: &dyn ImageEmbedder,
) -> MailSpoolResult<Vec<u8>> {
    let text = resolve_body(
        request.text.as_deref(),
        request.text_template.as_deref(),
        &request.vars,
    )?
    .map(|body| expand_cr(&body));
    let html = resolve_body(
        request.html.as_deref(),
        request.html_template.as_deref(),
        &request.vars,
    )?
    .map(|body| expand_cr(&body));

    let subject = match &request.subject {
        Some(subject) => subject.clone(),
        None => html
            .as_deref()
            .and_then(subject_from_title)
            .unwrap_or_default(),
    };

    let has_text = text.as_deref().is_some_and(|t| !t.is_empty());
    let has_html = html.as_deref().is_some_and(|h| !h.is_empty());

    let mut parts: Vec<MimePart<'static>> = Vec::new();
    if !has_text && has_html {
        // synthesize the plain alternative from the HTML
        parts.push(MimePart::new(
            "text/plain",
            template::to_markdown(html.as_deref().unwrap_or_default()),
        ));
    } else if has_text {
        parts.push(MimePart::new("text/plain", text.clone().unwrap_or_default()));
    }
    if has_html {
        parts.push(MimePart::new("text/html", html.clone().unwrap_or_default()));
        parts = embedder.embed_images(parts)?;
    }

    let mut builder = MessageBuilder::new();
    builder = apply_canonical_headers(builder, msg_id, from_header, recipient, cfg);
    builder = builder.subject(subject);
    builder = apply_reply_to(builder, msg_id, request.reply_to.as_ref(), cfg);
    if let Some(cc) = request.cc.as_deref().filter(|v| !v.trim().is_empty()) {
        builder = builder.header("Cc", Raw::new(sanitize_structural(cc)));
    }
    builder = apply_extra_headers(builder, request.headers.clone());
    builder = builder.body(MimePart::new("multipart/alternative", parts));
    write_message(builder)
}

fn resolve_body(
    pre_rendered: Option<&str>,
    template_source: Option<&str>,
    vars: &Option<Value>,
) -> MailSpoolResult<Option<String>> {
    if let Some(body) = pre_rendered {
        if !body.is_empty() {
            return Ok(Some(body.to_string()));
        }
    }
    if let Some(source) = template_source {
        return Ok(Some(template::render(source, vars)?));
    }
    Ok(None)
}

fn apply_canonical_headers(
    builder: MessageBuilder<'static>,
    msg_id: &str,
    from_header: &str,
    recipient: &str,
    cfg: &DispatchConfig,
) -> MessageBuilder<'static> {
    builder
        .header("From", Raw::new(sanitize_structural(from_header)))
        .header("To", Raw::new(sanitize_structural(recipient)))
        .header(
            "Message-ID",
            Raw::new(format!("<{}>", bounce_email(msg_id, cfg))),
        )
        .header("X-Mailer", Raw::new(x_mailer(cfg)))
}

fn apply_reply_to(
    builder: MessageBuilder<'static>,
    msg_id: &str,
    reply_to: Option<&ReplyTo>,
    cfg: &DispatchConfig,
) -> MessageBuilder<'static> {
    match reply_to {
        None => builder,
        Some(ReplyTo::NullReturnPath) => builder.header("Reply-To", Raw::new("<>")),
        Some(ReplyTo::MessageId) => {
            builder.header("Reply-To", Raw::new(reply_email(msg_id, cfg)))
        }
        Some(ReplyTo::Address(literal)) => {
            let (name, email) = parse_address(literal);
            let address = ensure_domain(email.as_deref().unwrap_or(literal.as_str()), cfg);
            let value = match name {
                Some(name) => format!("{name} <{address}>"),
                None => format!("<{address}>"),
            };
            builder.header("Reply-To", Raw::new(sanitize_structural(&value)))
        }
    }
}

/// Structural headers are emitted raw; repeated occurrences of one fold into
/// a single list value. Everything else is RFC-2047 encoded by the backend.
fn apply_extra_headers(
    mut builder: MessageBuilder<'static>,
    headers: Vec<(String, String)>,
) -> MessageBuilder<'static> {
    let mut structural: Vec<(String, Vec<String>)> = Vec::new();
    for (name, value) in headers {
        if is_structural_header(&name) {
            match structural
                .iter_mut()
                .find(|(seen, _)| seen.eq_ignore_ascii_case(&name))
            {
                Some((_, values)) => values.push(value),
                None => structural.push((name, vec![value])),
            }
        } else {
            builder = builder.header(name, Text::new(value));
        }
    }
    for (name, values) in structural {
        builder = builder.header(name, Raw::new(sanitize_structural(&fold_header_list(&values))));
    }
    builder
}

pub fn is_structural_header(name: &str) -> bool {
    STRUCTURAL_HEADERS
        .iter()
        .any(|known| name.eq_ignore_ascii_case(known))
}

/// Multi-valued list headers join with semicolon + CRLF + two-space indent.
pub fn fold_header_list(values: &[String]) -> String {
    values.join(";\r\n  ")
}

/// Strip everything outside printable ASCII from a structural header value.
/// The fold sequence inserted by [`fold_header_list`] is preserved.
pub fn sanitize_structural(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                out.push_str("\r\n");
            }
            ' '..='~' => out.push(c),
            _ => {}
        }
    }
    out
}

/// Normalize bare CR and bare LF to CRLF; existing CRLF pairs are preserved.
/// Idempotent.
pub fn expand_cr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\r\n");
            }
            '\n' => out.push_str("\r\n"),
            other => out.push(other),
        }
    }
    out
}

/// Subject derived from the HTML `<title>`, collapsed onto one line. Absent
/// or empty titles yield nothing rather than failing.
fn subject_from_title(html: &str) -> Option<String> {
    let captures = TITLE_RE.captures(html)?;
    let title = single_line(captures.get(1)?.as_str());
    (!title.is_empty()).then_some(title)
}

fn write_message(builder: MessageBuilder<'static>) -> MailSpoolResult<Vec<u8>> {
    let mut out = Vec::new();
    builder
        .write_to(&mut out)
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::MessageEncodeFailed))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::embed::PassthroughEmbedder;
    use super::*;

    fn encode(request: &EmailRequest) -> String {
        let cfg = DispatchConfig::for_test();
        let bytes = encode_message(
            "abcdefghij0123456789",
            request,
            "noreply@example.com",
            "a@x.example",
            &cfg,
            &PassthroughEmbedder,
        )
        .unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[test]
    fn raw_mode_prepends_only_the_mailer_line() {
        let request = EmailRequest {
            to: "a@x.example".to_string(),
            body: Some(BodySource::Raw(b"Subject: prebuilt\r\n\r\nhello".to_vec())),
            ..Default::default()
        };
        let out = encode(&request);
        assert!(out.starts_with(&format!(
            "X-Mailer: mailspool {} (https://mailspool.dev)\r\n",
            mailspool_version!()
        )));
        assert!(out.ends_with("Subject: prebuilt\r\n\r\nhello"));
    }

    #[test]
    fn rendered_mode_builds_the_alternative_pair() {
        let request = EmailRequest {
            to: "a@x.example".to_string(),
            text: Some("plain body".to_string()),
            html: Some("<html><title>Hi</title><body>Body</body></html>".to_string()),
            ..Default::default()
        };
        let out = encode(&request);
        assert!(out.contains("multipart/alternative"));
        assert!(out.contains("text/plain"));
        assert!(out.contains("text/html"));
        assert!(out.contains("Subject: Hi\r\n"));
        assert!(out.contains("Message-ID: <noreply+abcdefghij0123456789@example.com>"));
        assert!(out.contains("From: noreply@example.com\r\n"));
        assert!(out.contains("To: a@x.example\r\n"));
        assert!(out.contains("MIME-Version: 1.0"));
    }

    #[test]
    fn explicit_subject_wins_over_the_title() {
        let request = EmailRequest {
            to: "a@x.example".to_string(),
            subject: Some("Explicit".to_string()),
            html: Some("<html><title>Ignored</title></html>".to_string()),
            ..Default::default()
        };
        let out = encode(&request);
        assert!(out.contains("Subject: Explicit\r\n"));
        assert!(!out.contains("Subject: Ignored"));
    }

    #[test]
    fn missing_title_leaves_the_subject_empty() {
        let request = EmailRequest {
            to: "a@x.example".to_string(),
            html: Some("<html><body>no title here</body></html>".to_string()),
            ..Default::default()
        };
        let out = encode(&request);
        assert!(out.contains("Subject:"));
    }

    #[test]
    fn title_is_collapsed_to_a_single_line() {
        let request = EmailRequest {
            to: "a@x.example".to_string(),
            html: Some("<html><TITLE>\n  Weekly\n  Report </TITLE></html>".to_string()),
            ..Default::default()
        };
        let out = encode(&request);
        assert!(out.contains("Subject: Weekly Report\r\n"));
    }

    #[test]
    fn html_only_requests_get_a_projected_text_part() {
        let request = EmailRequest {
            to: "a@x.example".to_string(),
            html: Some("<html><title>T</title><body><p>Projected text</p></body></html>".to_string()),
            ..Default::default()
        };
        let out = encode(&request);
        assert!(out.contains("text/plain"));
        assert!(out.contains("Projected text"));
        assert!(out.contains("text/html"));
    }

    #[test]
    fn reply_to_policy_is_exhaustive() {
        let base = EmailRequest {
            to: "a@x.example".to_string(),
            text: Some("body".to_string()),
            ..Default::default()
        };

        let absent = encode(&base);
        assert!(!absent.contains("Reply-To:"));

        let mut request = base.clone();
        request.reply_to = Some(ReplyTo::NullReturnPath);
        assert!(encode(&request).contains("Reply-To: <>\r\n"));

        request.reply_to = Some(ReplyTo::MessageId);
        assert!(encode(&request)
            .contains("Reply-To: reply+abcdefghij0123456789@example.com\r\n"));

        request.reply_to = Some(ReplyTo::Address("Support <support>".to_string()));
        assert!(encode(&request).contains("Reply-To: Support <support@example.com>\r\n"));

        request.reply_to = Some(ReplyTo::Address("ops@other.org".to_string()));
        assert!(encode(&request).contains("Reply-To: <ops@other.org>\r\n"));
    }

    #[test]
    fn cc_header_carries_the_literal_value() {
        let request = EmailRequest {
            to: "a@x.example".to_string(),
            cc: Some("c@x.example".to_string()),
            text: Some("body".to_string()),
            ..Default::default()
        };
        assert!(encode(&request).contains("Cc: c@x.example\r\n"));
    }

    #[test]
    fn structured_mode_assembles_the_described_parts() {
        let request = EmailRequest {
            to: "a@x.example".to_string(),
            body: Some(BodySource::Structured(MultipartBody {
                content_type: "multipart".to_string(),
                subtype: "mixed".to_string(),
                headers: vec![("X-Campaign".to_string(), "spring".to_string())],
                params: Vec::new(),
                parts: vec![MessagePart {
                    content_type: "text/plain".to_string(),
                    params: Vec::new(),
                    content: PartContent::Text("attached note".to_string()),
                }],
            })),
            ..Default::default()
        };
        let out = encode(&request);
        assert!(out.contains("multipart/mixed"));
        assert!(out.contains("attached note"));
        assert!(out.contains("X-Campaign: spring"));
        assert!(out.contains("Message-ID: <noreply+abcdefghij0123456789@example.com>"));
    }

    #[test]
    fn expand_cr_leaves_no_bare_line_breaks() {
        let cases = [
            "a\nb",
            "a\rb",
            "a\r\nb",
            "\r\r\n\n",
            "mixed\rline\nendings\r\nhere",
            "",
        ];
        for case in cases {
            let once = expand_cr(case);
            let stripped = once.replace("\r\n", "");
            assert!(!stripped.contains('\r'), "bare CR left in {case:?}");
            assert!(!stripped.contains('\n'), "bare LF left in {case:?}");
            assert_eq!(expand_cr(&once), once, "not idempotent on {case:?}");
        }
        assert_eq!(expand_cr("a\nb\rc\r\nd"), "a\r\nb\r\nc\r\nd");
    }

    #[test]
    fn structural_sanitation_strips_non_ascii() {
        assert_eq!(sanitize_structural("Jänë <j@x.example>"), "Jn <j@x.example>");
        assert_eq!(sanitize_structural("plain"), "plain");
        // the fold sequence survives
        assert_eq!(sanitize_structural("a;\r\n  b"), "a;\r\n  b");
    }

    #[test]
    fn list_headers_fold_with_the_continuation_indent() {
        let folded = fold_header_list(&[
            "text/plain".to_string(),
            "charset=utf-8".to_string(),
            "format=flowed".to_string(),
        ]);
        assert_eq!(folded, "text/plain;\r\n  charset=utf-8;\r\n  format=flowed");
    }

    #[test]
    fn structural_extras_fold_and_others_encode() {
        let request = EmailRequest {
            to: "a@x.example".to_string(),
            text: Some("body".to_string()),
            headers: vec![
                ("X-Tag".to_string(), "alpha".to_string()),
                ("Bcc".to_string(), "one@x.example".to_string()),
                ("Bcc".to_string(), "two@x.example".to_string()),
            ],
            ..Default::default()
        };
        let out = encode(&request);
        assert!(out.contains("X-Tag: alpha\r\n"));
        assert!(out.contains("Bcc: one@x.example;\r\n  two@x.example\r\n"));
    }
}
