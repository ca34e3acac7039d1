// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use crate::modules::address::extract_email;
use crate::modules::error::{code::ErrorCode, MailSpoolResult};
use crate::modules::utils::validate_email;
use crate::raise_error;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An outbound send request. Most fields are optional; `body` selects the
/// encoding mode (raw bytes, a structured multipart, or rendered from
/// text/html/templates when absent).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailRequest {
    pub to: String,
    #[serde(default)]
    pub cc: Option<String>,
    #[serde(default)]
    pub bcc: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub text_template: Option<String>,
    #[serde(default)]
    pub html_template: Option<String>,
    #[serde(default)]
    pub vars: Option<Value>,
    #[serde(default)]
    pub reply_to: Option<ReplyTo>,
    #[serde(default)]
    pub body: Option<BodySource>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// true = wait for the next poll; false = dispatch immediately.
    #[serde(default)]
    pub queue: bool,
}

impl EmailRequest {
    /// Boundary validation: every recipient field must contain an address.
    pub fn validate(&self) -> MailSpoolResult<()> {
        Self::validate_recipient("to", &self.to)?;
        if let Some(cc) = self.cc.as_deref().filter(|v| !v.trim().is_empty()) {
            Self::validate_recipient("cc", cc)?;
        }
        if let Some(bcc) = self.bcc.as_deref().filter(|v| !v.trim().is_empty()) {
            Self::validate_recipient("bcc", bcc)?;
        }
        Ok(())
    }

    fn validate_recipient(field: &str, value: &str) -> MailSpoolResult<()> {
        if value.trim().is_empty() {
            return Err(raise_error!(
                format!("'{}' cannot be empty.", field),
                ErrorCode::InvalidParameter
            ));
        }
        let email = extract_email(value).ok_or_else(|| {
            raise_error!(
                format!("'{}' does not contain an email address: {:?}", field, value),
                ErrorCode::InvalidParameter
            )
        })?;
        validate_email(&email)
    }
}

/// The Reply-To field of a request. The wire forms are an empty string (null
/// return path `<>`), the sentinel `"message-id"` (reply+<id>@domain), or a
/// literal address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReplyTo {
    NullReturnPath,
    MessageId,
    Address(String),
}

impl From<String> for ReplyTo {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            ReplyTo::NullReturnPath
        } else if trimmed.eq_ignore_ascii_case("message-id") {
            ReplyTo::MessageId
        } else {
            ReplyTo::Address(trimmed.to_string())
        }
    }
}

impl From<ReplyTo> for String {
    fn from(value: ReplyTo) -> Self {
        match value {
            ReplyTo::NullReturnPath => String::new(),
            ReplyTo::MessageId => "message-id".to_string(),
            ReplyTo::Address(address) => address,
        }
    }
}

/// Pre-built message body carried by a request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodySource {
    /// Finished wire bytes; only the X-Mailer header is prepended.
    Raw(Vec<u8>),
    /// A multipart description the encoder assembles and serializes.
    Structured(MultipartBody),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultipartBody {
    pub content_type: String,
    pub subtype: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub params: Vec<(String, String)>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessagePart {
    pub content_type: String,
    #[serde(default)]
    pub params: Vec<(String, String)>,
    pub content: PartContent,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartContent {
    Text(String),
    Binary(Vec<u8>),
}
