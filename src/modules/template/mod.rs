// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use crate::modules::error::code::ErrorCode;
use crate::{modules::error::MailSpoolResult, raise_error};
use handlebars::Handlebars;
use serde_json::Value;

/// Render a body template with the request's variable map.
pub fn render(template: &str, vars: &Option<Value>) -> MailSpoolResult<String> {
    let mut handlebars = Handlebars::new();
    handlebars
        .register_template_string("body", template)
        .map_err(|e| {
            raise_error!(
                format!("Handlebars register error: {e}"),
                ErrorCode::TemplateRenderFailed
            )
        })?;
    let data = vars.clone().unwrap_or_else(|| Value::Object(Default::default()));
    handlebars.render("body", &data).map_err(|e| {
        raise_error!(
            format!("Handlebars render error: {e}"),
            ErrorCode::TemplateRenderFailed
        )
    })
}

/// Plain-text projection of an HTML body, used to synthesize the text/plain
/// alternative when a request carries HTML only.
pub fn to_markdown(html: &str) -> String {
    mail_parser::decoders::html::html_to_text(html)
}
