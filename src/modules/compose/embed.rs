// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use crate::modules::error::MailSpoolResult;
use mail_send::mail_builder::mime::MimePart;

/// Seam for inline-image embedding. Implementations may rewrite the HTML
/// part's `<img>` references and append related parts; the encoder routes
/// every html-bearing part list through here.
pub trait ImageEmbedder: Send + Sync {
    fn embed_images(&self, parts: Vec<MimePart<'static>>)
        -> MailSpoolResult<Vec<MimePart<'static>>>;
}

/// Default embedder: leaves the parts untouched.
pub struct PassthroughEmbedder;

impl ImageEmbedder for PassthroughEmbedder {
    fn embed_images(
        &self,
        parts: Vec<MimePart<'static>>,
    ) -> MailSpoolResult<Vec<MimePart<'static>>> {
        Ok(parts)
    }
}
