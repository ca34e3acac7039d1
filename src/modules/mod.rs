// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use crate::modules::error::MailSpoolResult;

pub mod address;
pub mod bounce;
pub mod compose;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod hook;
pub mod logger;
pub mod queue;
pub mod settings;
pub mod smtp;
pub mod snapshot;
pub mod spamd;
pub mod template;
pub mod utils;

pub trait Initialize {
    async fn initialize() -> MailSpoolResult<()>;
}
