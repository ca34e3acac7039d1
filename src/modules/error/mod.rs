// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use code::ErrorCode;
use snafu::{Location, Snafu};

pub mod code;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MailSpoolError {
    #[snafu(display("{message}"))]
    Generic {
        message: String,
        #[snafu(implicit)]
        location: Location,
        code: ErrorCode,
    },
}

impl MailSpoolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            MailSpoolError::Generic { code, .. } => *code,
        }
    }
}

pub type MailSpoolResult<T, E = MailSpoolError> = std::result::Result<T, E>;
