// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side errors (10000–10999)
    InvalidParameter = 10000,
    MissingConfiguration = 10020,

    // Resource errors (30000–30999)
    ResourceNotFound = 30000,

    // Network connection errors (40000–40999)
    NetworkError = 40000,
    ConnectionTimeout = 40010,

    // Mail service errors (50000–50999)
    SmtpCommandFailed = 50030,
    SmtpConnectionFailed = 50040,
    MxResolutionFailed = 50050,
    TemplateRenderFailed = 50060,
    MessageEncodeFailed = 50070,
    SpamdProbeFailed = 50080,

    // Internal system errors (70000–70999)
    InternalError = 70000,
}
