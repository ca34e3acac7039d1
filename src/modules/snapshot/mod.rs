// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

//! Opaque caller-context snapshots. The queue stores the bytes verbatim so
//! retries and bounce events run with the context the caller had at send
//! time, even after the caller mutated its own copy or the process restarted.

use crate::modules::error::{code::ErrorCode, MailSpoolResult};
use crate::raise_error;
use serde_json::Value;

pub fn pickle(context: &Value) -> MailSpoolResult<Vec<u8>> {
    serde_json::to_vec(context)
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
}

pub fn depickle(bytes: &[u8]) -> MailSpoolResult<Value> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes)
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
}
