// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use super::error::code::ErrorCode;
use crate::raise_error;

#[macro_export]
macro_rules! mailspool_version {
    () => {
        env!("CARGO_PKG_VERSION")
    };
}

#[macro_export]
macro_rules! utc_now {
    () => {{
        use chrono::Utc;
        Utc::now().timestamp_millis()
    }};
}

#[macro_export]
macro_rules! raise_error {
    ($msg:expr, $code:expr) => {
        $crate::modules::error::MailSpoolError::Generic {
            message: $msg,
            location: snafu::Location::default(),
            code: $code,
        }
    };
}

#[macro_export]
macro_rules! run_with_timeout {
    ($duration:expr, $task:expr, $err_msg:expr) => {{
        match tokio::time::timeout($duration, $task).await {
            Ok(result) => Ok(result),
            Err(_) => Err($err_msg),
        }
    }};
}

pub fn validate_email(email: &str) -> crate::modules::error::MailSpoolResult<()> {
    use std::str::FromStr;
    let email_address = email_address::EmailAddress::from_str(email).map_err(|_| {
        raise_error!(
            format!("Invalid email format : {}", email),
            ErrorCode::InvalidParameter
        )
    })?;
    if email != email_address.email() {
        return Err(raise_error!(
            format!("Invalid email format: {}", email),
            ErrorCode::InvalidParameter
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_email;

    #[test]
    fn accepts_plain_addresses() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("noreply+abc123@bounce.example.org").is_ok());
    }

    #[test]
    fn rejects_display_forms_and_garbage() {
        assert!(validate_email("User <user@example.com>").is_err());
        assert!(validate_email("not-an-address").is_err());
        assert!(validate_email("").is_err());
    }
}
