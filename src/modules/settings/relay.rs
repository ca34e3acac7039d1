// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::{find_impl, upsert_impl};
use crate::modules::error::MailSpoolResult;
use crate::modules::settings::cli::SETTINGS;
use crate::utc_now;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

pub const RELAY_SETTING_KEY: &str = "relay";

/// Hot-reloadable delivery settings. One row under a fixed key; operators
/// update it and the next poll or immediate send picks the change up.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct RelaySetting {
    #[primary_key]
    pub key: String,
    pub smtp_relay: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_ssl: bool,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_no_mx_lookups: bool,
    pub smtp_verp_as_from: bool,
    pub smtp_bcc: Option<String>,
    pub email_override: Option<String>,
    pub smtp_spamd_ip: Option<String>,
    pub smtp_spamd_port: Option<u16>,
    pub smtp_bounce_domain: Option<String>,
    pub updated_at: i64,
}

impl RelaySetting {
    pub fn new() -> Self {
        Self {
            key: RELAY_SETTING_KEY.to_string(),
            smtp_port: 25,
            updated_at: utc_now!(),
            ..Default::default()
        }
    }

    //overwrite
    pub async fn save(&self) -> MailSpoolResult<()> {
        upsert_impl(DB_MANAGER.meta_db(), self.to_owned()).await
    }

    pub fn get() -> MailSpoolResult<Option<RelaySetting>> {
        find_impl(DB_MANAGER.meta_db(), RELAY_SETTING_KEY)
    }
}

/// Immutable per-cycle view of the delivery settings, merged with the static
/// site settings. Copied into every poll and every immediate send.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    pub relay: RelaySetting,
    pub email_domain: String,
    pub email_from: Option<String>,
    pub public_url: String,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl DispatchConfig {
    pub fn snapshot() -> MailSpoolResult<Self> {
        let relay = RelaySetting::get()?.unwrap_or_else(RelaySetting::new);
        Ok(Self {
            relay,
            email_domain: SETTINGS.mailspool_email_domain.clone(),
            email_from: SETTINGS.mailspool_email_from.clone(),
            public_url: SETTINGS.mailspool_public_url.clone(),
        })
    }

    /// Domain carried in VERP bounce addresses.
    pub fn bounce_domain(&self) -> &str {
        non_empty(self.relay.smtp_bounce_domain.as_deref()).unwrap_or(&self.email_domain)
    }

    /// Sender applied when a request carries no From address.
    pub fn default_from(&self) -> String {
        non_empty(self.email_from.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("noreply@{}", self.email_domain))
    }

    /// Relay credentials; auth is applied iff both username and password are set.
    pub fn credentials(&self) -> Option<(String, String)> {
        let username = non_empty(self.relay.smtp_username.as_deref())?;
        let password = non_empty(self.relay.smtp_password.as_deref())?;
        Some((username.to_string(), password.to_string()))
    }

    pub fn email_override(&self) -> Option<&str> {
        non_empty(self.relay.email_override.as_deref())
    }

    pub fn bcc(&self) -> Option<&str> {
        non_empty(self.relay.smtp_bcc.as_deref())
    }

    pub fn spamd(&self) -> Option<(String, u16)> {
        let ip = non_empty(self.relay.smtp_spamd_ip.as_deref())?;
        let port = self.relay.smtp_spamd_port?;
        Some((ip.to_string(), port))
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            relay: RelaySetting {
                key: RELAY_SETTING_KEY.to_string(),
                smtp_port: 25,
                ..Default::default()
            },
            email_domain: "example.com".to_string(),
            email_from: None,
            public_url: "https://mailspool.dev".to_string(),
        }
    }
}
