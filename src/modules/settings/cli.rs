// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

use clap::Parser;
use std::sync::LazyLock;

#[cfg(not(test))]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::parse);

#[cfg(test)]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::new_for_test);

#[derive(Debug, Parser)]
#[clap(
    name = "mailspool",
    about = "A durable outbound email dispatcher: queued delivery, VERP bounce
    correlation and schedule-driven retries over a relay or direct recipient MX.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Settings {
    /// Log filter (default: "info"); accepts tracing directives such as
    /// "info,mailspool::modules::dispatch=debug"
    #[clap(
        long,
        default_value = "info",
        env,
        help = "Set the log filter for mailspool (level or tracing directives)"
    )]
    pub mailspool_log_level: String,

    /// Enable ANSI logs (default: false)
    #[clap(long, default_value = "true", env, help = "Enable ANSI formatted logs")]
    pub mailspool_ansi_logs: bool,

    #[clap(
        long,
        default_value = "false",
        env,
        help = "Enable log file output (otherwise logs go to stdout)"
    )]
    pub mailspool_log_to_file: bool,

    #[clap(
        long,
        default_value = "7",
        env,
        help = "Maximum number of rolling log files to keep"
    )]
    pub mailspool_max_log_files: usize,

    /// Root directory for the queue and settings databases
    #[clap(
        long,
        default_value = "./mailspool-data",
        env,
        help = "Set the root data directory for mailspool"
    )]
    pub mailspool_root_dir: String,

    /// Queue poll interval in seconds (default: 5)
    #[clap(
        long,
        default_value = "5",
        env,
        help = "Set the interval in seconds between queue polls"
    )]
    pub mailspool_poll_interval: u64,

    /// Mail domain used for VERP bounce and reply addresses
    #[clap(
        long,
        default_value = "example.com",
        env,
        help = "Set the mail domain used for VERP bounce and reply addresses"
    )]
    pub mailspool_email_domain: String,

    /// Default From address applied when a request does not carry one
    #[clap(
        long,
        env,
        help = "Set the default From address for requests without a sender"
    )]
    pub mailspool_email_from: Option<String>,

    /// Product URL advertised in the X-Mailer header
    #[clap(
        long,
        default_value = "https://mailspool.dev",
        env,
        help = "Set the product URL advertised in the X-Mailer header"
    )]
    pub mailspool_public_url: String,

    /// Queue database cache in bytes; the settings database keeps its own
    /// small fixed cache
    #[clap(
        long,
        env,
        help = "Set the cache size in bytes for the queue database"
    )]
    pub mailspool_db_cache_size: Option<usize>,
}

impl Settings {
    #[cfg(test)]
    fn new_for_test() -> Self {
        Self {
            mailspool_log_level: "info".to_string(),
            mailspool_ansi_logs: false,
            mailspool_log_to_file: false,
            mailspool_max_log_files: 7,
            mailspool_root_dir: std::env::temp_dir()
                .join("mailspool-test")
                .to_string_lossy()
                .into_owned(),
            mailspool_poll_interval: 5,
            mailspool_email_domain: "example.com".to_string(),
            mailspool_email_from: None,
            mailspool_public_url: "https://mailspool.dev".to_string(),
            mailspool_db_cache_size: None,
        }
    }
}
