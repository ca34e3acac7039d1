// Copyright © 2025 Mailspool Project
// Licensed under the Apache License, Version 2.0

//! Tracing setup. One build path serves both sinks: the writer is boxed, so
//! stdout and the rolling file only differ in what goes into the box.

use crate::modules::settings::cli::SETTINGS;
use crate::modules::settings::dir::DATA_DIR_MANAGER;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `mailspool_log_level` takes anything an
/// `EnvFilter` accepts, from a bare level to per-module directives like
/// `info,mailspool::modules::dispatch=debug`; unparseable input degrades to
/// `info` rather than aborting startup. The returned guard flushes the file
/// writer and must live as long as the process.
pub fn init() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_new(&SETTINGS.mailspool_log_level).unwrap_or_else(|error| {
        eprintln!(
            "mailspool_log_level {:?} is not a valid filter ({error}), using \"info\"",
            SETTINGS.mailspool_log_level
        );
        EnvFilter::new("info")
    });

    let (writer, guard, ansi) = if SETTINGS.mailspool_log_to_file {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("mailspool")
            .filename_suffix("log")
            .max_log_files(SETTINGS.mailspool_max_log_files)
            .build(&DATA_DIR_MANAGER.log_dir)
            .expect("log directory is not writable");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        // ANSI escapes are for terminals, never for files
        (BoxMakeWriter::new(non_blocking), Some(guard), false)
    } else {
        (
            BoxMakeWriter::new(std::io::stdout),
            None,
            SETTINGS.mailspool_ansi_logs,
        )
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .init();

    guard
}
