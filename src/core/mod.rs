/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Core services: error type, command-line runtime and logging setup

use crate::config::types::LogConfig;
use crate::core::log::GatewayLogFormatter;
use crate::core::runtime::{Options, Runtime};
use clap::Parser;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

pub mod dns_utils;
pub mod error;
mod log;
pub mod runtime;

/// Parse command-line options into a fresh runtime container
pub fn init() -> Runtime {
    let options = Options::parse();

    Runtime {
        options,
        log_guard: None,
    }
}

/// Install the global tracing subscriber
///
/// Console output always goes to stdout; when `log.file` is set the same lines
/// are also appended to that file through a non-blocking writer. The returned
/// guard must be held until shutdown so buffered lines are flushed.
pub fn init_log(log: LogConfig) -> WorkerGuard {
    let file_appender = log.file.as_deref().and_then(|file_path| {
        let path = Path::new(file_path);
        let file_name = path.file_name()?;
        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Some(tracing_appender::rolling::never(directory, file_name))
    });

    let (file_writer, guard) = match file_appender {
        Some(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (Some(non_blocking), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = fmt::layer()
        .event_format(GatewayLogFormatter)
        .with_writer(std::io::stdout);

    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .event_format(GatewayLogFormatter)
            .with_writer(writer)
            .with_ansi(false)
    });

    let mut filter = EnvFilter::try_new(&log.level).unwrap_or_else(|_| EnvFilter::new("info"));

    // quinn's per-packet tracing is far too chatty at debug level
    if let Ok(directive) = "quinn_proto=warn".parse() {
        filter = filter.add_directive(directive);
    }

    let _ = Registry::default()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    guard.unwrap_or_else(|| tracing_appender::non_blocking(std::io::sink()).1)
}
