/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! doq-gateway - DNS-over-QUIC edge gateway
//!
//! Serves the handler named by `handler.type` in the configuration file
//! (`proxy` by default). Ctrl-C or SIGTERM stops accepting connections and
//! waits for live sessions before exiting.

use doq_gateway::core::error::Result;
use doq_gateway::server::harness;

/// Application entry point
fn main() -> Result<()> {
    harness::launch(None)
}
