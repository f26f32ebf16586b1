/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! doq-echo - DoQ echo server for exercising clients
//!
//! Takes the same configuration file as the gateway; `handler` is ignored and
//! every stream is echoed back unchanged.

use doq_gateway::core::error::Result;
use doq_gateway::server::harness;

fn main() -> Result<()> {
    harness::launch(Some("echo"))
}
