/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Network layer: DoQ framing, backend transports and TLS setup

pub mod backend;
pub mod framing;
pub mod tls_config;

#[cfg(test)]
pub(crate) mod testing;
