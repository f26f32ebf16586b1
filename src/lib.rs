/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! doq-gateway - DNS-over-QUIC edge gateway
//!
//! Terminates DoQ (RFC 9250) connections and serves every stream with a
//! pluggable handler:
//! - `proxy`: forwards each query to a plain DNS backend over UDP, or over
//!   TCP for zone transfers
//! - `echo`: returns the stream contents unchanged, for testing clients

pub mod config;
pub mod core;
pub mod network;
pub mod server;
pub mod service;
