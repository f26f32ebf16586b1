/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Shared DNS-level helpers used by the bridge and the backend adapters.
//!
//! The gateway never re-encodes messages it forwards. Transaction IDs are
//! patched directly in the wire bytes so every other byte reaches the peer
//! exactly as it was produced.

use hickory_proto::op::Message;
use hickory_proto::rr::RecordType;

/// Read the transaction ID from DNS wire bytes.
#[inline]
pub fn wire_id(payload: &[u8]) -> Option<u16> {
    match payload {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// Overwrite the transaction ID in DNS wire bytes.
///
/// Payloads shorter than the ID field are left untouched.
#[inline]
pub fn set_wire_id(payload: &mut [u8], id: u16) {
    if let Some(field) = payload.get_mut(..2) {
        field.copy_from_slice(&id.to_be_bytes());
    }
}

/// Record type of the first question, if the message carries one.
#[inline]
pub fn first_query_type(message: &Message) -> Option<RecordType> {
    message.queries().first().map(|query| query.query_type())
}

/// Zone transfers are the only queries answered with a message sequence.
#[inline]
pub fn is_zone_transfer(query_type: RecordType) -> bool {
    matches!(query_type, RecordType::AXFR | RecordType::IXFR)
}
