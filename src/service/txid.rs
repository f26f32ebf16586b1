/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Backend transaction ID sources

use rand::Rng;
use rand::rngs::OsRng;
use std::fmt::Debug;

/// Supplies the transaction ID written into each backend query.
pub trait IdSource: Debug + Send + Sync {
    fn next_id(&self) -> u16;
}

/// Unpredictable IDs from the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandomIds;

impl IdSource for OsRandomIds {
    #[inline]
    fn next_id(&self) -> u16 {
        OsRng.r#gen()
    }
}

/// Counts up from a starting value; makes backend IDs predictable in tests.
#[cfg(test)]
#[derive(Debug)]
pub struct SequentialIds {
    next: std::sync::atomic::AtomicU16,
}

#[cfg(test)]
impl SequentialIds {
    pub fn new(start: u16) -> Self {
        Self {
            next: std::sync::atomic::AtomicU16::new(start),
        }
    }
}

#[cfg(test)]
impl IdSource for SequentialIds {
    fn next_id(&self) -> u16 {
        self.next
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}
