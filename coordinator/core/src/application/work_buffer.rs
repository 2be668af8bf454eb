// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::work::Work;

/// Relay-side buffer of Work awaiting rollup, in arrival order.
#[derive(Debug, Default)]
pub struct WorkBuffer {
    entries: Vec<Work>,
}

impl WorkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, work: Work) {
        self.entries.push(work);
    }

    /// Remove and return every entry for `purpose`; other purposes stay.
    pub fn drain_purpose(&mut self, purpose: &str) -> Vec<Work> {
        let (drained, kept): (Vec<Work>, Vec<Work>) =
            std::mem::take(&mut self.entries).into_iter().partition(|w| w.purpose == purpose);
        self.entries = kept;
        drained
    }

    /// Drop every entry for `purpose`, returning how many were dropped.
    pub fn discard_purpose(&mut self, purpose: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|w| w.purpose != purpose);
        before - self.entries.len()
    }

    pub fn snapshot(&self) -> Vec<Work> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
