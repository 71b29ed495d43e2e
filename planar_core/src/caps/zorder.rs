// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Z-order lookup table.
//!
//! A plane order is written as a string with one letter per plane, back to
//! front: plane 0 is `'A'`, plane 1 is `'B'`, and so on. The table maps full
//! orders (every plane listed) to a driver-specific code. The allocator builds
//! the order of the planes it actually used and asks the table to
//! [`resolve`](ZOrderTable::resolve) it.

use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::HashMap;

use crate::MAX_PLANES;

/// Letter naming plane `index` in an order string.
///
/// # Panics
///
/// Panics if `index >= MAX_PLANES`.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "index is asserted below MAX_PLANES"
)]
pub fn plane_letter(index: usize) -> char {
    assert!(index < MAX_PLANES, "plane index {index} out of range");
    char::from(b'A' + index as u8)
}

/// Plane index named by `letter`, if it is a valid plane letter.
#[must_use]
pub fn plane_index(letter: char) -> Option<usize> {
    let idx = (letter as usize).checked_sub('A' as usize)?;
    (idx < MAX_PLANES).then_some(idx)
}

/// One entry of the z-order table.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ZOrderEntry {
    /// Back-to-front plane order.
    pub order: String,
    /// Driver code for this order.
    pub code: u32,
}

/// Table of permitted plane orders.
///
/// Keeps the entries in priority order plus a hash index for exact matches,
/// rebuilt on every change.
#[derive(Clone, Debug, Default)]
pub struct ZOrderTable {
    entries: Vec<ZOrderEntry>,
    exact: HashMap<String, u32>,
}

impl PartialEq for ZOrderTable {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl ZOrderTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with a single entry listing `plane_count` planes in index
    /// order, code 0.
    #[must_use]
    pub fn identity(plane_count: usize) -> Self {
        let order = (0..plane_count).map(plane_letter).collect();
        let mut table = Self::new();
        table.push(order, 0);
        table
    }

    /// Appends an entry. Later entries have lower priority.
    ///
    /// If `order` is already present the earlier entry is kept.
    pub fn push(&mut self, order: String, code: u32) {
        if self.exact.contains_key(order.as_str()) {
            return;
        }
        self.exact.insert(order.clone(), code);
        self.entries.push(ZOrderEntry { order, code });
    }

    /// Drops entries that name planes at or above `plane_count`, then falls
    /// back to the identity order if nothing is left.
    pub fn rebuild(&mut self, plane_count: usize) {
        let valid = |e: &ZOrderEntry| {
            e.order
                .chars()
                .all(|c| plane_index(c).is_some_and(|i| i < plane_count))
        };
        self.entries.retain(valid);
        if self.entries.is_empty() {
            *self = Self::identity(plane_count);
            return;
        }
        self.exact = self
            .entries
            .iter()
            .map(|e| (e.order.clone(), e.code))
            .collect();
    }

    /// Entries in priority order.
    #[must_use]
    pub fn entries(&self) -> &[ZOrderEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves the order of the planes in use to a driver code.
    ///
    /// An exact entry wins. Otherwise the first entry whose order, restricted
    /// to the planes in `order`, equals `order` is accepted, subject to:
    ///
    /// - if plane `'A'` (the primary) is unused, the entry must start with
    ///   `'A'`, since the driver keeps the primary backmost;
    /// - otherwise the entry must start with the first enabled plane, since
    ///   the driver takes the first listed plane to be the first enabled one.
    #[must_use]
    pub fn resolve(&self, order: &str) -> Option<u32> {
        if let Some(&code) = self.exact.get(order) {
            return Some(code);
        }
        let primary = plane_letter(0);
        let required_first = if order.contains(primary) {
            order.chars().next()?
        } else {
            primary
        };
        self.entries
            .iter()
            .find(|e| {
                e.order.starts_with(required_first)
                    && e.order.chars().filter(|c| order.contains(*c)).eq(order.chars())
            })
            .map(|e| e.code)
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    fn table() -> ZOrderTable {
        let mut t = ZOrderTable::new();
        t.push("ABC".to_string(), 10);
        t.push("ACB".to_string(), 11);
        t.push("BAC".to_string(), 12);
        t
    }

    #[test]
    fn letters_round_trip() {
        assert_eq!(plane_letter(0), 'A');
        assert_eq!(plane_letter(3), 'D');
        assert_eq!(plane_index('C'), Some(2));
        assert_eq!(plane_index('0'), None);
    }

    #[test]
    fn exact_match_preferred() {
        assert_eq!(table().resolve("ACB"), Some(11));
        assert_eq!(table().resolve("BAC"), Some(12));
    }

    #[test]
    fn subset_match_requires_first_enabled_first() {
        let t = table();
        assert_eq!(t.resolve("AC"), Some(10), "ABC restricted to A,C");
        assert_eq!(t.resolve("CB"), Some(11), "primary unused, ACB starts with A");
        // "BA" restricted from BAC matches and B is first enabled.
        assert_eq!(t.resolve("BA"), Some(12));
        // "CA" appears in no entry.
        assert_eq!(t.resolve("CA"), None);
    }

    #[test]
    fn primary_unused_rejects_entries_not_starting_with_primary() {
        let mut t = ZOrderTable::new();
        t.push("BAC".to_string(), 1);
        assert_eq!(t.resolve("BC"), None, "BAC starts with B but primary is unused");
    }

    #[test]
    fn rebuild_drops_out_of_range_entries() {
        let mut t = table();
        t.push("ABCD".to_string(), 99);
        t.rebuild(3);
        assert_eq!(t.len(), 3);
        assert_eq!(t.resolve("ABCD"), None);

        t.rebuild(2);
        assert_eq!(t.entries()[0].order, "AB", "falls back to identity");
        assert_eq!(t.resolve("AB"), Some(0));
    }

    #[test]
    fn duplicate_push_keeps_first() {
        let mut t = table();
        t.push("ABC".to_string(), 50);
        assert_eq!(t.resolve("ABC"), Some(10));
        assert_eq!(t.len(), 3);
    }
}
