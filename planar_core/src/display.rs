// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display identification.
//!
//! [`DisplayId`] is a lightweight handle identifying one physical or virtual
//! display. The display server assigns these; core treats them as opaque.

use core::fmt;

/// Identifies a specific display.
///
/// Used to tag capability sets, allocation results, and trace events so
/// diagnostics from several displays can be told apart.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DisplayId(pub u32);

impl DisplayId {
    /// The primary (built-in) display.
    pub const PRIMARY: Self = Self(0);
}

impl fmt::Debug for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DisplayId({})", self.0)
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "display{}", self.0)
    }
}
