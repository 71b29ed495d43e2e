// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handle types that cross the core/allocator/composer boundaries.

use core::fmt;

/// An opaque reference to an externally allocated graphics buffer.
///
/// Buffers are owned by the window system or by a
/// `BufferPool`; a [`Layer`](super::Layer) only holds this non-owning handle.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferHandle(pub u64);

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferHandle({:#x})", self.0)
    }
}

/// An opaque synchronization fence (acquire or release).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fence(pub u32);

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fence({})", self.0)
    }
}

/// A handle to a composition slot owned by a composition manager.
///
/// Contains both a slot index and a generation counter so that stale handles
/// are detected after the slot is recycled for different content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompositionId {
    idx: u32,
    generation: u32,
}

impl CompositionId {
    /// Creates a handle from a slot index and generation.
    #[inline]
    #[must_use]
    pub const fn new(idx: u32, generation: u32) -> Self {
        Self { idx, generation }
    }

    /// Returns the raw slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for CompositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompositionId({}@gen{})", self.idx, self.generation)
    }
}
