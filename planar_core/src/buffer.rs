// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Types shared by buffer pools and their users.

use core::fmt;

use bitflags::bitflags;

use crate::layer::BufferHandle;

bitflags! {
    /// Intended uses of a dequeued buffer.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u8 {
        /// Written by a composer.
        const RENDER_TARGET = 1 << 0;
        /// Scanned out by a display plane.
        const SCANOUT = 1 << 1;
        /// Holds protected content.
        const PROTECTED = 1 << 2;
    }
}

/// Error returned by buffer pool operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferError {
    /// The pool is at its count or byte limit and nothing free can be evicted.
    PoolExhausted,
    /// The underlying allocator refused the request.
    AllocationFailed,
    /// The handle is not owned by this pool.
    UnknownBuffer(BufferHandle),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolExhausted => write!(f, "buffer pool exhausted"),
            Self::AllocationFailed => write!(f, "buffer allocation failed"),
            Self::UnknownBuffer(h) => write!(f, "unknown buffer {h:?}"),
        }
    }
}

impl core::error::Error for BufferError {}
