// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for plane allocation and composition caching.
//!
//! The allocator and the composition manager report what they decide through
//! a [`TraceSink`]. Every sink method has an empty default body.
//!
//! Callers hand a [`Tracer`] down the call chain rather than the sink itself.
//! Built without the `trace` feature, a `Tracer` holds nothing and its
//! methods are empty; with it, each call is one `Option` check.

use crate::buffer::BufferError;
use crate::caps::DisplayCaps;
use crate::display::DisplayId;
use crate::format::BufferFormat;
use crate::layer::{CompositionId, LayerStack};
use crate::time::HostTime;

/// What happened to a composition slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompositionEventKind {
    /// A request matched a slot exactly (same handles).
    Hit,
    /// A request matched a slot's geometry with new handles.
    Reused,
    /// A new slot was appended.
    Created,
    /// An eligible slot was cleared and reassigned.
    Recycled,
    /// No composer accepted the request, or a cached impossible result was
    /// returned.
    Impossible,
    /// Composers were asked for a cost and one was chosen.
    Evaluated,
    /// The chosen composer rendered the target.
    Composed,
    /// The target was invalidated by a freed or renegotiated buffer.
    Invalidated,
    /// The slot became eligible for recycling at end of frame.
    Reclaimed,
}

/// Emitted when the plane allocator finds a solution.
#[derive(Clone, Copy, Debug)]
pub struct AllocationEvent {
    /// Display the allocation ran for.
    pub display: DisplayId,
    /// Layers in the input stack.
    pub layer_count: usize,
    /// Planes enabled by the solution.
    pub planes_used: usize,
    /// Complete leaves the search evaluated.
    pub leaves: u32,
    /// Total score of the chosen solution.
    pub score: i32,
    /// Resolved z-order code.
    pub z_order: u32,
}

/// Emitted when saturating score accumulation overflowed.
#[derive(Clone, Copy, Debug)]
pub struct ScoreOverflowEvent {
    /// Display the allocation ran for.
    pub display: DisplayId,
    /// Layer whose score caused the overflow.
    pub layer_index: usize,
}

/// Emitted on every composition slot transition.
#[derive(Clone, Copy, Debug)]
pub struct CompositionEvent {
    /// The slot.
    pub id: CompositionId,
    /// What happened.
    pub kind: CompositionEventKind,
    /// Source layers in the slot.
    pub layer_count: usize,
    /// Index of the chosen composer, if any.
    pub composer: Option<usize>,
    /// Host time of the event.
    pub now: HostTime,
}

/// Emitted when a render target could not be obtained.
#[derive(Clone, Copy, Debug)]
pub struct BufferErrorEvent {
    /// The composition that needed the buffer.
    pub composition: CompositionId,
    /// Requested width.
    pub width: u32,
    /// Requested height.
    pub height: u32,
    /// Requested format.
    pub format: BufferFormat,
    /// The failure.
    pub error: BufferError,
}

/// Receives trace events from the allocator and composition manager.
pub trait TraceSink {
    /// Called when the allocator produces a solution.
    fn on_allocation(&mut self, e: &AllocationEvent) {
        _ = e;
    }

    /// Called when the allocator finds no valid arrangement. Receives the full
    /// inputs so a sink can dump them.
    fn on_allocation_failed(&mut self, display: DisplayId, caps: &DisplayCaps, stack: &LayerStack) {
        _ = (display, caps, stack);
    }

    /// Called when a score total saturated.
    fn on_score_overflow(&mut self, e: &ScoreOverflowEvent) {
        _ = e;
    }

    /// Called on composition slot transitions.
    fn on_composition(&mut self, e: &CompositionEvent) {
        _ = e;
    }

    /// Called when a render-target dequeue fails.
    fn on_buffer_error(&mut self, e: &BufferErrorEvent) {
        _ = e;
    }
}

/// Borrowed handle to an optional [`TraceSink`], passed down by `&mut`.
///
/// Use [`reborrow`](Self::reborrow) to lend it to a callee.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Forwards events to `sink`.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Drops every event.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Reborrows the tracer for a nested call.
    #[inline]
    pub fn reborrow(&mut self) -> Tracer<'_> {
        #[cfg(feature = "trace")]
        {
            Tracer {
                sink: self.sink.as_deref_mut().map(|s| s as &mut dyn TraceSink),
            }
        }
        #[cfg(not(feature = "trace"))]
        {
            Tracer {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits an [`AllocationEvent`].
    #[inline]
    pub fn allocation(&mut self, e: &AllocationEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_allocation(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Reports a failed allocation with its inputs.
    #[inline]
    pub fn allocation_failed(
        &mut self,
        display: DisplayId,
        caps: &DisplayCaps,
        stack: &LayerStack,
    ) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_allocation_failed(display, caps, stack);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = (display, caps, stack);
        }
    }

    /// Emits a [`ScoreOverflowEvent`].
    #[inline]
    pub fn score_overflow(&mut self, e: &ScoreOverflowEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_score_overflow(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`CompositionEvent`].
    #[inline]
    pub fn composition(&mut self, e: &CompositionEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_composition(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`BufferErrorEvent`].
    #[inline]
    pub fn buffer_error(&mut self, e: &BufferErrorEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_buffer_error(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }
}
