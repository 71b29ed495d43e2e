// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data model for deciding how a frame's layers reach the display hardware.
//!
//! `planar_core` describes the two inputs every composition decision starts
//! from: what the window system wants to show this frame (a [`LayerStack`] of
//! [`Layer`]s, back to front) and what the display can scan out directly (a
//! [`DisplayCaps`] listing each hardware plane's [`PlaneCaps`]). It is
//! `no_std` compatible (with `alloc`).
//!
//! # Architecture
//!
//! ```text
//!   window system ──► LayerStack ───────────┐
//!                                           ▼
//!   DisplayCaps + AllocatorOptions ──► PlaneAllocator (planar_alloc)
//!                                           │
//!                        dedicated planes ◄─┴─► collapsed runs
//!                                                    │
//!                                                    ▼
//!                       CompositionManager (planar_compose) ──► BufferPool
//! ```
//!
//! **[`layer`]**: Per-frame [`Layer`] snapshots, the [`LayerStack`] that
//! orders them, and the handle types ([`BufferHandle`], [`Fence`],
//! [`CompositionId`]) that cross crate boundaries.
//!
//! **[`format`]**: Buffer formats, colour-space-conversion classes, tiling,
//! compression, transforms and blend modes, plus the bitmask types planes use
//! to advertise support for them.
//!
//! **[`caps`]**: Plane and display capability descriptors, the z-order lookup
//! table, and the [`DisplayConstraints`](caps::DisplayConstraints) hook for
//! arrangement-wide validation.
//!
//! **[`options`]**: Typed tunables with string key/value overrides.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! allocation and composition diagnostics, with a zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! **[`buffer`]**: Buffer usage flags and pool errors shared with buffer
//! pool implementations.
//!
//! **[`time`]** / **[`display`]**: Host time and display identity.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//!
//! [`Layer`]: layer::Layer
//! [`LayerStack`]: layer::LayerStack
//! [`BufferHandle`]: layer::BufferHandle
//! [`Fence`]: layer::Fence
//! [`CompositionId`]: layer::CompositionId
//! [`DisplayCaps`]: caps::DisplayCaps
//! [`PlaneCaps`]: caps::PlaneCaps

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod buffer;
pub mod caps;
pub mod display;
pub mod format;
pub mod layer;
pub mod options;
pub mod time;
pub mod trace;

/// Upper bound on planes per display and layers per stack.
///
/// Plane sets and per-layer masks are stored in `u32` bitsets; this constant
/// makes that ceiling explicit. Exceeding it is a programming error.
pub const MAX_PLANES: usize = 32;

/// Upper bound on layers the plane allocator accepts in one stack.
pub const MAX_LAYERS: usize = 32;
