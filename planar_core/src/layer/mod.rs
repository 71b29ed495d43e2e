// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame layer data model.
//!
//! A *layer* is one visible window-system surface for one frame. Each layer
//! has:
//!
//! - A non-owning [`BufferHandle`] plus acquire/release [`Fence`]s.
//! - Buffer state ([`BufferInfo`]): size, pitch, format, tiling, compression.
//! - Geometry: a subpixel source crop in buffer space and an integer
//!   [`DisplayRect`] in display space, related by a transform.
//! - Blend mode, plane alpha, and [`LayerFlags`] (video, encrypted,
//!   front-buffer rendered, native buffer).
//! - An optional [`CompositionId`] back-reference when the layer is the render
//!   target of a composition.
//!
//! Layers are grouped per display into a [`LayerStack`], back to front.
//!
//! # Matching
//!
//! [`Layer::matches`] decides whether cached composition output is still
//! usable. It compares everything that affects pixels except the buffer
//! handle and fences, and separately reports whether the handles were equal.
//! An equal-geometry, different-handle match means "same slot, new contents".

mod id;
mod stack;
mod surface;

pub use id::{BufferHandle, CompositionId, Fence};
pub use stack::{LayerStack, StackMatch};
pub use surface::{BufferInfo, DisplayRect, EncryptionSession, Layer, LayerFlags, LayerMatch};
