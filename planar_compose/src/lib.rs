// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cross-frame composition caching.
//!
//! Layers that do not get a plane of their own are merged into render
//! targets by a [`Composer`]. Composing is expensive, so
//! [`CompositionManager`] keeps every result in a [`Composition`] slot and
//! hands the same slot back while the content is unchanged:
//!
//! - [`BufferPool`] provides render targets, aligned and bounded by count and
//!   bytes, with owning [`BufferRef`]s keyed by handle.
//! - [`Composer`] is the backend interface; [`PassthroughComposer`] is the
//!   fallback that accepts everything at the worst cost.
//! - [`CompositionManager`] matches requests, picks the cheapest composer,
//!   tracks acquisitions and locks, recycles idle slots and forgets freed
//!   buffers.
//!
//! ```
//! use planar_compose::{
//!     BufferAllocator, BufferDesc, CompositionManager, CostType, PassthroughComposer,
//! };
//! use planar_core::buffer::BufferError;
//! use planar_core::format::{BufferFormat, Compression};
//! use planar_core::layer::{BufferHandle, BufferInfo, DisplayRect, Layer, LayerStack};
//! use planar_core::options::CompositionConfig;
//! use planar_core::time::HostTime;
//! use planar_core::trace::Tracer;
//!
//! #[derive(Debug, Default)]
//! struct Heap(u64);
//!
//! impl BufferAllocator for Heap {
//!     fn allocate(&mut self, _: &BufferDesc) -> Result<BufferHandle, BufferError> {
//!         self.0 += 1;
//!         Ok(BufferHandle(self.0))
//!     }
//!     fn free(&mut self, _: BufferHandle) {}
//! }
//!
//! let mut manager = CompositionManager::new(Heap::default(), CompositionConfig::DEFAULT);
//! manager.initialize();
//! manager.register_composer(PassthroughComposer);
//!
//! let layer = Layer::new(
//!     Some(BufferHandle(0x100)),
//!     BufferInfo::linear(640, 480, BufferFormat::Rgba8888),
//!     DisplayRect::from_size(640, 480),
//! );
//! let stack = LayerStack::from_layers(vec![layer]);
//! let mut tracer = Tracer::none();
//!
//! manager.on_prepare_begin(HostTime(0), &mut tracer);
//! let id = manager
//!     .request_composition(
//!         &stack,
//!         640,
//!         480,
//!         BufferFormat::Rgba8888,
//!         Compression::None,
//!         CostType::Power,
//!         HostTime(0),
//!         &mut tracer,
//!     )
//!     .expect("passthrough accepts everything");
//! manager.on_acquire(id).unwrap();
//! manager.on_compose(id, HostTime(0), &mut tracer).unwrap();
//! manager.on_release(id);
//! manager.on_end_frame(HostTime(1), &mut tracer);
//! assert!(manager.composition(id).unwrap().is_target_valid());
//! ```

mod composer;
mod composition;
mod manager;
mod pool;

pub use composer::{
    AcquireError, ComposeError, Composer, ComposerResource, ComposerState, CostType,
    EVAL_COST_MAX, EVAL_COST_MIN, Evaluation, PassthroughComposer,
};
pub use composition::{Composition, CompositionState};
pub use manager::{CompositionManager, ManagerStats, StaleBufferSender};
pub use pool::{
    BufferAllocator, BufferDesc, BufferMetadata, BufferPool, BufferRef, HEIGHT_ALIGN, PoolStats,
    WIDTH_ALIGN, align_size,
};
