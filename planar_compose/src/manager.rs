// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The composition cache.
//!
//! [`CompositionManager`] owns a growable table of [`Composition`] slots and
//! the render-target [`BufferPool`]. Each request is matched against the
//! table before any composer is consulted:
//!
//! - same output, same layer geometry and same handles: the slot is returned
//!   after taking the new fences (a *hit*);
//! - same output and geometry but new handles, on a slot not yet touched this
//!   frame: the slot takes the handles and is redrawn by the same composer
//!   (a *reuse*);
//! - a cached impossible result for the same geometry returns `None`;
//! - otherwise the oldest recyclable slot (or a new one) is filled and every
//!   composer is asked for a cost.
//!
//! Slots become recyclable at [`on_end_frame`](CompositionManager::on_end_frame)
//! once unreferenced, unlocked and untouched for the reuse grace window.
//!
//! All methods run on one primary thread, bound by
//! [`initialize`](CompositionManager::initialize). Buffer frees from other
//! threads go through a [`StaleBufferSender`] and are drained at
//! [`on_prepare_begin`](CompositionManager::on_prepare_begin).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use planar_core::buffer::BufferUsage;
use planar_core::format::{BufferFormat, Compression};
use planar_core::layer::{BufferHandle, CompositionId, Fence, LayerFlags, LayerStack};
use planar_core::options::CompositionConfig;
use planar_core::time::HostTime;
use planar_core::trace::{BufferErrorEvent, CompositionEvent, CompositionEventKind, Tracer};

use crate::composer::{AcquireError, ComposeError, Composer, CostType, EVAL_COST_MAX, Evaluation};
use crate::composition::{Composition, OutputSpec};
use crate::pool::{BufferAllocator, BufferMetadata, BufferPool};

/// Counters kept by a [`CompositionManager`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Composer evaluation rounds.
    pub evaluations: u64,
    /// Slots rebuilt from a request.
    pub full_updates: u64,
    /// Exact hits that only took new fences.
    pub fence_updates: u64,
    /// Geometry hits that took new handles.
    pub handle_updates: u64,
    /// Render targets dequeued from the pool.
    pub dequeues: u64,
    /// Compositions rendered.
    pub composes: u64,
    /// Slots cleared and reassigned.
    pub recycles: u64,
    /// Compositions invalidated by a freed buffer.
    pub invalidations: u64,
}

type StaleQueue = Arc<Mutex<Vec<BufferHandle>>>;

fn lock(queue: &Mutex<Vec<BufferHandle>>) -> MutexGuard<'_, Vec<BufferHandle>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reports freed buffers to a [`CompositionManager`] from any thread.
///
/// Handles are queued and processed at the manager's next
/// [`on_prepare_begin`](CompositionManager::on_prepare_begin).
#[derive(Clone, Debug)]
pub struct StaleBufferSender {
    queue: StaleQueue,
}

impl StaleBufferSender {
    /// Queues `handle` for invalidation.
    pub fn notify_buffer_free(&self, handle: BufferHandle) {
        lock(&self.queue).push(handle);
    }
}

/// Cross-frame cache of compositions.
pub struct CompositionManager<A> {
    config: CompositionConfig,
    composers: Vec<Box<dyn Composer + Send>>,
    slots: Vec<Composition>,
    pool: BufferPool<A>,
    stale: StaleQueue,
    primary: Option<ThreadId>,
    frame: u64,
    stats: ManagerStats,
}

impl<A: core::fmt::Debug> core::fmt::Debug for CompositionManager<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let composers: Vec<&str> = self.composers.iter().map(|c| c.name()).collect();
        f.debug_struct("CompositionManager")
            .field("config", &self.config)
            .field("composers", &composers)
            .field("slots", &self.slots)
            .field("pool", &self.pool)
            .field("primary", &self.primary)
            .field("frame", &self.frame)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn slot_mut(slots: &mut [Composition], id: CompositionId) -> &mut Composition {
    let slot = usize::try_from(id.index())
        .ok()
        .and_then(|i| slots.get_mut(i))
        .filter(|s| s.id == id);
    match slot {
        Some(slot) => slot,
        None => panic!("stale composition handle {id:?}"),
    }
}

fn event(slot: &Composition, kind: CompositionEventKind, now: HostTime) -> CompositionEvent {
    CompositionEvent {
        id: slot.id,
        kind,
        layer_count: slot.source.len(),
        composer: slot.composer,
        now,
    }
}

impl<A: BufferAllocator> CompositionManager<A> {
    /// Creates a manager with no composers and an empty pool.
    pub fn new(allocator: A, config: CompositionConfig) -> Self {
        Self {
            config,
            composers: Vec::new(),
            slots: Vec::new(),
            pool: BufferPool::new(allocator, &config),
            stale: Arc::default(),
            primary: None,
            frame: 0,
            stats: ManagerStats::default(),
        }
    }

    /// Binds the manager to the calling thread.
    ///
    /// Call once before the first frame. Later calls from the same thread do
    /// nothing.
    ///
    /// # Panics
    ///
    /// Panics if the manager is already bound to another thread.
    pub fn initialize(&mut self) {
        let current = thread::current().id();
        match self.primary {
            None => self.primary = Some(current),
            Some(primary) => assert_eq!(
                primary, current,
                "composition manager is bound to another thread"
            ),
        }
    }

    fn on_primary_thread(&self) -> bool {
        self.primary
            .is_none_or(|primary| primary == thread::current().id())
    }

    fn check_thread(&self) {
        debug_assert!(
            self.on_primary_thread(),
            "composition manager used off its primary thread"
        );
    }

    /// Registers a composer and returns its index.
    ///
    /// Later registrations are asked first and win ties, so register the
    /// fallback composer first.
    pub fn register_composer(&mut self, composer: impl Composer + Send + 'static) -> usize {
        self.composers.push(Box::new(composer));
        self.composers.len() - 1
    }

    /// Name of the composer at `index`.
    pub fn composer_name(&self, index: usize) -> Option<&str> {
        self.composers.get(index).map(|c| c.name())
    }

    /// Tunables in effect.
    pub fn config(&self) -> &CompositionConfig {
        &self.config
    }

    /// Counters since creation.
    pub fn stats(&self) -> ManagerStats {
        self.stats
    }

    /// The render-target pool.
    pub fn pool(&self) -> &BufferPool<A> {
        &self.pool
    }

    /// A handle for reporting freed buffers from other threads.
    pub fn stale_sender(&self) -> StaleBufferSender {
        StaleBufferSender {
            queue: Arc::clone(&self.stale),
        }
    }

    /// Looks up a composition, or `None` if `id` is stale.
    pub fn composition(&self, id: CompositionId) -> Option<&Composition> {
        usize::try_from(id.index())
            .ok()
            .and_then(|i| self.slots.get(i))
            .filter(|s| s.id == id)
    }

    /// All slots, including cleared ones.
    pub fn compositions(&self) -> impl Iterator<Item = &Composition> + '_ {
        self.slots.iter()
    }

    /// Returns a composition that merges `stack` into a `width` × `height`
    /// target of `format`, or `None` if no composer can produce it.
    pub fn request_composition(
        &mut self,
        stack: &LayerStack,
        width: u32,
        height: u32,
        format: BufferFormat,
        compression: Compression,
        cost_type: CostType,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) -> Option<CompositionId> {
        self.check_thread();
        let output = OutputSpec {
            width,
            height,
            format,
            compression,
        };
        let frame = self.frame;
        let live_sub = stack
            .iter()
            .filter_map(|l| l.composition)
            .any(|sub| self.composition(sub).is_some());

        let mut recycle: Option<(usize, HostTime)> = None;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_recyclable() && recycle.is_none_or(|(_, t)| slot.timestamp < t) {
                recycle = Some((i, slot.timestamp));
            }
            let Some(m) = slot.matches(stack, &output) else {
                continue;
            };
            if slot.composer.is_none() {
                tracer.composition(&event(slot, CompositionEventKind::Impossible, now));
                return None;
            }
            if m.handles_match {
                // A stale sub-composition reference cannot change under us.
                if m.has_sub_composition && live_sub {
                    slot.target_valid = false;
                }
                slot.on_update_fences(stack, now, frame);
                self.stats.fence_updates += 1;
                tracer.composition(&event(slot, CompositionEventKind::Hit, now));
                return Some(slot.id);
            }
            if slot.frame != frame {
                slot.on_update_handles(stack, now, frame);
                self.stats.handle_updates += 1;
                tracer.composition(&event(slot, CompositionEventKind::Reused, now));
                return Some(slot.id);
            }
        }

        let index = match recycle {
            Some((i, _)) => {
                let slot = &mut self.slots[i];
                let was_used = slot.output.is_some();
                slot.clear();
                if was_used {
                    self.stats.recycles += 1;
                    tracer.composition(&event(slot, CompositionEventKind::Recycled, now));
                }
                i
            }
            None => {
                let i = self.slots.len();
                let id = CompositionId::new(u32::try_from(i).ok()?, 1);
                self.slots.push(Composition::new(id));
                tracer.composition(&event(&self.slots[i], CompositionEventKind::Created, now));
                i
            }
        };

        let slot = &mut self.slots[index];
        slot.on_update_all(stack, output, cost_type, now, frame);
        self.stats.full_updates += 1;
        choose_best_composition_engine(&mut self.composers, slot);
        self.stats.evaluations += 1;
        if slot.composer.is_none() {
            tracer.composition(&event(slot, CompositionEventKind::Impossible, now));
            return None;
        }
        tracer.composition(&event(slot, CompositionEventKind::Evaluated, now));
        Some(slot.id)
    }

    /// Takes a reference on a composition and has its composer reserve
    /// resources.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Impossible`] for an impossible composition, or
    /// the composer's error. The reference count is unchanged on error.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale.
    pub fn on_acquire(&mut self, id: CompositionId) -> Result<(), AcquireError> {
        self.check_thread();
        let slot = slot_mut(&mut self.slots, id);
        let Some(composer) = slot.composer else {
            return Err(AcquireError::Impossible);
        };
        if slot.ref_count == 0 {
            let resource = self.composers[composer].on_acquire(&slot.source, &slot.target)?;
            slot.resource = Some(resource);
        }
        slot.ref_count += 1;
        Ok(())
    }

    /// Renders a composition unless its target is already current.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::TargetUnavailable`] when no render target can
    /// be dequeued; the composition stays valid and may succeed next frame.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale.
    pub fn on_compose(
        &mut self,
        id: CompositionId,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) -> Result<(), ComposeError> {
        self.check_thread();
        let Self {
            slots,
            composers,
            pool,
            stats,
            ..
        } = self;
        let slot = slot_mut(slots, id);
        debug_assert_eq!(
            slot.target.composition,
            Some(id),
            "render target lost its back-reference"
        );
        let Some(composer) = slot.composer else {
            return Err(ComposeError::Impossible);
        };

        if slot.target_valid {
            for layer in slot.source.iter_mut() {
                if layer.acquire_fence.is_some() {
                    layer.close_acquire_fence();
                }
            }
            if let Some(buffer) = &slot.target_buffer {
                pool.mark_used(buffer.handle(), now)?;
            }
            return Ok(());
        }

        // The previous target may still be on screen, so every redraw goes to
        // a fresh buffer.
        if !slot.external_target {
            let mut usage = BufferUsage::RENDER_TARGET | BufferUsage::SCANOUT;
            if slot.source.is_encrypted() {
                usage |= BufferUsage::PROTECTED;
            }
            let buffer = slot.target.buffer;
            let (handle, fence) =
                match pool.dequeue(buffer.width, buffer.height, buffer.format, usage, now) {
                    Ok(dequeued) => dequeued,
                    Err(error) => {
                        tracer.buffer_error(&BufferErrorEvent {
                            composition: id,
                            width: buffer.width,
                            height: buffer.height,
                            format: buffer.format,
                            error,
                        });
                        return Err(error.into());
                    }
                };
            stats.dequeues += 1;
            // Dropping the old reference hands the previous buffer back to
            // the pool.
            slot.target_buffer = Some(pool.register_reference(handle, id)?);
            slot.target.handle = Some(handle);
            slot.target.acquire_fence = fence;
        }

        // First video or encrypted layer wins when there are several.
        if let Some(media) = slot
            .source
            .iter()
            .find(|l| l.is_video() || l.is_encrypted())
        {
            let metadata = BufferMetadata {
                encryption: media.encryption,
                media_timestamp: media.media_timestamp,
                fps: media.fps,
            };
            slot.target.flags |= media.flags & (LayerFlags::VIDEO | LayerFlags::ENCRYPTED);
            slot.target.encryption = metadata.encryption;
            slot.target.media_timestamp = metadata.media_timestamp;
            slot.target.fps = metadata.fps;
            if let Some(buffer) = &slot.target_buffer {
                pool.set_buffer_metadata(buffer.handle(), metadata)?;
            }
        }

        composers[composer].on_compose(&slot.source, &slot.target, slot.state.as_deref_mut())?;
        if let Some(buffer) = &slot.target_buffer {
            pool.queue(buffer.handle(), now)?;
        }
        slot.target_valid = true;
        stats.composes += 1;
        tracer.composition(&event(slot, CompositionEventKind::Composed, now));
        Ok(())
    }

    /// Drops a reference taken by [`on_acquire`](Self::on_acquire). The last
    /// release hands the composer's resources back.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale or has no outstanding reference.
    pub fn on_release(&mut self, id: CompositionId) {
        self.check_thread();
        let slot = slot_mut(&mut self.slots, id);
        assert!(
            slot.ref_count > 0,
            "composition released more often than acquired"
        );
        slot.ref_count -= 1;
        if slot.ref_count == 0
            && let (Some(composer), Some(resource)) = (slot.composer, slot.resource.take())
        {
            self.composers[composer].on_release(resource);
        }
    }

    /// Pins a composition so its slot is never recycled.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale.
    pub fn lock(&mut self, id: CompositionId) {
        slot_mut(&mut self.slots, id).locks += 1;
    }

    /// Releases a pin taken by [`lock`](Self::lock).
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale or not locked.
    pub fn unlock(&mut self, id: CompositionId) {
        let slot = slot_mut(&mut self.slots, id);
        assert!(slot.locks > 0, "unlock without matching lock");
        slot.locks -= 1;
    }

    /// Renders a composition into a caller-provided buffer instead of a
    /// pooled one.
    ///
    /// # Panics
    ///
    /// Panics if `id` is stale.
    pub fn set_external_target(
        &mut self,
        id: CompositionId,
        handle: BufferHandle,
        acquire_fence: Option<Fence>,
    ) {
        let slot = slot_mut(&mut self.slots, id);
        if slot.external_target && slot.target.handle == Some(handle) {
            return;
        }
        slot.target_buffer = None;
        slot.target.handle = Some(handle);
        slot.target.acquire_fence = acquire_fence;
        slot.external_target = true;
        slot.target_valid = false;
    }

    /// Starts a frame: advances the frame counter and processes buffer frees
    /// queued since the last frame.
    pub fn on_prepare_begin(&mut self, now: HostTime, tracer: &mut Tracer<'_>) {
        self.check_thread();
        self.frame += 1;
        self.drain_stale(now, tracer);
    }

    /// Ends a frame: marks idle slots eligible for recycling and returns idle
    /// pool buffers to the allocator.
    pub fn on_end_frame(&mut self, now: HostTime, tracer: &mut Tracer<'_>) {
        self.check_thread();
        let grace = self.config.reuse_grace();
        for slot in &mut self.slots {
            if slot.output.is_some()
                && !slot.reuse_eligible
                && slot.ref_count == 0
                && slot.locks == 0
                && now.is_older_than(slot.timestamp, grace)
            {
                slot.reuse_eligible = true;
                tracer.composition(&event(slot, CompositionEventKind::Reclaimed, now));
            }
        }
        for handle in self.pool.reclaim(now) {
            self.forget_buffer(handle, now, tracer);
        }
    }

    /// Reports that `handle` was freed.
    ///
    /// Processed immediately on the primary thread, otherwise at the next
    /// [`on_prepare_begin`](Self::on_prepare_begin).
    pub fn notify_buffer_free(
        &mut self,
        handle: BufferHandle,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) {
        lock(&self.stale).push(handle);
        if self.on_primary_thread() {
            self.drain_stale(now, tracer);
        }
    }

    /// Frees a pooled render target whose geometry or format no longer fits,
    /// invalidating the composition that held it.
    pub fn invalidate_buffer(
        &mut self,
        handle: BufferHandle,
        now: HostTime,
        tracer: &mut Tracer<'_>,
    ) {
        self.check_thread();
        if let Some(owner) = self.pool.force_invalidate(handle)
            && let Some(slot) = self
                .slots
                .iter_mut()
                .find(|s| s.id == owner && s.target.handle == Some(handle))
        {
            slot.invalidate_target();
            self.stats.invalidations += 1;
            tracer.composition(&event(slot, CompositionEventKind::Invalidated, now));
        }
        self.forget_buffer(handle, now, tracer);
    }

    fn drain_stale(&mut self, now: HostTime, tracer: &mut Tracer<'_>) {
        let handles = core::mem::take(&mut *lock(&self.stale));
        for handle in handles {
            self.forget_buffer(handle, now, tracer);
        }
    }

    fn forget_buffer(&mut self, handle: BufferHandle, now: HostTime, tracer: &mut Tracer<'_>) {
        for slot in &mut self.slots {
            if slot.forget_buffer(handle) {
                self.stats.invalidations += 1;
                tracer.composition(&event(slot, CompositionEventKind::Invalidated, now));
            }
        }
    }
}

/// Asks every composer, newest first, and keeps the strictly cheapest.
fn choose_best_composition_engine(
    composers: &mut [Box<dyn Composer + Send>],
    slot: &mut Composition,
) {
    let mut best: Option<(usize, Evaluation)> = None;
    for (i, composer) in composers.iter_mut().enumerate().rev() {
        let eval = composer.on_evaluate(&slot.source, &slot.target, slot.cost_type);
        if !eval.is_accepted() {
            debug_assert!(
                eval.state.is_none(),
                "composer {} rejected with state",
                composer.name()
            );
            continue;
        }
        if best.as_ref().is_none_or(|(_, b)| eval.cost < b.cost) {
            best = Some((i, eval));
        }
    }
    slot.evaluation_valid = true;
    match best {
        Some((i, eval)) => {
            slot.composer = Some(i);
            slot.cost = eval.cost;
            slot.state = eval.state;
        }
        None => {
            slot.composer = None;
            slot.cost = EVAL_COST_MAX;
            slot.state = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use core::any::Any;

    use planar_core::buffer::BufferError;
    use planar_core::format::BlendMode;
    use planar_core::layer::{BufferInfo, DisplayRect, Layer};
    use planar_core::time::Duration;
    use planar_core::trace::TraceSink;

    use super::*;
    use crate::composer::{ComposerResource, PassthroughComposer};
    use crate::composition::CompositionState;
    use crate::pool::tests::CountingAllocator;

    #[derive(Debug, Default)]
    struct Calls {
        evaluate: u32,
        acquire: u32,
        compose: u32,
        release: u32,
    }

    struct RecordingComposer {
        name: &'static str,
        cost: f32,
        exhausted: bool,
        calls: Arc<Mutex<Calls>>,
    }

    impl RecordingComposer {
        fn new(name: &'static str, cost: f32) -> (Self, Arc<Mutex<Calls>>) {
            let calls = Arc::new(Mutex::new(Calls::default()));
            let composer = Self {
                name,
                cost,
                exhausted: false,
                calls: Arc::clone(&calls),
            };
            (composer, calls)
        }
    }

    impl Composer for RecordingComposer {
        fn name(&self) -> &str {
            self.name
        }

        fn on_evaluate(&mut self, _: &LayerStack, _: &Layer, _: CostType) -> Evaluation {
            self.calls.lock().unwrap().evaluate += 1;
            if self.cost < 0.0 {
                Evaluation::rejected()
            } else {
                Evaluation::accepted(self.cost).with_state(0_u32)
            }
        }

        fn on_acquire(
            &mut self,
            _: &LayerStack,
            _: &Layer,
        ) -> Result<ComposerResource, AcquireError> {
            if self.exhausted {
                return Err(AcquireError::ResourcesExhausted);
            }
            self.calls.lock().unwrap().acquire += 1;
            Ok(ComposerResource(7))
        }

        fn on_compose(
            &mut self,
            _: &LayerStack,
            _: &Layer,
            state: Option<&mut (dyn Any + Send)>,
        ) -> Result<(), ComposeError> {
            self.calls.lock().unwrap().compose += 1;
            let runs = state
                .and_then(|s| s.downcast_mut::<u32>())
                .ok_or(ComposeError::ComposerFailed)?;
            *runs += 1;
            Ok(())
        }

        fn on_release(&mut self, resource: ComposerResource) {
            assert_eq!(resource, ComposerResource(7), "released what was acquired");
            self.calls.lock().unwrap().release += 1;
        }
    }

    #[derive(Default)]
    struct BufferErrors(Vec<BufferErrorEvent>);

    impl TraceSink for BufferErrors {
        fn on_buffer_error(&mut self, e: &BufferErrorEvent) {
            self.0.push(*e);
        }
    }

    const GRACE: Duration = Duration(100_000_000);

    fn layer(handle: u64, y: i32) -> Layer {
        Layer::new(
            Some(BufferHandle(handle)),
            BufferInfo::linear(1920, 200, BufferFormat::Rgba8888),
            DisplayRect::new(0, y, 1920, 200),
        )
        .with_blend(BlendMode::Premult)
    }

    fn stack(handles: &[u64]) -> LayerStack {
        LayerStack::from_layers(
            handles
                .iter()
                .zip(0..)
                .map(|(&h, i)| layer(h, i * 200))
                .collect(),
        )
    }

    fn manager(config: CompositionConfig) -> CompositionManager<CountingAllocator> {
        let mut m = CompositionManager::new(CountingAllocator::default(), config);
        m.initialize();
        m.register_composer(PassthroughComposer);
        m
    }

    fn request(
        m: &mut CompositionManager<CountingAllocator>,
        stack: &LayerStack,
        format: BufferFormat,
        now: HostTime,
    ) -> Option<CompositionId> {
        m.request_composition(
            stack,
            1920,
            1080,
            format,
            Compression::None,
            CostType::Power,
            now,
            &mut Tracer::none(),
        )
    }

    /// Acquires, composes and releases one composition.
    fn present(m: &mut CompositionManager<CountingAllocator>, id: CompositionId, now: HostTime) {
        m.on_acquire(id).unwrap();
        m.on_compose(id, now, &mut Tracer::none()).unwrap();
        m.on_release(id);
    }

    #[test]
    fn identical_request_in_same_frame_is_not_reevaluated() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let (gpu, calls) = RecordingComposer::new("gpu", 2.0);
        m.register_composer(gpu);
        m.on_prepare_begin(HostTime(0), &mut Tracer::none());

        let s = stack(&[1, 2]);
        let a = request(&mut m, &s, BufferFormat::Rgba8888, HostTime(0)).unwrap();
        let b = request(&mut m, &s, BufferFormat::Rgba8888, HostTime(1)).unwrap();
        assert_eq!(a, b, "same composition returned");
        assert_eq!(calls.lock().unwrap().evaluate, 1, "evaluated once");
        assert_eq!(m.stats().evaluations, 1, "one evaluation round");
        assert_eq!(m.stats().fence_updates, 1, "second request took fences only");
        assert_eq!(m.composition(a).unwrap().composer(), Some(1), "gpu beats passthrough");
    }

    #[test]
    fn handle_change_reuses_slot_and_invalidates_target() {
        let mut m = manager(CompositionConfig::DEFAULT);
        m.on_prepare_begin(HostTime(0), &mut Tracer::none());
        let a = request(&mut m, &stack(&[1, 2]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        present(&mut m, a, HostTime(0));
        let target = m.composition(a).unwrap().target_handle();
        assert!(m.composition(a).unwrap().is_target_valid(), "composed");

        m.on_end_frame(HostTime(1), &mut Tracer::none());
        m.on_prepare_begin(HostTime(2), &mut Tracer::none());
        let b = request(&mut m, &stack(&[1, 3]), BufferFormat::Rgba8888, HostTime(2)).unwrap();
        assert_eq!(a, b, "same slot");
        let c = m.composition(b).unwrap();
        assert!(!c.is_target_valid(), "target must be redrawn");
        assert_eq!(c.source()[1].handle, Some(BufferHandle(3)), "new handle taken");
        assert_eq!(m.stats().evaluations, 1, "no re-evaluation");
        assert_eq!(m.stats().handle_updates, 1, "handle update");

        present(&mut m, b, HostTime(2));
        assert_eq!(m.stats().dequeues, 2, "redraw dequeues a new target");
        let redrawn = m.composition(b).unwrap().target_handle();
        assert!(redrawn.is_some(), "target assigned");
        assert_ne!(redrawn, target, "shown buffer is not drawn over");
        assert_eq!(m.pool().owner(target.unwrap()), None, "old target handed back");
        assert_eq!(m.pool().owner(redrawn.unwrap()), Some(b), "new target owned");
    }

    #[test]
    fn recompose_never_reuses_the_queued_target() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let inner = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        let mut nested = layer(9, 0);
        nested.composition = Some(inner);
        let s = LayerStack::from_layers(vec![nested, layer(2, 200)]);

        let outer = request(&mut m, &s, BufferFormat::Rgbx8888, HostTime(0)).unwrap();
        present(&mut m, outer, HostTime(0));
        let first = m.composition(outer).unwrap().target_handle();
        let again = request(&mut m, &s, BufferFormat::Rgbx8888, HostTime(1)).unwrap();
        present(&mut m, again, HostTime(1));
        let second = m.composition(outer).unwrap().target_handle();
        assert_ne!(first, second, "queued buffer left alone");
        assert_eq!(m.stats().dequeues, 2, "one dequeue per compose");
    }

    #[test]
    fn handle_change_in_same_frame_takes_new_slot() {
        let mut m = manager(CompositionConfig::DEFAULT);
        m.on_prepare_begin(HostTime(0), &mut Tracer::none());
        let a = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        let b = request(&mut m, &stack(&[2]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        assert_ne!(a, b, "slot already used this frame");
    }

    #[test]
    fn impossible_result_is_cached() {
        let mut m =
            CompositionManager::new(CountingAllocator::default(), CompositionConfig::DEFAULT);
        m.initialize();
        let (picky, calls) = RecordingComposer::new("picky", -1.0);
        m.register_composer(picky);

        let s = stack(&[1, 2]);
        assert_eq!(request(&mut m, &s, BufferFormat::Rgba8888, HostTime(0)), None, "rejected");
        assert_eq!(
            request(&mut m, &stack(&[4, 5]), BufferFormat::Rgba8888, HostTime(1)),
            None,
            "cached for new handles too"
        );
        assert_eq!(calls.lock().unwrap().evaluate, 1, "not re-evaluated");
        let slot = m.compositions().next().unwrap();
        assert_eq!(slot.state(), CompositionState::Impossible, "slot records it");
    }

    #[test]
    fn cheapest_composer_wins_and_ties_keep_latest_registered() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let (a, _) = RecordingComposer::new("a", 5.0);
        let (b, _) = RecordingComposer::new("b", 5.0);
        let (c, _) = RecordingComposer::new("c", 9.0);
        m.register_composer(a);
        m.register_composer(b);
        m.register_composer(c);

        let id = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        let chosen = m.composition(id).unwrap().composer().unwrap();
        assert_eq!(m.composer_name(chosen), Some("b"), "tie kept the first one asked");
    }

    #[test]
    fn passthrough_wins_when_nothing_else_accepts() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let (picky, _) = RecordingComposer::new("picky", -1.0);
        m.register_composer(picky);
        let id = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        assert_eq!(m.composition(id).unwrap().composer(), Some(0), "fallback chosen");
    }

    #[test]
    fn consecutive_identical_frames_skip_dequeue() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let (gpu, calls) = RecordingComposer::new("gpu", 1.0);
        m.register_composer(gpu);
        let s = stack(&[1, 2, 3]);

        m.on_prepare_begin(HostTime(0), &mut Tracer::none());
        let a = request(&mut m, &s, BufferFormat::Rgba8888, HostTime(0)).unwrap();
        present(&mut m, a, HostTime(0));
        m.on_end_frame(HostTime(1), &mut Tracer::none());
        let dequeues = m.stats().dequeues;

        m.on_prepare_begin(HostTime(16), &mut Tracer::none());
        let b = request(&mut m, &s, BufferFormat::Rgba8888, HostTime(16)).unwrap();
        present(&mut m, b, HostTime(16));

        assert_eq!(a, b, "same composition");
        assert_eq!(m.stats().full_updates, 1, "no full update on frame 2");
        assert_eq!(m.stats().fence_updates, 1, "fence update on frame 2");
        assert_eq!(m.stats().dequeues, dequeues, "no dequeue on frame 2");
        assert_eq!(calls.lock().unwrap().compose, 1, "not recomposed");
    }

    #[test]
    fn target_blend_follows_output_format() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let s = stack(&[1]);
        let a = request(&mut m, &s, BufferFormat::Rgba8888, HostTime(0)).unwrap();
        let b = request(&mut m, &s, BufferFormat::Rgbx8888, HostTime(0)).unwrap();
        assert_ne!(a, b, "output format is part of the key");
        assert_eq!(m.composition(a).unwrap().target().blend, BlendMode::Premult, "rgba");
        assert_eq!(m.composition(b).unwrap().target().blend, BlendMode::None, "rgbx");
    }

    #[test]
    fn freed_buffers_are_forgotten() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let id = request(&mut m, &stack(&[1, 2]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        present(&mut m, id, HostTime(0));
        let target = m.composition(id).unwrap().target_handle().unwrap();

        m.notify_buffer_free(BufferHandle(2), HostTime(1), &mut Tracer::none());
        let c = m.composition(id).unwrap();
        assert_eq!(c.source()[1].handle, None, "source reference cleared");
        assert!(!c.is_target_valid(), "recompute forced");

        m.notify_buffer_free(target, HostTime(1), &mut Tracer::none());
        assert_eq!(m.composition(id).unwrap().target_handle(), None, "target cleared");
        assert!(
            m.compositions()
                .all(|c| c.target_handle() != Some(target)
                    && c.source().iter().all(|l| l.handle != Some(target))),
            "no dangling reference"
        );
    }

    #[test]
    fn frees_from_other_threads_wait_for_next_frame() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let id = request(&mut m, &stack(&[1, 2]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        let sender = m.stale_sender();
        thread::spawn(move || sender.notify_buffer_free(BufferHandle(1)))
            .join()
            .unwrap();

        assert_eq!(
            m.composition(id).unwrap().source()[0].handle,
            Some(BufferHandle(1)),
            "not processed mid-frame"
        );
        m.on_prepare_begin(HostTime(1), &mut Tracer::none());
        assert_eq!(m.composition(id).unwrap().source()[0].handle, None, "drained");
    }

    #[test]
    fn slots_recycle_only_after_grace() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let a = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        let half = HostTime(0) + Duration(GRACE.0 / 2);
        m.on_end_frame(half, &mut Tracer::none());
        assert!(!m.composition(a).unwrap().is_reuse_eligible(), "inside grace");

        let after = HostTime(0) + GRACE + Duration(1);
        m.on_end_frame(after, &mut Tracer::none());
        assert!(m.composition(a).unwrap().is_reuse_eligible(), "past grace");

        m.on_prepare_begin(after, &mut Tracer::none());
        let b = request(&mut m, &stack(&[1, 2]), BufferFormat::Rgba8888, after).unwrap();
        assert_eq!(b.index(), a.index(), "slot recycled");
        assert_eq!(b.generation(), a.generation() + 1, "generation advanced");
        assert_eq!(m.stats().recycles, 1, "counted");
        assert!(m.composition(a).is_none(), "old handle is stale");
    }

    #[test]
    fn locked_and_referenced_slots_are_kept() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let a = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        let b = request(&mut m, &stack(&[2, 3]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        m.lock(a);
        m.on_acquire(b).unwrap();

        let after = HostTime(0) + GRACE + Duration(1);
        m.on_end_frame(after, &mut Tracer::none());
        m.on_prepare_begin(after, &mut Tracer::none());
        let c = request(&mut m, &stack(&[4, 5, 6]), BufferFormat::Rgba8888, after).unwrap();
        assert_eq!(c.index(), 2, "new slot appended");
        assert_eq!(m.stats().recycles, 0, "nothing recycled");

        m.unlock(a);
        m.on_release(b);
    }

    #[test]
    #[should_panic(expected = "unlock without matching lock")]
    fn unlock_underflow_panics() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let a = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        m.unlock(a);
    }

    #[test]
    #[should_panic(expected = "composition released more often than acquired")]
    fn release_underflow_panics() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let a = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        m.on_release(a);
    }

    #[test]
    #[should_panic(expected = "stale composition handle")]
    fn stale_handle_panics() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let a = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        let after = HostTime(0) + GRACE + Duration(1);
        m.on_end_frame(after, &mut Tracer::none());
        m.on_prepare_begin(after, &mut Tracer::none());
        let _ = request(&mut m, &stack(&[2, 3]), BufferFormat::Rgba8888, after).unwrap();
        m.lock(a);
    }

    #[test]
    fn acquire_reserves_once_per_holder_set() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let (gpu, calls) = RecordingComposer::new("gpu", 1.0);
        m.register_composer(gpu);
        let id = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();

        m.on_acquire(id).unwrap();
        m.on_acquire(id).unwrap();
        assert_eq!(m.composition(id).unwrap().ref_count(), 2, "two holders");
        m.on_release(id);
        assert_eq!(calls.lock().unwrap().release, 0, "still held");
        m.on_release(id);
        let calls = calls.lock().unwrap();
        assert_eq!((calls.acquire, calls.release), (1, 1), "one reservation");
    }

    #[test]
    fn acquire_failure_leaves_count_unchanged() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let (mut gpu, _) = RecordingComposer::new("gpu", 1.0);
        gpu.exhausted = true;
        m.register_composer(gpu);
        let id = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        assert_eq!(m.on_acquire(id), Err(AcquireError::ResourcesExhausted), "exhausted");
        assert_eq!(m.composition(id).unwrap().ref_count(), 0, "no reference taken");
    }

    #[test]
    fn dequeue_failure_is_traced_and_not_cached() {
        let config = CompositionConfig {
            pool_max_count: 0,
            ..CompositionConfig::DEFAULT
        };
        let mut m = manager(config);
        let id = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        let mut sink = BufferErrors::default();
        let err = m
            .on_compose(id, HostTime(0), &mut Tracer::new(&mut sink))
            .unwrap_err();
        assert_eq!(
            err,
            ComposeError::TargetUnavailable(BufferError::PoolExhausted),
            "pool exhausted"
        );
        assert_eq!(sink.0.len(), 1, "error traced");
        assert_eq!(sink.0[0].composition, id, "event names the composition");
        assert_eq!(
            m.composition(id).unwrap().state(),
            CompositionState::Evaluated,
            "still composable later"
        );
    }

    #[test]
    fn media_metadata_comes_from_first_video_layer() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let mut video = layer(2, 200).with_flags(LayerFlags::VIDEO);
        video.media_timestamp = 77;
        video.fps = 30;
        let mut later = layer(3, 400).with_flags(LayerFlags::VIDEO);
        later.media_timestamp = 99;
        let s = LayerStack::from_layers(vec![layer(1, 0), video, later]);

        let id = request(&mut m, &s, BufferFormat::Rgba8888, HostTime(0)).unwrap();
        present(&mut m, id, HostTime(0));
        let target = m.composition(id).unwrap().target();
        assert!(target.is_video(), "video flag propagated");
        assert_eq!(target.media_timestamp, 77, "first video layer wins");
        let meta = m.pool().metadata(target.handle.unwrap()).unwrap();
        assert_eq!((meta.media_timestamp, meta.fps), (77, 30), "buffer metadata set");
    }

    #[test]
    fn external_target_skips_dequeue() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let id = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        m.set_external_target(id, BufferHandle(0xe0), Some(Fence(4)));
        present(&mut m, id, HostTime(0));
        assert_eq!(m.stats().dequeues, 0, "no pooled buffer");
        assert_eq!(
            m.composition(id).unwrap().target_handle(),
            Some(BufferHandle(0xe0)),
            "external buffer used"
        );
        assert!(m.pool().is_empty(), "pool untouched");
    }

    #[test]
    fn forced_invalidation_reaches_owner() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let id = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        present(&mut m, id, HostTime(0));
        let target = m.composition(id).unwrap().target_handle().unwrap();
        assert_eq!(m.pool().owner(target), Some(id), "target registered to its owner");

        m.invalidate_buffer(target, HostTime(1), &mut Tracer::none());
        let c = m.composition(id).unwrap();
        assert_eq!(c.target_handle(), None, "target dropped");
        assert!(!c.is_target_valid(), "recompute forced");
        assert!(m.pool().is_empty(), "buffer freed");
        assert_eq!(m.stats().invalidations, 1, "counted once");
    }

    #[test]
    fn sub_composition_is_always_recomposed() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let inner = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        let mut nested = layer(9, 0);
        nested.composition = Some(inner);
        let s = LayerStack::from_layers(vec![nested, layer(2, 200)]);

        let outer = request(&mut m, &s, BufferFormat::Rgbx8888, HostTime(0)).unwrap();
        present(&mut m, outer, HostTime(0));
        assert!(m.composition(outer).unwrap().is_target_valid(), "composed");
        let again = request(&mut m, &s, BufferFormat::Rgbx8888, HostTime(1)).unwrap();
        assert_eq!(again, outer, "same slot");
        assert!(!m.composition(outer).unwrap().is_target_valid(), "must recompose");
    }

    #[test]
    fn stale_sub_composition_does_not_force_recompose() {
        let mut m = manager(CompositionConfig::DEFAULT);
        let inner = request(&mut m, &stack(&[1]), BufferFormat::Rgba8888, HostTime(0)).unwrap();
        let after = HostTime(0) + GRACE + Duration(1);
        m.on_end_frame(after, &mut Tracer::none());
        m.on_prepare_begin(after, &mut Tracer::none());
        let _ = request(&mut m, &stack(&[3, 4]), BufferFormat::Rgba8888, after).unwrap();
        assert!(m.composition(inner).is_none(), "inner recycled");

        let mut nested = layer(9, 0);
        nested.composition = Some(inner);
        let s = LayerStack::from_layers(vec![nested, layer(2, 200)]);
        let outer = request(&mut m, &s, BufferFormat::Rgbx8888, after).unwrap();
        present(&mut m, outer, after);
        let again = request(&mut m, &s, BufferFormat::Rgbx8888, after).unwrap();
        assert_eq!(again, outer, "same slot");
        assert!(m.composition(outer).unwrap().is_target_valid(), "kept");
    }
}
