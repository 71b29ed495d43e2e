// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render-target buffer pool.
//!
//! [`BufferPool`] hands out render targets from a [`BufferAllocator`] and keeps
//! released ones around for reuse. Sizes are aligned up (width to
//! [`WIDTH_ALIGN`], height to [`HEIGHT_ALIGN`]) so small geometry changes keep
//! hitting the same buffers.
//!
//! Buffer states:
//!
//! - *free*: owned by the pool, reusable or evictable.
//! - *dequeued*: handed out by [`BufferPool::dequeue`], not yet written.
//! - *queued*: written by a composer and held by its owner.
//!
//! An owner keeps a buffer through a [`BufferRef`], obtained from
//! [`BufferPool::register_reference`]. Dropping the reference unregisters the
//! owner and returns the buffer to the free list at the next pool operation.
//! The reference table is keyed by handle, so a forced invalidation can find
//! the owning composition without holding a pointer to it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hashbrown::HashMap;
use planar_core::buffer::{BufferError, BufferUsage};
use planar_core::format::BufferFormat;
use planar_core::layer::{BufferHandle, CompositionId, EncryptionSession, Fence};
use planar_core::options::CompositionConfig;
use planar_core::time::{Duration, HostTime};

/// Width alignment of pooled buffers, in pixels.
pub const WIDTH_ALIGN: u32 = 32;
/// Height alignment of pooled buffers, in lines.
pub const HEIGHT_ALIGN: u32 = 8;

/// Aligns a requested size to the pool's allocation granularity.
#[must_use]
pub const fn align_size(width: u32, height: u32) -> (u32, u32) {
    (
        width.next_multiple_of(WIDTH_ALIGN),
        height.next_multiple_of(HEIGHT_ALIGN),
    )
}

/// Backing store for pooled buffers.
pub trait BufferAllocator {
    /// Allocates a buffer matching `desc`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::AllocationFailed`] if the buffer cannot be
    /// created.
    fn allocate(&mut self, desc: &BufferDesc) -> Result<BufferHandle, BufferError>;

    /// Frees a buffer previously returned by [`allocate`](Self::allocate).
    fn free(&mut self, handle: BufferHandle);
}

/// Geometry, format and usage of a pooled buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    /// Aligned width in pixels.
    pub width: u32,
    /// Aligned height in lines.
    pub height: u32,
    /// Pixel format.
    pub format: BufferFormat,
    /// Intended usage.
    pub usage: BufferUsage,
}

impl BufferDesc {
    /// Size of the buffer's pixel data in bytes.
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        u64::from(self.width)
            .saturating_mul(u64::from(self.height))
            .saturating_mul(u64::from(self.format.bits_per_pixel()))
            / 8
    }
}

/// Content metadata attached to a pooled buffer by its last writer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferMetadata {
    /// Protected-content session the buffer was written under.
    pub encryption: Option<EncryptionSession>,
    /// Presentation timestamp of the media content.
    pub media_timestamp: u64,
    /// Frame rate of the media content.
    pub fps: u32,
}

/// Counters kept by a [`BufferPool`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers created through the allocator.
    pub allocations: u64,
    /// Dequeues served from the free list.
    pub reuses: u64,
    /// Free buffers dropped to make room for a new allocation.
    pub evictions: u64,
    /// Free buffers dropped by [`BufferPool::reclaim`] after sitting idle.
    pub reclaimed: u64,
    /// Buffers dropped by [`BufferPool::force_invalidate`].
    pub invalidated: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EntryState {
    Free,
    Dequeued,
    Queued,
}

#[derive(Debug)]
struct Entry {
    desc: BufferDesc,
    state: EntryState,
    last_used: HostTime,
    release_fence: Option<Fence>,
    metadata: BufferMetadata,
}

#[derive(Debug, Default)]
struct ReferenceTable {
    owners: HashMap<BufferHandle, CompositionId>,
    released: Vec<BufferHandle>,
}

fn lock(table: &Mutex<ReferenceTable>) -> MutexGuard<'_, ReferenceTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An owning reference to a pooled buffer.
///
/// While alive, the pool will not reuse or evict the buffer, and
/// [`BufferPool::owner`] reports the composition that registered it. Dropping
/// the reference releases the buffer back to the pool.
#[derive(Debug)]
pub struct BufferRef {
    handle: BufferHandle,
    table: Arc<Mutex<ReferenceTable>>,
}

impl BufferRef {
    /// The referenced buffer.
    #[must_use]
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }
}

impl Drop for BufferRef {
    fn drop(&mut self) {
        let mut table = lock(&self.table);
        if table.owners.remove(&self.handle).is_some() {
            table.released.push(self.handle);
        }
    }
}

/// A bounded pool of render-target buffers.
#[derive(Debug)]
pub struct BufferPool<A> {
    allocator: A,
    entries: HashMap<BufferHandle, Entry>,
    table: Arc<Mutex<ReferenceTable>>,
    max_count: usize,
    max_bytes: u64,
    idle: Duration,
    live_bytes: u64,
    stats: PoolStats,
}

impl<A: BufferAllocator> BufferPool<A> {
    /// Creates an empty pool with the limits from `config`.
    pub fn new(allocator: A, config: &CompositionConfig) -> Self {
        Self {
            allocator,
            entries: HashMap::new(),
            table: Arc::default(),
            max_count: usize::try_from(config.pool_max_count).unwrap_or(usize::MAX),
            max_bytes: config.pool_max_bytes,
            idle: config.buffer_idle(),
            live_bytes: 0,
            stats: PoolStats::default(),
        }
    }

    /// The backing allocator.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Counters since creation.
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Number of buffers currently allocated.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no buffers are allocated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total bytes currently allocated.
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }

    /// Number of buffers on the free list.
    pub fn free_count(&mut self) -> usize {
        self.collect_released();
        self.entries
            .values()
            .filter(|e| e.state == EntryState::Free)
            .count()
    }

    /// Hands out a buffer of at least `width` × `height`, reusing a free one
    /// with the same aligned geometry, format and usage if possible.
    ///
    /// Returns the handle and the fence the caller must wait on before
    /// writing, if the buffer's previous reader left one.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::PoolExhausted`] when the pool is at a limit and
    /// nothing free can be evicted, or the allocator's error.
    pub fn dequeue(
        &mut self,
        width: u32,
        height: u32,
        format: BufferFormat,
        usage: BufferUsage,
        now: HostTime,
    ) -> Result<(BufferHandle, Option<Fence>), BufferError> {
        self.collect_released();
        let (width, height) = align_size(width, height);
        let desc = BufferDesc {
            width,
            height,
            format,
            usage,
        };

        let hot = self
            .entries
            .iter_mut()
            .filter(|(_, e)| e.state == EntryState::Free && e.desc == desc)
            .max_by_key(|(_, e)| e.last_used);
        if let Some((&handle, entry)) = hot {
            entry.state = EntryState::Dequeued;
            entry.last_used = now;
            self.stats.reuses = self.stats.reuses.saturating_add(1);
            return Ok((handle, entry.release_fence.take()));
        }

        let bytes = desc.byte_len();
        self.make_room(bytes)?;
        let handle = self.allocator.allocate(&desc)?;
        self.entries.insert(
            handle,
            Entry {
                desc,
                state: EntryState::Dequeued,
                last_used: now,
                release_fence: None,
                metadata: BufferMetadata::default(),
            },
        );
        self.live_bytes = self.live_bytes.saturating_add(bytes);
        self.stats.allocations = self.stats.allocations.saturating_add(1);
        Ok((handle, None))
    }

    /// Marks a dequeued buffer as written.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::UnknownBuffer`] if the pool does not own
    /// `handle`.
    pub fn queue(&mut self, handle: BufferHandle, now: HostTime) -> Result<(), BufferError> {
        let entry = self.entry_mut(handle)?;
        entry.state = EntryState::Queued;
        entry.last_used = now;
        Ok(())
    }

    /// Returns a buffer to the free list, with the fence its last reader
    /// signals when done.
    ///
    /// Any registered owner is dropped from the reference table.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::UnknownBuffer`] if the pool does not own
    /// `handle`.
    pub fn release(
        &mut self,
        handle: BufferHandle,
        release_fence: Option<Fence>,
    ) -> Result<(), BufferError> {
        let entry = self
            .entries
            .get_mut(&handle)
            .ok_or(BufferError::UnknownBuffer(handle))?;
        entry.state = EntryState::Free;
        entry.release_fence = release_fence;
        lock(&self.table).owners.remove(&handle);
        Ok(())
    }

    /// Refreshes a buffer's last-use time so it is not reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::UnknownBuffer`] if the pool does not own
    /// `handle`.
    pub fn mark_used(&mut self, handle: BufferHandle, now: HostTime) -> Result<(), BufferError> {
        self.entry_mut(handle)?.last_used = now;
        Ok(())
    }

    /// Registers `owner` as the holder of `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::UnknownBuffer`] if the pool does not own
    /// `handle`.
    pub fn register_reference(
        &mut self,
        handle: BufferHandle,
        owner: CompositionId,
    ) -> Result<BufferRef, BufferError> {
        let entry = self.entry_mut(handle)?;
        if entry.state == EntryState::Free {
            entry.state = EntryState::Dequeued;
        }
        let mut table = lock(&self.table);
        table.owners.insert(handle, owner);
        table.released.retain(|&h| h != handle);
        drop(table);
        Ok(BufferRef {
            handle,
            table: Arc::clone(&self.table),
        })
    }

    /// The composition currently holding `handle`, if any.
    pub fn owner(&self, handle: BufferHandle) -> Option<CompositionId> {
        lock(&self.table).owners.get(&handle).copied()
    }

    /// Geometry, format and usage of a pooled buffer.
    pub fn get_graphic_buffer(&self, handle: BufferHandle) -> Option<&BufferDesc> {
        self.entries.get(&handle).map(|e| &e.desc)
    }

    /// Content metadata last set on a pooled buffer.
    pub fn metadata(&self, handle: BufferHandle) -> Option<&BufferMetadata> {
        self.entries.get(&handle).map(|e| &e.metadata)
    }

    /// Attaches content metadata to a pooled buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::UnknownBuffer`] if the pool does not own
    /// `handle`.
    pub fn set_buffer_metadata(
        &mut self,
        handle: BufferHandle,
        metadata: BufferMetadata,
    ) -> Result<(), BufferError> {
        self.entry_mut(handle)?.metadata = metadata;
        Ok(())
    }

    /// Frees buffers that have sat on the free list for longer than the idle
    /// window, returning their handles in ascending order.
    pub fn reclaim(&mut self, now: HostTime) -> Vec<BufferHandle> {
        self.collect_released();
        let idle = self.idle;
        let mut victims: Vec<BufferHandle> = self
            .entries
            .iter()
            .filter(|(_, e)| e.state == EntryState::Free && now.is_older_than(e.last_used, idle))
            .map(|(&h, _)| h)
            .collect();
        victims.sort_unstable();
        for &handle in &victims {
            self.free_entry(handle);
            self.stats.reclaimed = self.stats.reclaimed.saturating_add(1);
        }
        victims
    }

    /// Frees `handle` regardless of its state, for example after the display
    /// renegotiated geometry or format.
    ///
    /// Returns the composition that held the buffer so the caller can
    /// invalidate it. Its [`BufferRef`] becomes inert.
    pub fn force_invalidate(&mut self, handle: BufferHandle) -> Option<CompositionId> {
        let owner = {
            let mut table = lock(&self.table);
            table.released.retain(|&h| h != handle);
            table.owners.remove(&handle)
        };
        if self.free_entry(handle) {
            self.stats.invalidated = self.stats.invalidated.saturating_add(1);
        }
        owner
    }

    fn entry_mut(&mut self, handle: BufferHandle) -> Result<&mut Entry, BufferError> {
        self.entries
            .get_mut(&handle)
            .ok_or(BufferError::UnknownBuffer(handle))
    }

    fn collect_released(&mut self) {
        let released = core::mem::take(&mut lock(&self.table).released);
        for handle in released {
            if let Some(entry) = self.entries.get_mut(&handle) {
                entry.state = EntryState::Free;
            }
        }
    }

    /// Evicts least-recently-used free buffers until `bytes` more fit.
    fn make_room(&mut self, bytes: u64) -> Result<(), BufferError> {
        while self.entries.len() >= self.max_count
            || self.live_bytes.saturating_add(bytes) > self.max_bytes
        {
            let victim = self
                .entries
                .iter()
                .filter(|(_, e)| e.state == EntryState::Free)
                .min_by_key(|(h, e)| (e.last_used, **h))
                .map(|(&h, _)| h);
            let Some(victim) = victim else {
                return Err(BufferError::PoolExhausted);
            };
            self.free_entry(victim);
            self.stats.evictions = self.stats.evictions.saturating_add(1);
        }
        Ok(())
    }

    fn free_entry(&mut self, handle: BufferHandle) -> bool {
        let Some(entry) = self.entries.remove(&handle) else {
            return false;
        };
        self.live_bytes = self.live_bytes.saturating_sub(entry.desc.byte_len());
        self.allocator.free(handle);
        true
    }
}
