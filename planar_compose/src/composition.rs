// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cached composition records.

use planar_core::format::{BlendMode, BufferFormat, Compression};
use planar_core::layer::{
    BufferHandle, BufferInfo, CompositionId, DisplayRect, Layer, LayerStack, StackMatch,
};
use planar_core::time::HostTime;

use crate::composer::{ComposerResource, ComposerState, CostType};
use crate::pool::BufferRef;

/// Where a composition is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompositionState {
    /// Slot holds nothing.
    Cleared,
    /// Source and target are set but no composer has been chosen.
    Populated,
    /// A composer was chosen; the target is not current.
    Evaluated,
    /// The target holds current content.
    Composed,
    /// No composer can produce this composition.
    Impossible,
}

/// Output geometry and format of a composition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct OutputSpec {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) format: BufferFormat,
    pub(crate) compression: Compression,
}

/// One cached merge of a layer stack into a render target.
///
/// Compositions live in slots owned by a
/// [`CompositionManager`](crate::CompositionManager) and are addressed by
/// [`CompositionId`]. The source stack is a copy of the layers last composed;
/// fences and handles in it may lag behind the caller's stack until the next
/// request refreshes them.
pub struct Composition {
    pub(crate) id: CompositionId,
    pub(crate) source: LayerStack,
    pub(crate) target: Layer,
    pub(crate) output: Option<OutputSpec>,
    pub(crate) cost_type: CostType,
    pub(crate) target_buffer: Option<BufferRef>,
    pub(crate) external_target: bool,
    pub(crate) composer: Option<usize>,
    pub(crate) cost: f32,
    pub(crate) state: Option<ComposerState>,
    pub(crate) resource: Option<ComposerResource>,
    pub(crate) ref_count: u32,
    pub(crate) locks: u32,
    pub(crate) target_valid: bool,
    pub(crate) evaluation_valid: bool,
    pub(crate) reuse_eligible: bool,
    pub(crate) timestamp: HostTime,
    pub(crate) frame: u64,
}

impl core::fmt::Debug for Composition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Composition")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("layers", &self.source.len())
            .field("target", &self.target.handle)
            .field("composer", &self.composer)
            .field("cost", &self.cost)
            .field("ref_count", &self.ref_count)
            .field("locks", &self.locks)
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

impl Composition {
    pub(crate) fn new(id: CompositionId) -> Self {
        Self {
            id,
            source: LayerStack::new(),
            target: Layer::new(
                None,
                BufferInfo::linear(0, 0, BufferFormat::Rgba8888),
                DisplayRect::default(),
            ),
            output: None,
            cost_type: CostType::default(),
            target_buffer: None,
            external_target: false,
            composer: None,
            cost: 0.0,
            state: None,
            resource: None,
            ref_count: 0,
            locks: 0,
            target_valid: false,
            evaluation_valid: false,
            reuse_eligible: false,
            timestamp: HostTime::default(),
            frame: 0,
        }
    }

    /// The handle addressing this slot.
    #[must_use]
    pub fn id(&self) -> CompositionId {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CompositionState {
        if self.output.is_none() {
            CompositionState::Cleared
        } else if !self.evaluation_valid {
            CompositionState::Populated
        } else if self.composer.is_none() {
            CompositionState::Impossible
        } else if self.target_valid {
            CompositionState::Composed
        } else {
            CompositionState::Evaluated
        }
    }

    /// The layers this composition merges, back to front.
    #[must_use]
    pub fn source(&self) -> &LayerStack {
        &self.source
    }

    /// The output layer, ready to place on a plane or in another stack.
    #[must_use]
    pub fn target(&self) -> &Layer {
        &self.target
    }

    /// Index of the chosen composer, or `None` if impossible or not yet
    /// evaluated.
    #[must_use]
    pub fn composer(&self) -> Option<usize> {
        self.composer
    }

    /// Cost quoted by the chosen composer.
    #[must_use]
    pub fn cost(&self) -> f32 {
        self.cost
    }

    /// Outstanding acquisitions.
    #[must_use]
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Outstanding locks.
    #[must_use]
    pub fn locks(&self) -> u32 {
        self.locks
    }

    /// Whether the render target holds current content.
    #[must_use]
    pub fn is_target_valid(&self) -> bool {
        self.target_valid
    }

    /// Whether the slot may be recycled for different content.
    #[must_use]
    pub fn is_reuse_eligible(&self) -> bool {
        self.reuse_eligible
    }

    /// Last time a request touched this composition.
    #[must_use]
    pub fn timestamp(&self) -> HostTime {
        self.timestamp
    }

    /// Render-target buffer, pooled or external.
    #[must_use]
    pub fn target_handle(&self) -> Option<BufferHandle> {
        self.target.handle
    }

    /// Whether the slot can be handed to different content.
    pub(crate) fn is_recyclable(&self) -> bool {
        self.ref_count == 0 && self.locks == 0 && (self.reuse_eligible || self.output.is_none())
    }

    /// Compares a request against this composition.
    pub(crate) fn matches(&self, stack: &LayerStack, output: &OutputSpec) -> Option<StackMatch> {
        if self.output.as_ref() != Some(output) {
            return None;
        }
        self.source.matches(stack)
    }

    /// Drops everything and advances the generation.
    pub(crate) fn clear(&mut self) {
        debug_assert_eq!(self.locks, 0, "clearing a locked composition");
        debug_assert_eq!(self.ref_count, 0, "clearing an acquired composition");
        let id = CompositionId::new(self.id.index(), self.id.generation().wrapping_add(1));
        *self = Self::new(id);
    }

    /// Rebuilds source and target from scratch.
    pub(crate) fn on_update_all(
        &mut self,
        stack: &LayerStack,
        output: OutputSpec,
        cost_type: CostType,
        now: HostTime,
        frame: u64,
    ) {
        self.source = stack.clone();
        let blend = if output.format.has_alpha() {
            BlendMode::Premult
        } else {
            BlendMode::None
        };
        let mut buffer = BufferInfo::linear(output.width, output.height, output.format);
        buffer.compression = output.compression;
        let mut target = Layer::new(
            None,
            buffer,
            DisplayRect::from_size(output.width, output.height),
        )
        .with_blend(blend);
        target.composition = Some(self.id);
        self.target = target;
        self.output = Some(output);
        self.cost_type = cost_type;
        self.target_buffer = None;
        self.external_target = false;
        self.composer = None;
        self.state = None;
        self.target_valid = false;
        self.evaluation_valid = false;
        self.touch(now, frame);
    }

    /// Takes the caller's fences; handles already match.
    pub(crate) fn on_update_fences(&mut self, stack: &LayerStack, now: HostTime, frame: u64) {
        for (mine, theirs) in self.source.iter_mut().zip(stack) {
            mine.acquire_fence = theirs.acquire_fence;
            mine.release_fence = theirs.release_fence;
        }
        self.touch(now, frame);
    }

    /// Takes the caller's handles and fences; the target must be redrawn.
    pub(crate) fn on_update_handles(&mut self, stack: &LayerStack, now: HostTime, frame: u64) {
        for (mine, theirs) in self.source.iter_mut().zip(stack) {
            mine.handle = theirs.handle;
            mine.acquire_fence = theirs.acquire_fence;
            mine.release_fence = theirs.release_fence;
            mine.media_timestamp = theirs.media_timestamp;
            mine.fps = theirs.fps;
        }
        self.target_valid = false;
        self.touch(now, frame);
    }

    /// Drops the render target so the next compose starts over.
    pub(crate) fn invalidate_target(&mut self) {
        if !self.external_target {
            self.target_buffer = None;
            self.target.handle = None;
        }
        self.target.acquire_fence = None;
        self.target_valid = false;
    }

    /// Blanks every reference to `handle`. Returns whether anything changed.
    pub(crate) fn forget_buffer(&mut self, handle: BufferHandle) -> bool {
        let mut hit = false;
        if self.target.handle == Some(handle) {
            self.target_buffer = None;
            self.target.handle = None;
            self.external_target = false;
            hit = true;
        }
        for layer in self.source.iter_mut() {
            if layer.handle == Some(handle) {
                layer.handle = None;
                layer.acquire_fence = None;
                hit = true;
            }
        }
        if hit {
            self.target_valid = false;
        }
        hit
    }

    fn touch(&mut self, now: HostTime, frame: u64) {
        self.timestamp = now;
        self.frame = frame;
        self.reuse_eligible = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(format: BufferFormat) -> OutputSpec {
        OutputSpec {
            width: 1920,
            height: 1080,
            format,
            compression: Compression::None,
        }
    }

    fn stack(handles: &[u64]) -> LayerStack {
        LayerStack::from_layers(
            handles
                .iter()
                .map(|&h| {
                    Layer::new(
                        Some(BufferHandle(h)),
                        BufferInfo::linear(1920, 1080, BufferFormat::Rgba8888),
                        DisplayRect::from_size(1920, 1080),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn target_blend_follows_output_alpha() {
        let mut c = Composition::new(CompositionId::new(0, 1));
        let out = output(BufferFormat::Rgba8888);
        c.on_update_all(&stack(&[1]), out, CostType::Power, HostTime(0), 1);
        assert_eq!(c.target().blend, BlendMode::Premult, "alpha output premultiplies");
        assert_eq!(c.target().composition, Some(c.id()), "target back-references slot");

        let out = output(BufferFormat::Rgbx8888);
        c.on_update_all(&stack(&[1]), out, CostType::Power, HostTime(0), 1);
        assert_eq!(c.target().blend, BlendMode::None, "opaque output does not blend");
        assert_eq!(c.state(), CompositionState::Populated, "not evaluated yet");
    }

    #[test]
    fn matching_requires_same_output() {
        let mut c = Composition::new(CompositionId::new(0, 1));
        let s = stack(&[1, 2]);
        c.on_update_all(&s, output(BufferFormat::Rgba8888), CostType::Power, HostTime(0), 1);
        assert!(c.matches(&s, &output(BufferFormat::Rgba8888)).is_some(), "same request");
        assert!(c.matches(&s, &output(BufferFormat::Rgbx8888)).is_none(), "other format");
        let m = c.matches(&stack(&[1, 3]), &output(BufferFormat::Rgba8888)).unwrap();
        assert!(!m.handles_match, "handle change reported");
    }

    #[test]
    fn handle_update_invalidates_target() {
        let mut c = Composition::new(CompositionId::new(0, 1));
        let out = output(BufferFormat::Rgba8888);
        c.on_update_all(&stack(&[1]), out, CostType::Power, HostTime(0), 1);
        c.evaluation_valid = true;
        c.composer = Some(0);
        c.target_valid = true;
        assert_eq!(c.state(), CompositionState::Composed, "composed");

        c.on_update_handles(&stack(&[5]), HostTime(1), 2);
        assert_eq!(c.source()[0].handle, Some(BufferHandle(5)), "handle taken");
        assert_eq!(c.state(), CompositionState::Evaluated, "needs recompose");
        assert_eq!(c.timestamp(), HostTime(1), "timestamp refreshed");
    }

    #[test]
    fn forget_buffer_blanks_sources() {
        let mut c = Composition::new(CompositionId::new(0, 1));
        let out = output(BufferFormat::Rgba8888);
        c.on_update_all(&stack(&[1, 2]), out, CostType::Power, HostTime(0), 1);
        c.target_valid = true;
        assert!(c.forget_buffer(BufferHandle(2)), "source referenced the buffer");
        assert_eq!(c.source()[1].handle, None, "source slot blanked");
        assert!(!c.is_target_valid(), "recompute forced");
        assert!(!c.forget_buffer(BufferHandle(9)), "unrelated buffer");
    }

    #[test]
    fn clear_advances_generation() {
        let mut c = Composition::new(CompositionId::new(4, 1));
        let rgba = output(BufferFormat::Rgba8888);
        c.on_update_all(&stack(&[1]), rgba, CostType::Power, HostTime(0), 1);
        c.clear();
        assert_eq!(c.id(), CompositionId::new(4, 2), "generation bumped");
        assert_eq!(c.state(), CompositionState::Cleared, "cleared");
        assert!(c.source().is_empty(), "source dropped");
    }
}
