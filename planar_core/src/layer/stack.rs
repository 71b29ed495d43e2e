// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Back-to-front ordered layers for one display.

use alloc::vec::Vec;
use core::ops::Index;

use super::surface::{Layer, LayerFlags};
use crate::MAX_LAYERS;

/// Result of a successful [`LayerStack::matches`] comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackMatch {
    /// Whether every layer's buffer handle matched too.
    pub handles_match: bool,
    /// Whether any layer is itself the output of another composition.
    pub has_sub_composition: bool,
}

/// An ordered set of layers, index 0 backmost.
///
/// Aggregate queries (`is_video`, `is_encrypted`, ...) read a cached union of
/// the members' [`LayerFlags`]. Every mutating method refreshes it; callers
/// that edit a layer in place through [`layer_mut`](Self::layer_mut) must call
/// [`update_layer_flags`](Self::update_layer_flags) afterwards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerStack {
    layers: Vec<Layer>,
    flags: LayerFlags,
}

impl LayerStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stack from layers ordered back to front.
    ///
    /// # Panics
    ///
    /// Panics if more than [`MAX_LAYERS`] layers are supplied.
    #[must_use]
    pub fn from_layers(layers: Vec<Layer>) -> Self {
        assert!(
            layers.len() <= MAX_LAYERS,
            "layer stack holds at most {MAX_LAYERS} layers, got {}",
            layers.len()
        );
        let mut stack = Self {
            layers,
            flags: LayerFlags::empty(),
        };
        stack.update_layer_flags();
        stack
    }

    /// Appends a layer in front of the existing ones.
    ///
    /// # Panics
    ///
    /// Panics if the stack is already at [`MAX_LAYERS`].
    pub fn push(&mut self, layer: Layer) {
        assert!(
            self.layers.len() < MAX_LAYERS,
            "layer stack holds at most {MAX_LAYERS} layers"
        );
        self.flags |= layer.flags;
        self.layers.push(layer);
    }

    /// Replaces the layer at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set_layer(&mut self, index: usize, layer: Layer) {
        self.layers[index] = layer;
        self.update_layer_flags();
    }

    /// Removes all layers.
    pub fn clear(&mut self) {
        self.layers.clear();
        self.flags = LayerFlags::empty();
    }

    /// Recomputes the cached flag union.
    pub fn update_layer_flags(&mut self) {
        self.flags = self
            .layers
            .iter()
            .fold(LayerFlags::empty(), |acc, l| acc | l.flags);
    }

    /// Number of layers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the stack holds no layers.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Returns the layer at `index`, if any.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    /// Mutable access to a layer. See the type docs about flag refresh.
    #[inline]
    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    /// Iterates layers back to front.
    pub fn iter(&self) -> core::slice::Iter<'_, Layer> {
        self.layers.iter()
    }

    /// Iterates layers back to front, mutably.
    ///
    /// Only fences and handles should be edited this way; flag edits need a
    /// following [`update_layer_flags`](Self::update_layer_flags).
    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, Layer> {
        self.layers.iter_mut()
    }

    /// The layers as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Layer] {
        &self.layers
    }

    /// Union of all member layer flags.
    #[inline]
    #[must_use]
    pub fn flags(&self) -> LayerFlags {
        self.flags
    }

    /// Whether any layer is video.
    #[must_use]
    pub fn is_video(&self) -> bool {
        self.flags.contains(LayerFlags::VIDEO)
    }

    /// Whether any layer is encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.flags.contains(LayerFlags::ENCRYPTED)
    }

    /// Whether any layer is front-buffer rendered.
    #[must_use]
    pub fn is_front_buffer_rendered(&self) -> bool {
        self.flags.contains(LayerFlags::FRONT_BUFFER_RENDERED)
    }

    /// Compares two stacks layer by layer with [`Layer::matches`].
    ///
    /// Returns `None` if the lengths differ or any layer pair fails to match.
    #[must_use]
    pub fn matches(&self, other: &Self) -> Option<StackMatch> {
        if self.layers.len() != other.layers.len() {
            return None;
        }
        let mut result = StackMatch {
            handles_match: true,
            has_sub_composition: false,
        };
        for (a, b) in self.layers.iter().zip(&other.layers) {
            let m = a.matches(b)?;
            result.handles_match &= m.handles_match;
            result.has_sub_composition |= a.is_composition();
        }
        Some(result)
    }
}

impl Index<usize> for LayerStack {
    type Output = Layer;

    fn index(&self, index: usize) -> &Layer {
        &self.layers[index]
    }
}

impl<'a> IntoIterator for &'a LayerStack {
    type Item = &'a Layer;
    type IntoIter = core::slice::Iter<'a, Layer>;

    fn into_iter(self) -> Self::IntoIter {
        self.layers.iter()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::format::BufferFormat;
    use crate::layer::{BufferHandle, BufferInfo, CompositionId, DisplayRect};

    fn layer(handle: u64) -> Layer {
        Layer::new(
            Some(BufferHandle(handle)),
            BufferInfo::linear(640, 480, BufferFormat::Rgba8888),
            DisplayRect::from_size(640, 480),
        )
    }

    #[test]
    fn flags_union_tracks_membership() {
        let mut stack = LayerStack::from_layers(vec![layer(1), layer(2)]);
        assert!(!stack.is_video());

        stack.push(layer(3).with_flags(LayerFlags::VIDEO));
        assert!(stack.is_video());

        stack.set_layer(2, layer(3));
        assert!(!stack.is_video(), "replacing the video layer clears the flag");

        stack.layer_mut(0).unwrap().flags = LayerFlags::ENCRYPTED;
        assert!(!stack.is_encrypted(), "cached until refreshed");
        stack.update_layer_flags();
        assert!(stack.is_encrypted());
    }

    #[test]
    fn matches_reports_handle_changes() {
        let a = LayerStack::from_layers(vec![layer(1), layer(2)]);
        let b = LayerStack::from_layers(vec![layer(1), layer(7)]);
        let m = a.matches(&b).unwrap();
        assert!(!m.handles_match);
        assert!(!m.has_sub_composition);

        let m = a.matches(&a.clone()).unwrap();
        assert!(m.handles_match);
    }

    #[test]
    fn matches_rejects_different_lengths() {
        let a = LayerStack::from_layers(vec![layer(1), layer(2)]);
        let b = LayerStack::from_layers(vec![layer(1)]);
        assert_eq!(a.matches(&b), None);
    }

    #[test]
    fn matches_flags_sub_compositions() {
        let mut target = layer(5);
        target.composition = Some(CompositionId::new(0, 1));
        let a = LayerStack::from_layers(vec![layer(1), target]);
        let m = a.matches(&a.clone()).unwrap();
        assert!(m.has_sub_composition);
    }

    #[test]
    #[should_panic(expected = "layer stack holds at most")]
    fn too_many_layers_panics() {
        let layers = (0..=MAX_LAYERS as u64).map(layer).collect();
        let _ = LayerStack::from_layers(layers);
    }
}
