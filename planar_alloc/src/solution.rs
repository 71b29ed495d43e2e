// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plane allocation results.

use alloc::string::String;
use alloc::vec::Vec;

use planar_core::layer::{Layer, LayerStack};

/// Where one input layer ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerPlacement {
    /// On its own plane, possibly via a pre-processed intermediate.
    Plane {
        /// Plane index.
        plane: usize,
        /// Whether the plane shows a pre-processed intermediate.
        preprocessed: bool,
    },
    /// Collapsed with its neighbours into a composited target.
    Collapsed {
        /// Plane showing the composited target.
        plane: usize,
    },
    /// Left out (optional layers only).
    Disabled,
}

/// What a plane shows.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaneContent {
    /// Nothing; the plane is turned off.
    Disabled,
    /// One input layer.
    Layer {
        /// Index of the layer in the input stack.
        index: usize,
        /// Intermediate scanned out instead of the layer, if pre-processed.
        preprocessed: Option<Layer>,
    },
    /// A contiguous run of input layers composited into one target.
    Collapsed {
        /// First (backmost) layer index of the run.
        first: usize,
        /// Last (frontmost) layer index of the run, inclusive.
        last: usize,
    },
}

/// A valid assignment of layers to planes.
///
/// Produced by [`PlaneAllocator::allocate`](crate::PlaneAllocator::allocate).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Solution {
    pub(crate) planes: Vec<PlaneContent>,
    pub(crate) placements: Vec<LayerPlacement>,
    pub(crate) order: Vec<usize>,
    pub(crate) z_order: String,
    pub(crate) z_order_code: u32,
    pub(crate) score: i32,
    pub(crate) output: LayerStack,
}

impl Solution {
    /// Resets to an empty solution for `plane_count` planes and
    /// `layer_count` layers, keeping allocations.
    pub(crate) fn reset(&mut self, plane_count: usize, layer_count: usize) {
        self.planes.clear();
        self.planes.resize(plane_count, PlaneContent::Disabled);
        self.placements.clear();
        self.placements.resize(layer_count, LayerPlacement::Disabled);
        self.order.clear();
        self.z_order.clear();
        self.z_order_code = 0;
        self.score = 0;
        self.output.clear();
    }

    /// Content per plane index.
    #[must_use]
    pub fn planes(&self) -> &[PlaneContent] {
        &self.planes
    }

    /// Placement per input layer.
    #[must_use]
    pub fn placements(&self) -> &[LayerPlacement] {
        &self.placements
    }

    /// Placement of input layer `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn placement(&self, index: usize) -> LayerPlacement {
        self.placements[index]
    }

    /// Enabled plane indices, back to front.
    #[must_use]
    pub fn plane_order(&self) -> &[usize] {
        &self.order
    }

    /// Plane order string (one letter per enabled plane, back to front).
    #[must_use]
    pub fn z_order(&self) -> &str {
        &self.z_order
    }

    /// Driver z-order code resolved from the display's table.
    #[must_use]
    pub fn z_order_code(&self) -> u32 {
        self.z_order_code
    }

    /// Total score.
    #[must_use]
    pub fn score(&self) -> i32 {
        self.score
    }

    /// The layers actually scanned out, one per enabled plane, back to
    /// front. Collapsed runs appear as their composited target and
    /// pre-processed layers as their intermediate.
    #[must_use]
    pub fn output(&self) -> &LayerStack {
        &self.output
    }

    /// Runs of collapsed layers as inclusive `(first, last)` ranges, back to
    /// front.
    pub fn collapsed_runs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.order.iter().filter_map(|&p| match self.planes[p] {
            PlaneContent::Collapsed { first, last } => Some((first, last)),
            _ => None,
        })
    }

    /// Number of enabled planes.
    #[must_use]
    pub fn planes_used(&self) -> usize {
        self.order.len()
    }
}
