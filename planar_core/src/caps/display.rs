// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display-wide capabilities and the arrangement validation hook.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use super::plane::PlaneCaps;
use super::zorder::ZOrderTable;
use crate::MAX_PLANES;
use crate::display::DisplayId;
use crate::layer::{Layer, LayerStack};

/// A complete candidate arrangement handed to
/// [`DisplayConstraints::is_supported`].
///
/// `stack` holds one layer per enabled plane, back to front, with collapsed
/// runs and pre-processed layers replaced by the synthetic layers that will
/// actually be scanned out. `planes[i]` is the plane index presenting
/// `stack[i]`.
#[derive(Clone, Copy, Debug)]
pub struct PlaneArrangement<'a> {
    /// Scanned-out layers, back to front.
    pub stack: &'a LayerStack,
    /// Plane index per scanned-out layer.
    pub planes: &'a [usize],
    /// Resolved z-order code.
    pub z_order: u32,
}

/// Display-specific checks beyond the per-plane capability tables.
///
/// Every method has a permissive default, so a display with only simple
/// per-plane limits can use [`GenericConstraints`].
pub trait DisplayConstraints {
    /// Whether [`is_supported`](Self::is_supported) must be run on every
    /// candidate arrangement.
    fn has_complex_constraints(&self) -> bool {
        false
    }

    /// Smallest scale factor `plane` accepts for `layer`.
    fn min_scale(&self, plane: &PlaneCaps, layer: &Layer) -> f32 {
        _ = layer;
        plane.min_scale
    }

    /// Extra per-layer veto applied after the generic plane checks.
    ///
    /// Returning `false` makes the layer need pre-processing on this plane.
    fn is_layer_supported(&self, plane_index: usize, plane: &PlaneCaps, layer: &Layer) -> bool {
        _ = (plane_index, plane, layer);
        true
    }

    /// Validates a whole arrangement, e.g. against bandwidth budgets.
    fn is_supported(&self, caps: &DisplayCaps, arrangement: &PlaneArrangement<'_>) -> bool {
        _ = (caps, arrangement);
        true
    }
}

/// Constraints for displays with no arrangement-wide limits.
#[derive(Clone, Copy, Debug, Default)]
pub struct GenericConstraints;

impl DisplayConstraints for GenericConstraints {}

/// Capabilities of one display: its planes, permitted plane orders, and any
/// arrangement-wide constraints.
pub struct DisplayCaps {
    /// Display this describes.
    pub id: DisplayId,
    /// Human-readable name used in dumps.
    pub name: String,
    /// Active mode width in pixels.
    pub width: u32,
    /// Active mode height in pixels.
    pub height: u32,
    planes: Vec<PlaneCaps>,
    z_order: ZOrderTable,
    constraints: Box<dyn DisplayConstraints + Send + Sync>,
}

impl fmt::Debug for DisplayCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayCaps")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("planes", &self.planes)
            .field("z_order", &self.z_order)
            .field(
                "complex_constraints",
                &self.constraints.has_complex_constraints(),
            )
            .finish_non_exhaustive()
    }
}

impl DisplayCaps {
    /// Creates capabilities for a display with an identity z-order table and
    /// [`GenericConstraints`].
    ///
    /// # Panics
    ///
    /// Panics if `planes` is empty or longer than [`MAX_PLANES`].
    #[must_use]
    pub fn new(
        id: DisplayId,
        name: impl Into<String>,
        width: u32,
        height: u32,
        planes: Vec<PlaneCaps>,
    ) -> Self {
        assert_plane_count(planes.len());
        let z_order = ZOrderTable::identity(planes.len());
        Self {
            id,
            name: name.into(),
            width,
            height,
            planes,
            z_order,
            constraints: Box::new(GenericConstraints),
        }
    }

    /// Replaces the z-order table.
    #[must_use]
    pub fn with_z_order(mut self, table: ZOrderTable) -> Self {
        self.set_z_order(table);
        self
    }

    /// Replaces the arrangement constraints.
    #[must_use]
    pub fn with_constraints(
        mut self,
        constraints: impl DisplayConstraints + Send + Sync + 'static,
    ) -> Self {
        self.constraints = Box::new(constraints);
        self
    }

    /// Replaces the plane set and rebuilds the z-order table for it.
    ///
    /// # Panics
    ///
    /// Panics if `planes` is empty or longer than [`MAX_PLANES`].
    pub fn set_planes(&mut self, planes: Vec<PlaneCaps>) {
        assert_plane_count(planes.len());
        self.planes = planes;
        self.z_order.rebuild(self.planes.len());
    }

    /// Replaces the z-order table, rebuilding it against the current planes.
    pub fn set_z_order(&mut self, mut table: ZOrderTable) {
        table.rebuild(self.planes.len());
        self.z_order = table;
    }

    /// Plane capabilities, primary first.
    #[inline]
    #[must_use]
    pub fn planes(&self) -> &[PlaneCaps] {
        &self.planes
    }

    /// Capabilities of plane `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    #[must_use]
    pub fn plane(&self, index: usize) -> &PlaneCaps {
        &self.planes[index]
    }

    /// Number of planes.
    #[inline]
    #[must_use]
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// The z-order table.
    #[must_use]
    pub fn z_order(&self) -> &ZOrderTable {
        &self.z_order
    }

    /// Arrangement constraints.
    #[must_use]
    pub fn constraints(&self) -> &(dyn DisplayConstraints + Send + Sync) {
        &*self.constraints
    }

    /// Bitmask of planes that cannot be disabled.
    #[must_use]
    pub fn required_planes(&self) -> u32 {
        self.planes
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.can_disable())
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }
}

fn assert_plane_count(count: usize) {
    assert!(count > 0, "a display needs at least one plane");
    assert!(
        count <= MAX_PLANES,
        "a display has at most {MAX_PLANES} planes, got {count}"
    );
}
