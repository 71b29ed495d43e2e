// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backtracking search over layer-to-plane assignments.

use alloc::vec::Vec;
use core::mem;

use planar_core::caps::{DisplayCaps, PlaneArrangement, PlaneFeatures, plane_letter};
use planar_core::format::{BlendMode, BufferFormat, Compression, Tiling};
use planar_core::layer::{BufferInfo, DisplayRect, Layer, LayerFlags, LayerStack};
use planar_core::options::AllocatorOptions;
use planar_core::trace::{AllocationEvent, ScoreOverflowEvent, Tracer};

use crate::eval::{EvalContext, LayerConfig};
use crate::solution::{LayerPlacement, PlaneContent, Solution};

/// Per-frame inputs that are not part of the layer stack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameHints {
    /// The display has been idle (no content updates) for a while.
    pub idle: bool,
    /// Bit `i` set marks layer `i` optional: it may be left out.
    pub optional_layers: u32,
}

/// Choice made for one layer on the current search path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Choice {
    Plane(usize),
    Unhandled,
    Disabled,
}

/// What the nearest enabled layer below the current one was assigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Below {
    Nothing,
    Plane(usize),
    Unhandled,
}

/// Running counts along one search path.
#[derive(Clone, Copy, Debug)]
struct PathState {
    used: u32,
    handled_runs: u32,
    unhandled_runs: u32,
    below: Below,
    top_plane: Option<usize>,
}

impl PathState {
    const EMPTY: Self = Self {
        used: 0,
        handled_runs: 0,
        unhandled_runs: 0,
        below: Below::Nothing,
        top_plane: None,
    };

    fn with_plane(mut self, plane: usize) -> Self {
        self.used |= 1 << plane;
        if !matches!(self.below, Below::Plane(_)) {
            self.handled_runs += 1;
        }
        self.below = Below::Plane(plane);
        self.top_plane = Some(plane);
        self
    }

    fn with_unhandled(mut self) -> Self {
        if self.below != Below::Unhandled {
            self.unhandled_runs += 1;
        }
        self.below = Below::Unhandled;
        self
    }

    fn planes_needed(&self) -> u32 {
        self.used.count_ones() + self.unhandled_runs
    }
}

/// Finds the best-scoring valid assignment of a layer stack to a display's
/// planes.
///
/// Every layer is either given a plane of its own (possibly via a
/// pre-processed intermediate), collapsed with its neighbours into a
/// composited target that occupies one plane, or, if optional, left out. The
/// search visits every assignment that survives pruning and keeps the
/// highest total score among those that also pass the leaf checks: collapse
/// plane resolution, required planes, z-order lookup, and the display's
/// arrangement constraints.
///
/// The allocator keeps its scratch buffers between calls.
#[derive(Debug)]
pub struct PlaneAllocator {
    options: AllocatorOptions,
    configs: Vec<LayerConfig>,
    choices: Vec<Choice>,
    best: Solution,
    candidate: Solution,
}

impl PlaneAllocator {
    /// Creates an allocator with the given options.
    #[must_use]
    pub fn new(options: AllocatorOptions) -> Self {
        Self {
            options,
            configs: Vec::new(),
            choices: Vec::new(),
            best: Solution::default(),
            candidate: Solution::default(),
        }
    }

    /// The options this allocator runs with.
    #[must_use]
    pub fn options(&self) -> &AllocatorOptions {
        &self.options
    }

    /// Per-layer evaluations from the last [`allocate`](Self::allocate)
    /// call.
    #[must_use]
    pub fn layer_configs(&self) -> &[LayerConfig] {
        &self.configs
    }

    /// Runs the search.
    ///
    /// Returns `None` if overlays are disabled or no valid arrangement
    /// exists; the caller must then compose every layer into one target.
    pub fn allocate(
        &mut self,
        caps: &DisplayCaps,
        stack: &LayerStack,
        hints: FrameHints,
        tracer: &mut Tracer<'_>,
    ) -> Option<&Solution> {
        if !self.options.overlay_enabled {
            return None;
        }
        let ctx = EvalContext {
            caps,
            options: &self.options,
            idle: hints.idle,
        };
        let count = stack.len();
        self.configs.clear();
        self.configs.extend(stack.iter().enumerate().map(|(i, layer)| {
            let optional = hints.optional_layers & (1 << i) != 0;
            ctx.layer_config(layer, i, count, optional)
        }));
        self.choices.clear();
        self.choices.resize(count, Choice::Disabled);

        let mut search = Search {
            caps,
            stack,
            options: &self.options,
            configs: &self.configs,
            choices: &mut self.choices,
            best: &mut self.best,
            candidate: &mut self.candidate,
            found: false,
            leaves: 0,
            tracer: tracer.reborrow(),
        };
        search.descend(0, PathState::EMPTY);
        let (found, leaves) = (search.found, search.leaves);

        if !found {
            tracer.allocation_failed(caps.id, caps, stack);
            return None;
        }
        tracer.allocation(&AllocationEvent {
            display: caps.id,
            layer_count: count,
            planes_used: self.best.planes_used(),
            leaves,
            score: self.best.score,
            z_order: self.best.z_order_code,
        });
        Some(&self.best)
    }
}

struct Search<'a> {
    caps: &'a DisplayCaps,
    stack: &'a LayerStack,
    options: &'a AllocatorOptions,
    configs: &'a [LayerConfig],
    choices: &'a mut [Choice],
    best: &'a mut Solution,
    candidate: &'a mut Solution,
    found: bool,
    leaves: u32,
    tracer: Tracer<'a>,
}

impl Search<'_> {
    fn descend(&mut self, index: usize, state: PathState) {
        if index == self.stack.len() {
            self.leaf();
            return;
        }
        let configs = self.configs;
        let config = &configs[index];

        for plane in 0..self.caps.plane_count() {
            if !config.handled[plane].valid || state.used & (1 << plane) != 0 {
                continue;
            }
            if !self.may_stack(plane, state) {
                continue;
            }
            let next = state.with_plane(plane);
            if self.prune(&next) {
                continue;
            }
            self.choices[index] = Choice::Plane(plane);
            self.descend(index + 1, next);
        }

        if config.unhandled.valid {
            let next = state.with_unhandled();
            if !self.prune(&next) {
                self.choices[index] = Choice::Unhandled;
                self.descend(index + 1, next);
            }
        }

        if config.optional {
            self.choices[index] = Choice::Disabled;
            self.descend(index + 1, state);
        }
    }

    /// Whether `plane` may be stacked on top of the path so far.
    fn may_stack(&self, plane: usize, state: PathState) -> bool {
        if !self.options.z_order_reorder && state.top_plane.is_some_and(|top| plane <= top) {
            return false;
        }
        match state.below {
            Below::Plane(below) => {
                let caps = self.caps;
                caps.plane(plane).may_follow(plane, below, caps.plane(below))
            }
            // Collapse planes are resolved at the leaf.
            Below::Nothing | Below::Unhandled => true,
        }
    }

    fn prune(&self, state: &PathState) -> bool {
        state.handled_runs > self.options.max_handled_sets
            || state.unhandled_runs > self.options.max_unhandled_sets
            || state.planes_needed() as usize > self.caps.plane_count()
    }

    /// Whether `plane` can sit between `below` and `above` in the final order.
    fn fits_between(&self, plane: usize, below: Option<usize>, above: Option<usize>) -> bool {
        let caps = self.caps;
        let reorder = self.options.z_order_reorder;
        if let Some(b) = below
            && (!caps.plane(plane).may_follow(plane, b, caps.plane(b)) || (!reorder && plane <= b))
        {
            return false;
        }
        if let Some(a) = above
            && (!caps.plane(a).may_follow(a, plane, caps.plane(plane)) || (!reorder && a <= plane))
        {
            return false;
        }
        true
    }

    /// First free plane, in index order, able to show the collapsed run
    /// `first..=last`.
    fn collapse_plane(
        &self,
        first: usize,
        last: usize,
        used: u32,
        below: Option<usize>,
        above: Option<usize>,
    ) -> Option<usize> {
        let encrypted = (first..=last).any(|i| {
            self.choices[i] == Choice::Unhandled && self.stack[i].is_encrypted()
        });
        (0..self.caps.plane_count()).find(|&p| {
            let plane = self.caps.plane(p);
            used & (1 << p) == 0
                && plane.has(PlaneFeatures::COLLAPSE)
                && (below.is_none() || plane.blending.supports(BlendMode::Premult))
                && (!encrypted || plane.has(PlaneFeatures::DECRYPT))
                && self.fits_between(p, below, above)
        })
    }

    /// Next plane assigned above layer `index`, skipping left-out layers.
    fn plane_above(&self, index: usize) -> Option<usize> {
        self.choices[index + 1..].iter().find_map(|c| match c {
            Choice::Plane(p) => Some(Some(*p)),
            Choice::Unhandled => Some(None),
            Choice::Disabled => None,
        })?
    }

    fn leaf(&mut self) {
        self.leaves += 1;
        let caps = self.caps;
        let count = self.stack.len();
        let mut candidate = mem::take(&mut *self.candidate);
        candidate.reset(caps.plane_count(), count);

        if self.fill(&mut candidate) {
            let total = self.score();
            if !self.found || total > self.best.score {
                candidate.score = total;
                if self.finish(&mut candidate) {
                    mem::swap(&mut *self.best, &mut candidate);
                    self.found = true;
                }
            }
        }
        *self.candidate = candidate;
    }

    /// Writes the current path's plane assignments into `candidate`,
    /// resolving collapse runs. Returns `false` if a run has no plane or a
    /// required plane is left unused.
    fn fill(&self, candidate: &mut Solution) -> bool {
        let count = self.stack.len();
        // Planes taken by layers above a run are off limits to it too.
        let mut used = self.choices.iter().fold(0_u32, |mask, c| match c {
            Choice::Plane(p) => mask | 1 << p,
            Choice::Unhandled | Choice::Disabled => mask,
        });
        let mut i = 0;
        while i < count {
            match self.choices[i] {
                Choice::Disabled => i += 1,
                Choice::Plane(p) => {
                    let preprocessed = self.configs[i].handled[p].preprocess.clone();
                    candidate.placements[i] = LayerPlacement::Plane {
                        plane: p,
                        preprocessed: preprocessed.is_some(),
                    };
                    candidate.planes[p] = PlaneContent::Layer {
                        index: i,
                        preprocessed,
                    };
                    candidate.order.push(p);
                    used |= 1 << p;
                    i += 1;
                }
                Choice::Unhandled => {
                    let first = i;
                    let mut last = i;
                    for j in i + 1..count {
                        match self.choices[j] {
                            Choice::Unhandled => last = j,
                            Choice::Disabled => {}
                            Choice::Plane(_) => break,
                        }
                    }
                    let below = candidate.order.last().copied();
                    let above = self.plane_above(last);
                    let Some(p) = self.collapse_plane(first, last, used, below, above) else {
                        return false;
                    };
                    for j in first..=last {
                        if self.choices[j] == Choice::Unhandled {
                            candidate.placements[j] = LayerPlacement::Collapsed { plane: p };
                        }
                    }
                    candidate.planes[p] = PlaneContent::Collapsed { first, last };
                    candidate.order.push(p);
                    used |= 1 << p;
                    i = last + 1;
                }
            }
        }
        self.caps.required_planes() & !used == 0
    }

    /// Sums per-layer scores, saturating on overflow.
    fn score(&mut self) -> i32 {
        let mut total = 0_i32;
        for (i, choice) in self.choices.iter().enumerate() {
            let score = match *choice {
                Choice::Plane(p) => self.configs[i].handled[p].score,
                Choice::Unhandled => self.configs[i].unhandled.score,
                Choice::Disabled => 0,
            };
            total = match total.checked_add(score) {
                Some(t) => t,
                None => {
                    self.tracer.score_overflow(&ScoreOverflowEvent {
                        display: self.caps.id,
                        layer_index: i,
                    });
                    total.saturating_add(score)
                }
            };
        }
        total
    }

    /// Resolves the z-order and runs the arrangement constraints.
    fn finish(&self, candidate: &mut Solution) -> bool {
        let caps = self.caps;
        candidate.z_order.clear();
        candidate
            .z_order
            .extend(candidate.order.iter().map(|&p| plane_letter(p)));
        let Some(code) = caps.z_order().resolve(&candidate.z_order) else {
            return false;
        };
        candidate.z_order_code = code;

        for (pos, &p) in candidate.order.iter().enumerate() {
            let layer = match &candidate.planes[p] {
                PlaneContent::Layer {
                    index,
                    preprocessed,
                } => preprocessed.clone().unwrap_or_else(|| self.stack[*index].clone()),
                PlaneContent::Collapsed { first, last } => {
                    collapse_target(self.stack, self.choices, *first, *last, pos == 0)
                }
                PlaneContent::Disabled => continue,
            };
            candidate.output.push(layer);
        }

        let constraints = caps.constraints();
        if !constraints.has_complex_constraints() {
            return true;
        }
        constraints.is_supported(
            caps,
            &PlaneArrangement {
                stack: &candidate.output,
                planes: &candidate.order,
                z_order: code,
            },
        )
    }
}

/// The composited target a collapsed run is scanned out as: the bounding box
/// of its members, alpha-blended unless it is backmost.
fn collapse_target(
    stack: &LayerStack,
    choices: &[Choice],
    first: usize,
    last: usize,
    backmost: bool,
) -> Layer {
    let members = move || {
        (first..=last)
            .filter(move |&i| choices[i] == Choice::Unhandled)
            .map(move |i| &stack[i])
    };
    let dest = members()
        .map(|l| l.dest)
        .reduce(union)
        .unwrap_or_default();
    let (format, blend) = if backmost {
        (BufferFormat::Rgbx8888, BlendMode::None)
    } else {
        (BufferFormat::Rgba8888, BlendMode::Premult)
    };
    let mut target = Layer::new(None, BufferInfo::linear(dest.width, dest.height, format), dest)
        .with_blend(blend);
    target.buffer.tiling = Tiling::X;
    target.buffer.compression = Compression::None;
    target.flags = members().fold(LayerFlags::NATIVE_BUFFER, |f, l| {
        f | (l.flags & (LayerFlags::ENCRYPTED | LayerFlags::VIDEO))
    });
    target.encryption = members().find_map(|l| l.encryption);
    target
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "display rectangles fit in i32/u32 display space"
)]
fn union(a: DisplayRect, b: DisplayRect) -> DisplayRect {
    let x0 = a.x.min(b.x);
    let y0 = a.y.min(b.y);
    let x1 = (i64::from(a.x) + i64::from(a.width)).max(i64::from(b.x) + i64::from(b.width));
    let y1 = (i64::from(a.y) + i64::from(a.height)).max(i64::from(b.y) + i64::from(b.height));
    DisplayRect::new(
        x0,
        y0,
        (x1 - i64::from(x0)) as u32,
        (y1 - i64::from(y0)) as u32,
    )
}
