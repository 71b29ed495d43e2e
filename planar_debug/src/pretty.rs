// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`]. An allocation failure
//! is followed by an indented dump of every plane and layer.

use std::io::Write;

use planar_core::caps::{DisplayCaps, plane_letter};
use planar_core::display::DisplayId;
use planar_core::layer::LayerStack;
use planar_core::time::{HostTime, Timebase};
use planar_core::trace::{
    AllocationEvent, BufferErrorEvent, CompositionEvent, CompositionEventKind,
    ScoreOverflowEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    timebase: Timebase,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            timebase,
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }

    /// Returns the destination.
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn host_us(&self, t: HostTime) -> f64 {
        self.timebase.ticks_to_nanos(t.ticks()) as f64 / 1000.0
    }
}

fn kind_name(kind: CompositionEventKind) -> &'static str {
    match kind {
        CompositionEventKind::Hit => "hit",
        CompositionEventKind::Reused => "reused",
        CompositionEventKind::Created => "created",
        CompositionEventKind::Recycled => "recycled",
        CompositionEventKind::Impossible => "impossible",
        CompositionEventKind::Evaluated => "evaluated",
        CompositionEventKind::Composed => "composed",
        CompositionEventKind::Invalidated => "invalidated",
        CompositionEventKind::Reclaimed => "reclaimed",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_allocation(&mut self, e: &AllocationEvent) {
        let _ = writeln!(
            self.writer,
            "[alloc] display={} layers={} planes={} leaves={} score={} zorder={:#x}",
            e.display.0, e.layer_count, e.planes_used, e.leaves, e.score, e.z_order,
        );
    }

    fn on_allocation_failed(&mut self, display: DisplayId, caps: &DisplayCaps, stack: &LayerStack) {
        let _ = writeln!(
            self.writer,
            "[alloc:FAILED] display={} \"{}\" {}x{} planes={} layers={}",
            display.0,
            caps.name,
            caps.width,
            caps.height,
            caps.plane_count(),
            stack.len(),
        );
        for (i, plane) in caps.planes().iter().enumerate() {
            let _ = writeln!(
                self.writer,
                "  plane {} \"{}\" features={:?} formats={:?} tiling={:?} scale={}..{}",
                plane_letter(i),
                plane.name,
                plane.features,
                plane.formats,
                plane.tiling,
                plane.min_scale,
                plane.max_scale,
            );
        }
        for (i, layer) in stack.iter().enumerate() {
            let crop = layer.source_crop;
            let dest = layer.dest;
            let _ = writeln!(
                self.writer,
                "  layer {i} {:?} {:?} src=({:.1},{:.1})-({:.1},{:.1}) \
                 dst=({},{} {}x{}) blend={:?} flags={:?}",
                layer.buffer.format,
                layer.buffer.tiling,
                crop.x0,
                crop.y0,
                crop.x1,
                crop.y1,
                dest.x,
                dest.y,
                dest.width,
                dest.height,
                layer.blend,
                layer.flags,
            );
        }
    }

    fn on_score_overflow(&mut self, e: &ScoreOverflowEvent) {
        let _ = writeln!(
            self.writer,
            "[alloc:overflow] display={} layer={}",
            e.display.0, e.layer_index,
        );
    }

    fn on_composition(&mut self, e: &CompositionEvent) {
        let composer = match e.composer {
            Some(c) => c.to_string(),
            None => "-".into(),
        };
        let _ = writeln!(
            self.writer,
            "[comp:{}] slot={} gen={} layers={} composer={composer} at {:.1}µs",
            kind_name(e.kind),
            e.id.index(),
            e.id.generation(),
            e.layer_count,
            self.host_us(e.now),
        );
    }

    fn on_buffer_error(&mut self, e: &BufferErrorEvent) {
        let _ = writeln!(
            self.writer,
            "[buffer:ERROR] slot={} {}x{} {:?}: {}",
            e.composition.index(),
            e.width,
            e.height,
            e.format,
            e.error,
        );
    }
}
