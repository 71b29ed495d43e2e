// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON event collection.
//!
//! [`JsonSink`] implements [`TraceSink`] and keeps every event as a
//! [`serde_json::Value`]. Allocation failures embed a full dump of the
//! display capabilities and layer stack, so a collected trace is enough to
//! replay the failing input. [`JsonSink::export`] writes the events as one
//! JSON array.

use std::io::{self, Write};

use serde_json::{Value, json};

use planar_core::caps::DisplayCaps;
use planar_core::display::DisplayId;
use planar_core::layer::LayerStack;
use planar_core::time::{HostTime, Timebase};
use planar_core::trace::{
    AllocationEvent, BufferErrorEvent, CompositionEvent, ScoreOverflowEvent, TraceSink,
};

use crate::dump::{caps_to_json, stack_to_json};

/// Collects trace events as JSON values.
#[derive(Debug, Default)]
pub struct JsonSink {
    events: Vec<Value>,
    timebase: Timebase,
}

impl JsonSink {
    /// Creates an empty sink that reports times in microseconds of
    /// `timebase`.
    #[must_use]
    pub fn new(timebase: Timebase) -> Self {
        Self {
            events: Vec::new(),
            timebase,
        }
    }

    /// Events collected so far, oldest first.
    #[must_use]
    pub fn events(&self) -> &[Value] {
        &self.events
    }

    /// Drops all collected events.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Writes the collected events as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns any error from `writer`.
    pub fn export(&self, writer: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *writer, &self.events)?;
        writer.flush()
    }

    fn us(&self, t: HostTime) -> f64 {
        self.timebase.ticks_to_nanos(t.ticks()) as f64 / 1000.0
    }
}

impl TraceSink for JsonSink {
    fn on_allocation(&mut self, e: &AllocationEvent) {
        self.events.push(json!({
            "event": "allocation",
            "display": e.display.0,
            "layers": e.layer_count,
            "planes": e.planes_used,
            "leaves": e.leaves,
            "score": e.score,
            "z_order": e.z_order,
        }));
    }

    fn on_allocation_failed(&mut self, display: DisplayId, caps: &DisplayCaps, stack: &LayerStack) {
        self.events.push(json!({
            "event": "allocation_failed",
            "display": display.0,
            "caps": caps_to_json(caps),
            "stack": stack_to_json(stack),
        }));
    }

    fn on_score_overflow(&mut self, e: &ScoreOverflowEvent) {
        self.events.push(json!({
            "event": "score_overflow",
            "display": e.display.0,
            "layer": e.layer_index,
        }));
    }

    fn on_composition(&mut self, e: &CompositionEvent) {
        let ts = self.us(e.now);
        self.events.push(json!({
            "event": "composition",
            "kind": format!("{:?}", e.kind),
            "slot": e.id.index(),
            "generation": e.id.generation(),
            "layers": e.layer_count,
            "composer": e.composer,
            "ts": ts,
        }));
    }

    fn on_buffer_error(&mut self, e: &BufferErrorEvent) {
        self.events.push(json!({
            "event": "buffer_error",
            "slot": e.composition.index(),
            "size": [e.width, e.height],
            "format": format!("{:?}", e.format),
            "error": e.error.to_string(),
        }));
    }
}
