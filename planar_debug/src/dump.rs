// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON dumps of allocator inputs and results.
//!
//! Enum values are written as their `Debug` names and flag sets as arrays of
//! flag names, so dumps stay readable without a schema.

use serde_json::{Value, json};

use planar_alloc::{LayerPlacement, PlaneContent, Solution};
use planar_core::caps::{DisplayCaps, PlaneCaps};
use planar_core::layer::{Layer, LayerStack};

fn names<I: Iterator<Item = (&'static str, F)>, F>(flags: I) -> Value {
    Value::Array(flags.map(|(name, _)| Value::from(name)).collect())
}

fn debug_list<T: core::fmt::Debug>(items: &[T]) -> Value {
    Value::Array(items.iter().map(|i| Value::from(format!("{i:?}"))).collect())
}

/// Dumps one plane's capabilities.
#[must_use]
pub fn plane_to_json(plane: &PlaneCaps) -> Value {
    json!({
        "name": plane.name,
        "features": names(plane.features.iter_names()),
        "blending": names(plane.blending.iter_names()),
        "min_source": [plane.min_source_width, plane.min_source_height],
        "max_source": [plane.max_source_width, plane.max_source_height],
        "max_pitch": plane.max_pitch,
        "tiling": names(plane.tiling.iter_names()),
        "compression": names(plane.compression.iter_names()),
        "transforms": debug_list(&plane.transforms),
        "formats": debug_list(&plane.formats),
        "csc_formats": debug_list(&plane.csc_formats),
        "scale": [plane.min_scale, plane.max_scale],
        "z_order_masks": [plane.z_order_pre_mask, plane.z_order_post_mask],
    })
}

/// Dumps a display's capabilities, including its planes and z-order table.
#[must_use]
pub fn caps_to_json(caps: &DisplayCaps) -> Value {
    let z_order: Vec<Value> = caps
        .z_order()
        .entries()
        .iter()
        .map(|e| json!({ "order": e.order, "code": e.code }))
        .collect();
    json!({
        "id": caps.id.0,
        "name": caps.name,
        "size": [caps.width, caps.height],
        "planes": caps.planes().iter().map(plane_to_json).collect::<Vec<_>>(),
        "z_order": z_order,
        "complex_constraints": caps.constraints().has_complex_constraints(),
    })
}

/// Dumps one layer.
#[must_use]
pub fn layer_to_json(layer: &Layer) -> Value {
    let crop = layer.source_crop;
    json!({
        "handle": layer.handle.map(|h| h.0),
        "acquire_fence": layer.acquire_fence.map(|f| f.0),
        "format": format!("{:?}", layer.buffer.format),
        "buffer": [layer.buffer.width, layer.buffer.height],
        "pitch": layer.buffer.pitch,
        "tiling": format!("{:?}", layer.buffer.tiling),
        "compression": format!("{:?}", layer.buffer.compression),
        "source_crop": [crop.x0, crop.y0, crop.x1, crop.y1],
        "dest": [layer.dest.x, layer.dest.y, layer.dest.width, layer.dest.height],
        "blend": format!("{:?}", layer.blend),
        "plane_alpha": layer.plane_alpha,
        "transform": names(layer.transform.iter_names()),
        "flags": names(layer.flags.iter_names()),
        "composition": layer.composition.map(|c| format!("{c:?}")),
    })
}

/// Dumps a layer stack, back to front.
#[must_use]
pub fn stack_to_json(stack: &LayerStack) -> Value {
    Value::Array(stack.iter().map(layer_to_json).collect())
}

/// Dumps an allocation result.
#[must_use]
pub fn solution_to_json(solution: &Solution) -> Value {
    let planes: Vec<Value> = solution
        .planes()
        .iter()
        .map(|p| match p {
            PlaneContent::Disabled => json!("disabled"),
            PlaneContent::Layer {
                index,
                preprocessed,
            } => json!({
                "layer": index,
                "preprocessed": preprocessed.as_ref().map(layer_to_json),
            }),
            PlaneContent::Collapsed { first, last } => json!({ "collapsed": [first, last] }),
        })
        .collect();
    let placements: Vec<Value> = solution
        .placements()
        .iter()
        .map(|p| match *p {
            LayerPlacement::Plane {
                plane,
                preprocessed,
            } => json!({ "plane": plane, "preprocessed": preprocessed }),
            LayerPlacement::Collapsed { plane } => json!({ "collapsed_on": plane }),
            LayerPlacement::Disabled => json!("disabled"),
        })
        .collect();
    json!({
        "score": solution.score(),
        "z_order": solution.z_order(),
        "z_order_code": solution.z_order_code(),
        "planes": planes,
        "placements": placements,
    })
}
