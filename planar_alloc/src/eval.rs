// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-layer, per-plane feasibility and scoring.

use alloc::vec::Vec;

use kurbo::Rect;
use planar_core::caps::{DisplayCaps, PlaneCaps, PlaneFeatures};
use planar_core::format::{BlendMode, Compression, Tiling, Transform};
use planar_core::layer::{BufferInfo, Layer, LayerFlags};
use planar_core::options::AllocatorOptions;

/// Score of a layer scanned out directly.
pub const SCORE_DIRECT: i32 = 15;
/// Score of a video layer scanned out after pre-processing.
pub const SCORE_PREPROCESSED_VIDEO: i32 = 10;
/// Score of an RGB layer scanned out after pre-processing.
pub const SCORE_PREPROCESSED_RGB: i32 = 5;
/// Bonus for the backmost and frontmost layers.
pub const SCORE_EDGE_BONUS: i32 = 1;
/// Score of collapsing an ordinary layer.
pub const SCORE_UNHANDLED: i32 = -1;
/// Score of collapsing a video or encrypted layer: allowed, but only chosen
/// when nothing else works.
pub const SCORE_UNHANDLED_DISCOURAGED: i32 = -1_000_000;
/// Score of an invalid option.
pub const MIN_SCORE: i32 = i32::MIN;

/// Outcome of checking one layer against one plane.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Support {
    /// The plane can scan the layer out as is.
    Direct,
    /// The plane can scan out this pre-processed intermediate instead.
    Preprocess(Layer),
    /// The plane cannot present the layer.
    Unsupported,
}

/// One option for one layer: collapse it, or put it on a given plane.
#[derive(Clone, Debug, PartialEq)]
pub struct Eval {
    /// Whether the option can be chosen.
    pub valid: bool,
    /// Relative score; [`MIN_SCORE`] when invalid.
    pub score: i32,
    /// Intermediate layer scanned out when pre-processing is needed.
    pub preprocess: Option<Layer>,
}

impl Eval {
    /// An option that cannot be chosen.
    pub const INVALID: Self = Self {
        valid: false,
        score: MIN_SCORE,
        preprocess: None,
    };

    fn accept(score: i32, preprocess: Option<Layer>) -> Self {
        Self {
            valid: true,
            score,
            preprocess,
        }
    }
}

/// Every option evaluated for one layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerConfig {
    /// Collapsing the layer into a composited run.
    pub unhandled: Eval,
    /// Putting the layer on plane `i`.
    pub handled: Vec<Eval>,
    /// Whether the layer may be left out entirely.
    pub optional: bool,
}

/// Inputs shared by every feasibility check in one allocation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct EvalContext<'a> {
    pub(crate) caps: &'a DisplayCaps,
    pub(crate) options: &'a AllocatorOptions,
    pub(crate) idle: bool,
}

impl EvalContext<'_> {
    /// Builds the full [`LayerConfig`] for layer `index` of `count`.
    pub(crate) fn layer_config(
        &self,
        layer: &Layer,
        index: usize,
        count: usize,
        optional: bool,
    ) -> LayerConfig {
        let unhandled = self.unhandled(layer);
        // A layer that cannot be collapsed must land on a plane, so the
        // per-layer overlay restrictions no longer apply to it.
        let restricted = unhandled.valid;
        let edge = if index == 0 || index + 1 == count {
            SCORE_EDGE_BONUS
        } else {
            0
        };
        let handled = (0..self.caps.plane_count())
            .map(|p| match self.check(p, layer, restricted, true) {
                Support::Direct => Eval::accept(SCORE_DIRECT + edge, None),
                Support::Preprocess(target) => {
                    let base = if layer.is_video() {
                        SCORE_PREPROCESSED_VIDEO
                    } else {
                        SCORE_PREPROCESSED_RGB
                    };
                    Eval::accept(base + edge, Some(target))
                }
                Support::Unsupported => Eval::INVALID,
            })
            .collect();
        LayerConfig {
            unhandled,
            handled,
            optional,
        }
    }

    /// Evaluates collapsing `layer` into a composited run.
    pub(crate) fn unhandled(&self, layer: &Layer) -> Eval {
        if !self.options.collapse || layer.is_front_buffer_rendered() {
            Eval::INVALID
        } else if layer.is_video() || layer.is_encrypted() {
            Eval::accept(SCORE_UNHANDLED_DISCOURAGED, None)
        } else {
            Eval::accept(SCORE_UNHANDLED, None)
        }
    }

    /// Checks whether plane `plane_index` can present `layer`.
    ///
    /// `restricted` applies the per-layer option restrictions: the RGB/YUV
    /// overlay toggles and idle avoidance on non-primary planes, and the
    /// pre-process toggle.
    /// `allow_preprocess` is cleared when re-checking a synthetic
    /// intermediate so pre-processing never nests.
    pub(crate) fn check(
        &self,
        plane_index: usize,
        layer: &Layer,
        restricted: bool,
        allow_preprocess: bool,
    ) -> Support {
        let plane = self.caps.plane(plane_index);
        if !self.hard_supported(plane_index, plane, layer, restricted) {
            return Support::Unsupported;
        }
        if self.directly_supported(plane_index, plane, layer) {
            return Support::Direct;
        }
        let preprocess = allow_preprocess && (self.options.preprocess || !restricted);
        if !preprocess {
            return Support::Unsupported;
        }
        let target = preprocess_target(plane, layer);
        match self.check(plane_index, &target, restricted, false) {
            Support::Direct => Support::Preprocess(target),
            _ => Support::Unsupported,
        }
    }

    /// Conditions no pre-processing can fix.
    fn hard_supported(
        &self,
        plane_index: usize,
        plane: &PlaneCaps,
        layer: &Layer,
        restricted: bool,
    ) -> bool {
        let yuv = layer.format().is_yuv();
        if restricted && plane_index > 0 {
            if yuv && !self.options.yuv_overlay {
                return false;
            }
            if !yuv && !self.options.rgb_overlay {
                return false;
            }
            if !yuv && self.idle && self.options.idle_avoid_rgb_overlay {
                return false;
            }
        }
        let caps = self.caps;
        if layer.needs_windowing(caps.width, caps.height) && !plane.has(PlaneFeatures::WINDOWING) {
            return false;
        }
        if layer.needs_opaque_forcing() && !plane.has(PlaneFeatures::OPAQUE_CONTROL) {
            return false;
        }
        if !plane.blending.supports(layer.blend) {
            return false;
        }
        if layer.is_encrypted() && !plane.has(PlaneFeatures::DECRYPT) {
            return false;
        }
        if layer.uses_plane_alpha() && !plane.has(PlaneFeatures::PLANE_ALPHA) {
            return false;
        }
        true
    }

    /// Conditions pre-processing can fix.
    fn directly_supported(&self, plane_index: usize, plane: &PlaneCaps, layer: &Layer) -> bool {
        if layer.has_source_offset() && !plane.has(PlaneFeatures::SOURCE_OFFSET) {
            return false;
        }
        if layer.has_source_crop() && !plane.has(PlaneFeatures::SOURCE_CROP) {
            return false;
        }
        if !plane.supports_transform(layer.transform) || !plane.supports_format(layer.format()) {
            return false;
        }
        if layer.is_scaled() {
            if !plane.has(PlaneFeatures::SCALING) {
                return false;
            }
            let min = f64::from(self.caps.constraints().min_scale(plane, layer));
            let max = f64::from(plane.max_scale);
            let (sx, sy) = layer.scale_factors();
            if sx < min || sy < min || sx > max || sy > max {
                return false;
            }
        }
        if plane.has(PlaneFeatures::REQUIRES_NATIVE_BUFFER) && !layer.is_native_buffer() {
            return false;
        }
        let (w, h) = (layer.source_crop.width(), layer.source_crop.height());
        if w < f64::from(plane.min_source_width)
            || h < f64::from(plane.min_source_height)
            || w > f64::from(plane.max_source_width)
            || h > f64::from(plane.max_source_height)
            || layer.buffer.pitch > plane.max_pitch
        {
            return false;
        }
        if !plane.tiling.supports(layer.buffer.tiling)
            || !plane.compression.supports(layer.buffer.compression)
        {
            return false;
        }
        self.caps
            .constraints()
            .is_layer_supported(plane_index, plane, layer)
    }
}

/// Builds the intermediate a layer is converted into for `plane`: X-tiled,
/// destination-sized, untransformed, in the plane's format for the layer's
/// CSC class.
pub(crate) fn preprocess_target(plane: &PlaneCaps, layer: &Layer) -> Layer {
    let format = plane.csc_format(layer.format().csc_class());
    let (width, height) = (layer.dest.width, layer.dest.height);
    let blend = if layer.is_opaque() || !format.has_alpha() {
        BlendMode::None
    } else {
        BlendMode::Premult
    };
    Layer {
        handle: None,
        acquire_fence: None,
        release_fence: None,
        buffer: BufferInfo {
            width,
            height,
            pitch: width * format.bytes_per_pixel(),
            format,
            tiling: Tiling::X,
            compression: Compression::None,
        },
        source_crop: Rect::new(0.0, 0.0, f64::from(width), f64::from(height)),
        dest: layer.dest,
        blend,
        plane_alpha: 1.0,
        transform: Transform::NONE,
        flags: (layer.flags & (LayerFlags::ENCRYPTED | LayerFlags::VIDEO))
            | LayerFlags::NATIVE_BUFFER,
        fps: layer.fps,
        media_timestamp: layer.media_timestamp,
        encryption: layer.encryption,
        composition: None,
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use planar_core::caps::PlaneCaps;
    use planar_core::display::DisplayId;
    use planar_core::format::{BlendMask, BufferFormat};
    use planar_core::layer::{BufferHandle, DisplayRect};

    use super::*;

    fn caps(planes: Vec<PlaneCaps>) -> DisplayCaps {
        DisplayCaps::new(DisplayId::PRIMARY, "panel", 1920, 1080, planes)
    }

    fn full_screen(format: BufferFormat) -> Layer {
        Layer::new(
            Some(BufferHandle(1)),
            BufferInfo::linear(1920, 1080, format),
            DisplayRect::from_size(1920, 1080),
        )
    }

    #[test]
    fn direct_scanout_scores_highest() {
        let caps = caps(vec![PlaneCaps::new("primary")]);
        let opts = AllocatorOptions::DEFAULT;
        let ctx = EvalContext {
            caps: &caps,
            options: &opts,
            idle: false,
        };
        let config = ctx.layer_config(&full_screen(BufferFormat::Rgbx8888), 0, 1, false);
        assert_eq!(config.handled[0].score, SCORE_DIRECT + SCORE_EDGE_BONUS);
        assert!(config.handled[0].preprocess.is_none());
        assert_eq!(config.unhandled.score, SCORE_UNHANDLED);
    }

    #[test]
    fn unsupported_format_is_preprocessed() {
        let caps = caps(vec![PlaneCaps::new("primary")]);
        let opts = AllocatorOptions::DEFAULT;
        let ctx = EvalContext {
            caps: &caps,
            options: &opts,
            idle: false,
        };
        let layer = full_screen(BufferFormat::Rgb565);
        let Support::Preprocess(target) = ctx.check(0, &layer, true, true) else {
            panic!("565 should need pre-processing");
        };
        assert_eq!(target.format(), BufferFormat::Rgbx8888);
        assert_eq!(target.buffer.tiling, Tiling::X);

        let opts = AllocatorOptions {
            preprocess: false,
            ..AllocatorOptions::DEFAULT
        };
        let ctx = EvalContext {
            caps: &caps,
            options: &opts,
            idle: false,
        };
        assert_eq!(ctx.check(0, &layer, true, true), Support::Unsupported);
        assert!(
            matches!(ctx.check(0, &layer, false, true), Support::Preprocess(_)),
            "unrestricted checks ignore the pre-process toggle"
        );
    }

    #[test]
    fn hard_rejections() {
        let caps = caps(vec![PlaneCaps::new("primary")]);
        let opts = AllocatorOptions::DEFAULT;
        let ctx = EvalContext {
            caps: &caps,
            options: &opts,
            idle: false,
        };

        let windowed = Layer::new(
            None,
            BufferInfo::linear(640, 480, BufferFormat::Rgbx8888),
            DisplayRect::new(10, 10, 640, 480),
        );
        assert_eq!(ctx.check(0, &windowed, true, true), Support::Unsupported);

        let encrypted = full_screen(BufferFormat::Rgbx8888).with_flags(LayerFlags::ENCRYPTED);
        assert_eq!(ctx.check(0, &encrypted, true, true), Support::Unsupported);

        let forced = full_screen(BufferFormat::Rgba8888);
        assert_eq!(
            ctx.check(0, &forced, true, true),
            Support::Unsupported,
            "alpha with blend none needs opaque control"
        );

        let blended = full_screen(BufferFormat::Rgba8888).with_blend(BlendMode::Premult);
        assert_eq!(ctx.check(0, &blended, true, true), Support::Unsupported);
    }

    #[test]
    fn overlay_class_toggles() {
        let overlay = PlaneCaps::new("overlay")
            .with_blending(BlendMask::NONE | BlendMask::PREMULT)
            .with_features(PlaneFeatures::DISABLE);
        let caps = caps(vec![PlaneCaps::new("primary"), overlay]);
        let opts = AllocatorOptions {
            rgb_overlay: false,
            ..AllocatorOptions::DEFAULT
        };
        let ctx = EvalContext {
            caps: &caps,
            options: &opts,
            idle: false,
        };
        let layer = full_screen(BufferFormat::Rgbx8888);
        assert_eq!(ctx.check(1, &layer, true, true), Support::Unsupported);
        assert_eq!(ctx.check(1, &layer, false, true), Support::Direct);

        let opts = AllocatorOptions {
            idle_avoid_rgb_overlay: true,
            ..AllocatorOptions::DEFAULT
        };
        let ctx = EvalContext {
            caps: &caps,
            options: &opts,
            idle: true,
        };
        assert_eq!(ctx.check(1, &layer, true, true), Support::Unsupported);
        assert_eq!(ctx.check(0, &layer, true, true), Support::Direct, "primary is exempt");
    }

    #[test]
    fn front_buffer_layer_cannot_collapse() {
        let caps = caps(vec![PlaneCaps::new("primary")]);
        let opts = AllocatorOptions::DEFAULT;
        let ctx = EvalContext {
            caps: &caps,
            options: &opts,
            idle: false,
        };
        let layer = full_screen(BufferFormat::Nv12)
            .with_flags(LayerFlags::VIDEO | LayerFlags::FRONT_BUFFER_RENDERED);
        assert_eq!(ctx.unhandled(&layer), Eval::INVALID);

        let video = full_screen(BufferFormat::Nv12).with_flags(LayerFlags::VIDEO);
        assert_eq!(ctx.unhandled(&video).score, SCORE_UNHANDLED_DISCOURAGED);
    }

    #[test]
    fn scaling_outside_range_is_preprocessed() {
        let plane = PlaneCaps::new("primary").with_scale_range(0.5, 2.0);
        let caps = caps(vec![plane]);
        let opts = AllocatorOptions::DEFAULT;
        let ctx = EvalContext {
            caps: &caps,
            options: &opts,
            idle: false,
        };
        let upscaled = Layer::new(
            None,
            BufferInfo::linear(960, 540, BufferFormat::Rgbx8888),
            DisplayRect::from_size(1920, 1080),
        );
        assert_eq!(ctx.check(0, &upscaled, true, true), Support::Direct);

        let tiny = Layer::new(
            None,
            BufferInfo::linear(480, 270, BufferFormat::Rgbx8888),
            DisplayRect::from_size(1920, 1080),
        );
        assert!(matches!(ctx.check(0, &tiny, true, true), Support::Preprocess(_)));
    }
}
