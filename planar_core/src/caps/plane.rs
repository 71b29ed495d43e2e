// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Capabilities of a single hardware plane.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use bitflags::bitflags;

use crate::format::{
    BlendMask, BufferFormat, CompressionMask, CscClass, TilingMask, Transform,
};

bitflags! {
    /// Boolean capabilities of a plane.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PlaneFeatures: u16 {
        /// Can be told to ignore a buffer's alpha channel.
        const OPAQUE_CONTROL = 1 << 0;
        /// Can scale between source and destination.
        const SCALING = 1 << 1;
        /// Can scan out protected content.
        const DECRYPT = 1 << 2;
        /// Can present at a position/size other than full screen.
        const WINDOWING = 1 << 3;
        /// Can start reading away from the buffer origin.
        const SOURCE_OFFSET = 1 << 4;
        /// Can read a sub-rectangle smaller than the buffer.
        const SOURCE_CROP = 1 << 5;
        /// Can be turned off. Planes without this must carry content.
        const DISABLE = 1 << 6;
        /// Supports a constant plane alpha.
        const PLANE_ALPHA = 1 << 7;
        /// Can present a collapsed (composited) run of layers.
        const COLLAPSE = 1 << 8;
        /// Only scans out buffers allocated with native usage.
        const REQUIRES_NATIVE_BUFFER = 1 << 9;
    }
}

/// Static and configurable capabilities of one hardware plane.
///
/// Planes are identified by their index in
/// [`DisplayCaps::planes`](super::DisplayCaps::planes); index 0 is the
/// primary, backmost plane.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaneCaps {
    /// Human-readable name used in dumps.
    pub name: String,
    /// Boolean capabilities.
    pub features: PlaneFeatures,
    /// Supported blend modes.
    pub blending: BlendMask,
    /// Minimum source width in pixels.
    pub min_source_width: u32,
    /// Minimum source height in pixels.
    pub min_source_height: u32,
    /// Maximum source width in pixels.
    pub max_source_width: u32,
    /// Maximum source height in pixels.
    pub max_source_height: u32,
    /// Maximum row pitch in bytes.
    pub max_pitch: u32,
    /// Supported tiling layouts.
    pub tiling: TilingMask,
    /// Supported compression schemes.
    pub compression: CompressionMask,
    /// Supported transforms. [`Transform::NONE`] must be listed to be usable
    /// without a transform.
    pub transforms: Vec<Transform>,
    /// Formats the plane scans out directly.
    pub formats: Vec<BufferFormat>,
    /// Intermediate format per [`CscClass`] used when a layer is
    /// pre-processed for this plane.
    pub csc_formats: [BufferFormat; CscClass::COUNT],
    /// Smallest supported scale factor (destination / source).
    pub min_scale: f32,
    /// Largest supported scale factor.
    pub max_scale: f32,
    /// Planes (bit per index) allowed directly below this one.
    pub z_order_pre_mask: u32,
    /// Planes (bit per index) allowed directly above this one.
    pub z_order_post_mask: u32,
}

impl PlaneCaps {
    /// A plane that scans out linear and X-tiled opaque and alpha RGB at
    /// native scale, with no optional features.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: PlaneFeatures::empty(),
            blending: BlendMask::NONE,
            min_source_width: 1,
            min_source_height: 1,
            max_source_width: 4096,
            max_source_height: 4096,
            max_pitch: 32 * 1024,
            tiling: TilingMask::LINEAR | TilingMask::X,
            compression: CompressionMask::NONE,
            transforms: vec![Transform::NONE],
            formats: vec![
                BufferFormat::Rgbx8888,
                BufferFormat::Bgrx8888,
                BufferFormat::Rgba8888,
                BufferFormat::Bgra8888,
            ],
            csc_formats: [
                BufferFormat::Rgbx8888,
                BufferFormat::Rgba8888,
                BufferFormat::Nv12,
                BufferFormat::P010,
            ],
            min_scale: 1.0,
            max_scale: 1.0,
            z_order_pre_mask: u32::MAX,
            z_order_post_mask: u32::MAX,
        }
    }

    /// Adds features.
    #[must_use]
    pub fn with_features(mut self, features: PlaneFeatures) -> Self {
        self.features |= features;
        self
    }

    /// Replaces the blend mask.
    #[must_use]
    pub fn with_blending(mut self, blending: BlendMask) -> Self {
        self.blending = blending;
        self
    }

    /// Replaces the direct-scanout format list.
    #[must_use]
    pub fn with_formats(mut self, formats: Vec<BufferFormat>) -> Self {
        self.formats = formats;
        self
    }

    /// Replaces the transform list.
    #[must_use]
    pub fn with_transforms(mut self, transforms: Vec<Transform>) -> Self {
        self.transforms = transforms;
        self
    }

    /// Replaces the tiling mask.
    #[must_use]
    pub fn with_tiling(mut self, tiling: TilingMask) -> Self {
        self.tiling = tiling;
        self
    }

    /// Replaces the compression mask.
    #[must_use]
    pub fn with_compression(mut self, compression: CompressionMask) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the scale range and enables [`PlaneFeatures::SCALING`] when the
    /// range is not exactly 1.
    #[must_use]
    pub fn with_scale_range(mut self, min: f32, max: f32) -> Self {
        self.min_scale = min;
        self.max_scale = max;
        self.features
            .set(PlaneFeatures::SCALING, min != 1.0 || max != 1.0);
        self
    }

    /// Sets the maximum source size.
    #[must_use]
    pub fn with_max_source(mut self, width: u32, height: u32) -> Self {
        self.max_source_width = width;
        self.max_source_height = height;
        self
    }

    /// Sets the z-order adjacency masks.
    #[must_use]
    pub fn with_z_order_masks(mut self, pre: u32, post: u32) -> Self {
        self.z_order_pre_mask = pre;
        self.z_order_post_mask = post;
        self
    }

    /// Whether the plane has every flag in `features`.
    #[inline]
    #[must_use]
    pub fn has(&self, features: PlaneFeatures) -> bool {
        self.features.contains(features)
    }

    /// Whether the plane can be left unused.
    #[inline]
    #[must_use]
    pub fn can_disable(&self) -> bool {
        self.has(PlaneFeatures::DISABLE)
    }

    /// Whether `format` is scanned out directly.
    #[must_use]
    pub fn supports_format(&self, format: BufferFormat) -> bool {
        self.formats.contains(&format)
    }

    /// Whether `transform` is listed.
    #[must_use]
    pub fn supports_transform(&self, transform: Transform) -> bool {
        self.transforms.contains(&transform)
    }

    /// Intermediate format for content of `class` when pre-processing.
    #[inline]
    #[must_use]
    pub fn csc_format(&self, class: CscClass) -> BufferFormat {
        self.csc_formats[class.index()]
    }

    /// Whether plane `below` may sit directly below this plane, checking both
    /// planes' masks.
    ///
    /// `self_index` is this plane's index.
    #[must_use]
    pub fn may_follow(&self, self_index: usize, below_index: usize, below: &Self) -> bool {
        self.z_order_pre_mask & (1 << below_index) != 0
            && below.z_order_post_mask & (1 << self_index) != 0
    }
}
