// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A single visible surface for one frame.

use bitflags::bitflags;
use kurbo::Rect;

use super::id::{BufferHandle, CompositionId, Fence};
use crate::format::{BlendMode, BufferFormat, Compression, Tiling, Transform};

/// Tolerance used when deciding whether a scale factor is exactly 1.
const SCALE_EPSILON: f64 = 1.0e-4;

/// Integer rectangle in display space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DisplayRect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl DisplayRect {
    /// Creates a rectangle from its origin and size.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a rectangle anchored at the origin.
    #[must_use]
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Returns whether the rectangle covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Allocation-level description of the buffer behind a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferInfo {
    /// Allocated width in pixels.
    pub width: u32,
    /// Allocated height in pixels.
    pub height: u32,
    /// Row pitch in bytes.
    pub pitch: u32,
    /// Pixel format.
    pub format: BufferFormat,
    /// Memory tiling.
    pub tiling: Tiling,
    /// Framebuffer compression.
    pub compression: Compression,
}

impl BufferInfo {
    /// Describes an uncompressed linear buffer with a tightly packed pitch.
    #[must_use]
    pub const fn linear(width: u32, height: u32, format: BufferFormat) -> Self {
        Self {
            width,
            height,
            pitch: width * format.bytes_per_pixel(),
            format,
            tiling: Tiling::Linear,
            compression: Compression::None,
        }
    }
}

bitflags! {
    /// Per-layer content flags supplied by the window system.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct LayerFlags: u16 {
        /// Protected content; only decrypt-capable planes may scan it out.
        const ENCRYPTED = 1 << 0;
        /// Video content.
        const VIDEO = 1 << 1;
        /// The producer renders into the front buffer without new frames,
        /// so a cached composition of it would go stale.
        const FRONT_BUFFER_RENDERED = 1 << 2;
        /// The buffer was allocated with device-native (scanout) usage.
        const NATIVE_BUFFER = 1 << 3;
    }
}

/// Protected-content session identifiers carried by an encrypted buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EncryptionSession {
    /// Protected session id.
    pub session_id: u32,
    /// Protected instance id.
    pub instance_id: u32,
}

/// Result of a successful [`Layer::matches`] comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerMatch {
    /// Whether the buffer handles are also identical.
    pub handles_match: bool,
}

/// One visible window-system surface for one frame.
///
/// Layers are rebuilt every frame. Geometry is split between a subpixel
/// `source_crop` in buffer space and an integer `dest` in display space;
/// `transform` is applied between the two, so a transposing transform swaps
/// the axes the scale factors are computed on.
#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    /// Buffer being presented, if any.
    pub handle: Option<BufferHandle>,
    /// Fence to wait on before reading the buffer.
    pub acquire_fence: Option<Fence>,
    /// Fence signalled when the display stops reading the buffer.
    pub release_fence: Option<Fence>,
    /// Allocation description of the buffer.
    pub buffer: BufferInfo,
    /// Region of the buffer to present, in buffer pixels.
    pub source_crop: Rect,
    /// Region of the display covered, in display pixels.
    pub dest: DisplayRect,
    /// Blend mode.
    pub blend: BlendMode,
    /// Constant alpha applied to the whole layer (0.0–1.0).
    pub plane_alpha: f32,
    /// Rotation and flip.
    pub transform: Transform,
    /// Content flags.
    pub flags: LayerFlags,
    /// Producer frame rate, if tracked.
    pub fps: u32,
    /// Media presentation timestamp of the current buffer.
    pub media_timestamp: u64,
    /// Protected session, when [`LayerFlags::ENCRYPTED`] is set.
    pub encryption: Option<EncryptionSession>,
    /// The composition this layer is the output of, if it is a render target.
    pub composition: Option<CompositionId>,
}

impl Layer {
    /// Creates an opaque, untransformed layer presenting the whole buffer
    /// at `dest`.
    #[must_use]
    pub fn new(handle: Option<BufferHandle>, buffer: BufferInfo, dest: DisplayRect) -> Self {
        Self {
            handle,
            acquire_fence: None,
            release_fence: None,
            buffer,
            source_crop: Rect::new(0.0, 0.0, f64::from(buffer.width), f64::from(buffer.height)),
            dest,
            blend: BlendMode::None,
            plane_alpha: 1.0,
            transform: Transform::NONE,
            flags: LayerFlags::empty(),
            fps: 0,
            media_timestamp: 0,
            encryption: None,
            composition: None,
        }
    }

    /// Sets the blend mode.
    #[must_use]
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    /// Sets the source crop.
    #[must_use]
    pub fn with_source_crop(mut self, crop: Rect) -> Self {
        self.source_crop = crop;
        self
    }

    /// Sets the transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Adds content flags.
    #[must_use]
    pub fn with_flags(mut self, flags: LayerFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Sets the plane alpha.
    #[must_use]
    pub fn with_plane_alpha(mut self, alpha: f32) -> Self {
        self.plane_alpha = alpha;
        self
    }

    /// Buffer pixel format.
    #[inline]
    #[must_use]
    pub fn format(&self) -> BufferFormat {
        self.buffer.format
    }

    /// Whether the layer fully hides what is behind it.
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        !self.uses_plane_alpha() && (self.blend == BlendMode::None || !self.has_alpha())
    }

    /// Whether the buffer format carries an alpha channel.
    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.buffer.format.has_alpha()
    }

    /// Whether the layer is tagged as video.
    #[must_use]
    pub fn is_video(&self) -> bool {
        self.flags.contains(LayerFlags::VIDEO)
    }

    /// Whether the layer carries protected content.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.flags.contains(LayerFlags::ENCRYPTED)
    }

    /// Whether the producer renders straight into the front buffer.
    #[must_use]
    pub fn is_front_buffer_rendered(&self) -> bool {
        self.flags.contains(LayerFlags::FRONT_BUFFER_RENDERED)
    }

    /// Whether the buffer was allocated for direct scanout.
    #[must_use]
    pub fn is_native_buffer(&self) -> bool {
        self.flags.contains(LayerFlags::NATIVE_BUFFER)
    }

    /// Whether the layer uses a constant alpha below 1.
    #[must_use]
    pub fn uses_plane_alpha(&self) -> bool {
        self.plane_alpha < 1.0
    }

    /// Whether this layer is the output of another composition.
    #[must_use]
    pub fn is_composition(&self) -> bool {
        self.composition.is_some()
    }

    /// Whether the buffer has alpha that must be ignored (blend `None`), so
    /// the plane has to be told to treat it as opaque.
    #[must_use]
    pub fn needs_opaque_forcing(&self) -> bool {
        self.blend == BlendMode::None && self.has_alpha()
    }

    /// Whether presenting the layer needs a positioned/sized window rather
    /// than a full-screen plane on a `width`×`height` display.
    #[must_use]
    pub fn needs_windowing(&self, width: u32, height: u32) -> bool {
        self.dest != DisplayRect::from_size(width, height)
    }

    /// Whether the source crop starts away from the buffer origin.
    #[must_use]
    pub fn has_source_offset(&self) -> bool {
        self.source_crop.x0 != 0.0 || self.source_crop.y0 != 0.0
    }

    /// Whether the source crop is smaller than the buffer.
    #[must_use]
    pub fn has_source_crop(&self) -> bool {
        self.source_crop.width() < f64::from(self.buffer.width)
            || self.source_crop.height() < f64::from(self.buffer.height)
    }

    /// Source size after applying the transform (width, height).
    #[must_use]
    pub fn transformed_source_size(&self) -> (f64, f64) {
        let (w, h) = (self.source_crop.width(), self.source_crop.height());
        if self.transform.is_transpose() {
            (h, w)
        } else {
            (w, h)
        }
    }

    /// Horizontal and vertical scale factors (destination / source).
    ///
    /// Returns `(0.0, 0.0)` for an empty source crop.
    #[must_use]
    pub fn scale_factors(&self) -> (f64, f64) {
        let (sw, sh) = self.transformed_source_size();
        if sw <= 0.0 || sh <= 0.0 {
            return (0.0, 0.0);
        }
        (f64::from(self.dest.width) / sw, f64::from(self.dest.height) / sh)
    }

    /// Whether the layer is scaled on either axis.
    #[must_use]
    pub fn is_scaled(&self) -> bool {
        let (sx, sy) = self.scale_factors();
        let off = |s: f64| s > 1.0 + SCALE_EPSILON || s < 1.0 - SCALE_EPSILON;
        off(sx) || off(sy)
    }

    /// Closes the acquire fence once the buffer is known to be ready.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if the fence was already closed.
    pub fn close_acquire_fence(&mut self) -> Option<Fence> {
        debug_assert!(self.acquire_fence.is_some(), "acquire fence already closed");
        self.acquire_fence.take()
    }

    /// Compares everything that determines composed output except the
    /// buffer handle and fences.
    ///
    /// Returns `None` when geometry, format, blend, transform, flags or
    /// protection differ. Otherwise reports whether the handles match too.
    #[must_use]
    pub fn matches(&self, other: &Self) -> Option<LayerMatch> {
        let same = self.buffer == other.buffer
            && self.source_crop == other.source_crop
            && self.dest == other.dest
            && self.blend == other.blend
            && self.plane_alpha == other.plane_alpha
            && self.transform == other.transform
            && self.flags == other.flags
            && self.encryption == other.encryption
            && self.composition == other.composition;
        same.then_some(LayerMatch {
            handles_match: self.handle == other.handle,
        })
    }
}
