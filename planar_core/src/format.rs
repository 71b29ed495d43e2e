// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel formats and the per-buffer state planes care about.
//!
//! Each enum here has a matching mask type so that a plane can advertise the
//! set of values it accepts ([`TilingMask`], [`CompressionMask`],
//! [`BlendMask`]). Formats are additionally grouped into coarse
//! [`CscClass`]es, which is how a plane picks the intermediate format a layer
//! is converted to when it has to be pre-processed.

use bitflags::bitflags;

/// Buffer pixel format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferFormat {
    /// 32-bit RGBA, 8 bits per channel, alpha used.
    Rgba8888,
    /// 32-bit RGB with an ignored padding byte.
    Rgbx8888,
    /// 32-bit BGRA, alpha used.
    Bgra8888,
    /// 32-bit BGR with an ignored padding byte.
    Bgrx8888,
    /// 16-bit packed RGB.
    Rgb565,
    /// 32-bit RGBA, 10 bits per colour channel and 2 alpha bits.
    Rgba1010102,
    /// 8-bit 4:2:0 YUV, Y plane followed by interleaved UV plane.
    Nv12,
    /// 8-bit 4:2:2 packed YUV.
    Yuy2,
    /// 16-bit-container 4:2:0 YUV (10 significant bits).
    P010,
}

impl BufferFormat {
    /// Returns the colour-space-conversion class of this format.
    #[must_use]
    pub const fn csc_class(self) -> CscClass {
        match self {
            Self::Rgbx8888 | Self::Bgrx8888 | Self::Rgb565 => CscClass::OpaqueRgb,
            Self::Rgba8888 | Self::Bgra8888 | Self::Rgba1010102 => CscClass::AlphaRgb,
            Self::Nv12 | Self::Yuy2 => CscClass::Yuv8,
            Self::P010 => CscClass::Yuv16,
        }
    }

    /// Returns whether the format carries an alpha channel.
    #[must_use]
    pub const fn has_alpha(self) -> bool {
        matches!(self.csc_class(), CscClass::AlphaRgb)
    }

    /// Returns whether the format is a YUV format.
    #[must_use]
    pub const fn is_yuv(self) -> bool {
        self.csc_class().is_yuv()
    }

    /// Returns whether chroma is horizontally subsampled, which forces
    /// source coordinates onto even pixel boundaries.
    #[must_use]
    pub const fn is_subsampled(self) -> bool {
        matches!(self, Self::Nv12 | Self::Yuy2 | Self::P010)
    }

    /// Bytes per pixel of the first (luma or only) plane.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8888
            | Self::Rgbx8888
            | Self::Bgra8888
            | Self::Bgrx8888
            | Self::Rgba1010102 => 4,
            Self::Rgb565 | Self::Yuy2 | Self::P010 => 2,
            Self::Nv12 => 1,
        }
    }

    /// Average bits per pixel across all planes of the format.
    #[must_use]
    pub const fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Nv12 => 12,
            Self::P010 => 24,
            other => other.bytes_per_pixel() * 8,
        }
    }
}

/// Coarse colour-space-conversion class of a format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CscClass {
    /// RGB without a meaningful alpha channel.
    OpaqueRgb,
    /// RGB with alpha.
    AlphaRgb,
    /// 8-bit YUV.
    Yuv8,
    /// 16-bit-container YUV.
    Yuv16,
}

impl CscClass {
    /// Number of classes.
    pub const COUNT: usize = 4;

    /// All classes in table order.
    pub const ALL: [Self; Self::COUNT] = [Self::OpaqueRgb, Self::AlphaRgb, Self::Yuv8, Self::Yuv16];

    /// Index of this class in per-class tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::OpaqueRgb => 0,
            Self::AlphaRgb => 1,
            Self::Yuv8 => 2,
            Self::Yuv16 => 3,
        }
    }

    /// Returns whether this class is a YUV class.
    #[must_use]
    pub const fn is_yuv(self) -> bool {
        matches!(self, Self::Yuv8 | Self::Yuv16)
    }
}

/// Memory tiling layout of a buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Tiling {
    /// Row-major linear layout.
    #[default]
    Linear,
    /// X-major tiles.
    X,
    /// Y-major tiles.
    Y,
    /// Y-major tiles with the fast-clear friendly layout.
    Yf,
}

impl Tiling {
    /// Returns whether this is one of the Y-tile layouts.
    #[must_use]
    pub const fn is_y_tiled(self) -> bool {
        matches!(self, Self::Y | Self::Yf)
    }
}

bitflags! {
    /// Set of [`Tiling`] layouts a plane can scan out.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TilingMask: u8 {
        /// [`Tiling::Linear`].
        const LINEAR = 1 << 0;
        /// [`Tiling::X`].
        const X = 1 << 1;
        /// [`Tiling::Y`].
        const Y = 1 << 2;
        /// [`Tiling::Yf`].
        const YF = 1 << 3;
    }
}

impl TilingMask {
    /// Returns whether `tiling` is in the set.
    #[must_use]
    pub const fn supports(self, tiling: Tiling) -> bool {
        self.contains(Self::from_tiling(tiling))
    }

    /// Converts a single layout to its mask bit.
    #[must_use]
    pub const fn from_tiling(tiling: Tiling) -> Self {
        match tiling {
            Tiling::Linear => Self::LINEAR,
            Tiling::X => Self::X,
            Tiling::Y => Self::Y,
            Tiling::Yf => Self::YF,
        }
    }
}

/// Lossless framebuffer compression applied to a buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed.
    #[default]
    None,
    /// Render-engine compression.
    Render,
    /// Media-engine compression.
    Media,
}

bitflags! {
    /// Set of [`Compression`] schemes a plane can decode.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CompressionMask: u8 {
        /// [`Compression::None`].
        const NONE = 1 << 0;
        /// [`Compression::Render`].
        const RENDER = 1 << 1;
        /// [`Compression::Media`].
        const MEDIA = 1 << 2;
    }
}

impl CompressionMask {
    /// Returns whether `compression` is in the set.
    #[must_use]
    pub const fn supports(self, compression: Compression) -> bool {
        let bit = match compression {
            Compression::None => Self::NONE,
            Compression::Render => Self::RENDER,
            Compression::Media => Self::MEDIA,
        };
        self.contains(bit)
    }
}

/// How a layer's pixels combine with what is behind it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Source replaces destination; alpha is ignored.
    #[default]
    None,
    /// Source colour is premultiplied by its alpha.
    Premult,
    /// Source colour is not premultiplied (coverage blending).
    Coverage,
}

bitflags! {
    /// Set of [`BlendMode`]s a plane supports.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BlendMask: u8 {
        /// [`BlendMode::None`].
        const NONE = 1 << 0;
        /// [`BlendMode::Premult`].
        const PREMULT = 1 << 1;
        /// [`BlendMode::Coverage`].
        const COVERAGE = 1 << 2;
    }
}

impl BlendMask {
    /// Returns whether `blend` is in the set.
    #[must_use]
    pub const fn supports(self, blend: BlendMode) -> bool {
        let bit = match blend {
            BlendMode::None => Self::NONE,
            BlendMode::Premult => Self::PREMULT,
            BlendMode::Coverage => Self::COVERAGE,
        };
        self.contains(bit)
    }
}

bitflags! {
    /// Rotation and flip applied when presenting a buffer.
    ///
    /// Rotations are expressed as flip combinations on top of an optional
    /// 90° rotation, so `ROT_180 == FLIP_H | FLIP_V`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Transform: u8 {
        /// Mirror horizontally.
        const FLIP_H = 1 << 0;
        /// Mirror vertically.
        const FLIP_V = 1 << 1;
        /// Rotate 90° clockwise (applied after flips).
        const ROT_90 = 1 << 2;
        /// Rotate 180°.
        const ROT_180 = Self::FLIP_H.bits() | Self::FLIP_V.bits();
        /// Rotate 270°.
        const ROT_270 = Self::ROT_180.bits() | Self::ROT_90.bits();
    }
}

impl Transform {
    /// No rotation or flip.
    pub const NONE: Self = Self::empty();

    /// Returns whether the transform swaps width and height.
    #[must_use]
    pub const fn is_transpose(self) -> bool {
        self.contains(Self::ROT_90)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csc_classes() {
        assert_eq!(BufferFormat::Rgbx8888.csc_class(), CscClass::OpaqueRgb);
        assert_eq!(BufferFormat::Rgba8888.csc_class(), CscClass::AlphaRgb);
        assert_eq!(BufferFormat::Nv12.csc_class(), CscClass::Yuv8);
        assert_eq!(BufferFormat::P010.csc_class(), CscClass::Yuv16);
        for (i, class) in CscClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), i, "table order matches index");
        }
    }

    #[test]
    fn alpha_and_yuv_queries() {
        assert!(BufferFormat::Bgra8888.has_alpha());
        assert!(!BufferFormat::Bgrx8888.has_alpha());
        assert!(BufferFormat::Nv12.is_yuv());
        assert!(BufferFormat::Nv12.is_subsampled());
        assert!(!BufferFormat::Rgb565.is_subsampled());
        assert_eq!(BufferFormat::Nv12.bits_per_pixel(), 12);
        assert_eq!(BufferFormat::Rgbx8888.bits_per_pixel(), 32);
    }

    #[test]
    fn transform_transpose() {
        assert!(!Transform::NONE.is_transpose());
        assert!(!Transform::ROT_180.is_transpose());
        assert!(Transform::ROT_90.is_transpose());
        assert!(Transform::ROT_270.is_transpose());
    }

    #[test]
    fn masks_support_members() {
        let tiling = TilingMask::LINEAR | TilingMask::X;
        assert!(tiling.supports(Tiling::X));
        assert!(!tiling.supports(Tiling::Y));

        let blend = BlendMask::NONE | BlendMask::PREMULT;
        assert!(blend.supports(BlendMode::Premult));
        assert!(!blend.supports(BlendMode::Coverage));

        assert!(CompressionMask::NONE.supports(Compression::None));
        assert!(!CompressionMask::NONE.supports(Compression::Render));
    }
}
