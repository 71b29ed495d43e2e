// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display-buffer (DBUF) and scaler constraints for one display pipe.
//!
//! Each enabled plane reserves a share of the display's line buffer, sized
//! so the plane can keep fetching through a memory-latency stall. The
//! buffer's tiling picks how the share is estimated:
//!
//! - **method 1** (linear and X-tiled): bytes fetched during the latency
//!   window at the pixel rate, in 512-byte blocks, plus one block.
//! - **method 2** (Y-tiled): whole lines covering the latency window, times
//!   the blocks one line occupies, with a Y-tile minimum of `min_scanlines`
//!   lines.
//!
//! Render compression adds an eighth and every plane needs at least
//! [`MIN_BLOCKS`]. An arrangement is rejected when any plane needs more than
//! [`DbufConfig::max_lines`] lines or the total exceeds this pipe's share of
//! [`DbufConfig::total_blocks`]. Scaled and NV12 planes each consume one of
//! the pipe's shared scalers.

use planar_core::caps::{DisplayCaps, DisplayConstraints, PlaneArrangement, PlaneCaps};
use planar_core::format::{BufferFormat, Compression};
use planar_core::layer::Layer;

/// Size of one display-buffer block in bytes.
pub const BLOCK_BYTES: u64 = 512;

/// Smallest allocation any enabled plane receives.
pub const MIN_BLOCKS: u64 = 8;

/// Display-buffer budget and timing for one pipe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DbufConfig {
    /// Blocks in the whole display buffer, shared by every active pipe.
    pub total_blocks: u32,
    /// Pipes currently driving a display.
    pub active_displays: u32,
    /// Largest line count a single plane may need.
    pub max_lines: u32,
    /// Scalers available to this pipe.
    pub scaler_count: u32,
    /// Memory latency the buffer must cover, in microseconds.
    pub latency_us: u32,
    /// Pixel clock of the current mode in kHz.
    pub pixel_clock_khz: u32,
    /// Horizontal total (active plus blanking) of the current mode in pixels.
    pub htotal: u32,
    /// Display core clock in kHz; bounds how far a plane may downscale.
    pub cdclk_khz: u32,
}

impl DbufConfig {
    /// A 1080p60 pipe on a part with 892 blocks, 2 scalers and a 624 MHz
    /// core clock.
    pub const DEFAULT: Self = Self {
        total_blocks: 892,
        active_displays: 1,
        max_lines: 31,
        scaler_count: 2,
        latency_us: 5,
        pixel_clock_khz: 148_500,
        htotal: 2200,
        cdclk_khz: 624_000,
    };

    /// Blocks available to this pipe.
    #[must_use]
    pub fn pipe_budget(&self) -> u64 {
        u64::from(self.total_blocks) / u64::from(self.active_displays.max(1))
    }

    /// Duration of one scanline in nanoseconds.
    #[must_use]
    pub fn line_time_ns(&self) -> u64 {
        (u64::from(self.htotal) * 1_000_000).div_ceil(u64::from(self.pixel_clock_khz.max(1)))
    }
}

impl Default for DbufConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Blocks and lines one plane needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneBlocks {
    /// Reserved blocks.
    pub blocks: u64,
    /// Lines the reservation spans.
    pub lines: u64,
}

/// [`DisplayConstraints`] enforcing DBUF, scaler and tiling rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct DbufConstraints {
    /// Budget and timing.
    pub config: DbufConfig,
}

impl DbufConstraints {
    /// Creates constraints for `config`.
    #[must_use]
    pub const fn new(config: DbufConfig) -> Self {
        Self { config }
    }

    /// Lines a Y-tiled fetch covers at minimum.
    #[must_use]
    pub fn min_scanlines(layer: &Layer) -> u64 {
        let format = layer.format();
        let mut lines = if layer.transform.is_transpose() {
            match format.bytes_per_pixel() {
                1 => 16,
                2 => 8,
                _ => 4,
            }
        } else {
            4
        };
        if format.is_subsampled() {
            lines *= 2;
        }
        lines
    }

    /// Estimates the reservation `layer` needs.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "source widths are bounded by plane limits"
    )]
    pub fn plane_blocks(&self, layer: &Layer) -> PlaneBlocks {
        let c = &self.config;
        let cpp = u64::from(layer.format().bytes_per_pixel());
        let (src_w, _) = layer.transformed_source_size();
        let width = (src_w.max(1.0) as u64).max(1);
        let line_ns = c.line_time_ns().max(1);
        let latency_ns = u64::from(c.latency_us) * 1000;

        let y_tiled = layer.buffer.tiling.is_y_tiled();
        let (mut blocks, blocks_per_line) = if y_tiled {
            let scanlines = Self::min_scanlines(layer);
            let per_line = ((width * cpp * scanlines).div_ceil(BLOCK_BYTES) / scanlines).max(1);
            let lines = latency_ns.div_ceil(line_ns);
            let method2 = lines * per_line;
            (method2.max(per_line * scanlines), per_line)
        } else {
            let bytes = u64::from(c.pixel_clock_khz) * cpp * u64::from(c.latency_us) / 1000;
            let method1 = bytes.div_ceil(BLOCK_BYTES) + 1;
            (method1, (width * cpp).div_ceil(BLOCK_BYTES).max(1))
        };
        if layer.buffer.compression == Compression::Render {
            blocks += blocks / 8;
        }
        blocks = blocks.max(MIN_BLOCKS);
        PlaneBlocks {
            blocks,
            lines: blocks.div_ceil(blocks_per_line),
        }
    }

    /// Whether `layer` consumes a scaler.
    #[must_use]
    pub fn needs_scaler(layer: &Layer) -> bool {
        layer.format() == BufferFormat::Nv12 || layer.is_scaled()
    }
}

impl DisplayConstraints for DbufConstraints {
    fn has_complex_constraints(&self) -> bool {
        true
    }

    fn min_scale(&self, plane: &PlaneCaps, layer: &Layer) -> f32 {
        let format_floor = if layer.format().is_subsampled() {
            0.5
        } else {
            1.0 / 3.0
        };
        #[expect(
            clippy::cast_possible_truncation,
            reason = "ratio of two clocks is a small positive value"
        )]
        let clock_floor = (f64::from(self.config.pixel_clock_khz)
            / f64::from(self.config.cdclk_khz.max(1))) as f32;
        plane.min_scale.max(format_floor).max(clock_floor)
    }

    fn is_layer_supported(&self, plane_index: usize, plane: &PlaneCaps, layer: &Layer) -> bool {
        _ = (plane_index, plane);
        let rotated = layer.transform.is_transpose();
        if rotated && !layer.buffer.tiling.is_y_tiled() {
            return false;
        }
        if rotated && layer.buffer.compression == Compression::Render {
            return false;
        }
        if layer.format().is_subsampled() {
            let crop = layer.source_crop;
            let even = |v: f64| v % 2.0 == 0.0;
            if !(even(crop.x0) && even(crop.y0) && even(crop.width()) && even(crop.height())) {
                return false;
            }
        }
        // Render compression is only decoded from Y-tiled surfaces.
        layer.buffer.compression != Compression::Render || layer.buffer.tiling.is_y_tiled()
    }

    fn is_supported(&self, caps: &DisplayCaps, arrangement: &PlaneArrangement<'_>) -> bool {
        _ = caps;
        let mut total = 0_u64;
        let mut scalers = 0_u32;
        for layer in arrangement.stack {
            let need = self.plane_blocks(layer);
            if need.lines > u64::from(self.config.max_lines) {
                return false;
            }
            total += need.blocks;
            if Self::needs_scaler(layer) {
                scalers += 1;
            }
        }
        total <= self.config.pipe_budget() && scalers <= self.config.scaler_count
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use kurbo::Rect;
    use planar_core::format::{Tiling, Transform};
    use planar_core::layer::{BufferInfo, DisplayRect, LayerStack};

    use super::*;

    fn layer(format: BufferFormat, tiling: Tiling) -> Layer {
        let mut info = BufferInfo::linear(1920, 1080, format);
        info.tiling = tiling;
        Layer::new(None, info, DisplayRect::from_size(1920, 1080))
    }

    #[test]
    fn linear_uses_bandwidth_method() {
        let dbuf = DbufConstraints::default();
        // 148.5 MHz * 4 B * 5 us = 2970 B -> 6 blocks + 1, floored to 8.
        let need = dbuf.plane_blocks(&layer(BufferFormat::Rgbx8888, Tiling::Linear));
        assert_eq!(need.blocks, 8);
        // 1920 * 4 B per line = 15 blocks per line.
        assert_eq!(need.lines, 1);
    }

    #[test]
    fn y_tile_uses_scanline_minimum() {
        let dbuf = DbufConstraints::default();
        let need = dbuf.plane_blocks(&layer(BufferFormat::Rgbx8888, Tiling::Y));
        // 15 blocks per line, 4-line Y-tile minimum.
        assert_eq!(need.blocks, 60);
        assert_eq!(need.lines, 4);
    }

    #[test]
    fn compression_adds_an_eighth() {
        let dbuf = DbufConstraints::default();
        let mut l = layer(BufferFormat::Rgbx8888, Tiling::Y);
        l.buffer.compression = Compression::Render;
        assert_eq!(dbuf.plane_blocks(&l).blocks, 67);
    }

    #[test]
    fn rotated_linear_is_vetoed() {
        let dbuf = DbufConstraints::default();
        let plane = PlaneCaps::new("p");
        let l = layer(BufferFormat::Rgbx8888, Tiling::Linear).with_transform(Transform::ROT_90);
        assert!(!dbuf.is_layer_supported(0, &plane, &l));
        let l = layer(BufferFormat::Rgbx8888, Tiling::Y).with_transform(Transform::ROT_90);
        assert!(dbuf.is_layer_supported(0, &plane, &l));
    }

    #[test]
    fn subsampled_crop_must_be_even() {
        let dbuf = DbufConstraints::default();
        let plane = PlaneCaps::new("p");
        let l = layer(BufferFormat::Nv12, Tiling::Y)
            .with_source_crop(Rect::new(1.0, 0.0, 1001.0, 600.0));
        assert!(!dbuf.is_layer_supported(0, &plane, &l));
        let l = l.with_source_crop(Rect::new(2.0, 0.0, 1002.0, 600.0));
        assert!(dbuf.is_layer_supported(0, &plane, &l));
    }

    #[test]
    fn budget_and_scalers() {
        let config = DbufConfig {
            total_blocks: 100,
            ..DbufConfig::DEFAULT
        };
        let dbuf = DbufConstraints::new(config);
        let caps = DisplayCaps::new(
            planar_core::display::DisplayId::PRIMARY,
            "panel",
            1920,
            1080,
            vec![PlaneCaps::new("a"), PlaneCaps::new("b")],
        );
        let one = LayerStack::from_layers(vec![layer(BufferFormat::Rgbx8888, Tiling::Y)]);
        let arrangement = PlaneArrangement {
            stack: &one,
            planes: &[0],
            z_order: 0,
        };
        assert!(dbuf.is_supported(&caps, &arrangement));

        let two = LayerStack::from_layers(vec![
            layer(BufferFormat::Rgbx8888, Tiling::Y),
            layer(BufferFormat::Rgbx8888, Tiling::Y),
        ]);
        let arrangement = PlaneArrangement {
            stack: &two,
            planes: &[0, 1],
            z_order: 0,
        };
        assert!(!dbuf.is_supported(&caps, &arrangement), "120 blocks over a 100 budget");

        let dbuf = DbufConstraints::new(DbufConfig {
            scaler_count: 1,
            ..DbufConfig::DEFAULT
        });
        let nv12 = LayerStack::from_layers(vec![
            layer(BufferFormat::Nv12, Tiling::Y),
            layer(BufferFormat::Nv12, Tiling::Y),
        ]);
        let arrangement = PlaneArrangement {
            stack: &nv12,
            planes: &[0, 1],
            z_order: 0,
        };
        assert!(!dbuf.is_supported(&caps, &arrangement), "two NV12 planes, one scaler");
    }

    #[test]
    fn min_scale_is_clock_relative() {
        let dbuf = DbufConstraints::new(DbufConfig {
            pixel_clock_khz: 594_000,
            cdclk_khz: 624_000,
            ..DbufConfig::DEFAULT
        });
        let plane = PlaneCaps::new("p").with_scale_range(0.25, 2.0);
        let rgb = layer(BufferFormat::Rgbx8888, Tiling::Y);
        let min = dbuf.min_scale(&plane, &rgb);
        assert!(min > 0.95, "4k pixel clock near cdclk forbids downscaling, got {min}");
    }
}
