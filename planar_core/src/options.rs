// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Typed tunables for plane allocation and composition caching.
//!
//! Both config structs are plain data with `const` presets. A persisted
//! key-value store can be layered on top through `apply`, which parses one
//! string override at a time:
//!
//! | Key                            | Field                                          |
//! |--------------------------------|------------------------------------------------|
//! | `overlay.enable`               | [`AllocatorOptions::overlay_enabled`]          |
//! | `overlay.rgb`                  | [`AllocatorOptions::rgb_overlay`]              |
//! | `overlay.yuv`                  | [`AllocatorOptions::yuv_overlay`]              |
//! | `overlay.zorder_reorder`       | [`AllocatorOptions::z_order_reorder`]          |
//! | `overlay.collapse`             | [`AllocatorOptions::collapse`]                 |
//! | `overlay.preprocess`           | [`AllocatorOptions::preprocess`]               |
//! | `overlay.idle_avoid_rgb`       | [`AllocatorOptions::idle_avoid_rgb_overlay`]   |
//! | `overlay.max_handled_sets`     | [`AllocatorOptions::max_handled_sets`]         |
//! | `overlay.max_unhandled_sets`   | [`AllocatorOptions::max_unhandled_sets`]       |
//! | `composition.pool_max_count`   | [`CompositionConfig::pool_max_count`]          |
//! | `composition.pool_max_bytes`   | [`CompositionConfig::pool_max_bytes`]          |
//! | `composition.reuse_grace_ms`   | [`CompositionConfig::reuse_grace_ms`]          |
//! | `composition.buffer_idle_ms`   | [`CompositionConfig::buffer_idle_ms`]          |
//!
//! Options are read when an allocator or manager is built and never change
//! during a search.

use core::fmt;
use core::str::FromStr;

use crate::time::{Duration, Timebase};

/// Error returned by `apply` on the config structs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionError {
    /// The key is not recognised by this config struct.
    UnknownKey,
    /// The value could not be parsed for the key's type.
    InvalidValue {
        /// Key whose value was rejected.
        key: &'static str,
    },
}

impl fmt::Display for OptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKey => write!(f, "unknown option key"),
            Self::InvalidValue { key } => write!(f, "invalid value for option `{key}`"),
        }
    }
}

impl core::error::Error for OptionError {}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, OptionError> {
    match value.trim() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(OptionError::InvalidValue { key }),
    }
}

fn parse_num<T: FromStr>(key: &'static str, value: &str) -> Result<T, OptionError> {
    value
        .trim()
        .parse()
        .map_err(|_| OptionError::InvalidValue { key })
}

/// Plane allocator tunables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocatorOptions {
    /// Use overlay planes at all. When off the allocator always fails and the
    /// caller composes everything.
    pub overlay_enabled: bool,
    /// Allow RGB content on overlay planes.
    pub rgb_overlay: bool,
    /// Allow YUV content on overlay planes.
    pub yuv_overlay: bool,
    /// Allow planes to be stacked in an order other than their index order.
    pub z_order_reorder: bool,
    /// Allow layers to be collapsed into a composited plane.
    pub collapse: bool,
    /// Allow pre-processing a layer into a plane-friendly intermediate.
    pub preprocess: bool,
    /// Refuse RGB layers on non-primary planes while the display is idle.
    pub idle_avoid_rgb_overlay: bool,
    /// Maximum runs of consecutive dedicated-plane layers.
    pub max_handled_sets: u32,
    /// Maximum runs of consecutive collapsed layers.
    pub max_unhandled_sets: u32,
}

impl AllocatorOptions {
    /// Every feature on, unlimited runs bounded only by plane count.
    pub const DEFAULT: Self = Self {
        overlay_enabled: true,
        rgb_overlay: true,
        yuv_overlay: true,
        z_order_reorder: true,
        collapse: true,
        preprocess: true,
        idle_avoid_rgb_overlay: false,
        max_handled_sets: u32::MAX,
        max_unhandled_sets: u32::MAX,
    };

    /// Conservative preset: planes in index order, at most one collapsed run,
    /// RGB avoided on overlays while idle.
    #[must_use]
    pub const fn conservative() -> Self {
        Self {
            z_order_reorder: false,
            idle_avoid_rgb_overlay: true,
            max_unhandled_sets: 1,
            ..Self::DEFAULT
        }
    }

    /// Overlays disabled; every frame is fully composed.
    #[must_use]
    pub const fn composition_only() -> Self {
        Self {
            overlay_enabled: false,
            ..Self::DEFAULT
        }
    }

    /// Applies one `overlay.*` key-value override.
    ///
    /// # Errors
    ///
    /// Returns [`OptionError::UnknownKey`] for keys outside this struct and
    /// [`OptionError::InvalidValue`] when the value does not parse.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), OptionError> {
        match key {
            "overlay.enable" => self.overlay_enabled = parse_bool("overlay.enable", value)?,
            "overlay.rgb" => self.rgb_overlay = parse_bool("overlay.rgb", value)?,
            "overlay.yuv" => self.yuv_overlay = parse_bool("overlay.yuv", value)?,
            "overlay.zorder_reorder" => {
                self.z_order_reorder = parse_bool("overlay.zorder_reorder", value)?;
            }
            "overlay.collapse" => self.collapse = parse_bool("overlay.collapse", value)?,
            "overlay.preprocess" => self.preprocess = parse_bool("overlay.preprocess", value)?,
            "overlay.idle_avoid_rgb" => {
                self.idle_avoid_rgb_overlay = parse_bool("overlay.idle_avoid_rgb", value)?;
            }
            "overlay.max_handled_sets" => {
                self.max_handled_sets = parse_num("overlay.max_handled_sets", value)?;
            }
            "overlay.max_unhandled_sets" => {
                self.max_unhandled_sets = parse_num("overlay.max_unhandled_sets", value)?;
            }
            _ => return Err(OptionError::UnknownKey),
        }
        Ok(())
    }
}

impl Default for AllocatorOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Composition cache and render-target pool tunables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompositionConfig {
    /// Maximum buffers the render-target pool keeps allocated.
    pub pool_max_count: u32,
    /// Maximum total bytes the render-target pool keeps allocated.
    pub pool_max_bytes: u64,
    /// How long an unreferenced composition is kept before its slot may be
    /// recycled.
    pub reuse_grace_ms: u64,
    /// How long a free pooled buffer may sit unused before it is released.
    pub buffer_idle_ms: u64,
    /// Host clock timebase used to convert the millisecond tunables.
    pub timebase: Timebase,
}

impl CompositionConfig {
    /// Pool of 16 buffers up to 256 MiB, 100 ms reuse grace, 1 s buffer idle,
    /// nanosecond clock.
    pub const DEFAULT: Self = Self {
        pool_max_count: 16,
        pool_max_bytes: 256 * 1024 * 1024,
        reuse_grace_ms: 100,
        buffer_idle_ms: 1000,
        timebase: Timebase::NANOS,
    };

    /// Same as [`DEFAULT`](Self::DEFAULT) on a different host clock.
    #[must_use]
    pub const fn with_timebase(timebase: Timebase) -> Self {
        Self {
            timebase,
            ..Self::DEFAULT
        }
    }

    /// Reuse grace window in host ticks.
    #[must_use]
    pub const fn reuse_grace(&self) -> Duration {
        Duration::from_millis(self.reuse_grace_ms, self.timebase)
    }

    /// Buffer idle window in host ticks.
    #[must_use]
    pub const fn buffer_idle(&self) -> Duration {
        Duration::from_millis(self.buffer_idle_ms, self.timebase)
    }

    /// Applies one `composition.*` key-value override.
    ///
    /// # Errors
    ///
    /// Returns [`OptionError::UnknownKey`] for keys outside this struct and
    /// [`OptionError::InvalidValue`] when the value does not parse.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), OptionError> {
        match key {
            "composition.pool_max_count" => {
                self.pool_max_count = parse_num("composition.pool_max_count", value)?;
            }
            "composition.pool_max_bytes" => {
                self.pool_max_bytes = parse_num("composition.pool_max_bytes", value)?;
            }
            "composition.reuse_grace_ms" => {
                self.reuse_grace_ms = parse_num("composition.reuse_grace_ms", value)?;
            }
            "composition.buffer_idle_ms" => {
                self.buffer_idle_ms = parse_num("composition.buffer_idle_ms", value)?;
            }
            _ => return Err(OptionError::UnknownKey),
        }
        Ok(())
    }
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
