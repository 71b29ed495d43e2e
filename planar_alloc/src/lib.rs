// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Assignment of layers to hardware overlay planes.
//!
//! Given a display's [`LayerStack`](planar_core::layer::LayerStack) and its
//! [`DisplayCaps`](planar_core::caps::DisplayCaps), [`PlaneAllocator`] finds
//! the highest-scoring arrangement in which every layer is either:
//!
//! - on a dedicated plane, scanned out directly or through a pre-processed
//!   intermediate the plane can accept,
//! - collapsed with adjacent layers into one composited target on one plane,
//! - or left out, for layers the caller marked optional.
//!
//! The crate has three parts:
//!
//! - [`LayerConfig`] / [`Eval`]: per-layer, per-plane feasibility and
//!   scoring, including construction of pre-processed intermediates.
//! - [`PlaneAllocator`]: recursive backtracking over assignments with
//!   run-count and plane-count pruning, collapse-plane resolution, z-order
//!   lookup and arrangement validation at each leaf. Results are returned as
//!   a [`Solution`].
//! - [`DbufConstraints`]: a [`DisplayConstraints`] implementation modelling
//!   display-buffer bandwidth, shared scalers and tiling/rotation rules.
//!
//! An allocation that finds nothing returns `None`; the caller then composes
//! every layer into a single full-screen target.
//!
//! [`DisplayConstraints`]: planar_core::caps::DisplayConstraints

#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

mod dbuf;
mod eval;
mod search;
mod solution;

pub use dbuf::{BLOCK_BYTES, DbufConfig, DbufConstraints, MIN_BLOCKS, PlaneBlocks};
pub use eval::{
    Eval, LayerConfig, MIN_SCORE, SCORE_DIRECT, SCORE_EDGE_BONUS, SCORE_PREPROCESSED_RGB,
    SCORE_PREPROCESSED_VIDEO, SCORE_UNHANDLED, SCORE_UNHANDLED_DISCOURAGED,
};
pub use search::{FrameHints, PlaneAllocator};
pub use solution::{LayerPlacement, PlaneContent, Solution};
