// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hardware plane and display capability descriptors.
//!
//! A [`DisplayCaps`] lists the display's [`PlaneCaps`] (index 0 is the primary,
//! backmost plane), the [`ZOrderTable`] of plane orders the driver accepts,
//! and a [`DisplayConstraints`] implementation for checks that only make sense
//! on a whole arrangement (bandwidth, shared scaler units).
//!
//! These are plain data: the allocator reads them and never mutates them.

mod display;
mod plane;
mod zorder;

pub use display::{DisplayCaps, DisplayConstraints, GenericConstraints, PlaneArrangement};
pub use plane::{PlaneCaps, PlaneFeatures};
pub use zorder::{ZOrderEntry, ZOrderTable, plane_index, plane_letter};
