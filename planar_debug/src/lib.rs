// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pretty-printing and JSON output for planar diagnostics.
//!
//! This crate provides [`TraceSink`](planar_core::trace::TraceSink)
//! implementations for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`]: human-readable one-line-per-event output,
//!   with a full plane and layer listing when an allocation fails.
//! - [`json::JsonSink`]: collects events as JSON values and exports them as
//!   one array.
//! - [`dump`]: JSON dumps of display capabilities, layer stacks and
//!   allocation results.

pub mod dump;
pub mod json;
pub mod pretty;
