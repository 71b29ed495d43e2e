// Copyright 2026 the Planar Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The composer interface.
//!
//! A [`Composer`] merges a [`LayerStack`] into a single target [`Layer`]. The
//! composition manager asks every registered composer for an [`Evaluation`]
//! of each new composition and keeps the cheapest. A composer may attach its
//! own state to an evaluation; the manager stores it with the composition and
//! hands it back on [`Composer::on_compose`]. The state is dropped with the
//! composition.

use core::any::Any;
use core::fmt;

use planar_core::buffer::BufferError;
use planar_core::layer::{Layer, LayerStack};

/// Costs below this value reject the composition.
pub const EVAL_COST_MIN: f32 = 0.0;

/// Worst-case or unknown cost.
pub const EVAL_COST_MAX: f32 = f32::MAX;

/// Which resource a composer's cost estimate should minimize.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CostType {
    /// Overall power draw.
    #[default]
    Power,
    /// Memory bandwidth.
    Bandwidth,
    /// Time to complete.
    Performance,
}

/// Opaque per-composition state owned by a composer.
pub type ComposerState = Box<dyn Any + Send>;

/// Result of [`Composer::on_evaluate`].
pub struct Evaluation {
    /// Estimated cost, or a value below [`EVAL_COST_MIN`] to reject.
    pub cost: f32,
    /// State to carry into [`Composer::on_compose`].
    pub state: Option<ComposerState>,
}

impl Evaluation {
    /// The composer cannot produce this composition.
    #[must_use]
    pub fn rejected() -> Self {
        Self {
            cost: -1.0,
            state: None,
        }
    }

    /// The composer can produce this composition at `cost`.
    #[must_use]
    pub fn accepted(cost: f32) -> Self {
        Self { cost, state: None }
    }

    /// Attaches composer state.
    #[must_use]
    pub fn with_state(mut self, state: impl Any + Send) -> Self {
        self.state = Some(Box::new(state));
        self
    }

    /// Whether the cost accepts the composition.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.cost >= EVAL_COST_MIN
    }
}

impl fmt::Debug for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluation")
            .field("cost", &self.cost)
            .field("state", &self.state.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Resources a composer reserved for one composition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ComposerResource(pub u64);

/// Error returned by [`Composer::on_acquire`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireError {
    /// No composer was chosen for the composition.
    Impossible,
    /// The composer is out of resources; retry on a later frame.
    ResourcesExhausted,
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Impossible => write!(f, "composition is impossible"),
            Self::ResourcesExhausted => write!(f, "composer resources exhausted"),
        }
    }
}

impl core::error::Error for AcquireError {}

/// Error returned when a composition could not be produced this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComposeError {
    /// No composer was chosen for the composition.
    Impossible,
    /// No render target could be dequeued.
    TargetUnavailable(BufferError),
    /// The composer failed to render.
    ComposerFailed,
}

impl fmt::Display for ComposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Impossible => write!(f, "composition is impossible"),
            Self::TargetUnavailable(e) => write!(f, "render target unavailable: {e}"),
            Self::ComposerFailed => write!(f, "composer failed"),
        }
    }
}

impl core::error::Error for ComposeError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::TargetUnavailable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferError> for ComposeError {
    fn from(e: BufferError) -> Self {
        Self::TargetUnavailable(e)
    }
}

/// A backend that can merge a layer stack into one buffer.
pub trait Composer {
    /// Short name for diagnostics.
    fn name(&self) -> &str;

    /// Estimates the cost of composing `source` into `target`.
    ///
    /// A rejected evaluation must not carry state.
    fn on_evaluate(&mut self, source: &LayerStack, target: &Layer, cost: CostType) -> Evaluation;

    /// Reserves what the composer needs to produce the composition.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::ResourcesExhausted`] if nothing can be
    /// reserved right now.
    fn on_acquire(
        &mut self,
        source: &LayerStack,
        target: &Layer,
    ) -> Result<ComposerResource, AcquireError>;

    /// Renders `source` into `target`.
    ///
    /// `target.handle` is the buffer to write; wait on
    /// `target.acquire_fence` first if set.
    ///
    /// # Errors
    ///
    /// Returns [`ComposeError::ComposerFailed`] if rendering failed.
    fn on_compose(
        &mut self,
        source: &LayerStack,
        target: &Layer,
        state: Option<&mut (dyn Any + Send)>,
    ) -> Result<(), ComposeError>;

    /// Returns resources reserved by [`on_acquire`](Self::on_acquire).
    fn on_release(&mut self, resource: ComposerResource);
}

/// Fallback composer that leaves the work to the window system's own
/// compositor.
///
/// Accepts everything at [`EVAL_COST_MAX`], so any composer quoting a real
/// cost wins over it. Register it first.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughComposer;

impl Composer for PassthroughComposer {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn on_evaluate(&mut self, _: &LayerStack, _: &Layer, _: CostType) -> Evaluation {
        Evaluation::accepted(EVAL_COST_MAX)
    }

    fn on_acquire(&mut self, _: &LayerStack, _: &Layer) -> Result<ComposerResource, AcquireError> {
        Ok(ComposerResource(0))
    }

    fn on_compose(
        &mut self,
        _: &LayerStack,
        _: &Layer,
        _: Option<&mut (dyn Any + Send)>,
    ) -> Result<(), ComposeError> {
        Ok(())
    }

    fn on_release(&mut self, _: ComposerResource) {}
}

#[cfg(test)]
mod tests {
    use planar_core::format::BufferFormat;
    use planar_core::layer::{BufferInfo, DisplayRect};

    use super::*;

    #[test]
    fn evaluation_acceptance() {
        assert!(!Evaluation::rejected().is_accepted(), "negative cost rejects");
        assert!(Evaluation::accepted(0.0).is_accepted(), "zero cost accepts");
        assert!(
            Evaluation::accepted(EVAL_COST_MAX).is_accepted(),
            "max cost still accepts"
        );
    }

    #[test]
    fn state_is_recoverable() {
        let mut eval = Evaluation::accepted(1.0).with_state(42_u32);
        let state = eval.state.as_deref_mut().unwrap();
        assert_eq!(state.downcast_mut::<u32>(), Some(&mut 42), "state downcasts");
    }

    #[test]
    fn passthrough_accepts_at_max_cost() {
        let mut c = PassthroughComposer;
        let target = Layer::new(
            None,
            BufferInfo::linear(64, 64, BufferFormat::Rgba8888),
            DisplayRect::from_size(64, 64),
        );
        let eval = c.on_evaluate(&LayerStack::new(), &target, CostType::Power);
        assert_eq!(eval.cost, EVAL_COST_MAX, "worst-case cost");
        assert!(eval.state.is_none(), "no state");
    }

    #[test]
    fn compose_error_wraps_buffer_error() {
        let e = ComposeError::from(BufferError::PoolExhausted);
        assert_eq!(e, ComposeError::TargetUnavailable(BufferError::PoolExhausted), "from");
        assert_eq!(
            e.to_string(),
            "render target unavailable: buffer pool exhausted",
            "display chains the cause"
        );
    }
}
