//! # Engine Module
//!
//! The stateful logic core of the fold: banded triangular pair arrays, the
//! span-by-span recurrence scan that fills them, and the rescaling controller
//! that keeps partition-function magnitudes inside floating-point range.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - every numeric policy of the fold:
//!   temperature, initial scaling, rescale bounds, loop-size limits, sterics
//! - **Storage** ([`array`], [`tables`]) - the Θ(n²) banded pair arrays with
//!   wraparound aliasing, and the fixed aggregate of six arrays plus the two
//!   prefix/suffix accumulators
//! - **Computation** (`recurrence`) - the mutually recursive span scan,
//!   interior then wrapped exterior
//! - **Stability** (`rescale`) - drift detection and lockstep rescaling
//! - **Progress Monitoring** ([`progress`]) - per-span progress events and
//!   cooperative cancellation
//! - **Error Handling** ([`error`]) - the usage/consistency/cancellation
//!   taxonomy
//!
//! The recurrence honors a strict dependency order: every cell at span `d`
//! reads only cells of strictly smaller span (or earlier stages of the same
//! cell), which is what allows the optional `parallel` feature to fan the
//! within-span compute pass out over rayon without synchronization.

pub mod array;
pub mod config;
pub mod error;
pub mod progress;
pub(crate) mod recurrence;
pub(crate) mod rescale;
pub mod tables;
